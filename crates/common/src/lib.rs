// caseclerk-common: platform-independent case logic for the caseclerk workspace

pub mod extract;
pub mod identity;
pub mod status;
pub mod types;
pub mod wikitext;
