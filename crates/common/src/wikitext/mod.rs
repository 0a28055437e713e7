// Wikitext parsing: template tokenizer and heading-based document model.

pub mod document;
pub mod template;

pub use document::{
    case_status, parse_notice, parse_sections, render_notice, set_status_argument,
    status_template, strip_status_template, CaseDocument, NOTICE_TEMPLATE, PRIOR_CASES_TEMPLATE,
    STATUS_TEMPLATE,
};
pub use template::{find_template, parse_templates, Template};
