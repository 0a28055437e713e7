// Platform boundary: the primitive wiki operations the engine consumes.
//
// Two implementations: `MediaWikiClient` speaks the live action API and
// `MemoryPlatform` is a deterministic in-process double for tests and
// dry runs. Contract notes live on the trait methods; every caller
// depends on them rather than on either implementation.

pub mod mediawiki;
pub mod memory;

use serde::{Deserialize, Serialize};

use caseclerk_common::types::WatchMode;

use crate::error::PlatformError;

/// An opaque page revision marker. Zero means "no revision observed",
/// which is how missing pages read.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct RevisionToken(pub u64);

impl RevisionToken {
    pub const NONE: RevisionToken = RevisionToken(0);

    pub fn exists(self) -> bool {
        self.0 != 0
    }
}

impl std::fmt::Display for RevisionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Options for a page write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditOptions {
    /// Fail if the page already exists.
    pub create_only: bool,
    pub watch: WatchMode,
    /// Watchlist expiry (e.g. `"1 month"`), honored for `Watch` only.
    pub watch_expiry: Option<String>,
    /// Reject the write unless the live revision still matches.
    pub base_revision: Option<RevisionToken>,
    /// Restrict the write to one heading-indexed section (1-based).
    /// Empty text removes the section.
    pub section: Option<usize>,
}

/// Parameters for one account or range block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSpec {
    pub target: String,
    pub expiry: String,
    pub summary: String,
    pub no_account_creation: bool,
    pub autoblock: bool,
    pub revoke_talk: bool,
    pub revoke_email: bool,
    pub reblock: bool,
}

/// Where to look an account up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistenceScope {
    Local,
    Global,
}

/// Post-expand rendered size of a page or section, with the platform's
/// hard limit from the same report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderUsage {
    pub used: u64,
    pub limit: u64,
}

/// The primitive operations the orchestrators are written against.
///
/// Fetches report a missing page as empty text; writes are not retried
/// here. Transport and protocol failures surface as `PlatformError`.
pub trait PlatformClient: Send + Sync {
    /// Wikitext of a page, or of one heading-indexed section of it.
    /// Empty string means the page (or section) does not exist.
    async fn fetch_page_text(
        &self,
        title: &str,
        section: Option<usize>,
    ) -> Result<String, PlatformError>;

    /// Write a page (or one section of it). A stale `base_revision`
    /// fails with `PlatformError::EditConflict` and changes nothing.
    async fn edit_page(
        &self,
        title: &str,
        text: &str,
        summary: &str,
        options: &EditOptions,
    ) -> Result<(), PlatformError>;

    /// Rename a page. `leave_redirect` keeps a redirect at the old title.
    async fn move_page(
        &self,
        from: &str,
        to: &str,
        summary: &str,
        leave_redirect: bool,
    ) -> Result<(), PlatformError>;

    async fn block_account(&self, spec: &BlockSpec) -> Result<(), PlatformError>;

    /// Full-protect a page against non-admin edits and moves.
    async fn protect_page(&self, title: &str, summary: &str) -> Result<(), PlatformError>;

    /// Latest revision of a page; `RevisionToken::NONE` when missing.
    async fn current_revision(&self, title: &str) -> Result<RevisionToken, PlatformError>;

    /// Rendered-size report for a page or section.
    async fn rendered_usage(
        &self,
        title: &str,
        section: Option<usize>,
    ) -> Result<RenderUsage, PlatformError>;

    async fn account_exists(
        &self,
        name: &str,
        scope: ExistenceScope,
    ) -> Result<bool, PlatformError>;

    /// Whether the account is globally locked.
    async fn is_locked(&self, name: &str) -> Result<bool, PlatformError>;

    /// Summary of the account's current block, if blocked.
    async fn block_reason(&self, name: &str) -> Result<Option<String>, PlatformError>;

    /// Titles of pages linking to `title`.
    async fn backlinks(&self, title: &str) -> Result<Vec<String>, PlatformError>;

    /// Invalidate the rendered-page cache.
    async fn purge(&self, title: &str) -> Result<(), PlatformError>;
}
