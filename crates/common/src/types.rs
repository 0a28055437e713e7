// Core domain types shared across all caseclerk crates.

use serde::{Deserialize, Serialize};

/// A heading-delimited section of a case page.
///
/// Indices are 1-based and count every heading on the page in document
/// order, so they are only valid against the revision they were parsed
/// from. Level-3 headings are individual investigations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaseSection {
    /// Position among all headings on the page (1-based, volatile).
    pub index: usize,
    /// Heading level (2-6, from the `=` count).
    pub level: u8,
    /// Trimmed heading text, e.g. a date label like "19 August 2026".
    pub label: String,
    /// Byte offset of the heading line.
    pub start: usize,
    /// Byte offset just past the heading line (start of the body).
    pub body_start: usize,
    /// Byte offset of the next heading of equal or higher rank (exclusive).
    pub end: usize,
}

impl CaseSection {
    /// The section body, heading line excluded.
    pub fn body<'a>(&self, text: &'a str) -> &'a str {
        &text[self.body_start..self.end]
    }

    /// The whole section, heading line included.
    pub fn full<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start..self.end]
    }
}

/// Parameters of the case-wide archive notice template.
///
/// Parsing and rendering are lossless for `lta` values free of `|`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NoticeParams {
    /// Case identity the notice names (first positional argument).
    pub username: String,
    /// Cross-wiki abuse flag.
    pub crosswiki: bool,
    /// Deny-recognition flag.
    pub deny: bool,
    /// Suppress talk-page links flag.
    pub notalk: bool,
    /// Long-term-abuse page name, when one exists.
    pub lta: Option<String>,
}

/// Privilege roles held by the operator, as independent booleans.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleSet {
    pub clerk: bool,
    pub admin: bool,
    pub checkuser: bool,
}

impl RoleSet {
    /// Checkuser implies clerk-level options.
    pub fn is_clerk(&self) -> bool {
        self.clerk || self.checkuser
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }

    pub fn is_checkuser(&self) -> bool {
        self.checkuser
    }
}

/// Watchlist behavior for a page write.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WatchMode {
    Watch,
    #[default]
    Preferences,
    NoChange,
    Unwatch,
}

impl WatchMode {
    /// Wire value understood by the platform edit call.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Watch => "watch",
            Self::Preferences => "preferences",
            Self::NoChange => "nochange",
            Self::Unwatch => "unwatch",
        }
    }
}

/// Sock classification written into a `{{Sockpuppet}}` tag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SockTag {
    Suspected,
    Blocked,
    Proven,
    Confirmed,
    Banned,
}

impl SockTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Suspected => "suspected",
            Self::Blocked => "blocked",
            Self::Proven => "proven",
            Self::Confirmed => "confirmed",
            Self::Banned => "banned",
        }
    }
}

/// Master classification written into a `{{Sockpuppeteer}}` tag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MasterTag {
    Blocked,
    Checked,
    Banned,
}

/// One account's tagging instructions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagRequest {
    pub target: String,
    /// Tag as a sock of the case master.
    pub sock: Option<SockTag>,
    /// Tag as a sockmaster in their own right.
    pub master: Option<MasterTag>,
    /// Alternate master this account is also suspected of socking for.
    pub altmaster: Option<String>,
    pub altmaster_tag: Option<SockTag>,
}

impl TagRequest {
    pub fn sock_of(target: impl Into<String>, tag: SockTag) -> Self {
        Self {
            target: target.into(),
            sock: Some(tag),
            master: None,
            altmaster: None,
            altmaster_tag: None,
        }
    }

    pub fn master(target: impl Into<String>, tag: MasterTag) -> Self {
        Self {
            target: target.into(),
            sock: None,
            master: Some(tag),
            altmaster: None,
            altmaster_tag: None,
        }
    }
}

/// One account or address-range block instruction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockRequest {
    pub target: String,
    /// Block duration, e.g. `"indefinite"` or `"1 week"`.
    pub duration: String,
    /// Disable account creation.
    pub acb: bool,
    /// Autoblock the underlying address.
    pub autoblock: bool,
    /// Revoke talk-page access.
    pub revoke_talk: bool,
    /// Revoke email access.
    pub revoke_email: bool,
    /// Overwrite an existing block.
    pub reblock: bool,
    /// Leave a block notice on the account's talk page.
    pub talk_notice: bool,
    /// Blank the talk page when leaving the notice.
    pub blank_talk: bool,
    /// Omit the case link from the block summary.
    pub suppress_case_link: bool,
}

impl BlockRequest {
    /// An indefinite sock block with the customary flag set.
    pub fn indefinite(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            duration: "indefinite".into(),
            acb: true,
            autoblock: true,
            revoke_talk: false,
            revoke_email: false,
            reblock: false,
            talk_notice: true,
            blank_talk: false,
            suppress_case_link: false,
        }
    }
}

/// One global-lock request line for the steward queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GlobalLockRequest {
    pub target: String,
    /// Request username suppression alongside the lock.
    pub hide: bool,
}

/// Accounts and address forms extracted from a case, by confidence.
///
/// The four lists are disjoint: a possible entry already present in a
/// likely list is dropped during extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractedParties {
    pub likely_accounts: Vec<String>,
    pub likely_addresses: Vec<String>,
    pub possible_accounts: Vec<String>,
    pub possible_addresses: Vec<String>,
}

impl ExtractedParties {
    pub fn is_empty(&self) -> bool {
        self.likely_accounts.is_empty()
            && self.likely_addresses.is_empty()
            && self.possible_accounts.is_empty()
            && self.possible_addresses.is_empty()
    }
}
