// Workflow session: the single explicit value threaded through every
// orchestrator call.
//
// Nothing in the engine keeps ambient case state; a session owns the
// parsed view of one case page, its edit guard, the user-visible
// progress log, and the in-flight operation registry (used by embedders
// to warn before navigating away; there is no cancellation).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use caseclerk_common::types::{CaseSection, NoticeParams};
use caseclerk_common::wikitext::{case_status, CaseDocument};

use crate::config::Settings;
use crate::guard::EditGuard;

/// Title prefix under which case pages live.
pub const CASE_PREFIX: &str = "Wikipedia:Sockpuppet investigations/";

/// Case page title for a case identity.
pub fn case_page(case_name: &str) -> String {
    format!("{CASE_PREFIX}{case_name}")
}

/// Archive page title for a case identity.
pub fn archive_page(case_name: &str) -> String {
    format!("{CASE_PREFIX}{case_name}/Archive")
}

/// User talk page for an account.
pub fn talk_page(account: &str) -> String {
    format!("User talk:{account}")
}

/// User page for an account.
pub fn user_page(account: &str) -> String {
    format!("User:{account}")
}

/// Split a case or archive title into (case identity, is_archive).
///
/// Returns `None` for titles outside the case prefix.
pub fn case_name_from_title(title: &str) -> Option<(String, bool)> {
    let rest = title.strip_prefix(CASE_PREFIX)?;
    if rest.is_empty() {
        return None;
    }
    match rest.strip_suffix("/Archive") {
        Some(name) if !name.is_empty() => Some((name.to_string(), true)),
        _ => Some((rest.to_string(), false)),
    }
}

// ── Progress log ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressOutcome {
    Done,
    Warned,
    Failed,
}

/// One attempted operation, as shown to the operator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressEntry {
    pub at: DateTime<Utc>,
    pub what: String,
    pub outcome: ProgressOutcome,
    /// Human-readable reason for warnings and failures.
    pub detail: Option<String>,
}

/// Append-only record of everything attempted in a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressLog {
    entries: Vec<ProgressEntry>,
}

impl ProgressLog {
    pub fn done(&mut self, what: impl Into<String>) {
        self.push(what.into(), ProgressOutcome::Done, None);
    }

    pub fn warn(&mut self, what: impl Into<String>, detail: impl Into<String>) {
        self.push(what.into(), ProgressOutcome::Warned, Some(detail.into()));
    }

    pub fn fail(&mut self, what: impl Into<String>, detail: impl Into<String>) {
        self.push(what.into(), ProgressOutcome::Failed, Some(detail.into()));
    }

    fn push(&mut self, what: String, outcome: ProgressOutcome, detail: Option<String>) {
        self.entries.push(ProgressEntry { at: Utc::now(), what, outcome, detail });
    }

    pub fn entries(&self) -> &[ProgressEntry] {
        &self.entries
    }

    pub fn failures(&self) -> impl Iterator<Item = &ProgressEntry> {
        self.entries.iter().filter(|e| e.outcome == ProgressOutcome::Failed)
    }
}

// ── Operation registry ──────────────────────────────────────────────

/// Lifecycle of one named long-running operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpState {
    Running,
    Succeeded,
    Failed,
}

impl OpState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

/// Tracks in-flight operations by name.
#[derive(Debug, Clone, Default)]
pub struct OperationRegistry {
    states: HashMap<String, OpState>,
}

impl OperationRegistry {
    pub fn start(&mut self, name: impl Into<String>) {
        self.states.insert(name.into(), OpState::Running);
    }

    pub fn finish(&mut self, name: &str, success: bool) {
        let state = if success { OpState::Succeeded } else { OpState::Failed };
        self.states.insert(name.to_string(), state);
    }

    pub fn state(&self, name: &str) -> Option<OpState> {
        self.states.get(name).copied()
    }

    /// Whether any operation is still running (embedders warn before
    /// navigating away while this holds).
    pub fn has_running(&self) -> bool {
        self.states.values().any(|s| *s == OpState::Running)
    }
}

// ── Session ─────────────────────────────────────────────────────────

/// All state for working one case, passed explicitly to every
/// orchestrator entry point.
#[derive(Debug)]
pub struct WorkflowSession {
    /// Case identity (the suspected master's name).
    pub case_name: String,
    /// Title of the page this session operates on.
    pub page_title: String,
    /// Whether that page is the archive rather than the live case.
    pub is_archive: bool,
    /// Parsed view from the last fetch of the page.
    pub document: CaseDocument,
    /// Heading index of the investigation being worked, if one is chosen.
    pub selected_section: Option<usize>,
    /// Archive-notice parameters from the page (post-heal when healing ran).
    pub notice: Option<NoticeParams>,
    /// Set when the missing notice was synthesized during initialization.
    pub notice_healed: bool,
    pub guard: EditGuard,
    pub progress: ProgressLog,
    pub ops: OperationRegistry,
    pub settings: Settings,
}

impl WorkflowSession {
    /// Title of this case's archive page.
    pub fn archive_title(&self) -> String {
        archive_page(&self.case_name)
    }

    /// The selected investigation, or the first one on the page.
    pub fn working_section(&self) -> Option<&CaseSection> {
        match self.selected_section {
            Some(index) => self.document.sections.iter().find(|s| s.index == index),
            None => self.document.sections.iter().find(|s| s.level == 3),
        }
    }

    /// Raw status of the working section, when it carries a status tag.
    pub fn working_status(&self) -> Option<String> {
        self.working_section().and_then(|s| case_status(s.full(&self.document.text)))
    }
}
