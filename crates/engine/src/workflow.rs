// Session bootstrap and the action pipeline.
//
// `initialize` fetches and parses a case page, repairing a missing
// archive notice exactly once. `execute_action_plan` applies one
// operator-approved plan end to end: status change and comment, archive
// notice update, then the block, tag, and lock batches, then archive or
// rename. Planning never writes; permission mismatches are raised
// before the first edit.

use tracing::{debug, info};

use caseclerk_common::extract::extract_parties;
use caseclerk_common::status::{offered_actions, CaseAction};
use caseclerk_common::types::{
    BlockRequest, ExtractedParties, GlobalLockRequest, NoticeParams, RoleSet, TagRequest,
};
use caseclerk_common::wikitext::{
    case_status, find_template, render_notice, set_status_argument, status_template,
    CaseDocument, PRIOR_CASES_TEMPLATE,
};

use crate::actions::{apply_blocks, request_locks};
use crate::archive::{archive_case, ArchiveOutcome};
use crate::config::Settings;
use crate::error::CaseError;
use crate::guard::EditGuard;
use crate::platform::{EditOptions, PlatformClient};
use crate::rename::move_case;
use crate::session::{case_name_from_title, OperationRegistry, ProgressLog, WorkflowSession};
use crate::tags::apply_tags;

/// Load a case page into a fresh session.
///
/// A live case page without an archive notice gets one synthesized at
/// the top (with the TOC and prior-cases markers when those are missing
/// too); the repair runs at most once and the session records it.
pub async fn initialize<P: PlatformClient>(
    platform: &P,
    settings: Settings,
    page_title: &str,
) -> Result<WorkflowSession, CaseError> {
    let Some((case_name, is_archive)) = case_name_from_title(page_title) else {
        return Err(CaseError::MalformedMarkup {
            title: page_title.to_string(),
            detail: "not a case or archive title".into(),
        });
    };
    let text = platform.fetch_page_text(page_title, None).await?;
    if text.is_empty() {
        return Err(CaseError::PageNotFound(page_title.to_string()));
    }

    let mut guard = EditGuard::acquire(platform, page_title).await?;
    let mut document = CaseDocument::parse(text);
    let mut notice = document.notice().map(|(_, params)| params);
    let mut notice_healed = false;

    if notice.is_none() && !is_archive {
        let repaired = heal_notice(&document.text, &case_name);
        let options = EditOptions {
            watch: settings.watch_case.mode,
            watch_expiry: settings.watch_case.expiry.clone(),
            ..EditOptions::default()
        };
        guard.write(platform, &repaired, "Adding missing archive notice", options).await?;

        document = CaseDocument::parse(platform.fetch_page_text(page_title, None).await?);
        notice = document.notice().map(|(_, params)| params);
        if notice.is_none() {
            return Err(CaseError::MalformedMarkup {
                title: page_title.to_string(),
                detail: "archive notice still missing after repair".into(),
            });
        }
        notice_healed = true;
    }

    let mut session = WorkflowSession {
        case_name,
        page_title: page_title.to_string(),
        is_archive,
        document,
        selected_section: None,
        notice,
        notice_healed,
        guard,
        progress: ProgressLog::default(),
        ops: OperationRegistry::default(),
        settings,
    };
    if session.notice_healed {
        session.progress.warn("load case", "archive notice was missing and has been added");
    }
    debug!(case = %session.case_name, archive = session.is_archive, "session initialized");
    Ok(session)
}

/// Synthesize the page scaffold above the existing content.
fn heal_notice(text: &str, case_name: &str) -> String {
    let mut prefix = String::new();
    if !text.contains("__TOC__") {
        prefix.push_str("<noinclude>__TOC__</noinclude>\n");
    }
    prefix.push_str(&render_notice(&NoticeParams {
        username: case_name.to_string(),
        ..NoticeParams::default()
    }));
    prefix.push('\n');
    if find_template(text, PRIOR_CASES_TEMPLATE).is_none() {
        prefix.push_str("{{SPIpriorcases}}\n");
    }
    format!("{prefix}{text}")
}

// ── Plans ───────────────────────────────────────────────────────────

/// One operator-approved batch of work against a session's case.
#[derive(Debug, Clone)]
pub struct ActionPlan {
    /// Status transition to apply (`NoAction` leaves the tag alone).
    pub action: CaseAction,
    /// Free-text comment, placed by the operator's role.
    pub comment: Option<String>,
    /// Also set the status to closed after the action.
    pub close: bool,
    /// Replacement archive-notice parameters, when changed.
    pub notice: Option<NoticeParams>,
    pub blocks: Vec<BlockRequest>,
    pub tags: Vec<TagRequest>,
    pub locks: Vec<GlobalLockRequest>,
    /// Comment posted alongside the lock request.
    pub lock_comment: String,
    /// Archive closed sections once the rest of the plan has landed.
    pub archive_after: bool,
    /// Rename (or merge) the case to this name instead of archiving.
    pub rename_to: Option<String>,
    pub rename_reason: String,
    /// After a rename, list the old identity in the destination's sock
    /// list so the prior name stays discoverable.
    pub graft_old_name: bool,
}

impl Default for ActionPlan {
    fn default() -> Self {
        Self {
            action: CaseAction::NoAction,
            comment: None,
            close: false,
            notice: None,
            blocks: Vec::new(),
            tags: Vec::new(),
            locks: Vec::new(),
            lock_comment: "Sockpuppet accounts, see the linked case.".into(),
            archive_after: false,
            rename_to: None,
            rename_reason: String::new(),
            graft_old_name: true,
        }
    }
}

/// Actions currently offered for the session's working section.
pub fn available_actions(session: &WorkflowSession, roles: &RoleSet) -> Vec<CaseAction> {
    let status = session.working_status().unwrap_or_else(|| "open".to_string());
    offered_actions(&status, roles)
}

/// Check a status transition against the working section's current
/// status without writing anything.
pub fn plan_status_change(
    session: &WorkflowSession,
    roles: &RoleSet,
    action: CaseAction,
) -> Result<(), CaseError> {
    let status = session.working_status().unwrap_or_else(|| "open".to_string());
    if !offered_actions(&status, roles).contains(&action) {
        return Err(CaseError::PermissionMismatch { action: action.as_str().into(), status });
    }
    Ok(())
}

/// Check a whole plan against the operator's roles without writing
/// anything. Closing is a clerk or admin function; archiving and
/// renames are clerk functions.
pub fn validate_plan(
    session: &WorkflowSession,
    roles: &RoleSet,
    plan: &ActionPlan,
) -> Result<(), CaseError> {
    plan_status_change(session, roles, plan.action)?;

    let status = session.working_status().unwrap_or_else(|| "open".to_string());
    if plan.close && !(roles.is_clerk() || roles.is_admin()) {
        return Err(CaseError::PermissionMismatch { action: "close".into(), status });
    }
    if plan.rename_to.is_some() && !roles.is_clerk() {
        return Err(CaseError::PermissionMismatch { action: "rename".into(), status });
    }
    if plan.archive_after && !roles.is_clerk() {
        return Err(CaseError::PermissionMismatch { action: "archive".into(), status });
    }
    Ok(())
}

/// Execute a full plan against the live page.
pub async fn execute_action_plan<P: PlatformClient>(
    session: &mut WorkflowSession,
    platform: &P,
    roles: &RoleSet,
    plan: &ActionPlan,
) -> Result<(), CaseError> {
    session.ops.start("execute_plan");
    let result = run_plan(session, platform, roles, plan).await;
    session.ops.finish("execute_plan", result.is_ok());
    result
}

async fn run_plan<P: PlatformClient>(
    session: &mut WorkflowSession,
    platform: &P,
    roles: &RoleSet,
    plan: &ActionPlan,
) -> Result<(), CaseError> {
    let title = session.page_title.clone();
    let text = platform.fetch_page_text(&title, None).await?;
    if text.is_empty() {
        return Err(CaseError::PageNotFound(title));
    }
    session.document = CaseDocument::parse(text);

    // Validate against the freshly fetched status.
    validate_plan(session, roles, plan)?;

    if plan.action != CaseAction::NoAction || plan.close || plan.comment.is_some() {
        update_case_section(session, platform, roles, plan).await?;
        session.document =
            CaseDocument::parse(platform.fetch_page_text(&session.page_title, None).await?);
    }
    if let Some(params) = &plan.notice {
        update_notice(session, platform, params).await?;
    }

    if !plan.blocks.is_empty() {
        apply_blocks(session, platform, &plan.blocks, roles).await?;
    }
    if !plan.tags.is_empty() {
        apply_tags(session, platform, &plan.tags, roles, &plan.blocks).await?;
    }
    if !plan.locks.is_empty() {
        request_locks(session, platform, &plan.locks, &plan.lock_comment).await?;
    }

    // The archive-on-close convenience only applies to clerks; an admin
    // closing a case leaves it for clerk archival.
    let should_archive = roles.is_clerk()
        && (plan.archive_after || (plan.close && session.settings.archive_on_close));
    if let Some(new_name) = &plan.rename_to {
        move_case(session, platform, new_name, &plan.rename_reason, plan.graft_old_name).await?;
    } else if should_archive {
        archive_case(session, platform).await?;
    }

    platform.purge(&session.page_title).await?;
    log_action(session, platform, plan).await;

    session.document =
        CaseDocument::parse(platform.fetch_page_text(&session.page_title, None).await?);
    session.notice = session.document.notice().map(|(_, params)| params);
    info!(case = %session.case_name, action = plan.action.as_str(), "plan executed");
    Ok(())
}

/// Rewrite the working section: status tag, then comment.
async fn update_case_section<P: PlatformClient>(
    session: &mut WorkflowSession,
    platform: &P,
    roles: &RoleSet,
    plan: &ActionPlan,
) -> Result<(), CaseError> {
    let Some(section) = session.working_section().cloned() else {
        return Err(CaseError::MalformedMarkup {
            title: session.page_title.clone(),
            detail: "no investigation section to act on".into(),
        });
    };
    let original = section.full(&session.document.text).to_string();
    let mut text = original.clone();

    if case_status(&text).is_none() {
        let heading_len = section.body_start - section.start;
        text.insert_str(heading_len, &format!("{}\n", status_template("open")));
        session.progress.warn(
            format!("update section \"{}\"", section.label),
            "status tag was missing and has been inserted",
        );
    }

    let malformed = || CaseError::MalformedMarkup {
        title: session.page_title.clone(),
        detail: "status tag not found in section".into(),
    };
    if let Some(argument) = plan.action.status_argument() {
        text = set_status_argument(&text, argument).ok_or_else(malformed)?;
    }
    if plan.close {
        text = set_status_argument(&text, "close").ok_or_else(malformed)?;
    }
    if let Some(comment) = compose_comment(plan) {
        text = insert_comment(&text, &comment, roles.is_clerk() || roles.is_admin());
    }

    if text == original {
        return Ok(());
    }

    let summary = if plan.close && plan.action == CaseAction::NoAction {
        "Closing case"
    } else {
        plan.action.summary()
    };
    let options = EditOptions {
        section: Some(section.index),
        watch: session.settings.watch_case.mode,
        watch_expiry: session.settings.watch_case.expiry.clone(),
        ..EditOptions::default()
    };
    match session.guard.write(platform, &text, summary, options).await {
        Ok(()) => {
            session.progress.done(format!("updated section \"{}\"", section.label));
            Ok(())
        }
        Err(err @ CaseError::EditConflict { .. }) => {
            // The unsaved comment survives in the failure record.
            let detail = match &plan.comment {
                Some(comment) => format!("edit conflict; unsaved comment: {comment}"),
                None => "edit conflict".to_string(),
            };
            session.progress.fail(format!("update section \"{}\"", section.label), detail);
            Err(err)
        }
        Err(err) => Err(err),
    }
}

/// Comment line: action token, free text, and a signature when the
/// operator did not sign themselves.
fn compose_comment(plan: &ActionPlan) -> Option<String> {
    let token = plan.action.comment_token();
    let comment = plan.comment.as_deref().map(str::trim).filter(|c| !c.is_empty());
    if token.is_none() && comment.is_none() {
        return None;
    }

    let mut line = String::from("*");
    if let Some(token) = token {
        line.push(' ');
        line.push_str(token);
    }
    if let Some(comment) = comment {
        line.push(' ');
        line.push_str(comment);
    }
    if !line.contains("~~~~") {
        line.push_str(" --~~~~");
    }
    Some(line)
}

/// Place a comment inside a section.
///
/// Privileged operators (clerks, checkusers, admins) comment in the
/// staff area above the trailing divider; everyone else comments above
/// the staff sub-heading. Sections without either get the comment
/// appended.
fn insert_comment(text: &str, comment: &str, privileged: bool) -> String {
    let at = if privileged {
        text.rfind("\n----").map(|i| i + 1)
    } else {
        staff_heading_offset(text)
    };
    match at {
        Some(at) => format!("{}{comment}\n{}", &text[..at], &text[at..]),
        None => format!("{}\n{comment}\n", text.trim_end()),
    }
}

fn staff_heading_offset(text: &str) -> Option<usize> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed.starts_with("====") && trimmed.to_lowercase().contains("admin") {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

/// Replace the page's archive notice when the parameters changed.
async fn update_notice<P: PlatformClient>(
    session: &mut WorkflowSession,
    platform: &P,
    params: &NoticeParams,
) -> Result<(), CaseError> {
    let Some((template, current)) = session.document.notice() else {
        return Err(CaseError::MalformedMarkup {
            title: session.page_title.clone(),
            detail: "archive notice not found".into(),
        });
    };
    if current == *params {
        return Ok(());
    }

    let text = &session.document.text;
    let new_text =
        format!("{}{}{}", &text[..template.start], render_notice(params), &text[template.end..]);
    let options = EditOptions {
        watch: session.settings.watch_case.mode,
        watch_expiry: session.settings.watch_case.expiry.clone(),
        ..EditOptions::default()
    };
    session.guard.write(platform, &new_text, "Updating archive notice", options).await?;

    session.notice = Some(params.clone());
    session.document =
        CaseDocument::parse(platform.fetch_page_text(&session.page_title, None).await?);
    session.progress.done("updated archive notice");
    Ok(())
}

// ── One-click archive ───────────────────────────────────────────────

/// Result of a standalone archive run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveRun {
    Archived(ArchiveOutcome),
    /// The page has no investigation sections left.
    AlreadyArchived,
}

/// Archive every closed investigation, without any status change.
pub async fn one_click_archive<P: PlatformClient>(
    session: &mut WorkflowSession,
    platform: &P,
) -> Result<ArchiveRun, CaseError> {
    session.ops.start("archive");
    let result = run_archive(session, platform).await;
    session.ops.finish("archive", result.is_ok());
    result
}

async fn run_archive<P: PlatformClient>(
    session: &mut WorkflowSession,
    platform: &P,
) -> Result<ArchiveRun, CaseError> {
    let text = platform.fetch_page_text(&session.page_title, None).await?;
    if text.is_empty() {
        return Err(CaseError::PageNotFound(session.page_title.clone()));
    }
    session.document = CaseDocument::parse(text);
    if session.document.investigations().next().is_none() {
        session.progress.done("nothing left to archive");
        return Ok(ArchiveRun::AlreadyArchived);
    }

    let outcome = archive_case(session, platform).await?;
    platform.purge(&session.page_title).await?;
    Ok(ArchiveRun::Archived(outcome))
}

// ── Extraction ──────────────────────────────────────────────────────

/// Parties named in the working section (or the whole page when no
/// section is selected and none exists).
pub async fn extract_case_parties<P: PlatformClient>(
    session: &mut WorkflowSession,
    platform: &P,
) -> Result<ExtractedParties, CaseError> {
    let text = platform.fetch_page_text(&session.page_title, None).await?;
    if text.is_empty() {
        return Err(CaseError::PageNotFound(session.page_title.clone()));
    }
    session.document = CaseDocument::parse(text);

    let scope = match session.working_section() {
        Some(section) => section.full(&session.document.text),
        None => session.document.text.as_str(),
    };
    Ok(extract_parties(scope))
}

// ── Action log ──────────────────────────────────────────────────────

/// Append to the operator's action log, newest entry first. Logging
/// failures are recorded and never abort the plan.
async fn log_action<P: PlatformClient>(
    session: &mut WorkflowSession,
    platform: &P,
    plan: &ActionPlan,
) {
    if !session.settings.log_actions {
        return;
    }
    let Some(page) = session.settings.log_page.clone() else { return };

    let what = if plan.close { "closed" } else { plan.action.as_str() };
    let line = format!(
        "* {} [[{}]]: {what}",
        chrono::Utc::now().format("%Y-%m-%d %H:%M"),
        session.page_title,
    );
    let text = match platform.fetch_page_text(&page, None).await {
        Ok(text) => text,
        Err(err) => {
            session.progress.fail("log action", err.to_string());
            return;
        }
    };
    let new_text = if text.trim().is_empty() {
        format!("{line}\n")
    } else {
        format!("{line}\n{text}")
    };
    match platform.edit_page(&page, &new_text, "Logging case action", &EditOptions::default()).await
    {
        Ok(()) => session.progress.done(format!("logged action to [[{page}]]")),
        Err(err) => session.progress.fail("log action", err.to_string()),
    }
}
