// Block batches and global-lock requests.
//
// Per-target failures are recorded in the progress log and never abort
// the batch; a failed block suppresses its talk notice. A non-checkuser
// operator is not allowed to overwrite an existing checkuser block, so
// those targets are skipped with a warning.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use caseclerk_common::identity::{is_address_form, is_range, normalize};
use caseclerk_common::types::{BlockRequest, GlobalLockRequest, RoleSet};

use crate::error::CaseError;
use crate::platform::{BlockSpec, EditOptions, PlatformClient};
use crate::session::{talk_page, WorkflowSession};

/// Steward queue for global lock requests.
pub const STEWARD_REQUESTS_PAGE: &str = "Steward requests/Global";

fn cu_block_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"(?i)\{\{\s*checkuserblock").unwrap())
}

/// Execute a batch of block requests.
pub async fn apply_blocks<P: PlatformClient>(
    session: &mut WorkflowSession,
    platform: &P,
    requests: &[BlockRequest],
    roles: &RoleSet,
) -> Result<(), CaseError> {
    for request in requests {
        let target = normalize(&request.target);

        if !roles.is_checkuser() {
            if let Some(reason) = platform.block_reason(&target).await? {
                if cu_block_marker().is_match(&reason) {
                    session.progress.warn(
                        format!("block {target}"),
                        "existing checkuser block left in place",
                    );
                    continue;
                }
            }
        }

        let spec = BlockSpec {
            target: target.clone(),
            expiry: request.duration.clone(),
            summary: block_summary(session, &target, request, roles),
            no_account_creation: request.acb,
            autoblock: request.autoblock,
            revoke_talk: request.revoke_talk,
            revoke_email: request.revoke_email,
            reblock: request.reblock,
        };
        if let Err(err) = platform.block_account(&spec).await {
            session.progress.fail(format!("block {target}"), err.to_string());
            continue;
        }
        debug!(%target, expiry = %request.duration, "blocked");
        session.progress.done(format!("blocked {target} ({})", request.duration));

        // Ranges have no talk page worth posting to.
        if request.talk_notice && !is_range(&target) {
            post_talk_notice(session, platform, &target, request).await;
        }
    }
    Ok(())
}

/// Block summary: checkuser markers for checkusers, a plain sockpuppetry
/// rationale otherwise, with the case link unless suppressed.
fn block_summary(
    session: &WorkflowSession,
    target: &str,
    request: &BlockRequest,
    roles: &RoleSet,
) -> String {
    let mut summary = if roles.is_checkuser() {
        if is_address_form(target) {
            "{{checkuserblock}}".to_string()
        } else {
            "{{checkuserblock-account}}".to_string()
        }
    } else if is_range(target) {
        "{{Range block}}".to_string()
    } else {
        "[[Wikipedia:Sockpuppetry|Sock puppetry]]".to_string()
    };
    if !request.suppress_case_link {
        summary.push_str(&format!(": see [[{}]]", session.page_title));
    }
    summary
}

/// Leave the block notice on the target's talk page. Failures are
/// recorded, not raised.
async fn post_talk_notice<P: PlatformClient>(
    session: &mut WorkflowSession,
    platform: &P,
    target: &str,
    request: &BlockRequest,
) {
    let title = talk_page(target);
    let notice = talk_notice_markup(&session.case_name, request);

    let text = if request.blank_talk {
        notice
    } else {
        match platform.fetch_page_text(&title, None).await {
            Ok(existing) if existing.trim().is_empty() => notice,
            Ok(existing) => format!("{}\n\n{notice}", existing.trim_end()),
            Err(err) => {
                session.progress.fail(format!("notify {target}"), err.to_string());
                return;
            }
        }
    };

    let options = EditOptions {
        watch: session.settings.watch_blocked_talk.mode,
        watch_expiry: session.settings.watch_blocked_talk.expiry.clone(),
        ..EditOptions::default()
    };
    match platform.edit_page(&title, &text, "Sockpuppetry block notice", &options).await {
        Ok(()) => session.progress.done(format!("notified [[{title}]]")),
        Err(err) => session.progress.fail(format!("notify {target}"), err.to_string()),
    }
}

fn talk_notice_markup(case_name: &str, request: &BlockRequest) -> String {
    let mut markup = format!("{{{{subst:uw-sockblock|spi={case_name}");
    if request.duration.starts_with("indef") || request.duration.starts_with("infinite") {
        markup.push_str("|indef=yes");
    } else {
        markup.push_str(&format!("|duration={}", request.duration));
    }
    if request.revoke_talk {
        markup.push_str("|notalk=yes");
    }
    markup.push_str("|sig=yes}}");
    markup
}

/// Append a global-lock request to the steward queue.
///
/// Address forms cannot be locked and are dropped with a warning. The
/// request lands before the page's "See also" section when one exists.
pub async fn request_locks<P: PlatformClient>(
    session: &mut WorkflowSession,
    platform: &P,
    requests: &[GlobalLockRequest],
    comment: &str,
) -> Result<(), CaseError> {
    let mut targets: Vec<&GlobalLockRequest> = Vec::new();
    for request in requests {
        let target = normalize(&request.target);
        if is_address_form(&target) {
            session.progress.warn(format!("lock {target}"), "addresses cannot be locked");
            continue;
        }
        targets.push(request);
    }
    if targets.is_empty() {
        return Ok(());
    }

    let block = lock_request_markup(&session.case_name, &targets, comment);
    let text = platform.fetch_page_text(STEWARD_REQUESTS_PAGE, None).await?;
    let new_text = match text.find("== See also ==") {
        Some(at) => format!("{}{block}\n{}", &text[..at], &text[at..]),
        None => format!("{}\n{block}", text.trim_end()),
    };

    platform
        .edit_page(
            STEWARD_REQUESTS_PAGE,
            &new_text,
            &format!("Requesting global locks for sockpuppets of {}", session.case_name),
            &EditOptions::default(),
        )
        .await?;
    session.progress.done(format!("requested {} global lock(s)", targets.len()));
    Ok(())
}

fn lock_request_markup(
    case_name: &str,
    targets: &[&GlobalLockRequest],
    comment: &str,
) -> String {
    let hide = targets.iter().any(|t| t.hide);
    let mut markup = format!("=== Global lock for sockpuppets of {case_name} ===\n");

    if let [single] = targets {
        markup.push_str(&format!("{{{{LockHide|{}", normalize(&single.target)));
        if hide {
            markup.push_str("|hidename=1");
        }
        markup.push_str("}}\n");
    } else {
        markup.push_str("{{MultiLock");
        for target in targets {
            markup.push('|');
            markup.push_str(&normalize(&target.target));
        }
        if hide {
            markup.push_str("|hidename=1");
        }
        markup.push_str("}}\n");
    }

    markup.push_str(comment.trim());
    markup.push_str(" --~~~~\n");
    markup
}
