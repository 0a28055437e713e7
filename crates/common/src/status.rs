// Case status state machine.
//
// Statuses are carried as raw strings on the wire (the status tag's first
// argument); gates and offers are pure functions of that raw value plus
// the operator's roles. A closed case offers reopening and nothing else.

use serde::{Deserialize, Serialize};

use crate::types::RoleSet;

// ── Gates ───────────────────────────────────────────────────────────

/// Boolean gates derived from a raw status argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusGates {
    /// The investigation is closed and awaiting archive.
    pub is_closed: bool,
    /// A checkuser request may still be opened from here.
    pub can_request_cu: bool,
    /// A checkuser request is pending.
    pub cu_requested: bool,
    /// The pending request has been clerk-endorsed.
    pub cu_endorsed: bool,
    /// A check has run (or been declined) and clerk work remains.
    pub cu_completed: bool,
}

impl StatusGates {
    pub fn from_raw(raw: &str) -> Self {
        let status = raw.trim().to_lowercase();
        let is = |set: &[&str]| set.contains(&status.as_str());

        Self {
            is_closed: status == "close" || status == "closed",
            can_request_cu: status.is_empty()
                || is(&["open", "admin", "clerk", "moreinfo", "cumoreinfo", "hold", "cuhold"]),
            cu_requested: is(&["cu", "checkuser", "curequest", "request", "cumoreinfo"]),
            cu_endorsed: is(&["endorse", "endorsed"]),
            cu_completed: is(&[
                "inprogress",
                "checking",
                "relist",
                "relisted",
                "checked",
                "completed",
                "decline",
                "declined",
                "cudecline",
                "cudeclined",
            ]),
        }
    }
}

// ── Actions ─────────────────────────────────────────────────────────

/// A status transition (or assist marker) an operator may apply.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CaseAction {
    /// Leave the status untouched.
    NoAction,
    /// Reopen a closed investigation.
    Reopen,
    /// Take an admin- or clerk-flagged case back to open.
    Open,
    InProgress,
    MoreInfo,
    CuRequest,
    /// Request and endorse in one step (clerks only).
    SelfEndorse,
    /// Defer the request to a conduct investigation.
    ConDefer,
    Endorse,
    CuEndorse,
    Decline,
    CuDecline,
    CuMoreInfo,
    Checked,
    Relist,
    Hold,
    CuHold,
    /// Flag the case for clerk attention.
    ClerkAssist,
    /// Flag the case for admin attention.
    AdminAssist,
}

impl CaseAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoAction => "no_action",
            Self::Reopen => "reopen",
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::MoreInfo => "more_info",
            Self::CuRequest => "cu_request",
            Self::SelfEndorse => "self_endorse",
            Self::ConDefer => "condefer",
            Self::Endorse => "endorse",
            Self::CuEndorse => "cu_endorse",
            Self::Decline => "decline",
            Self::CuDecline => "cu_decline",
            Self::CuMoreInfo => "cu_more_info",
            Self::Checked => "checked",
            Self::Relist => "relist",
            Self::Hold => "hold",
            Self::CuHold => "cu_hold",
            Self::ClerkAssist => "clerk_assist",
            Self::AdminAssist => "admin_assist",
        }
    }

    /// Argument written into the status tag, `None` for the no-op.
    pub fn status_argument(self) -> Option<&'static str> {
        match self {
            Self::NoAction => None,
            Self::Reopen | Self::Open => Some("open"),
            Self::InProgress => Some("inprogress"),
            Self::MoreInfo => Some("moreinfo"),
            Self::CuRequest => Some("CUrequest"),
            Self::SelfEndorse | Self::Endorse => Some("endorse"),
            Self::ConDefer => Some("condefer"),
            Self::CuEndorse => Some("cuendorse"),
            Self::Decline => Some("decline"),
            Self::CuDecline => Some("cudecline"),
            Self::CuMoreInfo => Some("cumoreinfo"),
            Self::Checked => Some("checked"),
            Self::Relist => Some("relist"),
            Self::Hold => Some("hold"),
            Self::CuHold => Some("cuhold"),
            Self::ClerkAssist => Some("clerk"),
            Self::AdminAssist => Some("admin"),
        }
    }

    /// Static template token prefixed to the composed comment.
    pub fn comment_token(self) -> Option<&'static str> {
        match self {
            Self::CuRequest => Some("{{CURequest}}"),
            Self::SelfEndorse => Some("{{Requestandendorse}}"),
            Self::InProgress => Some("{{Inprogress}}"),
            Self::Endorse => Some("{{Endorse}}"),
            Self::CuEndorse => Some("{{cu-endorsed}}"),
            Self::Decline => Some("{{Clerkdecline}}"),
            Self::CuDecline => Some("{{Cudecline}}"),
            Self::MoreInfo | Self::CuMoreInfo => Some("{{moreinfo}}"),
            Self::Relist => Some("{{relisted}}"),
            Self::Hold | Self::CuHold => Some("{{onhold}}"),
            Self::ClerkAssist => Some("{{Clerk Request}}"),
            Self::AdminAssist => Some("{{awaitingadmin}}"),
            _ => None,
        }
    }

    /// Fixed edit-summary fragment for the action.
    pub fn summary(self) -> &'static str {
        match self {
            Self::NoAction => "Commenting on case",
            Self::Reopen => "Reopening case",
            Self::Open => "Reverting case to open",
            Self::InProgress => "Marking check as in progress",
            Self::MoreInfo => "Requesting more information",
            Self::CuRequest => "Requesting checkuser attention",
            Self::SelfEndorse => "Requesting checkuser attention and self-endorsing",
            Self::ConDefer => "Deferring checkuser request to conduct investigation",
            Self::Endorse => "Endorsing checkuser request",
            Self::CuEndorse => "Endorsing checkuser request as a checkuser",
            Self::Decline => "Declining checkuser request",
            Self::CuDecline => "Declining checkuser request as a checkuser",
            Self::CuMoreInfo => "Requesting more information before a check",
            Self::Checked => "Marking case as checked",
            Self::Relist => "Relisting case for another check",
            Self::Hold => "Placing case on hold",
            Self::CuHold => "Placing checkuser request on hold",
            Self::ClerkAssist => "Requesting clerk attention",
            Self::AdminAssist => "Requesting administrator attention",
        }
    }
}

/// Actions an operator with `roles` may apply to a case at `raw` status.
///
/// Pure function of its inputs; the no-op is always offered first. A
/// closed case offers reopening and nothing else.
pub fn offered_actions(raw: &str, roles: &RoleSet) -> Vec<CaseAction> {
    let status = raw.trim().to_lowercase();
    let gates = StatusGates::from_raw(raw);
    let mut actions = vec![CaseAction::NoAction];

    if gates.is_closed {
        actions.push(CaseAction::Reopen);
        return actions;
    }

    if (roles.is_clerk() && status == "clerk") || (roles.is_admin() && status == "admin") {
        actions.push(CaseAction::Open);
    }
    if roles.is_checkuser() {
        actions.push(CaseAction::InProgress);
    }
    if roles.is_clerk() || roles.is_admin() {
        actions.push(CaseAction::MoreInfo);
    }

    if gates.can_request_cu {
        actions.push(CaseAction::CuRequest);
        if roles.is_clerk() {
            actions.push(CaseAction::SelfEndorse);
        }
    }

    if gates.cu_requested {
        actions.push(CaseAction::ConDefer);
        if roles.is_clerk() {
            actions.push(CaseAction::Endorse);
            if roles.is_checkuser() {
                actions.push(CaseAction::CuEndorse);
                actions.push(CaseAction::CuDecline);
            }
            actions.push(CaseAction::Decline);
            actions.push(CaseAction::CuMoreInfo);
        }
    } else if gates.cu_endorsed && roles.is_checkuser() {
        actions.push(CaseAction::CuDecline);
        actions.push(CaseAction::CuMoreInfo);
    }

    if roles.is_clerk() || roles.is_admin() {
        actions.push(CaseAction::Checked);
    }
    if roles.is_clerk() && gates.cu_completed {
        actions.push(CaseAction::Relist);
    }
    if roles.is_checkuser() {
        actions.push(CaseAction::CuHold);
    }

    actions.push(CaseAction::Hold);
    actions.push(CaseAction::ClerkAssist);
    if roles.is_clerk() && !roles.is_admin() {
        actions.push(CaseAction::AdminAssist);
    }

    actions
}
