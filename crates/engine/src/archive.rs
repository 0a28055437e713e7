// Archive orchestrator.
//
// Closed investigations move to `<case>/Archive`:
//   scan → append to archive → blank source section → wait for the
//   revision to advance → rescan from the top.
// The source section is blanked only after the archive write succeeded,
// so a crash can duplicate a section but never lose one. When the
// archive would exceed the platform's rendered-size limit it is first
// relocated to the next numbered slot.

use std::time::Duration;

use tracing::{debug, info};

use caseclerk_common::status::StatusGates;
use caseclerk_common::types::{CaseSection, NoticeParams};
use caseclerk_common::wikitext::{case_status, render_notice, strip_status_template, CaseDocument};

use crate::error::CaseError;
use crate::platform::{EditOptions, PlatformClient, RevisionToken};
use crate::session::WorkflowSession;

// ── Constants ───────────────────────────────────────────────────────

const BASE_DELAY_MS: u64 = 250;
const MAX_DELAY_MS: u64 = 30_000;
const MAX_WAIT_ATTEMPTS: u32 = 8;
/// Hard cap on numbered archive slots probed during rotation.
const MAX_ARCHIVE_SLOTS: usize = 1_000;

/// Exponential backoff delay for a given attempt number (0-based).
pub fn backoff_delay(attempt: u32) -> Duration {
    let exp = attempt.min(7); // cap exponent to avoid overflow
    let delay_ms = BASE_DELAY_MS.saturating_mul(1u64 << exp).min(MAX_DELAY_MS);
    Duration::from_millis(delay_ms)
}

/// What an archive pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveOutcome {
    /// Closed sections moved to the archive.
    pub archived: usize,
    /// Whether a full archive was relocated to a numbered slot.
    pub rotated: bool,
}

/// Archive every closed investigation on the session's case page.
///
/// Each pass re-fetches the page, takes the first closed investigation,
/// archives it, and restarts from the top once the page revision has
/// advanced. A page whose revision fails to advance after a bounded
/// backoff wait fails with `StalledWrite`.
pub async fn archive_case<P: PlatformClient>(
    session: &mut WorkflowSession,
    platform: &P,
) -> Result<ArchiveOutcome, CaseError> {
    if session.is_archive {
        session.progress.warn("archive case", "already on the archive page");
        return Ok(ArchiveOutcome::default());
    }

    let title = session.guard.title().to_string();
    let mut outcome = ArchiveOutcome::default();
    let mut last_seen = session.guard.refresh(platform).await?;

    loop {
        let text = platform.fetch_page_text(&title, None).await?;
        if text.is_empty() {
            return Err(CaseError::PageNotFound(title));
        }
        let doc = CaseDocument::parse(text);
        session.document = doc.clone();

        let closed = doc
            .investigations()
            .find(|section| {
                case_status(section.full(&doc.text))
                    .map(|raw| StatusGates::from_raw(&raw).is_closed)
                    .unwrap_or(false)
            })
            .cloned();
        let Some(section) = closed else { break };

        debug!(section = %section.label, "archiving closed section");
        outcome.rotated |= archive_section(session, platform, &doc, &section).await?;
        outcome.archived += 1;

        last_seen = wait_for_advance(platform, &title, last_seen).await?;
    }

    if outcome.archived > 0 {
        info!(count = outcome.archived, case = %session.case_name, "archived closed sections");
        session.progress.done(format!("archived {} closed section(s)", outcome.archived));
    }
    Ok(outcome)
}

/// Move one closed section to the archive, rotating first when full.
/// Returns whether a rotation happened.
async fn archive_section<P: PlatformClient>(
    session: &mut WorkflowSession,
    platform: &P,
    doc: &CaseDocument,
    section: &CaseSection,
) -> Result<bool, CaseError> {
    let case_title = session.guard.title().to_string();
    let archive_title = session.archive_title();

    let section_usage = platform.rendered_usage(&case_title, Some(section.index)).await?;
    let archive_usage = platform.rendered_usage(&archive_title, None).await?;
    let mut rotated = false;
    if section_usage.limit > 0
        && section_usage.used + archive_usage.used >= section_usage.limit
    {
        rotate_archive(session, platform, &archive_title).await?;
        rotated = true;
    }

    let archive_text = platform.fetch_page_text(&archive_title, None).await?;
    let body = strip_status_template(section.full(&doc.text));
    let body = body.trim_end();
    let new_text = if archive_text.trim().is_empty() {
        format!("{}\n{body}\n", archive_scaffold(session))
    } else {
        format!("{}\n{body}\n", archive_text.trim_end())
    };

    let options = EditOptions {
        watch: session.settings.watch_archive.mode,
        watch_expiry: session.settings.watch_archive.expiry.clone(),
        ..EditOptions::default()
    };
    platform
        .edit_page(
            &archive_title,
            &new_text,
            &format!("Archiving case section from [[{case_title}]]"),
            &options,
        )
        .await?;
    session
        .progress
        .done(format!("archived section \"{}\" to [[{archive_title}]]", section.label));

    // Blank the source only after the archive write landed.
    let options = EditOptions {
        section: Some(section.index),
        watch: session.settings.watch_case.mode,
        watch_expiry: session.settings.watch_case.expiry.clone(),
        ..EditOptions::default()
    };
    session
        .guard
        .write(platform, "", &format!("Archiving to [[{archive_title}]]"), options)
        .await?;

    Ok(rotated)
}

/// Relocate a full archive to the first unused numbered slot.
async fn rotate_archive<P: PlatformClient>(
    session: &mut WorkflowSession,
    platform: &P,
    archive_title: &str,
) -> Result<(), CaseError> {
    if !platform.current_revision(archive_title).await?.exists() {
        // Nothing to rotate; the section alone is over the limit.
        session.progress.warn("rotate archive", "single section exceeds the size limit");
        return Ok(());
    }

    for slot in 1..=MAX_ARCHIVE_SLOTS {
        let candidate = format!("{archive_title}/{slot}");
        if platform.current_revision(&candidate).await?.exists() {
            continue;
        }
        platform
            .move_page(archive_title, &candidate, "Relocating full case archive", false)
            .await?;
        session.progress.done(format!("relocated full archive to [[{candidate}]]"));
        return Ok(());
    }

    Err(CaseError::MalformedMarkup {
        title: archive_title.to_string(),
        detail: "no unused numbered archive slot".into(),
    })
}

/// Scaffolding for a freshly created archive page.
fn archive_scaffold(session: &WorkflowSession) -> String {
    let params = session.notice.clone().unwrap_or_else(|| NoticeParams {
        username: session.case_name.clone(),
        ..NoticeParams::default()
    });
    format!("__TOC__\n{}\n{{{{SPIpriorcases}}}}", render_notice(&params))
}

/// Bounded wait for a page revision to move past `last_seen`.
async fn wait_for_advance<P: PlatformClient>(
    platform: &P,
    title: &str,
    last_seen: RevisionToken,
) -> Result<RevisionToken, CaseError> {
    for attempt in 0..MAX_WAIT_ATTEMPTS {
        let current = platform.current_revision(title).await?;
        if current > last_seen {
            return Ok(current);
        }
        tokio::time::sleep(backoff_delay(attempt)).await;
    }
    Err(CaseError::StalledWrite { title: title.to_string(), attempts: MAX_WAIT_ATTEMPTS })
}
