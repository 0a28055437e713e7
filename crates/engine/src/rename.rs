// Case renames, merges, and single-section moves.
//
// A whole-case move either relocates the pages (empty destination) or
// merges into the existing destination. When both sides already carry
// archives the merge aborts with `AmbiguousMerge` before touching
// anything; archives are never overwritten. Cleanup re-points archive
// notices across the backlink graph.

use std::collections::{HashSet, VecDeque};

use tracing::{debug, info};

use caseclerk_common::identity::normalize;
use caseclerk_common::types::NoticeParams;
use caseclerk_common::wikitext::{
    find_template, render_notice, CaseDocument, NOTICE_TEMPLATE, PRIOR_CASES_TEMPLATE,
};

use crate::error::CaseError;
use crate::platform::{EditOptions, PlatformClient};
use crate::session::{archive_page, case_page, WorkflowSession, CASE_PREFIX};

/// How a whole-case move was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameOutcome {
    /// Destination was free; pages were moved.
    Moved,
    /// Destination existed; content was merged into it.
    Merged,
}

/// Rename the session's case to `new_name`, merging when the destination
/// case already exists.
pub async fn move_case<P: PlatformClient>(
    session: &mut WorkflowSession,
    platform: &P,
    new_name: &str,
    reason: &str,
    graft_old_name: bool,
) -> Result<RenameOutcome, CaseError> {
    let old_name = session.case_name.clone();
    let source = session.page_title.clone();
    let destination = case_page(new_name);

    let destination_text = platform.fetch_page_text(&destination, None).await?;
    let outcome = if destination_text.trim().is_empty() {
        platform.move_page(&source, &destination, reason, true).await?;
        session.progress.done(format!("moved [[{source}]] to [[{destination}]]"));

        let source_archive = archive_page(&old_name);
        if platform.current_revision(&source_archive).await?.exists() {
            let destination_archive = archive_page(new_name);
            platform.move_page(&source_archive, &destination_archive, reason, true).await?;
            session.progress.done(format!("moved archive to [[{destination_archive}]]"));
        }
        RenameOutcome::Moved
    } else {
        merge_case(session, platform, &old_name, new_name, reason, &destination_text).await?
    };

    session.case_name = new_name.to_string();
    session.page_title = destination.clone();
    session.guard.retitle(&destination);
    session.guard.refresh(platform).await?;

    cleanup_after_rename(session, platform, &old_name, new_name, graft_old_name).await?;
    info!(from = %old_name, to = %new_name, ?outcome, "case renamed");
    Ok(outcome)
}

/// Merge the source case into an existing destination case.
async fn merge_case<P: PlatformClient>(
    session: &mut WorkflowSession,
    platform: &P,
    old_name: &str,
    new_name: &str,
    reason: &str,
    destination_text: &str,
) -> Result<RenameOutcome, CaseError> {
    let source = session.page_title.clone();
    let destination = case_page(new_name);
    let source_archive = archive_page(old_name);
    let destination_archive = archive_page(new_name);

    // All existence checks happen before the first write.
    let source_archive_text = platform.fetch_page_text(&source_archive, None).await?;
    let destination_archive_text = platform.fetch_page_text(&destination_archive, None).await?;
    if !source_archive_text.trim().is_empty() && !destination_archive_text.trim().is_empty() {
        session.progress.warn(
            format!("merge into [[{destination}]]"),
            "both cases carry archives; merge them manually first",
        );
        return Err(CaseError::AmbiguousMerge {
            source_archive,
            destination_archive,
        });
    }

    let source_text = platform.fetch_page_text(&source, None).await?;
    if source_text.is_empty() {
        return Err(CaseError::PageNotFound(source));
    }

    if !source_archive_text.trim().is_empty() {
        platform.move_page(&source_archive, &destination_archive, reason, true).await?;
        session.progress.done(format!("moved archive to [[{destination_archive}]]"));
    }

    let remainder = strip_case_scaffold(&source_text);
    let merged = format!("{}\n{}\n", destination_text.trim_end(), remainder.trim());
    let options = EditOptions {
        watch: session.settings.watch_case.mode,
        watch_expiry: session.settings.watch_case.expiry.clone(),
        ..EditOptions::default()
    };
    platform
        .edit_page(&destination, &merged, &format!("Merging [[{source}]]: {reason}"), &options)
        .await?;

    platform
        .edit_page(
            &source,
            &format!("#REDIRECT [[{destination}]]"),
            &format!("Merged to [[{destination}]]"),
            &EditOptions::default(),
        )
        .await?;
    session.progress.done(format!("merged [[{source}]] into [[{destination}]]"));
    Ok(RenameOutcome::Merged)
}

/// Drop the case scaffold (TOC marker, archive notice, prior-cases
/// marker) from a page body, leaving the investigations.
fn strip_case_scaffold(text: &str) -> String {
    let mut out = text.to_string();
    for name in [NOTICE_TEMPLATE, PRIOR_CASES_TEMPLATE] {
        if let Some(template) = find_template(&out, name) {
            let mut end = template.end;
            if out[end..].starts_with('\n') {
                end += 1;
            }
            out.replace_range(template.start..end, "");
        }
    }
    out.lines()
        .filter(|line| {
            let trimmed = line.trim();
            trimmed != "__TOC__" && trimmed != "<noinclude>__TOC__</noinclude>"
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Re-point notices across the backlink graph and fix up the
/// destination page after a rename.
async fn cleanup_after_rename<P: PlatformClient>(
    session: &mut WorkflowSession,
    platform: &P,
    old_name: &str,
    new_name: &str,
    graft_old_name: bool,
) -> Result<(), CaseError> {
    let old_title = case_page(old_name);
    let old_norm = normalize(old_name);

    // Breadth-first over backlinks; renames can chain through pages that
    // themselves link onward.
    let mut queue: VecDeque<String> = platform.backlinks(&old_title).await?.into();
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(session.page_title.clone());

    while let Some(title) = queue.pop_front() {
        if !visited.insert(title.clone()) || !title.starts_with(CASE_PREFIX) {
            continue;
        }
        let text = platform.fetch_page_text(&title, None).await?;
        if text.is_empty() {
            continue;
        }
        let doc = CaseDocument::parse(text);
        let Some((template, params)) = doc.notice() else { continue };
        if normalize(&params.username) != old_norm {
            continue;
        }

        let mut updated = params;
        updated.username = new_name.to_string();
        let mut new_text = doc.text.clone();
        new_text.replace_range(template.start..template.end, &render_notice(&updated));
        platform
            .edit_page(
                &title,
                &new_text,
                &format!("Updating archive notice after rename to [[{}]]", case_page(new_name)),
                &EditOptions::default(),
            )
            .await?;
        debug!(page = %title, "re-pointed archive notice");
        session.progress.done(format!("updated notice on [[{title}]]"));

        for link in platform.backlinks(&title).await? {
            if !visited.contains(&link) {
                queue.push_back(link);
            }
        }
    }

    fix_destination_page(session, platform, old_name, new_name, graft_old_name).await
}

/// Rewrite the destination's own notice, graft the old identity into the
/// sock list when asked, and drop self-referential entries.
async fn fix_destination_page<P: PlatformClient>(
    session: &mut WorkflowSession,
    platform: &P,
    old_name: &str,
    new_name: &str,
    graft_old_name: bool,
) -> Result<(), CaseError> {
    let title = session.page_title.clone();
    let text = platform.fetch_page_text(&title, None).await?;
    if text.is_empty() {
        return Err(CaseError::PageNotFound(title));
    }
    let doc = CaseDocument::parse(text);
    let mut new_text = doc.text.clone();
    let mut changed = false;

    if let Some((template, params)) = doc.notice() {
        if normalize(&params.username) != normalize(new_name) {
            let mut updated = params;
            updated.username = new_name.to_string();
            new_text.replace_range(template.start..template.end, &render_notice(&updated));
            changed = true;
        }
    }

    // Sock-list fixups work on the rewritten text; spans may have moved.
    let doc = CaseDocument::parse(new_text);
    let mut new_text = doc.text.clone();
    if let Some(section) =
        doc.sections.iter().find(|s| s.level == 4 && s.label.eq_ignore_ascii_case("Suspected sockpuppets"))
    {
        let body = section.body(&doc.text).to_string();
        let mut lines: Vec<&str> = body.lines().collect();
        let before = lines.len();
        lines.retain(|line| !mentions_party(line, new_name));
        let mut new_body = lines.join("\n");
        if graft_old_name {
            let graft = format!(
                "* {{{{checkuser|1={old_name}|bullet=no}}}} ({{{{clerknote}}}} original case name)"
            );
            if !new_body.is_empty() && !new_body.ends_with('\n') {
                new_body.push('\n');
            }
            new_body.push_str(&graft);
            new_body.push('\n');
        } else if lines.len() != before && !new_body.is_empty() && !new_body.ends_with('\n') {
            new_body.push('\n');
        }
        if new_body != body {
            new_text.replace_range(section.body_start..section.end, &new_body);
            changed = true;
        }
    }

    if changed {
        session
            .guard
            .write(
                platform,
                &new_text,
                "Updating case page after rename",
                EditOptions {
                    watch: session.settings.watch_case.mode,
                    watch_expiry: session.settings.watch_case.expiry.clone(),
                    ..EditOptions::default()
                },
            )
            .await?;
        session.progress.done(format!("updated [[{title}]] after rename"));
    }

    let refreshed = platform.fetch_page_text(&title, None).await?;
    session.document = CaseDocument::parse(refreshed);
    Ok(())
}

/// Whether a sock-list line names `party` via a checkuser-style template.
fn mentions_party(line: &str, party: &str) -> bool {
    find_template(line, "checkuser")
        .and_then(|t| t.pos(1).map(|v| normalize(v) == normalize(party)))
        .unwrap_or(false)
}

/// Move one investigation section to another case, creating the
/// destination with default scaffolding when absent. The source section
/// is blanked only after the destination write has completed.
pub async fn move_case_section<P: PlatformClient>(
    session: &mut WorkflowSession,
    platform: &P,
    section_index: usize,
    new_name: &str,
    reason: &str,
) -> Result<(), CaseError> {
    if !session.settings.allow_section_moves {
        return Err(CaseError::PermissionMismatch {
            action: "section move".into(),
            status: "disabled in settings".into(),
        });
    }

    let source = session.page_title.clone();
    let text = platform.fetch_page_text(&source, None).await?;
    if text.is_empty() {
        return Err(CaseError::PageNotFound(source));
    }
    let doc = CaseDocument::parse(text);
    let Some(section) = doc.section(section_index).cloned() else {
        return Err(CaseError::MalformedMarkup {
            title: source,
            detail: format!("no section with index {section_index}"),
        });
    };

    let destination = case_page(new_name);
    let destination_text = platform.fetch_page_text(&destination, None).await?;
    let section_text = section.full(&doc.text).trim_end();
    let new_destination = if destination_text.trim().is_empty() {
        let notice = render_notice(&NoticeParams {
            username: new_name.to_string(),
            ..NoticeParams::default()
        });
        format!(
            "<noinclude>__TOC__</noinclude>\n{notice}\n{{{{SPIpriorcases}}}}\n{section_text}\n"
        )
    } else {
        format!("{}\n{section_text}\n", destination_text.trim_end())
    };

    // Destination first; the source section is only blanked afterwards.
    platform
        .edit_page(
            &destination,
            &new_destination,
            &format!("Moving case section from [[{source}]]: {reason}"),
            &EditOptions::default(),
        )
        .await?;

    session
        .guard
        .write(
            platform,
            "",
            &format!("Moving section to [[{destination}]]: {reason}"),
            EditOptions { section: Some(section.index), ..EditOptions::default() },
        )
        .await?;

    session.progress.done(format!(
        "moved section \"{}\" to [[{destination}]]",
        section.label
    ));
    let refreshed = platform.fetch_page_text(session.guard.title(), None).await?;
    session.document = CaseDocument::parse(refreshed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaffold_stripping_leaves_investigations() {
        let text = "<noinclude>__TOC__</noinclude>\n{{SPI archive notice|1=Foo}}\n{{SPIpriorcases}}\n===19 August 2026===\nbody\n";
        let stripped = strip_case_scaffold(text);
        assert_eq!(stripped.trim(), "===19 August 2026===\nbody");
    }

    #[test]
    fn scaffold_stripping_handles_bare_toc() {
        let stripped = strip_case_scaffold("__TOC__\n===Sec===\nbody\n");
        assert_eq!(stripped.trim(), "===Sec===\nbody");
    }

    #[test]
    fn party_mention_matches_normalized_names() {
        assert!(mentions_party("* {{checkuser|1=foo_bar}}", "Foo bar"));
        assert!(!mentions_party("* {{checkuser|1=Other}}", "Foo bar"));
        assert!(!mentions_party("plain text Foo bar", "Foo bar"));
    }
}
