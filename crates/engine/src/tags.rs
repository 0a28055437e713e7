// Sockpuppetry tagging: user-page tag markup, classification
// categories, and the post-tag purge.
//
// The case master is computed from the whole request batch before any
// write. Address forms are never tagged. One target's failure is
// recorded and never aborts the batch; categories are created and pages
// purged only after every tag write has completed.

use std::collections::HashSet;

use tracing::debug;

use caseclerk_common::identity::{is_address_form, normalize};
use caseclerk_common::types::{BlockRequest, MasterTag, RoleSet, SockTag, TagRequest};

use crate::error::{CaseError, PlatformError};
use crate::platform::{EditOptions, ExistenceScope, PlatformClient};
use crate::session::{user_page, WorkflowSession};

/// Apply a batch of tag requests to their user pages.
///
/// `queued_blocks` is the block batch planned alongside; accounts in it
/// are not marked `notblocked` even though their block has not landed
/// yet.
pub async fn apply_tags<P: PlatformClient>(
    session: &mut WorkflowSession,
    platform: &P,
    requests: &[TagRequest],
    roles: &RoleSet,
    queued_blocks: &[BlockRequest],
) -> Result<(), CaseError> {
    // Master detection joins over the full batch before the first write.
    let master = requests
        .iter()
        .find(|r| r.master.is_some())
        .map(|r| normalize(&r.target))
        .unwrap_or_else(|| normalize(&session.case_name));
    let blocking: HashSet<String> =
        queued_blocks.iter().map(|b| normalize(&b.target)).collect();

    let mut tagged: Vec<String> = Vec::new();
    let mut categories: HashSet<(String, bool)> = HashSet::new();

    for request in requests {
        let target = normalize(&request.target);
        if is_address_form(&target) {
            session.progress.warn(
                format!("tag {target}"),
                "address forms are never tagged",
            );
            continue;
        }

        let local = platform.account_exists(&target, ExistenceScope::Local).await?;
        let global =
            local || platform.account_exists(&target, ExistenceScope::Global).await?;
        if !global {
            session.progress.warn(format!("tag {target}"), "account does not exist");
            continue;
        }
        if !local && session.settings.only_tag_attached {
            session.progress.warn(format!("tag {target}"), "account is not locally attached");
            continue;
        }

        let locked = platform.is_locked(&target).await?;
        let not_blocked =
            !blocking.contains(&target) && platform.block_reason(&target).await?.is_none();
        let markup = tag_markup(request, &master, locked, not_blocked);

        let options = EditOptions {
            watch: session.settings.watch_tagged_user.mode,
            watch_expiry: session.settings.watch_tagged_user.expiry.clone(),
            ..EditOptions::default()
        };
        let page = user_page(&target);
        if let Err(err) = platform
            .edit_page(&page, &markup, "Adding sockpuppetry tag", &options)
            .await
        {
            session.progress.fail(format!("tag {target}"), err.to_string());
            continue;
        }
        session.progress.done(format!("tagged [[{page}]]"));
        tagged.push(target.clone());

        if let Some(tag) = request.sock {
            categories.insert((master.clone(), tag == SockTag::Suspected));
        }
        if let (Some(alt), Some(tag)) = (&request.altmaster, request.altmaster_tag) {
            categories.insert((normalize(alt), tag == SockTag::Suspected));
        }

        if session.settings.protect_tagged && roles.is_admin() {
            if let Err(err) = platform.protect_page(&page, "Sockpuppetry tag").await {
                session.progress.fail(format!("protect {page}"), err.to_string());
            }
        }
    }

    // Categories and purges wait for the whole tag batch.
    for (cat_master, suspected) in categories {
        ensure_category(session, platform, &cat_master, suspected).await?;
    }
    for target in &tagged {
        platform.purge(&user_page(target)).await?;
    }
    Ok(())
}

/// Lazily create the classification category for a master.
async fn ensure_category<P: PlatformClient>(
    session: &mut WorkflowSession,
    platform: &P,
    master: &str,
    suspected: bool,
) -> Result<(), CaseError> {
    let title = if suspected {
        format!("Category:Suspected Wikipedia sockpuppets of {master}")
    } else {
        format!("Category:Wikipedia sockpuppets of {master}")
    };
    if platform.current_revision(&title).await?.exists() {
        return Ok(());
    }

    let options = EditOptions { create_only: true, ..EditOptions::default() };
    match platform
        .edit_page(&title, "{{sockpuppet category}}", "Creating sockpuppet category", &options)
        .await
    {
        Ok(()) => {
            debug!(category = %title, "created classification category");
            session.progress.done(format!("created [[{title}]]"));
            Ok(())
        }
        // A concurrent creation is fine; create-only lost the race.
        Err(PlatformError::Protocol(message)) if message.contains("exists") => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Compose the user-page markup for one tag request.
fn tag_markup(request: &TagRequest, master: &str, locked: bool, not_blocked: bool) -> String {
    let mut blocks: Vec<String> = Vec::new();

    if let Some(tag) = request.master {
        let (argument, checked) = match tag {
            MasterTag::Blocked => ("blocked", false),
            MasterTag::Checked => ("blocked", true),
            MasterTag::Banned => ("banned", true),
        };
        let mut markup = format!("{{{{Sockpuppeteer\n| 1 = {argument}\n");
        if checked {
            markup.push_str("| checked = yes\n");
        }
        markup.push_str("}}");
        blocks.push(markup);
    }

    if let Some(tag) = request.sock {
        blocks.push(sock_markup(master, tag, locked, not_blocked));
    }
    if let (Some(alt), Some(tag)) = (&request.altmaster, request.altmaster_tag) {
        blocks.push(sock_markup(&normalize(alt), tag, locked, not_blocked));
    }

    let mut out = blocks.join("\n");
    out.push('\n');
    out
}

fn sock_markup(master: &str, tag: SockTag, locked: bool, not_blocked: bool) -> String {
    let mut markup = format!("{{{{Sockpuppet\n| 1 = {master}\n| 2 = {}\n", tag.as_str());
    if locked {
        markup.push_str("| locked = yes\n");
    }
    if not_blocked {
        markup.push_str("| notblocked = yes\n");
    }
    markup.push_str("}}");
    markup
}
