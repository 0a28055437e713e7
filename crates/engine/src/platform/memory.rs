// In-memory platform double.
//
// Deterministic wiki state behind a mutex: monotonic revision counter,
// section-aware edits, and an ordered log of every mutating call so
// tests can assert sequencing, not just end states. Also usable as a
// dry-run backend.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use caseclerk_common::wikitext::parse_sections;

use crate::error::PlatformError;
use crate::platform::{
    BlockSpec, EditOptions, ExistenceScope, PlatformClient, RenderUsage, RevisionToken,
};

/// One recorded mutating call, in issue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Edit { title: String, section: Option<usize> },
    Move { from: String, to: String },
    Block { target: String },
    Protect { title: String },
    Purge { title: String },
}

#[derive(Debug, Clone, Default)]
struct Page {
    text: String,
    revision: u64,
}

#[derive(Debug, Default)]
struct Inner {
    pages: HashMap<String, Page>,
    next_revision: u64,
    ops: Vec<Op>,
    render_limit: u64,
    rendered_overrides: HashMap<(String, Option<usize>), u64>,
    local_accounts: HashSet<String>,
    global_accounts: HashSet<String>,
    locked: HashSet<String>,
    blocks: HashMap<String, String>,
}

/// Deterministic in-memory wiki.
#[derive(Debug)]
pub struct MemoryPlatform {
    inner: Mutex<Inner>,
}

impl Default for MemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPlatform {
    pub fn new() -> Self {
        let inner = Inner { next_revision: 1, render_limit: 2_097_152, ..Inner::default() };
        Self { inner: Mutex::new(inner) }
    }

    // ── Seeding ────────────────────────────────────────────────────

    pub fn seed_page(&self, title: &str, text: &str) {
        let mut inner = self.inner.lock().unwrap();
        let revision = inner.next_revision;
        inner.next_revision += 1;
        inner.pages.insert(title.to_string(), Page { text: text.to_string(), revision });
    }

    pub fn set_render_limit(&self, limit: u64) {
        self.inner.lock().unwrap().render_limit = limit;
    }

    /// Override the reported rendered size of a page or section.
    pub fn set_rendered_size(&self, title: &str, section: Option<usize>, size: u64) {
        self.inner
            .lock()
            .unwrap()
            .rendered_overrides
            .insert((title.to_string(), section), size);
    }

    pub fn add_account(&self, name: &str, scope: ExistenceScope) {
        let mut inner = self.inner.lock().unwrap();
        match scope {
            ExistenceScope::Local => inner.local_accounts.insert(name.to_string()),
            ExistenceScope::Global => inner.global_accounts.insert(name.to_string()),
        };
    }

    pub fn lock_account(&self, name: &str) {
        self.inner.lock().unwrap().locked.insert(name.to_string());
    }

    pub fn set_block(&self, name: &str, reason: &str) {
        self.inner.lock().unwrap().blocks.insert(name.to_string(), reason.to_string());
    }

    // ── Inspection ─────────────────────────────────────────────────

    pub fn page_text(&self, title: &str) -> Option<String> {
        self.inner.lock().unwrap().pages.get(title).map(|p| p.text.clone())
    }

    pub fn page_exists(&self, title: &str) -> bool {
        self.inner.lock().unwrap().pages.contains_key(title)
    }

    pub fn revision(&self, title: &str) -> u64 {
        self.inner.lock().unwrap().pages.get(title).map(|p| p.revision).unwrap_or(0)
    }

    /// Every mutating call so far, in issue order.
    pub fn ops(&self) -> Vec<Op> {
        self.inner.lock().unwrap().ops.clone()
    }

    /// Edits recorded against `title`.
    pub fn edit_count(&self, title: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .ops
            .iter()
            .filter(|op| matches!(op, Op::Edit { title: t, .. } if t == title))
            .count()
    }
}

impl PlatformClient for MemoryPlatform {
    async fn fetch_page_text(
        &self,
        title: &str,
        section: Option<usize>,
    ) -> Result<String, PlatformError> {
        let inner = self.inner.lock().unwrap();
        let Some(page) = inner.pages.get(title) else {
            return Ok(String::new());
        };
        match section {
            None => Ok(page.text.clone()),
            Some(index) => Ok(parse_sections(&page.text)
                .into_iter()
                .find(|s| s.index == index)
                .map(|s| s.full(&page.text).to_string())
                .unwrap_or_default()),
        }
    }

    async fn edit_page(
        &self,
        title: &str,
        text: &str,
        summary: &str,
        options: &EditOptions,
    ) -> Result<(), PlatformError> {
        let _ = summary;
        let mut inner = self.inner.lock().unwrap();

        let current = inner.pages.get(title).cloned().unwrap_or_default();
        if options.create_only && current.revision != 0 {
            return Err(PlatformError::Protocol(format!("page {title} already exists")));
        }
        if let Some(base) = options.base_revision {
            if base.0 != current.revision {
                return Err(PlatformError::EditConflict { title: title.to_string() });
            }
        }

        let new_text = match options.section {
            None => text.to_string(),
            Some(index) => {
                let sections = parse_sections(&current.text);
                let Some(target) = sections.into_iter().find(|s| s.index == index) else {
                    return Err(PlatformError::Protocol(format!(
                        "page {title} has no section {index}"
                    )));
                };
                let mut spliced = String::with_capacity(current.text.len() + text.len());
                spliced.push_str(&current.text[..target.start]);
                spliced.push_str(text);
                if !text.is_empty() && !text.ends_with('\n') && target.end < current.text.len() {
                    spliced.push('\n');
                }
                spliced.push_str(&current.text[target.end..]);
                spliced
            }
        };

        inner.ops.push(Op::Edit { title: title.to_string(), section: options.section });

        if new_text != current.text || current.revision == 0 {
            let revision = inner.next_revision;
            inner.next_revision += 1;
            inner.pages.insert(title.to_string(), Page { text: new_text, revision });
        }
        Ok(())
    }

    async fn move_page(
        &self,
        from: &str,
        to: &str,
        summary: &str,
        leave_redirect: bool,
    ) -> Result<(), PlatformError> {
        let _ = summary;
        let mut inner = self.inner.lock().unwrap();

        let Some(page) = inner.pages.remove(from) else {
            return Err(PlatformError::Protocol(format!("page {from} does not exist")));
        };
        if inner.pages.contains_key(to) {
            inner.pages.insert(from.to_string(), page);
            return Err(PlatformError::Protocol(format!("page {to} already exists")));
        }

        let revision = inner.next_revision;
        inner.next_revision += 1;
        inner.pages.insert(to.to_string(), Page { text: page.text, revision });

        if leave_redirect {
            let revision = inner.next_revision;
            inner.next_revision += 1;
            inner
                .pages
                .insert(from.to_string(), Page { text: format!("#REDIRECT [[{to}]]"), revision });
        }

        inner.ops.push(Op::Move { from: from.to_string(), to: to.to_string() });
        Ok(())
    }

    async fn block_account(&self, spec: &BlockSpec) -> Result<(), PlatformError> {
        let mut inner = self.inner.lock().unwrap();
        inner.blocks.insert(spec.target.clone(), spec.summary.clone());
        inner.ops.push(Op::Block { target: spec.target.clone() });
        Ok(())
    }

    async fn protect_page(&self, title: &str, summary: &str) -> Result<(), PlatformError> {
        let _ = summary;
        let mut inner = self.inner.lock().unwrap();
        inner.ops.push(Op::Protect { title: title.to_string() });
        Ok(())
    }

    async fn current_revision(&self, title: &str) -> Result<RevisionToken, PlatformError> {
        Ok(RevisionToken(self.revision(title)))
    }

    async fn rendered_usage(
        &self,
        title: &str,
        section: Option<usize>,
    ) -> Result<RenderUsage, PlatformError> {
        let inner = self.inner.lock().unwrap();
        let limit = inner.render_limit;
        if let Some(size) = inner.rendered_overrides.get(&(title.to_string(), section)) {
            return Ok(RenderUsage { used: *size, limit });
        }
        let used = match inner.pages.get(title) {
            None => 0,
            Some(page) => match section {
                None => page.text.len() as u64,
                Some(index) => parse_sections(&page.text)
                    .into_iter()
                    .find(|s| s.index == index)
                    .map(|s| s.full(&page.text).len() as u64)
                    .unwrap_or(0),
            },
        };
        Ok(RenderUsage { used, limit })
    }

    async fn account_exists(
        &self,
        name: &str,
        scope: ExistenceScope,
    ) -> Result<bool, PlatformError> {
        let inner = self.inner.lock().unwrap();
        Ok(match scope {
            ExistenceScope::Local => inner.local_accounts.contains(name),
            ExistenceScope::Global => inner.global_accounts.contains(name),
        })
    }

    async fn is_locked(&self, name: &str) -> Result<bool, PlatformError> {
        Ok(self.inner.lock().unwrap().locked.contains(name))
    }

    async fn block_reason(&self, name: &str) -> Result<Option<String>, PlatformError> {
        Ok(self.inner.lock().unwrap().blocks.get(name).cloned())
    }

    async fn backlinks(&self, title: &str) -> Result<Vec<String>, PlatformError> {
        let inner = self.inner.lock().unwrap();
        let needle = format!("[[{title}");
        let mut titles: Vec<String> = inner
            .pages
            .iter()
            .filter(|(t, page)| *t != title && page.text.contains(&needle))
            .map(|(t, _)| t.clone())
            .collect();
        titles.sort();
        Ok(titles)
    }

    async fn purge(&self, title: &str) -> Result<(), PlatformError> {
        self.inner.lock().unwrap().ops.push(Op::Purge { title: title.to_string() });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_page_reads_as_empty() {
        let platform = MemoryPlatform::new();
        assert_eq!(platform.fetch_page_text("Nope", None).await.unwrap(), "");
        assert_eq!(platform.current_revision("Nope").await.unwrap(), RevisionToken::NONE);
    }

    #[tokio::test]
    async fn stale_base_revision_is_rejected_without_changes() {
        let platform = MemoryPlatform::new();
        platform.seed_page("Page", "original");
        let live = platform.revision("Page");

        let options = EditOptions {
            base_revision: Some(RevisionToken(live + 5)),
            ..EditOptions::default()
        };
        let err = platform.edit_page("Page", "clobbered", "s", &options).await.unwrap_err();

        assert!(matches!(err, PlatformError::EditConflict { .. }));
        assert_eq!(platform.page_text("Page").as_deref(), Some("original"));
        assert_eq!(platform.revision("Page"), live);
        assert!(platform.ops().is_empty());
    }

    #[tokio::test]
    async fn matching_base_revision_writes_and_advances() {
        let platform = MemoryPlatform::new();
        platform.seed_page("Page", "original");
        let live = platform.revision("Page");

        let options =
            EditOptions { base_revision: Some(RevisionToken(live)), ..EditOptions::default() };
        platform.edit_page("Page", "updated", "s", &options).await.unwrap();

        assert_eq!(platform.page_text("Page").as_deref(), Some("updated"));
        assert!(platform.revision("Page") > live);
    }

    #[tokio::test]
    async fn empty_section_write_removes_the_section() {
        let platform = MemoryPlatform::new();
        platform.seed_page("Page", "intro\n===One===\nbody\n===Two===\nrest\n");

        let options = EditOptions { section: Some(1), ..EditOptions::default() };
        platform.edit_page("Page", "", "s", &options).await.unwrap();

        assert_eq!(platform.page_text("Page").as_deref(), Some("intro\n===Two===\nrest\n"));
    }

    #[tokio::test]
    async fn section_write_replaces_only_that_span() {
        let platform = MemoryPlatform::new();
        platform.seed_page("Page", "intro\n===One===\nbody\n===Two===\nrest\n");

        let options = EditOptions { section: Some(2), ..EditOptions::default() };
        platform.edit_page("Page", "===Two===\nnew rest\n", "s", &options).await.unwrap();

        assert_eq!(
            platform.page_text("Page").as_deref(),
            Some("intro\n===One===\nbody\n===Two===\nnew rest\n")
        );
    }

    #[tokio::test]
    async fn create_only_refuses_existing_page() {
        let platform = MemoryPlatform::new();
        platform.seed_page("Page", "text");

        let options = EditOptions { create_only: true, ..EditOptions::default() };
        let err = platform.edit_page("Page", "other", "s", &options).await.unwrap_err();
        assert!(matches!(err, PlatformError::Protocol(_)));
    }

    #[tokio::test]
    async fn move_refuses_occupied_destination() {
        let platform = MemoryPlatform::new();
        platform.seed_page("A", "a");
        platform.seed_page("B", "b");

        let err = platform.move_page("A", "B", "s", false).await.unwrap_err();
        assert!(matches!(err, PlatformError::Protocol(_)));
        assert_eq!(platform.page_text("A").as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn move_without_redirect_clears_the_source() {
        let platform = MemoryPlatform::new();
        platform.seed_page("A", "a");

        platform.move_page("A", "B", "s", false).await.unwrap();
        assert!(!platform.page_exists("A"));
        assert_eq!(platform.page_text("B").as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn ops_record_issue_order() {
        let platform = MemoryPlatform::new();
        platform.seed_page("A", "a");

        platform.edit_page("A", "a2", "s", &EditOptions::default()).await.unwrap();
        platform.move_page("A", "B", "s", false).await.unwrap();
        platform.purge("B").await.unwrap();

        assert_eq!(
            platform.ops(),
            vec![
                Op::Edit { title: "A".into(), section: None },
                Op::Move { from: "A".into(), to: "B".into() },
                Op::Purge { title: "B".into() },
            ]
        );
    }
}
