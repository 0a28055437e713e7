// Conflict-safe writes to the primary case page.
//
// Every mutation of the case document goes through an `EditGuard` keyed
// on the last observed revision. The platform rejects the write when the
// live revision differs; the guard surfaces that as `CaseError::
// EditConflict` and never retries. Secondary pages (talk pages,
// categories, archives, backlinks) are written unguarded.

use tracing::debug;

use crate::error::{CaseError, PlatformError};
use crate::platform::{EditOptions, PlatformClient, RevisionToken};

/// Revision-keyed write handle for one page.
#[derive(Debug, Clone)]
pub struct EditGuard {
    title: String,
    base: RevisionToken,
}

impl EditGuard {
    /// Observe the page's current revision and key the guard on it.
    pub async fn acquire<P: PlatformClient>(
        platform: &P,
        title: impl Into<String>,
    ) -> Result<Self, CaseError> {
        let title = title.into();
        let base = platform.current_revision(&title).await?;
        Ok(Self { title, base })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// The revision this guard will write against.
    pub fn base(&self) -> RevisionToken {
        self.base
    }

    /// Guarded write. Fails with `CaseError::EditConflict` when the live
    /// revision has moved past `base`; on success the guard re-keys
    /// itself on the new revision.
    pub async fn write<P: PlatformClient>(
        &mut self,
        platform: &P,
        text: &str,
        summary: &str,
        mut options: EditOptions,
    ) -> Result<(), CaseError> {
        options.base_revision = Some(self.base);
        match platform.edit_page(&self.title, text, summary, &options).await {
            Ok(()) => {
                self.base = platform.current_revision(&self.title).await?;
                debug!(title = %self.title, base = %self.base, "guarded write applied");
                Ok(())
            }
            Err(PlatformError::EditConflict { .. }) => {
                Err(CaseError::EditConflict { title: self.title.clone(), base: self.base.0 })
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Re-observe the live revision (after out-of-band changes such as a
    /// page move).
    pub async fn refresh<P: PlatformClient>(
        &mut self,
        platform: &P,
    ) -> Result<RevisionToken, CaseError> {
        self.base = platform.current_revision(&self.title).await?;
        Ok(self.base)
    }

    /// Re-point the guard after the page was renamed.
    pub fn retitle(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::memory::MemoryPlatform;

    #[tokio::test]
    async fn guarded_write_refreshes_base() {
        let platform = MemoryPlatform::new();
        platform.seed_page("Case", "v1");

        let mut guard = EditGuard::acquire(&platform, "Case").await.unwrap();
        let before = guard.base();
        guard.write(&platform, "v2", "s", EditOptions::default()).await.unwrap();

        assert!(guard.base() > before);
        assert_eq!(platform.page_text("Case").as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn stale_guard_surfaces_conflict_and_keeps_content() {
        let platform = MemoryPlatform::new();
        platform.seed_page("Case", "v1");

        let mut guard = EditGuard::acquire(&platform, "Case").await.unwrap();
        // Another editor lands a write after the guard was keyed.
        platform.edit_page("Case", "theirs", "s", &EditOptions::default()).await.unwrap();

        let err = guard.write(&platform, "mine", "s", EditOptions::default()).await.unwrap_err();
        assert!(matches!(err, CaseError::EditConflict { .. }));
        assert_eq!(platform.page_text("Case").as_deref(), Some("theirs"));
    }

    #[tokio::test]
    async fn guard_on_missing_page_creates_it() {
        let platform = MemoryPlatform::new();

        let mut guard = EditGuard::acquire(&platform, "New").await.unwrap();
        assert!(!guard.base().exists());

        guard.write(&platform, "first", "s", EditOptions::default()).await.unwrap();
        assert_eq!(platform.page_text("New").as_deref(), Some("first"));
        assert!(guard.base().exists());
    }
}
