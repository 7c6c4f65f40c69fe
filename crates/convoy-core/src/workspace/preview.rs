//! Preview workspace: buffers every mutation in an in-memory overlay until
//! an explicit commit or discard.
//!
//! Reads consult the overlay first; a pending delete fails reads and hides
//! the path from `stat`. Commit applies renames, then writes, then deletes
//! to the base workspace.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::{glob_match, FileStat, Workspace};

#[derive(Debug, Clone)]
enum OverlayEntry {
    /// Pending write; the bytes live only in the overlay.
    Write { bytes: Vec<u8> },
    /// Pending delete; reads and stats report the path absent.
    Delete,
    /// This path was renamed away; behaves like a delete for reads.
    RenamedTo { to: String },
    /// This path receives a base file pending rename from `from`.
    RenamedFrom { from: String },
}

#[derive(Default)]
struct Overlay {
    entries: HashMap<String, OverlayEntry>,
    /// Renames in application order, keyed by (from, to).
    renames: Vec<(String, String)>,
}

/// Overlay wrapper over a base workspace. The base is untouched until
/// [`PreviewWorkspace::commit`].
pub struct PreviewWorkspace {
    base: Arc<dyn Workspace>,
    overlay: Mutex<Overlay>,
}

impl PreviewWorkspace {
    pub fn new(base: Arc<dyn Workspace>) -> Self {
        Self {
            base,
            overlay: Mutex::new(Overlay::default()),
        }
    }

    pub fn base(&self) -> Arc<dyn Workspace> {
        Arc::clone(&self.base)
    }

    /// Whether any effects are buffered.
    pub fn has_pending(&self) -> bool {
        let overlay = self.overlay.lock().expect("overlay lock");
        !overlay.entries.is_empty() || !overlay.renames.is_empty()
    }

    fn entry(&self, path: &str) -> Option<OverlayEntry> {
        self.overlay
            .lock()
            .expect("overlay lock")
            .entries
            .get(path)
            .cloned()
    }

    /// Drop the overlay, leaving the base unchanged.
    pub fn discard(&self) {
        let mut overlay = self.overlay.lock().expect("overlay lock");
        tracing::debug!(
            entries = overlay.entries.len(),
            renames = overlay.renames.len(),
            "preview overlay discarded"
        );
        overlay.entries.clear();
        overlay.renames.clear();
    }

    /// Apply the overlay to the base: renames, then writes, then deletes.
    pub async fn commit(&self) -> Result<()> {
        let (renames, writes, deletes) = {
            let mut overlay = self.overlay.lock().expect("overlay lock");
            let renames = std::mem::take(&mut overlay.renames);
            let mut writes = Vec::new();
            let mut deletes = Vec::new();
            for (path, entry) in overlay.entries.drain() {
                match entry {
                    OverlayEntry::Write { bytes } => writes.push((path, bytes)),
                    OverlayEntry::Delete => deletes.push(path),
                    OverlayEntry::RenamedTo { .. } | OverlayEntry::RenamedFrom { .. } => {}
                }
            }
            // Stable order keeps commits deterministic.
            writes.sort_by(|a, b| a.0.cmp(&b.0));
            deletes.sort();
            (renames, writes, deletes)
        };

        for (from, to) in renames {
            self.base.rename_path(&from, &to).await?;
        }
        for (path, bytes) in writes {
            self.base.write_file(&path, &bytes).await?;
        }
        for path in deletes {
            // A pending delete may target a path the base never had.
            if matches!(self.base.stat(&path).await, Ok(Some(_))) {
                self.base.delete_path(&path).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Workspace for PreviewWorkspace {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        match self.entry(path) {
            Some(OverlayEntry::Write { bytes }) => Ok(bytes),
            Some(OverlayEntry::Delete) | Some(OverlayEntry::RenamedTo { .. }) => {
                bail!("no such file: {path} (pending delete)")
            }
            Some(OverlayEntry::RenamedFrom { from }) => self.base.read_file(&from).await,
            None => self.base.read_file(path).await,
        }
    }

    async fn write_file(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let mut overlay = self.overlay.lock().expect("overlay lock");
        overlay.entries.insert(
            path.to_string(),
            OverlayEntry::Write {
                bytes: bytes.to_vec(),
            },
        );
        Ok(())
    }

    async fn delete_path(&self, path: &str) -> Result<()> {
        // Must exist through the overlay view to be deletable.
        if self.stat(path).await?.is_none() {
            bail!("no such path: {path}");
        }
        let mut overlay = self.overlay.lock().expect("overlay lock");
        overlay
            .entries
            .insert(path.to_string(), OverlayEntry::Delete);
        Ok(())
    }

    async fn rename_path(&self, from: &str, to: &str) -> Result<()> {
        if self.stat(from).await?.is_none() {
            bail!("no such path: {from}");
        }
        let mut overlay = self.overlay.lock().expect("overlay lock");
        match overlay.entries.get(from).cloned() {
            // Overlay-only content: move the pending write, no base rename.
            Some(OverlayEntry::Write { bytes }) => {
                overlay.entries.remove(from);
                overlay
                    .entries
                    .insert(to.to_string(), OverlayEntry::Write { bytes });
                overlay
                    .entries
                    .insert(from.to_string(), OverlayEntry::Delete);
            }
            // Chained rename: redirect the original source to the new target.
            Some(OverlayEntry::RenamedFrom { from: origin }) => {
                for rename in overlay.renames.iter_mut() {
                    if rename.0 == origin && rename.1 == from {
                        rename.1 = to.to_string();
                    }
                }
                overlay.entries.remove(from);
                overlay.entries.insert(
                    from.to_string(),
                    OverlayEntry::RenamedTo { to: to.to_string() },
                );
                overlay
                    .entries
                    .insert(to.to_string(), OverlayEntry::RenamedFrom { from: origin });
            }
            Some(OverlayEntry::Delete) | Some(OverlayEntry::RenamedTo { .. }) => {
                bail!("no such path: {from}")
            }
            // Base-backed content: record a true rename for commit.
            None => {
                overlay
                    .renames
                    .push((from.to_string(), to.to_string()));
                overlay.entries.insert(
                    from.to_string(),
                    OverlayEntry::RenamedTo { to: to.to_string() },
                );
                overlay.entries.insert(
                    to.to_string(),
                    OverlayEntry::RenamedFrom {
                        from: from.to_string(),
                    },
                );
            }
        }
        Ok(())
    }

    async fn stat(&self, path: &str) -> Result<Option<FileStat>> {
        match self.entry(path) {
            Some(OverlayEntry::Write { bytes }) => {
                Ok(Some(FileStat::synthetic_file(bytes.len() as u64)))
            }
            Some(OverlayEntry::Delete) | Some(OverlayEntry::RenamedTo { .. }) => Ok(None),
            Some(OverlayEntry::RenamedFrom { from }) => self.base.stat(&from).await,
            None => self.base.stat(path).await,
        }
    }

    async fn list_files(&self, glob: Option<&str>) -> Result<Vec<String>> {
        let mut files = self.base.list_files(None).await?;
        let overlay = self.overlay.lock().expect("overlay lock");
        files.retain(|path| {
            !matches!(
                overlay.entries.get(path),
                Some(OverlayEntry::Delete) | Some(OverlayEntry::RenamedTo { .. })
            )
        });
        for (path, entry) in &overlay.entries {
            let visible = matches!(
                entry,
                OverlayEntry::Write { .. } | OverlayEntry::RenamedFrom { .. }
            );
            if visible && !files.contains(path) {
                files.push(path.clone());
            }
        }
        if let Some(pattern) = glob {
            files.retain(|path| glob_match(pattern, path));
        }
        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::MemoryWorkspace;

    fn previewed() -> (Arc<MemoryWorkspace>, PreviewWorkspace) {
        let base = Arc::new(MemoryWorkspace::new());
        let preview = PreviewWorkspace::new(base.clone());
        (base, preview)
    }

    #[tokio::test]
    async fn writes_stay_in_overlay_until_commit() {
        let (base, preview) = previewed();
        preview.write_file("b.txt", b"hello").await.unwrap();

        assert!(base.stat("b.txt").await.unwrap().is_none());
        assert_eq!(preview.read_file("b.txt").await.unwrap(), b"hello");

        preview.commit().await.unwrap();
        assert_eq!(base.read_file("b.txt").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn discard_leaves_base_unchanged() {
        let (base, preview) = previewed();
        base.write_file("a.txt", b"original").await.unwrap();

        preview.write_file("a.txt", b"changed").await.unwrap();
        preview.delete_path("a.txt").await.unwrap();
        preview.discard();

        assert_eq!(base.read_file("a.txt").await.unwrap(), b"original");
        assert!(!preview.has_pending());
    }

    #[tokio::test]
    async fn pending_delete_hides_the_path() {
        let (base, preview) = previewed();
        base.write_file("a.txt", b"data").await.unwrap();

        preview.delete_path("a.txt").await.unwrap();
        assert!(preview.read_file("a.txt").await.is_err());
        assert!(preview.stat("a.txt").await.unwrap().is_none());
        assert!(base.stat("a.txt").await.unwrap().is_some());

        preview.commit().await.unwrap();
        assert!(base.stat("a.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stat_of_pending_write_is_synthetic() {
        let (_, preview) = previewed();
        preview.write_file("new.txt", b"12345").await.unwrap();
        let stat = preview.stat("new.txt").await.unwrap().unwrap();
        assert!(stat.is_file);
        assert_eq!(stat.size, Some(5));
    }

    #[tokio::test]
    async fn base_backed_rename_commits_as_rename() {
        let (base, preview) = previewed();
        base.write_file("a.txt", b"content").await.unwrap();

        preview.rename_path("a.txt", "b.txt").await.unwrap();
        assert!(preview.stat("a.txt").await.unwrap().is_none());
        assert_eq!(preview.read_file("b.txt").await.unwrap(), b"content");
        assert_eq!(base.read_file("a.txt").await.unwrap(), b"content");

        preview.commit().await.unwrap();
        assert!(base.stat("a.txt").await.unwrap().is_none());
        assert_eq!(base.read_file("b.txt").await.unwrap(), b"content");
    }

    #[tokio::test]
    async fn overlay_only_rename_needs_no_base_file() {
        let (base, preview) = previewed();
        preview.write_file("draft.txt", b"wip").await.unwrap();
        preview.rename_path("draft.txt", "final.txt").await.unwrap();

        assert!(preview.stat("draft.txt").await.unwrap().is_none());
        assert_eq!(preview.read_file("final.txt").await.unwrap(), b"wip");

        preview.commit().await.unwrap();
        assert!(base.stat("draft.txt").await.unwrap().is_none());
        assert_eq!(base.read_file("final.txt").await.unwrap(), b"wip");
    }

    #[tokio::test]
    async fn list_files_reflects_the_overlay() {
        let (base, preview) = previewed();
        base.write_file("kept.txt", b"1").await.unwrap();
        base.write_file("gone.txt", b"2").await.unwrap();

        preview.delete_path("gone.txt").await.unwrap();
        preview.write_file("added.txt", b"3").await.unwrap();

        let files = preview.list_files(Some("*.txt")).await.unwrap();
        assert_eq!(files, vec!["added.txt".to_string(), "kept.txt".to_string()]);
    }

    #[tokio::test]
    async fn write_after_rename_wins() {
        let (base, preview) = previewed();
        base.write_file("a.txt", b"old").await.unwrap();

        preview.rename_path("a.txt", "b.txt").await.unwrap();
        preview.write_file("b.txt", b"new").await.unwrap();
        preview.commit().await.unwrap();

        assert!(base.stat("a.txt").await.unwrap().is_none());
        assert_eq!(base.read_file("b.txt").await.unwrap(), b"new");
    }
}
