//! Journal workspace: records the inverse of every mutating operation so a
//! failed attempt can be rolled back to the pre-attempt state.
//!
//! Rollback replays entries in reverse and swallows individual errors so the
//! best-effort unwind always completes.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use super::{FileStat, Workspace};

#[derive(Debug)]
enum JournalOp {
    Write {
        path: String,
        before: Option<Vec<u8>>,
    },
    Delete {
        path: String,
        before: Option<Vec<u8>>,
    },
    Rename {
        from: String,
        to: String,
        before_from: Option<Vec<u8>>,
        before_to: Option<Vec<u8>>,
    },
}

/// Transactional wrapper over a base workspace.
pub struct JournalWorkspace {
    base: Arc<dyn Workspace>,
    ops: Mutex<Vec<JournalOp>>,
}

impl JournalWorkspace {
    pub fn new(base: Arc<dyn Workspace>) -> Self {
        Self {
            base,
            ops: Mutex::new(Vec::new()),
        }
    }

    pub fn base(&self) -> Arc<dyn Workspace> {
        Arc::clone(&self.base)
    }

    /// Number of recorded operations.
    pub fn len(&self) -> usize {
        self.ops.lock().expect("journal lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, op: JournalOp) {
        self.ops.lock().expect("journal lock").push(op);
    }

    /// Capture file bytes if the path currently holds a file.
    async fn capture(&self, path: &str) -> Option<Vec<u8>> {
        match self.base.stat(path).await {
            Ok(Some(stat)) if stat.is_file => self.base.read_file(path).await.ok(),
            _ => None,
        }
    }

    /// Keep all effects: drop the journal.
    pub fn commit(&self) {
        let mut ops = self.ops.lock().expect("journal lock");
        tracing::debug!(ops = ops.len(), "journal committed");
        ops.clear();
    }

    /// Undo all effects in reverse order. Errors are logged and skipped.
    pub async fn rollback(&self) {
        let ops: Vec<JournalOp> = {
            let mut guard = self.ops.lock().expect("journal lock");
            guard.drain(..).collect()
        };
        tracing::debug!(ops = ops.len(), "journal rollback");
        for op in ops.into_iter().rev() {
            match op {
                JournalOp::Write { path, before } => {
                    self.restore(&path, before).await;
                }
                JournalOp::Delete { path, before } => {
                    if let Some(bytes) = before {
                        if let Err(e) = self.base.write_file(&path, &bytes).await {
                            tracing::warn!(path, error = %e, "rollback write failed");
                        }
                    }
                }
                JournalOp::Rename {
                    from,
                    to,
                    before_from,
                    before_to,
                } => {
                    self.restore(&from, before_from).await;
                    self.restore(&to, before_to).await;
                }
            }
        }
    }

    /// Put a path back to its captured state: bytes, or absence.
    async fn restore(&self, path: &str, before: Option<Vec<u8>>) {
        match before {
            Some(bytes) => {
                if let Err(e) = self.base.write_file(path, &bytes).await {
                    tracing::warn!(path, error = %e, "rollback restore failed");
                }
            }
            None => {
                let exists = matches!(self.base.stat(path).await, Ok(Some(_)));
                if exists {
                    if let Err(e) = self.base.delete_path(path).await {
                        tracing::warn!(path, error = %e, "rollback delete failed");
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Workspace for JournalWorkspace {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        self.base.read_file(path).await
    }

    async fn write_file(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let before = self.capture(path).await;
        self.base.write_file(path, bytes).await?;
        self.push(JournalOp::Write {
            path: path.to_string(),
            before,
        });
        Ok(())
    }

    async fn delete_path(&self, path: &str) -> Result<()> {
        let before = self.capture(path).await;
        self.base.delete_path(path).await?;
        self.push(JournalOp::Delete {
            path: path.to_string(),
            before,
        });
        Ok(())
    }

    async fn rename_path(&self, from: &str, to: &str) -> Result<()> {
        let before_from = self.capture(from).await;
        let before_to = self.capture(to).await;
        self.base.rename_path(from, to).await?;
        self.push(JournalOp::Rename {
            from: from.to_string(),
            to: to.to_string(),
            before_from,
            before_to,
        });
        Ok(())
    }

    async fn stat(&self, path: &str) -> Result<Option<FileStat>> {
        self.base.stat(path).await
    }

    async fn list_files(&self, glob: Option<&str>) -> Result<Vec<String>> {
        self.base.list_files(glob).await
    }
}
