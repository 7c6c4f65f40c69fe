//! Workspace port: a uniform file-effect surface for tools and engines.
//!
//! Paths are workspace-relative unless absolute; bytes are opaque at this
//! layer (no encoding policy). Two wrappers provide transactional semantics:
//! [`journal::JournalWorkspace`] records inverse operations for rollback and
//! [`preview::PreviewWorkspace`] buffers all effects in an overlay.

pub mod journal;
pub mod preview;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::fs;

/// Result of [`Workspace::stat`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub is_file: bool,
    pub is_directory: bool,
    pub mtime_ms: Option<u64>,
    pub size: Option<u64>,
}

impl FileStat {
    /// Stat for a file that exists only in an overlay or journal view.
    pub fn synthetic_file(size: u64) -> Self {
        Self {
            is_file: true,
            is_directory: false,
            mtime_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .ok()
                .map(|d| d.as_millis() as u64),
            size: Some(size),
        }
    }
}

/// Uniform file I/O surface.
#[async_trait]
pub trait Workspace: Send + Sync {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>>;

    /// Write, creating missing parent directories.
    async fn write_file(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// Remove a file or directory tree.
    async fn delete_path(&self, path: &str) -> Result<()>;

    /// Rename, creating parent directories of the destination.
    async fn rename_path(&self, from: &str, to: &str) -> Result<()>;

    /// `None` when the path does not exist.
    async fn stat(&self, path: &str) -> Result<Option<FileStat>>;

    /// List files, optionally filtered by a glob pattern.
    async fn list_files(&self, glob: Option<&str>) -> Result<Vec<String>>;
}

/// Match a path against a glob supporting `*`, `?`, and `**` segments.
pub(crate) fn glob_match(pattern: &str, path: &str) -> bool {
    fn segments(s: &str) -> Vec<&str> {
        s.split('/').filter(|p| !p.is_empty() && *p != ".").collect()
    }

    fn name_match(pattern: &str, name: &str) -> bool {
        let p: Vec<char> = pattern.chars().collect();
        let n: Vec<char> = name.chars().collect();
        // Classic wildcard match with backtracking over `*`.
        let (mut pi, mut ni) = (0usize, 0usize);
        let (mut star, mut mark) = (None::<usize>, 0usize);
        while ni < n.len() {
            if pi < p.len() && (p[pi] == '?' || p[pi] == n[ni]) {
                pi += 1;
                ni += 1;
            } else if pi < p.len() && p[pi] == '*' {
                star = Some(pi);
                mark = ni;
                pi += 1;
            } else if let Some(s) = star {
                pi = s + 1;
                mark += 1;
                ni = mark;
            } else {
                return false;
            }
        }
        while pi < p.len() && p[pi] == '*' {
            pi += 1;
        }
        pi == p.len()
    }

    fn match_from(pat: &[&str], path: &[&str]) -> bool {
        match (pat.first(), path.first()) {
            (None, None) => true,
            (None, Some(_)) => false,
            (Some(&"**"), _) => {
                // `**` swallows zero or more leading segments.
                if match_from(&pat[1..], path) {
                    return true;
                }
                !path.is_empty() && match_from(pat, &path[1..])
            }
            (Some(_), None) => false,
            (Some(p), Some(s)) => name_match(p, s) && match_from(&pat[1..], &path[1..]),
        }
    }

    match_from(&segments(pattern), &segments(path))
}

fn stat_from_metadata(meta: &std::fs::Metadata) -> FileStat {
    FileStat {
        is_file: meta.is_file(),
        is_directory: meta.is_dir(),
        mtime_ms: meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64),
        size: meta.is_file().then(|| meta.len()),
    }
}

/// Workspace rooted at a directory on the local filesystem.
pub struct LocalWorkspace {
    root: PathBuf,
}

impl LocalWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.root.join(p)
        }
    }

    fn collect_files(dir: &Path, root: &Path, out: &mut Vec<String>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                Self::collect_files(&path, root, out);
            } else if let Ok(rel) = path.strip_prefix(root) {
                out.push(rel.to_string_lossy().replace('\\', "/"));
            }
        }
    }
}

#[async_trait]
impl Workspace for LocalWorkspace {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let resolved = self.resolve(path);
        fs::read(&resolved)
            .await
            .with_context(|| format!("failed reading {}", resolved.display()))
    }

    async fn write_file(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let resolved = self.resolve(path);
        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed creating {}", parent.display()))?;
        }
        fs::write(&resolved, bytes)
            .await
            .with_context(|| format!("failed writing {}", resolved.display()))
    }

    async fn delete_path(&self, path: &str) -> Result<()> {
        let resolved = self.resolve(path);
        let meta = fs::metadata(&resolved)
            .await
            .with_context(|| format!("failed to stat {}", resolved.display()))?;
        let removed = if meta.is_dir() {
            fs::remove_dir_all(&resolved).await
        } else {
            fs::remove_file(&resolved).await
        };
        removed.with_context(|| format!("failed deleting {}", resolved.display()))
    }

    async fn rename_path(&self, from: &str, to: &str) -> Result<()> {
        let src = self.resolve(from);
        let dst = self.resolve(to);
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed creating {}", parent.display()))?;
        }
        fs::rename(&src, &dst)
            .await
            .with_context(|| format!("failed renaming {} -> {}", src.display(), dst.display()))
    }

    async fn stat(&self, path: &str) -> Result<Option<FileStat>> {
        match fs::metadata(self.resolve(path)).await {
            Ok(meta) => Ok(Some(stat_from_metadata(&meta))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_files(&self, glob: Option<&str>) -> Result<Vec<String>> {
        let root = self.root.clone();
        let pattern = glob.map(str::to_string);
        let files = tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            Self::collect_files(&root, &root, &mut out);
            out.sort();
            if let Some(pattern) = pattern {
                out.retain(|path| glob_match(&pattern, path));
            }
            out
        })
        .await
        .context("list task panicked")?;
        Ok(files)
    }
}

/// In-memory workspace keyed by normalised relative path. Used by tests and
/// callers that want no disk effects at all.
#[derive(Default)]
pub struct MemoryWorkspace {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    fn normalise(path: &str) -> String {
        path.trim_start_matches("./").trim_start_matches('/').to_string()
    }
}

#[async_trait]
impl Workspace for MemoryWorkspace {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let key = Self::normalise(path);
        let files = self.files.lock().expect("workspace lock");
        match files.get(&key) {
            Some(bytes) => Ok(bytes.clone()),
            None => bail!("no such file: {key}"),
        }
    }

    async fn write_file(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let key = Self::normalise(path);
        self.files
            .lock()
            .expect("workspace lock")
            .insert(key, bytes.to_vec());
        Ok(())
    }

    async fn delete_path(&self, path: &str) -> Result<()> {
        let key = Self::normalise(path);
        let prefix = format!("{key}/");
        let mut files = self.files.lock().expect("workspace lock");
        let before = files.len();
        files.retain(|k, _| k != &key && !k.starts_with(&prefix));
        if files.len() == before {
            bail!("no such path: {key}");
        }
        Ok(())
    }

    async fn rename_path(&self, from: &str, to: &str) -> Result<()> {
        let from = Self::normalise(from);
        let to = Self::normalise(to);
        let from_prefix = format!("{from}/");
        let mut files = self.files.lock().expect("workspace lock");
        if let Some(bytes) = files.remove(&from) {
            files.insert(to, bytes);
            return Ok(());
        }
        let moved: Vec<(String, Vec<u8>)> = files
            .iter()
            .filter(|(k, _)| k.starts_with(&from_prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if moved.is_empty() {
            bail!("no such path: {from}");
        }
        for (key, bytes) in moved {
            files.remove(&key);
            let suffix = &key[from.len()..];
            files.insert(format!("{to}{suffix}"), bytes);
        }
        Ok(())
    }

    async fn stat(&self, path: &str) -> Result<Option<FileStat>> {
        let key = Self::normalise(path);
        let prefix = format!("{key}/");
        let files = self.files.lock().expect("workspace lock");
        if let Some(bytes) = files.get(&key) {
            return Ok(Some(FileStat::synthetic_file(bytes.len() as u64)));
        }
        if files.keys().any(|k| k.starts_with(&prefix)) {
            return Ok(Some(FileStat {
                is_file: false,
                is_directory: true,
                mtime_ms: None,
                size: None,
            }));
        }
        Ok(None)
    }

    async fn list_files(&self, glob: Option<&str>) -> Result<Vec<String>> {
        let files = self.files.lock().expect("workspace lock");
        let mut out: Vec<String> = files
            .keys()
            .filter(|k| glob.map_or(true, |g| glob_match(g, k)))
            .cloned()
            .collect();
        out.sort();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matching() {
        assert!(glob_match("*.rs", "main.rs"));
        assert!(!glob_match("*.rs", "src/main.rs"));
        assert!(glob_match("src/*.rs", "src/main.rs"));
        assert!(glob_match("**/*.rs", "a/b/c/main.rs"));
        assert!(glob_match("**/*.rs", "main.rs"));
        assert!(glob_match("a/**/z.txt", "a/z.txt"));
        assert!(glob_match("a/**/z.txt", "a/b/c/z.txt"));
        assert!(glob_match("fil?.txt", "file.txt"));
        assert!(!glob_match("fil?.txt", "files.txt"));
    }

    #[tokio::test]
    async fn memory_workspace_round_trip() {
        let ws = MemoryWorkspace::new();
        ws.write_file("dir/a.txt", b"hello").await.unwrap();
        assert_eq!(ws.read_file("dir/a.txt").await.unwrap(), b"hello");

        let stat = ws.stat("dir/a.txt").await.unwrap().unwrap();
        assert!(stat.is_file);
        assert_eq!(stat.size, Some(5));

        let dir_stat = ws.stat("dir").await.unwrap().unwrap();
        assert!(dir_stat.is_directory);

        ws.rename_path("dir/a.txt", "b.txt").await.unwrap();
        assert!(ws.read_file("dir/a.txt").await.is_err());
        assert_eq!(ws.read_file("b.txt").await.unwrap(), b"hello");

        ws.delete_path("b.txt").await.unwrap();
        assert!(ws.stat("b.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_workspace_recursive_delete_and_rename() {
        let ws = MemoryWorkspace::new();
        ws.write_file("d/one.txt", b"1").await.unwrap();
        ws.write_file("d/sub/two.txt", b"2").await.unwrap();

        ws.rename_path("d", "e").await.unwrap();
        assert_eq!(ws.read_file("e/sub/two.txt").await.unwrap(), b"2");

        ws.delete_path("e").await.unwrap();
        assert!(ws.list_files(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn local_workspace_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let ws = LocalWorkspace::new(dir.path());

        ws.write_file("nested/deep/file.txt", b"content").await.unwrap();
        assert_eq!(ws.read_file("nested/deep/file.txt").await.unwrap(), b"content");

        let listed = ws.list_files(Some("**/*.txt")).await.unwrap();
        assert_eq!(listed, vec!["nested/deep/file.txt".to_string()]);

        ws.rename_path("nested/deep/file.txt", "moved/file.txt")
            .await
            .unwrap();
        assert!(ws.stat("nested/deep/file.txt").await.unwrap().is_none());
        assert!(ws.stat("moved/file.txt").await.unwrap().is_some());

        ws.delete_path("moved").await.unwrap();
        assert!(ws.stat("moved").await.unwrap().is_none());
    }
}
