//! Unified-diff parsing and hunk application.
//!
//! Pure functions: nothing here touches a workspace. A hunk applies at its
//! declared start when every context/remove line matches exactly; on drift a
//! single re-anchor pass keyed on the hunk's first context line is
//! attempted. A hunk that still does not match fails without producing
//! output.

use anyhow::{bail, Result};

/// One line of a hunk body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchLine {
    Context(String),
    Remove(String),
    Add(String),
}

/// One `@@` hunk.
#[derive(Debug, Clone)]
pub struct Hunk {
    /// 1-based line number in the old file.
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
    pub lines: Vec<PatchLine>,
}

impl Hunk {
    /// Lines that must be present in the old file (context + removals).
    fn pattern(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|line| match line {
                PatchLine::Context(s) | PatchLine::Remove(s) => Some(s.as_str()),
                PatchLine::Add(_) => None,
            })
            .collect()
    }

    /// Lines present after application (context + additions).
    fn replacement(&self) -> Vec<String> {
        self.lines
            .iter()
            .filter_map(|line| match line {
                PatchLine::Context(s) | PatchLine::Add(s) => Some(s.clone()),
                PatchLine::Remove(_) => None,
            })
            .collect()
    }

    /// Offset of the first context line within the pattern, and its text.
    fn first_context(&self) -> Option<(usize, &str)> {
        let mut pattern_index = 0;
        for line in &self.lines {
            match line {
                PatchLine::Context(s) => return Some((pattern_index, s.as_str())),
                PatchLine::Remove(_) => pattern_index += 1,
                PatchLine::Add(_) => {}
            }
        }
        None
    }
}

/// All hunks for one target file.
#[derive(Debug, Clone)]
pub struct FilePatch {
    pub path: String,
    /// True when the old side is `/dev/null` (file creation).
    pub creates: bool,
    /// True when the new side is `/dev/null` (file deletion).
    pub deletes: bool,
    pub hunks: Vec<Hunk>,
}

fn strip_diff_prefix(path: &str) -> &str {
    let path = path.trim();
    path.strip_prefix("a/")
        .or_else(|| path.strip_prefix("b/"))
        .unwrap_or(path)
}

fn parse_hunk_header(header: &str) -> Option<(usize, usize, usize, usize)> {
    // @@ -old_start[,old_count] +new_start[,new_count] @@
    let inner = header.strip_prefix("@@")?.split("@@").next()?.trim();
    let mut parts = inner.split_whitespace();
    let old = parts.next()?.strip_prefix('-')?;
    let new = parts.next()?.strip_prefix('+')?;

    fn span(s: &str) -> Option<(usize, usize)> {
        match s.split_once(',') {
            Some((start, count)) => Some((start.parse().ok()?, count.parse().ok()?)),
            None => Some((s.parse().ok()?, 1)),
        }
    }

    let (old_start, old_count) = span(old)?;
    let (new_start, new_count) = span(new)?;
    Some((old_start, old_count, new_start, new_count))
}

/// Parse a unified diff into per-file patches.
///
/// Accepts standard `--- a/x` / `+++ b/x` headers; `/dev/null` on either
/// side marks creation or deletion. `diff --git` and `index` lines are
/// skipped.
pub fn parse_unified_diff(diff: &str) -> Result<Vec<FilePatch>> {
    let mut patches: Vec<FilePatch> = Vec::new();
    let mut old_path: Option<String> = None;

    for line in diff.lines() {
        if line.starts_with("diff ") || line.starts_with("index ") {
            old_path = None;
            continue;
        }
        if let Some(path) = line.strip_prefix("--- ") {
            old_path = Some(strip_diff_prefix(path).to_string());
            continue;
        }
        if let Some(path) = line.strip_prefix("+++ ") {
            let new_path = strip_diff_prefix(path).to_string();
            let old = old_path.take().unwrap_or_else(|| new_path.clone());
            let creates = old == "/dev/null";
            let deletes = new_path == "/dev/null";
            let path = if deletes { old } else { new_path };
            patches.push(FilePatch {
                path,
                creates,
                deletes,
                hunks: Vec::new(),
            });
            continue;
        }
        if line.starts_with("@@") {
            let Some(patch) = patches.last_mut() else {
                bail!("hunk header before any file header: {line}");
            };
            let Some((old_start, old_count, new_start, new_count)) = parse_hunk_header(line)
            else {
                bail!("malformed hunk header: {line}");
            };
            patch.hunks.push(Hunk {
                old_start,
                old_count,
                new_start,
                new_count,
                lines: Vec::new(),
            });
            continue;
        }

        let Some(patch) = patches.last_mut() else {
            continue;
        };
        let Some(hunk) = patch.hunks.last_mut() else {
            continue;
        };
        if let Some(rest) = line.strip_prefix('+') {
            hunk.lines.push(PatchLine::Add(rest.to_string()));
        } else if let Some(rest) = line.strip_prefix('-') {
            hunk.lines.push(PatchLine::Remove(rest.to_string()));
        } else if let Some(rest) = line.strip_prefix(' ') {
            hunk.lines.push(PatchLine::Context(rest.to_string()));
        } else if line.is_empty() {
            hunk.lines.push(PatchLine::Context(String::new()));
        } else if line == "\\ No newline at end of file" {
            // Metadata only; byte-level newline handling happens at the
            // file layer.
        }
    }

    if patches.is_empty() {
        bail!("no file patches found in diff");
    }
    Ok(patches)
}

fn pattern_matches_at(lines: &[String], pattern: &[&str], start: usize) -> bool {
    if start + pattern.len() > lines.len() {
        return false;
    }
    pattern
        .iter()
        .zip(&lines[start..])
        .all(|(expected, actual)| *expected == actual)
}

/// Apply one hunk in place. Returns the 0-based line index it applied at.
pub fn apply_hunk(lines: &mut Vec<String>, hunk: &Hunk) -> Result<usize> {
    let pattern = hunk.pattern();
    let declared = hunk.old_start.saturating_sub(1);

    let start = if pattern_matches_at(lines, &pattern, declared) {
        declared
    } else {
        re_anchor(lines, hunk, &pattern)?
    };

    let replacement = hunk.replacement();
    lines.splice(start..start + pattern.len(), replacement);
    Ok(start)
}

/// One re-anchor pass: align the hunk on occurrences of its first context
/// line and accept the first position where the whole pattern matches.
fn re_anchor(lines: &[String], hunk: &Hunk, pattern: &[&str]) -> Result<usize> {
    let Some((anchor_offset, anchor_text)) = hunk.first_context() else {
        bail!(
            "hunk at line {} does not match and has no context line to re-anchor on",
            hunk.old_start
        );
    };
    for (index, line) in lines.iter().enumerate() {
        if line != anchor_text {
            continue;
        }
        let Some(start) = index.checked_sub(anchor_offset) else {
            continue;
        };
        if pattern_matches_at(lines, pattern, start) {
            tracing::debug!(
                declared = hunk.old_start,
                applied = start + 1,
                "hunk re-anchored on first context line"
            );
            return Ok(start);
        }
    }
    bail!(
        "hunk at line {} does not apply: context mismatch",
        hunk.old_start
    )
}

/// Split content into lines, remembering whether it ended with a newline.
pub fn split_lines(content: &str) -> (Vec<String>, bool) {
    let trailing = content.ends_with('\n');
    (content.lines().map(str::to_string).collect(), trailing)
}

/// Rejoin lines, restoring the trailing newline when the original had one.
pub fn join_lines(lines: &[String], trailing_newline: bool) -> String {
    let mut out = lines.join("\n");
    if trailing_newline && !out.is_empty() {
        out.push('\n');
    }
    out
}

/// Apply every hunk of a patch to `content`, returning the new content.
pub fn apply_file_patch(content: &str, patch: &FilePatch) -> Result<String> {
    let (mut lines, trailing) = split_lines(content);
    for hunk in &patch.hunks {
        apply_hunk(&mut lines, hunk)?;
    }
    Ok(join_lines(&lines, trailing))
}

/// Content of a newly created file from its patch (all Add lines).
pub fn new_file_content(patch: &FilePatch) -> String {
    let lines: Vec<String> = patch
        .hunks
        .iter()
        .flat_map(|hunk| &hunk.lines)
        .filter_map(|line| match line {
            PatchLine::Add(s) => Some(s.clone()),
            _ => None,
        })
        .collect();
    let mut out = lines.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "alpha\nbeta\ngamma\ndelta\nepsilon\n";

    fn one_hunk(diff_body: &str) -> FilePatch {
        let diff = format!("--- a/f.txt\n+++ b/f.txt\n{diff_body}");
        parse_unified_diff(&diff).unwrap().remove(0)
    }

    #[test]
    fn parses_headers_and_hunks() {
        let diff = "\
--- a/src/lib.rs
+++ b/src/lib.rs
@@ -1,3 +1,4 @@
 alpha
+inserted
 beta
 gamma
";
        let patches = parse_unified_diff(diff).unwrap();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].path, "src/lib.rs");
        assert!(!patches[0].creates);
        let hunk = &patches[0].hunks[0];
        assert_eq!((hunk.old_start, hunk.old_count), (1, 3));
        assert_eq!((hunk.new_start, hunk.new_count), (1, 4));
        assert_eq!(hunk.lines.len(), 4);
    }

    #[test]
    fn detects_creation_and_deletion() {
        let diff = "\
--- /dev/null
+++ b/new.txt
@@ -0,0 +1,2 @@
+first
+second
--- a/old.txt
+++ /dev/null
@@ -1,1 +0,0 @@
-gone
";
        let patches = parse_unified_diff(diff).unwrap();
        assert!(patches[0].creates);
        assert_eq!(patches[0].path, "new.txt");
        assert_eq!(new_file_content(&patches[0]), "first\nsecond\n");
        assert!(patches[1].deletes);
        assert_eq!(patches[1].path, "old.txt");
    }

    #[test]
    fn hunk_applies_at_declared_start() {
        let patch = one_hunk("@@ -2,2 +2,2 @@\n beta\n-gamma\n+GAMMA\n");
        let out = apply_file_patch(BASE, &patch).unwrap();
        assert_eq!(out, "alpha\nbeta\nGAMMA\ndelta\nepsilon\n");
    }

    #[test]
    fn hunk_with_drift_re_anchors_on_first_context_line() {
        // Declared start is off by one; "beta" is unique so the re-anchor
        // finds the true position.
        let patch = one_hunk("@@ -3,2 +3,2 @@\n beta\n-gamma\n+GAMMA\n");
        let (mut lines, trailing) = split_lines(BASE);
        let applied_at = apply_hunk(&mut lines, &patch.hunks[0]).unwrap();
        assert_eq!(applied_at, 1);
        assert_eq!(join_lines(&lines, trailing), "alpha\nbeta\nGAMMA\ndelta\nepsilon\n");
    }

    #[test]
    fn unmatchable_hunk_fails_without_writing() {
        let patch = one_hunk("@@ -1,2 +1,2 @@\n nothere\n-gamma\n+GAMMA\n");
        let err = apply_file_patch(BASE, &patch).unwrap_err();
        assert!(err.to_string().contains("does not apply"));
    }

    #[test]
    fn removal_only_hunk_without_context_fails_on_drift() {
        let patch = one_hunk("@@ -9,1 +8,0 @@\n-missing\n");
        let err = apply_file_patch(BASE, &patch).unwrap_err();
        assert!(err.to_string().contains("no context line"));
    }

    #[test]
    fn multi_hunk_patch_applies_in_order() {
        let diff = "\
--- a/f.txt
+++ b/f.txt
@@ -1,2 +1,2 @@
 alpha
-beta
+BETA
@@ -4,2 +4,3 @@
 delta
 epsilon
+zeta
";
        let patch = parse_unified_diff(diff).unwrap().remove(0);
        let out = apply_file_patch(BASE, &patch).unwrap();
        assert_eq!(out, "alpha\nBETA\ngamma\ndelta\nepsilon\nzeta\n");
    }

    #[test]
    fn trailing_newline_is_preserved_or_absent() {
        let patch = one_hunk("@@ -1,1 +1,1 @@\n-alpha\n+ALPHA\n");
        let with_newline = apply_file_patch("alpha\nbeta\n", &patch).unwrap();
        assert!(with_newline.ends_with('\n'));
        let without_newline = apply_file_patch("alpha\nbeta", &patch).unwrap();
        assert!(!without_newline.ends_with('\n'));
    }
}
