//! Filesystem tools.
//!
//! Every mutation emits a `file_change` event at mutation time, flagged
//! `preview` when the context's workspace is an overlay. Parameter names
//! match the provider-facing schema (camelCase for multi-word fields).

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::events::{AgentEvent, AgentEventKind, FileChange};
use crate::tools::patch::{
    apply_hunk, join_lines, new_file_content, parse_unified_diff, split_lines,
};
use crate::tools::{caps, parse_args, Tool, ToolExecutionContext};

const DEFAULT_READ_CAP_BYTES: usize = 512 * 1024;

fn emit_change(ctx: &ToolExecutionContext, change: FileChange) {
    ctx.events
        .emit(AgentEvent::new(AgentEventKind::FileChange { change }));
}

/// `fs_read_file` — read a file as UTF-8.
pub struct ReadFileTool;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadFileArgs {
    path: String,
    max_bytes: Option<usize>,
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "fs_read_file"
    }

    fn description(&self) -> &str {
        "Read a file from the workspace as UTF-8 text. Optionally cap the number of bytes returned."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Workspace-relative path"},
                "maxBytes": {"type": "integer", "description": "Maximum bytes to return"}
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    fn capabilities(&self) -> &[&str] {
        &[caps::FS_READ]
    }

    async fn execute(&self, args: Value, ctx: &ToolExecutionContext) -> Result<Value> {
        let args: ReadFileArgs = parse_args(args)?;
        let mut bytes = ctx.workspace.read_file(&args.path).await?;
        let cap = args.max_bytes.unwrap_or(DEFAULT_READ_CAP_BYTES);
        if bytes.len() > cap {
            bytes.truncate(cap);
        }
        let text = String::from_utf8(bytes)
            .with_context(|| format!("{} is not valid UTF-8", args.path))?;
        Ok(Value::String(text))
    }
}

/// `fs_write_file` — create or overwrite a file.
pub struct WriteFileTool;

#[derive(Deserialize)]
struct WriteFileArgs {
    path: String,
    content: String,
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "fs_write_file"
    }

    fn description(&self) -> &str {
        "Write UTF-8 content to a file, creating parent directories as needed."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "content": {"type": "string"}
            },
            "required": ["path", "content"],
            "additionalProperties": false
        })
    }

    fn capabilities(&self) -> &[&str] {
        &[caps::FS_WRITE]
    }

    async fn execute(&self, args: Value, ctx: &ToolExecutionContext) -> Result<Value> {
        let args: WriteFileArgs = parse_args(args)?;
        let existed = ctx.workspace.stat(&args.path).await?.is_some();
        ctx.workspace
            .write_file(&args.path, args.content.as_bytes())
            .await?;
        let change = if existed {
            FileChange::Update {
                path: args.path,
                preview: ctx.preview,
            }
        } else {
            FileChange::Create {
                path: args.path,
                preview: ctx.preview,
            }
        };
        emit_change(ctx, change);
        Ok(json!({"ok": true}))
    }
}

/// `fs_delete_path` — remove a file or directory tree.
pub struct DeletePathTool;

#[derive(Deserialize)]
struct DeletePathArgs {
    path: String,
}

#[async_trait]
impl Tool for DeletePathTool {
    fn name(&self) -> &str {
        "fs_delete_path"
    }

    fn description(&self) -> &str {
        "Delete a file or directory (recursively) from the workspace."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"path": {"type": "string"}},
            "required": ["path"],
            "additionalProperties": false
        })
    }

    fn capabilities(&self) -> &[&str] {
        &[caps::FS_DELETE]
    }

    async fn execute(&self, args: Value, ctx: &ToolExecutionContext) -> Result<Value> {
        let args: DeletePathArgs = parse_args(args)?;
        ctx.workspace.delete_path(&args.path).await?;
        emit_change(
            ctx,
            FileChange::Delete {
                path: args.path,
                preview: ctx.preview,
            },
        );
        Ok(json!({"ok": true}))
    }
}

/// `fs_rename_path` — move a file or directory.
pub struct RenamePathTool;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenamePathArgs {
    from_path: String,
    to_path: String,
}

#[async_trait]
impl Tool for RenamePathTool {
    fn name(&self) -> &str {
        "fs_rename_path"
    }

    fn description(&self) -> &str {
        "Rename or move a path, creating parent directories of the destination."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "fromPath": {"type": "string"},
                "toPath": {"type": "string"}
            },
            "required": ["fromPath", "toPath"],
            "additionalProperties": false
        })
    }

    fn capabilities(&self) -> &[&str] {
        &[caps::FS_RENAME]
    }

    async fn execute(&self, args: Value, ctx: &ToolExecutionContext) -> Result<Value> {
        let args: RenamePathArgs = parse_args(args)?;
        ctx.workspace
            .rename_path(&args.from_path, &args.to_path)
            .await?;
        emit_change(
            ctx,
            FileChange::Rename {
                from_path: args.from_path,
                to_path: args.to_path,
                preview: ctx.preview,
            },
        );
        Ok(json!({"ok": true}))
    }
}

/// `fs_apply_patch` — apply a unified diff across one or more files.
pub struct ApplyPatchTool;

#[derive(Deserialize)]
struct ApplyPatchArgs {
    patch: String,
    #[serde(default)]
    incremental: bool,
}

#[async_trait]
impl Tool for ApplyPatchTool {
    fn name(&self) -> &str {
        "fs_apply_patch"
    }

    fn description(&self) -> &str {
        "Apply a unified diff to the workspace. Hunks tolerate small drift by re-anchoring on \
         their first context line. With incremental=true each hunk is written as it lands."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "patch": {"type": "string", "description": "Unified diff text"},
                "incremental": {"type": "boolean", "description": "Write after each hunk"}
            },
            "required": ["patch"],
            "additionalProperties": false
        })
    }

    fn capabilities(&self) -> &[&str] {
        &[caps::FS_WRITE]
    }

    async fn execute(&self, args: Value, ctx: &ToolExecutionContext) -> Result<Value> {
        let args: ApplyPatchArgs = parse_args(args)?;
        let patches = parse_unified_diff(&args.patch)?;

        let mut results = Vec::with_capacity(patches.len());
        for patch in &patches {
            if patch.deletes {
                ctx.workspace.delete_path(&patch.path).await?;
                emit_change(
                    ctx,
                    FileChange::Delete {
                        path: patch.path.clone(),
                        preview: ctx.preview,
                    },
                );
                results.push(json!({"path": patch.path, "hunksApplied": 0}));
                continue;
            }

            if patch.creates {
                if ctx.workspace.stat(&patch.path).await?.is_some() {
                    bail!("patch creates {} but it already exists", patch.path);
                }
                let content = new_file_content(patch);
                ctx.workspace
                    .write_file(&patch.path, content.as_bytes())
                    .await?;
                emit_change(
                    ctx,
                    FileChange::Create {
                        path: patch.path.clone(),
                        preview: ctx.preview,
                    },
                );
                results.push(json!({"path": patch.path, "hunksApplied": patch.hunks.len()}));
                continue;
            }

            let existing = ctx.workspace.read_file(&patch.path).await?;
            let content = String::from_utf8(existing)
                .with_context(|| format!("{} is not valid UTF-8", patch.path))?;
            let (mut lines, trailing) = split_lines(&content);
            let hunk_count = patch.hunks.len();

            if args.incremental {
                for (hunk_index, hunk) in patch.hunks.iter().enumerate() {
                    apply_hunk(&mut lines, hunk)?;
                    ctx.workspace
                        .write_file(&patch.path, join_lines(&lines, trailing).as_bytes())
                        .await?;
                    emit_change(
                        ctx,
                        FileChange::PatchHunk {
                            path: patch.path.clone(),
                            hunk_index,
                            hunk_count,
                            preview: ctx.preview,
                        },
                    );
                }
            } else {
                for hunk in &patch.hunks {
                    apply_hunk(&mut lines, hunk)?;
                }
                ctx.workspace
                    .write_file(&patch.path, join_lines(&lines, trailing).as_bytes())
                    .await?;
                emit_change(
                    ctx,
                    FileChange::Update {
                        path: patch.path.clone(),
                        preview: ctx.preview,
                    },
                );
            }
            results.push(json!({"path": patch.path, "hunksApplied": hunk_count}));
        }

        Ok(json!({"ok": true, "results": results}))
    }
}
