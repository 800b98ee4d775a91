//! Workspace file tools — file I/O constrained to the session's root.
//!
//! Paths must be relative; `..` components and anything resolving outside
//! the workspace root are rejected before touching the filesystem.

use std::path::{Component, Path, PathBuf};

use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use axon_domain::tool::ToolOutput;
use axon_domain::{Error, Result};

use crate::spec::{Tool, ToolContext};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Path validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Validate and resolve a requested path within a workspace root.
///
/// 1. Rejects absolute paths and raw `..` components.
/// 2. Joins onto the canonicalized workspace root.
/// 3. Checks the resolved path is still contained in the root (walking up
///    to the nearest existing ancestor for not-yet-created files).
pub fn validate_path(workspace_root: &Path, requested: &str) -> Result<PathBuf> {
    let requested_path = Path::new(requested);
    if requested_path.is_absolute() {
        return Err(Error::InvalidInput(format!(
            "absolute paths are not allowed; use a path relative to the workspace root (got '{requested}')"
        )));
    }
    for component in requested_path.components() {
        if matches!(component, Component::ParentDir) {
            return Err(Error::InvalidInput(
                "path must not contain '..' components".into(),
            ));
        }
    }

    let canonical_root = workspace_root.canonicalize().map_err(|e| {
        Error::ToolExecution(format!(
            "cannot resolve workspace root '{}': {e}",
            workspace_root.display()
        ))
    })?;
    let candidate = canonical_root.join(requested_path);

    let resolved = if candidate.exists() {
        candidate.canonicalize().map_err(|e| {
            Error::ToolExecution(format!("cannot resolve path '{}': {e}", candidate.display()))
        })?
    } else {
        // Canonicalize the nearest existing ancestor, then re-append the
        // missing tail.
        let mut existing = candidate.as_path();
        let mut tail: Vec<&std::ffi::OsStr> = Vec::new();
        while !existing.exists() {
            match existing.parent() {
                Some(parent) => {
                    if let Some(name) = existing.file_name() {
                        tail.push(name);
                    }
                    existing = parent;
                }
                None => break,
            }
        }
        let mut resolved = existing.canonicalize().map_err(|e| {
            Error::ToolExecution(format!(
                "cannot resolve ancestor of '{}': {e}",
                candidate.display()
            ))
        })?;
        for part in tail.into_iter().rev() {
            resolved.push(part);
        }
        resolved
    };

    if !resolved.starts_with(&canonical_root) {
        return Err(Error::InvalidInput(format!(
            "path '{requested}' resolves outside the workspace root"
        )));
    }

    Ok(resolved)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// file_read
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct FileReadTool;

#[async_trait::async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read a text file from the workspace, optionally a 1-based line range."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path relative to the workspace root" },
                "start_line": { "type": "integer", "description": "First line to return (1-based)" },
                "end_line": { "type": "integer", "description": "Last line to return (inclusive)" }
            },
            "required": ["path"]
        })
    }

    async fn run(&self, input: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let requested = input["path"].as_str().unwrap_or_default();
        let path = validate_path(&ctx.workspace_root, requested)?;

        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| Error::ToolExecution(format!("failed to read '{requested}': {e}")))?;

        let start = input["start_line"].as_u64().map(|v| v.max(1) as usize);
        let end = input["end_line"].as_u64().map(|v| v as usize);

        let selected = match (start, end) {
            (None, None) => content,
            (start, end) => {
                let lines: Vec<&str> = content.lines().collect();
                let from = start.unwrap_or(1).saturating_sub(1).min(lines.len());
                let to = end.unwrap_or(lines.len()).min(lines.len());
                lines[from..to.max(from)].join("\n")
            }
        };
        Ok(ToolOutput::Text(selected))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// file_write
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct FileWriteTool;

#[async_trait::async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Create or overwrite a file in the workspace with the given content."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path relative to the workspace root" },
                "content": { "type": "string", "description": "Full file content" }
            },
            "required": ["path", "content"]
        })
    }

    async fn run(&self, input: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let requested = input["path"].as_str().unwrap_or_default();
        let content = input["content"].as_str().unwrap_or_default();
        let path = validate_path(&ctx.workspace_root, requested)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::ToolExecution(format!("failed to create parent directory: {e}")))?;
        }

        // Atomic write: uniquely-named .tmp sibling, sync, then rename.
        let tmp_name = format!(
            ".{}.{}.tmp",
            path.file_name().unwrap_or_default().to_string_lossy(),
            uuid::Uuid::new_v4().as_simple()
        );
        let tmp_path = path.with_file_name(tmp_name);

        let mut file = fs::File::create(&tmp_path)
            .await
            .map_err(|e| Error::ToolExecution(format!("failed to create temp file: {e}")))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| Error::ToolExecution(format!("failed to write: {e}")))?;
        file.sync_data()
            .await
            .map_err(|e| Error::ToolExecution(format!("failed to sync: {e}")))?;
        drop(file);

        if let Err(e) = fs::rename(&tmp_path, &path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(Error::ToolExecution(format!(
                "failed to move temp file into place: {e}"
            )));
        }

        Ok(ToolOutput::Text(format!(
            "Wrote {} bytes to {requested}",
            content.len()
        )))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// file_edit
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct FileEditTool;

#[async_trait::async_trait]
impl Tool for FileEditTool {
    fn name(&self) -> &str {
        "file_edit"
    }

    fn description(&self) -> &str {
        "Replace an exact text snippet in a workspace file. The old text \
         must match exactly once."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path relative to the workspace root" },
                "old_text": { "type": "string", "description": "Exact text to replace" },
                "new_text": { "type": "string", "description": "Replacement text" }
            },
            "required": ["path", "old_text", "new_text"]
        })
    }

    async fn run(&self, input: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let requested = input["path"].as_str().unwrap_or_default();
        let old_text = input["old_text"].as_str().unwrap_or_default();
        let new_text = input["new_text"].as_str().unwrap_or_default();
        let path = validate_path(&ctx.workspace_root, requested)?;

        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| Error::ToolExecution(format!("failed to read '{requested}': {e}")))?;

        let matches = content.matches(old_text).count();
        if old_text.is_empty() || matches == 0 {
            return Err(Error::ToolExecution(format!(
                "old_text not found in '{requested}'"
            )));
        }
        if matches > 1 {
            return Err(Error::ToolExecution(format!(
                "old_text matches {matches} times in '{requested}'; provide a unique snippet"
            )));
        }

        let updated = content.replacen(old_text, new_text, 1);
        fs::write(&path, &updated)
            .await
            .map_err(|e| Error::ToolExecution(format!("failed to write '{requested}': {e}")))?;

        Ok(ToolOutput::Text(format!("Edited {requested}")))
    }
}
