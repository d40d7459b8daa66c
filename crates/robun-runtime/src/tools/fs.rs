//! File tools: read, write, surgical edit, and directory listing, with an
//! optional workspace restriction shared across the file and shell tools.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use robun_core::Result;

use super::{Tool, ToolContext};

/// Path policy shared by the file and shell tools. When restricted, a
/// resolved absolute path must equal the workspace root or live under it.
pub struct FsPolicy {
    workspace: PathBuf,
    restrict: bool,
}

impl FsPolicy {
    pub fn new(workspace: PathBuf, restrict: bool) -> Self {
        Self { workspace, restrict }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn restricted(&self) -> bool {
        self.restrict
    }

    /// Resolve a user-supplied path: `~` expansion, workspace-relative
    /// resolution, lexical `..` normalization, then the restriction check.
    pub fn resolve(&self, raw: &str) -> std::result::Result<PathBuf, String> {
        let expanded = if raw == "~" || raw.starts_with("~/") {
            match dirs::home_dir() {
                Some(home) => home.join(raw.trim_start_matches("~/").trim_start_matches('~')),
                None => PathBuf::from(raw),
            }
        } else {
            PathBuf::from(raw)
        };

        let absolute = if expanded.is_absolute() {
            expanded
        } else {
            self.workspace.join(expanded)
        };
        let normalized = normalize(&absolute);

        if self.restrict
            && normalized != self.workspace
            && !normalized.starts_with(&self.workspace)
        {
            return Err(format!(
                "Error: Access denied: {} is outside the workspace",
                normalized.display()
            ));
        }
        Ok(normalized)
    }
}

/// Lexical normalization: removes `.` and resolves `..` without touching
/// the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

// ── read_file ──────────────────────────────────────────────────

pub struct ReadFileTool {
    policy: Arc<FsPolicy>,
}

impl ReadFileTool {
    pub fn new(policy: Arc<FsPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path to the file to read" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, _ctx: &ToolContext, args: &Value) -> Result<String> {
        let raw = args["path"].as_str().unwrap_or_default();
        let path = match self.policy.resolve(raw) {
            Ok(p) => p,
            Err(e) => return Ok(e),
        };
        if !path.exists() {
            return Ok(format!("Error: File not found: {}", path.display()));
        }
        if !path.is_file() {
            return Ok(format!("Error: Not a file: {}", path.display()));
        }
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(content),
            Err(e) => Ok(format!("Error: Failed to read {}: {e}", path.display())),
        }
    }
}

// ── write_file ─────────────────────────────────────────────────

pub struct WriteFileTool {
    policy: Arc<FsPolicy>,
}

impl WriteFileTool {
    pub fn new(policy: Arc<FsPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating parent directories as needed"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path to the file to write" },
                "content": { "type": "string", "description": "Content to write" }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, _ctx: &ToolContext, args: &Value) -> Result<String> {
        let raw = args["path"].as_str().unwrap_or_default();
        let content = args["content"].as_str().unwrap_or_default();
        let path = match self.policy.resolve(raw) {
            Ok(p) => p,
            Err(e) => return Ok(e),
        };
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return Ok(format!(
                    "Error: Failed to create {}: {e}",
                    parent.display()
                ));
            }
        }
        match tokio::fs::write(&path, content).await {
            Ok(()) => Ok(format!(
                "Wrote {} bytes to {}",
                content.len(),
                path.display()
            )),
            Err(e) => Ok(format!("Error: Failed to write {}: {e}", path.display())),
        }
    }
}

// ── edit_file ──────────────────────────────────────────────────

pub struct EditFileTool {
    policy: Arc<FsPolicy>,
}

impl EditFileTool {
    pub fn new(policy: Arc<FsPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Replace an exact text match in a file. old_text must occur exactly once; \
         include surrounding context to disambiguate."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path to the file to edit" },
                "old_text": { "type": "string", "description": "Exact text to find (must match once)" },
                "new_text": { "type": "string", "description": "Replacement text" }
            },
            "required": ["path", "old_text", "new_text"]
        })
    }

    async fn execute(&self, _ctx: &ToolContext, args: &Value) -> Result<String> {
        let raw = args["path"].as_str().unwrap_or_default();
        let old_text = args["old_text"].as_str().unwrap_or_default();
        let new_text = args["new_text"].as_str().unwrap_or_default();
        let path = match self.policy.resolve(raw) {
            Ok(p) => p,
            Err(e) => return Ok(e),
        };

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => return Ok(format!("Error: Failed to read {}: {e}", path.display())),
        };

        let occurrences = content.matches(old_text).count();
        if occurrences == 0 {
            return Ok(format!(
                "Error: old_text not found in {}. Match the exact text including whitespace.",
                path.display()
            ));
        }
        if occurrences > 1 {
            // The file is left untouched — an ambiguous match must not
            // guess which occurrence was meant.
            return Ok(format!(
                "Warning: old_text appears {occurrences} times in {}; no changes made. \
                 Provide more surrounding context to make the match unique.",
                path.display()
            ));
        }

        let updated = content.replacen(old_text, new_text, 1);
        match tokio::fs::write(&path, updated).await {
            Ok(()) => Ok(format!("Edited {}", path.display())),
            Err(e) => Ok(format!("Error: Failed to write {}: {e}", path.display())),
        }
    }
}

// ── list_dir ───────────────────────────────────────────────────

pub struct ListDirTool {
    policy: Arc<FsPolicy>,
}

impl ListDirTool {
    pub fn new(policy: Arc<FsPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List the entries of a directory"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Directory path to list" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, _ctx: &ToolContext, args: &Value) -> Result<String> {
        let raw = args["path"].as_str().unwrap_or_default();
        let path = match self.policy.resolve(raw) {
            Ok(p) => p,
            Err(e) => return Ok(e),
        };
        if !path.is_dir() {
            return Ok(format!("Error: Not a directory: {}", path.display()));
        }

        let mut reader = match tokio::fs::read_dir(&path).await {
            Ok(r) => r,
            Err(e) => return Ok(format!("Error: Failed to list {}: {e}", path.display())),
        };

        let mut entries: Vec<(String, bool)> = Vec::new();
        while let Ok(Some(entry)) = reader.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            let is_dir = entry
                .file_type()
                .await
                .map(|ft| ft.is_dir())
                .unwrap_or(false);
            entries.push((name, is_dir));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        if entries.is_empty() {
            return Ok("(empty directory)".into());
        }
        Ok(entries
            .into_iter()
            .map(|(name, is_dir)| {
                if is_dir {
                    format!("[dir]  {name}")
                } else {
                    format!("[file] {name}")
                }
            })
            .collect::<Vec<_>>()
            .join("\n"))
    }
}
