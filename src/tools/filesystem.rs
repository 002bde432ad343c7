//! Filesystem operations tool.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use crate::config::expand_tilde;
use crate::error::{NanoError, Result};

use super::types::str_arg;
use super::{Tool, ToolContext};

/// Read / write / list / delete / exists over files and directories.
///
/// Relative paths resolve against the workspace. When `restrict` is set,
/// every resolved path must stay within the workspace.
pub struct FilesystemTool {
    workspace: PathBuf,
    restrict: bool,
}

impl FilesystemTool {
    pub fn new(workspace: &Path, restrict: bool) -> Self {
        Self {
            workspace: workspace.to_path_buf(),
            restrict,
        }
    }

    fn resolve_path(&self, path: &str) -> Result<PathBuf> {
        let expanded = expand_tilde(path);
        let absolute = if expanded.is_absolute() {
            expanded
        } else {
            self.workspace.join(expanded)
        };

        // Normalize without requiring the file to exist.
        let normalized = normalize(&absolute);

        if self.restrict {
            let workspace = normalize(&self.workspace);
            if !normalized.starts_with(&workspace) {
                return Err(NanoError::Tool(format!(
                    "path '{}' is outside workspace",
                    path
                )));
            }
        }
        Ok(normalized)
    }
}

/// Lexically normalize a path, resolving `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            c => out.push(c),
        }
    }
    out
}

#[async_trait]
impl Tool for FilesystemTool {
    fn name(&self) -> &str {
        "filesystem"
    }

    fn description(&self) -> &str {
        "Perform file operations (read, write, list, delete, exists). Relative paths resolve \
         against the workspace."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["read", "write", "list", "delete", "exists"],
                    "description": "Operation to perform",
                },
                "path": {
                    "type": "string",
                    "description": "File or directory path",
                },
                "content": {
                    "type": "string",
                    "description": "Content to write (for write operation)",
                },
            },
            "required": ["operation", "path"],
        })
    }

    async fn execute(
        &self,
        _cancel: &CancellationToken,
        args: Value,
        _ctx: &ToolContext,
    ) -> Result<String> {
        let operation = str_arg(&args, "operation")
            .ok_or_else(|| NanoError::Tool("missing operation parameter".into()))?;
        let path = str_arg(&args, "path")
            .ok_or_else(|| NanoError::Tool("missing path parameter".into()))?;
        let resolved = self.resolve_path(path)?;

        match operation {
            "read" => Ok(tokio::fs::read_to_string(&resolved).await?),
            "write" => {
                let content = args
                    .get("content")
                    .and_then(|c| c.as_str())
                    .unwrap_or_default();
                if let Some(parent) = resolved.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&resolved, content).await?;
                Ok(format!(
                    "File written successfully: {} ({} bytes)",
                    resolved.display(),
                    content.len()
                ))
            }
            "list" => {
                let mut entries = tokio::fs::read_dir(&resolved).await?;
                let mut lines = Vec::new();
                while let Some(entry) = entries.next_entry().await? {
                    let name = entry.file_name().to_string_lossy().to_string();
                    let meta = entry.metadata().await?;
                    if meta.is_dir() {
                        lines.push(format!("{}/", name));
                    } else {
                        lines.push(format!("{} ({} bytes)", name, meta.len()));
                    }
                }
                if lines.is_empty() {
                    return Ok("(empty directory)".to_string());
                }
                lines.sort();
                Ok(lines.join("\n"))
            }
            "delete" => {
                let meta = tokio::fs::metadata(&resolved).await?;
                if meta.is_dir() {
                    tokio::fs::remove_dir_all(&resolved).await?;
                } else {
                    tokio::fs::remove_file(&resolved).await?;
                }
                Ok(format!("File deleted successfully: {}", resolved.display()))
            }
            "exists" => Ok(resolved.exists().to_string()),
            other => Err(NanoError::Tool(format!("unknown operation: {}", other))),
        }
    }
}
