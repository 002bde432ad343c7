//! `todo` tool — multi-project task lists.
//!
//! On-disk layout under the workspace:
//! - `todos/manifest.json` — project index
//! - `todos/current/<uuid>.json` — one file per active project
//! - `todos/archive/<uuid>.json` — archived projects

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{NanoError, Result};

use super::types::str_arg;
use super::{Tool, ToolContext};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct Manifest {
    projects: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestEntry {
    id: String,
    name: String,
    archived: bool,
    created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Project {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    created_at: String,
    #[serde(default)]
    todos: Vec<TodoItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TodoItem {
    id: String,
    content: String,
    /// pending | in_progress | completed | failed
    status: String,
    /// high | medium | low
    priority: String,
    created_at: String,
    updated_at: String,
}

/// Project/task management tool backed by JSON files.
pub struct TodoTool {
    todos_dir: PathBuf,
}

impl TodoTool {
    pub fn new(workspace: &Path) -> Self {
        Self {
            todos_dir: workspace.join("todos"),
        }
    }

    fn manifest_path(&self) -> PathBuf {
        self.todos_dir.join("manifest.json")
    }

    fn project_path(&self, id: &str, archived: bool) -> PathBuf {
        let sub = if archived { "archive" } else { "current" };
        self.todos_dir.join(sub).join(format!("{}.json", id))
    }

    fn read_manifest(&self) -> Manifest {
        std::fs::read_to_string(self.manifest_path())
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    fn write_manifest(&self, manifest: &Manifest) -> Result<()> {
        std::fs::create_dir_all(&self.todos_dir)?;
        std::fs::write(
            self.manifest_path(),
            serde_json::to_string_pretty(manifest)?,
        )?;
        Ok(())
    }

    fn read_project(&self, id: &str) -> Result<Project> {
        let path = self.project_path(id, false);
        let content = std::fs::read_to_string(&path)
            .map_err(|_| NanoError::NotFound(format!("project {}", id)))?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write_project(&self, project: &Project) -> Result<()> {
        let path = self.project_path(&project.id, false);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(project)?)?;
        Ok(())
    }

    fn create_project(&self, args: &Value) -> Result<String> {
        let Some(name) = str_arg(args, "project_name").or_else(|| str_arg(args, "content")) else {
            return Ok("Error: project_name is required for create_project".to_string());
        };
        let now = Utc::now().to_rfc3339();
        let project = Project {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: str_arg(args, "description").unwrap_or_default().to_string(),
            created_at: now.clone(),
            todos: Vec::new(),
        };
        self.write_project(&project)?;

        let mut manifest = self.read_manifest();
        manifest.projects.push(ManifestEntry {
            id: project.id.clone(),
            name: project.name.clone(),
            archived: false,
            created_at: now,
        });
        self.write_manifest(&manifest)?;

        Ok(format!(
            "Created project '{}' (id: {})",
            project.name, project.id
        ))
    }

    fn list_projects(&self) -> String {
        let manifest = self.read_manifest();
        let active: Vec<&ManifestEntry> =
            manifest.projects.iter().filter(|p| !p.archived).collect();
        if active.is_empty() {
            return "No projects. Use create_project to start one.".to_string();
        }
        let mut out = format!("Projects ({}):\n", active.len());
        for p in active {
            out.push_str(&format!("- {} (id: {})\n", p.name, p.id));
        }
        out
    }

    fn archive_project(&self, args: &Value) -> Result<String> {
        let Some(id) = str_arg(args, "project_id") else {
            return Ok("Error: project_id is required".to_string());
        };
        let current = self.project_path(id, false);
        if !current.exists() {
            return Ok(format!("Project {} not found", id));
        }
        let archived = self.project_path(id, true);
        if let Some(parent) = archived.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::rename(&current, &archived)?;

        let mut manifest = self.read_manifest();
        for entry in manifest.projects.iter_mut() {
            if entry.id == id {
                entry.archived = true;
            }
        }
        self.write_manifest(&manifest)?;
        Ok(format!("Archived project {}", id))
    }

    fn delete_project(&self, args: &Value) -> Result<String> {
        let Some(id) = str_arg(args, "project_id") else {
            return Ok("Error: project_id is required".to_string());
        };
        let mut removed = false;
        for archived in [false, true] {
            let path = self.project_path(id, archived);
            if path.exists() {
                std::fs::remove_file(path)?;
                removed = true;
            }
        }
        if !removed {
            return Ok(format!("Project {} not found", id));
        }
        let mut manifest = self.read_manifest();
        manifest.projects.retain(|p| p.id != id);
        self.write_manifest(&manifest)?;
        Ok(format!("Deleted project {}", id))
    }

    fn add_todo(&self, args: &Value) -> Result<String> {
        let Some(project_id) = str_arg(args, "project_id") else {
            return Ok("Error: project_id is required".to_string());
        };
        let Some(content) = str_arg(args, "content") else {
            return Ok("Error: content is required".to_string());
        };
        let priority = match str_arg(args, "priority") {
            Some(p @ ("high" | "medium" | "low")) => p,
            Some(other) => {
                return Ok(format!(
                    "Error: invalid priority '{}' (use high, medium, or low)",
                    other
                ))
            }
            None => "medium",
        };

        let mut project = self.read_project(project_id)?;
        let now = Utc::now().to_rfc3339();
        let todo = TodoItem {
            id: Uuid::new_v4().to_string(),
            content: content.to_string(),
            status: "pending".to_string(),
            priority: priority.to_string(),
            created_at: now.clone(),
            updated_at: now,
        };
        let id = todo.id.clone();
        project.todos.push(todo);
        self.write_project(&project)?;
        Ok(format!("Added todo '{}' (id: {})", content, id))
    }

    fn list_todos(&self, args: &Value) -> Result<String> {
        let Some(project_id) = str_arg(args, "project_id") else {
            return Ok("Error: project_id is required".to_string());
        };
        let project = self.read_project(project_id)?;
        if project.todos.is_empty() {
            return Ok(format!("Project '{}' has no todos.", project.name));
        }
        let mut out = format!("Todos in '{}' ({}):\n", project.name, project.todos.len());
        for todo in &project.todos {
            out.push_str(&format!(
                "- [{}] {} (id: {}, priority: {})\n",
                todo.status, todo.content, todo.id, todo.priority
            ));
        }
        Ok(out)
    }

    fn update_todo(&self, args: &Value) -> Result<String> {
        let Some(project_id) = str_arg(args, "project_id") else {
            return Ok("Error: project_id is required".to_string());
        };
        let Some(todo_id) = str_arg(args, "todo_id") else {
            return Ok("Error: todo_id is required".to_string());
        };

        let mut project = self.read_project(project_id)?;
        let Some(todo) = project.todos.iter_mut().find(|t| t.id == todo_id) else {
            return Ok(format!("Todo {} not found", todo_id));
        };

        if let Some(status) = str_arg(args, "status") {
            if !["pending", "in_progress", "completed", "failed"].contains(&status) {
                return Ok(format!("Error: invalid status '{}'", status));
            }
            todo.status = status.to_string();
        }
        if let Some(content) = str_arg(args, "content") {
            todo.content = content.to_string();
        }
        if let Some(priority) = str_arg(args, "priority") {
            todo.priority = priority.to_string();
        }
        todo.updated_at = Utc::now().to_rfc3339();
        let status = todo.status.clone();
        self.write_project(&project)?;
        Ok(format!("Updated todo {} (status: {})", todo_id, status))
    }

    fn delete_todo(&self, args: &Value) -> Result<String> {
        let Some(project_id) = str_arg(args, "project_id") else {
            return Ok("Error: project_id is required".to_string());
        };
        let Some(todo_id) = str_arg(args, "todo_id") else {
            return Ok("Error: todo_id is required".to_string());
        };
        let mut project = self.read_project(project_id)?;
        let before = project.todos.len();
        project.todos.retain(|t| t.id != todo_id);
        if project.todos.len() == before {
            return Ok(format!("Todo {} not found", todo_id));
        }
        self.write_project(&project)?;
        Ok(format!("Deleted todo {}", todo_id))
    }
}

#[async_trait]
impl Tool for TodoTool {
    fn name(&self) -> &str {
        "todo"
    }

    fn description(&self) -> &str {
        "Manage task lists for multi-step work. Projects contain todos; create a project \
         first, add todos, update their status as you execute, and archive the project \
         when everything is done."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": [
                        "create_project", "list_projects", "archive_project", "delete_project",
                        "add_todo", "list_todos", "update_todo", "delete_todo",
                    ],
                    "description": "Operation to perform",
                },
                "project_name": {
                    "type": "string",
                    "description": "Project name (for create_project)",
                },
                "description": {
                    "type": "string",
                    "description": "Optional project description",
                },
                "project_id": {
                    "type": "string",
                    "description": "Project ID",
                },
                "todo_id": {
                    "type": "string",
                    "description": "Todo ID",
                },
                "content": {
                    "type": "string",
                    "description": "Todo content",
                },
                "status": {
                    "type": "string",
                    "enum": ["pending", "in_progress", "completed", "failed"],
                    "description": "New todo status",
                },
                "priority": {
                    "type": "string",
                    "enum": ["high", "medium", "low"],
                    "description": "Todo priority (default: medium)",
                },
            },
            "required": ["operation"],
        })
    }

    async fn execute(
        &self,
        _cancel: &CancellationToken,
        args: Value,
        _ctx: &ToolContext,
    ) -> Result<String> {
        let operation = str_arg(&args, "operation").unwrap_or_default();
        match operation {
            "create_project" => self.create_project(&args),
            "list_projects" => Ok(self.list_projects()),
            "archive_project" => self.archive_project(&args),
            "delete_project" => self.delete_project(&args),
            "add_todo" => self.add_todo(&args),
            "list_todos" => self.list_todos(&args),
            "update_todo" => self.update_todo(&args),
            "delete_todo" => self.delete_todo(&args),
            other => Ok(format!("Unknown operation: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn cancel() -> CancellationToken {
        CancellationToken::new()
    }

    async fn run(tool: &TodoTool, args: Value) -> String {
        tool.execute(&cancel(), args, &ToolContext::new())
            .await
            .unwrap()
    }

    fn extract_id(result: &str) -> String {
        result
            .rsplit("(id: ")
            .next()
            .unwrap()
            .trim_end_matches(')')
            .to_string()
    }

    #[tokio::test]
    async fn test_project_lifecycle() {
        let dir = tempdir().unwrap();
        let tool = TodoTool::new(dir.path());

        let result = run(&tool, json!({"operation": "create_project", "project_name": "Release"})).await;
        assert!(result.starts_with("Created project 'Release'"));
        let project_id = extract_id(&result);

        assert!(dir
            .path()
            .join("todos/current")
            .join(format!("{}.json", project_id))
            .exists());
        assert!(dir.path().join("todos/manifest.json").exists());

        let listing = run(&tool, json!({"operation": "list_projects"})).await;
        assert!(listing.contains("Release"));

        let result = run(&tool, json!({"operation": "archive_project", "project_id": project_id})).await;
        assert!(result.starts_with("Archived"));
        assert!(dir
            .path()
            .join("todos/archive")
            .join(format!("{}.json", project_id))
            .exists());

        let listing = run(&tool, json!({"operation": "list_projects"})).await;
        assert!(listing.starts_with("No projects"));
    }

    #[tokio::test]
    async fn test_todo_lifecycle() {
        let dir = tempdir().unwrap();
        let tool = TodoTool::new(dir.path());

        let result = run(&tool, json!({"operation": "create_project", "project_name": "P"})).await;
        let project_id = extract_id(&result);

        let result = run(
            &tool,
            json!({"operation": "add_todo", "project_id": project_id, "content": "write code", "priority": "high"}),
        )
        .await;
        assert!(result.starts_with("Added todo"));
        let todo_id = extract_id(&result);

        let listing = run(&tool, json!({"operation": "list_todos", "project_id": project_id})).await;
        assert!(listing.contains("[pending] write code"));
        assert!(listing.contains("priority: high"));

        let result = run(
            &tool,
            json!({"operation": "update_todo", "project_id": project_id, "todo_id": todo_id, "status": "completed"}),
        )
        .await;
        assert!(result.contains("status: completed"));

        let result = run(
            &tool,
            json!({"operation": "delete_todo", "project_id": project_id, "todo_id": todo_id}),
        )
        .await;
        assert!(result.starts_with("Deleted todo"));

        let listing = run(&tool, json!({"operation": "list_todos", "project_id": project_id})).await;
        assert!(listing.contains("no todos"));
    }

    #[tokio::test]
    async fn test_invalid_priority_and_status() {
        let dir = tempdir().unwrap();
        let tool = TodoTool::new(dir.path());
        let result = run(&tool, json!({"operation": "create_project", "project_name": "P"})).await;
        let project_id = extract_id(&result);

        let result = run(
            &tool,
            json!({"operation": "add_todo", "project_id": project_id, "content": "x", "priority": "urgent"}),
        )
        .await;
        assert!(result.starts_with("Error: invalid priority"));

        let result = run(
            &tool,
            json!({"operation": "add_todo", "project_id": project_id, "content": "x"}),
        )
        .await;
        let todo_id = extract_id(&result);
        let result = run(
            &tool,
            json!({"operation": "update_todo", "project_id": project_id, "todo_id": todo_id, "status": "done"}),
        )
        .await;
        assert!(result.starts_with("Error: invalid status"));
    }

    #[tokio::test]
    async fn test_unknown_project() {
        let dir = tempdir().unwrap();
        let tool = TodoTool::new(dir.path());
        let result = tool
            .execute(
                &cancel(),
                json!({"operation": "list_todos", "project_id": "missing"}),
                &ToolContext::new(),
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_delete_project_removes_everywhere() {
        let dir = tempdir().unwrap();
        let tool = TodoTool::new(dir.path());
        let result = run(&tool, json!({"operation": "create_project", "project_name": "Gone"})).await;
        let project_id = extract_id(&result);

        run(&tool, json!({"operation": "archive_project", "project_id": project_id})).await;
        let result = run(&tool, json!({"operation": "delete_project", "project_id": project_id})).await;
        assert!(result.starts_with("Deleted project"));

        let manifest: Manifest = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("todos/manifest.json")).unwrap(),
        )
        .unwrap();
        assert!(manifest.projects.is_empty());
    }
}
