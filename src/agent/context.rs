//! Context builder — assembles the message sequence for one LLM turn
//!
//! The system prompt concatenates, joined by `---` dividers: the core
//! identity (name, capabilities, time, host, workspace), verbatim bootstrap
//! files, the full text of always-loaded skills, the XML skills catalog,
//! and the current memory context. History and the current user turn
//! follow, with images lifted into the multi-part form for vision models.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;

use crate::memory::MemoryStore;
use crate::providers::ChatMessage;
use crate::session::SessionMessage;
use crate::skills::SkillsLoader;

/// Bootstrap files injected verbatim when present in the workspace.
const BOOTSTRAP_FILES: &[&str] = &["AGENTS.md", "SOUL.md", "USER.md", "TOOLS.md", "IDENTITY.md"];

/// Builds the ordered message sequence sent to the LLM.
pub struct ContextBuilder {
    workspace: PathBuf,
    skills: SkillsLoader,
    memory: Arc<MemoryStore>,
}

impl ContextBuilder {
    pub fn new(workspace: &Path, builtin_skills: Option<PathBuf>, memory: Arc<MemoryStore>) -> Self {
        Self {
            workspace: workspace.to_path_buf(),
            skills: SkillsLoader::new(workspace, builtin_skills),
            memory,
        }
    }

    /// Build the full sequence: system message, bounded history, current
    /// user turn. Media entries become `[Media URL: ...]`/`[File: ...]`
    /// annotations; images additionally ride the message's image list.
    pub fn build_messages(
        &self,
        history: &[SessionMessage],
        current: &str,
        channel: &str,
        chat_id: &str,
        media: &[String],
    ) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(&self.build_system_prompt(channel, chat_id))];

        for entry in history {
            if entry.content.is_empty() && !entry.has_tool_calls() {
                continue;
            }
            messages.push(entry.into());
        }

        let mut content = current.to_string();
        let mut images = Vec::new();
        for item in media {
            if item.starts_with("http://") || item.starts_with("https://") {
                content.push_str(&format!("\n[Media URL: {}]", item));
                if has_image_extension(item) {
                    images.push(item.clone());
                }
            } else if item.starts_with("data:image/") {
                images.push(item.clone());
            } else {
                content.push_str(&format!("\n[File: {}]", item));
            }
        }

        messages.push(if images.is_empty() {
            ChatMessage::user(&content)
        } else {
            ChatMessage::user_with_images(&content, images)
        });

        messages
    }

    /// The full system prompt, parts joined by `---` dividers, ending with
    /// an echo of the current routing.
    pub fn build_system_prompt(&self, channel: &str, chat_id: &str) -> String {
        let mut parts = vec![self.identity()];

        let bootstrap = self.load_bootstrap_files();
        if !bootstrap.is_empty() {
            parts.push(bootstrap);
        }

        let always = self.skills.always_skills();
        if !always.is_empty() {
            let content = self.skills.load_skills_for_context(&always);
            if !content.is_empty() {
                parts.push(format!("# Active Skills\n\n{}", content));
            }
        }

        let catalog = self.skills.build_skills_summary();
        if !catalog.is_empty() {
            parts.push(format!(
                "# Skills\n\n\
                 The following skills extend your capabilities. To use one, read its SKILL.md \
                 with the filesystem tool at the path in its <location> tag.\n\n\
                 Skills with available=\"false\" need dependencies installed first; you can try \
                 installing them yourself.\n\n{}",
                catalog
            ));
        }

        let memory = self.memory.memory_context();
        if !memory.is_empty() {
            parts.push(memory);
        }

        let mut prompt = parts.join("\n\n---\n\n");
        if !channel.is_empty() {
            prompt.push_str(&format!("\n\nCurrent channel: {}", channel));
        }
        if !chat_id.is_empty() {
            prompt.push_str(&format!("\nChat ID: {}", chat_id));
        }
        prompt
    }

    fn identity(&self) -> String {
        let now = Local::now();
        let workspace = self.workspace.display();

        format!(
            r#"# nanogrip 🐈

You are nanogrip, a helpful personal AI assistant. You have access to tools that allow you to:
- Read, write, and manage files (filesystem)
- Execute non-interactive shell commands (shell)
- Search the web for current information (web_search)
- Send messages to users on chat channels (message)
- Spawn subagents for parallel background tasks (spawn)
- Schedule reminders and recurring tasks (cron)
- Manage task lists for multi-step projects (todo)
- Save long-term memory and history (save_memory)

## Working Style
- For simple questions, reply directly — no tools needed.
- For multi-step tasks, create a todo project first, then execute step by
  step, updating each todo's status as you go. Archive the project when done.
- Use spawn for long-running or parallel work; the subagent notifies you
  when it completes.
- Before calling tools, briefly tell the user what you're about to do (one
  short sentence in the user's language). Never send a "let me check"
  message without actually calling a tool.
- The shell tool is non-interactive: commands that prompt for passwords or
  confirmations will hang and fail.

## Current Time
{} ({})

## Runtime
{} {}

## Workspace
Your workspace is at: {}
- Long-term memory: {}/memory/MEMORY.md
- History log: {}/memory/HISTORY.md (grep-searchable)

When remembering something important, write to MEMORY.md. To recall past
events, grep HISTORY.md."#,
            now.format("%Y-%m-%d %H:%M (%A)"),
            now.format("%Z"),
            std::env::consts::OS,
            std::env::consts::ARCH,
            workspace,
            workspace,
            workspace,
        )
    }

    fn load_bootstrap_files(&self) -> String {
        let mut parts = Vec::new();
        for filename in BOOTSTRAP_FILES {
            let path = self.workspace.join(filename);
            if let Ok(content) = std::fs::read_to_string(&path) {
                parts.push(format!("## {}\n\n{}", filename, content));
            }
        }
        parts.join("\n\n")
    }
}

fn has_image_extension(url: &str) -> bool {
    let lower = url.to_lowercase();
    [".jpg", ".jpeg", ".png", ".gif", ".webp"]
        .iter()
        .any(|ext| lower.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;
    use tempfile::tempdir;

    fn builder(workspace: &Path) -> ContextBuilder {
        ContextBuilder::new(workspace, None, Arc::new(MemoryStore::new(workspace)))
    }

    #[test]
    fn test_system_prompt_identity_and_routing() {
        let dir = tempdir().unwrap();
        let cb = builder(dir.path());

        let prompt = cb.build_system_prompt("telegram", "chat42");
        assert!(prompt.contains("nanogrip"));
        assert!(prompt.contains("## Workspace"));
        assert!(prompt.contains("Current channel: telegram"));
        assert!(prompt.contains("Chat ID: chat42"));
    }

    #[test]
    fn test_bootstrap_files_injected_verbatim() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("SOUL.md"), "Be kind and curious.").unwrap();
        std::fs::write(dir.path().join("USER.md"), "The user's name is Ada.").unwrap();

        let cb = builder(dir.path());
        let prompt = cb.build_system_prompt("cli", "direct");
        assert!(prompt.contains("## SOUL.md"));
        assert!(prompt.contains("Be kind and curious."));
        assert!(prompt.contains("The user's name is Ada."));
    }

    #[test]
    fn test_memory_included_when_present() {
        let dir = tempdir().unwrap();
        let memory = Arc::new(MemoryStore::new(dir.path()));
        memory.write_long_term("- favourite editor: helix").unwrap();
        let cb = ContextBuilder::new(dir.path(), None, memory);

        let prompt = cb.build_system_prompt("cli", "direct");
        assert!(prompt.contains("## Long-term Memory"));
        assert!(prompt.contains("favourite editor"));
    }

    #[test]
    fn test_skills_catalog_in_prompt() {
        let dir = tempdir().unwrap();
        let skill_dir = dir.path().join("skills/tmux");
        std::fs::create_dir_all(&skill_dir).unwrap();
        std::fs::write(
            skill_dir.join("SKILL.md"),
            "---\nname: tmux\ndescription: Interactive terminal sessions\n---\n\nUse tmux for…",
        )
        .unwrap();

        let cb = builder(dir.path());
        let prompt = cb.build_system_prompt("cli", "direct");
        assert!(prompt.contains("<skills>"));
        assert!(prompt.contains("<name>tmux</name>"));
        // Not always-loaded, so the body is not injected
        assert!(!prompt.contains("Use tmux for…"));
    }

    #[test]
    fn test_always_skill_fully_injected() {
        let dir = tempdir().unwrap();
        let skill_dir = dir.path().join("skills/core");
        std::fs::create_dir_all(&skill_dir).unwrap();
        std::fs::write(
            skill_dir.join("SKILL.md"),
            "---\nname: core\ndescription: Core rules\nalways: true\n---\n\nAlways verify outputs.",
        )
        .unwrap();

        let cb = builder(dir.path());
        let prompt = cb.build_system_prompt("cli", "direct");
        assert!(prompt.contains("# Active Skills"));
        assert!(prompt.contains("Always verify outputs."));
    }

    #[test]
    fn test_build_messages_order() {
        let dir = tempdir().unwrap();
        let cb = builder(dir.path());

        let history = vec![
            SessionMessage::user("earlier question"),
            SessionMessage::assistant("earlier answer"),
        ];
        let messages = cb.build_messages(&history, "new question", "cli", "direct", &[]);

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "earlier question");
        assert_eq!(messages[2].content, "earlier answer");
        assert_eq!(messages[3].content, "new question");
    }

    #[test]
    fn test_build_messages_skips_empty_history_entries() {
        let dir = tempdir().unwrap();
        let cb = builder(dir.path());

        let history = vec![SessionMessage::assistant(""), SessionMessage::user("real")];
        let messages = cb.build_messages(&history, "q", "cli", "direct", &[]);
        assert_eq!(messages.len(), 3); // system + "real" + current
    }

    #[test]
    fn test_media_handling() {
        let dir = tempdir().unwrap();
        let cb = builder(dir.path());

        let media = vec![
            "https://example.com/photo.png".to_string(),
            "data:image/jpeg;base64,AAAA".to_string(),
            "/tmp/report.pdf".to_string(),
        ];
        let messages = cb.build_messages(&[], "look at these", "cli", "direct", &media);

        let user = messages.last().unwrap();
        assert!(user.content.contains("[Media URL: https://example.com/photo.png]"));
        assert!(user.content.contains("[File: /tmp/report.pdf]"));
        // Image URL and the data URL are both lifted into the image list
        assert_eq!(user.images.len(), 2);
        // The base64 payload is not inlined into the text
        assert!(!user.content.contains("base64"));
    }
}
