//! Two-tier long-term memory
//!
//! `MEMORY.md` holds the curated long-term store, read fully on every turn
//! and rewritten only through the `save_memory` tool. `HISTORY.md` is an
//! append-only log of grep-friendly paragraphs, each starting with a
//! `[YYYY-MM-DD HH:MM]` marker. Per-day notes (`YYYY-MM-DD.md`) hold smaller
//! working-memory entries.

use std::path::{Path, PathBuf};

use chrono::Local;

use crate::error::Result;

/// File-backed memory store rooted at `<workspace>/memory/`.
pub struct MemoryStore {
    memory_dir: PathBuf,
    memory_file: PathBuf,
    history_file: PathBuf,
}

impl MemoryStore {
    /// Create a store and ensure the memory directory exists.
    pub fn new(workspace: &Path) -> Self {
        let memory_dir = workspace.join("memory");
        let _ = std::fs::create_dir_all(&memory_dir);
        Self {
            memory_file: memory_dir.join("MEMORY.md"),
            history_file: memory_dir.join("HISTORY.md"),
            memory_dir,
        }
    }

    /// Full content of `MEMORY.md`, or empty if absent.
    pub fn read_long_term(&self) -> String {
        std::fs::read_to_string(&self.memory_file).unwrap_or_default()
    }

    /// Overwrite `MEMORY.md`.
    pub fn write_long_term(&self, content: &str) -> Result<()> {
        std::fs::write(&self.memory_file, content)?;
        Ok(())
    }

    /// Append a paragraph to `HISTORY.md`, normalized to end with a blank
    /// line so entries stay grep-separable.
    pub fn append_history(&self, entry: &str) -> Result<()> {
        use std::io::Write;

        let mut entry = entry.trim_end().to_string();
        entry.push_str("\n\n");

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.history_file)?;
        file.write_all(entry.as_bytes())?;
        Ok(())
    }

    /// Path of today's notes file (`memory/YYYY-MM-DD.md`).
    pub fn today_file(&self) -> PathBuf {
        let today = Local::now().format("%Y-%m-%d");
        self.memory_dir.join(format!("{}.md", today))
    }

    /// Content of today's notes, or empty if absent.
    pub fn read_today(&self) -> String {
        std::fs::read_to_string(self.today_file()).unwrap_or_default()
    }

    /// Append to today's notes, creating the file with a date header on
    /// first write.
    pub fn append_today(&self, content: &str) -> Result<()> {
        let path = self.today_file();
        let new_content = match std::fs::read_to_string(&path) {
            Ok(existing) => format!("{}\n\n{}", existing.trim_end_matches('\n'), content),
            Err(_) => format!("# {}\n\n{}", Local::now().format("%Y-%m-%d"), content),
        };
        std::fs::write(&path, new_content)?;
        Ok(())
    }

    /// Memory section for the system prompt: long-term store plus today's
    /// notes, or empty when neither exists.
    pub fn memory_context(&self) -> String {
        let mut parts = Vec::new();

        let long_term = self.read_long_term();
        if !long_term.is_empty() {
            parts.push(format!("## Long-term Memory\n{}", long_term));
        }

        let today = self.read_today();
        if !today.is_empty() {
            parts.push(format!("## Today's Notes\n{}", today));
        }

        parts.join("\n\n")
    }

    /// Path of `MEMORY.md`.
    pub fn memory_file(&self) -> &Path {
        &self.memory_file
    }

    /// Path of `HISTORY.md`.
    pub fn history_file(&self) -> &Path {
        &self.history_file
    }
}
