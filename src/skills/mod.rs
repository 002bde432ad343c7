//! Skills — Markdown documents that extend the agent's instructions
//!
//! A skill is a directory containing `SKILL.md` with a triple-dash
//! front-matter block carrying `name`, `description`, `always`, and a
//! `metadata` field whose value is a JSON string declaring external
//! requirements (`{"nanogrip":{"requires":{"bins":[...],"env":[...]}}}`).
//!
//! Sources in precedence order: workspace skills (`<workspace>/skills/`)
//! override built-in skills of the same name. Availability is the
//! conjunction of all requirements being satisfied at probe time.
//!
//! Loading is progressive: always-loaded skills pay their full text cost in
//! the system prompt; the rest surface only a catalog entry and are opened
//! on demand via the filesystem tool.

mod loader;
mod types;

pub use loader::SkillsLoader;
pub use types::{Skill, SkillMetadata, SkillRequirements};

/// True when `bin` is found in `PATH`.
pub(crate) fn has_command(bin: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| dir.join(bin).is_file())
}

/// Escape text for inclusion in the XML skills catalog.
pub(crate) fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
