//! Skill type definitions.

use serde::Deserialize;

/// A loaded skill.
#[derive(Debug, Clone)]
pub struct Skill {
    /// Skill name (directory name)
    pub name: String,
    /// Absolute path to `SKILL.md`
    pub path: String,
    /// "workspace" or "builtin"
    pub source: String,
    /// Full file content including front-matter
    pub content: String,
    /// Parsed front-matter
    pub metadata: SkillMetadata,
    /// Whether all declared requirements are satisfied
    pub available: bool,
}

/// Front-matter fields of a `SKILL.md`.
#[derive(Debug, Clone, Default)]
pub struct SkillMetadata {
    pub name: String,
    pub description: String,
    /// Inject the full skill content into every system prompt
    pub always: bool,
    /// Requirements parsed out of the `metadata` JSON string
    pub requires: SkillRequirements,
}

/// External requirements a skill declares.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SkillRequirements {
    /// Binaries that must be in PATH
    pub bins: Vec<String>,
    /// Environment variables that must be set
    pub env: Vec<String>,
}

/// Shape of the `metadata` JSON string: `{"nanogrip":{"requires":{...}}}`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct MetadataPayload {
    pub nanogrip: NanogripMetadata,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct NanogripMetadata {
    pub requires: SkillRequirements,
}
