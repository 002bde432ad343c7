//! Skill discovery and front-matter parsing.

use std::path::{Path, PathBuf};

use super::types::{MetadataPayload, Skill, SkillMetadata};
use super::{escape_xml, has_command};

/// Scans the workspace and built-in skill directories.
pub struct SkillsLoader {
    workspace_skills: PathBuf,
    builtin_skills: Option<PathBuf>,
}

impl SkillsLoader {
    /// Create a loader over `<workspace>/skills/` plus an optional built-in
    /// skills directory.
    pub fn new(workspace: &Path, builtin_skills: Option<PathBuf>) -> Self {
        Self {
            workspace_skills: workspace.join("skills"),
            builtin_skills,
        }
    }

    /// List all skills. Workspace skills shadow built-in skills of the same
    /// name. When `available_only` is set, skills with unmet requirements
    /// are filtered out.
    pub fn list_skills(&self, available_only: bool) -> Vec<Skill> {
        let mut result: Vec<Skill> = Vec::new();

        for skill in self.scan_dir(&self.workspace_skills, "workspace") {
            result.push(skill);
        }

        if let Some(builtin) = &self.builtin_skills {
            for skill in self.scan_dir(builtin, "builtin") {
                if !result.iter().any(|s| s.name == skill.name) {
                    result.push(skill);
                }
            }
        }

        if available_only {
            result.retain(|s| s.available);
        }
        result.sort_by(|a, b| a.name.cmp(&b.name));
        result
    }

    /// Load one skill by name, workspace first.
    pub fn load_skill(&self, name: &str) -> Option<Skill> {
        let ws = self.workspace_skills.join(name).join("SKILL.md");
        if ws.is_file() {
            return self.load_from(&ws, name, "workspace");
        }
        if let Some(builtin) = &self.builtin_skills {
            let path = builtin.join(name).join("SKILL.md");
            if path.is_file() {
                return self.load_from(&path, name, "builtin");
            }
        }
        None
    }

    /// Names of available skills flagged `always: true`.
    pub fn always_skills(&self) -> Vec<String> {
        self.list_skills(true)
            .into_iter()
            .filter(|s| s.metadata.always)
            .map(|s| s.name)
            .collect()
    }

    /// Concatenated full content (front-matter stripped) of the named
    /// skills, for injection into the system prompt.
    pub fn load_skills_for_context(&self, names: &[String]) -> String {
        let mut parts = Vec::new();
        for name in names {
            if let Some(skill) = self.load_skill(name) {
                let body = strip_frontmatter(&skill.content);
                parts.push(format!("### Skill: {}\n\n{}", name, body));
            }
        }
        parts.join("\n\n---\n\n")
    }

    /// XML-shaped catalog of every discovered skill: name, description,
    /// location, availability, and missing requirements for unavailable
    /// skills.
    pub fn build_skills_summary(&self) -> String {
        let skills = self.list_skills(false);
        if skills.is_empty() {
            return String::new();
        }

        let mut lines = vec!["<skills>".to_string()];
        for skill in &skills {
            lines.push(format!("  <skill available=\"{}\">", skill.available));
            lines.push(format!("    <name>{}</name>", escape_xml(&skill.name)));
            lines.push(format!(
                "    <description>{}</description>",
                escape_xml(&skill.metadata.description)
            ));
            lines.push(format!("    <location>{}</location>", skill.path));
            if !skill.available {
                let missing = missing_requirements(&skill.metadata);
                if !missing.is_empty() {
                    lines.push(format!("    <requires>{}</requires>", escape_xml(&missing)));
                }
            }
            lines.push("  </skill>".to_string());
        }
        lines.push("</skills>".to_string());
        lines.join("\n")
    }

    fn scan_dir(&self, dir: &Path, source: &str) -> Vec<Skill> {
        let mut skills = Vec::new();
        let Ok(entries) = std::fs::read_dir(dir) else {
            return skills;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let skill_file = path.join("SKILL.md");
            if !skill_file.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(skill) = self.load_from(&skill_file, &name, source) {
                skills.push(skill);
            }
        }
        skills
    }

    fn load_from(&self, path: &Path, name: &str, source: &str) -> Option<Skill> {
        let content = std::fs::read_to_string(path).ok()?;
        let metadata = parse_skill_metadata(&content, name);
        let available = check_requirements(&metadata);
        let abs = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf());

        Some(Skill {
            name: name.to_string(),
            path: abs.to_string_lossy().to_string(),
            source: source.to_string(),
            content,
            metadata,
            available,
        })
    }
}

/// Parse the triple-dash front-matter block. Line-based: `key: value` pairs
/// only, with the `metadata` value being a JSON string.
fn parse_skill_metadata(content: &str, fallback_name: &str) -> SkillMetadata {
    let mut meta = SkillMetadata {
        name: fallback_name.to_string(),
        ..Default::default()
    };

    let Some(block) = frontmatter_block(content) else {
        meta.description = meta.name.clone();
        return meta;
    };

    for line in block.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim().trim_matches('"').trim_matches('\'');
        match key {
            "name" => meta.name = value.to_string(),
            "description" => meta.description = value.to_string(),
            "always" => meta.always = value == "true",
            "metadata" => {
                if let Ok(payload) = serde_json::from_str::<MetadataPayload>(value) {
                    meta.requires = payload.nanogrip.requires;
                }
            }
            _ => {}
        }
    }

    if meta.description.is_empty() {
        meta.description = meta.name.clone();
    }
    meta
}

/// The content between the first `---` line and the next one, if present.
fn frontmatter_block(content: &str) -> Option<&str> {
    let rest = content.strip_prefix("---")?;
    let rest = rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n"))?;
    let end = rest.find("\n---")?;
    Some(&rest[..end])
}

/// Everything after the front-matter block, or the whole content.
fn strip_frontmatter(content: &str) -> &str {
    let Some(rest) = content.strip_prefix("---") else {
        return content;
    };
    match rest.find("\n---") {
        Some(end) => {
            let after = &rest[end + 4..];
            after.trim_start_matches(['-', '\n', '\r'])
        }
        None => content,
    }
}

fn check_requirements(meta: &SkillMetadata) -> bool {
    meta.requires.bins.iter().all(|b| has_command(b))
        && meta
            .requires
            .env
            .iter()
            .all(|e| std::env::var(e).map(|v| !v.is_empty()).unwrap_or(false))
}

/// "CLI: git, ENV: API_KEY" style summary of unmet requirements.
fn missing_requirements(meta: &SkillMetadata) -> String {
    let mut missing = Vec::new();
    for bin in &meta.requires.bins {
        if !has_command(bin) {
            missing.push(format!("CLI: {}", bin));
        }
    }
    for env in &meta.requires.env {
        if std::env::var(env).map(|v| v.is_empty()).unwrap_or(true) {
            missing.push(format!("ENV: {}", env));
        }
    }
    missing.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_skill(root: &Path, name: &str, frontmatter: &str, body: &str) {
        let dir = root.join("skills").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("SKILL.md"),
            format!("---\n{}\n---\n\n{}", frontmatter, body),
        )
        .unwrap();
    }

    #[test]
    fn test_parse_frontmatter() {
        let meta = parse_skill_metadata(
            "---\nname: git-ops\ndescription: \"Git operations\"\nalways: true\n---\n\nBody",
            "dir-name",
        );
        assert_eq!(meta.name, "git-ops");
        assert_eq!(meta.description, "Git operations");
        assert!(meta.always);
    }

    #[test]
    fn test_parse_requirements_json() {
        let meta = parse_skill_metadata(
            r#"---
name: deploy
description: Deploy things
metadata: '{"nanogrip":{"requires":{"bins":["kubectl"],"env":["KUBECONFIG"]}}}'
---
Body"#,
            "deploy",
        );
        assert_eq!(meta.requires.bins, vec!["kubectl"]);
        assert_eq!(meta.requires.env, vec!["KUBECONFIG"]);
    }

    #[test]
    fn test_no_frontmatter_falls_back_to_dir_name() {
        let meta = parse_skill_metadata("Just a document", "fallback");
        assert_eq!(meta.name, "fallback");
        assert_eq!(meta.description, "fallback");
    }

    #[test]
    fn test_strip_frontmatter() {
        let content = "---\nname: x\n---\n\nThe body";
        assert_eq!(strip_frontmatter(content), "The body");
        assert_eq!(strip_frontmatter("no frontmatter"), "no frontmatter");
    }

    #[test]
    fn test_workspace_overrides_builtin() {
        let ws = tempdir().unwrap();
        let builtin = tempdir().unwrap();

        write_skill(ws.path(), "tmux", "name: tmux\ndescription: workspace version", "ws body");
        write_skill(
            builtin.path(),
            "tmux",
            "name: tmux\ndescription: builtin version",
            "builtin body",
        );
        write_skill(
            builtin.path(),
            "extra",
            "name: extra\ndescription: only builtin",
            "extra body",
        );

        let loader = SkillsLoader::new(ws.path(), Some(builtin.path().join("skills")));
        let skills = loader.list_skills(false);
        assert_eq!(skills.len(), 2);

        let tmux = skills.iter().find(|s| s.name == "tmux").unwrap();
        assert_eq!(tmux.source, "workspace");
        assert_eq!(tmux.metadata.description, "workspace version");
    }

    #[test]
    fn test_unavailable_skill_lists_missing_requirements() {
        let ws = tempdir().unwrap();
        write_skill(
            ws.path(),
            "ghost",
            r#"name: ghost
description: Needs a missing binary
metadata: '{"nanogrip":{"requires":{"bins":["definitely-not-a-real-binary-xyz"]}}}'"#,
            "body",
        );

        let loader = SkillsLoader::new(ws.path(), None);
        let skills = loader.list_skills(false);
        assert_eq!(skills.len(), 1);
        assert!(!skills[0].available);

        let summary = loader.build_skills_summary();
        assert!(summary.contains("available=\"false\""));
        assert!(summary.contains("CLI: definitely-not-a-real-binary-xyz"));

        // And it disappears from the available-only listing
        assert!(loader.list_skills(true).is_empty());
    }

    #[test]
    fn test_always_skills_and_context_loading() {
        let ws = tempdir().unwrap();
        write_skill(
            ws.path(),
            "core",
            "name: core\ndescription: Core rules\nalways: true",
            "Always follow the core rules.",
        );
        write_skill(ws.path(), "optional", "name: optional\ndescription: Opt", "Optional body");

        let loader = SkillsLoader::new(ws.path(), None);
        assert_eq!(loader.always_skills(), vec!["core".to_string()]);

        let ctx = loader.load_skills_for_context(&["core".to_string()]);
        assert!(ctx.contains("### Skill: core"));
        assert!(ctx.contains("Always follow the core rules."));
        assert!(!ctx.contains("---\nname:"));
    }

    #[test]
    fn test_summary_empty_when_no_skills() {
        let ws = tempdir().unwrap();
        let loader = SkillsLoader::new(ws.path(), None);
        assert!(loader.build_skills_summary().is_empty());
    }
}
