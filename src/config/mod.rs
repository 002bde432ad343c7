//! Configuration management for nanogrip
//!
//! YAML config loaded from, in order of precedence: an explicit `--config`
//! path, the `NANOGRIP_CONFIG` environment variable, or
//! `~/.nanogrip/config.yaml`. A missing file yields the default config;
//! a malformed one is a fatal startup error.

mod types;

pub use types::*;

use std::path::{Path, PathBuf};

use crate::error::Result;

/// Environment variable naming the config file when `--config` is absent.
pub const CONFIG_ENV: &str = "NANOGRIP_CONFIG";

impl Config {
    /// The nanogrip home directory (`~/.nanogrip`).
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".nanogrip")
    }

    /// The default config file path (`~/.nanogrip/config.yaml`).
    pub fn default_path() -> PathBuf {
        Self::dir().join("config.yaml")
    }

    /// Resolve the config path from the optional `--config` flag and the
    /// `NANOGRIP_CONFIG` environment variable.
    pub fn resolve_path(flag: Option<&str>) -> PathBuf {
        if let Some(p) = flag {
            return expand_tilde(p);
        }
        if let Ok(p) = std::env::var(CONFIG_ENV) {
            if !p.is_empty() {
                return expand_tilde(&p);
            }
        }
        Self::default_path()
    }

    /// Load configuration from a path. A missing file yields defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&content)?;
        Ok(cfg)
    }

    /// The workspace path with `~/` expanded.
    pub fn workspace_path(&self) -> PathBuf {
        expand_tilde(&self.agents.defaults.workspace)
    }

    /// Serialize the config back to YAML (used by `init`).
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let cfg = Config::load_from_path(Path::new("/nonexistent/config.yaml")).unwrap();
        assert_eq!(cfg.agents.defaults.max_tokens, 8192);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "agents:\n  defaults:\n    model: test/model\n").unwrap();

        let cfg = Config::load_from_path(&path).unwrap();
        assert_eq!(cfg.agents.defaults.model, "test/model");
    }

    #[test]
    fn test_load_malformed_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "agents: [not a map").unwrap();

        assert!(Config::load_from_path(&path).is_err());
    }

    #[test]
    fn test_expand_tilde() {
        let expanded = expand_tilde("~/foo/bar");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().ends_with("foo/bar"));

        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
    }

    #[test]
    fn test_resolve_path_flag_wins() {
        let p = Config::resolve_path(Some("/tmp/custom.yaml"));
        assert_eq!(p, PathBuf::from("/tmp/custom.yaml"));
    }

    #[test]
    fn test_to_yaml_roundtrip() {
        let cfg = Config::default();
        let yaml = cfg.to_yaml().unwrap();
        let back: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.agents.defaults.model, cfg.agents.defaults.model);
    }
}
