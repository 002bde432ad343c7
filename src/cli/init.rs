//! `init` command — create the workspace tree and a default config.

use anyhow::Result;
use std::path::Path;

use crate::config::Config;

/// Create `sessions/`, `memory/`, `skills/`, `todos/` under the workspace
/// and write a default config file if none exists.
pub async fn cmd_init(config: Config, config_path: &Path) -> Result<()> {
    let workspace = config.workspace_path();

    for sub in ["sessions", "memory", "skills", "todos"] {
        let dir = workspace.join(sub);
        std::fs::create_dir_all(&dir)?;
        println!("created {}", dir.display());
    }

    if config_path.exists() {
        println!("config exists at {}", config_path.display());
    } else {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(config_path, config.to_yaml()?)?;
        println!("wrote default config to {}", config_path.display());
    }

    println!("workspace ready at {}", workspace.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_creates_tree_and_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.agents.defaults.workspace =
            dir.path().join("workspace").to_string_lossy().to_string();
        let config_path = dir.path().join("config.yaml");

        cmd_init(config.clone(), &config_path).await.unwrap();

        for sub in ["sessions", "memory", "skills", "todos"] {
            assert!(dir.path().join("workspace").join(sub).is_dir());
        }
        assert!(config_path.is_file());

        // Second run leaves the existing config alone
        std::fs::write(&config_path, "# customized\n").unwrap();
        cmd_init(config, &config_path).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&config_path).unwrap(),
            "# customized\n"
        );
    }
}
