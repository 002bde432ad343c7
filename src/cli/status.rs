//! `status` command — print the effective configuration summary.

use anyhow::Result;

use crate::config::Config;

/// Print workspace, model, gateway port, and enabled channels.
pub async fn cmd_status(config: Config) -> Result<()> {
    println!("nanogrip {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("workspace: {}", config.workspace_path().display());
    println!("model:     {}", config.agents.defaults.model);
    println!(
        "gateway:   {}:{}",
        config.gateway.host, config.gateway.port
    );

    let mut enabled = Vec::new();
    if config.channels.telegram.enabled {
        enabled.push("telegram");
    }
    if config.channels.whatsapp.enabled {
        enabled.push("whatsapp");
    }
    if config.channels.discord.enabled {
        enabled.push("discord");
    }
    if config.channels.slack.enabled {
        enabled.push("slack");
    }
    if config.channels.dingtalk.enabled {
        enabled.push("dingtalk");
    }
    if enabled.is_empty() {
        println!("channels:  (none enabled)");
    } else {
        println!("channels:  {}", enabled.join(", "));
    }
    Ok(())
}
