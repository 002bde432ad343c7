//! `gateway` command — the full multi-channel system.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::channels::{Channel, ChannelManager, DingTalkChannel, SlackChannel};
use crate::config::Config;
use crate::gateway::GatewayServer;

use super::runtime::Runtime;

/// Wait this long for in-flight tasks during shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Start channels, scheduler, agent loop, and the webhook server; run
/// until SIGINT/SIGTERM.
pub async fn cmd_gateway(config: Config) -> Result<()> {
    let runtime = Runtime::build(config).await?;
    let cancel = CancellationToken::new();

    runtime.cron.start(&cancel).await;

    let agent = Arc::clone(&runtime.agent);
    let agent_task = tokio::spawn(agent.run(cancel.clone()));

    // Polling channels start through the manager; webhook channels are
    // constructed here so the gateway server can own their HTTP intake.
    let channels = Arc::new(ChannelManager::new(Arc::clone(&runtime.bus)));
    channels.start_all(&runtime.config, &cancel).await;

    let mut server = GatewayServer::new(
        &runtime.config.gateway.host,
        runtime.config.gateway.port,
    );
    if runtime.config.channels.slack.enabled {
        let slack = Arc::new(SlackChannel::new(
            &runtime.config.channels.slack,
            Arc::clone(&runtime.bus),
        ));
        match slack.start(&cancel).await {
            Ok(()) => {
                channels.register(Arc::clone(&slack) as Arc<dyn Channel>).await;
                server = server.with_slack(&runtime.config.channels.slack.webhook_path, slack);
            }
            Err(e) => warn!(error = %e, "Failed to start Slack channel"),
        }
    }
    if runtime.config.channels.dingtalk.enabled {
        let dingtalk = Arc::new(DingTalkChannel::new(
            &runtime.config.channels.dingtalk,
            Arc::clone(&runtime.bus),
        ));
        match dingtalk.start(&cancel).await {
            Ok(()) => {
                channels.register(Arc::clone(&dingtalk) as Arc<dyn Channel>).await;
                server = server.with_dingtalk(dingtalk);
            }
            Err(e) => warn!(error = %e, "Failed to start DingTalk channel"),
        }
    }
    server.start(&cancel).await?;

    let dispatch_task = tokio::spawn(Arc::clone(&channels).dispatch_outbound(cancel.clone()));

    let enabled = channels.list().await;
    info!(channels = ?enabled, "🐈 nanogrip gateway running");
    println!("🐈 nanogrip gateway running. Press Ctrl-C to stop.");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    // Shutdown sequence: subagents → cancel → channels → bounded wait for
    // the loop tasks → scheduler → bus.
    runtime.subagents.stop_all();
    cancel.cancel();
    channels.stop_all().await;

    let drain = async {
        let _ = agent_task.await;
        let _ = dispatch_task.await;
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        warn!("Timed out waiting for tasks to stop");
    }

    runtime.cron.stop().await;
    runtime.bus.close();
    info!("Gateway stopped");
    Ok(())
}
