//! Shared runtime wiring for the agent and gateway commands.

use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::agent::{AgentLoop, SubagentManager};
use crate::bus::MessageBus;
use crate::config::Config;
use crate::cron::{AgentExecutor, CronService};
use crate::error::Result;
use crate::memory::MemoryStore;
use crate::providers::provider_from_config;
use crate::session::SessionManager;
use crate::tools::{
    CronTool, FilesystemTool, MessageTool, SaveMemoryTool, ShellTool, SpawnTool, TodoTool,
    ToolRegistry, WebSearchTool,
};

/// Everything a running nanogrip process shares.
pub struct Runtime {
    pub config: Config,
    pub bus: Arc<MessageBus>,
    pub sessions: Arc<SessionManager>,
    pub memory: Arc<MemoryStore>,
    pub tools: Arc<RwLock<ToolRegistry>>,
    pub cron: Arc<CronService>,
    pub subagents: Arc<SubagentManager>,
    pub agent: Arc<AgentLoop>,
}

impl Runtime {
    /// Wire the core subsystems from config, leaves first: bus, stores,
    /// tool registry, provider, scheduler, subagents, agent loop.
    pub async fn build(config: Config) -> Result<Self> {
        let workspace = config.workspace_path();
        std::fs::create_dir_all(&workspace)?;
        let defaults = &config.agents.defaults;

        let bus = Arc::new(MessageBus::new());
        let sessions = Arc::new(SessionManager::new(&workspace));
        let memory = Arc::new(MemoryStore::new(&workspace));
        let provider = provider_from_config(&config)?;

        let tools = Arc::new(RwLock::new(ToolRegistry::new()));
        {
            let mut registry = tools.write().await;
            registry.register(Box::new(ShellTool::new(config.tools.exec.timeout)));
            registry.register(Box::new(FilesystemTool::new(
                &workspace,
                config.tools.restrict_to_workspace,
            )));
            registry.register(Box::new(WebSearchTool::new(&config.tools.web.search)));
            registry.register(Box::new(TodoTool::new(&workspace)));
            registry.register(Box::new(SaveMemoryTool::new(Arc::clone(&memory))));
            registry.register(Box::new(MessageTool::new(Arc::clone(&bus))));
        }

        let cron = Arc::new(CronService::new(Arc::clone(&bus)));
        tools
            .write()
            .await
            .register(Box::new(CronTool::new(Arc::clone(&cron))));

        let subagents = Arc::new(SubagentManager::new(
            Arc::clone(&provider),
            workspace.clone(),
            Arc::clone(&bus),
            Arc::clone(&tools),
            &defaults.model,
            defaults.max_tokens,
            defaults.temperature,
            defaults.max_tool_iterations,
        ));
        {
            let subagents = Arc::clone(&subagents);
            tools
                .write()
                .await
                .register(Box::new(SpawnTool::new(Box::new(
                    move |task, label, channel, chat_id| {
                        subagents.spawn(task, label, channel, chat_id)
                    },
                ))));
        }

        let agent = Arc::new(AgentLoop::new(
            &config,
            provider,
            Arc::clone(&tools),
            Arc::clone(&bus),
            Arc::clone(&sessions),
            Arc::clone(&memory),
        ));
        cron.set_agent_executor(Arc::clone(&agent) as Arc<dyn AgentExecutor>);

        info!(
            workspace = %workspace.display(),
            model = %config.agents.defaults.model,
            tools = tools.read().await.len(),
            "Runtime assembled"
        );

        Ok(Self {
            config,
            bus,
            sessions,
            memory,
            tools,
            cron,
            subagents,
            agent,
        })
    }

    /// Orderly shutdown: stop subagents, cancel everything, stop the
    /// scheduler, close the bus. Double-close of the bus is harmless.
    pub async fn shutdown(&self, cancel: &CancellationToken) {
        self.subagents.stop_all();
        cancel.cancel();
        self.cron.stop().await;
        self.bus.close();
    }
}
