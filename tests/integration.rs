//! Integration tests for nanogrip
//!
//! These wire real components together — bus, agent loop, session store,
//! tools, scheduler, subagents — around a scripted LLM provider, and walk
//! the full message paths end to end.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use nanogrip::agent::{AgentLoop, SubagentManager};
use nanogrip::bus::{InboundMessage, MessageBus, OutboundMessage};
use nanogrip::channels::{Channel, ChannelManager};
use nanogrip::config::Config;
use nanogrip::cron::{CronService, Schedule};
use nanogrip::error::Result;
use nanogrip::memory::MemoryStore;
use nanogrip::providers::{
    ChatMessage, ChatOptions, LLMProvider, LLMResponse, LLMToolCall, ToolDefinition,
};
use nanogrip::session::SessionManager;
use nanogrip::tools::{FilesystemTool, ToolRegistry};

// ============================================================================
// Scripted provider
// ============================================================================

struct ScriptedProvider {
    responses: std::sync::Mutex<Vec<LLMResponse>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn new(responses: Vec<LLMResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: std::sync::Mutex::new(responses),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn chat(
        &self,
        _cancel: &CancellationToken,
        _messages: Vec<ChatMessage>,
        _tools: Vec<ToolDefinition>,
        _model: Option<&str>,
        _options: ChatOptions,
    ) -> Result<LLMResponse> {
        let i = self.calls.fetch_add(1, Ordering::SeqCst);
        let responses = self.responses.lock().unwrap();
        Ok(responses
            .get(i)
            .cloned()
            .unwrap_or_else(|| LLMResponse::text("script exhausted")))
    }

    fn default_model(&self) -> &str {
        "test-model"
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn tool_call(id: &str, name: &str, arguments: &str) -> LLMResponse {
    LLMResponse {
        content: String::new(),
        tool_calls: vec![LLMToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }],
        usage: None,
    }
}

struct Harness {
    workspace: TempDir,
    bus: Arc<MessageBus>,
    sessions: Arc<SessionManager>,
    tools: Arc<RwLock<ToolRegistry>>,
    agent: Arc<AgentLoop>,
    provider: Arc<ScriptedProvider>,
}

async fn harness(responses: Vec<LLMResponse>) -> Harness {
    let workspace = TempDir::new().unwrap();
    let mut config = Config::default();
    config.agents.defaults.workspace = workspace.path().to_string_lossy().to_string();

    let provider = ScriptedProvider::new(responses);
    let bus = Arc::new(MessageBus::new());
    let sessions = Arc::new(SessionManager::new(workspace.path()));
    let memory = Arc::new(MemoryStore::new(workspace.path()));

    let mut registry = ToolRegistry::new();
    registry.register(Box::new(FilesystemTool::new(workspace.path(), false)));
    let tools = Arc::new(RwLock::new(registry));

    let agent = Arc::new(AgentLoop::new(
        &config,
        { let p: Arc<dyn LLMProvider> = provider.clone(); p },
        Arc::clone(&tools),
        Arc::clone(&bus),
        Arc::clone(&sessions),
        memory,
    ));

    Harness {
        workspace,
        bus,
        sessions,
        tools,
        agent,
        provider,
    }
}

async fn expect_outbound(bus: &MessageBus) -> OutboundMessage {
    tokio::time::timeout(
        Duration::from_millis(2000),
        bus.consume_outbound(&CancellationToken::new()),
    )
    .await
    .expect("outbound message should arrive")
    .expect("bus should stay open")
}

// ============================================================================
// Full pipeline: inbound → agent loop → outbound
// ============================================================================

#[tokio::test]
async fn test_inbound_to_outbound_roundtrip() {
    let h = harness(vec![LLMResponse::text("4")]).await;
    let cancel = CancellationToken::new();

    let agent = Arc::clone(&h.agent);
    tokio::spawn(agent.run(cancel.clone()));

    h.bus
        .publish_inbound(InboundMessage::new("cli", "user", "direct", "2+2?"))
        .unwrap();

    let reply = expect_outbound(&h.bus).await;
    assert_eq!(reply.channel, "cli");
    assert_eq!(reply.chat_id, "direct");
    assert_eq!(reply.content, "4");

    // The session holds exactly the user turn and the final reply
    let session = h.sessions.get_or_create("cli:direct").await;
    let session = session.lock().await;
    assert_eq!(session.message_count(), 2);
    assert_eq!(session.messages[0].content, "2+2?");
    assert_eq!(session.messages[1].content, "4");

    cancel.cancel();
}

#[tokio::test]
async fn test_tool_iteration_with_real_filesystem() {
    let h = harness(vec![
        tool_call("call_1", "filesystem", r#"{"operation":"list","path":"."}"#),
        LLMResponse::text("There is one file: README.md."),
    ])
    .await;
    std::fs::write(h.workspace.path().join("README.md"), "hello world!").unwrap();

    let reply = h
        .agent
        .process_direct(&CancellationToken::new(), "list files")
        .await
        .unwrap();
    assert_eq!(reply, "There is one file: README.md.");
    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_new_command_leaves_only_metadata_line() {
    let h = harness(vec![
        LLMResponse::text("a1"),
        LLMResponse::text("a2"),
        LLMResponse::text("a3"),
    ])
    .await;
    let cancel = CancellationToken::new();

    for q in ["q1", "q2", "q3"] {
        h.agent.process_direct(&cancel, q).await.unwrap();
    }

    let agent = Arc::clone(&h.agent);
    tokio::spawn(agent.run(cancel.clone()));
    h.bus
        .publish_inbound(InboundMessage::new("cli", "user", "direct", "/new"))
        .unwrap();

    let reply = expect_outbound(&h.bus).await;
    assert_eq!(reply.content, "新会话已创建");

    let path = h.workspace.path().join("sessions/cli_direct.jsonl");
    let content = std::fs::read_to_string(path).unwrap();
    assert_eq!(content.lines().count(), 1);
    assert!(content.contains("\"_type\":\"metadata\""));

    cancel.cancel();
}

// ============================================================================
// Subagent round-trip (spawn → system announcement → origin reply)
// ============================================================================

#[tokio::test]
async fn test_subagent_roundtrip_to_origin() {
    // First chat call is the subagent's reasoning; the second is the main
    // loop summarizing the announcement.
    let h = harness(vec![
        LLMResponse::text("X equals 42"),
        LLMResponse::text("The background task finished: X is 42."),
    ])
    .await;
    let cancel = CancellationToken::new();

    let agent = Arc::clone(&h.agent);
    tokio::spawn(agent.run(cancel.clone()));

    let subagents = Arc::new(SubagentManager::new(
        { let p: Arc<dyn LLMProvider> = h.provider.clone(); p },
        h.workspace.path().to_path_buf(),
        Arc::clone(&h.bus),
        Arc::clone(&h.tools),
        "test-model",
        1024,
        0.7,
        5,
    ));

    let ack = subagents.spawn("compute X", "calc", "cli", "direct");
    assert!(ack.contains("started"));

    let reply = expect_outbound(&h.bus).await;
    assert_eq!(reply.channel, "cli");
    assert_eq!(reply.chat_id, "direct");
    assert_eq!(reply.content, "The background task finished: X is 42.");

    cancel.cancel();
}

// ============================================================================
// Scheduler → bus → channel adapter
// ============================================================================

struct RecordingChannel {
    name: String,
    sent: Arc<std::sync::Mutex<Vec<OutboundMessage>>>,
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        &self.name
    }
    async fn start(&self, _cancel: &CancellationToken) -> Result<()> {
        Ok(())
    }
    async fn stop(&self) -> Result<()> {
        Ok(())
    }
    async fn send(&self, msg: &OutboundMessage) -> Result<()> {
        self.sent.lock().unwrap().push(msg.clone());
        Ok(())
    }
}

#[tokio::test]
async fn test_cron_message_mode_reaches_channel_adapter() {
    let bus = Arc::new(MessageBus::new());
    let cancel = CancellationToken::new();

    let sent = Arc::new(std::sync::Mutex::new(Vec::new()));
    let manager = Arc::new(ChannelManager::new(Arc::clone(&bus)));
    manager
        .register(Arc::new(RecordingChannel {
            name: "recorder".to_string(),
            sent: Arc::clone(&sent),
        }))
        .await;
    tokio::spawn(Arc::clone(&manager).dispatch_outbound(cancel.clone()));

    let cron = Arc::new(CronService::new(Arc::clone(&bus)));
    cron.add_job(
        "ping",
        "hi",
        Schedule::At {
            at_ms: chrono::Utc::now().timestamp_millis() + 100,
        },
        "recorder",
        "chat-1",
        false,
        false,
        "",
    );
    cron.start(&cancel).await;

    tokio::time::sleep(Duration::from_millis(600)).await;

    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 1, "one-shot job fires exactly once");
    assert_eq!(sent[0].chat_id, "chat-1");
    assert_eq!(sent[0].content, "hi");
    assert_eq!(sent[0].metadata.get("from_cron"), Some(&json!(true)));
    assert!(cron.list_jobs().is_empty());

    cancel.cancel();
    cron.stop().await;
}

// ============================================================================
// Session persistence across manager instances
// ============================================================================

#[tokio::test]
async fn test_session_survives_manager_restart() {
    let workspace = TempDir::new().unwrap();

    {
        let sessions = SessionManager::new(workspace.path());
        let session = sessions.get_or_create("telegram:99").await;
        let mut session = session.lock().await;
        session.add_message(nanogrip::session::SessionMessage::user("remember me"));
        sessions.save(&session).await.unwrap();
    }

    let sessions = SessionManager::new(workspace.path());
    let session = sessions.get_or_create("telegram:99").await;
    let session = session.lock().await;
    assert_eq!(session.message_count(), 1);
    assert_eq!(session.messages[0].content, "remember me");

    let infos = sessions.list_sessions().await;
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].key, "telegram:99");
}

// ============================================================================
// Bus invariants under load
// ============================================================================

#[tokio::test]
async fn test_bus_bounded_and_ordered() {
    let bus = MessageBus::with_buffer_size(8);

    let mut accepted = 0;
    for i in 0..20 {
        if bus
            .publish_inbound(InboundMessage::new("t", "u", "c", &format!("{}", i)))
            .is_ok()
        {
            accepted += 1;
        }
        assert!(bus.inbound_size() <= 8);
    }
    assert_eq!(accepted, 8);

    let cancel = CancellationToken::new();
    for i in 0..8 {
        let msg = bus.consume_inbound(&cancel).await.unwrap();
        assert_eq!(msg.content, format!("{}", i));
    }
}
