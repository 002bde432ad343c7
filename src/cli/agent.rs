//! `agent` command — interactive conversational loop or single-turn mode.

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::Config;
use crate::error::NanoError;

use super::runtime::Runtime;

/// Run the agent on stdin/stdout. With `-m`, process one message and exit.
pub async fn cmd_agent(config: Config, message: Option<String>) -> Result<()> {
    let runtime = Runtime::build(config).await?;
    let cancel = CancellationToken::new();

    runtime.cron.start(&cancel).await;

    // Consume inbound in the background so subagent announcements and cron
    // firings get processed.
    let agent = Arc::clone(&runtime.agent);
    let agent_task = tokio::spawn(agent.run(cancel.clone()));

    // Echo cli-bound outbound messages (message tool, cron, announcements)
    // to stdout.
    let bus = Arc::clone(&runtime.bus);
    let echo_cancel = cancel.clone();
    let echo_task = tokio::spawn(async move {
        loop {
            match bus.consume_outbound(&echo_cancel).await {
                Ok(msg) if msg.channel == "cli" => println!("{}", msg.content),
                Ok(msg) => {
                    warn!(channel = %msg.channel, "No adapter in agent mode, dropping outbound")
                }
                Err(_) => return,
            }
        }
    });

    if let Some(text) = message {
        // Single-turn mode: print the reply and exit.
        let reply = runtime.agent.process_direct(&cancel, &text).await?;
        println!("{}", reply);
    } else {
        println!("🐈 nanogrip agent. Type /help for commands, /exit to quit.");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print_prompt();
            let line = tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::signal::ctrl_c() => break,
                line = lines.next_line() => line?,
            };
            let Some(line) = line else { break };
            let input = line.trim();
            if input.is_empty() {
                continue;
            }
            if input == "/exit" || input == "/quit" {
                break;
            }

            match runtime.agent.process_direct(&cancel, input).await {
                Ok(reply) => println!("{}", reply),
                Err(NanoError::Cancelled) => break,
                Err(e) => eprintln!("Error: {}", e),
            }
        }
    }

    runtime.shutdown(&cancel).await;
    agent_task.abort();
    echo_task.abort();
    Ok(())
}

fn print_prompt() {
    use std::io::Write;
    print!("> ");
    let _ = std::io::stdout().flush();
}
