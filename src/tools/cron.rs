//! `cron` tool — schedule reminders and recurring tasks.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::cron::{parse_at_datetime_ms, CronService, Schedule};
use crate::error::Result;

use super::types::{num_arg, str_arg};
use super::{Tool, ToolContext};

/// Manages scheduled jobs through the [`CronService`].
///
/// Two execution modes: `message` sends fixed text, `agent` triggers a full
/// agent run with the given command. The job's routing defaults to the
/// turn's [`ToolContext`].
pub struct CronTool {
    service: Arc<CronService>,
}

impl CronTool {
    pub fn new(service: Arc<CronService>) -> Self {
        Self { service }
    }

    fn add_job(&self, args: &Value, ctx: &ToolContext) -> String {
        let (Some(channel), Some(chat_id)) = (ctx.channel.as_deref(), ctx.chat_id.as_deref())
        else {
            return "Error: no session context (channel/chat_id)".to_string();
        };

        let mode = str_arg(args, "mode").unwrap_or("message");
        let message = str_arg(args, "message").unwrap_or_default();
        let command = str_arg(args, "command").unwrap_or_default();

        let (name, trigger_agent) = match mode {
            "agent" => {
                if command.is_empty() {
                    return "Error: 'command' parameter is required for agent mode".to_string();
                }
                (command, true)
            }
            _ => {
                if message.is_empty() {
                    return "Error: 'message' parameter is required for message mode".to_string();
                }
                (message, false)
            }
        };

        let once_seconds = num_arg(args, "once_seconds").unwrap_or(0.0);
        let every_seconds = num_arg(args, "every_seconds").unwrap_or(0.0);
        let cron_expr = str_arg(args, "cron_expr").unwrap_or_default();
        let at = str_arg(args, "at").unwrap_or_default();

        let (schedule, delete_after_run) = if once_seconds > 0.0 {
            let at_ms = chrono::Utc::now().timestamp_millis() + (once_seconds * 1000.0) as i64;
            (Schedule::At { at_ms }, true)
        } else if every_seconds > 0.0 {
            (
                Schedule::Every {
                    every_ms: (every_seconds * 1000.0) as i64,
                },
                false,
            )
        } else if !cron_expr.is_empty() {
            (
                Schedule::Cron {
                    expr: cron_expr.to_string(),
                    tz: None,
                },
                false,
            )
        } else if !at.is_empty() {
            match parse_at_datetime_ms(at) {
                Ok(at_ms) => (Schedule::At { at_ms }, true),
                Err(e) => return format!("Error: {}", e),
            }
        } else {
            return "Error: either once_seconds, every_seconds, cron_expr, or at is required"
                .to_string();
        };

        let kind = match &schedule {
            Schedule::At { .. } => "at",
            Schedule::Every { .. } => "every",
            Schedule::Cron { .. } => "cron",
        };

        let job = self.service.add_job(
            name,
            message,
            schedule,
            channel,
            chat_id,
            delete_after_run,
            trigger_agent,
            command,
        );

        format!(
            "Created {} job '{}' (id: {}, type: {})",
            if trigger_agent { "agent" } else { "message" },
            job.name,
            job.id,
            kind
        )
    }

    fn list_jobs(&self) -> String {
        let jobs = self.service.list_jobs();
        if jobs.is_empty() {
            return "No scheduled jobs found. Use 'add' action to create a reminder.".to_string();
        }

        let mut out = format!("Scheduled jobs ({} total):\n", jobs.len());
        for job in jobs {
            let kind = match job.schedule {
                Schedule::At { .. } => "one-time",
                Schedule::Every { .. } => "recurring",
                Schedule::Cron { .. } => "scheduled",
            };
            let mode = if job.trigger_agent { "agent" } else { "message" };
            out.push_str(&format!(
                "- {} (id: {}, type: {}, mode: {})\n",
                job.name, job.id, kind, mode
            ));
        }
        out.push_str("\nTo remove a job, use 'remove' action with the job_id.");
        out
    }

    fn remove_job(&self, args: &Value) -> String {
        let Some(job_id) = str_arg(args, "job_id") else {
            return "Error: job_id is required for remove".to_string();
        };
        if self.service.remove_job(job_id) {
            format!("Removed job {}", job_id)
        } else {
            format!("Job {} not found", job_id)
        }
    }
}

#[async_trait]
impl Tool for CronTool {
    fn name(&self) -> &str {
        "cron"
    }

    fn description(&self) -> &str {
        "Schedule reminders and recurring tasks. Actions: add, list, remove.\n\n\
         For add:\n\
         - 'mode' selects execution: 'message' (send fixed text) or 'agent' \
           (trigger AI command execution)\n\
         - message mode needs 'message'; agent mode needs 'command'\n\
         - 'once_seconds' for one-time reminders (e.g. remind me in 2 minutes)\n\
         - 'every_seconds' for recurring tasks (e.g. every 5 minutes)\n\
         - 'cron_expr' for cron schedules (e.g. '0 9 * * *')\n\
         - 'at' for a specific time (e.g. '2026-02-12T10:30:00')"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["add", "list", "remove"],
                    "description": "Action to perform",
                },
                "mode": {
                    "type": "string",
                    "enum": ["message", "agent"],
                    "description": "Execution mode (default: message)",
                },
                "message": {
                    "type": "string",
                    "description": "Text content to send (message mode)",
                },
                "command": {
                    "type": "string",
                    "description": "AI command to execute (agent mode)",
                },
                "once_seconds": {
                    "type": "integer",
                    "description": "Delay in seconds for a ONE-TIME reminder; \
                                    the job is deleted after it fires",
                },
                "every_seconds": {
                    "type": "integer",
                    "description": "Interval in seconds for RECURRING tasks",
                },
                "cron_expr": {
                    "type": "string",
                    "description": "Cron expression like '0 9 * * *'",
                },
                "at": {
                    "type": "string",
                    "description": "ISO datetime for one-time execution",
                },
                "job_id": {
                    "type": "string",
                    "description": "Job ID (for remove)",
                },
            },
            "required": ["action"],
        })
    }

    async fn execute(
        &self,
        _cancel: &CancellationToken,
        args: Value,
        ctx: &ToolContext,
    ) -> Result<String> {
        let action = str_arg(&args, "action").unwrap_or_default();
        Ok(match action {
            "add" => self.add_job(&args, ctx),
            "list" => self.list_jobs(),
            "remove" => self.remove_job(&args),
            other => format!("Unknown action: {}", other),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MessageBus;

    fn fixture() -> (CronTool, Arc<CronService>) {
        let service = Arc::new(CronService::new(Arc::new(MessageBus::new())));
        (CronTool::new(Arc::clone(&service)), service)
    }

    fn ctx() -> ToolContext {
        ToolContext::new().with_channel("telegram", "42")
    }

    fn cancel() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn test_add_once_job() {
        let (tool, service) = fixture();
        let result = tool
            .execute(
                &cancel(),
                json!({"action": "add", "message": "ping", "once_seconds": 120}),
                &ctx(),
            )
            .await
            .unwrap();
        assert!(result.starts_with("Created message job 'ping'"));
        assert!(result.contains("type: at"));

        let jobs = service.list_jobs();
        assert_eq!(jobs.len(), 1);
        assert!(jobs[0].delete_after_run);
        assert!(!jobs[0].trigger_agent);
    }

    #[tokio::test]
    async fn test_add_agent_job() {
        let (tool, service) = fixture();
        let result = tool
            .execute(
                &cancel(),
                json!({"action": "add", "mode": "agent", "command": "check weather", "every_seconds": 3600}),
                &ctx(),
            )
            .await
            .unwrap();
        assert!(result.starts_with("Created agent job"));

        let jobs = service.list_jobs();
        assert!(jobs[0].trigger_agent);
        assert_eq!(jobs[0].agent_command, "check weather");
        assert_eq!(jobs[0].channel, "telegram");
        assert_eq!(jobs[0].chat_id, "42");
    }

    #[tokio::test]
    async fn test_add_requires_schedule() {
        let (tool, _) = fixture();
        let result = tool
            .execute(&cancel(), json!({"action": "add", "message": "x"}), &ctx())
            .await
            .unwrap();
        assert!(result.starts_with("Error: either once_seconds"));
    }

    #[tokio::test]
    async fn test_add_without_context_is_error() {
        let (tool, _) = fixture();
        let result = tool
            .execute(
                &cancel(),
                json!({"action": "add", "message": "x", "once_seconds": 5}),
                &ToolContext::new(),
            )
            .await
            .unwrap();
        assert!(result.starts_with("Error: no session context"));
    }

    #[tokio::test]
    async fn test_list_and_remove() {
        let (tool, service) = fixture();
        tool.execute(
            &cancel(),
            json!({"action": "add", "message": "x", "every_seconds": 60}),
            &ctx(),
        )
        .await
        .unwrap();

        let listing = tool
            .execute(&cancel(), json!({"action": "list"}), &ctx())
            .await
            .unwrap();
        assert!(listing.contains("1 total"));
        assert!(listing.contains("mode: message"));

        let job_id = service.list_jobs()[0].id.clone();
        let result = tool
            .execute(&cancel(), json!({"action": "remove", "job_id": job_id}), &ctx())
            .await
            .unwrap();
        assert!(result.starts_with("Removed job"));

        let listing = tool
            .execute(&cancel(), json!({"action": "list"}), &ctx())
            .await
            .unwrap();
        assert!(listing.starts_with("No scheduled jobs"));
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let (tool, _) = fixture();
        let result = tool
            .execute(&cancel(), json!({"action": "pause"}), &ctx())
            .await
            .unwrap();
        assert_eq!(result, "Unknown action: pause");
    }
}
