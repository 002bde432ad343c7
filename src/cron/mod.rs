//! Cron scheduler
//!
//! A min-heap of jobs keyed by next-run instant drives one background task.
//! The loop sleeps precisely until the heap top is due, capped at 10 s so
//! freshly-added jobs are observed with bounded latency (60 s when the heap
//! is empty). Due jobs execute on fresh tasks, never inline.
//!
//! Two execution modes:
//! - **message**: publish the job's literal text as an outbound message
//!   tagged `from_cron`.
//! - **agent**: run the job's command through the agent loop's direct-entry
//!   and publish the textual result to the job's routing.
//!
//! Jobs are in-memory only; a restart drops the schedule.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bus::{MessageBus, OutboundMessage};
use crate::error::Result;

/// Sleep when the heap is empty.
const IDLE_SLEEP: Duration = Duration::from_secs(60);
/// Cap on the precise sleep so new jobs are noticed promptly.
const MAX_SLEEP: Duration = Duration::from_secs(10);
/// Fallback horizon when a cron expression fails to parse.
const PARSE_FAILURE_DELAY_MS: i64 = 3_600_000;

/// Executes agent-mode jobs. Implemented by the agent loop.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    /// Run `command` through the full agent pipeline with the given routing
    /// so that `message`/`spawn`/`cron` tool calls land in the right chat.
    async fn process_command(
        &self,
        cancel: &CancellationToken,
        command: &str,
        channel: &str,
        chat_id: &str,
    ) -> Result<String>;
}

/// Schedule shapes. Exactly one applies per job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Periodic, repeats forever
    Every { every_ms: i64 },
    /// Standard 5-field cron in minute resolution, optional IANA timezone
    Cron { expr: String, tz: Option<String> },
    /// Single shot at an absolute wall-clock instant (unix millis)
    At { at_ms: i64 },
}

/// A scheduled work item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub name: String,
    /// Literal text for message mode
    pub message: String,
    pub schedule: Schedule,
    /// Target routing
    pub channel: String,
    pub chat_id: String,
    /// Remove after firing (always true in effect for `At` schedules)
    pub delete_after_run: bool,
    pub created_at_ms: i64,
    /// Next firing instant (unix millis)
    pub next_run_ms: i64,
    /// Agent mode: run `agent_command` through the agent loop
    pub trigger_agent: bool,
    pub agent_command: String,
}

/// Heap entry: (next_run, insertion seq, job id). The seq breaks ties for
/// jobs due at the same instant.
type HeapEntry = Reverse<(i64, u64, String)>;

struct State {
    jobs: HashMap<String, Job>,
    heap: BinaryHeap<HeapEntry>,
    seq: u64,
}

/// The scheduler. One background task drives the heap. The heap/map pair
/// sits behind a single lock shared with that task.
pub struct CronService {
    state: Arc<RwLock<State>>,
    bus: Arc<MessageBus>,
    executor: Arc<RwLock<Option<Arc<dyn AgentExecutor>>>>,
    handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    stop_token: CancellationToken,
}

impl CronService {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self {
            state: Arc::new(RwLock::new(State {
                jobs: HashMap::new(),
                heap: BinaryHeap::new(),
                seq: 0,
            })),
            bus,
            executor: Arc::new(RwLock::new(None)),
            handle: tokio::sync::Mutex::new(None),
            stop_token: CancellationToken::new(),
        }
    }

    /// Set the executor used for agent-mode jobs.
    pub fn set_agent_executor(&self, executor: Arc<dyn AgentExecutor>) {
        *self.executor.write().expect("executor lock") = Some(executor);
    }

    /// Start the scheduler loop. Idempotent.
    pub async fn start(&self, cancel: &CancellationToken) {
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            return;
        }
        let state = Arc::clone(&self.state);
        let bus = Arc::clone(&self.bus);
        let executor = Arc::clone(&self.executor);
        let cancel = cancel.clone();
        let stop = self.stop_token.clone();
        *handle = Some(tokio::spawn(async move {
            info!("Cron scheduler started");
            run_loop(state, bus, executor, cancel, stop).await;
            info!("Cron scheduler stopped");
        }));
    }

    /// Stop the scheduler loop.
    pub async fn stop(&self) {
        self.stop_token.cancel();
        let mut handle = self.handle.lock().await;
        if let Some(h) = handle.take() {
            let _ = h.await;
        }
    }

    /// Add a job. Computes the first next-run from the current clock.
    #[allow(clippy::too_many_arguments)]
    pub fn add_job(
        &self,
        name: &str,
        message: &str,
        schedule: Schedule,
        channel: &str,
        chat_id: &str,
        delete_after_run: bool,
        trigger_agent: bool,
        agent_command: &str,
    ) -> Job {
        let now = now_ms();
        let id = format!("job_{}", nanos());
        let next_run_ms = next_run_at(&schedule, now).unwrap_or(now);
        let job = Job {
            id: id.clone(),
            name: name.to_string(),
            message: message.to_string(),
            schedule,
            channel: channel.to_string(),
            chat_id: chat_id.to_string(),
            delete_after_run,
            created_at_ms: now,
            next_run_ms,
            trigger_agent,
            agent_command: agent_command.to_string(),
        };

        let mut state = self.state.write().expect("cron state lock");
        state.seq += 1;
        let seq = state.seq;
        state.heap.push(Reverse((next_run_ms, seq, id.clone())));
        state.jobs.insert(id, job.clone());
        info!(
            job = %job.name,
            next_run_in_ms = next_run_ms.saturating_sub(now),
            "Cron job added"
        );
        job
    }

    /// All jobs, sorted by next-run instant.
    pub fn list_jobs(&self) -> Vec<Job> {
        let state = self.state.read().expect("cron state lock");
        let mut jobs: Vec<Job> = state.jobs.values().cloned().collect();
        jobs.sort_by_key(|j| j.next_run_ms);
        jobs
    }

    /// Remove a job by id. O(n) over the heap because entries carry no
    /// back-index; the expected job count is small.
    pub fn remove_job(&self, id: &str) -> bool {
        let mut state = self.state.write().expect("cron state lock");
        if state.jobs.remove(id).is_none() {
            return false;
        }
        let entries: Vec<HeapEntry> = state
            .heap
            .drain()
            .filter(|Reverse((_, _, jid))| jid != id)
            .collect();
        state.heap = entries.into_iter().collect();
        true
    }

    /// Pop and launch every due job now (test hook for the loop body).
    #[cfg(test)]
    fn check_and_run(&self, cancel: &CancellationToken) {
        check_and_run(&self.state, &self.bus, &self.executor, cancel);
    }
}

async fn run_loop(
    state: Arc<RwLock<State>>,
    bus: Arc<MessageBus>,
    executor: Arc<RwLock<Option<Arc<dyn AgentExecutor>>>>,
    cancel: CancellationToken,
    stop: CancellationToken,
) {
    loop {
        let wait = {
            let state = state.read().expect("cron state lock");
            match state.heap.peek() {
                None => IDLE_SLEEP,
                Some(Reverse((next_run, _, _))) => {
                    let delta = next_run.saturating_sub(now_ms());
                    if delta <= 0 {
                        Duration::ZERO
                    } else {
                        Duration::from_millis(delta as u64).min(MAX_SLEEP)
                    }
                }
            }
        };

        if !wait.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = stop.cancelled() => return,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        check_and_run(&state, &bus, &executor, &cancel);
    }
}

/// Pop and launch every due job. After this returns, the heap top's
/// next-run is strictly in the future.
fn check_and_run(
    state: &Arc<RwLock<State>>,
    bus: &Arc<MessageBus>,
    executor: &Arc<RwLock<Option<Arc<dyn AgentExecutor>>>>,
    cancel: &CancellationToken,
) {
    let now = now_ms();
    let mut due: Vec<Job> = Vec::new();

    {
        let mut state = state.write().expect("cron state lock");
        loop {
            let Some(Reverse((next_run, _, id))) = state.heap.peek().cloned() else {
                break;
            };
            if next_run > now {
                break;
            }
            state.heap.pop();

            // The map may no longer hold this id (stale entry after an
            // explicit remove).
            let Some(job) = state.jobs.get(&id).cloned() else {
                continue;
            };
            due.push(job.clone());

            if job.delete_after_run || matches!(job.schedule, Schedule::At { .. }) {
                state.jobs.remove(&id);
            } else {
                match next_run_at(&job.schedule, now) {
                    Some(next) => {
                        state.seq += 1;
                        let seq = state.seq;
                        state.heap.push(Reverse((next, seq, id.clone())));
                        if let Some(j) = state.jobs.get_mut(&id) {
                            j.next_run_ms = next;
                        }
                    }
                    None => {
                        warn!(job = %job.name, "Cannot reschedule job, removing");
                        state.jobs.remove(&id);
                    }
                }
            }
        }
    }

    for job in due {
        let bus = Arc::clone(bus);
        let executor = executor.read().expect("executor lock").clone();
        let cancel = cancel.clone();
        let name = job.name.clone();
        let handle = tokio::spawn(async move {
            execute_job(job, bus, executor, cancel).await;
        });
        // Recover and log panics from the execution task; never propagate.
        tokio::spawn(async move {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    error!(job = %name, "Cron job execution panicked");
                }
            }
        });
    }
}

async fn execute_job(
    job: Job,
    bus: Arc<MessageBus>,
    executor: Option<Arc<dyn AgentExecutor>>,
    cancel: CancellationToken,
) {
    info!(job = %job.name, agent_mode = job.trigger_agent, "Executing cron job");

    if job.channel.is_empty() || job.chat_id.is_empty() {
        warn!(job = %job.name, "Cron job has empty routing, skipping");
        return;
    }

    if !job.trigger_agent {
        let msg = OutboundMessage::new(&job.channel, &job.chat_id, &job.message)
            .with_metadata("from_cron", json!(true));
        if let Err(e) = bus.publish_outbound(msg) {
            warn!(job = %job.name, error = %e, "Failed to publish cron message");
        }
        return;
    }

    let Some(executor) = executor else {
        warn!(job = %job.name, "No agent executor configured, skipping agent job");
        return;
    };

    let content = match executor
        .process_command(&cancel, &job.agent_command, &job.channel, &job.chat_id)
        .await
    {
        Ok(response) => response,
        Err(e) => {
            error!(job = %job.name, error = %e, "Agent-mode cron job failed");
            format!("Scheduled task failed: {}", e)
        }
    };

    let msg = OutboundMessage::new(&job.channel, &job.chat_id, &content)
        .with_metadata("from_cron", json!(true));
    if let Err(e) = bus.publish_outbound(msg) {
        warn!(job = %job.name, error = %e, "Failed to publish cron result");
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn nanos() -> String {
    format!("{:x}", Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

/// Compute the next firing instant for a schedule from `now` (unix millis).
///
/// - `Every`: `now + interval` (drift accepted — rescheduling starts from
///   the current clock, not the planned deadline).
/// - `At`: the instant itself.
/// - `Cron`: next matching minute; a parse failure logs and falls back to
///   one hour so the job is not starved.
pub fn next_run_at(schedule: &Schedule, now: i64) -> Option<i64> {
    match schedule {
        Schedule::Every { every_ms } => {
            if *every_ms > 0 {
                Some(now + every_ms)
            } else {
                None
            }
        }
        Schedule::At { at_ms } => Some(*at_ms),
        Schedule::Cron { expr, tz } => match next_cron_run(expr, tz.as_deref(), now) {
            Some(next) => Some(next),
            None => {
                warn!(expr = %expr, "Failed to parse cron expression, retrying in 1h");
                Some(now + PARSE_FAILURE_DELAY_MS)
            }
        },
    }
}

/// Parse a 5-field value: `*`, `*/step`, comma lists, and `a-b` ranges.
fn parse_cron_field(field: &str, min: u32, max: u32) -> Option<Vec<u32>> {
    if field == "*" {
        return Some((min..=max).collect());
    }
    if let Some(step) = field.strip_prefix("*/") {
        let step: u32 = step.parse().ok()?;
        if step == 0 {
            return None;
        }
        return Some((min..=max).step_by(step as usize).collect());
    }

    let mut values = Vec::new();
    for part in field.split(',') {
        if let Some((lo, hi)) = part.split_once('-') {
            let lo: u32 = lo.parse().ok()?;
            let hi: u32 = hi.parse().ok()?;
            if lo > hi || lo < min || hi > max {
                return None;
            }
            values.extend(lo..=hi);
        } else {
            let value: u32 = part.parse().ok()?;
            if !(min..=max).contains(&value) {
                return None;
            }
            values.push(value);
        }
    }
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}

/// Next instant matching a 5-field cron expression, scanning minute by
/// minute up to 366 days ahead. Computed in `tz` when it loads, else in the
/// process-local zone.
fn next_cron_run(expr: &str, tz: Option<&str>, now: i64) -> Option<i64> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 {
        return None;
    }

    let minutes = parse_cron_field(fields[0], 0, 59)?;
    let hours = parse_cron_field(fields[1], 0, 23)?;
    let dom = parse_cron_field(fields[2], 1, 31)?;
    let months = parse_cron_field(fields[3], 1, 12)?;
    let dow = parse_cron_field(fields[4], 0, 6)?;

    let fields = CronFields {
        minutes,
        hours,
        dom,
        months,
        dow,
    };

    // Compute in the requested zone when it loads, else in the local zone.
    match tz.and_then(|name| {
        name.parse::<chrono_tz::Tz>()
            .map_err(|_| warn!(tz = name, "Unknown timezone, using local"))
            .ok()
    }) {
        Some(zone) => scan_minutes(zone, now, &fields),
        None => scan_minutes(chrono::Local, now, &fields),
    }
}

struct CronFields {
    minutes: Vec<u32>,
    hours: Vec<u32>,
    dom: Vec<u32>,
    months: Vec<u32>,
    dow: Vec<u32>,
}

fn scan_minutes<Z: TimeZone>(zone: Z, now: i64, fields: &CronFields) -> Option<i64> {
    let base = DateTime::<Utc>::from_timestamp_millis(now)?;
    let mut candidate = zone
        .from_utc_datetime(&base.naive_utc())
        .with_second(0)?
        .with_nanosecond(0)?
        + ChronoDuration::minutes(1);
    let limit = candidate.clone() + ChronoDuration::days(366);

    while candidate <= limit {
        if fields.minutes.contains(&candidate.minute())
            && fields.hours.contains(&candidate.hour())
            && fields.dom.contains(&candidate.day())
            && fields.months.contains(&candidate.month())
            && fields.dow.contains(&candidate.weekday().num_days_from_sunday())
        {
            return Some(candidate.timestamp_millis());
        }
        candidate = candidate + ChronoDuration::minutes(1);
    }

    None
}

/// True when the expression parses and has a future run time.
pub fn is_valid_cron_expr(expr: &str) -> bool {
    next_cron_run(expr, None, now_ms()).is_some()
}

/// Parse an ISO-ish datetime into unix millis. Accepts RFC3339, else
/// `YYYY-MM-DDTHH:MM[:SS]` interpreted in the process-local zone.
pub fn parse_at_datetime_ms(input: &str) -> Result<i64> {
    use chrono::{Local, NaiveDateTime};

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.timestamp_millis());
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            if let Some(local) = Local.from_local_datetime(&naive).earliest() {
                return Ok(local.timestamp_millis());
            }
        }
    }
    Err(crate::error::NanoError::Tool(format!(
        "invalid 'at' datetime '{}'. Use RFC3339 or YYYY-MM-DDTHH:MM[:SS]",
        input
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cron_field_variants() {
        assert_eq!(parse_cron_field("*", 0, 3), Some(vec![0, 1, 2, 3]));
        assert_eq!(parse_cron_field("*/2", 0, 6), Some(vec![0, 2, 4, 6]));
        assert_eq!(parse_cron_field("1,3,5", 0, 59), Some(vec![1, 3, 5]));
        assert_eq!(parse_cron_field("2-4", 0, 59), Some(vec![2, 3, 4]));
        assert_eq!(parse_cron_field("61", 0, 59), None);
        assert_eq!(parse_cron_field("*/0", 0, 59), None);
        assert_eq!(parse_cron_field("x", 0, 59), None);
    }

    #[test]
    fn test_next_run_every() {
        let next = next_run_at(&Schedule::Every { every_ms: 500 }, 1_000).unwrap();
        assert_eq!(next, 1_500);
        assert!(next_run_at(&Schedule::Every { every_ms: 0 }, 1_000).is_none());
    }

    #[test]
    fn test_next_run_at_instant() {
        let next = next_run_at(&Schedule::At { at_ms: 42 }, 1_000).unwrap();
        assert_eq!(next, 42);
    }

    #[test]
    fn test_next_run_cron_parse_failure_falls_back_one_hour() {
        let now = 1_000_000;
        let next = next_run_at(
            &Schedule::Cron {
                expr: "not a cron".into(),
                tz: None,
            },
            now,
        )
        .unwrap();
        assert_eq!(next, now + PARSE_FAILURE_DELAY_MS);
    }

    #[test]
    fn test_next_cron_run_every_minute() {
        let now = now_ms();
        let next = next_cron_run("* * * * *", None, now).unwrap();
        assert!(next > now);
        assert!(next - now <= 61_000);
        // Minute-aligned
        assert_eq!(next % 60_000, 0);
    }

    #[test]
    fn test_parse_at_datetime_ms() {
        assert!(parse_at_datetime_ms("2026-02-12T12:34:56Z").unwrap() > 0);
        assert!(parse_at_datetime_ms("2026-02-12T12:34:56").unwrap() > 0);
        assert!(parse_at_datetime_ms("2026-02-12T12:34").unwrap() > 0);
        assert!(parse_at_datetime_ms("next tuesday").is_err());
    }

    #[test]
    fn test_next_cron_run_with_timezone() {
        let now = now_ms();
        let next = next_cron_run("* * * * *", Some("Asia/Shanghai"), now).unwrap();
        assert!(next > now && next - now <= 61_000);
        // Unknown zones fall back rather than failing
        let next = next_cron_run("* * * * *", Some("Mars/Olympus"), now).unwrap();
        assert!(next > now);
    }

    #[test]
    fn test_is_valid_cron_expr() {
        assert!(is_valid_cron_expr("0 9 * * *"));
        assert!(is_valid_cron_expr("*/5 * * * 1-5"));
        assert!(!is_valid_cron_expr("0 9 * *"));
        assert!(!is_valid_cron_expr("99 9 * * *"));
    }

    #[tokio::test]
    async fn test_add_list_remove_job() {
        let bus = Arc::new(MessageBus::new());
        let service = CronService::new(bus);

        let job = service.add_job(
            "test",
            "hello",
            Schedule::Every { every_ms: 1_000 },
            "cli",
            "direct",
            false,
            false,
            "",
        );

        let jobs = service.list_jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, job.id);

        assert!(service.remove_job(&job.id));
        assert!(!service.remove_job(&job.id));
        assert!(service.list_jobs().is_empty());
    }

    #[tokio::test]
    async fn test_one_shot_fires_once_and_disappears() {
        let bus = Arc::new(MessageBus::new());
        let service = Arc::new(CronService::new(Arc::clone(&bus)));
        let cancel = CancellationToken::new();

        service.add_job(
            "one-shot",
            "hi",
            Schedule::At {
                at_ms: now_ms() + 200,
            },
            "cli",
            "direct",
            false,
            false,
            "",
        );

        service.start(&cancel).await;

        let msg = tokio::time::timeout(
            Duration::from_millis(1500),
            bus.consume_outbound(&cancel),
        )
        .await
        .expect("job should fire")
        .unwrap();

        assert_eq!(msg.channel, "cli");
        assert_eq!(msg.chat_id, "direct");
        assert_eq!(msg.content, "hi");
        assert_eq!(msg.metadata.get("from_cron"), Some(&json!(true)));

        // Absent from both heap and map afterwards
        assert!(service.list_jobs().is_empty());

        // And it never fires again
        let second = tokio::time::timeout(
            Duration::from_millis(300),
            bus.consume_outbound(&cancel),
        )
        .await;
        assert!(second.is_err());

        service.stop().await;
    }

    #[tokio::test]
    async fn test_periodic_job_repeats() {
        let bus = Arc::new(MessageBus::new());
        let service = Arc::new(CronService::new(Arc::clone(&bus)));
        let cancel = CancellationToken::new();

        service.add_job(
            "ticker",
            "tick",
            Schedule::Every { every_ms: 100 },
            "cli",
            "direct",
            false,
            false,
            "",
        );
        service.start(&cancel).await;

        let mut received = 0;
        let deadline = tokio::time::Instant::now() + Duration::from_millis(450);
        while tokio::time::Instant::now() < deadline {
            match tokio::time::timeout(Duration::from_millis(200), bus.consume_outbound(&cancel))
                .await
            {
                Ok(Ok(msg)) => {
                    assert_eq!(msg.chat_id, "direct");
                    received += 1;
                }
                _ => break,
            }
        }

        assert!((2..=6).contains(&received), "got {} firings", received);
        // Still scheduled
        assert_eq!(service.list_jobs().len(), 1);

        service.stop().await;
    }

    #[tokio::test]
    async fn test_heap_top_in_future_after_check() {
        let bus = Arc::new(MessageBus::new());
        let service = Arc::new(CronService::new(bus));
        let cancel = CancellationToken::new();

        for i in 0..3 {
            service.add_job(
                &format!("job-{}", i),
                "x",
                Schedule::Every { every_ms: 50 },
                "cli",
                "direct",
                false,
                false,
                "",
            );
        }

        tokio::time::sleep(Duration::from_millis(60)).await;
        service.check_and_run(&cancel);

        let now = now_ms();
        let state = service.state.read().unwrap();
        let Reverse((top, _, _)) = state.heap.peek().cloned().unwrap();
        assert!(top > now, "heap top {} should be after {}", top, now);
    }

    #[tokio::test]
    async fn test_agent_mode_publishes_result() {
        struct FixedExecutor;

        #[async_trait]
        impl AgentExecutor for FixedExecutor {
            async fn process_command(
                &self,
                _cancel: &CancellationToken,
                command: &str,
                _channel: &str,
                _chat_id: &str,
            ) -> Result<String> {
                Ok(format!("ran: {}", command))
            }
        }

        let bus = Arc::new(MessageBus::new());
        let service = Arc::new(CronService::new(Arc::clone(&bus)));
        service.set_agent_executor(Arc::new(FixedExecutor));
        let cancel = CancellationToken::new();

        service.add_job(
            "agent-job",
            "",
            Schedule::At {
                at_ms: now_ms() + 50,
            },
            "telegram",
            "42",
            true,
            true,
            "check the weather",
        );
        service.start(&cancel).await;

        let msg = tokio::time::timeout(
            Duration::from_millis(1500),
            bus.consume_outbound(&cancel),
        )
        .await
        .expect("agent job should fire")
        .unwrap();

        assert_eq!(msg.channel, "telegram");
        assert_eq!(msg.chat_id, "42");
        assert_eq!(msg.content, "ran: check the weather");

        service.stop().await;
    }

    #[tokio::test]
    async fn test_removed_job_does_not_fire_from_stale_heap_entry() {
        let bus = Arc::new(MessageBus::new());
        let service = Arc::new(CronService::new(Arc::clone(&bus)));
        let cancel = CancellationToken::new();

        let job = service.add_job(
            "doomed",
            "never",
            Schedule::At {
                at_ms: now_ms() + 20,
            },
            "cli",
            "direct",
            false,
            false,
            "",
        );
        service.remove_job(&job.id);

        tokio::time::sleep(Duration::from_millis(40)).await;
        service.check_and_run(&cancel);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(bus.outbound_size(), 0);
    }
}
