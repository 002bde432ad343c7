//! Session module — conversation state and JSONL persistence
//!
//! One file per session under `<workspace>/sessions/`, named from a
//! filesystem-safe fingerprint of the key. File format is line-delimited
//! JSON: the first line is a metadata record tagged `_type: "metadata"`,
//! every following line is one conversation entry in order.
//!
//! The in-memory cache holds at most `max_cache` sessions with LRU
//! eviction. Each session is wrapped in its own `Mutex`; the cache map and
//! access order have a separate lock, and disk I/O never happens while the
//! cache lock is held.

pub mod types;

pub use types::{Role, Session, SessionMessage, ToolCall};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::Result;

/// Default cache bound.
const DEFAULT_MAX_CACHE: usize = 1000;

/// Metadata line written as the first JSONL record.
#[derive(serde::Serialize, serde::Deserialize)]
struct MetadataLine {
    #[serde(rename = "_type")]
    record_type: String,
    key: String,
    created_at: String,
    updated_at: String,
    metadata: HashMap<String, serde_json::Value>,
    last_consolidated: usize,
}

/// Summary returned by [`SessionManager::list_sessions`].
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub key: String,
    pub created_at: String,
    pub updated_at: String,
    pub path: PathBuf,
}

struct Cache {
    sessions: HashMap<String, Arc<Mutex<Session>>>,
    /// LRU order, least recently used first.
    access_order: Vec<String>,
}

/// Manages session lifecycle and JSONL persistence.
pub struct SessionManager {
    sessions_dir: PathBuf,
    cache: Mutex<Cache>,
    max_cache: usize,
}

impl SessionManager {
    /// Create a manager storing sessions under `<workspace>/sessions/`.
    pub fn new(workspace: &Path) -> Self {
        Self {
            sessions_dir: workspace.join("sessions"),
            cache: Mutex::new(Cache {
                sessions: HashMap::new(),
                access_order: Vec::new(),
            }),
            max_cache: DEFAULT_MAX_CACHE,
        }
    }

    /// Create a manager with a custom cache bound (tests).
    pub fn with_max_cache(workspace: &Path, max_cache: usize) -> Self {
        let mut mgr = Self::new(workspace);
        mgr.max_cache = max_cache;
        mgr
    }

    /// Directory where session files live.
    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    /// Get the cached session, else load from disk, else create empty.
    /// Updates LRU recency.
    pub async fn get_or_create(&self, key: &str) -> Arc<Mutex<Session>> {
        {
            let mut cache = self.cache.lock().await;
            if let Some(session) = cache.sessions.get(key).cloned() {
                move_to_end(&mut cache.access_order, key);
                return session;
            }
        }

        // Disk load happens without the cache lock held.
        let session = self
            .load(key)
            .await
            .unwrap_or_else(|| Session::new(key));
        let session = Arc::new(Mutex::new(session));

        let mut cache = self.cache.lock().await;
        // Another task may have loaded it while we were reading disk.
        if let Some(existing) = cache.sessions.get(key).cloned() {
            move_to_end(&mut cache.access_order, key);
            return existing;
        }
        if cache.sessions.len() >= self.max_cache {
            if let Some(oldest) = cache.access_order.first().cloned() {
                cache.access_order.remove(0);
                cache.sessions.remove(&oldest);
            }
        }
        cache.sessions.insert(key.to_string(), Arc::clone(&session));
        cache.access_order.push(key.to_string());
        session
    }

    /// Persist a session with a whole-file rewrite.
    ///
    /// The caller supplies the session value (typically read under the
    /// session's own lock); the cache lock is not taken here.
    pub async fn save(&self, session: &Session) -> Result<()> {
        tokio::fs::create_dir_all(&self.sessions_dir).await?;
        let path = self.session_path(&session.key);

        let mut out = String::new();
        let meta = MetadataLine {
            record_type: "metadata".to_string(),
            key: session.key.clone(),
            created_at: session.created_at.to_rfc3339(),
            updated_at: session.updated_at.to_rfc3339(),
            metadata: session.metadata.clone(),
            last_consolidated: session.last_consolidated,
        };
        out.push_str(&serde_json::to_string(&meta)?);
        out.push('\n');
        for msg in &session.messages {
            out.push_str(&serde_json::to_string(msg)?);
            out.push('\n');
        }

        tokio::fs::write(&path, out).await?;
        Ok(())
    }

    /// Drop a session from the cache; disk is untouched.
    pub async fn invalidate(&self, key: &str) {
        let mut cache = self.cache.lock().await;
        cache.sessions.remove(key);
        cache.access_order.retain(|k| k != key);
    }

    /// Scan the sessions directory reading only the metadata line of each file.
    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        let mut result = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.sessions_dir).await {
            Ok(e) => e,
            Err(_) => return result,
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().map(|e| e != "jsonl").unwrap_or(true) {
                continue;
            }
            // Only the metadata line is read, not the whole file.
            let Ok(file) = tokio::fs::File::open(&path).await else {
                continue;
            };
            let mut lines = tokio::io::BufReader::new(file).lines();
            let Ok(Some(first_line)) = lines.next_line().await else {
                continue;
            };
            if let Ok(meta) = serde_json::from_str::<MetadataLine>(&first_line) {
                if meta.record_type == "metadata" {
                    result.push(SessionInfo {
                        key: meta.key,
                        created_at: meta.created_at,
                        updated_at: meta.updated_at,
                        path,
                    });
                }
            }
        }

        result.sort_by(|a, b| a.key.cmp(&b.key));
        result
    }

    /// Number of sessions currently cached.
    pub async fn cache_size(&self) -> usize {
        self.cache.lock().await.sessions.len()
    }

    fn session_path(&self, key: &str) -> PathBuf {
        self.sessions_dir.join(format!("{}.jsonl", safe_filename(key)))
    }

    /// Load a session from disk. A malformed line is skipped; a malformed
    /// (or missing) metadata line yields an empty session.
    async fn load(&self, key: &str) -> Option<Session> {
        let path = self.session_path(key);
        let content = tokio::fs::read_to_string(&path).await.ok()?;

        let mut session = Session::new(key);
        let mut saw_metadata = false;

        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            if !saw_metadata {
                saw_metadata = true;
                match serde_json::from_str::<MetadataLine>(line) {
                    Ok(meta) if meta.record_type == "metadata" => {
                        if let Ok(t) = chrono::DateTime::parse_from_rfc3339(&meta.created_at) {
                            session.created_at = t.with_timezone(&chrono::Utc);
                        }
                        session.metadata = meta.metadata;
                        session.last_consolidated = meta.last_consolidated;
                        continue;
                    }
                    _ => {
                        warn!(key = %key, "Malformed session metadata line, starting empty");
                        return Some(session);
                    }
                }
            }
            match serde_json::from_str::<SessionMessage>(line) {
                Ok(msg) => session.messages.push(msg),
                Err(e) => warn!(key = %key, error = %e, "Skipping malformed session line"),
            }
        }

        Some(session)
    }
}

fn move_to_end(order: &mut Vec<String>, key: &str) {
    if let Some(pos) = order.iter().position(|k| k == key) {
        let k = order.remove(pos);
        order.push(k);
    }
}

/// Convert a session key to a filesystem-safe filename: keep alphanumerics,
/// `-`, `_`, `.`; replace everything else with `_`; truncate to 200 chars.
pub fn safe_filename(key: &str) -> String {
    key.chars()
        .take(200)
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect()
}
