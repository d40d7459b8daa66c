//! Durable append-only transcripts: one JSONL file per session key with a
//! write-back cache. Line 1 is a metadata record; each following line is
//! one `SessionMessage`. Malformed lines are skipped on load.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use robun_core::{Result, RobunError, SessionMessage};

/// One conversation under one `{channel}:{chat_id}` key.
#[derive(Debug, Clone)]
pub struct Session {
    pub key: String,
    pub messages: Vec<SessionMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Count of transcript messages already folded into long-term memory.
    pub last_consolidated: usize,
}

impl Session {
    pub fn new(key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            metadata: serde_json::Map::new(),
            last_consolidated: 0,
        }
    }
}

/// Summary row for session listings.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub key: String,
    pub message_count: usize,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct MetadataRecord {
    #[serde(rename = "_type")]
    record_type: String,
    #[serde(rename = "createdAt")]
    created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    updated_at: DateTime<Utc>,
    #[serde(default)]
    metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(rename = "lastConsolidated", default)]
    last_consolidated: usize,
}

/// Replace characters that are reserved on common filesystems. Note that
/// this maps `:` to `_`, so `telegram:123` and `telegram_123` collide on
/// disk — preserved from the original layout.
fn safe_filename(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            other => other,
        })
        .collect()
}

pub struct SessionStore {
    dir: PathBuf,
    cache: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            cache: RwLock::new(HashMap::new()),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", safe_filename(key)))
    }

    /// Cache hit, else load from disk, else a fresh session.
    pub async fn get_or_create(&self, key: &str) -> Session {
        if let Some(session) = self.cache.read().await.get(key) {
            return session.clone();
        }

        let session = match load_file(&self.path_for(key), key) {
            Some(session) => session,
            None => Session::new(key),
        };
        self.cache
            .write()
            .await
            .insert(key.to_string(), session.clone());
        session
    }

    /// Full rewrite of the session file (write-to-temp + rename) and
    /// cache update.
    pub async fn save(&self, session: &Session) -> Result<()> {
        let path = self.path_for(&session.key);
        let mut lines = Vec::with_capacity(session.messages.len() + 1);
        lines.push(serde_json::to_string(&MetadataRecord {
            record_type: "metadata".into(),
            created_at: session.created_at,
            updated_at: session.updated_at,
            metadata: session.metadata.clone(),
            last_consolidated: session.last_consolidated,
        })?);
        for message in &session.messages {
            lines.push(serde_json::to_string(message)?);
        }
        let payload = lines.join("\n") + "\n";

        let tmp = path.with_extension("jsonl.tmp");
        tokio::fs::write(&tmp, payload).await?;
        tokio::fs::rename(&tmp, &path).await?;

        self.cache
            .write()
            .await
            .insert(session.key.clone(), session.clone());
        debug!(key = %session.key, messages = session.messages.len(), "session saved");
        Ok(())
    }

    /// Drop the cache entry; the next access reloads from disk.
    pub async fn invalidate(&self, key: &str) {
        self.cache.write().await.remove(key);
    }

    /// Whether a session is already cached or persisted for this key.
    pub async fn exists(&self, key: &str) -> bool {
        self.cache.read().await.contains_key(key) || self.path_for(key).exists()
    }

    /// Compare-and-set on the consolidation pointer. Returns false when
    /// the stored value no longer matches `expected` (another consolidation
    /// advanced it first).
    pub async fn advance_consolidated(&self, key: &str, expected: usize, new: usize) -> Result<bool> {
        let mut session = self.get_or_create(key).await;
        if session.last_consolidated != expected {
            return Ok(false);
        }
        session.last_consolidated = new;
        session.updated_at = Utc::now();
        self.save(&session).await?;
        Ok(true)
    }

    /// Enumerate session files on disk. The key is the (sanitized) file
    /// stem.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let mut summaries = Vec::new();
        let mut reader = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(RobunError::Io)?
        {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "jsonl") {
                continue;
            }
            let key = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            if let Some(session) = load_file(&path, &key) {
                summaries.push(SessionSummary {
                    key,
                    message_count: session.messages.len(),
                    updated_at: session.updated_at,
                });
            }
        }
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }
}

/// Load one session file. Returns `None` when the file is missing or
/// unreadable; malformed lines inside the file are skipped.
fn load_file(path: &Path, key: &str) -> Option<Session> {
    let raw = std::fs::read_to_string(path).ok()?;
    let mut session = Session::new(key);

    for (idx, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.contains("\"_type\":\"metadata\"") || line.contains("\"_type\": \"metadata\"") {
            match serde_json::from_str::<MetadataRecord>(line) {
                Ok(meta) => {
                    session.created_at = meta.created_at;
                    session.updated_at = meta.updated_at;
                    session.metadata = meta.metadata;
                    session.last_consolidated = meta.last_consolidated;
                }
                Err(e) => warn!(?path, line = idx + 1, error = %e, "bad metadata line — skipping"),
            }
            continue;
        }
        match serde_json::from_str::<SessionMessage>(line) {
            Ok(message) => session.messages.push(message),
            Err(e) => warn!(?path, line = idx + 1, error = %e, "bad message line — skipping"),
        }
    }
    Some(session)
}
