//! Session storage
//!
//! The pipeline hands finished sessions to a [`SessionStore`] as an
//! opaque write; the store must preserve segment sequence ordering and
//! full speaker ids on read-back. [`JsonSessionStore`] keeps one
//! directory per session with an atomically written transcript file.

use anyhow::{Context, Result};
use confab_types::{SessionMeta, SessionRecord};
use parking_lot::RwLock;
use std::path::PathBuf;

/// Where finished sessions go.
pub trait SessionStore: Send + Sync {
    fn save(&self, record: &SessionRecord) -> Result<()>;
    fn load(&self, id: &str) -> Result<SessionRecord>;
    fn list(&self) -> Vec<SessionMeta>;
}

/// Default session root: `<local data dir>/confab/sessions`.
pub fn default_sessions_dir() -> Result<PathBuf> {
    dirs::data_local_dir()
        .map(|p| p.join("confab").join("sessions"))
        .context("could not determine data directory")
}

/// File-backed store, one directory per session.
pub struct JsonSessionStore {
    root: PathBuf,
    index: RwLock<Vec<SessionMeta>>,
}

impl JsonSessionStore {
    /// Open (and create) a store rooted at `root`, scanning existing
    /// sessions into the index.
    pub fn new(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root)
            .with_context(|| format!("failed to create session root {:?}", root))?;

        let mut index = Vec::new();
        for entry in std::fs::read_dir(&root)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let transcript_path = entry.path().join("transcript.json");
            match read_record(&transcript_path) {
                Ok(record) => index.push(meta_of(&record)),
                Err(err) => {
                    tracing::warn!("skipping unreadable session {:?}: {err:#}", entry.path())
                }
            }
        }
        index.sort_by(|a, b| a.started_at.cmp(&b.started_at));

        tracing::info!("session store: {} sessions under {:?}", index.len(), root);

        Ok(Self {
            root,
            index: RwLock::new(index),
        })
    }

    fn session_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }
}

impl SessionStore for JsonSessionStore {
    fn save(&self, record: &SessionRecord) -> Result<()> {
        let dir = self.session_dir(&record.id);
        std::fs::create_dir_all(&dir)?;

        // Atomic write via temp file
        let path = dir.join("transcript.json");
        let tmp_path = dir.join("transcript.json.tmp");
        let content = serde_json::to_string_pretty(record)?;
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, &path)?;

        let meta = meta_of(record);
        let mut index = self.index.write();
        index.retain(|m| m.id != record.id);
        index.push(meta);
        index.sort_by(|a, b| a.started_at.cmp(&b.started_at));

        tracing::info!(
            "session {} saved: {} segments, {} speakers",
            record.id,
            record.transcript.segments.len(),
            record.transcript.speaker_count
        );

        Ok(())
    }

    fn load(&self, id: &str) -> Result<SessionRecord> {
        read_record(&self.session_dir(id).join("transcript.json"))
    }

    fn list(&self) -> Vec<SessionMeta> {
        self.index.read().clone()
    }
}

fn read_record(path: &std::path::Path) -> Result<SessionRecord> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {:?}", path))
}

fn meta_of(record: &SessionRecord) -> SessionMeta {
    SessionMeta {
        id: record.id.clone(),
        started_at: record.started_at.clone(),
        title: derive_title(record),
        duration_ms: record.duration_ms,
        segment_count: record.transcript.segments.len(),
        speaker_count: record.transcript.speaker_count,
    }
}

/// Human list title, e.g. "Session 03.11 10:15 · 4 min 12 sec".
fn derive_title(record: &SessionRecord) -> String {
    let stamp = chrono::DateTime::parse_from_rfc3339(&record.started_at)
        .map(|t| t.format("%d.%m %H:%M").to_string())
        .unwrap_or_else(|_| record.started_at.clone());

    let total_secs = record.duration_ms.max(0) / 1000;
    let mins = total_secs / 60;
    let secs = total_secs % 60;
    if mins > 0 {
        format!("Session {stamp} · {mins} min {secs} sec")
    } else {
        format!("Session {stamp} · {secs} sec")
    }
}
