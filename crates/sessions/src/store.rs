//! Durable session store.
//!
//! Persists the session index in `sessions.json` under the configured state
//! path, one append-only `<sessionId>.events.jsonl` log per session, and an
//! `<sessionId>.state.json` checkpoint written after each observation.
//! Malformed log lines are skipped on load rather than failing the session.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use axon_domain::error::{Error, Result};
use axon_domain::trace::TraceEvent;
use axon_domain::{Event, State};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session entry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A single session tracked by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEntry {
    pub session_id: String,
    /// Filesystem root the session's tools are confined to.
    pub workspace_root: PathBuf,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Highest event id appended so far.
    #[serde(default)]
    pub last_event_id: u64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Store backed by a directory of JSON/JSONL files.
pub struct SessionStore {
    dir: PathBuf,
    index_path: PathBuf,
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

impl SessionStore {
    /// Load or create the store at `state_path/sessions/`.
    pub fn new(state_path: &Path) -> Result<Self> {
        let dir = state_path.join("sessions");
        std::fs::create_dir_all(&dir).map_err(Error::Io)?;

        let index_path = dir.join("sessions.json");
        let sessions = if index_path.exists() {
            let raw = std::fs::read_to_string(&index_path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };

        tracing::info!(
            sessions = sessions.len(),
            path = %index_path.display(),
            "session store loaded"
        );

        Ok(Self {
            dir,
            index_path,
            sessions: RwLock::new(sessions),
        })
    }

    fn events_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.events.jsonl"))
    }

    fn state_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.state.json"))
    }

    /// Create a session. Fails if the id is already taken.
    pub fn create(&self, session_id: &str, workspace_root: &Path) -> Result<SessionEntry> {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(session_id) {
            return Err(Error::Session(format!(
                "session '{session_id}' already exists"
            )));
        }
        let now = Utc::now();
        let entry = SessionEntry {
            session_id: session_id.to_owned(),
            workspace_root: workspace_root.to_path_buf(),
            created_at: now,
            updated_at: now,
            last_event_id: 0,
        };
        sessions.insert(session_id.to_owned(), entry.clone());
        drop(sessions);
        self.flush()?;

        TraceEvent::SessionResolved {
            session_id: session_id.to_owned(),
            is_new: true,
        }
        .emit();

        Ok(entry)
    }

    /// Look up a session by id.
    pub fn get(&self, session_id: &str) -> Option<SessionEntry> {
        self.sessions.read().get(session_id).cloned()
    }

    /// Fetch an existing session or create it bound to `workspace_root`.
    pub fn resolve_or_create(
        &self,
        session_id: &str,
        workspace_root: &Path,
    ) -> Result<(SessionEntry, bool)> {
        if let Some(entry) = self.get(session_id) {
            TraceEvent::SessionResolved {
                session_id: session_id.to_owned(),
                is_new: false,
            }
            .emit();
            return Ok((entry, false));
        }
        Ok((self.create(session_id, workspace_root)?, true))
    }

    /// Load a session's event log and latest state checkpoint.
    pub fn load(&self, session_id: &str) -> Result<(Vec<Event>, Option<State>)> {
        if self.get(session_id).is_none() {
            return Err(Error::Session(format!("unknown session '{session_id}'")));
        }

        let mut events = Vec::new();
        let events_path = self.events_path(session_id);
        if events_path.exists() {
            let raw = std::fs::read_to_string(&events_path).map_err(Error::Io)?;
            for line in raw.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Event>(line) {
                    Ok(event) => events.push(event),
                    Err(e) => {
                        tracing::warn!(
                            session_id,
                            error = %e,
                            "skipping malformed event log line"
                        );
                    }
                }
            }
        }

        let state_path = self.state_path(session_id);
        let state = if state_path.exists() {
            let raw = std::fs::read_to_string(&state_path).map_err(Error::Io)?;
            match serde_json::from_str::<State>(&raw) {
                Ok(s) => Some(s),
                Err(e) => {
                    tracing::warn!(session_id, error = %e, "ignoring unreadable state checkpoint");
                    None
                }
            }
        } else {
            None
        };

        Ok((events, state))
    }

    /// Append one event to a session's log.
    pub fn append(&self, session_id: &str, event: &Event) -> Result<()> {
        let json = serde_json::to_string(event)?;
        let path = self.events_path(session_id);
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(Error::Io)?;
        file.write_all(json.as_bytes()).map_err(Error::Io)?;
        file.write_all(b"\n").map_err(Error::Io)?;

        {
            let mut sessions = self.sessions.write();
            if let Some(entry) = sessions.get_mut(session_id) {
                entry.last_event_id = entry.last_event_id.max(event.id);
                entry.updated_at = Utc::now();
            }
        }

        TraceEvent::EventAppend {
            session_id: session_id.to_owned(),
            event_id: event.id,
        }
        .emit();

        Ok(())
    }

    /// Write the session's state checkpoint.
    pub fn save_state(&self, session_id: &str, state: &State) -> Result<()> {
        let json = serde_json::to_string(state)?;
        std::fs::write(self.state_path(session_id), json).map_err(Error::Io)?;
        Ok(())
    }

    /// Delete a session: index entry, event log, and checkpoint.
    pub fn delete(&self, session_id: &str) -> Result<()> {
        let removed = self.sessions.write().remove(session_id);
        if removed.is_none() {
            return Err(Error::Session(format!("unknown session '{session_id}'")));
        }
        for path in [self.events_path(session_id), self.state_path(session_id)] {
            if path.exists() {
                std::fs::remove_file(&path).map_err(Error::Io)?;
            }
        }
        self.flush()?;

        TraceEvent::SessionDeleted {
            session_id: session_id.to_owned(),
        }
        .emit();

        Ok(())
    }

    /// List all session entries, newest first.
    pub fn list(&self) -> Vec<SessionEntry> {
        let mut entries: Vec<SessionEntry> = self.sessions.read().values().cloned().collect();
        entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        entries
    }

    /// Persist the session index to disk.
    pub fn flush(&self) -> Result<()> {
        let sessions = self.sessions.read();
        let json = serde_json::to_string_pretty(&*sessions)?;
        std::fs::write(&self.index_path, json).map_err(Error::Io)?;
        Ok(())
    }
}
