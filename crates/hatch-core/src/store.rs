//! Flat JSON session metadata store.
//!
//! Every operation re-reads the file; callers never cache records across
//! mutations. Writes go through a temp file and a rename so a crash mid-write
//! leaves the previous contents intact. An in-process lock serializes
//! read-modify-write cycles from concurrent worker threads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::warn;

use crate::types::{SessionId, SessionRecord};

const STORE_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read session store {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse session store {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize session store: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to create session store directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write session store {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("session not found in store: {id}")]
    NotFound { id: SessionId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default = "store_version")]
    version: u32,
    #[serde(default)]
    sessions: Vec<SessionRecord>,
}

fn store_version() -> u32 {
    STORE_VERSION
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records, in file order. A missing file is an empty store.
    pub fn load_all_sessions(&self) -> Result<Vec<SessionRecord>, StoreError> {
        let body = match fs::read_to_string(&self.path) {
            Ok(body) => body,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }

        let file: StoreFile = serde_json::from_str(&body).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })?;
        Ok(dedupe(file.sessions))
    }

    pub fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self
            .load_all_sessions()?
            .into_iter()
            .find(|record| &record.namespaced_id == id))
    }

    /// Replaces the record with the same id, or appends a new one.
    pub fn upsert(&self, record: SessionRecord) -> Result<(), StoreError> {
        let _guard = self.lock();
        let mut sessions = self.load_all_sessions()?;
        match sessions
            .iter_mut()
            .find(|existing| existing.namespaced_id == record.namespaced_id)
        {
            Some(existing) => *existing = record,
            None => sessions.push(record),
        }
        self.write_all(&sessions)
    }

    pub fn touch(&self, id: &SessionId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let _guard = self.lock();
        let mut sessions = self.load_all_sessions()?;
        let record = sessions
            .iter_mut()
            .find(|record| &record.namespaced_id == id)
            .ok_or_else(|| StoreError::NotFound { id: id.clone() })?;
        record.touch(at);
        self.write_all(&sessions)
    }

    /// Removes the record. Returns `false` when it was already gone.
    pub fn remove(&self, id: &SessionId) -> Result<bool, StoreError> {
        let _guard = self.lock();
        let mut sessions = self.load_all_sessions()?;
        let before = sessions.len();
        sessions.retain(|record| &record.namespaced_id != id);
        if sessions.len() == before {
            return Ok(false);
        }
        self.write_all(&sessions)?;
        Ok(true)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_all(&self, sessions: &[SessionRecord]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let file = StoreFile {
            version: STORE_VERSION,
            sessions: sessions.to_vec(),
        };
        let body = serde_json::to_string_pretty(&file)
            .map_err(|source| StoreError::Serialize { source })?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(|source| StoreError::Write {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }
}

fn dedupe(sessions: Vec<SessionRecord>) -> Vec<SessionRecord> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(sessions.len());
    for record in sessions {
        if seen.insert(record.namespaced_id.clone()) {
            out.push(record);
        } else {
            warn!(session = %record.namespaced_id, "duplicate session record ignored");
        }
    }
    out
}
