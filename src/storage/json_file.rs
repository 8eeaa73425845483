// src/storage/json_file.rs
//! Sessions kept as one JSON array on disk

use super::SessionStore;
use crate::error::StorageError;
use crate::session::Session;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// File-backed store. Every write replaces the file atomically, so a crash
/// mid-save never leaves a truncated array behind.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    pretty: bool,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pretty: true,
        }
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Vec<Session>, StorageError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn write(&self, sessions: &[Session]) -> Result<(), StorageError> {
        let json = if self.pretty {
            serde_json::to_vec_pretty(sessions)?
        } else {
            serde_json::to_vec(sessions)?
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut temp = NamedTempFile::new_in(&dir)?;
        temp.write_all(&json)?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| StorageError::from(e.error))?;

        debug!(path = %self.path.display(), sessions = sessions.len(), "session file written");
        Ok(())
    }
}

impl SessionStore for JsonFileStore {
    fn save(&mut self, session: &Session) -> Result<(), StorageError> {
        let mut sessions = self.read()?;
        if sessions.iter().any(|s| s.id() == session.id()) {
            return Err(StorageError::Duplicate(session.id().to_string()));
        }
        sessions.push(session.clone());
        self.write(&sessions)?;

        info!(session = session.id(), path = %self.path.display(), "session stored");
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<Session>, StorageError> {
        self.read()
    }

    fn delete(&mut self, id: &str) -> Result<(), StorageError> {
        let mut sessions = self.read()?;
        let before = sessions.len();
        sessions.retain(|s| s.id() != id);
        if sessions.len() == before {
            return Err(StorageError::NotFound(id.to_string()));
        }
        self.write(&sessions)
    }
}
