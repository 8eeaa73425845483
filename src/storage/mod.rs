// src/storage/mod.rs
//! Session persistence
//!
//! The core only hands finalized sessions to a [`SessionStore`]; where they
//! end up is the store's business. A failed save leaves the session in the
//! caller's hands.

pub mod json_file;

pub use json_file::JsonFileStore;

use crate::error::StorageError;
use crate::session::Session;

/// Destination for finalized sessions
pub trait SessionStore {
    /// Persist one session. Saving an id that is already stored fails with
    /// [`StorageError::Duplicate`].
    fn save(&mut self, session: &Session) -> Result<(), StorageError>;

    /// Every stored session, oldest first
    fn load_all(&self) -> Result<Vec<Session>, StorageError>;

    fn delete(&mut self, id: &str) -> Result<(), StorageError>;
}

impl<S: SessionStore + ?Sized> SessionStore for Box<S> {
    fn save(&mut self, session: &Session) -> Result<(), StorageError> {
        (**self).save(session)
    }

    fn load_all(&self) -> Result<Vec<Session>, StorageError> {
        (**self).load_all()
    }

    fn delete(&mut self, id: &str) -> Result<(), StorageError> {
        (**self).delete(id)
    }
}

/// Volatile store for tests and dry runs
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    sessions: Vec<Session>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl SessionStore for MemoryStore {
    fn save(&mut self, session: &Session) -> Result<(), StorageError> {
        if self.sessions.iter().any(|s| s.id() == session.id()) {
            return Err(StorageError::Duplicate(session.id().to_string()));
        }
        self.sessions.push(session.clone());
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<Session>, StorageError> {
        Ok(self.sessions.clone())
    }

    fn delete(&mut self, id: &str) -> Result<(), StorageError> {
        let index = self
            .sessions
            .iter()
            .position(|s| s.id() == id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        self.sessions.remove(index);
        Ok(())
    }
}
