// src/session/library.rs
//! In-memory collection of finalized sessions
//!
//! Backs the browsing views: filtering, per-muscle counts, metric comparison
//! across sessions, and JSON import/export.

use super::assembler::IdMinter;
use super::record::Session;
use crate::error::{EmgError, EmgResult, StorageError};
use crate::processing::MetricKind;
use crate::storage::SessionStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Optional criteria, all of which must match
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFilter {
    /// Case-insensitive substring of the subject id or muscle group
    pub search: Option<String>,
    pub muscle_group: Option<String>,
    pub electrode_type: Option<String>,
}

impl SessionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn muscle_group(mut self, muscle: impl Into<String>) -> Self {
        self.muscle_group = Some(muscle.into());
        self
    }

    pub fn electrode_type(mut self, electrode: impl Into<String>) -> Self {
        self.electrode_type = Some(electrode.into());
        self
    }

    pub fn matches(&self, session: &Session) -> bool {
        let matches_search = match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(term) => {
                let term = term.to_lowercase();
                session.subject_id().to_lowercase().contains(&term)
                    || session.muscle_group().to_lowercase().contains(&term)
            }
        };
        let matches_muscle = match self.muscle_group.as_deref() {
            None | Some("") => true,
            Some(muscle) => session.muscle_group() == muscle,
        };
        let matches_electrode = match self.electrode_type.as_deref() {
            None | Some("") => true,
            Some(electrode) => session.electrode_type() == electrode,
        };

        matches_search && matches_muscle && matches_electrode
    }
}

/// One bar of a cross-session comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonRow {
    pub session_id: String,
    pub subject_id: String,
    pub created_at: DateTime<Utc>,
    pub metric: MetricKind,
    /// 0 when the session has no such phase
    pub value: f64,
    pub phase_present: bool,
}

/// Outcome of [`SessionLibrary::import_json`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Final ids of the imported sessions, in input order
    pub imported: Vec<String>,
    /// `(original id, new id)` for every session that had to be renamed
    pub reassigned: Vec<(String, String)>,
}

/// Sessions in insertion order
#[derive(Debug, Clone, Default)]
pub struct SessionLibrary {
    sessions: Vec<Session>,
}

impl SessionLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load everything a store holds. Invalid records are skipped.
    pub fn load_from<S: SessionStore + ?Sized>(store: &S) -> EmgResult<Self> {
        let mut library = Self::new();
        for session in store.load_all()? {
            let id = session.id().to_string();
            if let Err(err) = session.validate().and_then(|_| library.insert(session)) {
                warn!(session = %id, error = %err, "skipping stored session");
            }
        }
        Ok(library)
    }

    pub fn insert(&mut self, session: Session) -> EmgResult<()> {
        if self.get(session.id()).is_some() {
            return Err(EmgError::invalid_state(
                format!("insert session '{}'", session.id()),
                "an equal id is already present",
            ));
        }
        self.sessions.push(session);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id() == id)
    }

    /// Delete a whole session
    pub fn remove(&mut self, id: &str) -> Option<Session> {
        let index = self.sessions.iter().position(|s| s.id() == id)?;
        Some(self.sessions.remove(index))
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.sessions.iter().map(Session::id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn filter(&self, filter: &SessionFilter) -> Vec<&Session> {
        self.sessions.iter().filter(|s| filter.matches(s)).collect()
    }

    /// Number of sessions per muscle group
    pub fn muscle_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for session in &self.sessions {
            *counts.entry(session.muscle_group().to_string()).or_insert(0) += 1;
        }
        counts
    }

    /// One row per known id, in the order requested
    pub fn compare(&self, ids: &[&str], phase_id: &str, metric: MetricKind) -> Vec<ComparisonRow> {
        ids.iter()
            .filter_map(|id| self.get(id))
            .map(|session| {
                let metrics = session.phase(phase_id).and_then(|p| p.metrics());
                ComparisonRow {
                    session_id: session.id().to_string(),
                    subject_id: session.subject_id().to_string(),
                    created_at: session.created_at(),
                    metric,
                    value: metrics.map_or(0.0, |m| m.value(metric)),
                    phase_present: metrics.is_some(),
                }
            })
            .collect()
    }

    pub fn export_session(&self, id: &str) -> EmgResult<String> {
        let session = self
            .get(id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        serde_json::to_string_pretty(session).map_err(|e| EmgError::Storage(e.into()))
    }

    pub fn export_all(&self) -> EmgResult<String> {
        serde_json::to_string_pretty(&self.sessions).map_err(|e| EmgError::Storage(e.into()))
    }

    /// Suggested file name for a single-session export
    pub fn export_file_name(id: &str) -> String {
        format!("emg-session-{}.json", id)
    }

    /// Import one session object or an array of them.
    ///
    /// Every record is validated before anything is inserted. Records whose
    /// id is already taken get a freshly minted id; the original is kept in
    /// `metadata.id_conflict`.
    pub fn import_json(&mut self, input: &str) -> EmgResult<ImportReport> {
        let value: Value = serde_json::from_str(input)
            .map_err(|e| EmgError::validation("import", e.to_string()))?;

        let records = match value {
            Value::Array(items) => items,
            object @ Value::Object(_) => vec![object],
            _ => {
                return Err(EmgError::validation(
                    "import",
                    "expected a session object or an array of sessions",
                ))
            }
        };

        let mut incoming = Vec::with_capacity(records.len());
        for (index, record) in records.into_iter().enumerate() {
            let session: Session = serde_json::from_value(record)
                .map_err(|e| EmgError::validation(format!("import[{}]", index), e.to_string()))?;
            session.validate()?;
            incoming.push(session);
        }

        // Reserve every free incoming id first so a minted id never steals
        // one a later record already carries
        let mut minter = IdMinter::new(self.ids().map(str::to_string));
        let conflicts: Vec<bool> = incoming.iter().map(|s| !minter.reserve(s.id())).collect();
        let mut report = ImportReport::default();
        let now = Utc::now();

        for (mut session, conflict) in incoming.into_iter().zip(conflicts) {
            if conflict {
                let original = session.id().to_string();
                let fresh = minter.mint();
                session.reassign_id(fresh.clone(), now);
                report.reassigned.push((original, fresh));
            }
            report.imported.push(session.id().to_string());
            self.sessions.push(session);
        }

        info!(
            imported = report.imported.len(),
            reassigned = report.reassigned.len(),
            "sessions imported"
        );
        Ok(report)
    }
}
