// src/session/record.rs
//! Session records

use crate::error::{EmgError, EmgResult};
use crate::protocol::Phase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Record of an id replaced during import
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdConflict {
    pub original_id: String,
    pub reassigned_at: DateTime<Utc>,
}

/// Who and what was recorded
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub subject_id: String,
    pub muscle_group: String,
    pub electrode_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub electrode_config: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_placement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_conflict: Option<IdConflict>,
}

impl SessionMetadata {
    pub fn new(subject_id: &str, muscle_group: &str, electrode_type: &str) -> Self {
        Self {
            subject_id: subject_id.to_string(),
            muscle_group: muscle_group.to_string(),
            electrode_type: electrode_type.to_string(),
            ..Default::default()
        }
    }

    pub fn with_electrode_config(mut self, config: impl Into<String>) -> Self {
        self.electrode_config = Some(config.into());
        self
    }

    pub fn with_body_placement(mut self, placement: impl Into<String>) -> Self {
        self.body_placement = Some(placement.into());
        self
    }

    pub fn with_protocol_name(mut self, name: impl Into<String>) -> Self {
        self.protocol_name = Some(name.into());
        self
    }

    /// Required fields must be non-empty after trimming
    pub fn validate(&self) -> EmgResult<()> {
        for (field, value) in [
            ("subject_id", &self.subject_id),
            ("muscle_group", &self.muscle_group),
            ("electrode_type", &self.electrode_type),
        ] {
            if value.trim().is_empty() {
                return Err(EmgError::validation(field, "must not be empty"));
            }
        }
        Ok(())
    }

    /// Trim required fields and drop blank optional ones
    pub(crate) fn normalized(mut self) -> Self {
        fn blank_to_none(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        self.subject_id = self.subject_id.trim().to_string();
        self.muscle_group = self.muscle_group.trim().to_string();
        self.electrode_type = self.electrode_type.trim().to_string();
        self.electrode_config = blank_to_none(self.electrode_config);
        self.body_placement = blank_to_none(self.body_placement);
        self.protocol_name = blank_to_none(self.protocol_name);
        self
    }
}

/// Finalized, read-only recording of one protocol run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    id: String,
    #[serde(flatten)]
    metadata: SessionMetadata,
    phases: Vec<Phase>,
    created_at: DateTime<Utc>,
}

impl Session {
    pub(crate) fn new(
        id: String,
        metadata: SessionMetadata,
        phases: Vec<Phase>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            metadata,
            phases,
            created_at,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn metadata(&self) -> &SessionMetadata {
        &self.metadata
    }

    pub fn subject_id(&self) -> &str {
        &self.metadata.subject_id
    }

    pub fn muscle_group(&self) -> &str {
        &self.metadata.muscle_group
    }

    pub fn electrode_type(&self) -> &str {
        &self.metadata.electrode_type
    }

    /// Phases in protocol order
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn phase(&self, id: &str) -> Option<&Phase> {
        self.phases.iter().find(|p| p.id() == id)
    }

    pub fn phase_ids(&self) -> impl Iterator<Item = &str> {
        self.phases.iter().map(Phase::id)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn total_samples(&self) -> usize {
        self.phases.iter().map(Phase::sample_count).sum()
    }

    /// Replace the id of an imported session, recording the original
    pub(crate) fn reassign_id(&mut self, new_id: String, at: DateTime<Utc>) {
        let original_id = std::mem::replace(&mut self.id, new_id);
        self.metadata.id_conflict = Some(IdConflict {
            original_id,
            reassigned_at: at,
        });
    }

    /// Structural checks for records that did not come from the assembler
    pub(crate) fn validate(&self) -> EmgResult<()> {
        if self.id.trim().is_empty() {
            return Err(EmgError::validation("session.id", "must not be empty"));
        }
        self.metadata.validate()?;
        if self.phases.is_empty() {
            return Err(EmgError::validation(
                "session.phases",
                format!("session '{}' has no phases", self.id),
            ));
        }

        let mut seen = HashSet::new();
        for phase in &self.phases {
            if !seen.insert(phase.id()) {
                return Err(EmgError::validation(
                    "session.phases",
                    format!("duplicate phase id '{}'", phase.id()),
                ));
            }
            phase.check_complete()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_validation() {
        assert!(SessionMetadata::new("SUB001", "Bicep", "Gel").validate().is_ok());

        let err = SessionMetadata::new("  ", "Bicep", "Gel").validate().unwrap_err();
        assert!(matches!(err, EmgError::Validation { ref field, .. } if field == "subject_id"));

        assert!(SessionMetadata::new("SUB001", "", "Gel").validate().is_err());
        assert!(SessionMetadata::new("SUB001", "Bicep", "\t").validate().is_err());
    }

    #[test]
    fn test_normalized_trims() {
        let metadata = SessionMetadata::new(" SUB001 ", "Bicep ", " Gel")
            .with_body_placement("  ")
            .with_electrode_config("Bipolar")
            .normalized();

        assert_eq!(metadata.subject_id, "SUB001");
        assert_eq!(metadata.muscle_group, "Bicep");
        assert_eq!(metadata.electrode_type, "Gel");
        assert_eq!(metadata.body_placement, None);
        assert_eq!(metadata.electrode_config.as_deref(), Some("Bipolar"));
    }

    #[test]
    fn test_metadata_is_flattened_into_session_json() {
        let session = Session::new(
            "emg-001".to_string(),
            SessionMetadata::new("SUB001", "Bicep", "Gel"),
            Vec::new(),
            Utc::now(),
        );
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["id"], "emg-001");
        assert_eq!(json["subjectId"], "SUB001");
        assert_eq!(json["muscleGroup"], "Bicep");
        assert!(json.get("bodyPlacement").is_none());
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn test_reassign_records_conflict() {
        let mut session = Session::new(
            "emg-001".to_string(),
            SessionMetadata::new("SUB001", "Bicep", "Gel"),
            Vec::new(),
            Utc::now(),
        );
        session.reassign_id("emg-007".to_string(), Utc::now());

        assert_eq!(session.id(), "emg-007");
        let conflict = session.metadata().id_conflict.as_ref().unwrap();
        assert_eq!(conflict.original_id, "emg-001");
    }

    #[test]
    fn test_validate_rejects_empty_session() {
        let session = Session::new(
            "emg-001".to_string(),
            SessionMetadata::new("SUB001", "Bicep", "Gel"),
            Vec::new(),
            Utc::now(),
        );
        assert!(session.validate().is_err());
    }
}
