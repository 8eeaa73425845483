// src/session/assembler.rs
//! Builds sessions out of finalized phases

use super::record::{Session, SessionMetadata};
use crate::config::constants::session::{ID_MIN_DIGITS, ID_PREFIX};
use crate::error::{EmgError, EmgErrorBuilder, EmgResult};
use crate::protocol::{Phase, PhaseState};
use chrono::Utc;
use std::collections::HashSet;
use tracing::{debug, info};

/// Mints `emg-NNN` ids that never collide with known ones
#[derive(Debug, Clone)]
pub struct IdMinter {
    known: HashSet<String>,
    next: u64,
}

impl Default for IdMinter {
    fn default() -> Self {
        Self {
            known: HashSet::new(),
            next: 1,
        }
    }
}

impl IdMinter {
    /// Numbering starts after the count of known ids
    pub fn new<I, S>(known: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let known: HashSet<String> = known.into_iter().map(Into::into).collect();
        let next = known.len() as u64 + 1;
        Self { known, next }
    }

    pub fn mint(&mut self) -> String {
        loop {
            let id = format!("{}{:0width$}", ID_PREFIX, self.next, width = ID_MIN_DIGITS);
            self.next += 1;
            if self.known.insert(id.clone()) {
                return id;
            }
        }
    }

    /// Mark an id as taken. Returns `false` if it already was.
    pub fn reserve(&mut self, id: &str) -> bool {
        self.known.insert(id.to_string())
    }

    pub fn is_known(&self, id: &str) -> bool {
        self.known.contains(id)
    }
}

/// Session under construction
#[derive(Debug)]
pub struct SessionDraft {
    id: String,
    metadata: SessionMetadata,
    phases: Vec<Phase>,
    finalized: bool,
}

impl SessionDraft {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn metadata(&self) -> &SessionMetadata {
        &self.metadata
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Give up on the draft and keep whatever phases it holds
    pub fn into_phases(self) -> Vec<Phase> {
        self.phases
    }
}

/// Collects finalized phases into immutable sessions
#[derive(Debug, Default)]
pub struct SessionAssembler {
    ids: IdMinter,
}

impl SessionAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with the ids of sessions that already exist
    pub fn with_known_ids<I, S>(known: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: IdMinter::new(known),
        }
    }

    pub fn begin_session(&mut self, metadata: SessionMetadata) -> EmgResult<SessionDraft> {
        metadata.validate()?;
        let id = self.ids.mint();
        debug!(session = %id, "session draft opened");

        Ok(SessionDraft {
            id,
            metadata: metadata.normalized(),
            phases: Vec::new(),
            finalized: false,
        })
    }

    /// Append a finished phase, keeping protocol order
    pub fn attach_phase(&self, draft: &mut SessionDraft, phase: Phase) -> EmgResult<()> {
        let error = || EmgErrorBuilder::new("session", "attach phase to");

        if draft.finalized {
            return Err(error().invalid_state("finalized"));
        }
        if phase.state() != PhaseState::Done {
            return Err(EmgError::invalid_state(
                format!("attach phase '{}'", phase.id()),
                phase.state().to_string(),
            ));
        }
        if draft.phases.iter().any(|p| p.id() == phase.id()) {
            return Err(EmgError::invalid_state(
                format!("attach phase '{}'", phase.id()),
                "already attached",
            ));
        }
        if let Some(previous) = draft.phases.last() {
            if !phase.starts_after(previous) {
                return Err(error().validation(
                    "phase.startedAt",
                    &format!(
                        "phase '{}' starts before the previous phase ended",
                        phase.id()
                    ),
                ));
            }
        }

        debug!(session = %draft.id, phase = phase.id(), "phase attached");
        draft.phases.push(phase);
        Ok(())
    }

    pub fn finalize(&self, draft: &mut SessionDraft) -> EmgResult<Session> {
        if draft.finalized {
            return Err(EmgErrorBuilder::new("session", "finalize").invalid_state("finalized"));
        }
        if draft.phases.is_empty() {
            return Err(EmgError::validation(
                "session.phases",
                "a session needs at least one completed phase",
            ));
        }

        draft.finalized = true;
        let session = Session::new(
            draft.id.clone(),
            draft.metadata.clone(),
            std::mem::take(&mut draft.phases),
            Utc::now(),
        );

        info!(
            session = session.id(),
            phases = session.phases().len(),
            samples = session.total_samples(),
            "session finalized"
        );
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::FeatureConfig;
    use crate::protocol::PhaseDefinition;

    fn done_phase(id: &str) -> Phase {
        let mut phase = Phase::start(&PhaseDefinition::new(id, id, 100).unwrap());
        phase.extend_samples(&[1.0]).unwrap();
        phase.finalize(&FeatureConfig::default()).unwrap();
        phase
    }

    fn metadata() -> SessionMetadata {
        SessionMetadata::new("SUB001", "Bicep", "Gel")
    }

    #[test]
    fn test_minter_skips_known_ids() {
        let mut minter = IdMinter::new(["emg-001", "emg-003"]);
        assert_eq!(minter.mint(), "emg-004");
        assert_eq!(minter.mint(), "emg-005");

        let mut minter = IdMinter::new(["emg-002"]);
        assert_eq!(minter.mint(), "emg-003");

        let mut empty = IdMinter::default();
        assert_eq!(empty.mint(), "emg-001");
    }

    #[test]
    fn test_minter_widens_past_three_digits() {
        let known: Vec<String> = (1..=999).map(|n| format!("emg-{:03}", n)).collect();
        let mut minter = IdMinter::new(known);
        assert_eq!(minter.mint(), "emg-1000");
    }

    #[test]
    fn test_reserve() {
        let mut minter = IdMinter::new(Vec::<String>::new());
        assert!(minter.reserve("emg-001"));
        assert!(!minter.reserve("emg-001"));
        assert!(minter.is_known("emg-001"));
        assert_eq!(minter.mint(), "emg-002");
    }

    #[test]
    fn test_happy_path() {
        let mut assembler = SessionAssembler::new();
        let mut draft = assembler.begin_session(metadata()).unwrap();
        assert_eq!(draft.id(), "emg-001");

        assembler.attach_phase(&mut draft, done_phase("baseline")).unwrap();
        assembler.attach_phase(&mut draft, done_phase("contraction")).unwrap();

        let session = assembler.finalize(&mut draft).unwrap();
        let ids: Vec<&str> = session.phase_ids().collect();
        assert_eq!(ids, ["baseline", "contraction"]);
        assert!(draft.is_finalized());
    }

    #[test]
    fn test_begin_rejects_missing_metadata() {
        let mut assembler = SessionAssembler::new();
        let err = assembler
            .begin_session(SessionMetadata::new("SUB001", " ", "Gel"))
            .unwrap_err();
        assert!(matches!(err, EmgError::Validation { .. }));
    }

    #[test]
    fn test_attach_rejects_unfinished_and_duplicate() {
        let mut assembler = SessionAssembler::new();
        let mut draft = assembler.begin_session(metadata()).unwrap();

        let collecting = Phase::start(&PhaseDefinition::new("a", "a", 100).unwrap());
        assert!(matches!(
            assembler.attach_phase(&mut draft, collecting),
            Err(EmgError::InvalidState { .. })
        ));

        assembler.attach_phase(&mut draft, done_phase("a")).unwrap();
        assert!(matches!(
            assembler.attach_phase(&mut draft, done_phase("a")),
            Err(EmgError::InvalidState { .. })
        ));
        assert_eq!(draft.phases().len(), 1);
    }

    #[test]
    fn test_attach_rejects_out_of_order_phase() {
        let mut assembler = SessionAssembler::new();
        let mut draft = assembler.begin_session(metadata()).unwrap();

        let mut early = Phase::start(&PhaseDefinition::new("early", "early", 100).unwrap());
        std::thread::sleep(std::time::Duration::from_millis(2));
        let late = done_phase("late");
        early.finalize(&FeatureConfig::default()).unwrap();

        assembler.attach_phase(&mut draft, late).unwrap();
        assert!(matches!(
            assembler.attach_phase(&mut draft, early),
            Err(EmgError::Validation { .. })
        ));
    }

    #[test]
    fn test_finalize_rules() {
        let mut assembler = SessionAssembler::new();
        let mut draft = assembler.begin_session(metadata()).unwrap();
        assert!(matches!(
            assembler.finalize(&mut draft),
            Err(EmgError::Validation { .. })
        ));

        assembler.attach_phase(&mut draft, done_phase("a")).unwrap();
        assembler.finalize(&mut draft).unwrap();

        assert!(matches!(
            assembler.finalize(&mut draft),
            Err(EmgError::InvalidState { .. })
        ));
        assert!(matches!(
            assembler.attach_phase(&mut draft, done_phase("b")),
            Err(EmgError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_known_ids_are_not_reused() {
        let mut assembler = SessionAssembler::with_known_ids(["emg-001"]);
        let draft = assembler.begin_session(metadata()).unwrap();
        assert_eq!(draft.id(), "emg-002");
    }
}
