// src/protocol/runner.rs
//! Runs a whole protocol and assembles the resulting session

use super::controller::{CancelHandle, PhaseController, PhaseOutcome};
use super::definition::ProtocolDefinition;
use super::phase::Phase;
use crate::error::EmgResult;
use crate::hal::DeviceTransport;
use crate::session::{Session, SessionAssembler, SessionMetadata};
use crate::storage::SessionStore;
use tracing::{info, warn};

/// How a protocol run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(Session),
    /// Stopped by the operator. Phases finished before the stop are handed
    /// back but never become a session.
    Cancelled { completed_phases: Vec<Phase> },
}

/// Wires a controller, a transport and an assembler together
pub struct ProtocolRunner<T: DeviceTransport> {
    controller: PhaseController,
    transport: T,
    assembler: SessionAssembler,
}

impl<T: DeviceTransport> ProtocolRunner<T> {
    pub fn new(controller: PhaseController, transport: T, assembler: SessionAssembler) -> Self {
        Self {
            controller,
            transport,
            assembler,
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.controller.cancel_handle()
    }

    pub fn controller(&self) -> &PhaseController {
        &self.controller
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Run every phase in order. Metadata is validated before the device is
    /// touched; any error aborts the run without producing a session.
    pub async fn run(
        &mut self,
        protocol: &ProtocolDefinition,
        metadata: SessionMetadata,
    ) -> EmgResult<RunOutcome> {
        let metadata = if metadata.protocol_name.is_none() && !protocol.name.is_empty() {
            metadata.with_protocol_name(protocol.name.clone())
        } else {
            metadata
        };
        let mut draft = self.assembler.begin_session(metadata)?;
        self.controller.reset_cancel();

        info!(
            session = draft.id(),
            protocol = %protocol.name,
            phases = protocol.phases.len(),
            "protocol started"
        );

        for definition in &protocol.phases {
            match self
                .controller
                .run_phase(definition, &mut self.transport)
                .await?
            {
                PhaseOutcome::Completed(phase) => {
                    self.assembler.attach_phase(&mut draft, phase)?;
                }
                PhaseOutcome::Cancelled { phase_id } => {
                    warn!(session = draft.id(), phase = %phase_id, "protocol cancelled");
                    return Ok(RunOutcome::Cancelled {
                        completed_phases: draft.into_phases(),
                    });
                }
            }
        }

        let session = self.assembler.finalize(&mut draft)?;
        Ok(RunOutcome::Completed(session))
    }

    /// Hand a session to persistence. On failure the caller still owns it.
    pub fn persist<S>(&self, store: &mut S, session: &Session) -> EmgResult<()>
    where
        S: SessionStore + ?Sized,
    {
        match store.save(session) {
            Ok(()) => {
                info!(session = session.id(), "session saved");
                Ok(())
            }
            Err(err) => {
                warn!(session = session.id(), error = %err, "failed to save session");
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::IngestBuffer;
    use crate::error::{EmgError, StorageError, TransportError};
    use crate::hal::{TransportInfo, TransportKind};
    use crate::protocol::PhaseDefinition;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    /// Pushes one fixed batch per stream, chosen by stream index
    struct ScriptedTransport {
        levels: Vec<f64>,
        started: usize,
        stopped: usize,
        refuse: bool,
    }

    impl ScriptedTransport {
        fn new(levels: &[f64]) -> Self {
            Self {
                levels: levels.to_vec(),
                started: 0,
                stopped: 0,
                refuse: false,
            }
        }
    }

    #[async_trait]
    impl DeviceTransport for ScriptedTransport {
        async fn start_streaming(&mut self, sink: Arc<IngestBuffer>) -> Result<(), TransportError> {
            if self.refuse {
                return Err(TransportError::NotConnected);
            }
            let level = self.levels.get(self.started).copied().unwrap_or(0.0);
            sink.push(&[level, -level, level]);
            self.started += 1;
            Ok(())
        }

        async fn stop_streaming(&mut self) -> Result<(), TransportError> {
            self.stopped += 1;
            Ok(())
        }

        fn info(&self) -> TransportInfo {
            TransportInfo {
                name: "scripted".to_string(),
                kind: TransportKind::Simulated,
                sampling_rate_hz: 1000,
            }
        }
    }

    fn protocol() -> ProtocolDefinition {
        ProtocolDefinition::new(
            "Two Step",
            vec![
                PhaseDefinition::new("rest", "Rest", 1000).unwrap(),
                PhaseDefinition::new("mvc", "MVC", 1000).unwrap(),
            ],
        )
        .unwrap()
    }

    fn runner(levels: &[f64]) -> ProtocolRunner<ScriptedTransport> {
        let controller = PhaseController::new(Arc::new(IngestBuffer::new()));
        ProtocolRunner::new(controller, ScriptedTransport::new(levels), SessionAssembler::new())
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_produces_session_in_protocol_order() {
        let mut runner = runner(&[0.0, 2.0]);
        let outcome = runner
            .run(&protocol(), SessionMetadata::new("SUB001", "Bicep", "Gel"))
            .await
            .unwrap();

        let RunOutcome::Completed(session) = outcome else {
            panic!("expected a completed run");
        };
        assert_eq!(session.id(), "emg-001");
        assert_eq!(session.metadata().protocol_name.as_deref(), Some("Two Step"));

        let ids: Vec<&str> = session.phase_ids().collect();
        assert_eq!(ids, ["rest", "mvc"]);
        let mvc = session.phase("mvc").and_then(|p| p.metrics()).unwrap();
        assert_eq!(mvc.max_amplitude, 2.0);
        assert_eq!(mvc.sample_count, 3);

        assert_eq!(runner.transport().started, 2);
        assert_eq!(runner.transport().stopped, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_returns_completed_phases_without_session() {
        let mut runner = runner(&[1.0, 1.0]);
        let handle = runner.cancel_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1450)).await;
            handle.cancel();
        });

        let outcome = runner
            .run(&protocol(), SessionMetadata::new("SUB001", "Bicep", "Gel"))
            .await
            .unwrap();

        match outcome {
            RunOutcome::Cancelled { completed_phases } => {
                assert_eq!(completed_phases.len(), 1);
                assert_eq!(completed_phases[0].id(), "rest");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(runner.controller().state(), crate::protocol::PhaseState::Cancelled);
    }

    #[tokio::test]
    async fn test_invalid_metadata_never_touches_device() {
        let mut runner = runner(&[1.0]);
        let err = runner
            .run(&protocol(), SessionMetadata::new("", "Bicep", "Gel"))
            .await
            .unwrap_err();

        assert!(matches!(err, EmgError::Validation { .. }));
        assert_eq!(runner.transport().started, 0);
    }

    #[tokio::test]
    async fn test_transport_failure_aborts_run() {
        let mut runner = runner(&[1.0]);
        runner.transport_mut().refuse = true;

        let err = runner
            .run(&protocol(), SessionMetadata::new("SUB001", "Bicep", "Gel"))
            .await
            .unwrap_err();
        assert!(matches!(err, EmgError::Transport(TransportError::NotConnected)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_persist_reports_duplicate() {
        let mut runner = runner(&[1.0, 1.0]);
        let RunOutcome::Completed(session) = runner
            .run(&protocol(), SessionMetadata::new("SUB001", "Bicep", "Gel"))
            .await
            .unwrap()
        else {
            panic!("expected a completed run");
        };

        let mut store = MemoryStore::new();
        runner.persist(&mut store, &session).unwrap();
        let err = runner.persist(&mut store, &session).unwrap_err();
        assert!(matches!(err, EmgError::Storage(StorageError::Duplicate(_))));
        assert_eq!(store.len(), 1);
    }
}
