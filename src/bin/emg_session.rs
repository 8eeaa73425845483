// src/bin/emg_session.rs
//! Run a recording protocol against the simulator and store the session
//!
//! Usage: `emg-session [basic|dynamic|<protocol.json>] [subject] [muscle] [electrode]`

use emg_session::acquisition::IngestBuffer;
use emg_session::config::ConfigLoader;
use emg_session::hal::SimulatedTransport;
use emg_session::protocol::{ProtocolDefinition, ProtocolEvent, ProtocolRunner, RunOutcome};
use emg_session::session::{SessionAssembler, SessionLibrary, SessionMetadata};
use emg_session::utils::init_logging;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut config_loader = ConfigLoader::new();
    let config = config_loader.load_system_config()?;
    init_logging(&config.logging);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let protocol = match args.first().map(String::as_str) {
        None | Some("basic") => ProtocolDefinition::basic_acquisition(),
        Some("dynamic") => ProtocolDefinition::dynamic_contraction(),
        Some(path) => ProtocolDefinition::from_json(&std::fs::read_to_string(path)?)?,
    };
    let arg = |index: usize, fallback: &str| {
        args.get(index).cloned().unwrap_or_else(|| fallback.to_string())
    };
    let metadata = SessionMetadata::new(
        &arg(1, "SUB001"),
        &arg(2, "Biceps Brachii"),
        &arg(3, "Ag/AgCl"),
    );

    println!("EMG Session Recorder");
    println!("====================");
    println!(
        "Protocol: {} ({} phases, {:.1} s)",
        protocol.name,
        protocol.phases.len(),
        protocol.total_duration_ms() as f64 / 1000.0
    );

    let mut store = config.session_store();
    let library = SessionLibrary::load_from(&store)?;
    info!(known = library.len(), "existing sessions loaded");

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let controller = config
        .phase_controller(Arc::new(IngestBuffer::new()))
        .with_observer(events_tx);
    let transport = SimulatedTransport::new(config.simulator.clone())?;
    let assembler = SessionAssembler::with_known_ids(library.ids().map(str::to_string));
    let mut runner = ProtocolRunner::new(controller, transport, assembler);

    let cancel = runner.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                ProtocolEvent::PhaseStarted { name, instruction, target_duration_ms, .. } => {
                    println!("\n▶ {} ({} ms)", name, target_duration_ms);
                    if let Some(instruction) = instruction {
                        println!("  {}", instruction);
                    }
                }
                ProtocolEvent::Progress { percent, .. } => {
                    print!("\r  {:5.1}%", percent);
                }
                ProtocolEvent::PhaseComplete { phase_id, metrics } => {
                    println!(
                        "\r  {} done: RMS {:.4} mV, MAV {:.4} mV, ZC {}",
                        phase_id, metrics.rms, metrics.mav, metrics.zero_crossings
                    );
                }
                ProtocolEvent::PhaseCancelled { phase_id } => {
                    println!("\r  {} cancelled", phase_id);
                }
            }
        }
    });

    match runner.run(&protocol, metadata).await? {
        RunOutcome::Completed(session) => {
            if let Err(e) = runner.persist(&mut store, &session) {
                error!(error = %e, "session kept in memory only");
                println!("\n{}", e.user_message());
                println!("{}", serde_json::to_string_pretty(&session)?);
                return Ok(());
            }

            println!("\nSession {} saved to {}", session.id(), store.path().display());
            for phase in session.phases() {
                if let Some(metrics) = phase.metrics() {
                    println!(
                        "  {:<12} samples {:>6}  RMS {:.4}  MAV {:.4}  max {:.4}  SNR {:.2} dB",
                        phase.id(),
                        metrics.sample_count,
                        metrics.rms,
                        metrics.mav,
                        metrics.max_amplitude,
                        metrics.snr
                    );
                }
            }
        }
        RunOutcome::Cancelled { completed_phases } => {
            println!(
                "\nProtocol cancelled after {} completed phase(s); nothing saved",
                completed_phases.len()
            );
        }
    }

    Ok(())
}
