//! Scan engine handle.
//!
//! [`ScanEngine::spawn`] moves a [`ScanAcquisition`] into a command actor. The actor is
//! the only thing a controller talks to: it starts the scan worker on the first
//! `StartAcquisition`, rejects every later one, and raises the cancellation flag on
//! `Stop`. Status events and live updates are observed through subscriptions.
//!
//! # Usage
//!
//! ```rust,ignore
//! let engine = ScanEngine::spawn(acquisition);
//!
//! // Subscribe before starting to see every event
//! let mut status = engine.subscribe_status();
//! let live = engine.subscribe_live();
//!
//! engine.start().await?;
//! while let Some(event) = status.recv().await {
//!     if let StatusEvent::ScanFinished { outcome } = event {
//!         println!("Scan ended: {}", outcome);
//!         break;
//!     }
//! }
//! let summary = engine.wait().await?;
//! ```

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, info, instrument, warn, Instrument};
use uuid::Uuid;

use crate::error::{CommandError, ErrorCode};
use crate::experiment::acquisition::{ScanAcquisition, ScanIo};
use crate::experiment::live::{LiveEmitter, LiveUpdate, StatusEmitter};
use crate::experiment::messages::{ScanCommand, StatusEvent};
use crate::experiment::state::{RunSummary, ScanFlags, ScanPhase};

/// Command queue capacity
const COMMAND_CAPACITY: usize = 32;

/// Control surface of one scan.
pub struct ScanEngine {
    run_id: Uuid,
    command_tx: mpsc::Sender<ScanCommand>,
    status: Arc<StatusEmitter>,
    live: Arc<LiveEmitter>,
    phase: Arc<RwLock<ScanPhase>>,
    flags: ScanFlags,
    summary_rx: oneshot::Receiver<RunSummary>,
}

impl ScanEngine {
    /// Spawn the command actor for `acquisition`. Must be called inside a tokio runtime.
    pub fn spawn(acquisition: ScanAcquisition) -> Self {
        Self::spawn_with_flags(acquisition, ScanFlags::new())
    }

    /// Spawn with flags created by the caller, so that hardware or a UI can hold the
    /// cancellation handle before the engine exists.
    pub fn spawn_with_flags(acquisition: ScanAcquisition, flags: ScanFlags) -> Self {
        let run_id = Uuid::new_v4();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (summary_tx, summary_rx) = oneshot::channel();
        let status = Arc::new(StatusEmitter::new());
        let live = Arc::new(LiveEmitter::new());
        let phase = Arc::new(RwLock::new(ScanPhase::Idle));

        let io = ScanIo {
            status: Arc::clone(&status),
            live: Arc::clone(&live),
            phase: Arc::clone(&phase),
            flags: flags.clone(),
        };
        tokio::spawn(
            command_loop(command_rx, acquisition, summary_tx, run_id, io).in_current_span(),
        );
        debug!(%run_id, "Scan engine spawned");

        Self {
            run_id,
            command_tx,
            status,
            live,
            phase,
            flags,
            summary_rx,
        }
    }

    /// Identifier of this engine's run
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Shared cancellation and timeout flags
    pub fn flags(&self) -> ScanFlags {
        self.flags.clone()
    }

    /// Start the acquisition.
    ///
    /// # Errors
    ///
    /// `AlreadyStarted` on any start after the first, `WorkerGone` if the actor stopped.
    #[instrument(skip(self), fields(run_id = %self.run_id), err)]
    pub async fn start(&self) -> Result<(), CommandError> {
        let (cmd, rx) = ScanCommand::start();
        self.command_tx
            .send(cmd)
            .await
            .map_err(|_| CommandError::WorkerGone)?;
        rx.await.map_err(|_| CommandError::WorkerGone)?
    }

    /// Request cancellation; the loop stops at the next step boundary.
    #[instrument(skip(self), fields(run_id = %self.run_id), err)]
    pub async fn stop(&self) -> Result<(), CommandError> {
        let (cmd, rx) = ScanCommand::stop();
        self.command_tx
            .send(cmd)
            .await
            .map_err(|_| CommandError::WorkerGone)?;
        rx.await.map_err(|_| CommandError::WorkerGone)
    }

    /// Subscribe to status events published from now on.
    ///
    /// Every subscriber gets every event; the receiver ends after `ScanFinished`.
    pub fn subscribe_status(&self) -> mpsc::UnboundedReceiver<StatusEvent> {
        self.status.subscribe()
    }

    /// Subscribe to live updates emitted from now on
    pub fn subscribe_live(&self) -> mpsc::UnboundedReceiver<LiveUpdate> {
        self.live.subscribe()
    }

    /// Current phase
    pub async fn phase(&self) -> ScanPhase {
        *self.phase.read().await
    }

    /// Wait for the scan to end and return its summary.
    ///
    /// # Errors
    ///
    /// `WorkerGone` when the scan was never started.
    pub async fn wait(self) -> Result<RunSummary, CommandError> {
        let Self {
            command_tx,
            summary_rx,
            ..
        } = self;
        // Closing the command channel lets the actor exit; a running worker keeps going.
        drop(command_tx);
        summary_rx.await.map_err(|_| CommandError::WorkerGone)
    }
}

async fn command_loop(
    mut commands: mpsc::Receiver<ScanCommand>,
    acquisition: ScanAcquisition,
    summary_tx: oneshot::Sender<RunSummary>,
    run_id: Uuid,
    io: ScanIo,
) {
    let mut pending = Some((acquisition, summary_tx));

    while let Some(command) = commands.recv().await {
        match command {
            ScanCommand::StartAcquisition { reply } => match pending.take() {
                Some((acquisition, summary_tx)) => {
                    info!(%run_id, "Starting acquisition worker");
                    let worker_io = io.clone();
                    tokio::spawn(
                        async move {
                            let summary = acquisition.run(run_id, worker_io).await;
                            let _ = summary_tx.send(summary);
                        }
                        .in_current_span(),
                    );
                    let _ = reply.send(Ok(()));
                }
                None => {
                    let phase = *io.phase.read().await;
                    warn!(%run_id, %phase, "Start rejected, acquisition already started");
                    io.publish(StatusEvent::warning(
                        format!("Acquisition already started ({})", phase),
                        ErrorCode::AlreadyRunning,
                    ));
                    let _ = reply.send(Err(CommandError::AlreadyStarted(phase.to_string())));
                }
            },
            ScanCommand::Stop { reply } => {
                info!(%run_id, "Stop requested");
                io.flags.cancel();
                let _ = reply.send(());
            }
        }
    }
    debug!(%run_id, "Command channel closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfig;
    use crate::experiment::state::RunOutcome;
    use crate::hardware::{DetectorSpec, MockGateway};
    use crate::scanner::{LinearScan, PositionSource, ScanLayout};
    use crate::storage::MemoryGridWriter;
    use tracing_test::traced_test;

    fn engine() -> ScanEngine {
        let source =
            PositionSource::Indexed(Box::new(LinearScan::new("x", 0.0, 1.0, 0.5).unwrap()));
        let layout = ScanLayout::for_source(&source, 1);
        let gateway = MockGateway::new(vec!["x".into()]).with_detector(DetectorSpec::new("det1"));
        let acquisition = ScanAcquisition::new(
            ScanConfig::default(),
            source,
            Arc::new(gateway),
            Box::new(MemoryGridWriter::new(layout)),
        )
        .unwrap();
        ScanEngine::spawn(acquisition)
    }

    #[tokio::test]
    #[traced_test]
    async fn test_run_is_logged_with_run_id() {
        let engine = engine();
        let run_id = engine.run_id();
        engine.start().await.unwrap();
        let summary = engine.wait().await.unwrap();

        assert_eq!(summary.run_id, run_id);
        assert_eq!(summary.outcome, RunOutcome::Finished);
        assert_eq!(summary.steps_completed, 3);
        assert!(summary.finished_at >= summary.started_at);
        assert!(logs_contain("Acquisition has started"));
        assert!(logs_contain("Acquisition has finished"));
        assert!(logs_contain(&run_id.to_string()));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_second_start_logs_rejection() {
        let engine = engine();
        engine.start().await.unwrap();
        assert!(matches!(
            engine.start().await,
            Err(CommandError::AlreadyStarted(_))
        ));
        engine.wait().await.unwrap();
        assert!(logs_contain("Start rejected"));
    }
}
