//! Scan sequencing loop.
//!
//! [`ScanAcquisition`] owns everything one scan needs: the immutable [`ScanConfig`], the
//! position source, the hardware gateway and the grid writer. The engine runs it on a
//! dedicated task; nothing else touches the gateway or the in-progress axes while it runs.
//!
//! # Step sequence
//!
//! For every average, for every step in increasing order:
//!
//! 1. get the next position and compute its [`StepIndex`]
//! 2. publish `StepProgress`, then check the cancellation and timeout flags
//! 3. move, wait `settle_delay`, grab
//! 4. reduce the step (grid write, background, live update)
//! 5. in adaptive mode, tell the oracle the probe value
//! 6. wait `step_delay`
//!
//! After the last step of an average (or the step at which the scan was stopped) the
//! measured axes are handed to storage. A move or grab in flight always completes; the
//! flags are only read at step boundaries.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::ScanConfig;
use crate::data::{NavigationAxis, StepIndex};
use crate::error::{ConfigError, ErrorCode, FatalScanError};
use crate::experiment::live::{LiveEmitter, StatusEmitter};
use crate::experiment::messages::StatusEvent;
use crate::experiment::reducer::{StepInput, StepReducer};
use crate::experiment::state::{EngineState, RunOutcome, RunSummary, ScanFlags, ScanPhase};
use crate::hardware::Gateway;
use crate::scanner::{PositionSource, ScanLayout};
use crate::storage::GridWriter;

/// Channels shared between the loop and the engine handle.
#[derive(Clone)]
pub(crate) struct ScanIo {
    pub(crate) status: Arc<StatusEmitter>,
    pub(crate) live: Arc<LiveEmitter>,
    pub(crate) phase: Arc<RwLock<ScanPhase>>,
    pub(crate) flags: ScanFlags,
}

impl ScanIo {
    pub(crate) fn publish(&self, event: StatusEvent) {
        self.status.emit(event);
    }

    async fn set_phase(&self, phase: ScanPhase) {
        *self.phase.write().await = phase;
    }
}

/// One configured scan, ready to be run by a [`crate::experiment::ScanEngine`].
pub struct ScanAcquisition {
    config: ScanConfig,
    source: PositionSource,
    layout: ScanLayout,
    gateway: Arc<dyn Gateway>,
    writer: Box<dyn GridWriter>,
    reducer: StepReducer,
}

impl ScanAcquisition {
    /// Assemble a scan.
    ///
    /// The writer should have been built from [`ScanLayout::for_source`] with the same
    /// source and averaging count.
    ///
    /// # Errors
    ///
    /// `ConfigError` when the settings are invalid, the adaptive flag does not match the
    /// source, or the source's axes do not match the gateway's actuators.
    pub fn new(
        config: ScanConfig,
        source: PositionSource,
        gateway: Arc<dyn Gateway>,
        writer: Box<dyn GridWriter>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if config.adaptive != source.is_adaptive() {
            return Err(ConfigError::Invalid(format!(
                "adaptive = {} but position source is {:?}",
                config.adaptive, source
            )));
        }
        let axes = source.intended_axes().len();
        let actuators = gateway.actuators().len();
        if axes != actuators {
            return Err(ConfigError::Invalid(format!(
                "position source has {} axes but gateway drives {} actuators",
                axes, actuators
            )));
        }

        let layout = ScanLayout::for_source(&source, config.n_average);
        let reducer = StepReducer::new(&config, source.distribution());
        Ok(Self {
            config,
            source,
            layout,
            gateway,
            writer,
            reducer,
        })
    }

    fn has_no_steps(&self) -> bool {
        match &self.source {
            PositionSource::Indexed(_) => self.source.n_steps() == Some(0),
            PositionSource::Adaptive(adaptive) => adaptive.max_steps() == 0,
        }
    }

    /// Run the scan to its terminal state. Never panics on scan errors; the outcome is
    /// reported on the status channel and in the returned summary.
    #[instrument(skip_all, fields(run_id = %run_id))]
    pub(crate) async fn run(mut self, run_id: Uuid, io: ScanIo) -> RunSummary {
        let started_at = Utc::now();
        let mut state = EngineState::new(
            &self.layout,
            self.config.n_average,
            self.config.adaptive,
            io.flags.clone(),
        );

        io.set_phase(ScanPhase::Running { average: 0, step: 0 }).await;
        io.publish(StatusEvent::info("Acquisition has started"));
        info!(
            n_average = self.config.n_average,
            steps = ?self.source.n_steps(),
            adaptive = self.config.adaptive,
            "Acquisition has started"
        );

        let watchdog = self.config.timeout.map(|timeout| {
            let flags = io.flags.clone();
            tokio::spawn(async move {
                sleep(timeout).await;
                warn!(?timeout, "Scan timeout elapsed");
                flags.time_out();
            })
        });

        let result = if self.has_no_steps() {
            info!("Position source has no steps");
            Ok(RunOutcome::Finished)
        } else {
            let result = self.execute(&mut state, &io).await;
            release(&self.gateway, result).await
        };

        if let Some(watchdog) = watchdog {
            watchdog.abort();
        }

        let (outcome, error) = match result {
            Ok(RunOutcome::Aborted) if state.flags.is_timed_out() => {
                warn!(average = state.average, step = state.step, "Acquisition timed out");
                io.publish(StatusEvent::warning(
                    "Acquisition timed out",
                    ErrorCode::Timeout,
                ));
                (RunOutcome::Aborted, None)
            }
            Ok(RunOutcome::Aborted) => {
                info!(average = state.average, step = state.step, "Acquisition aborted");
                io.publish(StatusEvent::info("Acquisition aborted"));
                (RunOutcome::Aborted, None)
            }
            Ok(outcome) => {
                info!(steps = state.steps_completed, "Acquisition has finished");
                io.publish(StatusEvent::info("Acquisition has finished"));
                (outcome, None)
            }
            Err(e) => {
                error!(
                    error = %e,
                    code = %e.code(),
                    average = state.average,
                    step = state.step,
                    "Scan failed"
                );
                io.publish(StatusEvent::error(e.to_string(), e.code()));
                (RunOutcome::Failed, Some(e))
            }
        };

        io.set_phase(outcome.phase()).await;
        io.publish(StatusEvent::ScanFinished { outcome });
        io.status.close();
        io.live.close();

        RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            outcome,
            steps_completed: state.steps_completed,
            error_code: error.as_ref().map(|e| e.code()),
            error: error.map(|e| e.to_string()),
        }
    }

    async fn execute(
        &mut self,
        state: &mut EngineState,
        io: &ScanIo,
    ) -> Result<RunOutcome, FatalScanError> {
        self.gateway.connect().await?;

        let n_average = self.config.n_average;
        let mut aborted = false;

        for average in 0..n_average {
            state.average = average;
            let mut step = 0;

            while let Some(next) = self.source.next_point(step)? {
                let index = StepIndex::for_step(average, n_average, &next.grid);
                state.step = step;
                io.set_phase(ScanPhase::Running { average, step }).await;
                io.publish(StatusEvent::StepProgress { step, average });

                if state.flags.should_stop() {
                    info!(
                        average,
                        step,
                        cancelled = state.flags.is_cancelled(),
                        timed_out = state.flags.is_timed_out(),
                        "Stopping before step"
                    );
                    aborted = true;
                    break;
                }

                let actual = self.gateway.move_to(&next.position).await?;
                if actual.len() != next.position.len() {
                    return Err(FatalScanError::UnexpectedShape(format!(
                        "requested {} coordinates, actuators reported {}",
                        next.position.len(),
                        actual.len()
                    )));
                }
                wait(self.config.settle_delay).await;

                let bundle = self.gateway.grab(&actual).await?;
                debug!(%index, requested = %next.position, actual = %actual, "Step grabbed");

                let input = StepInput {
                    average,
                    step,
                    index: &index,
                    requested: &next.position,
                    actual: &actual,
                    bundle: &bundle,
                };
                match self
                    .reducer
                    .det_done(self.writer.as_mut(), state, input)
                    .await
                {
                    Ok(update) => {
                        io.live.emit(update);
                    }
                    Err(e) => {
                        warn!(%index, error = %e, "Step reduction failed, live update dropped");
                        io.publish(StatusEvent::warning(
                            format!("Step {} dropped: {}", index, e),
                            e.code(),
                        ));
                    }
                }
                state.steps_completed += 1;

                if let Some(probe) = self.source.probe().map(str::to_owned) {
                    let value = bundle
                        .get(&probe)
                        .and_then(|c| c.first_value())
                        .ok_or_else(|| {
                            FatalScanError::UnexpectedShape(format!(
                                "probe channel '{}' missing from grab",
                                probe
                            ))
                        })?;
                    self.source.tell(&actual, value)?;
                }

                wait(self.config.step_delay).await;
                step += 1;
            }

            self.writer.add_nav_axes(&handoff_axes(state)).await?;
            debug!(average, "Navigation axes handed to storage");
            if aborted {
                break;
            }
        }

        self.writer.flush().await?;
        Ok(if aborted {
            RunOutcome::Aborted
        } else {
            RunOutcome::Finished
        })
    }
}

/// Disconnect on every exit path. A failed disconnect fails an otherwise clean scan.
async fn release(
    gateway: &Arc<dyn Gateway>,
    result: Result<RunOutcome, FatalScanError>,
) -> Result<RunOutcome, FatalScanError> {
    match result {
        Ok(outcome) => {
            gateway.disconnect().await?;
            Ok(outcome)
        }
        Err(e) => {
            if let Err(disconnect) = gateway.disconnect().await {
                warn!(error = %disconnect, "Disconnect after failure also failed");
            }
            Err(e)
        }
    }
}

/// Axes handed to storage after each average.
///
/// Adaptive intended axes are only known once visited, so they travel with the
/// measured ones.
fn handoff_axes(state: &EngineState) -> Vec<NavigationAxis> {
    if state.adaptive {
        state
            .intended_axes
            .iter()
            .chain(&state.measured_axes)
            .cloned()
            .collect()
    } else {
        state.measured_axes.clone()
    }
}

async fn wait(delay: Duration) {
    if !delay.is_zero() {
        sleep(delay).await;
    }
}
