//! Step reduction.
//!
//! Turns one grabbed bundle into a stored grid cell and a [`LiveUpdate`]:
//!
//! 1. the measured axes get the actuator-reported coordinates for this step
//! 2. the full bundle is written at its [`StepIndex`]
//! 3. on capture steps, the background frame is matched and attached to storage
//! 4. the configured live channels are selected, keeping only those whose
//!    dimensionality fits in what the index leaves for display (`2 - index.len()`)
//!
//! Any failure is a [`ReductionError`]: the caller drops the step's live update and
//! carries on with the scan.

use tracing::{debug, instrument};

use crate::config::ScanConfig;
use crate::data::{MeasurementBundle, StepIndex};
use crate::error::ReductionError;
use crate::experiment::background::BackgroundMatcher;
use crate::experiment::live::LiveUpdate;
use crate::experiment::state::EngineState;
use crate::scanner::{DataDistribution, Position};
use crate::storage::GridWriter;

/// Maximum displayable dimensionality once the index has consumed no grid axis.
const MAX_LIVE_NDIM: usize = 2;

/// Reduces grabbed bundles into grid writes and live updates.
#[derive(Debug, Clone)]
pub struct StepReducer {
    live_channels: Vec<String>,
    distribution: DataDistribution,
    matcher: BackgroundMatcher,
}

/// One step as seen by the reducer
#[derive(Debug, Clone, Copy)]
pub struct StepInput<'a> {
    /// Average index
    pub average: usize,
    /// Linear step within the average
    pub step: usize,
    /// Grid location
    pub index: &'a StepIndex,
    /// Position requested from the source
    pub requested: &'a Position,
    /// Position reported by the actuators
    pub actual: &'a Position,
    /// Grabbed data
    pub bundle: &'a MeasurementBundle,
}

impl StepReducer {
    /// Reducer for a scan with the given settings and layout tag
    pub fn new(config: &ScanConfig, distribution: DataDistribution) -> Self {
        Self {
            live_channels: config.live_channels(),
            distribution,
            matcher: BackgroundMatcher::from_config(&config.background),
        }
    }

    /// Configured live channels
    pub fn live_channels(&self) -> &[String] {
        &self.live_channels
    }

    /// Reduce one step.
    #[instrument(
        skip_all,
        fields(average = input.average, step = input.step, index = %input.index)
    )]
    pub async fn det_done(
        &self,
        writer: &mut dyn GridWriter,
        state: &mut EngineState,
        input: StepInput<'_>,
    ) -> Result<LiveUpdate, ReductionError> {
        if input.actual.len() != state.measured_axes.len() {
            return Err(ReductionError::AxisMismatch {
                expected: state.measured_axes.len(),
                got: input.actual.len(),
            });
        }
        for (axis, &value) in state.measured_axes.iter_mut().zip(input.actual.coords()) {
            axis.record(input.step, value);
        }
        if state.adaptive {
            for (axis, &value) in state
                .intended_axes
                .iter_mut()
                .zip(input.requested.coords())
            {
                axis.record(input.step, value);
            }
        }

        writer
            .add_data(input.index, input.bundle, self.distribution)
            .await?;

        let background = if self.matcher.is_capture_step(input.average, input.step) {
            match self.matcher.extract(input.average, input.bundle)? {
                Some(frame) => {
                    writer.attach_background(&frame).await?;
                    Some(frame)
                }
                None => None,
            }
        } else {
            None
        };

        let max_ndim = MAX_LIVE_NDIM as i64 - input.index.len() as i64;
        let data = input
            .bundle
            .select(&self.live_channels)
            .into_iter()
            .filter(|c| (c.dim().ndim() as i64) <= max_ndim)
            .collect::<Vec<_>>();
        debug!(live_channels = data.len(), "Step reduced");

        Ok(LiveUpdate {
            step: input.step,
            average: input.average,
            index: input.index.clone(),
            data,
            background,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LiveConfig;
    use crate::data::{Channel, ChannelName, UNWRITTEN};
    use crate::experiment::state::ScanFlags;
    use crate::scanner::{LinearScan, ScanLayout};
    use crate::storage::MemoryGridWriter;

    fn config() -> ScanConfig {
        ScanConfig {
            live: LiveConfig {
                plot_0d: vec!["det1/ch0".into()],
                plot_1d: vec!["det1/spectrum".into(), "det1/image".into()],
            },
            ..Default::default()
        }
    }

    fn bundle() -> MeasurementBundle {
        MeasurementBundle::tagged(
            vec![
                Channel::scalar(ChannelName::new("det1", "ch0"), 1.0),
                Channel::scalar(ChannelName::new("det1", "ch1"), 2.0),
                Channel::trace(ChannelName::new("det1", "spectrum"), vec![1.0, 2.0]),
                Channel::image(ChannelName::new("det1", "image"), 1, 2, vec![0.0, 1.0]),
                Channel::scalar(ChannelName::new("det1", "Bg_fluo"), 0.1),
            ],
            "Bg",
        )
    }

    fn setup(n_average: usize) -> (MemoryGridWriter, EngineState) {
        let scan = LinearScan::new("x", 0.0, 2.0, 1.0).unwrap();
        let layout = ScanLayout::new(&scan, n_average);
        let state = EngineState::new(&layout, n_average, false, ScanFlags::new());
        (MemoryGridWriter::new(layout), state)
    }

    #[tokio::test]
    async fn test_records_actual_position_and_selects_live_channels() {
        let (mut writer, mut state) = setup(1);
        let handle = writer.handle();
        let reducer = StepReducer::new(&config(), DataDistribution::Uniform);
        let index = StepIndex::new(vec![1]);

        let update = reducer
            .det_done(
                &mut writer,
                &mut state,
                StepInput {
                    average: 0,
                    step: 1,
                    index: &index,
                    requested: &Position::new(vec![1.0]),
                    actual: &Position::new(vec![1.02]),
                    bundle: &bundle(),
                },
            )
            .await
            .unwrap();

        assert_eq!(state.measured_axes[0].data[1], 1.02);
        assert!(state.measured_axes[0].data[0].is_nan());
        assert!(UNWRITTEN.is_nan());
        // One grid axis consumed: scalars and traces only
        let names: Vec<String> = update.data.iter().map(|c| c.full_name()).collect();
        assert_eq!(names, vec!["det1/ch0", "det1/spectrum"]);
        assert!(update.background.is_none());
        assert_eq!(handle.snapshot().cells.len(), 1);
    }

    #[tokio::test]
    async fn test_capture_step_attaches_background() {
        let (mut writer, mut state) = setup(2);
        let handle = writer.handle();
        let reducer = StepReducer::new(&config(), DataDistribution::Uniform);
        let index = StepIndex::new(vec![1, 0]);

        let update = reducer
            .det_done(
                &mut writer,
                &mut state,
                StepInput {
                    average: 1,
                    step: 0,
                    index: &index,
                    requested: &Position::new(vec![0.0]),
                    actual: &Position::new(vec![0.0]),
                    bundle: &bundle(),
                },
            )
            .await
            .unwrap();

        let frame = update.background.unwrap();
        assert!(frame.get("det1/I_ON").is_some());
        assert_eq!(handle.snapshot().background_attachments, 1);
        // Two grid axes consumed: scalars only
        assert_eq!(update.data.len(), 1);
    }

    #[tokio::test]
    async fn test_storage_failure_is_reduction_error() {
        let (writer, mut state) = setup(1);
        let mut writer = writer.failing_at(StepIndex::new(vec![0]));
        let reducer = StepReducer::new(&config(), DataDistribution::Uniform);
        let index = StepIndex::new(vec![0]);

        let err = reducer
            .det_done(
                &mut writer,
                &mut state,
                StepInput {
                    average: 0,
                    step: 0,
                    index: &index,
                    requested: &Position::new(vec![0.0]),
                    actual: &Position::new(vec![0.0]),
                    bundle: &bundle(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ReductionError::Storage(_)));
    }

    #[tokio::test]
    async fn test_axis_mismatch() {
        let (mut writer, mut state) = setup(1);
        let reducer = StepReducer::new(&config(), DataDistribution::Uniform);
        let index = StepIndex::new(vec![0]);
        let err = reducer
            .det_done(
                &mut writer,
                &mut state,
                StepInput {
                    average: 0,
                    step: 0,
                    index: &index,
                    requested: &Position::new(vec![0.0]),
                    actual: &Position::new(vec![0.0, 1.0]),
                    bundle: &bundle(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ReductionError::AxisMismatch {
                expected: 1,
                got: 2
            }
        );
    }
}
