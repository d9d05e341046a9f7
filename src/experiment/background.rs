//! Background reference-frame matching.
//!
//! On capture steps the matcher collects the bundle's background-role channels (tagged
//! by the gateway from the detector's marker prefix) and renames them through the
//! configured table, e.g. `det1/Bg_fluo` becomes `det1/I_ON`. Unmapped names pass
//! through unchanged.

use std::collections::BTreeMap;
use tracing::debug;

use crate::config::{BackgroundConfig, BackgroundPolicy};
use crate::data::{BackgroundFrame, Channel, ChannelRole, MeasurementBundle};
use crate::error::ReductionError;

/// Extracts and renames reference frames.
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundMatcher {
    renames: BTreeMap<String, String>,
    policy: BackgroundPolicy,
}

impl BackgroundMatcher {
    /// Matcher with an explicit rename table and policy
    pub fn new(renames: BTreeMap<String, String>, policy: BackgroundPolicy) -> Self {
        Self { renames, policy }
    }

    /// Matcher from the scan's background settings
    pub fn from_config(config: &BackgroundConfig) -> Self {
        Self::new(config.renames.clone(), config.policy)
    }

    /// Whether `(average, step)` is a capture step under the configured policy
    pub fn is_capture_step(&self, average: usize, step: usize) -> bool {
        step == 0
            && match self.policy {
                BackgroundPolicy::EveryAverage => true,
                BackgroundPolicy::FirstAverage => average == 0,
            }
    }

    /// Semantic name of a raw reference channel
    pub fn rename<'a>(&'a self, channel: &'a str) -> &'a str {
        self.renames.get(channel).map(String::as_str).unwrap_or(channel)
    }

    /// Build the frame of a capture step.
    ///
    /// Returns `Ok(None)` when the bundle has no reference channel, which means no
    /// background is available rather than an error.
    ///
    /// # Errors
    ///
    /// `ReductionError::Background` when two channels of one module rename to the same name.
    pub fn extract(
        &self,
        average: usize,
        bundle: &MeasurementBundle,
    ) -> Result<Option<BackgroundFrame>, ReductionError> {
        let mut channels: Vec<Channel> = Vec::new();
        for raw in bundle.with_role(ChannelRole::Background) {
            let name = raw.name.with_channel(self.rename(&raw.name.channel));
            if channels.iter().any(|c| c.name == name) {
                return Err(ReductionError::Background(format!(
                    "'{}' and another reference channel both map to '{}'",
                    raw.name, name
                )));
            }
            let mut renamed = raw.clone();
            renamed.name = name;
            channels.push(renamed);
        }

        if channels.is_empty() {
            return Ok(None);
        }
        debug!(average, channels = channels.len(), "Background frame captured");
        Ok(Some(BackgroundFrame::new(average, channels)))
    }
}

impl Default for BackgroundMatcher {
    fn default() -> Self {
        Self::from_config(&BackgroundConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ChannelName;

    fn bundle(with_backgrounds: bool) -> MeasurementBundle {
        let mut channels = vec![Channel::scalar(ChannelName::new("det1", "ch0"), 1.0)];
        if with_backgrounds {
            channels.push(Channel::trace(
                ChannelName::new("det1", "Bg_fluo"),
                vec![0.1, 0.2],
            ));
            channels.push(Channel::scalar(ChannelName::new("det1", "Bg_other"), 0.3));
        }
        MeasurementBundle::tagged(channels, "Bg")
    }

    #[test]
    fn test_renames_known_markers() {
        let matcher = BackgroundMatcher::default();
        let frame = matcher.extract(0, &bundle(true)).unwrap().unwrap();
        assert_eq!(frame.channels().len(), 2);
        assert!(frame.get("det1/I_ON").is_some());
        // Unmapped names pass through
        assert!(frame.get("det1/Bg_other").is_some());
        assert!(frame.get("det1/ch0").is_none());
    }

    #[test]
    fn test_no_background_is_not_an_error() {
        let matcher = BackgroundMatcher::default();
        assert_eq!(matcher.extract(0, &bundle(false)).unwrap(), None);
    }

    #[test]
    fn test_capture_policy() {
        let every = BackgroundMatcher::default();
        assert!(every.is_capture_step(0, 0));
        assert!(every.is_capture_step(3, 0));
        assert!(!every.is_capture_step(0, 1));

        let first = BackgroundMatcher::new(BTreeMap::new(), BackgroundPolicy::FirstAverage);
        assert!(first.is_capture_step(0, 0));
        assert!(!first.is_capture_step(1, 0));
    }

    #[test]
    fn test_rename_collision_is_reduction_error() {
        let matcher = BackgroundMatcher::default();
        let bundle = MeasurementBundle::new(vec![
            Channel::scalar(ChannelName::new("det1", "Bg_fluo"), 0.1)
                .with_role(ChannelRole::Background),
            Channel::scalar(ChannelName::new("det1", "I_ON"), 0.2)
                .with_role(ChannelRole::Background),
        ]);
        assert!(matches!(
            matcher.extract(0, &bundle),
            Err(ReductionError::Background(_))
        ));
    }
}
