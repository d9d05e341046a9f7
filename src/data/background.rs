//! Background reference frames.

use serde::{Deserialize, Serialize};

use crate::data::Channel;

/// Reference-frame channels captured on the first step of an average.
///
/// Channels keep their owning module in their name, so a frame can be associated with
/// each detector node it came from. Channel names are the renamed (semantic) names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundFrame {
    /// Average during which the frame was captured
    pub average: usize,
    channels: Vec<Channel>,
}

impl BackgroundFrame {
    /// Frame from already renamed channels
    pub fn new(average: usize, channels: Vec<Channel>) -> Self {
        Self { average, channels }
    }

    /// All reference channels
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// True when no reference channel was captured
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Lookup by full `<module>/<channel>` name
    pub fn get(&self, full_name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.full_name() == full_name)
    }

    /// Modules owning at least one reference channel, in first-seen order
    pub fn detectors(&self) -> Vec<String> {
        let mut modules: Vec<String> = Vec::new();
        for channel in &self.channels {
            if !modules.contains(&channel.name.module) {
                modules.push(channel.name.module.clone());
            }
        }
        modules
    }

    /// Reference channels of one module
    pub fn for_detector<'a>(&'a self, module: &'a str) -> impl Iterator<Item = &'a Channel> + 'a {
        self.channels.iter().filter(move |c| c.name.module == module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ChannelName;

    #[test]
    fn groups_channels_by_detector() {
        let frame = BackgroundFrame::new(
            0,
            vec![
                Channel::scalar(ChannelName::new("det1", "I_ON"), 1.0),
                Channel::scalar(ChannelName::new("det2", "I_ON"), 2.0),
                Channel::scalar(ChannelName::new("det1", "I_OFF"), 0.0),
            ],
        );
        assert_eq!(frame.detectors(), vec!["det1".to_string(), "det2".to_string()]);
        assert_eq!(frame.for_detector("det1").count(), 2);
        assert_eq!(frame.get("det2/I_ON").and_then(|c| c.first_value()), Some(2.0));
    }
}
