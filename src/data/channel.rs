//! Named data channels and the measurement bundle returned by one grab.
//!
//! Channels are keyed by a hierarchical name `<module>/<channel>`. The gateway tags each
//! channel with a [`ChannelRole`] when the bundle is built, so downstream code never has
//! to parse names to tell data from background frames.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Dimensionality class of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataDim {
    /// Single value
    Scalar,
    /// 1-D trace
    Trace,
    /// 2-D image
    Image,
    /// Higher-dimensional data
    Nd(usize),
}

impl DataDim {
    /// Classify from a shape (an empty shape is a scalar)
    pub fn from_shape(shape: &[usize]) -> Self {
        match shape.len() {
            0 => DataDim::Scalar,
            1 => DataDim::Trace,
            2 => DataDim::Image,
            n => DataDim::Nd(n),
        }
    }

    /// Number of data axes
    pub fn ndim(&self) -> usize {
        match self {
            DataDim::Scalar => 0,
            DataDim::Trace => 1,
            DataDim::Image => 2,
            DataDim::Nd(n) => *n,
        }
    }
}

/// Role of a channel within a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelRole {
    /// Regular measurement stored in the grid
    Data,
    /// Reference frame associated with data channels
    Background,
}

/// Hierarchical channel name `<module>/<channel>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChannelName {
    /// Owning module (detector) name
    pub module: String,
    /// Channel name within the module
    pub channel: String,
}

impl ChannelName {
    /// Build from module and channel parts
    pub fn new(module: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            channel: channel.into(),
        }
    }

    /// Parse `<module>/<channel>`; the channel is the last path segment.
    ///
    /// A name without a separator is a channel of the unnamed module.
    pub fn parse(full: &str) -> Self {
        match full.rsplit_once('/') {
            Some((module, channel)) => Self::new(module, channel),
            None => Self::new("", full),
        }
    }

    /// Same module, different channel
    pub fn with_channel(&self, channel: impl Into<String>) -> Self {
        Self::new(self.module.clone(), channel)
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.module.is_empty() {
            write!(f, "{}", self.channel)
        } else {
            write!(f, "{}/{}", self.module, self.channel)
        }
    }
}

/// One named channel of a grab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Hierarchical name
    pub name: ChannelName,
    /// Data or background
    pub role: ChannelRole,
    /// Data shape (empty for scalars)
    pub shape: Vec<usize>,
    /// Row-major values
    pub values: Vec<f64>,
}

impl Channel {
    /// Scalar data channel
    pub fn scalar(name: ChannelName, value: f64) -> Self {
        Self {
            name,
            role: ChannelRole::Data,
            shape: Vec::new(),
            values: vec![value],
        }
    }

    /// 1-D data channel
    pub fn trace(name: ChannelName, values: Vec<f64>) -> Self {
        Self {
            name,
            role: ChannelRole::Data,
            shape: vec![values.len()],
            values,
        }
    }

    /// 2-D data channel (`rows x cols`, row-major)
    pub fn image(name: ChannelName, rows: usize, cols: usize, values: Vec<f64>) -> Self {
        Self {
            name,
            role: ChannelRole::Data,
            shape: vec![rows, cols],
            values,
        }
    }

    /// Override the channel role
    pub fn with_role(mut self, role: ChannelRole) -> Self {
        self.role = role;
        self
    }

    /// Dimensionality class
    pub fn dim(&self) -> DataDim {
        DataDim::from_shape(&self.shape)
    }

    /// Full `<module>/<channel>` name
    pub fn full_name(&self) -> String {
        self.name.to_string()
    }

    /// First value, used when a channel is fed back as a scalar
    pub fn first_value(&self) -> Option<f64> {
        self.values.first().copied()
    }
}

/// Snapshot of all channels returned by one grab.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementBundle {
    channels: Vec<Channel>,
}

impl MeasurementBundle {
    /// Bundle channels as tagged by the producer
    pub fn new(channels: Vec<Channel>) -> Self {
        Self { channels }
    }

    /// Bundle channels, tagging as background every channel whose last name segment
    /// starts with `marker`. This is the gateway-boundary classification.
    pub fn tagged(channels: Vec<Channel>, marker: &str) -> Self {
        let channels = channels
            .into_iter()
            .map(|c| {
                if !marker.is_empty() && c.name.channel.starts_with(marker) {
                    c.with_role(ChannelRole::Background)
                } else {
                    c
                }
            })
            .collect();
        Self { channels }
    }

    /// All channels
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Number of channels
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// True when the grab returned nothing
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Lookup by full name
    pub fn get(&self, full_name: &str) -> Option<&Channel> {
        let name = ChannelName::parse(full_name);
        self.channels.iter().find(|c| c.name == name)
    }

    /// Channels with the given role
    pub fn with_role(&self, role: ChannelRole) -> impl Iterator<Item = &Channel> {
        self.channels.iter().filter(move |c| c.role == role)
    }

    /// Data channels whose full name is in `full_names`, in bundle order
    pub fn select(&self, full_names: &[String]) -> Vec<Channel> {
        let wanted: Vec<ChannelName> = full_names.iter().map(|n| ChannelName::parse(n)).collect();
        self.with_role(ChannelRole::Data)
            .filter(|c| wanted.contains(&c.name))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_name_parsing() {
        let name = ChannelName::parse("det1/ch0");
        assert_eq!(name.module, "det1");
        assert_eq!(name.channel, "ch0");
        assert_eq!(name.to_string(), "det1/ch0");

        let nested = ChannelName::parse("setup/det1/Bg_fluo");
        assert_eq!(nested.module, "setup/det1");
        assert_eq!(nested.channel, "Bg_fluo");

        let bare = ChannelName::parse("ch0");
        assert_eq!(bare.module, "");
        assert_eq!(bare.to_string(), "ch0");
    }

    #[test]
    fn dims_follow_shape() {
        let s = Channel::scalar(ChannelName::parse("d/a"), 1.0);
        let t = Channel::trace(ChannelName::parse("d/b"), vec![1.0, 2.0]);
        let i = Channel::image(ChannelName::parse("d/c"), 2, 2, vec![0.0; 4]);
        assert_eq!(s.dim(), DataDim::Scalar);
        assert_eq!(t.dim().ndim(), 1);
        assert_eq!(i.dim(), DataDim::Image);
        assert_eq!(DataDim::from_shape(&[2, 2, 2]), DataDim::Nd(3));
    }

    #[test]
    fn tagging_marks_background_by_last_segment() {
        let bundle = MeasurementBundle::tagged(
            vec![
                Channel::scalar(ChannelName::parse("det1/ch0"), 1.0),
                Channel::trace(ChannelName::parse("det1/Bg_fluo"), vec![0.1]),
                Channel::scalar(ChannelName::parse("Bg_module/ch1"), 2.0),
            ],
            "Bg",
        );
        let bg: Vec<_> = bundle.with_role(ChannelRole::Background).collect();
        assert_eq!(bg.len(), 1);
        assert_eq!(bg[0].full_name(), "det1/Bg_fluo");
    }

    #[test]
    fn select_skips_background_and_unknown() {
        let bundle = MeasurementBundle::tagged(
            vec![
                Channel::scalar(ChannelName::parse("det1/ch0"), 1.0),
                Channel::scalar(ChannelName::parse("det1/Bg_dark"), 0.0),
            ],
            "Bg",
        );
        let picked = bundle.select(&[
            "det1/ch0".to_string(),
            "det1/Bg_dark".to_string(),
            "det2/ch9".to_string(),
        ]);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].full_name(), "det1/ch0");
        assert_eq!(bundle.get("det1/ch0").and_then(Channel::first_value), Some(1.0));
    }
}
