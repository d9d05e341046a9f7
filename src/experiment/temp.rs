//! Temporary live dataset.
//!
//! Grows a display-ready dataset from live updates as they arrive. Updates must arrive in
//! strictly increasing [`StepIndex`] order; the dataset refuses anything else rather than
//! silently reordering.

use std::collections::BTreeMap;
use tokio::sync::mpsc;

use crate::data::{BackgroundFrame, StepIndex};
use crate::error::LiveError;
use crate::experiment::live::LiveUpdate;

/// One stored row of a channel
#[derive(Debug, Clone, PartialEq)]
pub struct TempRow {
    /// Grid location
    pub index: StepIndex,
    /// Channel shape
    pub shape: Vec<usize>,
    /// Channel values
    pub values: Vec<f64>,
}

/// Live-display dataset keyed by channel and step index.
#[derive(Debug, Clone, Default)]
pub struct TempDataset {
    rows: BTreeMap<String, Vec<TempRow>>,
    last: Option<StepIndex>,
    background: Option<BackgroundFrame>,
    updates: usize,
}

impl TempDataset {
    /// Empty dataset
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one update.
    ///
    /// # Errors
    ///
    /// `LiveError::OutOfOrder` when the update's index is not after the last one.
    pub fn ingest(&mut self, update: &LiveUpdate) -> Result<(), LiveError> {
        if let Some(last) = &self.last {
            if update.index <= *last {
                return Err(LiveError::OutOfOrder {
                    last: last.clone(),
                    got: update.index.clone(),
                });
            }
        }
        for channel in &update.data {
            self.rows
                .entry(channel.full_name())
                .or_default()
                .push(TempRow {
                    index: update.index.clone(),
                    shape: channel.shape.clone(),
                    values: channel.values.clone(),
                });
        }
        if let Some(frame) = &update.background {
            self.background = Some(frame.clone());
        }
        self.last = Some(update.index.clone());
        self.updates += 1;
        Ok(())
    }

    /// Drain a live subscription until the emitter closes it.
    pub async fn collect(mut rx: mpsc::UnboundedReceiver<LiveUpdate>) -> Result<Self, LiveError> {
        let mut dataset = Self::new();
        while let Some(update) = rx.recv().await {
            dataset.ingest(&update)?;
        }
        Ok(dataset)
    }

    /// Rows of one channel, in arrival order
    pub fn channel(&self, full_name: &str) -> Option<&[TempRow]> {
        self.rows.get(full_name).map(|r| r.as_slice())
    }

    /// Channels seen so far
    pub fn channel_names(&self) -> Vec<&str> {
        self.rows.keys().map(String::as_str).collect()
    }

    /// Latest reference frame
    pub fn background(&self) -> Option<&BackgroundFrame> {
        self.background.as_ref()
    }

    /// Index of the last accepted update
    pub fn last_index(&self) -> Option<&StepIndex> {
        self.last.as_ref()
    }

    /// Number of accepted updates
    pub fn len(&self) -> usize {
        self.updates
    }

    /// True before the first update
    pub fn is_empty(&self) -> bool {
        self.updates == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Channel, ChannelName};

    fn update(index: Vec<usize>, value: f64) -> LiveUpdate {
        LiveUpdate {
            step: *index.last().unwrap_or(&0),
            average: 0,
            index: StepIndex::new(index),
            data: vec![Channel::scalar(ChannelName::new("det1", "ch0"), value)],
            background: None,
        }
    }

    #[test]
    fn test_rows_accumulate_per_channel() {
        let mut dataset = TempDataset::new();
        dataset.ingest(&update(vec![0, 0], 1.0)).unwrap();
        dataset.ingest(&update(vec![0, 1], 2.0)).unwrap();
        dataset.ingest(&update(vec![1, 0], 3.0)).unwrap();

        let rows = dataset.channel("det1/ch0").unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].values, vec![3.0]);
        assert_eq!(dataset.last_index(), Some(&StepIndex::new(vec![1, 0])));
        assert_eq!(dataset.channel_names(), vec!["det1/ch0"]);
    }

    #[test]
    fn test_rejects_out_of_order_updates() {
        let mut dataset = TempDataset::new();
        dataset.ingest(&update(vec![1, 0], 1.0)).unwrap();
        let err = dataset.ingest(&update(vec![0, 4], 2.0)).unwrap_err();
        assert_eq!(
            err,
            LiveError::OutOfOrder {
                last: StepIndex::new(vec![1, 0]),
                got: StepIndex::new(vec![0, 4]),
            }
        );
        assert!(dataset.ingest(&update(vec![1, 0], 2.0)).is_err());
        assert_eq!(dataset.len(), 1);
    }
}
