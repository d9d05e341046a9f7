//! In-memory grid writer.
//!
//! Keeps every cell, axis hand-off and background association in memory. Used by the
//! `daq-scan` binary for dry runs and by the test-suite to inspect what a scan wrote.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::data::{
    BackgroundFrame, Channel, ChannelRole, MeasurementBundle, NavigationAxis, StepIndex,
};
use crate::error::StorageError;
use crate::scanner::{DataDistribution, ScanLayout};
use crate::storage::GridWriter;

/// Everything written to a [`MemoryGridWriter`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridRecord {
    /// Data channels per grid cell
    pub cells: BTreeMap<StepIndex, Vec<Channel>>,
    /// Indices in write order
    pub write_order: Vec<StepIndex>,
    /// Distribution tag of the last step write
    pub distribution: Option<DataDistribution>,
    /// Every `add_nav_axes` call, in order
    pub nav_axes_handoffs: Vec<Vec<NavigationAxis>>,
    /// Current reference channels per detector node
    pub backgrounds: BTreeMap<String, Vec<Channel>>,
    /// Number of `attach_background` calls
    pub background_attachments: usize,
    /// Set by `flush`
    pub flushed: bool,
}

impl GridRecord {
    /// Latest measured axes handed to storage
    pub fn latest_axes(&self) -> Option<&[NavigationAxis]> {
        self.nav_axes_handoffs.last().map(|a| a.as_slice())
    }
}

/// Read access to the record of a writer that has been moved into a scan.
#[derive(Debug, Clone)]
pub struct GridHandle {
    record: Arc<Mutex<GridRecord>>,
}

impl GridHandle {
    /// Copy of the current record
    pub fn snapshot(&self) -> GridRecord {
        match self.record.lock() {
            Ok(record) => record.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Grid writer enforcing the declared layout, backed by a [`GridRecord`].
#[derive(Debug)]
pub struct MemoryGridWriter {
    layout: ScanLayout,
    record: Arc<Mutex<GridRecord>>,
    fail_at: Option<StepIndex>,
}

impl MemoryGridWriter {
    /// Writer for the given layout
    pub fn new(layout: ScanLayout) -> Self {
        Self {
            layout,
            record: Arc::new(Mutex::new(GridRecord::default())),
            fail_at: None,
        }
    }

    /// Reject the write at `index` with a backend error
    pub fn failing_at(mut self, index: StepIndex) -> Self {
        self.fail_at = Some(index);
        self
    }

    /// Declared layout
    pub fn layout(&self) -> &ScanLayout {
        &self.layout
    }

    /// Handle for inspecting the record after the writer has been handed to a scan
    pub fn handle(&self) -> GridHandle {
        GridHandle {
            record: Arc::clone(&self.record),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, GridRecord>, StorageError> {
        self.record
            .lock()
            .map_err(|_| StorageError::Backend("grid record lock poisoned".into()))
    }
}

#[async_trait]
impl GridWriter for MemoryGridWriter {
    async fn add_data(
        &mut self,
        index: &StepIndex,
        bundle: &MeasurementBundle,
        distribution: DataDistribution,
    ) -> Result<(), StorageError> {
        if self.fail_at.as_ref() == Some(index) {
            return Err(StorageError::Backend(format!(
                "simulated write failure at {}",
                index
            )));
        }
        if !index.fits(&self.layout.shape) {
            return Err(StorageError::OutOfBounds {
                index: index.clone(),
                shape: self.layout.shape.clone(),
            });
        }

        let mut record = self.lock()?;
        if record.flushed {
            return Err(StorageError::Closed);
        }
        if record.cells.contains_key(index) {
            return Err(StorageError::DuplicateIndex(index.clone()));
        }
        let data: Vec<Channel> = bundle.with_role(ChannelRole::Data).cloned().collect();
        debug!(index = %index, channels = data.len(), "Stored step");
        record.cells.insert(index.clone(), data);
        record.write_order.push(index.clone());
        record.distribution = Some(distribution);
        Ok(())
    }

    async fn add_nav_axes(&mut self, axes: &[NavigationAxis]) -> Result<(), StorageError> {
        let mut record = self.lock()?;
        if record.flushed {
            return Err(StorageError::Closed);
        }
        record.nav_axes_handoffs.push(axes.to_vec());
        Ok(())
    }

    async fn attach_background(&mut self, frame: &BackgroundFrame) -> Result<(), StorageError> {
        let mut record = self.lock()?;
        if record.flushed {
            return Err(StorageError::Closed);
        }
        for detector in frame.detectors() {
            let channels = frame.for_detector(&detector).cloned().collect();
            record.backgrounds.insert(detector, channels);
        }
        record.background_attachments += 1;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), StorageError> {
        let mut record = self.lock()?;
        record.flushed = true;
        debug!(cells = record.cells.len(), "Grid flushed");
        Ok(())
    }
}
