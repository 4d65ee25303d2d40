//! Weighted, throttled progress estimation for an import job.
//!
//! Each table contributes a weight to the job total: its size as reported by
//! the driver, or [`DEFAULT_TABLE_WEIGHT`] when the size is unknown. Copy
//! loops call [`ProgressEstimator::advance`] once per fetched row and the
//! observer hears about it only when a new whole percent is reached.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::core::MigrationDriver;

/// Weight of a table whose size the driver cannot estimate.
pub const DEFAULT_TABLE_WEIGHT: u64 = 20;

/// Callback receiving completion percentages in `0..=100`.
pub type ProgressObserver = Arc<dyn Fn(u8) + Send + Sync>;

/// Snapshot of a job's progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressState {
    pub done: u64,
    pub total: u64,
    pub percent: u8,
}

/// Tracks completion of one job.
#[derive(Default)]
pub struct ProgressEstimator {
    state: ProgressState,
    next_report: u64,
    weights: HashMap<String, u64>,
    observer: Option<ProgressObserver>,
}

impl fmt::Debug for ProgressEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressEstimator")
            .field("state", &self.state)
            .field("next_report", &self.next_report)
            .field("tables", &self.weights.len())
            .finish()
    }
}

impl ProgressEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an estimator that reports to `observer`.
    pub fn with_observer(observer: ProgressObserver) -> Self {
        Self {
            observer: Some(observer),
            ..Self::default()
        }
    }

    /// Compute table weights and reset the job to 0%.
    ///
    /// A failed size lookup counts as an unknown size.
    pub async fn initialize(
        &mut self,
        driver: &mut dyn MigrationDriver,
        table_names: &[String],
    ) -> ProgressState {
        let mut sizes = Vec::with_capacity(table_names.len());
        for name in table_names {
            let size = match driver.table_size(name).await {
                Ok(size) => size,
                Err(e) => {
                    warn!("Could not determine size of table {}: {}", name, e);
                    None
                }
            };
            debug!("Table {} size: {:?}", name, size);
            sizes.push((name.clone(), size));
        }
        self.initialize_with_sizes(sizes)
    }

    /// Same as [`initialize`](Self::initialize) with sizes already known.
    pub fn initialize_with_sizes<I>(&mut self, sizes: I) -> ProgressState
    where
        I: IntoIterator<Item = (String, Option<u64>)>,
    {
        self.weights = sizes
            .into_iter()
            .map(|(name, size)| (name, size.unwrap_or(DEFAULT_TABLE_WEIGHT)))
            .collect();
        let total = self.weights.values().fold(0u64, |acc, w| acc.saturating_add(*w));

        self.state = ProgressState {
            done: 0,
            total,
            percent: 0,
        };
        self.next_report = self.threshold_for(1);
        debug!("Import job size: {}", total);
        self.emit(0);
        self.state
    }

    /// Weight assigned to `table` by the last initialization.
    pub fn weight_of(&self, table: &str) -> u64 {
        self.weights
            .get(table)
            .copied()
            .unwrap_or(DEFAULT_TABLE_WEIGHT)
    }

    /// Record `units` of completed work.
    pub fn advance(&mut self, units: u64) {
        self.state.done = self.state.done.saturating_add(units);
        if self.state.done < self.next_report {
            return;
        }

        let percent = self.compute_percent();
        if percent > self.state.percent {
            self.state.percent = percent;
            self.emit(percent);
        }
        self.next_report = self.threshold_for(u64::from(percent) + 1);
    }

    /// Account for the rest of a finished table's weight.
    ///
    /// `advanced` is what the copy loop already reported for the table.
    pub fn finish_table(&mut self, weight: u64, advanced: u64) {
        let remaining = weight.saturating_sub(advanced);
        // An empty job still completes.
        if remaining > 0 || self.state.total == 0 {
            self.advance(remaining);
        }
    }

    pub fn state(&self) -> ProgressState {
        self.state
    }

    pub fn percent(&self) -> u8 {
        self.state.percent
    }

    fn compute_percent(&self) -> u8 {
        if self.state.total == 0 {
            return 100;
        }
        let pct = (u128::from(self.state.done) * 100) / u128::from(self.state.total);
        pct.min(100) as u8
    }

    /// Smallest `done` value at which `percent` reaches `target`.
    fn threshold_for(&self, target: u64) -> u64 {
        if target > 100 {
            return u64::MAX;
        }
        let total = u128::from(self.state.total);
        let threshold = (u128::from(target) * total).div_ceil(100);
        u64::try_from(threshold).unwrap_or(u64::MAX)
    }

    fn emit(&self, percent: u8) {
        if let Some(observer) = &self.observer {
            observer(percent);
        }
    }
}
