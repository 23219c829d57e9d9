use crate::reducer::BenchSummary;
use crate::result::MixedReport;
use serde::{Deserialize, Serialize};

/// Live counters of a running sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepProgress {
    pub planned: usize,
    pub completed: usize,
    pub failed: usize,
    /// Runs not started, or abandoned mid-run, because the sweep was cancelled
    pub skipped: usize,
}

impl SweepProgress {
    pub fn remaining(&self) -> usize {
        self.planned.saturating_sub(self.completed + self.skipped)
    }

    pub fn percent_complete(&self) -> f64 {
        if self.planned == 0 {
            return 100.0;
        }
        (self.completed + self.skipped) as f64 / self.planned as f64 * 100.0
    }
}

/// Everything a sweep produced
#[derive(Debug, Clone)]
pub struct SweepReport {
    pub run_id: String,
    pub reports: Vec<MixedReport<BenchSummary>>,
    pub progress: SweepProgress,
    pub cancelled: bool,
}

impl SweepReport {
    pub fn failures(&self) -> impl Iterator<Item = &MixedReport<BenchSummary>> {
        self.reports.iter().filter(|r| r.result.is_err())
    }
}
