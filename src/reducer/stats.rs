use crate::reducer::error::{ReduceError, ReduceResult};
use crate::testspec::{MetricField, RawSamples};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Percentiles shown on charts
pub const CHART_PERCENTILES: [f64; 3] = [25.0, 50.0, 75.0];

/// Summary of one non-empty sample series
///
/// Only produced by [`reduce`]; fields are read through accessors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    min: f64,
    average: f64,
    max: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    p25: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    p50: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    p75: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quartiles {
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentileValue {
    pub percentile: f64,
    pub value: f64,
}

/// Per-field statistics of one machine's run
pub type BenchSummary = BTreeMap<MetricField, MetricStats>;

impl MetricStats {
    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn average(&self) -> f64 {
        self.average
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Chart quartiles, present only when all three were recorded
    pub fn quartiles(&self) -> Option<Quartiles> {
        match (self.p25, self.p50, self.p75) {
            (Some(p25), Some(p50), Some(p75)) => Some(Quartiles { p25, p50, p75 }),
            _ => None,
        }
    }

    /// Finite values with `min <= average <= max` and ordered quartiles inside the range.
    ///
    /// Always true for reducer output; records read back from storage may not be.
    pub fn is_consistent(&self) -> bool {
        let finite = [self.min, self.average, self.max].iter().all(|v| v.is_finite());
        let ordered = self.min <= self.average && self.average <= self.max;
        let partial = [self.p25, self.p50, self.p75].iter().any(Option::is_some)
            && self.quartiles().is_none();
        let quartiles_ok = !partial && self.quartiles().map_or(true, |q| {
            [q.p25, q.p50, q.p75].iter().all(|v| v.is_finite())
                && self.min <= q.p25
                && q.p25 <= q.p50
                && q.p50 <= q.p75
                && q.p75 <= self.max
        });
        finite && ordered && quartiles_ok
    }

    pub(crate) fn from_parts(
        min: f64,
        average: f64,
        max: f64,
        quartiles: Option<Quartiles>,
    ) -> Self {
        Self {
            min,
            average,
            max,
            p25: quartiles.map(|q| q.p25),
            p50: quartiles.map(|q| q.p50),
            p75: quartiles.map(|q| q.p75),
        }
    }
}

fn sorted_checked(samples: &[f64]) -> ReduceResult<Vec<f64>> {
    if samples.is_empty() {
        return Err(ReduceError::EmptySamples);
    }
    if let Some(index) = samples.iter().position(|v| !v.is_finite()) {
        return Err(ReduceError::NonFiniteSample { index });
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    Ok(sorted)
}

/// Linear interpolation between the order statistics around `p/100 * (n - 1)`
fn interpolate(sorted: &[f64], percentile: f64) -> f64 {
    let rank = percentile * (sorted.len() - 1) as f64 / 100.0;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

fn check_percentile(p: f64) -> ReduceResult<()> {
    if p.is_finite() && (0.0..=100.0).contains(&p) {
        Ok(())
    } else {
        Err(ReduceError::PercentileOutOfRange(p))
    }
}

/// Summarize a sample series with min/average/max and the chart quartiles
pub fn reduce(samples: &[f64]) -> ReduceResult<MetricStats> {
    let sorted = sorted_checked(samples)?;
    let min = sorted[0];
    let max = sorted[sorted.len() - 1];
    // Rounding in the sum can push the mean of identical values just past them
    let average = (sorted.iter().sum::<f64>() / sorted.len() as f64).clamp(min, max);

    Ok(MetricStats {
        min,
        average,
        max,
        p25: Some(interpolate(&sorted, CHART_PERCENTILES[0])),
        p50: Some(interpolate(&sorted, CHART_PERCENTILES[1])),
        p75: Some(interpolate(&sorted, CHART_PERCENTILES[2])),
    })
}

/// Arbitrary percentiles of a sample series, in the order requested
pub fn percentiles(samples: &[f64], requested: &[f64]) -> ReduceResult<Vec<PercentileValue>> {
    for &p in requested {
        check_percentile(p)?;
    }
    let sorted = sorted_checked(samples)?;
    Ok(requested
        .iter()
        .map(|&percentile| PercentileValue {
            percentile,
            value: interpolate(&sorted, percentile),
        })
        .collect())
}

/// [`reduce`] plus an extra percentile list
pub fn reduce_with(
    samples: &[f64],
    requested: &[f64],
) -> ReduceResult<(MetricStats, Vec<PercentileValue>)> {
    Ok((reduce(samples)?, percentiles(samples, requested)?))
}

/// Reduce every field of a run independently; directions are never merged
pub fn reduce_samples(raw: &RawSamples) -> ReduceResult<BenchSummary> {
    if raw.is_empty() {
        return Err(ReduceError::NoFields);
    }
    raw.iter()
        .map(|(field, series)| {
            reduce(series)
                .map(|stats| (*field, stats))
                .map_err(|e| ReduceError::Field {
                    field: *field,
                    source: Box::new(e),
                })
        })
        .collect()
}
