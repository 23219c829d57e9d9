use crate::result::ErrorKind;
use crate::testspec::{MetricField, TestKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which number of a [`crate::reducer::MetricStats`] to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statistic {
    Min,
    Average,
    Max,
    P25,
    P50,
    P75,
}

impl Statistic {
    pub const ALL: [Statistic; 6] = [
        Statistic::Min,
        Statistic::Average,
        Statistic::Max,
        Statistic::P25,
        Statistic::P50,
        Statistic::P75,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Statistic::Min => "min",
            Statistic::Average => "average",
            Statistic::Max => "max",
            Statistic::P25 => "p25",
            Statistic::P50 => "p50",
            Statistic::P75 => "p75",
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Statistic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Statistic::ALL
            .into_iter()
            .find(|stat| stat.as_str() == s)
            .ok_or_else(|| format!("unknown statistic: {s}"))
    }
}

/// A single number of a comparison cell: test kind, field and statistic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricSelector {
    pub kind: TestKind,
    pub field: MetricField,
    pub statistic: Statistic,
}

impl MetricSelector {
    pub fn new(kind: TestKind, field: MetricField, statistic: Statistic) -> Self {
        Self {
            kind,
            field,
            statistic,
        }
    }

    pub fn average(kind: TestKind, field: MetricField) -> Self {
        Self::new(kind, field, Statistic::Average)
    }
}

/// A selected value, or the reason there is none
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum Cell {
    Value { value: f64 },
    Crashed {
        machine: String,
        error_kind: ErrorKind,
        message: String,
    },
    NotRun,
    /// The cell succeeded but did not record the selected field or statistic
    Missing,
}

impl Cell {
    pub fn value(&self) -> Option<f64> {
        match self {
            Cell::Value { value } => Some(*value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapRow {
    pub vpn: String,
    /// One cell per profile of [`Heatmap::profiles`]
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heatmap {
    pub selector: MetricSelector,
    pub profiles: Vec<String>,
    pub rows: Vec<HeatmapRow>,
}

impl Heatmap {
    pub fn cell(&self, vpn: &str, profile: &str) -> Option<&Cell> {
        let column = self.profiles.iter().position(|p| p == profile)?;
        self.rows
            .iter()
            .find(|row| row.vpn == vpn)
            .and_then(|row| row.cells.get(column))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub profile: String,
    pub cell: Cell,
}

/// One VPN's value across profiles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub vpn: String,
    pub selector: MetricSelector,
    pub points: Vec<SeriesPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScatterPoint {
    pub vpn: String,
    pub profile: String,
    pub x: Cell,
    pub y: Cell,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scatter {
    pub x: MetricSelector,
    pub y: MetricSelector,
    pub points: Vec<ScatterPoint>,
}
