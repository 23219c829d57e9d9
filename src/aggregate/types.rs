use crate::reducer::BenchSummary;
use crate::result::ExecutionError;
use crate::testspec::TestKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome of one (VPN, profile) cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum ComparisonEntry {
    /// Every machine succeeded; stats are merged across machines
    Success {
        summary: BenchSummary,
        machine_count: usize,
        /// Set when more than one machine was merged, since percentiles of the
        /// pooled samples cannot be recovered from per-machine summaries
        approximate: bool,
    },
    /// At least one machine failed
    Crashed {
        machine: String,
        error: ExecutionError,
        failing_machines: Vec<String>,
    },
    NotRun,
}

impl ComparisonEntry {
    pub fn is_success(&self) -> bool {
        matches!(self, ComparisonEntry::Success { .. })
    }

    pub fn is_crashed(&self) -> bool {
        matches!(self, ComparisonEntry::Crashed { .. })
    }

    pub fn is_not_run(&self) -> bool {
        matches!(self, ComparisonEntry::NotRun)
    }

    pub fn summary(&self) -> Option<&BenchSummary> {
        match self {
            ComparisonEntry::Success { summary, .. } => Some(summary),
            _ => None,
        }
    }
}

/// Comparison cells of one test kind, keyed by VPN then profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonMatrix {
    pub kind: TestKind,
    /// Requested profiles first, in the order given, then any extra ones by name
    pub profiles: Vec<String>,
    pub entries: BTreeMap<String, BTreeMap<String, ComparisonEntry>>,
}

impl ComparisonMatrix {
    pub fn get(&self, vpn: &str, profile: &str) -> Option<&ComparisonEntry> {
        self.entries.get(vpn).and_then(|row| row.get(profile))
    }

    /// VPN names in name order
    pub fn vpns(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// Every matrix built from one batch of reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSnapshot {
    pub generated_at: DateTime<Utc>,
    pub matrices: BTreeMap<TestKind, ComparisonMatrix>,
}

impl ComparisonSnapshot {
    pub fn matrix(&self, kind: TestKind) -> Option<&ComparisonMatrix> {
        self.matrices.get(&kind)
    }

    /// Entry for a cell; kinds with no matrix at all read as not run
    pub fn entry(&self, kind: TestKind, vpn: &str, profile: &str) -> Option<&ComparisonEntry> {
        self.matrix(kind).and_then(|m| m.get(vpn, profile))
    }

    /// Union of VPN names over all matrices, in name order
    pub fn vpns(&self) -> Vec<String> {
        let mut vpns: Vec<String> = self
            .matrices
            .values()
            .flat_map(|m| m.vpns().map(str::to_string))
            .collect();
        vpns.sort();
        vpns.dedup();
        vpns
    }

    /// Union of profile names, keeping each matrix's order of first appearance
    pub fn profiles(&self) -> Vec<String> {
        let mut profiles: Vec<String> = Vec::new();
        for matrix in self.matrices.values() {
            for profile in &matrix.profiles {
                if !profiles.contains(profile) {
                    profiles.push(profile.clone());
                }
            }
        }
        profiles
    }
}
