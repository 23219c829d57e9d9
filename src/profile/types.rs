use serde::{Deserialize, Serialize};

/// Name reserved for the unimpaired condition
pub const BASELINE: &str = "baseline";

/// Named symmetric network condition applied during a benchmark
///
/// Values are the total round-trip impairment. Unset fields mean "no impairment
/// of this kind".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImpairmentProfile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet_loss_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reorder_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bandwidth_mbit: Option<f64>,
}

/// The share of a profile applied on a single endpoint
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EndpointImpairment {
    pub delay_ms: f64,
    pub jitter_ms: f64,
    pub loss_percent: f64,
    pub reorder_percent: f64,
    pub rate_mbit: Option<f64>,
}

impl EndpointImpairment {
    pub fn is_noop(&self) -> bool {
        self.delay_ms == 0.0
            && self.jitter_ms == 0.0
            && self.loss_percent == 0.0
            && self.reorder_percent == 0.0
            && self.rate_mbit.is_none()
    }
}

impl ImpairmentProfile {
    /// Profile with no impairment at all
    pub fn baseline() -> Self {
        Self::named(BASELINE)
    }

    /// Empty profile with the given name; combine with the `with_*` setters
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            latency_ms: None,
            jitter_ms: None,
            packet_loss_percent: None,
            reorder_percent: None,
            bandwidth_mbit: None,
        }
    }

    pub fn with_latency(mut self, latency_ms: f64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    pub fn with_jitter(mut self, jitter_ms: f64) -> Self {
        self.jitter_ms = Some(jitter_ms);
        self
    }

    pub fn with_loss(mut self, percent: f64) -> Self {
        self.packet_loss_percent = Some(percent);
        self
    }

    pub fn with_reorder(mut self, percent: f64) -> Self {
        self.reorder_percent = Some(percent);
        self
    }

    pub fn with_bandwidth(mut self, mbit: f64) -> Self {
        self.bandwidth_mbit = Some(mbit);
        self
    }

    pub fn is_baseline_name(&self) -> bool {
        self.name == BASELINE
    }

    /// True when no impairment field is set
    pub fn is_unimpaired(&self) -> bool {
        self.latency_ms.is_none()
            && self.jitter_ms.is_none()
            && self.packet_loss_percent.is_none()
            && self.reorder_percent.is_none()
            && self.bandwidth_mbit.is_none()
    }

    /// Half of the round-trip impairment, applied on each of the two endpoints.
    ///
    /// Bandwidth is a per-link cap and is applied unchanged on both sides.
    pub fn per_endpoint(&self) -> EndpointImpairment {
        EndpointImpairment {
            delay_ms: self.latency_ms.unwrap_or(0.0) / 2.0,
            jitter_ms: self.jitter_ms.unwrap_or(0.0) / 2.0,
            loss_percent: self.packet_loss_percent.unwrap_or(0.0) / 2.0,
            reorder_percent: self.reorder_percent.unwrap_or(0.0) / 2.0,
            rate_mbit: self.bandwidth_mbit,
        }
    }

    /// Field-level sanity problems, empty when the profile is usable
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.name.trim().is_empty() {
            problems.push("profile name is empty".to_string());
        }
        if self.is_baseline_name() && !self.is_unimpaired() {
            problems.push(format!("profile '{BASELINE}' is reserved and must not set impairments"));
        }

        let fields = [
            ("latency_ms", self.latency_ms),
            ("jitter_ms", self.jitter_ms),
            ("packet_loss_percent", self.packet_loss_percent),
            ("reorder_percent", self.reorder_percent),
            ("bandwidth_mbit", self.bandwidth_mbit),
        ];
        for (field, value) in fields {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    problems.push(format!("{}: {field} must be a non-negative number", self.name));
                }
            }
        }
        for (field, value) in [
            ("packet_loss_percent", self.packet_loss_percent),
            ("reorder_percent", self.reorder_percent),
        ] {
            if matches!(value, Some(v) if v > 100.0) {
                problems.push(format!("{}: {field} exceeds 100", self.name));
            }
        }
        if matches!(self.bandwidth_mbit, Some(v) if v == 0.0) {
            problems.push(format!("{}: bandwidth_mbit of 0 would block all traffic", self.name));
        }

        problems
    }
}
