use crate::api::error::{ApiError, ApiResult};
use crate::query::{MetricSelector, Statistic};
use crate::testspec::{MetricField, TestKind};
use serde::{Deserialize, Serialize};

/// `?kind=&field=&stat=` with `stat` defaulting to the average
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorParams {
    pub kind: String,
    pub field: String,
    pub stat: Option<String>,
}

impl SelectorParams {
    pub fn selector(&self) -> ApiResult<MetricSelector> {
        selector(&self.kind, &self.field, self.stat.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeatmapParams {
    pub kind: String,
    pub field: String,
    pub stat: Option<String>,
    /// Comma separated VPN names; rows for them come first
    pub order: Option<String>,
}

impl HeatmapParams {
    pub fn selector(&self) -> ApiResult<MetricSelector> {
        selector(&self.kind, &self.field, self.stat.as_deref())
    }

    pub fn vpn_order(&self) -> Vec<String> {
        self.order
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScatterParams {
    pub x_kind: String,
    pub x_field: String,
    pub x_stat: Option<String>,
    pub y_kind: String,
    pub y_field: String,
    pub y_stat: Option<String>,
}

impl ScatterParams {
    pub fn axes(&self) -> ApiResult<(MetricSelector, MetricSelector)> {
        Ok((
            selector(&self.x_kind, &self.x_field, self.x_stat.as_deref())?,
            selector(&self.y_kind, &self.y_field, self.y_stat.as_deref())?,
        ))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsParams {
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub stored_ok: i64,
    pub stored_failed: i64,
    pub known_vpns: Vec<String>,
    pub profiles: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

pub(crate) fn parse_kind(kind: &str) -> ApiResult<TestKind> {
    kind.parse().map_err(ApiError::InvalidRequest)
}

fn selector(kind: &str, field: &str, stat: Option<&str>) -> ApiResult<MetricSelector> {
    let kind = parse_kind(kind)?;
    let field: MetricField = field.parse().map_err(ApiError::InvalidRequest)?;
    let statistic = match stat {
        Some(stat) => stat.parse().map_err(ApiError::InvalidRequest)?,
        None => Statistic::Average,
    };
    if !kind.fields().contains(&field) {
        return Err(ApiError::InvalidRequest(format!(
            "{kind} does not produce {field}"
        )));
    }
    Ok(MetricSelector::new(kind, field, statistic))
}
