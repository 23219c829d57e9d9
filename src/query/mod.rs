mod projection;
mod types;

pub use projection::{cell, heatmap, scatter, series};
pub use types::{
    Cell, Heatmap, HeatmapRow, MetricSelector, Scatter, ScatterPoint, Series, SeriesPoint,
    Statistic,
};
