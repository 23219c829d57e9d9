//! Benchmark kinds, their declared outputs, command lines and output parsers

mod command;
mod error;
mod parser;
mod types;

pub use command::{shell_quote, CACHE_PORT, HTTP3_PORT, IPERF_PORT, VIDEO_PORT};
pub use error::{ParseError, ParseResult};
pub use parser::parse_output;
pub use types::{MetricField, RawSamples, TestKind, TestSpec};
