use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Benchmark type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    TcpThroughput,
    ParallelTcp,
    UdpThroughput,
    Ping,
    Http3,
    VideoStream,
    CacheDownload,
    ConnectionSetup,
}

impl TestKind {
    pub const ALL: [TestKind; 8] = [
        TestKind::TcpThroughput,
        TestKind::ParallelTcp,
        TestKind::UdpThroughput,
        TestKind::Ping,
        TestKind::Http3,
        TestKind::VideoStream,
        TestKind::CacheDownload,
        TestKind::ConnectionSetup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TestKind::TcpThroughput => "tcp_throughput",
            TestKind::ParallelTcp => "parallel_tcp",
            TestKind::UdpThroughput => "udp_throughput",
            TestKind::Ping => "ping",
            TestKind::Http3 => "http3",
            TestKind::VideoStream => "video_stream",
            TestKind::CacheDownload => "cache_download",
            TestKind::ConnectionSetup => "connection_setup",
        }
    }

    /// Numeric outputs every successful run of this kind produces
    pub fn fields(&self) -> &'static [MetricField] {
        use MetricField::*;
        match self {
            TestKind::TcpThroughput | TestKind::ParallelTcp => {
                &[SenderThroughput, ReceiverThroughput, Retransmits]
            }
            TestKind::UdpThroughput => &[SenderThroughput, Jitter, LostPercent],
            TestKind::Ping => &[Rtt],
            TestKind::Http3 => &[RequestLatency],
            TestKind::VideoStream => &[Bitrate, FramesPerSecond, DroppedFrames],
            TestKind::CacheDownload => &[DownloadTime, DownloadSpeed],
            TestKind::ConnectionSetup => &[ConnectionSetupTime],
        }
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TestKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown test kind: {s}"))
    }
}

/// A numeric output of a benchmark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricField {
    SenderThroughput,
    ReceiverThroughput,
    Retransmits,
    Jitter,
    LostPercent,
    Rtt,
    RequestLatency,
    Bitrate,
    FramesPerSecond,
    DroppedFrames,
    DownloadTime,
    DownloadSpeed,
    ConnectionSetupTime,
}

impl MetricField {
    pub const ALL: [MetricField; 13] = [
        MetricField::SenderThroughput,
        MetricField::ReceiverThroughput,
        MetricField::Retransmits,
        MetricField::Jitter,
        MetricField::LostPercent,
        MetricField::Rtt,
        MetricField::RequestLatency,
        MetricField::Bitrate,
        MetricField::FramesPerSecond,
        MetricField::DroppedFrames,
        MetricField::DownloadTime,
        MetricField::DownloadSpeed,
        MetricField::ConnectionSetupTime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricField::SenderThroughput => "sender_throughput",
            MetricField::ReceiverThroughput => "receiver_throughput",
            MetricField::Retransmits => "retransmits",
            MetricField::Jitter => "jitter",
            MetricField::LostPercent => "lost_percent",
            MetricField::Rtt => "rtt",
            MetricField::RequestLatency => "request_latency",
            MetricField::Bitrate => "bitrate",
            MetricField::FramesPerSecond => "frames_per_second",
            MetricField::DroppedFrames => "dropped_frames",
            MetricField::DownloadTime => "download_time",
            MetricField::DownloadSpeed => "download_speed",
            MetricField::ConnectionSetupTime => "connection_setup_time",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            MetricField::SenderThroughput
            | MetricField::ReceiverThroughput
            | MetricField::DownloadSpeed => "Mbit/s",
            MetricField::Retransmits | MetricField::DroppedFrames => "count",
            MetricField::Jitter
            | MetricField::Rtt
            | MetricField::RequestLatency
            | MetricField::ConnectionSetupTime => "ms",
            MetricField::LostPercent => "%",
            MetricField::Bitrate => "kbit/s",
            MetricField::FramesPerSecond => "fps",
            MetricField::DownloadTime => "s",
        }
    }

    /// Whether larger values mean better performance
    pub fn higher_is_better(&self) -> bool {
        matches!(
            self,
            MetricField::SenderThroughput
                | MetricField::ReceiverThroughput
                | MetricField::Bitrate
                | MetricField::FramesPerSecond
                | MetricField::DownloadSpeed
        )
    }
}

impl fmt::Display for MetricField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricField::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| format!("unknown metric field: {s}"))
    }
}

/// Raw sample series per field, as produced by one successful run
pub type RawSamples = BTreeMap<MetricField, Vec<f64>>;

fn default_duration_secs() -> u32 {
    10
}

fn default_iterations() -> u32 {
    10
}

fn default_parallel_streams() -> u32 {
    4
}

/// A configured benchmark: the kind plus its run-length parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSpec {
    pub kind: TestKind,
    /// Measurement window for streaming tests (iperf3, video)
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u32,
    /// Repetitions for request-style tests (ping, HTTP/3, downloads)
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    /// Stream count for [`TestKind::ParallelTcp`]
    #[serde(default = "default_parallel_streams")]
    pub parallel_streams: u32,
    /// Object fetched by [`TestKind::CacheDownload`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_path: Option<String>,
}

impl TestSpec {
    pub fn new(kind: TestKind) -> Self {
        Self {
            kind,
            duration_secs: default_duration_secs(),
            iterations: default_iterations(),
            parallel_streams: default_parallel_streams(),
            download_path: None,
        }
    }

    pub fn with_duration(mut self, secs: u32) -> Self {
        self.duration_secs = secs;
        self
    }

    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_parallel_streams(mut self, streams: u32) -> Self {
        self.parallel_streams = streams;
        self
    }

    pub fn fields(&self) -> &'static [MetricField] {
        self.kind.fields()
    }

    /// All kinds with default parameters
    pub fn standard_suite() -> Vec<TestSpec> {
        TestKind::ALL.into_iter().map(TestSpec::new).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in TestKind::ALL {
            assert_eq!(kind.as_str().parse::<TestKind>().unwrap(), kind);
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
        assert!("quic".parse::<TestKind>().is_err());
    }

    #[test]
    fn test_field_names_match_serde() {
        for field in MetricField::ALL {
            let json = serde_json::to_string(&field).unwrap();
            assert_eq!(json, format!("\"{}\"", field.as_str()));
            assert_eq!(field.as_str().parse::<MetricField>().unwrap(), field);
        }
    }

    #[test]
    fn test_dual_direction_kinds_declare_both_directions() {
        let fields = TestKind::TcpThroughput.fields();
        assert!(fields.contains(&MetricField::SenderThroughput));
        assert!(fields.contains(&MetricField::ReceiverThroughput));
    }

    #[test]
    fn test_spec_defaults_from_minimal_json() {
        let spec: TestSpec = serde_json::from_str(r#"{"kind":"ping"}"#).unwrap();
        assert_eq!(spec, TestSpec::new(TestKind::Ping));
        assert_eq!(spec.iterations, 10);
    }
}
