//! Benchmark output parsers
//!
//! Each parser turns the stdout of one benchmark command into per-field sample
//! series. A declared field without samples is a parse failure, so a reducer
//! downstream never receives an empty series.

use crate::testspec::error::{ParseError, ParseResult};
use crate::testspec::types::{MetricField, RawSamples, TestKind};
use serde_json::Value;

const BITS_PER_MBIT: f64 = 1_000_000.0;

/// Parse `stdout` produced by a benchmark of `kind`
pub fn parse_output(kind: TestKind, stdout: &str) -> ParseResult<RawSamples> {
    let samples = match kind {
        TestKind::TcpThroughput | TestKind::ParallelTcp => parse_iperf_tcp(stdout)?,
        TestKind::UdpThroughput => parse_iperf_udp(stdout)?,
        TestKind::Ping => parse_ping(stdout),
        TestKind::Http3 => parse_request_times(stdout)?,
        TestKind::VideoStream => parse_ffmpeg_progress(stdout),
        TestKind::CacheDownload => parse_downloads(stdout)?,
        TestKind::ConnectionSetup => parse_connection_setup(stdout)?,
    };

    for field in kind.fields() {
        if samples.get(field).map_or(true, |s| s.is_empty()) {
            return Err(ParseError::MissingSamples { kind, field: *field });
        }
    }
    Ok(samples)
}

fn push(samples: &mut RawSamples, field: MetricField, value: f64) {
    if value.is_finite() {
        samples.entry(field).or_default().push(value);
    }
}

fn iperf_report(stdout: &str) -> ParseResult<Value> {
    let report: Value =
        serde_json::from_str(stdout).map_err(|e| ParseError::InvalidJson(e.to_string()))?;
    if let Some(error) = report.get("error").and_then(Value::as_str) {
        return Err(ParseError::Reported(error.to_string()));
    }
    Ok(report)
}

fn interval_sums(report: &Value) -> impl Iterator<Item = &Value> {
    report["intervals"]
        .as_array()
        .into_iter()
        .flatten()
        .map(|interval| &interval["sum"])
}

fn parse_iperf_tcp(stdout: &str) -> ParseResult<RawSamples> {
    let report = iperf_report(stdout)?;
    let mut samples = RawSamples::new();

    for sum in interval_sums(&report) {
        if sum["omitted"].as_bool() == Some(true) {
            continue;
        }
        if let Some(bps) = sum["bits_per_second"].as_f64() {
            push(&mut samples, MetricField::SenderThroughput, bps / BITS_PER_MBIT);
        }
        if let Some(retransmits) = sum["retransmits"].as_f64() {
            push(&mut samples, MetricField::Retransmits, retransmits);
        }
    }

    if let Some(bps) = report["end"]["sum_received"]["bits_per_second"].as_f64() {
        push(&mut samples, MetricField::ReceiverThroughput, bps / BITS_PER_MBIT);
    }
    // Older iperf3 releases omit per-interval retransmits
    if !samples.contains_key(&MetricField::Retransmits) {
        if let Some(total) = report["end"]["sum_sent"]["retransmits"].as_f64() {
            push(&mut samples, MetricField::Retransmits, total);
        }
    }

    Ok(samples)
}

fn parse_iperf_udp(stdout: &str) -> ParseResult<RawSamples> {
    let report = iperf_report(stdout)?;
    let mut samples = RawSamples::new();

    for sum in interval_sums(&report) {
        if let Some(bps) = sum["bits_per_second"].as_f64() {
            push(&mut samples, MetricField::SenderThroughput, bps / BITS_PER_MBIT);
        }
    }

    let end = &report["end"]["sum"];
    if let Some(jitter) = end["jitter_ms"].as_f64() {
        push(&mut samples, MetricField::Jitter, jitter);
    }
    if let Some(lost) = end["lost_percent"].as_f64() {
        push(&mut samples, MetricField::LostPercent, lost);
    }

    Ok(samples)
}

/// Lines like `64 bytes from 10.0.0.2: icmp_seq=1 ttl=64 time=0.412 ms`
fn parse_ping(stdout: &str) -> RawSamples {
    let mut samples = RawSamples::new();
    for line in stdout.lines() {
        let Some(rest) = line.split("time=").nth(1) else {
            continue;
        };
        let value = rest.trim_end_matches(" ms").split_whitespace().next();
        if let Some(rtt) = value.and_then(|v| v.parse::<f64>().ok()) {
            push(&mut samples, MetricField::Rtt, rtt);
        }
    }
    samples
}

fn numbers(line: &str) -> ParseResult<Vec<f64>> {
    line.split_whitespace()
        .map(|word| {
            word.parse::<f64>()
                .map_err(|_| ParseError::Malformed(format!("expected a number, got '{word}'")))
        })
        .collect()
}

/// One `time_total` (seconds) per line
fn parse_request_times(stdout: &str) -> ParseResult<RawSamples> {
    let mut samples = RawSamples::new();
    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        if let [seconds, ..] = numbers(line)?[..] {
            push(&mut samples, MetricField::RequestLatency, seconds * 1000.0);
        }
    }
    Ok(samples)
}

/// One `time_total speed_download` (seconds, bytes/s) pair per line
fn parse_downloads(stdout: &str) -> ParseResult<RawSamples> {
    let mut samples = RawSamples::new();
    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        match numbers(line)?[..] {
            [seconds, bytes_per_sec] => {
                push(&mut samples, MetricField::DownloadTime, seconds);
                push(
                    &mut samples,
                    MetricField::DownloadSpeed,
                    bytes_per_sec * 8.0 / BITS_PER_MBIT,
                );
            }
            _ => return Err(ParseError::Malformed(format!("unexpected download line '{line}'"))),
        }
    }
    Ok(samples)
}

/// `ffmpeg -progress` blocks of `key=value` lines, each closed by `progress=...`
fn parse_ffmpeg_progress(stdout: &str) -> RawSamples {
    let mut samples = RawSamples::new();
    let mut last_dropped = None;

    for line in stdout.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        match key {
            "fps" => {
                if let Ok(fps) = value.parse::<f64>() {
                    if fps > 0.0 {
                        push(&mut samples, MetricField::FramesPerSecond, fps);
                    }
                }
            }
            "bitrate" => {
                if let Ok(kbits) = value.trim_end_matches("kbits/s").trim().parse::<f64>() {
                    push(&mut samples, MetricField::Bitrate, kbits);
                }
            }
            "drop_frames" => {
                if let Ok(dropped) = value.parse::<f64>() {
                    last_dropped = Some(dropped);
                }
            }
            _ => {}
        }
    }

    // The counter is cumulative; only the final value is a sample
    if let Some(dropped) = last_dropped {
        push(&mut samples, MetricField::DroppedFrames, dropped);
    }
    samples
}

fn parse_connection_setup(stdout: &str) -> ParseResult<RawSamples> {
    let mut samples = RawSamples::new();
    let line = stdout
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or_default();
    if let [millis] = numbers(line)?[..] {
        push(&mut samples, MetricField::ConnectionSetupTime, millis);
    }
    Ok(samples)
}
