use crate::testspec::types::{TestKind, TestSpec};

/// Port the peer's iperf3 server listens on
pub const IPERF_PORT: u16 = 5201;
/// Port of the peer's HTTP/3 endpoint
pub const HTTP3_PORT: u16 = 4433;
/// Port of the peer's SRT video source
pub const VIDEO_PORT: u16 = 9000;
/// Port of the peer's binary cache
pub const CACHE_PORT: u16 = 5000;

const DEFAULT_DOWNLOAD_PATH: &str = "nar/benchmark.nar";

/// Quote a word for a POSIX shell
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@,%+".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

fn argv(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

fn sh(script: String) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script]
}

impl TestSpec {
    /// Command line that runs this benchmark against `peer`, the mesh address of
    /// the partner machine.
    pub fn command(&self, peer: &str) -> Vec<String> {
        let duration = self.duration_secs.max(1).to_string();
        let iterations = self.iterations.max(1);
        let port = IPERF_PORT.to_string();

        match self.kind {
            TestKind::TcpThroughput => {
                argv(&["iperf3", "-c", peer, "-p", &port, "-t", &duration, "-J"])
            }
            TestKind::ParallelTcp => {
                let streams = self.parallel_streams.max(1).to_string();
                argv(&[
                    "iperf3", "-c", peer, "-p", &port, "-t", &duration, "-P", &streams, "-J",
                ])
            }
            TestKind::UdpThroughput => argv(&[
                "iperf3", "-c", peer, "-p", &port, "-t", &duration, "-u", "-b", "0", "-J",
            ]),
            TestKind::Ping => argv(&[
                "ping",
                "-c",
                &iterations.to_string(),
                "-i",
                "0.2",
                peer,
            ]),
            TestKind::Http3 => {
                let url = format!("https://{peer}:{HTTP3_PORT}/");
                sh(format!(
                    "for i in $(seq {iterations}); do \
                     curl --http3-only -sk -o /dev/null -w '%{{time_total}}\\n' {} || exit 1; \
                     done",
                    shell_quote(&url)
                ))
            }
            TestKind::VideoStream => {
                let url = format!("srt://{peer}:{VIDEO_PORT}?mode=caller");
                argv(&[
                    "ffmpeg",
                    "-hide_banner",
                    "-nostats",
                    "-progress",
                    "pipe:1",
                    "-i",
                    &url,
                    "-t",
                    &duration,
                    "-f",
                    "null",
                    "-",
                ])
            }
            TestKind::CacheDownload => {
                let path = self
                    .download_path
                    .as_deref()
                    .unwrap_or(DEFAULT_DOWNLOAD_PATH)
                    .trim_start_matches('/');
                let url = format!("http://{peer}:{CACHE_PORT}/{path}");
                sh(format!(
                    "for i in $(seq {iterations}); do \
                     curl -sf -o /dev/null -w '%{{time_total}} %{{speed_download}}\\n' {} || exit 1; \
                     done",
                    shell_quote(&url)
                ))
            }
            TestKind::ConnectionSetup => {
                let limit = self.duration_secs.max(1) * 10;
                sh(format!(
                    "s=$(date +%s%N); n=0; \
                     until ping -c 1 -W 1 {peer} >/dev/null 2>&1; do \
                     n=$((n+1)); [ $n -ge {limit} ] && exit 1; sleep 0.1; done; \
                     e=$(date +%s%N); echo $(( (e - s) / 1000000 ))",
                    peer = shell_quote(peer)
                ))
            }
        }
    }
}
