// Engine progress records and their mapping to host-facing events

use regex::Regex;
use serde::Deserialize;

use super::models::{ProgressEvent, ProgressStatus};

/// Prefix of the machine-readable progress lines requested from yt-dlp
pub const PROGRESS_MARKER: &str = "[bridge-progress] ";

/// Value for `--progress-template`: one JSON progress record per line
pub fn progress_template() -> String {
    format!("download:{}%(progress)j", PROGRESS_MARKER)
}

lazy_static::lazy_static! {
    // [download]  45.0% of 10.00MiB at  2.00MiB/s ETA 00:05
    // [download]  23.5% of ~ 1.23GiB at  5.67MiB/s ETA 03:45 (frag 56/454)
    // [download] 100% of 10.00MiB in 00:03
    static ref PROGRESS_RE: Regex = Regex::new(
        r"\[download\]\s+(\d+(?:\.\d+)?)%\s+of\s+(~)?\s*(\d+(?:\.\d+)?[KMGT]?i?B)(?:\s+at\s+(\S+))?(?:\s+ETA\s+(\S+))?"
    ).unwrap();
    static ref DEST_RE: Regex = Regex::new(r"\[download\]\s+Destination:\s+(.+)").unwrap();
    static ref SIZE_RE: Regex = Regex::new(r"^(\d+(?:\.\d+)?)([KMGT]?i?B)$").unwrap();
}

/// Progress tick as the engine reports it; every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EngineProgress {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub downloaded_bytes: Option<f64>,
    #[serde(default)]
    pub total_bytes: Option<f64>,
    #[serde(default)]
    pub total_bytes_estimate: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub eta: Option<f64>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default, rename = "_percent")]
    pub percent: Option<f64>,
    #[serde(default, rename = "_percent_str")]
    pub percent_str: Option<String>,
}

impl EngineProgress {
    /// Exact total, else the estimate, else 0
    pub fn resolved_total(&self) -> u64 {
        // A reported total of 0 means "not known yet"
        let known = |v: Option<f64>| v.and_then(non_negative).filter(|t| *t > 0);
        known(self.total_bytes)
            .or_else(|| known(self.total_bytes_estimate))
            .unwrap_or(0)
    }

    fn resolved_percent(&self) -> Option<f64> {
        self.percent
            .filter(|p| p.is_finite())
            .or_else(|| {
                self.percent_str
                    .as_deref()
                    .and_then(|s| s.trim().trim_end_matches('%').trim().parse::<f64>().ok())
            })
            .map(|p| p.clamp(0.0, 100.0))
    }

    /// Build the host event. Counters the engine did not report become 0 and
    /// downloaded bytes are capped at a known total.
    pub fn to_event(&self, default_filename: &str) -> ProgressEvent {
        let status = match self.status.as_deref() {
            Some("finished") => ProgressStatus::Finished,
            Some("error") => ProgressStatus::Error,
            _ => ProgressStatus::Downloading,
        };

        let total_bytes = self.resolved_total();
        let mut downloaded_bytes = self.downloaded_bytes.and_then(non_negative).unwrap_or(0);
        if total_bytes > 0 && downloaded_bytes > total_bytes {
            downloaded_bytes = total_bytes;
        }

        let filename = self
            .filename
            .clone()
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| default_filename.to_string());

        ProgressEvent {
            status,
            downloaded_bytes,
            total_bytes,
            speed: self.speed.and_then(non_negative).unwrap_or(0),
            eta: self.eta.and_then(non_negative).unwrap_or(0),
            filename,
            percent: self.resolved_percent(),
        }
    }
}

fn non_negative(v: f64) -> Option<u64> {
    if v.is_finite() && v >= 0.0 {
        Some(v as u64)
    } else {
        None
    }
}

/// Parse one line of engine output into a progress tick, if it is one.
pub fn parse_progress_line(line: &str) -> Option<EngineProgress> {
    let trimmed = line.trim();
    if let Some(payload) = trimmed.strip_prefix(PROGRESS_MARKER.trim_end()) {
        return serde_json::from_str::<EngineProgress>(payload.trim()).ok();
    }
    parse_classic_line(trimmed)
}

/// Fallback for the human-readable `[download]  45.0% of …` lines
fn parse_classic_line(line: &str) -> Option<EngineProgress> {
    let caps = PROGRESS_RE.captures(line)?;
    let percent: f64 = caps.get(1)?.as_str().parse().ok()?;
    let estimated = caps.get(2).is_some();
    let size = caps.get(3).and_then(|m| parse_size(m.as_str()))?;

    let speed = caps
        .get(4)
        .and_then(|m| parse_size(m.as_str().trim_end_matches("/s")));
    let eta = caps.get(5).and_then(|m| parse_eta(m.as_str()));

    let (total_bytes, total_bytes_estimate) = if estimated {
        (None, Some(size as f64))
    } else {
        (Some(size as f64), None)
    };

    Some(EngineProgress {
        status: Some(if percent >= 100.0 { "finished" } else { "downloading" }.to_string()),
        downloaded_bytes: Some(size as f64 * percent / 100.0),
        total_bytes,
        total_bytes_estimate,
        speed: speed.map(|s| s as f64),
        eta: eta.map(|e| e as f64),
        filename: None,
        percent: Some(percent),
        percent_str: None,
    })
}

/// `[download] Destination: <path>` announces the file being written
pub fn parse_destination(line: &str) -> Option<String> {
    DEST_RE
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// "10.00MiB" -> bytes
pub fn parse_size(size: &str) -> Option<u64> {
    let caps = SIZE_RE.captures(size.trim())?;
    let value: f64 = caps.get(1)?.as_str().parse().ok()?;
    let multiplier = match caps.get(2)?.as_str() {
        "B" => 1.0,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "KB" => 1_000.0,
        "MB" => 1_000_000.0,
        "GB" => 1_000_000_000.0,
        "TB" => 1_000_000_000_000.0,
        _ => return None,
    };
    Some((value * multiplier) as u64)
}

/// "1:02:03", "03:45" or "42" -> seconds
pub fn parse_eta(eta: &str) -> Option<u64> {
    eta.trim()
        .split(':')
        .try_fold(0u64, |acc, part| part.parse::<u64>().ok().map(|v| acc * 60 + v))
}
