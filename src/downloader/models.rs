// Wire models shared by the orchestrator, the engines and the host

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::utils;

/// Normalized metadata returned by a probe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    /// Duration in seconds
    pub duration: Option<f64>,
    pub uploader: Option<String>,
    pub view_count: Option<u64>,
    /// Formats in the order the engine reported them
    pub formats: Vec<FormatDescriptor>,
}

impl MediaInfo {
    /// Map the engine's info document. Absent or mistyped fields become `None`.
    pub fn from_engine_json(json: &Value) -> Self {
        let formats = json["formats"]
            .as_array()
            .map(|list| list.iter().map(FormatDescriptor::from_engine_json).collect())
            .unwrap_or_default();

        Self {
            title: string_field(json, "title"),
            thumbnail: string_field(json, "thumbnail"),
            duration: json["duration"].as_f64(),
            uploader: string_field(json, "uploader"),
            view_count: count_field(json, "view_count"),
            formats,
        }
    }
}

/// One encoded stream offered by the source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    pub format_id: String,
    /// Container extension (mp4, webm, m4a)
    pub ext: String,
    /// Resolution label such as "1920x1080" or "audio only"
    pub resolution: Option<String>,
    /// Exact size in bytes, when the source advertises one
    pub filesize: Option<u64>,
    /// Video codec, "none" for audio-only streams
    pub vcodec: Option<String>,
    /// Audio codec, "none" for video-only streams
    pub acodec: Option<String>,
    pub url: String,
}

impl FormatDescriptor {
    pub fn from_engine_json(f: &Value) -> Self {
        Self {
            format_id: string_field(f, "format_id").unwrap_or_default(),
            ext: string_field(f, "ext").unwrap_or_default(),
            resolution: string_field(f, "resolution"),
            filesize: count_field(f, "filesize"),
            vcodec: string_field(f, "vcodec"),
            acodec: string_field(f, "acodec"),
            url: string_field(f, "url").unwrap_or_default(),
        }
    }

    /// Carries both audio and video, so no merge step is needed
    pub fn is_premuxed(&self) -> bool {
        let has = |codec: &Option<String>| codec.as_deref().map_or(false, |c| c != "none" && !c.is_empty());
        has(&self.vcodec) && has(&self.acodec)
    }
}

fn string_field(json: &Value, key: &str) -> Option<String> {
    json[key].as_str().map(|s| s.to_string())
}

/// Non-negative integer field; the engine occasionally reports counts as floats.
fn count_field(json: &Value, key: &str) -> Option<u64> {
    let value = &json[key];
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|v| v.is_finite() && *v >= 0.0).map(|v| v as u64))
}

/// Result of a probe as seen by the host: metadata, or a lone `error` key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProbeResponse {
    Error { error: String },
    Info(MediaInfo),
}

impl ProbeResponse {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| error_json("error", &format!("Failed to serialize media info: {}", e)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Starting,
    /// In progress; the wire value matches the engine's own status string
    Downloading,
    Finished,
    Error,
}

/// Progress notification delivered to the host's sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub status: ProgressStatus,
    pub downloaded_bytes: u64,
    /// 0 when neither an exact total nor an estimate is known
    pub total_bytes: u64,
    /// Bytes per second
    pub speed: u64,
    /// Seconds remaining
    pub eta: u64,
    /// Destination file path
    pub filename: String,
    /// Percent complete as reported by the engine
    pub percent: Option<f64>,
}

impl ProgressEvent {
    /// An event with every counter at zero
    pub fn empty(status: ProgressStatus, filename: impl Into<String>) -> Self {
        Self {
            status,
            downloaded_bytes: 0,
            total_bytes: 0,
            speed: 0,
            eta: 0,
            filename: filename.into(),
            percent: None,
        }
    }
}

/// Terminal result of a download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DownloadOutcome {
    Success { path: String },
    Error { message: String },
}

impl DownloadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                "{{\"status\":\"error\",\"message\":{}}}",
                Value::String(format!("Failed to serialize outcome: {}", e))
            )
        })
    }
}

/// `{"<key>": "<message>"}` built without going through a fallible serializer
pub(crate) fn error_json(key: &str, message: &str) -> String {
    let mut map = serde_json::Map::new();
    map.insert(key.to_string(), Value::String(message.to_string()));
    Value::Object(map).to_string()
}

/// Engine behavior switches that are a policy decision rather than per-call input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnginePolicy {
    /// Keep going past per-item errors
    pub ignore_errors: bool,
    /// Disable TLS certificate validation
    pub skip_certificate_check: bool,
    /// Allow fixups/remuxing that need an external tool
    pub prefer_external_remux: bool,
}

/// Per-call engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    pub quiet: bool,
    pub no_warnings: bool,
    pub extract_flat: bool,
    pub format: Option<String>,
    pub output_template: Option<String>,
    pub ignore_errors: bool,
    pub skip_certificate_check: bool,
    pub prefer_external_remux: bool,
}

impl EngineOptions {
    /// Metadata-only extraction with full format lists
    pub fn for_probe(policy: EnginePolicy) -> Self {
        Self {
            quiet: true,
            no_warnings: true,
            extract_flat: false,
            format: None,
            output_template: None,
            ignore_errors: policy.ignore_errors,
            skip_certificate_check: policy.skip_certificate_check,
            prefer_external_remux: policy.prefer_external_remux,
        }
    }

    pub fn for_download(policy: EnginePolicy, format: String, output_template: String) -> Self {
        Self {
            format: Some(format),
            output_template: Some(output_template),
            ..Self::for_probe(policy)
        }
    }
}

/// Configuration of the subprocess engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// yt-dlp executable
    pub binary_path: String,
    /// Upper bound for a probe, in seconds
    pub probe_timeout_secs: u64,
    /// Passed to the engine as its socket timeout
    pub socket_timeout_secs: Option<u32>,
    /// HTTP/SOCKS proxy URL (e.g., "socks5://127.0.0.1:1080")
    pub proxy: Option<String>,
    pub policy: EnginePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary_path: utils::find_ytdlp(),
            probe_timeout_secs: 60,
            socket_timeout_secs: Some(30),
            proxy: None,
            policy: EnginePolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_binary_path(mut self, path: impl Into<String>) -> Self {
        self.binary_path = path.into();
        self
    }

    pub fn with_probe_timeout(mut self, seconds: u64) -> Self {
        self.probe_timeout_secs = seconds;
        self
    }

    pub fn with_socket_timeout(mut self, seconds: Option<u32>) -> Self {
        self.socket_timeout_secs = seconds;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_policy(mut self, policy: EnginePolicy) -> Self {
        self.policy = policy;
        self
    }
}
