//! Host bridge over the yt-dlp media engine.
//!
//! The host calls [`probe`] and [`download`] from a worker thread and gets a
//! JSON string back in every case. Progress for a download arrives on that
//! same thread through a [`ProgressSink`].

pub mod downloader;

pub use downloader::{
    DownloadError, DownloadOrchestrator, DownloadOutcome, EngineConfig, EnginePolicy, ErrorKind,
    FormatDescriptor, MediaEngine, MediaInfo, NoopSink, ProbeResponse, ProgressEvent,
    ProgressSink, ProgressStatus, SinkError, YtDlpEngine,
};

fn default_orchestrator() -> DownloadOrchestrator {
    let engine = YtDlpEngine::default();
    let policy = engine.config().policy;
    DownloadOrchestrator::new(Box::new(engine)).with_policy(policy)
}

/// Fetch metadata for `url`.
///
/// Returns the MediaInfo object, or `{"error": "..."}` on any failure.
pub fn probe(url: &str) -> String {
    default_orchestrator().probe_blocking(url).to_json()
}

/// Download `url` to `output_path`.
///
/// `format_selector` of `None` or `"best"` picks a single pre-muxed file when
/// one exists. Returns `{"status":"success","path":...}` or
/// `{"status":"error","message":...}`.
pub fn download(
    url: &str,
    output_path: &str,
    format_selector: Option<&str>,
    sink: Option<&dyn ProgressSink>,
) -> String {
    default_orchestrator()
        .download_blocking(url, output_path, format_selector, sink)
        .to_json()
}
