// Engine and host-callback seams

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use super::errors::DownloadError;
use super::models::{EngineOptions, ProgressEvent};
use super::progress::EngineProgress;

/// Synchronous progress hook handed to an engine for the length of one download
pub type ProgressHook<'a> = dyn FnMut(EngineProgress) + Send + 'a;

/// External extraction/download engine
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Name of the engine (for logging)
    fn name(&self) -> &'static str;

    /// Extract the raw info document without downloading
    async fn probe(&self, url: &str, options: &EngineOptions) -> Result<Value, DownloadError>;

    /// Download `url`, calling `on_progress` for every tick on the calling task.
    /// Returns the engine's completion code; 0 means success.
    async fn download(
        &self,
        url: &str,
        options: &EngineOptions,
        on_progress: &mut ProgressHook<'_>,
    ) -> Result<i32, DownloadError>;
}

pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Host-side observer of download progress.
///
/// Called on the thread running the download; implementations must return
/// quickly. Errors and panics are logged and otherwise ignored.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent) -> Result<(), SinkError>;
}

/// Sink that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn on_progress(&self, _event: &ProgressEvent) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Delivers events to an optional sink, swallowing sink failures
pub struct ProgressForwarder<'a> {
    sink: Option<&'a dyn ProgressSink>,
    failures: AtomicUsize,
}

impl<'a> ProgressForwarder<'a> {
    pub fn new(sink: Option<&'a dyn ProgressSink>) -> Self {
        Self {
            sink,
            failures: AtomicUsize::new(0),
        }
    }

    pub fn emit(&self, event: ProgressEvent) {
        let Some(sink) = self.sink else {
            return;
        };

        let reason = match panic::catch_unwind(AssertUnwindSafe(|| sink.on_progress(&event))) {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(_) => "sink panicked".to_string(),
        };

        // Warn once per download, then keep quiet
        if self.failures.fetch_add(1, Ordering::Relaxed) == 0 {
            tracing::warn!("[Progress] sink failed, continuing download: {}", reason);
        } else {
            tracing::debug!("[Progress] sink failed again: {}", reason);
        }
    }

    /// Number of events the sink rejected
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }
}
