// Orchestrator - the single boundary between the host and the engine
//
// Every public operation returns a tagged result; no DownloadError escapes.

use super::errors::DownloadError;
use super::format_selector::FormatSelector;
use super::models::{
    DownloadOutcome, EngineOptions, EnginePolicy, MediaInfo, ProbeResponse, ProgressEvent,
    ProgressStatus,
};
use super::progress::EngineProgress;
use super::traits::{MediaEngine, ProgressForwarder, ProgressSink};
use super::utils;

pub struct DownloadOrchestrator {
    engine: Box<dyn MediaEngine>,
    policy: EnginePolicy,
}

impl DownloadOrchestrator {
    pub fn new(engine: Box<dyn MediaEngine>) -> Self {
        Self {
            engine,
            policy: EnginePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: EnginePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// Metadata-only extraction
    pub async fn probe(&self, url: &str) -> ProbeResponse {
        match self.try_probe(url).await {
            Ok(info) => {
                tracing::info!(
                    "[Orchestrator] ✓ probe via {}: {} format(s)",
                    self.engine.name(),
                    info.formats.len()
                );
                ProbeResponse::Info(info)
            }
            Err(e) => {
                tracing::warn!("[Orchestrator] ✗ probe failed ({:?}): {}", e.kind(), e);
                ProbeResponse::Error { error: e.to_string() }
            }
        }
    }

    async fn try_probe(&self, url: &str) -> Result<MediaInfo, DownloadError> {
        let url = validate_url(url)?;
        let raw = self
            .engine
            .probe(url, &EngineOptions::for_probe(self.policy))
            .await?;

        if !raw.is_object() {
            return Err(DownloadError::ParseError(
                "engine returned a non-object info document".to_string(),
            ));
        }
        Ok(MediaInfo::from_engine_json(&raw))
    }

    /// Download `url` to `output_path`, forwarding progress to `sink`
    pub async fn download(
        &self,
        url: &str,
        output_path: &str,
        format_selector: Option<&str>,
        sink: Option<&dyn ProgressSink>,
    ) -> DownloadOutcome {
        let forwarder = ProgressForwarder::new(sink);

        match self
            .try_download(url, output_path, format_selector, &forwarder)
            .await
        {
            Ok(()) => {
                tracing::info!("[Orchestrator] ✓ download complete: {}", output_path);
                DownloadOutcome::Success {
                    path: output_path.to_string(),
                }
            }
            Err(e) => {
                tracing::warn!("[Orchestrator] ✗ download failed ({:?}): {}", e.kind(), e);
                DownloadOutcome::Error {
                    message: e.to_string(),
                }
            }
        }
    }

    async fn try_download(
        &self,
        url: &str,
        output_path: &str,
        format_selector: Option<&str>,
        forwarder: &ProgressForwarder<'_>,
    ) -> Result<(), DownloadError> {
        // Input errors are reported before the engine or the sink see anything
        let url = validate_url(url)?;
        utils::ensure_writable_destination(output_path)?;

        let format = FormatSelector::resolve(format_selector);
        tracing::info!(
            "[Orchestrator] download via {}: format={} -> {}",
            self.engine.name(),
            format,
            output_path
        );
        let options = EngineOptions::for_download(
            self.policy,
            format,
            utils::literal_output_template(output_path),
        );

        forwarder.emit(ProgressEvent::empty(ProgressStatus::Starting, output_path));

        let mut hook = |tick: EngineProgress| forwarder.emit(tick.to_event(output_path));
        let result = match self.engine.download(url, &options, &mut hook).await {
            Ok(0) => Ok(()),
            Ok(code) => Err(DownloadError::EngineExit(code)),
            Err(e) => Err(e),
        };

        if result.is_err() {
            forwarder.emit(ProgressEvent::empty(ProgressStatus::Error, output_path));
        }
        if forwarder.failures() > 0 {
            tracing::debug!("[Orchestrator] sink rejected {} event(s)", forwarder.failures());
        }
        result
    }

    /// `probe` serialized for the host
    pub async fn probe_json(&self, url: &str) -> String {
        self.probe(url).await.to_json()
    }

    /// `download` serialized for the host
    pub async fn download_json(
        &self,
        url: &str,
        output_path: &str,
        format_selector: Option<&str>,
        sink: Option<&dyn ProgressSink>,
    ) -> String {
        self.download(url, output_path, format_selector, sink)
            .await
            .to_json()
    }

    /// Blocking `probe`; must not be called from inside a tokio runtime.
    pub fn probe_blocking(&self, url: &str) -> ProbeResponse {
        run_blocking(|| self.probe(url)).unwrap_or_else(|e| ProbeResponse::Error {
            error: e.to_string(),
        })
    }

    /// Blocking `download`. Progress is delivered on the calling thread.
    /// Must not be called from inside a tokio runtime.
    pub fn download_blocking(
        &self,
        url: &str,
        output_path: &str,
        format_selector: Option<&str>,
        sink: Option<&dyn ProgressSink>,
    ) -> DownloadOutcome {
        run_blocking(|| self.download(url, output_path, format_selector, sink)).unwrap_or_else(|e| {
            DownloadOutcome::Error {
                message: e.to_string(),
            }
        })
    }
}

fn validate_url(url: &str) -> Result<&str, DownloadError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(DownloadError::EmptyUrl);
    }
    Ok(trimmed)
}

/// Drive `make()` to completion on a current-thread runtime owned by this call.
/// Panics inside the engine are turned into errors.
fn run_blocking<F, Fut, T>(make: F) -> Result<T, DownloadError>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = T>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| DownloadError::ExecutionError(format!("Failed to start runtime: {}", e)))?;

    std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| runtime.block_on(make())))
        .map_err(|_| DownloadError::Unknown("engine panicked".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::downloader::traits::ProgressHook;

    /// Counts engine calls so validation paths can prove the engine was skipped
    struct CountingEngine {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MediaEngine for CountingEngine {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn probe(&self, _url: &str, _options: &EngineOptions) -> Result<Value, DownloadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!("not an object"))
        }

        async fn download(
            &self,
            _url: &str,
            _options: &EngineOptions,
            _on_progress: &mut ProgressHook<'_>,
        ) -> Result<i32, DownloadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        }
    }

    fn counting() -> (DownloadOrchestrator, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = CountingEngine { calls: calls.clone() };
        (DownloadOrchestrator::new(Box::new(engine)), calls)
    }

    #[tokio::test]
    async fn test_empty_url_skips_engine() {
        let (orchestrator, calls) = counting();

        let probe = orchestrator.probe("   ").await;
        assert_eq!(probe, ProbeResponse::Error { error: "URL must not be empty".to_string() });

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("a.mp4");
        let outcome = orchestrator.download("", out.to_str().unwrap(), None, None).await;
        assert!(!outcome.is_success());

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unwritable_path_skips_engine() {
        let (orchestrator, calls) = counting();
        let outcome = orchestrator
            .download("https://a.example/v", "/definitely/missing/dir/a.mp4", None, None)
            .await;

        match outcome {
            DownloadOutcome::Error { message } => assert!(message.contains("not writable")),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_non_object_probe_document_is_error() {
        let (orchestrator, calls) = counting();
        assert!(orchestrator.probe("https://a.example/v").await.is_error());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_blocking_wrappers() {
        let (orchestrator, _) = counting();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("a.mp4");
        let outcome = orchestrator.download_blocking("https://a.example/v", out.to_str().unwrap(), None, None);
        assert!(outcome.is_success());
        assert!(orchestrator.probe_blocking("https://a.example/v").is_error());
    }
}
