// yt-dlp engine - drives the yt-dlp executable as a subprocess
//
// probe:    --dump-single-json, bounded by the configured timeout
// download: --progress-template emitting one JSON record per line; classic
//           "[download] 45.0% of ..." lines are parsed as a fallback

use std::collections::VecDeque;
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::downloader::errors::DownloadError;
use crate::downloader::models::{EngineConfig, EngineOptions};
use crate::downloader::progress::{self, EngineProgress};
use crate::downloader::traits::{MediaEngine, ProgressHook};
use crate::downloader::utils::{run_output_with_timeout, spawn_error};

/// Lines of stderr kept for error reporting
const STDERR_TAIL: usize = 50;

pub struct YtDlpEngine {
    config: EngineConfig,
}

impl YtDlpEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Flags shared by probe and download
    fn option_args(&self, options: &EngineOptions) -> Vec<String> {
        let mut args = Vec::new();

        if options.quiet {
            args.push("--quiet".to_string());
        }
        if options.no_warnings {
            args.push("--no-warnings".to_string());
        }
        if options.extract_flat {
            args.push("--flat-playlist".to_string());
        }
        if options.ignore_errors {
            args.push("--ignore-errors".to_string());
        } else {
            args.push("--abort-on-error".to_string());
        }
        if options.skip_certificate_check {
            args.push("--no-check-certificates".to_string());
        }
        if !options.prefer_external_remux {
            // Fixups would need ffmpeg, which is not assumed to exist
            args.push("--fixup".to_string());
            args.push("never".to_string());
        }
        if let Some(format) = &options.format {
            args.push("-f".to_string());
            args.push(format.clone());
        }
        if let Some(template) = &options.output_template {
            args.push("-o".to_string());
            args.push(template.clone());
        }
        if let Some(timeout) = self.config.socket_timeout_secs {
            args.push("--socket-timeout".to_string());
            args.push(timeout.to_string());
        }
        if let Some(proxy) = &self.config.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }

        args.push("--no-playlist".to_string());
        args
    }

    pub fn probe_args(&self, url: &str, options: &EngineOptions) -> Vec<String> {
        let mut args = self.option_args(options);
        args.push("--dump-single-json".to_string());
        args.push("--".to_string());
        args.push(url.to_string());
        args
    }

    pub fn download_args(&self, url: &str, options: &EngineOptions) -> Vec<String> {
        let mut args = self.option_args(options);
        args.extend([
            "--newline".to_string(),
            // Keeps progress output alive under --quiet
            "--progress".to_string(),
            "--progress-template".to_string(),
            progress::progress_template(),
            "--".to_string(),
            url.to_string(),
        ]);
        args
    }

    /// `yt-dlp --version`
    pub async fn version(&self) -> Result<String, DownloadError> {
        let output =
            run_output_with_timeout(&self.config.binary_path, &["--version".to_string()], 15).await?;
        if !output.status.success() {
            return Err(DownloadError::ExecutionError(format!(
                "{} --version exited with {:?}",
                self.config.binary_path,
                output.status.code()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    pub async fn is_available(&self) -> bool {
        self.version().await.is_ok()
    }
}

impl Default for YtDlpEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// Last `ERROR:` line the engine printed, if any
fn engine_error_message<'a, I>(lines: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
    I::IntoIter: DoubleEndedIterator,
{
    lines
        .into_iter()
        .rev()
        .map(str::trim)
        .find(|l| l.starts_with("ERROR:"))
        .map(|l| l.to_string())
}

/// One output stream of the child, split into lines decoded as lossy UTF-8.
///
/// `next_line` is safe to cancel inside `select!`: a partial line stays in
/// `buf` until the rest of it arrives.
struct LineReader<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
    open: bool,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            buf: Vec::new(),
            open: true,
        }
    }

    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        let read = self.reader.read_until(b'\n', &mut self.buf).await?;
        if read == 0 && self.buf.is_empty() {
            self.open = false;
            return Ok(None);
        }

        let line = String::from_utf8_lossy(&self.buf)
            .trim_end_matches(&['\r', '\n'][..])
            .to_string();
        self.buf.clear();
        Ok(Some(line))
    }
}

/// Tracks the current destination so ticks without a filename can be labeled
struct LineHandler<'h, 'a> {
    hook: &'h mut ProgressHook<'a>,
    destination: Option<String>,
}

impl LineHandler<'_, '_> {
    /// Returns true when the line was progress output
    fn handle(&mut self, line: &str) -> bool {
        if let Some(dest) = progress::parse_destination(line) {
            tracing::debug!("[yt-dlp] destination: {}", dest);
            self.destination = Some(dest);
            return true;
        }

        match progress::parse_progress_line(line) {
            Some(mut tick) => {
                if tick.filename.is_none() {
                    tick.filename = self.destination.clone();
                }
                self.forward(tick);
                true
            }
            None => false,
        }
    }

    fn forward(&mut self, tick: EngineProgress) {
        (self.hook)(tick);
    }
}

#[async_trait]
impl MediaEngine for YtDlpEngine {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn probe(&self, url: &str, options: &EngineOptions) -> Result<Value, DownloadError> {
        let args = self.probe_args(url, options);
        tracing::debug!("[yt-dlp] probe: {} {}", self.config.binary_path, args.join(" "));

        let output =
            run_output_with_timeout(&self.config.binary_path, &args, self.config.probe_timeout_secs)
                .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(match engine_error_message(stderr.lines()) {
                Some(message) => DownloadError::from_engine_message(&message),
                None => DownloadError::EngineExit(output.status.code().unwrap_or(-1)),
            });
        }

        serde_json::from_slice::<Value>(&output.stdout)
            .map_err(|e| DownloadError::ParseError(format!("Invalid JSON from yt-dlp: {}", e)))
    }

    async fn download(
        &self,
        url: &str,
        options: &EngineOptions,
        on_progress: &mut ProgressHook<'_>,
    ) -> Result<i32, DownloadError> {
        let args = self.download_args(url, options);
        tracing::info!("[yt-dlp] download: {} {}", self.config.binary_path, args.join(" "));

        let mut child = Command::new(&self.config.binary_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(&self.config.binary_path, e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DownloadError::ExecutionError("Failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DownloadError::ExecutionError("Failed to capture stderr".to_string()))?;

        let mut stdout = LineReader::new(stdout);
        let mut stderr = LineReader::new(stderr);
        let mut stderr_tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL);
        let mut read_error = None;
        let mut handler = LineHandler {
            hook: on_progress,
            destination: None,
        };

        // Progress goes to stderr under --quiet, so both streams are parsed.
        // Both pipes are drained until EOF so the child never blocks on a full pipe.
        while stdout.open || stderr.open {
            tokio::select! {
                line = stdout.next_line(), if stdout.open => match line {
                    Ok(Some(l)) => {
                        if !handler.handle(&l) {
                            tracing::debug!("[yt-dlp] {}", l);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        read_error = Some(e);
                        break;
                    }
                },
                line = stderr.next_line(), if stderr.open => match line {
                    Ok(Some(l)) => {
                        if !handler.handle(&l) {
                            tracing::debug!("[yt-dlp] stderr: {}", l);
                            if stderr_tail.len() == STDERR_TAIL {
                                stderr_tail.pop_front();
                            }
                            stderr_tail.push_back(l);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        read_error = Some(e);
                        break;
                    }
                },
            }
        }

        if let Some(e) = read_error {
            tracing::warn!("[yt-dlp] ✗ lost output stream, stopping download: {}", e);
            let _ = child.kill().await;
            return Err(DownloadError::ExecutionError(format!(
                "Failed to read yt-dlp output: {}",
                e
            )));
        }

        let status = child
            .wait()
            .await
            .map_err(|e| DownloadError::ExecutionError(format!("Process error: {}", e)))?;

        if status.success() {
            return Ok(0);
        }

        let code = status.code().unwrap_or(-1);
        match engine_error_message(stderr_tail.iter().map(String::as_str)) {
            Some(message) => {
                tracing::warn!("[yt-dlp] exited with {}: {}", code, message);
                Err(DownloadError::from_engine_message(&message))
            }
            None => Ok(code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::models::EnginePolicy;

    fn engine() -> YtDlpEngine {
        YtDlpEngine::new(
            EngineConfig::default()
                .with_binary_path("yt-dlp")
                .with_socket_timeout(Some(15))
                .with_proxy(Some("socks5://127.0.0.1:1080".to_string())),
        )
    }

    #[test]
    fn test_probe_args() {
        let args = engine().probe_args("https://a.example/v", &EngineOptions::for_probe(EnginePolicy::default()));

        assert!(args.contains(&"--quiet".to_string()));
        assert!(args.contains(&"--no-warnings".to_string()));
        assert!(args.contains(&"--dump-single-json".to_string()));
        assert!(args.contains(&"--abort-on-error".to_string()));
        assert!(!args.contains(&"--flat-playlist".to_string()));
        assert!(!args.contains(&"--no-check-certificates".to_string()));
        assert!(!args.contains(&"-f".to_string()));
        assert_eq!(args[args.len() - 2], "--");
        assert_eq!(args.last().map(String::as_str), Some("https://a.example/v"));

        let proxy_idx = args.iter().position(|a| a == "--proxy").unwrap();
        assert_eq!(args[proxy_idx + 1], "socks5://127.0.0.1:1080");
    }

    #[test]
    fn test_download_args() {
        let options = EngineOptions::for_download(
            EnginePolicy::default(),
            "best[ext=mp4]/best".to_string(),
            "/tmp/out.mp4".to_string(),
        );
        let args = engine().download_args("https://a.example/v", &options);

        let f_idx = args.iter().position(|a| a == "-f").unwrap();
        assert_eq!(args[f_idx + 1], "best[ext=mp4]/best");
        let o_idx = args.iter().position(|a| a == "-o").unwrap();
        assert_eq!(args[o_idx + 1], "/tmp/out.mp4");
        let fixup_idx = args.iter().position(|a| a == "--fixup").unwrap();
        assert_eq!(args[fixup_idx + 1], "never");
        assert!(args.contains(&"--newline".to_string()));
        assert!(args.contains(&progress::progress_template()));
    }

    #[test]
    fn test_policy_flags() {
        let policy = EnginePolicy {
            ignore_errors: true,
            skip_certificate_check: true,
            prefer_external_remux: true,
        };
        let args = engine().probe_args("u", &EngineOptions::for_probe(policy));
        assert!(args.contains(&"--ignore-errors".to_string()));
        assert!(args.contains(&"--no-check-certificates".to_string()));
        assert!(!args.contains(&"--fixup".to_string()));
    }

    #[test]
    fn test_engine_error_message() {
        let stderr = "WARNING: something\nERROR: first\nnoise\nERROR: [generic] Unsupported URL: x\n";
        assert_eq!(
            engine_error_message(stderr.lines()).as_deref(),
            Some("ERROR: [generic] Unsupported URL: x")
        );
        assert_eq!(engine_error_message("all good".lines()), None);
    }

    #[tokio::test]
    async fn test_line_reader_decodes_lossily() {
        let raw: &[u8] = b"caf\xff\nnext\r\npartial";
        let mut reader = LineReader::new(raw);

        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("caf\u{FFFD}"));
        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("next"));
        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("partial"));
        assert!(reader.open);
        assert_eq!(reader.next_line().await.unwrap(), None);
        assert!(!reader.open);
    }

    #[test]
    fn test_line_handler_labels_ticks_with_destination() {
        let mut seen = Vec::new();
        {
            let mut hook = |tick: EngineProgress| seen.push(tick);
            let mut handler = LineHandler { hook: &mut hook, destination: None };

            assert!(handler.handle("[download] Destination: /tmp/clip.mp4"));
            assert!(handler.handle("[download]  50.0% of 2.00KiB at 1.00KiB/s ETA 00:01"));
            assert!(!handler.handle("[info] Downloading 1 format(s): 18"));
        }

        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].filename.as_deref(), Some("/tmp/clip.mp4"));
    }
}
