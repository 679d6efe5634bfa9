// Helper functions for engine implementations

use std::path::Path;
use std::process::{Command as StdCommand, Output, Stdio};

use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::{timeout, Duration};

use super::errors::DownloadError;

/// Find the yt-dlp executable in common install locations, then on PATH
pub fn find_ytdlp() -> String {
    let mut candidates = vec![
        "/opt/homebrew/bin/yt-dlp".to_string(), // Homebrew on Apple Silicon
        "/usr/local/bin/yt-dlp".to_string(),    // Homebrew on Intel Mac
        "/usr/bin/yt-dlp".to_string(),
    ];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".local/bin/yt-dlp").to_string_lossy().to_string());
    }

    for path in candidates {
        if Path::new(&path).exists() {
            return path;
        }
    }

    if let Ok(output) = StdCommand::new("which").arg("yt-dlp").output() {
        if output.status.success() {
            if let Ok(path) = String::from_utf8(output.stdout) {
                let trimmed = path.trim();
                if !trimmed.is_empty() {
                    return trimmed.to_string();
                }
            }
        }
    }

    // Last resort: hope it's in PATH at spawn time
    "yt-dlp".to_string()
}

/// Run a command to completion, killing it after `timeout_secs`
pub async fn run_output_with_timeout(
    program: &str,
    args: &[String],
    timeout_secs: u64,
) -> Result<Output, DownloadError> {
    let mut child = TokioCommand::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| spawn_error(program, e))?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| DownloadError::ExecutionError(format!("Failed to capture stdout from {}", program)))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| DownloadError::ExecutionError(format!("Failed to capture stderr from {}", program)))?;

    // Drain both pipes concurrently so a chatty child never blocks on a full pipe
    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });

    match timeout(Duration::from_secs(timeout_secs), child.wait()).await {
        Ok(status) => {
            let status = status.map_err(|e| {
                DownloadError::ExecutionError(format!("Failed to wait for {}: {}", program, e))
            })?;
            let stdout = join_pipe(stdout_task, "stdout").await?;
            let stderr = join_pipe(stderr_task, "stderr").await?;
            Ok(Output { status, stdout, stderr })
        }
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(DownloadError::Timeout(format!("Timed out after {}s", timeout_secs)))
        }
    }
}

async fn join_pipe(
    task: tokio::task::JoinHandle<std::io::Result<Vec<u8>>>,
    name: &str,
) -> Result<Vec<u8>, DownloadError> {
    task.await
        .map_err(|e| DownloadError::ExecutionError(format!("{} task failed: {}", name, e)))?
        .map_err(|e| DownloadError::ExecutionError(format!("Failed to read {}: {}", name, e)))
}

/// Map a spawn failure, keeping "binary missing" distinguishable
pub fn spawn_error(program: &str, e: std::io::Error) -> DownloadError {
    if e.kind() == std::io::ErrorKind::NotFound {
        DownloadError::ToolNotFound(format!("{}: {}", program, e))
    } else {
        DownloadError::ExecutionError(format!("Failed to start {}: {}", program, e))
    }
}

/// Reject destinations whose directory is missing or read-only
pub fn ensure_writable_destination(output_path: &str) -> Result<(), DownloadError> {
    if output_path.trim().is_empty() {
        return Err(DownloadError::UnwritablePath("output path is empty".to_string()));
    }

    let path = Path::new(output_path);
    if path.is_dir() {
        return Err(DownloadError::UnwritablePath(format!("{} is a directory", output_path)));
    }

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let meta = std::fs::metadata(parent).map_err(|e| {
        DownloadError::UnwritablePath(format!("{}: {}", parent.display(), e))
    })?;

    if !meta.is_dir() {
        return Err(DownloadError::UnwritablePath(format!(
            "{} is not a directory",
            parent.display()
        )));
    }

    // Permission bits miss foreign owners and read-only mounts; try a real write
    tempfile::NamedTempFile::new_in(parent)
        .map(drop)
        .map_err(|e| DownloadError::UnwritablePath(format!("{}: {}", parent.display(), e)))
}

/// yt-dlp treats `-o` as a template; escape `%` so the path is taken literally
pub fn literal_output_template(path: &str) -> String {
    path.replace('%', "%%")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::errors::ErrorKind;

    #[test]
    fn test_destination_in_existing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.mp4");
        assert!(ensure_writable_destination(target.to_str().unwrap()).is_ok());
    }

    #[test]
    fn test_destination_missing_parent() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("missing").join("out.mp4");
        let err = ensure_writable_destination(target.to_str().unwrap()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_destination_is_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = ensure_writable_destination(dir.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, DownloadError::UnwritablePath(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_destination_in_read_only_dir() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let locked = dir.path().join("locked");
        std::fs::create_dir(&locked).unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o555)).unwrap();

        // Privileged users write through mode bits, so there is nothing to observe
        if std::fs::File::create(locked.join("check")).is_ok() {
            std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let target = locked.join("out.mp4");
        let err = ensure_writable_destination(target.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, DownloadError::UnwritablePath(_)));
        assert!(!target.exists());
        assert_eq!(std::fs::read_dir(&locked).unwrap().count(), 0);

        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_destination_check_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.mp4");
        ensure_writable_destination(target.to_str().unwrap()).unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_destination_empty() {
        assert!(ensure_writable_destination("  ").is_err());
    }

    #[test]
    fn test_literal_output_template() {
        assert_eq!(literal_output_template("/tmp/out.mp4"), "/tmp/out.mp4");
        assert_eq!(literal_output_template("/tmp/100%.mp4"), "/tmp/100%%.mp4");
    }

    #[tokio::test]
    async fn test_missing_program_is_tool_not_found() {
        let err = run_output_with_timeout("definitely-not-a-real-binary-xyz", &[], 5)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ToolNotFound);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_child() {
        let err = run_output_with_timeout("sleep", &["5".to_string()], 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_output() {
        let out = run_output_with_timeout("echo", &["hello".to_string()], 5).await.unwrap();
        assert!(out.status.success());
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "hello");
    }
}
