// Error types for the orchestrator and its engines

use serde::Serialize;
use thiserror::Error;

/// Coarse classification of a failure, used for logging and by callers that
/// need to branch on the failure class rather than on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Rejected before the engine was called (empty URL, unwritable path)
    InvalidInput,
    Network,
    Timeout,
    /// Unsupported URL, removed/private/restricted content
    Unavailable,
    Filesystem,
    FormatSelection,
    /// Engine finished with a non-zero completion code and no message
    EngineExit,
    ToolNotFound,
    Parse,
    Unknown,
}

#[derive(Debug, Clone, Error)]
pub enum DownloadError {
    #[error("URL must not be empty")]
    EmptyUrl,

    #[error("Output path is not writable: {0}")]
    UnwritablePath(String),

    /// Connection refused, DNS failure, HTTP errors from the remote
    #[error("{0}")]
    Network(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    UnsupportedUrl(String),

    /// Removed, private, geo-blocked or otherwise unavailable content
    #[error("{0}")]
    Unavailable(String),

    /// Disk full, permission denied, cannot open output for writing
    #[error("{0}")]
    Filesystem(String),

    #[error("{0}")]
    InvalidFormat(String),

    #[error("yt-dlp returned error code {0}")]
    EngineExit(i32),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("{0}")]
    Unknown(String),
}

impl DownloadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyUrl | Self::UnwritablePath(_) => ErrorKind::InvalidInput,
            Self::Network(_) => ErrorKind::Network,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::UnsupportedUrl(_) | Self::Unavailable(_) => ErrorKind::Unavailable,
            Self::Filesystem(_) => ErrorKind::Filesystem,
            Self::InvalidFormat(_) => ErrorKind::FormatSelection,
            Self::EngineExit(_) => ErrorKind::EngineExit,
            Self::ToolNotFound(_) => ErrorKind::ToolNotFound,
            Self::ParseError(_) => ErrorKind::Parse,
            Self::ExecutionError(_) | Self::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// Classify a message reported by the engine (typically its `ERROR:` line).
    ///
    /// The message text is kept as-is so the host can display it directly.
    pub fn from_engine_message(message: &str) -> Self {
        let text = message.trim().to_string();
        let lower = text.to_lowercase();

        if lower.contains("unsupported url") {
            return Self::UnsupportedUrl(text);
        }

        // Must precede the generic "not available" check below
        if lower.contains("requested format is not available")
            || lower.contains("invalid format")
            || lower.contains("format specification")
        {
            return Self::InvalidFormat(text);
        }

        if lower.contains("no space left")
            || lower.contains("permission denied")
            || lower.contains("read-only file system")
            || lower.contains("unable to open for writing")
            || lower.contains("unable to write")
        {
            return Self::Filesystem(text);
        }

        if lower.contains("video unavailable")
            || lower.contains("has been removed")
            || lower.contains("private video")
            || lower.contains("not available")
            || lower.contains("http error 404")
            || lower.contains("drm")
        {
            return Self::Unavailable(text);
        }

        if lower.contains("unable to download webpage")
            || lower.contains("http error")
            || lower.contains("connection")
            || lower.contains("name or service not known")
            || lower.contains("network is unreachable")
            || lower.contains("getaddrinfo")
            || lower.contains("ssl")
        {
            return Self::Network(text);
        }

        // After the network checks: socket read timeouts are network failures
        if lower.contains("timed out") || lower.contains("timeout") {
            return Self::Timeout(text);
        }

        Self::Unknown(text)
    }
}

impl From<String> for DownloadError {
    fn from(s: String) -> Self {
        Self::from_engine_message(&s)
    }
}

impl From<std::io::Error> for DownloadError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Self::ToolNotFound(e.to_string()),
            std::io::ErrorKind::TimedOut => Self::Timeout(e.to_string()),
            _ => Self::ExecutionError(e.to_string()),
        }
    }
}
