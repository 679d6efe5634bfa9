// Downloader module - host-facing orchestration over an external media engine

pub mod backends;
pub mod errors;
pub mod format_selector;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod traits;
pub mod utils;

pub use backends::YtDlpEngine;
pub use errors::{DownloadError, ErrorKind};
pub use format_selector::{FormatSelector, PREMUXED_BEST};
pub use models::{
    DownloadOutcome, EngineConfig, EngineOptions, EnginePolicy, FormatDescriptor, MediaInfo,
    ProbeResponse, ProgressEvent, ProgressStatus,
};
pub use orchestrator::DownloadOrchestrator;
pub use progress::EngineProgress;
pub use traits::{MediaEngine, NoopSink, ProgressForwarder, ProgressHook, ProgressSink, SinkError};
