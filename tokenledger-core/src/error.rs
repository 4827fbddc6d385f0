//! Error types for tokenledger-core
//!
//! Only fatal conditions live here. Recoverable problems (malformed lines,
//! missing files, lifecycle anomalies) are collected in
//! [`Diagnostics`](crate::analysis::Diagnostics) and returned alongside a
//! successful report.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the tokenledger-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// No transcript could be found for the requested selection
    #[error("no transcripts found in {}", .0.display())]
    NoTranscripts(PathBuf),

    /// Session not found
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Task name filter is not a valid regular expression
    #[error("invalid task pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Context budget is unusable
    #[error("context budget unavailable: {0}")]
    Budget(String),

    /// A report writer failed
    #[error("failed to render report: {0}")]
    Render(#[from] std::fmt::Error),
}

/// Result type alias for tokenledger-core
pub type Result<T> = std::result::Result<T, Error>;
