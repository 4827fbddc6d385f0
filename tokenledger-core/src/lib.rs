//! # tokenledger-core
//!
//! Core library for tokenledger - token accounting for AI coding agent
//! transcripts.
//!
//! This library provides:
//! - Transcript discovery and JSONL parsing
//! - Task chain reconstruction and todo lifecycle tracking
//! - Per-session and grand-total usage aggregation against a context budget
//! - Report rendering (full, brief and JSON)
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! Everything is derived on demand from the transcript files:
//! - **Ingest:** transcript lines become [`Event`]s with cumulative usage
//! - **Analysis:** events become [`TaskChain`]s, [`TodoItem`]s and diagnostics
//! - **Report:** analyzed sessions are aggregated and rendered
//!
//! ## Example
//!
//! ```rust,no_run
//! use tokenledger_core::command::{run, AnalysisRequest};
//! use tokenledger_core::report::OutputStyle;
//! use tokenledger_core::Config;
//!
//! let config = Config::load().expect("failed to load config");
//! let request = AnalysisRequest::new("/work/app").style(OutputStyle::Brief);
//! let result = run(&config, &request);
//! println!("{}", result.message);
//! ```

// Re-export commonly used items at the crate root
pub use analysis::{analyze_session, ReportFilter, UsageReport};
pub use command::{AnalysisRequest, CommandResult};
pub use config::Config;
pub use error::{Error, Result};
pub use ingest::{SessionSelector, TranscriptLocator};
pub use report::{OutputStyle, ReportView};
pub use types::*;

// Public modules
pub mod analysis;
pub mod command;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod format;
pub mod ingest;
pub mod logging;
pub mod report;
pub mod types;
