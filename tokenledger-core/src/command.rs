//! Command facade
//!
//! Single entry point for front ends: an [`AnalysisRequest`] goes in, a
//! [`CommandResult`] comes out. Fatal errors become `success: false` with the
//! error description and no partial report.

use crate::analysis::{aggregate, analyze_session, ReportFilter, UsageReport};
use crate::config::Config;
use crate::error::Result;
use crate::ingest::{load_sessions, SessionSelector, TranscriptLocator};
use crate::report::{render, OutputStyle, ReportView};
use serde::Serialize;
use std::path::PathBuf;

/// Everything one invocation needs besides the configuration.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    /// Working directory of the project whose transcripts are analyzed
    pub project: PathBuf,
    pub selector: SessionSelector,
    pub view: ReportView,
    pub style: OutputStyle,
    pub filter: ReportFilter,
}

impl AnalysisRequest {
    pub fn new(project: impl Into<PathBuf>) -> Self {
        Self {
            project: project.into(),
            selector: SessionSelector::default(),
            view: ReportView::default(),
            style: OutputStyle::default(),
            filter: ReportFilter::default(),
        }
    }

    pub fn selector(mut self, selector: SessionSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn view(mut self, view: ReportView) -> Self {
        self.view = view;
        self
    }

    pub fn style(mut self, style: OutputStyle) -> Self {
        self.style = style;
        self
    }

    pub fn filter(mut self, filter: ReportFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// Outcome handed back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct CommandResult {
    pub success: bool,
    /// Rendered report, or the error description
    pub message: String,
    /// Structured report on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl CommandResult {
    fn failure(message: String) -> Self {
        Self {
            success: false,
            message,
            payload: None,
        }
    }
}

/// Locate, parse, analyze and aggregate the requested sessions.
pub fn build_report(config: &Config, request: &AnalysisRequest) -> Result<UsageReport> {
    config.validate()?;

    let locator = TranscriptLocator::new(config.claude_root());
    let paths = locator.resolve(&request.project, &request.selector)?;
    tracing::debug!(
        project = %request.project.display(),
        transcripts = paths.len(),
        "Resolved transcripts"
    );

    let analyses = load_sessions(&paths)?
        .into_iter()
        .map(analyze_session)
        .collect();

    aggregate(analyses, &config.budget, &request.filter)
}

/// Run one analysis end to end.
pub fn run(config: &Config, request: &AnalysisRequest) -> CommandResult {
    let outcome = build_report(config, request).and_then(|report| {
        let message = render(&report, request.view, request.style)?;
        let payload = serde_json::to_value(&report)?;
        Ok((message, payload))
    });

    match outcome {
        Ok((message, payload)) => CommandResult {
            success: true,
            message,
            payload: Some(payload),
        },
        Err(e) => {
            tracing::error!(error = %e, "Analysis failed");
            CommandResult::failure(e.to_string())
        }
    }
}
