//! Non-fatal conditions collected during a run.
//!
//! Warnings and anomalies never stop the analysis. They are accumulated per
//! session and returned with the report so every human-readable view can
//! print them and the structured view carries them verbatim.

use crate::types::{TodoStatus, UsageCounter};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Problem reading a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IngestWarning {
    /// The transcript file does not exist
    NotFound { path: PathBuf },
    /// A line could not be read or decoded (often a trailing partial write)
    MalformedLine { line: usize, message: String },
}

impl fmt::Display for IngestWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestWarning::NotFound { path } => {
                write!(f, "transcript not found: {}", path.display())
            }
            IngestWarning::MalformedLine { line, message } => {
                write!(f, "line {}: skipped malformed record: {}", line, message)
            }
        }
    }
}

/// Which derived record an integrity violation belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Subject {
    Chain(String),
    Todo(String),
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Chain(id) => write!(f, "chain {}", id),
            Subject::Todo(id) => write!(f, "todo {}", id),
        }
    }
}

/// Lifecycle or integrity problem found while analyzing a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    /// A cumulative counter went down between two consecutive events
    NonMonotonicUsage {
        line: usize,
        counter: UsageCounter,
        previous: u64,
        current: u64,
    },
    /// A counter is too large for signed delta arithmetic; deltas over it
    /// are clamped
    UsageOutOfRange {
        line: usize,
        counter: UsageCounter,
        value: u64,
    },
    /// A todo snapshot moved an item backwards; the transition was not applied
    OutOfOrderTransition {
        unique_id: String,
        line: usize,
        from: TodoStatus,
        to: TodoStatus,
    },
    /// A todo snapshot carried a status outside pending/in_progress/completed
    UnrecognizedStatus {
        item_id: String,
        line: usize,
        status: String,
    },
    /// A chain never reached a closing `result` event
    OpenChain { chain_id: String },
    /// A chain started while another chain was still accumulating; the
    /// earlier chain's window is cut at the later root
    OverlappingChains { chain_id: String, overlaps: String },
    /// A computed delta came out negative
    IntegrityViolation {
        subject: Subject,
        counters: Vec<UsageCounter>,
    },
}

impl Anomaly {
    /// Integrity problems need investigation; lifecycle ones are expected.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            Anomaly::NonMonotonicUsage { .. }
                | Anomaly::UsageOutOfRange { .. }
                | Anomaly::IntegrityViolation { .. }
        )
    }
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::NonMonotonicUsage {
                line,
                counter,
                previous,
                current,
            } => write!(
                f,
                "line {}: {} decreased from {} to {}",
                line, counter, previous, current
            ),
            Anomaly::UsageOutOfRange {
                line,
                counter,
                value,
            } => write!(
                f,
                "INTEGRITY: line {}: {} value {} is out of range",
                line, counter, value
            ),
            Anomaly::OutOfOrderTransition {
                unique_id,
                line,
                from,
                to,
            } => write!(
                f,
                "line {}: todo {} moved {} -> {}, ignored",
                line, unique_id, from, to
            ),
            Anomaly::UnrecognizedStatus {
                item_id,
                line,
                status,
            } => write!(
                f,
                "line {}: todo {} has unrecognized status {:?}",
                line, item_id, status
            ),
            Anomaly::OpenChain { chain_id } => {
                write!(f, "chain {} has no closing result event", chain_id)
            }
            Anomaly::OverlappingChains { chain_id, overlaps } => write!(
                f,
                "chain {} started while chain {} was still open; the earlier window ends at this root",
                chain_id, overlaps
            ),
            Anomaly::IntegrityViolation { subject, counters } => {
                let names: Vec<&str> = counters.iter().map(|c| c.as_str()).collect();
                write!(
                    f,
                    "INTEGRITY: {} has a negative delta in {}",
                    subject,
                    names.join(", ")
                )
            }
        }
    }
}

/// Everything non-fatal observed for one session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    pub warnings: Vec<IngestWarning>,
    pub anomalies: Vec<Anomaly>,
}

impl Diagnostics {
    pub fn integrity_violations(&self) -> impl Iterator<Item = &Anomaly> {
        self.anomalies.iter().filter(|a| a.is_integrity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integrity_classification() {
        let violation = Anomaly::IntegrityViolation {
            subject: Subject::Chain("abc".to_string()),
            counters: vec![UsageCounter::Input],
        };
        let open = Anomaly::OpenChain {
            chain_id: "abc".to_string(),
        };
        assert!(violation.is_integrity());
        assert!(!open.is_integrity());

        let diagnostics = Diagnostics {
            warnings: vec![],
            anomalies: vec![violation, open],
        };
        assert_eq!(diagnostics.integrity_violations().count(), 1);
    }

    #[test]
    fn test_display_is_single_line() {
        let anomaly = Anomaly::IntegrityViolation {
            subject: Subject::Todo("t1".to_string()),
            counters: vec![UsageCounter::Input, UsageCounter::Output],
        };
        assert_eq!(
            anomaly.to_string(),
            "INTEGRITY: todo t1 has a negative delta in input_tokens, output_tokens"
        );

        let warning = IngestWarning::MalformedLine {
            line: 7,
            message: "EOF while parsing".to_string(),
        };
        assert_eq!(
            warning.to_string(),
            "line 7: skipped malformed record: EOF while parsing"
        );
    }
}
