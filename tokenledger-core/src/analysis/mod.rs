//! Transcript analysis
//!
//! Turns the event stream of one session into task chains, todo lifecycles
//! and diagnostics, then aggregates sessions into a [`UsageReport`].
//!
//! ```text
//! SessionTranscript ──► check_usage ─────┐
//!        │                               │
//!        ├──► chains::reconstruct_chains ┼──► SessionAnalysis ──► aggregate ──► UsageReport
//!        │            │ membership       │
//!        └──► todos::track_todos ◄───────┘
//! ```
//!
//! Every stage is a pure function of its input. Nothing is cached between
//! runs, so analyzing an unchanged transcript twice gives identical ids and
//! totals.

pub mod aggregate;
pub mod chains;
pub mod todos;

pub use aggregate::{aggregate, ContextUsage, GrandTotals, ReportFilter, SessionReport, UsageReport};
pub use chains::{reconstruct_chains, ChainMembership, ChainReconstruction};
pub use todos::{track_todos, transition, TodoStep, TodoTracking};

pub use crate::diagnostics::{Anomaly, Diagnostics, IngestWarning, Subject};

use crate::ingest::SessionTranscript;
use crate::types::{Event, TaskChain, TodoItem, TokenUsage};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// Derived view of one session before aggregation.
#[derive(Debug, Clone)]
pub struct SessionAnalysis {
    pub session_id: String,
    pub path: PathBuf,
    pub found: bool,
    pub event_count: usize,
    /// Cumulative usage of the last event (zero for an empty session)
    pub current_usage: TokenUsage,
    pub chains: Vec<TaskChain>,
    pub todos: Vec<TodoItem>,
    pub diagnostics: Diagnostics,
}

/// Run the reconstructor and the tracker over one transcript.
pub fn analyze_session(transcript: SessionTranscript) -> SessionAnalysis {
    let mut diagnostics = Diagnostics {
        warnings: transcript.warnings,
        anomalies: check_usage(&transcript.events),
    };

    let reconstruction = reconstruct_chains(&transcript.events);
    let tracking = track_todos(&transcript.events, &reconstruction.membership);

    diagnostics.anomalies.extend(reconstruction.anomalies);
    diagnostics.anomalies.extend(tracking.anomalies);

    tracing::debug!(
        session_id = %transcript.session_id,
        events = transcript.events.len(),
        chains = reconstruction.chains.len(),
        todos = tracking.items.len(),
        anomalies = diagnostics.anomalies.len(),
        "Analyzed session"
    );

    SessionAnalysis {
        current_usage: transcript
            .events
            .last()
            .map(|e| e.cumulative_usage)
            .unwrap_or_default(),
        event_count: transcript.events.len(),
        session_id: transcript.session_id,
        path: transcript.path,
        found: transcript.found,
        chains: reconstruction.chains,
        todos: tracking.items,
        diagnostics,
    }
}

/// Flag every counter that decreases between consecutive events, and every
/// counter too large for signed delta arithmetic.
pub fn check_usage(events: &[Event]) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();
    let mut reported_range = Vec::new();
    for event in events {
        for counter in event.cumulative_usage.out_of_range_counters() {
            // Carried-forward values would repeat the same report
            if reported_range.contains(&counter) {
                continue;
            }
            reported_range.push(counter);
            tracing::warn!(line = event.line, counter = %counter, "Usage counter out of range");
            anomalies.push(Anomaly::UsageOutOfRange {
                line: event.line,
                counter,
                value: event.cumulative_usage.get(counter),
            });
        }
    }
    for pair in events.windows(2) {
        let (previous, current) = (&pair[0].cumulative_usage, &pair[1].cumulative_usage);
        for counter in current.decreased_counters(previous) {
            tracing::warn!(
                line = pair[1].line,
                counter = %counter,
                "Cumulative usage decreased"
            );
            anomalies.push(Anomaly::NonMonotonicUsage {
                line: pair[1].line,
                counter,
                previous: previous.get(counter),
                current: current.get(counter),
            });
        }
    }
    anomalies
}

/// Deterministic 16-hex-char identifier over the given parts.
///
/// Parts are NUL-separated so `("ab", "c")` and `("a", "bc")` differ.
pub fn stable_id(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([0u8]);
        }
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())[..16].to_string()
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::types::{Event, EventKind, TodoSnapshotEntry, TokenUsage, ToolUse};

    /// Terse event builder for analysis tests.
    pub struct EventBuilder {
        event: Event,
    }

    pub fn event(line: usize, uuid: &str) -> EventBuilder {
        EventBuilder {
            event: Event {
                line,
                kind: EventKind::Assistant,
                session_id: "session-1".to_string(),
                uuid: Some(uuid.to_string()),
                parent_uuid: None,
                is_side_chain: false,
                cumulative_usage: TokenUsage::default(),
                todo_snapshot: None,
                content: String::new(),
                tool_uses: Vec::new(),
                action: None,
                timestamp: None,
            },
        }
    }

    impl EventBuilder {
        pub fn parent(mut self, parent: &str) -> Self {
            self.event.parent_uuid = Some(parent.to_string());
            self
        }

        pub fn side(mut self) -> Self {
            self.event.is_side_chain = true;
            self
        }

        pub fn kind(mut self, kind: EventKind) -> Self {
            self.event.kind = kind;
            self
        }

        pub fn input(mut self, input_tokens: u64) -> Self {
            self.event.cumulative_usage.input_tokens = input_tokens;
            self
        }

        pub fn content(mut self, content: &str) -> Self {
            self.event.content = content.to_string();
            self
        }

        pub fn session(mut self, session_id: &str) -> Self {
            self.event.session_id = session_id.to_string();
            self
        }

        pub fn tool(mut self, name: &str, description: Option<&str>) -> Self {
            self.event.tool_uses.push(ToolUse {
                name: name.to_string(),
                description: description.map(str::to_string),
                prompt: None,
            });
            self
        }

        pub fn task(mut self, description: &str, prompt: &str) -> Self {
            self.event.tool_uses.push(ToolUse {
                name: "Task".to_string(),
                description: Some(description.to_string()),
                prompt: Some(prompt.to_string()),
            });
            self
        }

        pub fn action(mut self, action: &str) -> Self {
            self.event.action = Some(action.to_string());
            self
        }

        pub fn todo(mut self, id: &str, content: &str, status: &str) -> Self {
            self.event
                .todo_snapshot
                .get_or_insert_with(Vec::new)
                .push(TodoSnapshotEntry {
                    item_id: id.to_string(),
                    content: content.to_string(),
                    status: status.to_string(),
                    priority: "medium".to_string(),
                });
            self
        }

        pub fn build(self) -> Event {
            self.event
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::event;
    use super::*;
    use crate::types::UsageCounter;

    #[test]
    fn test_stable_id_is_deterministic() {
        let a = stable_id(&["Fix parser", "1", "session-1", ""]);
        let b = stable_id(&["Fix parser", "1", "session-1", ""]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert_ne!(a, stable_id(&["Fix parser", "1", "session-2", ""]));
        assert_ne!(stable_id(&["ab", "c"]), stable_id(&["a", "bc"]));
    }

    #[test]
    fn test_check_usage_flags_decrease() {
        let events = vec![
            event(1, "a").input(100).build(),
            event(2, "b").input(150).build(),
            event(3, "c").input(40).build(),
        ];

        let anomalies = check_usage(&events);
        assert_eq!(
            anomalies,
            vec![Anomaly::NonMonotonicUsage {
                line: 3,
                counter: UsageCounter::Input,
                previous: 150,
                current: 40,
            }]
        );
    }

    #[test]
    fn test_analyze_session_collects_everything() {
        let transcript = SessionTranscript {
            session_id: "session-1".to_string(),
            path: PathBuf::from("session-1.jsonl"),
            found: true,
            events: vec![
                event(1, "a").input(100).todo("1", "Todo item", "pending").build(),
                event(2, "b").parent("a").side().input(200).build(),
                event(3, "c").input(90).build(),
            ],
            warnings: vec![IngestWarning::MalformedLine {
                line: 4,
                message: "EOF".to_string(),
            }],
        };

        let analysis = analyze_session(transcript);
        assert_eq!(analysis.event_count, 3);
        assert_eq!(analysis.current_usage.input_tokens, 90);
        assert_eq!(analysis.chains.len(), 1);
        assert_eq!(analysis.todos.len(), 1);
        assert_eq!(analysis.diagnostics.warnings.len(), 1);
        // decrease at line 3 plus the unclosed chain
        assert_eq!(analysis.diagnostics.anomalies.len(), 2);
    }

    #[test]
    fn test_out_of_range_usage_is_flagged_not_fatal() {
        use crate::config::BudgetConfig;
        use crate::ingest::parse_lines;
        use crate::report::{render, OutputStyle, ReportView};
        use std::io::Cursor;

        let text = concat!(
            r#"{"type":"user","uuid":"u1","message":{"content":"go"}}"#,
            "\n",
            r#"{"type":"assistant","uuid":"s1","parentUuid":"u1","isSidechain":true,"message":{"usage":{"input_tokens":18446744073709551615,"cache_read_input_tokens":18446744073709551615}}}"#,
            "\n",
            r#"{"type":"result","uuid":"s2","parentUuid":"s1","isSidechain":true}"#,
            "\n",
        );
        let transcript = parse_lines(Cursor::new(text), "huge");
        assert!(transcript.warnings.is_empty());

        let analysis = analyze_session(transcript);
        assert_eq!(
            analysis.diagnostics.anomalies[0],
            Anomaly::UsageOutOfRange {
                line: 2,
                counter: UsageCounter::Input,
                value: u64::MAX,
            }
        );
        assert_eq!(analysis.chains[0].delta_usage.context_tokens(), i64::MAX);

        let report = aggregate(vec![analysis], &BudgetConfig::default(), &ReportFilter::default())
            .unwrap();
        assert_eq!(report.sessions[0].context.total, u64::MAX);
        assert!(report.has_integrity_violations());
        for view in [ReportView::Context, ReportView::Unified] {
            for style in [OutputStyle::Full, OutputStyle::Brief, OutputStyle::Json] {
                assert!(render(&report, view, style).is_ok());
            }
        }
    }
}
