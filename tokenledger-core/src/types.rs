//! Core domain types for tokenledger
//!
//! Every type here is a read-only projection rebuilt from the transcript files
//! on each invocation. Nothing is persisted.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Cumulative usage** | Running total of a token counter as of one event |
//! | **Delta** | Difference between two cumulative snapshots |
//! | **Side chain** | Nested unit of work spawned from the main conversation trunk |
//! | **Context budget** | Cumulative context the agent allows before it compacts |
//! | **Unknown todo** | Work item whose lifecycle bounds could not be established |
//!
//! ## Cumulative vs delta
//!
//! [`TokenUsage`] is a snapshot and is never shown as "tokens used" by a chain
//! or todo. [`UsageDelta`] can only be produced by subtracting two snapshots
//! ([`TokenUsage::delta_since`]) or by summing such differences, so every
//! per-item figure in a report is a delta by construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

// ============================================
// Token counters
// ============================================

/// One of the four token counters carried by a transcript `usage` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageCounter {
    Input,
    CacheCreation,
    CacheRead,
    Output,
}

impl UsageCounter {
    pub const ALL: [UsageCounter; 4] = [
        UsageCounter::Input,
        UsageCounter::CacheCreation,
        UsageCounter::CacheRead,
        UsageCounter::Output,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UsageCounter::Input => "input_tokens",
            UsageCounter::CacheCreation => "cache_creation_input_tokens",
            UsageCounter::CacheRead => "cache_read_input_tokens",
            UsageCounter::Output => "output_tokens",
        }
    }
}

impl fmt::Display for UsageCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cumulative token counters as of a single event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub cache_creation_input_tokens: u64,
    pub cache_read_input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn get(&self, counter: UsageCounter) -> u64 {
        match counter {
            UsageCounter::Input => self.input_tokens,
            UsageCounter::CacheCreation => self.cache_creation_input_tokens,
            UsageCounter::CacheRead => self.cache_read_input_tokens,
            UsageCounter::Output => self.output_tokens,
        }
    }

    /// Tokens occupying the context window: input plus both cache counters.
    pub fn context_tokens(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.cache_creation_input_tokens)
            .saturating_add(self.cache_read_input_tokens)
    }

    /// Usage accumulated between `start` and this snapshot.
    ///
    /// Signed per counter: a negative result means the input was not
    /// monotonic (or a snapshot was misattributed) and must be reported.
    pub fn delta_since(&self, start: &TokenUsage) -> UsageDelta {
        let diff = |counter: UsageCounter| {
            saturating_i64(self.get(counter) as i128 - start.get(counter) as i128)
        };
        UsageDelta {
            input_tokens: diff(UsageCounter::Input),
            cache_creation_input_tokens: diff(UsageCounter::CacheCreation),
            cache_read_input_tokens: diff(UsageCounter::CacheRead),
            output_tokens: diff(UsageCounter::Output),
        }
    }

    /// Counters whose value a signed delta cannot represent.
    pub fn out_of_range_counters(&self) -> Vec<UsageCounter> {
        UsageCounter::ALL
            .into_iter()
            .filter(|c| self.get(*c) > MAX_COUNTER)
            .collect()
    }

    /// Counters that went down between `previous` and this snapshot.
    pub fn decreased_counters(&self, previous: &TokenUsage) -> Vec<UsageCounter> {
        UsageCounter::ALL
            .into_iter()
            .filter(|c| self.get(*c) < previous.get(*c))
            .collect()
    }
}

/// Largest counter value a [`UsageDelta`] represents exactly.
pub const MAX_COUNTER: u64 = i64::MAX as u64;

/// Clamp a wide intermediate into `i64`.
pub(crate) fn saturating_i64(value: i128) -> i64 {
    i64::try_from(value).unwrap_or(if value < 0 { i64::MIN } else { i64::MAX })
}

/// Difference between two cumulative snapshots.
///
/// Fields are private so a delta cannot be fabricated from a raw snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageDelta {
    input_tokens: i64,
    cache_creation_input_tokens: i64,
    cache_read_input_tokens: i64,
    output_tokens: i64,
}

impl UsageDelta {
    pub fn get(&self, counter: UsageCounter) -> i64 {
        match counter {
            UsageCounter::Input => self.input_tokens,
            UsageCounter::CacheCreation => self.cache_creation_input_tokens,
            UsageCounter::CacheRead => self.cache_read_input_tokens,
            UsageCounter::Output => self.output_tokens,
        }
    }

    pub fn input_tokens(&self) -> i64 {
        self.input_tokens
    }

    pub fn cache_creation_input_tokens(&self) -> i64 {
        self.cache_creation_input_tokens
    }

    pub fn cache_read_input_tokens(&self) -> i64 {
        self.cache_read_input_tokens
    }

    pub fn output_tokens(&self) -> i64 {
        self.output_tokens
    }

    /// Headline figure: change in context tokens over the interval.
    pub fn context_tokens(&self) -> i64 {
        self.input_tokens
            .saturating_add(self.cache_creation_input_tokens)
            .saturating_add(self.cache_read_input_tokens)
    }

    /// Counters whose delta is negative (integrity violations).
    pub fn negative_counters(&self) -> Vec<UsageCounter> {
        UsageCounter::ALL
            .into_iter()
            .filter(|c| self.get(*c) < 0)
            .collect()
    }
}

impl Add for UsageDelta {
    type Output = UsageDelta;

    fn add(self, rhs: UsageDelta) -> UsageDelta {
        UsageDelta {
            input_tokens: self.input_tokens.saturating_add(rhs.input_tokens),
            cache_creation_input_tokens: self
                .cache_creation_input_tokens
                .saturating_add(rhs.cache_creation_input_tokens),
            cache_read_input_tokens: self
                .cache_read_input_tokens
                .saturating_add(rhs.cache_read_input_tokens),
            output_tokens: self.output_tokens.saturating_add(rhs.output_tokens),
        }
    }
}

impl AddAssign for UsageDelta {
    fn add_assign(&mut self, rhs: UsageDelta) {
        *self = *self + rhs;
    }
}

impl Sum for UsageDelta {
    fn sum<I: Iterator<Item = UsageDelta>>(iter: I) -> Self {
        iter.fold(UsageDelta::default(), Add::add)
    }
}

impl<'a> Sum<&'a UsageDelta> for UsageDelta {
    fn sum<I: Iterator<Item = &'a UsageDelta>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

// ============================================
// Events
// ============================================

/// Record kind of a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Assistant,
    User,
    Result,
    Other,
}

impl EventKind {
    pub fn from_record_type(record_type: Option<&str>) -> Self {
        match record_type {
            Some("assistant") => EventKind::Assistant,
            Some("user") => EventKind::User,
            Some("result") => EventKind::Result,
            _ => EventKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Assistant => "assistant",
            EventKind::User => "user",
            EventKind::Result => "result",
            EventKind::Other => "other",
        }
    }
}

/// One work item as it appeared in a single todo snapshot.
///
/// `status` is kept verbatim; the tracker decides what it means.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoSnapshotEntry {
    pub item_id: String,
    pub content: String,
    pub status: String,
    pub priority: String,
}

/// A tool invocation found in a message's content blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolUse {
    pub name: String,
    /// `input.description`, present on `Task` and `Bash` calls
    pub description: Option<String>,
    /// `input.prompt`, present on `Task` calls
    pub prompt: Option<String>,
}

/// One parsed transcript line.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    /// 1-based line number in the source file
    pub line: usize,
    pub kind: EventKind,
    pub session_id: String,
    pub uuid: Option<String>,
    pub parent_uuid: Option<String>,
    pub is_side_chain: bool,
    /// Running totals as of this event (carried forward when absent)
    pub cumulative_usage: TokenUsage,
    pub todo_snapshot: Option<Vec<TodoSnapshotEntry>>,
    pub content: String,
    pub tool_uses: Vec<ToolUse>,
    /// One-line summary of what this step did (tool call, response or
    /// tool result)
    pub action: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

// ============================================
// Task chains
// ============================================

/// One step inside a chain, as listed by the full tasks view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainStep {
    pub line: usize,
    pub kind: EventKind,
    /// First tool called by the step, if any
    pub tool: Option<String>,
    pub action: String,
}

/// A reconstructed side chain of sub-work.
#[derive(Debug, Clone, Serialize)]
pub struct TaskChain {
    /// Stable hash of (content, root uuid, session, parent uuid)
    pub chain_id: String,
    pub session_id: String,
    pub root_event_uuid: String,
    /// Single-line description
    pub name: String,
    /// Single-line prompt of the spawning `Task` call
    pub prompt: Option<String>,
    /// Snapshot of the most recent session event before the root
    pub start_usage: TokenUsage,
    /// Snapshot at the closing event, or the last lineage event when open.
    /// When a later chain's root interleaves, the snapshot just before that
    /// root.
    pub end_usage: TokenUsage,
    pub delta_usage: UsageDelta,
    pub is_open: bool,
    pub event_count: usize,
    /// Distinct tool names used inside the chain, in first-use order
    pub tools: Vec<String>,
    pub steps: Vec<ChainStep>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

// ============================================
// Todos
// ============================================

/// Lifecycle status of a tracked work item.
///
/// Transitions only move forward (`Pending` → `InProgress` → `Completed`).
/// `Unknown` is terminal: the item was first seen already completed, so its
/// bounds cannot be established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
    Unknown,
}

impl TodoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TodoStatus::Pending => "pending",
            TodoStatus::InProgress => "in_progress",
            TodoStatus::Completed => "completed",
            TodoStatus::Unknown => "unknown",
        }
    }

    /// Parse a status as it appears in a snapshot. `unknown` is never a
    /// snapshot value.
    pub fn from_snapshot(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TodoStatus::Pending),
            "in_progress" => Some(TodoStatus::InProgress),
            "completed" => Some(TodoStatus::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for TodoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TodoStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(TodoStatus::Unknown),
            other => Self::from_snapshot(other).ok_or_else(|| format!("unknown status: {}", s)),
        }
    }
}

/// A tracked work item observed in todo snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct TodoItem {
    /// Identifier as it appears in the source
    pub item_id: String,
    /// Stable hash of (content, item id, session, parent chain)
    pub unique_id: String,
    pub session_id: String,
    pub parent_chain_id: Option<String>,
    pub content: String,
    pub status: TodoStatus,
    pub priority: String,
    pub usage_at_first_seen: TokenUsage,
    pub usage_at_completion: Option<TokenUsage>,
    pub delta_usage: Option<UsageDelta>,
    pub first_seen_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}
