//! Usage aggregation across sessions
//!
//! One [`UsageReport`] is built per invocation from the analyzed sessions.
//! Chain and todo figures are summed separately: a todo completed inside a
//! chain is counted by both, so adding the two would double count.
//!
//! Filters narrow what is listed and summed. Integrity checks always run over
//! every chain and todo, filtered out or not.

use super::SessionAnalysis;
use crate::config::BudgetConfig;
use crate::diagnostics::{Anomaly, Diagnostics, Subject};
use crate::error::{Error, Result};
use crate::format::round_percentage;
use crate::types::{saturating_i64, TaskChain, TodoItem, TodoStatus, TokenUsage, UsageDelta};
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::path::PathBuf;

/// Which chains and todos a report lists.
#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    /// Case-insensitive match against chain names and spawning prompts
    pub chain_pattern: Option<Regex>,
    pub todo_status: Option<TodoStatus>,
    pub todo_priority: Option<String>,
}

impl ReportFilter {
    /// Compile a chain pattern; matching ignores case.
    pub fn compile_pattern(pattern: &str) -> Result<Regex> {
        Ok(RegexBuilder::new(pattern).case_insensitive(true).build()?)
    }

    pub fn keeps_chain(&self, chain: &TaskChain) -> bool {
        self.chain_pattern.as_ref().map_or(true, |re| {
            re.is_match(&chain.name) || chain.prompt.as_deref().is_some_and(|p| re.is_match(p))
        })
    }

    pub fn keeps_todo(&self, todo: &TodoItem) -> bool {
        self.todo_status.map_or(true, |s| todo.status == s)
            && self
                .todo_priority
                .as_deref()
                .map_or(true, |p| todo.priority.eq_ignore_ascii_case(p))
    }
}

/// Current context consumption against the budget.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ContextUsage {
    /// Cumulative context tokens at the last event
    pub total: u64,
    pub budget: u64,
    pub window: u64,
    /// `budget - total`; negative once the budget is exceeded
    pub remaining: i64,
    /// `total / budget * 100`, one decimal
    pub percentage: f64,
    /// `total / window * 100`, one decimal
    pub window_percentage: f64,
}

impl ContextUsage {
    pub fn new(usage: &TokenUsage, budget: &BudgetConfig) -> Self {
        let total = usage.context_tokens();
        let percent_of = |whole: u64| {
            if whole == 0 {
                0.0
            } else {
                round_percentage(total as f64 / whole as f64 * 100.0)
            }
        };
        Self {
            total,
            budget: budget.context_tokens,
            window: budget.context_window,
            remaining: saturating_i64(budget.context_tokens as i128 - total as i128),
            percentage: percent_of(budget.context_tokens),
            window_percentage: percent_of(budget.context_window),
        }
    }

    /// Share of the budget still available, one decimal.
    pub fn remaining_percentage(&self) -> f64 {
        round_percentage(100.0 - self.percentage)
    }
}

/// Per-session slice of the report.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: String,
    pub path: PathBuf,
    pub found: bool,
    pub event_count: usize,
    pub current_usage: TokenUsage,
    pub context: ContextUsage,
    pub chains: Vec<TaskChain>,
    pub todos: Vec<TodoItem>,
    /// Sum of listed chain deltas
    pub chain_total: UsageDelta,
    /// Sum of listed completed-todo deltas
    pub todo_total: UsageDelta,
    pub completed_todos: usize,
    /// Listed todos whose bounds are unknown
    pub unresolved_todos: usize,
    pub diagnostics: Diagnostics,
}

impl SessionReport {
    pub fn completed(&self) -> impl Iterator<Item = &TodoItem> {
        self.todos
            .iter()
            .filter(|t| t.status == TodoStatus::Completed)
    }
}

/// Figures summed over every session in the report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GrandTotals {
    pub sessions: usize,
    pub chains: usize,
    pub open_chains: usize,
    pub chain_total: UsageDelta,
    pub completed_todos: usize,
    pub unresolved_todos: usize,
    pub todo_total: UsageDelta,
    pub integrity_violations: usize,
}

/// The aggregated result of one invocation.
#[derive(Debug, Clone, Serialize)]
pub struct UsageReport {
    pub budget: u64,
    pub context_window: u64,
    pub sessions: Vec<SessionReport>,
    pub totals: GrandTotals,
}

impl UsageReport {
    pub fn has_integrity_violations(&self) -> bool {
        self.totals.integrity_violations > 0
    }
}

/// Combine analyzed sessions into a report.
///
/// A zero budget makes every percentage meaningless and is fatal.
pub fn aggregate(
    analyses: Vec<SessionAnalysis>,
    budget: &BudgetConfig,
    filter: &ReportFilter,
) -> Result<UsageReport> {
    if budget.context_tokens == 0 {
        return Err(Error::Budget(
            "context budget must be greater than zero".to_string(),
        ));
    }

    let mut totals = GrandTotals::default();
    let mut sessions = Vec::with_capacity(analyses.len());

    for analysis in analyses {
        let mut diagnostics = analysis.diagnostics;
        diagnostics
            .anomalies
            .extend(integrity_violations(&analysis.chains, &analysis.todos));

        let chains: Vec<TaskChain> = analysis
            .chains
            .into_iter()
            .filter(|c| filter.keeps_chain(c))
            .collect();
        let todos: Vec<TodoItem> = analysis
            .todos
            .into_iter()
            .filter(|t| filter.keeps_todo(t))
            .collect();

        let chain_total: UsageDelta = chains.iter().map(|c| &c.delta_usage).sum();
        let todo_total: UsageDelta = todos.iter().filter_map(|t| t.delta_usage.as_ref()).sum();
        let completed_todos = todos
            .iter()
            .filter(|t| t.status == TodoStatus::Completed)
            .count();
        let unresolved_todos = todos
            .iter()
            .filter(|t| t.status == TodoStatus::Unknown)
            .count();

        totals.sessions += 1;
        totals.chains += chains.len();
        totals.open_chains += chains.iter().filter(|c| c.is_open).count();
        totals.chain_total += chain_total;
        totals.completed_todos += completed_todos;
        totals.unresolved_todos += unresolved_todos;
        totals.todo_total += todo_total;
        totals.integrity_violations += diagnostics.integrity_violations().count();

        sessions.push(SessionReport {
            context: ContextUsage::new(&analysis.current_usage, budget),
            session_id: analysis.session_id,
            path: analysis.path,
            found: analysis.found,
            event_count: analysis.event_count,
            current_usage: analysis.current_usage,
            chains,
            todos,
            chain_total,
            todo_total,
            completed_todos,
            unresolved_todos,
            diagnostics,
        });
    }

    tracing::info!(
        sessions = totals.sessions,
        chains = totals.chains,
        completed_todos = totals.completed_todos,
        integrity_violations = totals.integrity_violations,
        "Aggregated usage report"
    );

    Ok(UsageReport {
        budget: budget.context_tokens,
        context_window: budget.context_window,
        sessions,
        totals,
    })
}

/// A negative delta on any counter, reported as is.
fn integrity_violations(chains: &[TaskChain], todos: &[TodoItem]) -> Vec<Anomaly> {
    let chain_violations = chains.iter().filter_map(|chain| {
        let counters = chain.delta_usage.negative_counters();
        (!counters.is_empty()).then(|| Anomaly::IntegrityViolation {
            subject: Subject::Chain(chain.chain_id.clone()),
            counters,
        })
    });
    let todo_violations = todos.iter().filter_map(|todo| {
        let counters = todo.delta_usage?.negative_counters();
        (!counters.is_empty()).then(|| Anomaly::IntegrityViolation {
            subject: Subject::Todo(todo.unique_id.clone()),
            counters,
        })
    });

    let violations: Vec<Anomaly> = chain_violations.chain(todo_violations).collect();
    for violation in &violations {
        tracing::warn!(%violation, "Integrity violation");
    }
    violations
}
