//! Report rendering
//!
//! Pure formatting of a [`UsageReport`]. Four views (context, tasks, todos,
//! unified) in three styles (full, brief, json). Every free-text field goes
//! through [`single_line`] so one item is always one line of output.
//!
//! Human-readable views always end with the integrity problems of each
//! session, prefixed with `! `, so a negative figure never appears without
//! its explanation.

use crate::analysis::{SessionReport, UsageReport};
use crate::error::Result;
use crate::format::{ellipsize, format_elapsed, format_thousands, round_percentage, single_line};
use crate::types::{TaskChain, TodoItem, TodoStatus, UsageDelta};
use std::fmt::Write;
use std::str::FromStr;

const RULE_WIDTH: usize = 40;
const PROMPT_PREVIEW: usize = 200;

/// What part of the report to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportView {
    /// Current context consumption against the budget
    #[default]
    Context,
    /// Reconstructed task chains
    Tasks,
    /// Todo lifecycle
    Todos,
    /// Chains and todos side by side with totals
    Unified,
}

impl FromStr for ReportView {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "context" | "tokens" => Ok(ReportView::Context),
            "tasks" | "inspect-tasks" => Ok(ReportView::Tasks),
            "todos" | "todo-list" => Ok(ReportView::Todos),
            "report" | "unified" => Ok(ReportView::Unified),
            other => Err(format!("unknown view: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputStyle {
    #[default]
    Full,
    Brief,
    Json,
}

/// Render `report` as text.
pub fn render(report: &UsageReport, view: ReportView, style: OutputStyle) -> Result<String> {
    if style == OutputStyle::Json {
        return Ok(serde_json::to_string_pretty(report)?);
    }

    let mut out = String::new();
    render_text(&mut out, report, view, style)?;
    Ok(out.trim_end().to_string())
}

fn render_text(
    out: &mut String,
    report: &UsageReport,
    view: ReportView,
    style: OutputStyle,
) -> std::fmt::Result {
    let multi = report.sessions.len() > 1;
    match (view, style) {
        (ReportView::Context, OutputStyle::Brief) => context_brief(out, report, multi)?,
        (ReportView::Context, _) => context_full(out, report, multi)?,
        (ReportView::Tasks, OutputStyle::Brief) => grouped_brief(out, report, true, false)?,
        (ReportView::Tasks, _) => tasks_full(out, report)?,
        (ReportView::Todos, OutputStyle::Brief) => grouped_brief(out, report, false, true)?,
        (ReportView::Todos, _) => todos_full(out, report)?,
        (ReportView::Unified, OutputStyle::Brief) => grouped_brief(out, report, true, true)?,
        (ReportView::Unified, _) => unified_full(out, report)?,
    }
    diagnostics_section(out, report, style)
}

fn context_brief(out: &mut String, report: &UsageReport, multi: bool) -> std::fmt::Result {
    for session in &report.sessions {
        if multi {
            write!(out, "{}: ", session.session_id)?;
        }
        writeln!(out, "{}", context_line(session))?;
    }
    Ok(())
}

fn context_line(session: &SessionReport) -> String {
    let context = &session.context;
    format!(
        "{} / {} ({:.1}%)",
        format_thousands(context.total),
        format_thousands(context.budget),
        context.percentage
    )
}

fn context_full(out: &mut String, report: &UsageReport, multi: bool) -> std::fmt::Result {
    for session in &report.sessions {
        if multi {
            writeln!(out, "Session: {}", session.session_id)?;
            writeln!(out)?;
        }
        let usage = &session.current_usage;
        let context = &session.context;
        let num = |v: u64| format_thousands(v);

        writeln!(out, "Token Usage")?;
        writeln!(out, "{}", "=".repeat(RULE_WIDTH))?;
        writeln!(out, "Input tokens (current):     {}", num(usage.input_tokens))?;
        writeln!(out, "Cache creation tokens:      {}", num(usage.cache_creation_input_tokens))?;
        writeln!(out, "Cache read tokens:          {}", num(usage.cache_read_input_tokens))?;
        writeln!(out, "Output tokens:              {}", num(usage.output_tokens))?;
        writeln!(out, "Total context tokens:       {}", num(context.total))?;
        writeln!(out)?;
        writeln!(out, "Context Window")?;
        writeln!(out, "{}", "=".repeat(RULE_WIDTH))?;
        writeln!(out, "Model context window:       {}", num(context.window))?;
        writeln!(out, "Context budget:             {}", num(context.budget))?;
        writeln!(out, "Remaining tokens:           {}", format_thousands(context.remaining))?;
        writeln!(out, "Usage:                      {:.1}%", context.percentage)?;
        writeln!(out, "Remaining:                  {:.1}%", context.remaining_percentage())?;
        writeln!(out)?;
    }
    Ok(())
}

/// `# session` headings with one line per chain and/or completed todo.
fn grouped_brief(
    out: &mut String,
    report: &UsageReport,
    chains: bool,
    todos: bool,
) -> std::fmt::Result {
    for session in &report.sessions {
        writeln!(out, "# {}", session.session_id)?;
        if chains {
            for chain in &session.chains {
                writeln!(out, "{}", chain_brief(chain))?;
            }
        }
        if todos {
            for todo in session.completed() {
                writeln!(out, "{}", todo_brief(todo))?;
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

fn chain_brief(chain: &TaskChain) -> String {
    let mut line = format!(
        "- {} -- {}tkn -- {}",
        single_line(&chain.name),
        chain.delta_usage.context_tokens(),
        format_elapsed(chain.started_at, chain.ended_at)
    );
    if chain.is_open {
        line.push_str(" (open)");
    }
    line
}

fn todo_brief(todo: &TodoItem) -> String {
    format!(
        "- {} -- {}tkn -- {}",
        single_line(&todo.content),
        todo.delta_usage
            .map(|d| d.context_tokens())
            .unwrap_or_default(),
        format_elapsed(todo.first_seen_at, todo.completed_at)
    )
}

fn delta_breakdown(delta: &UsageDelta) -> String {
    format!(
        "{} (input {}, cache creation {}, cache read {}, output {})",
        format_thousands(delta.context_tokens()),
        format_thousands(delta.input_tokens()),
        format_thousands(delta.cache_creation_input_tokens()),
        format_thousands(delta.cache_read_input_tokens()),
        format_thousands(delta.output_tokens())
    )
}

fn tasks_full(out: &mut String, report: &UsageReport) -> std::fmt::Result {
    writeln!(out, "Task Chains")?;
    writeln!(out, "{}", "=".repeat(RULE_WIDTH))?;
    for session in &report.sessions {
        write_session_chains(out, session)?;
    }
    writeln!(out)?;
    writeln!(out, "Summary")?;
    writeln!(out, "{}", "-".repeat(RULE_WIDTH))?;
    writeln!(out, "Sessions analyzed: {}", report.totals.sessions)?;
    writeln!(
        out,
        "Matching tasks:    {} ({} open)",
        report.totals.chains, report.totals.open_chains
    )?;
    writeln!(
        out,
        "Tokens:            {}",
        format_thousands(report.totals.chain_total.context_tokens())
    )?;
    Ok(())
}

fn write_session_chains(out: &mut String, session: &SessionReport) -> std::fmt::Result {
    writeln!(out)?;
    writeln!(out, "Session: {}", session.session_id)?;
    if session.chains.is_empty() {
        writeln!(out, "  (no task chains)")?;
        return Ok(());
    }
    for (i, chain) in session.chains.iter().enumerate() {
        let state = if chain.is_open { " [open]" } else { "" };
        writeln!(out, "  Task {}: {}{}", i + 1, single_line(&chain.name), state)?;
        writeln!(out, "     ID:      {}", chain.chain_id)?;
        if let Some(prompt) = &chain.prompt {
            writeln!(out, "     Prompt:  {}", ellipsize(&single_line(prompt), PROMPT_PREVIEW))?;
        }
        if let Some(started) = chain.started_at {
            writeln!(out, "     Started: {}", started.format("%Y-%m-%d %H:%M:%S"))?;
        }
        writeln!(out, "     Events:  {}", chain.event_count)?;
        if !chain.tools.is_empty() {
            writeln!(out, "     Tools:   {}", chain.tools.join(", "))?;
        }
        writeln!(out, "     Tokens:  {}", delta_breakdown(&chain.delta_usage))?;
        writeln!(
            out,
            "     Elapsed: {}",
            format_elapsed(chain.started_at, chain.ended_at)
        )?;
        if !chain.steps.is_empty() {
            writeln!(out, "     Actions ({}):", chain.steps.len())?;
            for (n, step) in chain.steps.iter().enumerate() {
                writeln!(out, "       {:>3}. {}", n + 1, single_line(&step.action))?;
            }
        }
    }
    Ok(())
}

fn todos_full(out: &mut String, report: &UsageReport) -> std::fmt::Result {
    writeln!(out, "Todos")?;
    writeln!(out, "{}", "=".repeat(RULE_WIDTH))?;
    let mut listed = 0;
    for session in &report.sessions {
        listed += session.todos.len();
        write_session_todos(out, session)?;
    }
    writeln!(out)?;
    writeln!(out, "Total: {} todos", listed)?;
    writeln!(
        out,
        "Completed: {} ({} tokens), unresolved: {}",
        report.totals.completed_todos,
        format_thousands(report.totals.todo_total.context_tokens()),
        report.totals.unresolved_todos
    )?;
    Ok(())
}

fn write_session_todos(out: &mut String, session: &SessionReport) -> std::fmt::Result {
    writeln!(out)?;
    writeln!(out, "Session: {}", session.session_id)?;
    if session.todos.is_empty() {
        writeln!(out, "  (no todos)")?;
        return Ok(());
    }

    for status in [
        TodoStatus::InProgress,
        TodoStatus::Pending,
        TodoStatus::Completed,
        TodoStatus::Unknown,
    ] {
        let items: Vec<&TodoItem> = session.todos.iter().filter(|t| t.status == status).collect();
        if items.is_empty() {
            continue;
        }
        writeln!(out, "  {}", status.as_str().replace('_', " ").to_uppercase())?;
        writeln!(out, "  {}", "-".repeat(RULE_WIDTH - 2))?;
        for todo in items {
            write!(
                out,
                "  [{}] [{}] {}",
                todo.priority,
                todo.item_id,
                single_line(&todo.content)
            )?;
            if let Some(delta) = &todo.delta_usage {
                write!(
                    out,
                    " -- {} tokens -- {}",
                    format_thousands(delta.context_tokens()),
                    format_elapsed(todo.first_seen_at, todo.completed_at)
                )?;
            }
            writeln!(out)?;
        }
    }
    Ok(())
}

fn unified_full(out: &mut String, report: &UsageReport) -> std::fmt::Result {
    writeln!(out, "Task Chains")?;
    writeln!(out, "{}", "=".repeat(RULE_WIDTH))?;
    for session in &report.sessions {
        write_session_chains(out, session)?;
    }
    writeln!(out)?;
    writeln!(out, "Todos")?;
    writeln!(out, "{}", "=".repeat(RULE_WIDTH))?;
    for session in &report.sessions {
        write_session_todos(out, session)?;
    }
    writeln!(out)?;
    writeln!(out, "Totals")?;
    writeln!(out, "{}", "=".repeat(RULE_WIDTH))?;
    for session in &report.sessions {
        writeln!(
            out,
            "{}: chains {} | todos {} | unresolved {} | context {}",
            session.session_id,
            format_thousands(session.chain_total.context_tokens()),
            format_thousands(session.todo_total.context_tokens()),
            session.unresolved_todos,
            context_line(session)
        )?;
    }
    let totals = &report.totals;
    writeln!(
        out,
        "All sessions: chains {} | todos {} | unresolved {}",
        format_thousands(totals.chain_total.context_tokens()),
        format_thousands(totals.todo_total.context_tokens()),
        totals.unresolved_todos
    )?;
    if report.budget > 0 {
        let share = round_percentage(
            totals.chain_total.context_tokens() as f64 / report.budget as f64 * 100.0,
        );
        writeln!(out, "Chain tokens vs budget: {:.1}%", share)?;
    }
    Ok(())
}

/// Integrity problems always; in full style also warnings and lifecycle
/// anomalies.
fn diagnostics_section(
    out: &mut String,
    report: &UsageReport,
    style: OutputStyle,
) -> std::fmt::Result {
    let multi = report.sessions.len() > 1;
    let mut header_written = false;

    for session in &report.sessions {
        let prefix = if multi {
            format!("{}: ", session.session_id)
        } else {
            String::new()
        };
        let mut lines: Vec<String> = session
            .diagnostics
            .integrity_violations()
            .map(|a| format!("! {}{}", prefix, a))
            .collect();
        if style == OutputStyle::Full {
            lines.extend(
                session
                    .diagnostics
                    .warnings
                    .iter()
                    .map(|w| format!("warning: {}{}", prefix, w)),
            );
            lines.extend(
                session
                    .diagnostics
                    .anomalies
                    .iter()
                    .filter(|a| !a.is_integrity())
                    .map(|a| format!("note: {}{}", prefix, a)),
            );
        }
        if lines.is_empty() {
            continue;
        }
        if !header_written {
            writeln!(out)?;
            if style == OutputStyle::Full {
                writeln!(out, "Diagnostics")?;
                writeln!(out, "{}", "-".repeat(RULE_WIDTH))?;
            }
            header_written = true;
        }
        for line in lines {
            writeln!(out, "{}", single_line(&line))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{
        aggregate, ContextUsage, Diagnostics, GrandTotals, ReportFilter,
    };
    use crate::config::BudgetConfig;
    use crate::diagnostics::{Anomaly, Subject};
    use crate::types::{ChainStep, EventKind, TokenUsage, UsageCounter};
    use chrono::{TimeZone, Utc};
    use std::path::PathBuf;

    fn usage(input: u64) -> TokenUsage {
        TokenUsage {
            input_tokens: input,
            ..Default::default()
        }
    }

    fn todo(content: &str, first: u64, done: u64) -> TodoItem {
        TodoItem {
            item_id: "1".to_string(),
            unique_id: "u-1".to_string(),
            session_id: "s1".to_string(),
            parent_chain_id: None,
            content: content.to_string(),
            status: TodoStatus::Completed,
            priority: "high".to_string(),
            usage_at_first_seen: usage(first),
            usage_at_completion: Some(usage(done)),
            delta_usage: Some(usage(done).delta_since(&usage(first))),
            first_seen_at: Some(Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap()),
            completed_at: Some(Utc.with_ymd_and_hms(2025, 1, 1, 11, 2, 3).unwrap()),
        }
    }

    fn chain(name: &str, open: bool) -> TaskChain {
        TaskChain {
            chain_id: "c0ffee".to_string(),
            session_id: "s1".to_string(),
            root_event_uuid: "r".to_string(),
            name: name.to_string(),
            prompt: None,
            start_usage: usage(1000),
            end_usage: usage(30638),
            delta_usage: usage(30638).delta_since(&usage(1000)),
            is_open: open,
            event_count: 3,
            tools: vec!["Read".to_string()],
            steps: vec![],
            started_at: None,
            ended_at: None,
        }
    }

    fn session(id: &str, total: u64) -> SessionReport {
        SessionReport {
            session_id: id.to_string(),
            path: PathBuf::from(format!("{}.jsonl", id)),
            found: true,
            event_count: 4,
            current_usage: usage(total),
            context: ContextUsage::new(&usage(total), &BudgetConfig::default()),
            chains: vec![chain("Audit\nparser", true)],
            todos: vec![todo("Todo item", 500, 743)],
            chain_total: usage(30638).delta_since(&usage(1000)),
            todo_total: usage(743).delta_since(&usage(500)),
            completed_todos: 1,
            unresolved_todos: 0,
            diagnostics: Diagnostics::default(),
        }
    }

    fn report(sessions: Vec<SessionReport>) -> UsageReport {
        UsageReport {
            budget: 165_000,
            context_window: 200_000,
            totals: GrandTotals {
                sessions: sessions.len(),
                ..Default::default()
            },
            sessions,
        }
    }

    #[test]
    fn test_context_brief() {
        let out = render(
            &report(vec![session("s1", 146_897)]),
            ReportView::Context,
            OutputStyle::Brief,
        )
        .unwrap();
        assert_eq!(out, "146,897 / 165,000 (89.0%)");
    }

    #[test]
    fn test_context_brief_prefixes_sessions() {
        let out = render(
            &report(vec![session("s1", 1000), session("s2", 2000)]),
            ReportView::Context,
            OutputStyle::Brief,
        )
        .unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines, vec!["s1: 1,000 / 165,000 (0.6%)", "s2: 2,000 / 165,000 (1.2%)"]);
    }

    #[test]
    fn test_todo_brief() {
        let out = render(
            &report(vec![session("s1", 1000)]),
            ReportView::Todos,
            OutputStyle::Brief,
        )
        .unwrap();
        assert_eq!(out, "# s1\n- Todo item -- 243tkn -- 01h02m03s");
    }

    #[test]
    fn test_task_brief_marks_open_and_single_lines_names() {
        let out = render(
            &report(vec![session("s1", 1000)]),
            ReportView::Tasks,
            OutputStyle::Brief,
        )
        .unwrap();
        assert_eq!(out, "# s1\n- Audit parser -- 29638tkn -- --h--m--s (open)");
    }

    #[test]
    fn test_tasks_full_lists_prompt_and_actions() {
        let mut s = session("s1", 1000);
        s.chains[0].prompt = Some("p".repeat(250));
        s.chains[0].steps = vec![
            ChainStep {
                line: 2,
                kind: EventKind::Assistant,
                tool: Some("Read".to_string()),
                action: "Read: /src/lib.rs".to_string(),
            },
            ChainStep {
                line: 3,
                kind: EventKind::User,
                tool: None,
                action: "Result: ok".to_string(),
            },
        ];

        let out = render(&report(vec![s]), ReportView::Tasks, OutputStyle::Full).unwrap();
        assert!(out.contains(&format!("     Prompt:  {}...", "p".repeat(197))));
        assert!(out.contains("     Actions (2):"));
        assert!(out.contains("         1. Read: /src/lib.rs"));
        assert!(out.contains("         2. Result: ok"));
    }

    #[test]
    fn test_context_full_layout() {
        let out = render(
            &report(vec![session("s1", 146_897)]),
            ReportView::Context,
            OutputStyle::Full,
        )
        .unwrap();
        assert!(out.contains("Total context tokens:       146,897"));
        assert!(out.contains("Context budget:             165,000"));
        assert!(out.contains("Remaining tokens:           18,103"));
        assert!(out.contains("Usage:                      89.0%"));
        assert!(out.contains("Remaining:                  11.0%"));
    }

    #[test]
    fn test_integrity_shown_in_brief_views() {
        let mut s = session("s1", 1000);
        s.diagnostics.anomalies.push(Anomaly::IntegrityViolation {
            subject: Subject::Chain("c0ffee".to_string()),
            counters: vec![UsageCounter::Input],
        });
        s.diagnostics.anomalies.push(Anomaly::OpenChain {
            chain_id: "c0ffee".to_string(),
        });

        let brief = render(&report(vec![s.clone()]), ReportView::Context, OutputStyle::Brief).unwrap();
        assert!(brief.ends_with("! INTEGRITY: chain c0ffee has a negative delta in input_tokens"));
        assert!(!brief.contains("no closing result"));

        let full = render(&report(vec![s]), ReportView::Unified, OutputStyle::Full).unwrap();
        assert!(full.contains("Diagnostics"));
        assert!(full.contains("note: chain c0ffee has no closing result event"));
    }

    #[test]
    fn test_json_is_whole_report() {
        let report = aggregate(vec![], &BudgetConfig::default(), &ReportFilter::default()).unwrap();
        let out = render(&report, ReportView::Todos, OutputStyle::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["budget"], 165_000);
        assert!(value["sessions"].as_array().unwrap().is_empty());
        assert!(value["totals"].is_object());
    }

    #[test]
    fn test_view_aliases() {
        assert_eq!("tokens".parse::<ReportView>(), Ok(ReportView::Context));
        assert_eq!("inspect-tasks".parse::<ReportView>(), Ok(ReportView::Tasks));
        assert_eq!("todo-list".parse::<ReportView>(), Ok(ReportView::Todos));
        assert_eq!("report".parse::<ReportView>(), Ok(ReportView::Unified));
        assert!("bash".parse::<ReportView>().is_err());
    }
}
