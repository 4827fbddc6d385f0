//! Task chain reconstruction
//!
//! Side chains are rebuilt from the flat event stream through an index of
//! event uuid → chain, never through back-references between events:
//!
//! 1. An event whose `parent_uuid` belongs to a chain that is still open joins
//!    that chain.
//! 2. Otherwise a side-chain event starts a new chain rooted at itself.
//! 3. The first `result` event in a chain's lineage closes it. Later
//!    descendants of a closed chain do not join it.
//!
//! `start_usage` is the cumulative snapshot of the event immediately before
//! the root in the session stream (zero when the root is the first event),
//! whichever chain that event belongs to. `end_usage` is the snapshot of the
//! closing event, or of the last lineage event for a chain left open.
//!
//! Attribution windows never overlap. When a chain's root falls inside the
//! previous chain's window, that window ends at the event just before the
//! new root and [`Anomaly::OverlappingChains`] is recorded. The deltas of
//! all chains in a session therefore never sum past its cumulative growth.

use super::stable_id;
use crate::diagnostics::Anomaly;
use crate::format::single_line;
use crate::types::{ChainStep, Event, EventKind, TaskChain, TokenUsage};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

const UNTITLED: &str = "(untitled chain)";

/// Read-only lookup from event uuid to the chain it was attributed to.
#[derive(Debug, Clone, Default)]
pub struct ChainMembership {
    by_event: HashMap<String, usize>,
    chain_ids: Vec<String>,
}

impl ChainMembership {
    /// Chain id of the chain containing `event_uuid`, if any.
    pub fn chain_for(&self, event_uuid: &str) -> Option<&str> {
        self.by_event
            .get(event_uuid)
            .map(|&idx| self.chain_ids[idx].as_str())
    }
}

/// Output of [`reconstruct_chains`].
#[derive(Debug, Clone, Default)]
pub struct ChainReconstruction {
    /// Chains in root order
    pub chains: Vec<TaskChain>,
    pub membership: ChainMembership,
    pub anomalies: Vec<Anomaly>,
}

/// Chain state while the stream is being walked.
struct ChainBuilder {
    root: usize,
    last: usize,
    start_usage: TokenUsage,
    end_usage: TokenUsage,
    closed: bool,
    event_count: usize,
    tools: Vec<String>,
    steps: Vec<ChainStep>,
    name: String,
    prompt: Option<String>,
    ended_at: Option<DateTime<Utc>>,
}

impl ChainBuilder {
    fn absorb(&mut self, idx: usize, event: &Event) {
        self.last = idx;
        self.end_usage = event.cumulative_usage;
        self.event_count += 1;
        if event.timestamp.is_some() {
            self.ended_at = event.timestamp;
        }
        for tool in &event.tool_uses {
            if !self.tools.contains(&tool.name) {
                self.tools.push(tool.name.clone());
            }
        }
        if let Some(action) = &event.action {
            self.steps.push(ChainStep {
                line: event.line,
                kind: event.kind,
                tool: event.tool_uses.first().map(|t| t.name.clone()),
                action: action.clone(),
            });
        }
        if event.kind == EventKind::Result {
            self.closed = true;
        }
    }
}

/// Rebuild side chains from one session's events.
pub fn reconstruct_chains(events: &[Event]) -> ChainReconstruction {
    let by_uuid: HashMap<&str, usize> = events
        .iter()
        .enumerate()
        .filter_map(|(idx, e)| e.uuid.as_deref().map(|u| (u, idx)))
        .collect();

    let mut builders: Vec<ChainBuilder> = Vec::new();
    let mut member_of: HashMap<&str, usize> = HashMap::new();
    // How many chains each spawning event has produced so far, to pair the
    // n-th chain with the n-th Task tool call of its parent.
    let mut spawned_from: HashMap<&str, usize> = HashMap::new();
    let mut previous_usage = TokenUsage::default();

    for (idx, event) in events.iter().enumerate() {
        let open_parent = event
            .parent_uuid
            .as_deref()
            .and_then(|p| member_of.get(p).copied())
            .filter(|&chain| !builders[chain].closed);

        let chain = match open_parent {
            Some(chain) => Some(chain),
            None if event.is_side_chain => {
                let (name, prompt) = chain_name(event, events, &by_uuid, &mut spawned_from);
                builders.push(ChainBuilder {
                    root: idx,
                    last: idx,
                    start_usage: previous_usage,
                    end_usage: previous_usage,
                    closed: false,
                    event_count: 0,
                    tools: Vec::new(),
                    steps: Vec::new(),
                    name,
                    prompt,
                    ended_at: None,
                });
                Some(builders.len() - 1)
            }
            None => None,
        };

        if let Some(chain) = chain {
            builders[chain].absorb(idx, event);
            if let Some(uuid) = event.uuid.as_deref() {
                member_of.insert(uuid, chain);
            }
        }

        previous_usage = event.cumulative_usage;
    }

    // Builders are in root order; end each window before the next root.
    for i in 1..builders.len() {
        let next_root = builders[i].root;
        let previous = &mut builders[i - 1];
        if next_root <= previous.last {
            previous.end_usage = events[next_root - 1].cumulative_usage;
        }
    }

    let mut reconstruction = ChainReconstruction::default();

    for builder in &builders {
        let root = &events[builder.root];
        let root_uuid = root
            .uuid
            .clone()
            .unwrap_or_else(|| format!("line-{}", root.line));
        let chain_id = stable_id(&[
            &single_line(&root.content),
            &root_uuid,
            &root.session_id,
            root.parent_uuid.as_deref().unwrap_or(""),
        ]);

        if !builder.closed {
            tracing::debug!(chain_id = %chain_id, "Chain left open at end of transcript");
            reconstruction.anomalies.push(Anomaly::OpenChain {
                chain_id: chain_id.clone(),
            });
        }

        reconstruction.membership.chain_ids.push(chain_id.clone());
        reconstruction.chains.push(TaskChain {
            chain_id,
            session_id: root.session_id.clone(),
            root_event_uuid: root_uuid,
            name: builder.name.clone(),
            prompt: builder.prompt.clone(),
            start_usage: builder.start_usage,
            end_usage: builder.end_usage,
            delta_usage: builder.end_usage.delta_since(&builder.start_usage),
            is_open: !builder.closed,
            event_count: builder.event_count,
            tools: builder.tools.clone(),
            steps: builder.steps.clone(),
            started_at: root.timestamp,
            ended_at: builder.ended_at,
        });
    }

    reconstruction.membership.by_event = member_of
        .into_iter()
        .map(|(uuid, chain)| (uuid.to_string(), chain))
        .collect();

    reconstruction
        .anomalies
        .extend(find_overlaps(&builders, &reconstruction.chains));

    reconstruction
}

/// Name and prompt for a new chain. Prefer the description of the `Task`
/// call that spawned it, then the root's own text.
fn chain_name<'a>(
    root: &Event,
    events: &'a [Event],
    by_uuid: &HashMap<&str, usize>,
    spawned_from: &mut HashMap<&'a str, usize>,
) -> (String, Option<String>) {
    let spawner = root
        .parent_uuid
        .as_deref()
        .and_then(|p| by_uuid.get(p))
        .map(|&idx| &events[idx]);

    if let Some(spawner) = spawner {
        let tasks: Vec<(&str, Option<&str>)> = spawner
            .tool_uses
            .iter()
            .filter(|t| t.name == "Task")
            .filter_map(|t| Some((t.description.as_deref()?, t.prompt.as_deref())))
            .collect();
        if !tasks.is_empty() {
            let key = spawner.uuid.as_deref().unwrap_or_default();
            let nth = spawned_from.entry(key).or_insert(0);
            let (description, prompt) = tasks[(*nth).min(tasks.len() - 1)];
            *nth += 1;
            return (single_line(description), prompt.map(single_line));
        }
    }

    let text = single_line(&root.content);
    if text.is_empty() {
        (UNTITLED.to_string(), None)
    } else {
        (text, None)
    }
}

/// Chains whose event windows interleave share cumulative growth.
fn find_overlaps(builders: &[ChainBuilder], chains: &[TaskChain]) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();
    // Builders are already in root order.
    let mut furthest: Option<usize> = None;
    for (i, builder) in builders.iter().enumerate() {
        if let Some(prev) = furthest {
            if builder.root <= builders[prev].last {
                tracing::warn!(
                    chain_id = %chains[i].chain_id,
                    overlaps = %chains[prev].chain_id,
                    "Interleaved side chains"
                );
                anomalies.push(Anomaly::OverlappingChains {
                    chain_id: chains[i].chain_id.clone(),
                    overlaps: chains[prev].chain_id.clone(),
                });
            }
        }
        if furthest.map_or(true, |prev| builder.last > builders[prev].last) {
            furthest = Some(i);
        }
    }
    anomalies
}

#[cfg(test)]
mod tests {
    use super::super::test_support::event;
    use super::*;

    #[test]
    fn test_single_chain_delta_uses_prior_snapshot() {
        let events = vec![
            event(1, "u1").input(1000).build(),
            event(2, "s1").parent("u1").side().input(1500).content("Audit\nparser").build(),
            event(3, "s2").parent("s1").side().input(12000).build(),
            event(4, "s3")
                .parent("s2")
                .side()
                .kind(EventKind::Result)
                .input(30638)
                .build(),
            event(5, "u2").parent("u1").input(31000).build(),
        ];

        let result = reconstruct_chains(&events);
        assert_eq!(result.chains.len(), 1);

        let chain = &result.chains[0];
        assert_eq!(chain.start_usage.input_tokens, 1000);
        assert_eq!(chain.end_usage.input_tokens, 30638);
        assert_eq!(chain.delta_usage.input_tokens(), 29638);
        assert_eq!(chain.name, "Audit parser");
        assert_eq!(chain.event_count, 3);
        assert!(!chain.is_open);
        assert!(result.anomalies.is_empty());

        assert_eq!(result.membership.chain_for("s3"), Some(chain.chain_id.as_str()));
        assert_eq!(result.membership.chain_for("u2"), None);
    }

    #[test]
    fn test_root_at_stream_start_starts_from_zero() {
        let events = vec![
            event(1, "s1").side().input(400).build(),
            event(2, "s2").parent("s1").side().input(900).build(),
        ];

        let chain = &reconstruct_chains(&events).chains[0];
        assert_eq!(chain.start_usage, TokenUsage::default());
        assert_eq!(chain.delta_usage.input_tokens(), 900);
    }

    #[test]
    fn test_open_chain_is_reported_not_dropped() {
        let events = vec![
            event(1, "u1").input(100).build(),
            event(2, "s1").parent("u1").side().input(150).build(),
            event(3, "s2").parent("s1").side().input(260).build(),
        ];

        let result = reconstruct_chains(&events);
        let chain = &result.chains[0];
        assert!(chain.is_open);
        assert_eq!(chain.end_usage.input_tokens, 260);
        assert_eq!(chain.delta_usage.input_tokens(), 160);
        assert_eq!(
            result.anomalies,
            vec![Anomaly::OpenChain {
                chain_id: chain.chain_id.clone()
            }]
        );
    }

    #[test]
    fn test_disjoint_chains_do_not_share_events() {
        let events = vec![
            event(1, "u1").input(100).build(),
            event(2, "a1").parent("u1").side().input(200).content("first").build(),
            event(3, "a2").parent("a1").side().kind(EventKind::Result).input(500).build(),
            event(4, "u2").parent("u1").input(600).build(),
            event(5, "b1").parent("u2").side().input(650).content("second").build(),
            event(6, "b2").parent("b1").side().kind(EventKind::Result).input(900).build(),
            event(7, "u3").parent("u2").input(1000).build(),
        ];

        let result = reconstruct_chains(&events);
        assert_eq!(result.chains.len(), 2);
        let (first, second) = (&result.chains[0], &result.chains[1]);

        assert_eq!(first.delta_usage.input_tokens(), 400);
        assert_eq!(second.delta_usage.input_tokens(), 300);
        assert_ne!(first.chain_id, second.chain_id);

        let growth = events.last().unwrap().cumulative_usage.input_tokens as i64;
        assert!(first.delta_usage.input_tokens() + second.delta_usage.input_tokens() <= growth);
        assert!(result.anomalies.is_empty());
    }

    #[test]
    fn test_descendants_after_close_do_not_join() {
        let events = vec![
            event(1, "s1").side().input(10).build(),
            event(2, "s2").parent("s1").side().kind(EventKind::Result).input(20).build(),
            event(3, "s3").parent("s2").side().input(35).build(),
        ];

        let result = reconstruct_chains(&events);
        assert_eq!(result.chains.len(), 2);
        assert_eq!(result.chains[0].event_count, 2);
        assert_eq!(result.chains[1].start_usage.input_tokens, 20);
        assert_eq!(result.chains[1].delta_usage.input_tokens(), 15);
    }

    #[test]
    fn test_interleaved_chains_do_not_double_count() {
        let events = vec![
            event(1, "a1").side().input(10).build(),
            event(2, "b1").side().input(20).build(),
            event(3, "a2").parent("a1").side().kind(EventKind::Result).input(30).build(),
            event(4, "b2").parent("b1").side().kind(EventKind::Result).input(40).build(),
        ];

        let result = reconstruct_chains(&events);
        assert_eq!(result.chains.len(), 2);
        assert!(result.anomalies.iter().any(|a| matches!(
            a,
            Anomaly::OverlappingChains { chain_id, .. } if chain_id == &result.chains[1].chain_id
        )));

        let (a, b) = (&result.chains[0], &result.chains[1]);
        // a's window ends just before b1
        assert_eq!(a.end_usage.input_tokens, 10);
        assert_eq!(a.delta_usage.input_tokens(), 10);
        assert_eq!(b.delta_usage.input_tokens(), 30);
        assert!(!a.is_open);
        assert_eq!(a.event_count, 2);

        let sum: i64 = result.chains.iter().map(|c| c.delta_usage.input_tokens()).sum();
        assert!(sum <= 40);
    }

    #[test]
    fn test_nested_chain_cuts_outer_window() {
        let events = vec![
            event(1, "u1").input(100).build(),
            event(2, "a1").parent("u1").side().input(150).build(),
            event(3, "b1").side().input(300).build(),
            event(4, "b2").parent("b1").side().kind(EventKind::Result).input(450).build(),
            event(5, "a2").parent("a1").side().kind(EventKind::Result).input(700).build(),
        ];

        let result = reconstruct_chains(&events);
        let (a, b) = (&result.chains[0], &result.chains[1]);
        assert_eq!(a.delta_usage.input_tokens(), 50);
        assert_eq!(b.delta_usage.input_tokens(), 300);
        assert!(a.delta_usage.input_tokens() + b.delta_usage.input_tokens() <= 700 - 100);
    }

    #[test]
    fn test_steps_and_prompt_are_recorded() {
        let events = vec![
            event(1, "u1").task("Audit", "Look at\nthe parser").build(),
            event(2, "s1").parent("u1").side().kind(EventKind::User).build(),
            event(3, "s2")
                .parent("s1")
                .side()
                .tool("Read", None)
                .action("Read: /src/lib.rs")
                .build(),
            event(4, "s3")
                .parent("s2")
                .side()
                .kind(EventKind::User)
                .action("Result: ok")
                .build(),
        ];

        let chain = &reconstruct_chains(&events).chains[0];
        assert_eq!(chain.name, "Audit");
        assert_eq!(chain.prompt.as_deref(), Some("Look at the parser"));
        assert_eq!(
            chain.steps,
            vec![
                ChainStep {
                    line: 3,
                    kind: EventKind::Assistant,
                    tool: Some("Read".to_string()),
                    action: "Read: /src/lib.rs".to_string(),
                },
                ChainStep {
                    line: 4,
                    kind: EventKind::User,
                    tool: None,
                    action: "Result: ok".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_name_comes_from_spawning_task() {
        let events = vec![
            event(1, "u1")
                .tool("Task", Some("Review\nerror handling"))
                .tool("Task", Some("Write docs"))
                .build(),
            event(2, "a1").parent("u1").side().content("long prompt").build(),
            event(3, "a2").parent("a1").side().kind(EventKind::Result).build(),
            event(4, "b1").parent("u1").side().content("other prompt").build(),
        ];

        let result = reconstruct_chains(&events);
        assert_eq!(result.chains[0].name, "Review error handling");
        assert_eq!(result.chains[1].name, "Write docs");
    }

    #[test]
    fn test_tools_are_collected_in_first_use_order() {
        let events = vec![
            event(1, "s1").side().tool("Read", None).build(),
            event(2, "s2").parent("s1").side().tool("Bash", Some("run")).build(),
            event(3, "s3").parent("s2").side().tool("Read", None).build(),
        ];

        let chain = &reconstruct_chains(&events).chains[0];
        assert_eq!(chain.tools, vec!["Read".to_string(), "Bash".to_string()]);
        assert_eq!(chain.name, UNTITLED);
    }

    #[test]
    fn test_ids_are_stable_across_runs() {
        let events = vec![
            event(1, "u1").input(5).build(),
            event(2, "s1").parent("u1").side().content("task").input(9).build(),
        ];

        let first = reconstruct_chains(&events);
        let second = reconstruct_chains(&events);
        assert_eq!(first.chains[0].chain_id, second.chains[0].chain_id);
    }
}
