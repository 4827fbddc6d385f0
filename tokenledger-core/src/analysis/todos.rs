//! Todo lifecycle tracking
//!
//! Each todo snapshot is compared with the tracked state of every item it
//! mentions. Statuses only move forward; a snapshot that would move an item
//! backwards is recorded as an anomaly and otherwise ignored.

use super::{stable_id, ChainMembership};
use crate::diagnostics::Anomaly;
use crate::format::single_line;
use crate::types::{Event, TodoItem, TodoStatus};
use std::collections::HashMap;

/// What applying an observed status to the current one does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TodoStep {
    /// Start tracking the item with this status
    FirstSeen(TodoStatus),
    /// pending → in_progress
    Advance(TodoStatus),
    /// Record the completion snapshot and compute the delta
    Complete,
    Unchanged,
    /// Backward or otherwise invalid; not applied
    OutOfOrder,
}

/// Transition table for a single observation.
///
/// `current` is `None` for an item not tracked yet.
pub fn transition(current: Option<TodoStatus>, observed: TodoStatus) -> TodoStep {
    use TodoStatus::*;

    match (current, observed) {
        (None, Pending) | (None, InProgress) => TodoStep::FirstSeen(observed),
        // First sighting already completed: bounds are unknowable.
        (None, Completed) => TodoStep::FirstSeen(Unknown),
        (None, Unknown) => TodoStep::OutOfOrder,
        (Some(cur), obs) if cur == obs => TodoStep::Unchanged,
        (Some(Unknown), Completed) => TodoStep::Unchanged,
        (Some(Pending), InProgress) => TodoStep::Advance(InProgress),
        (Some(Pending), Completed) | (Some(InProgress), Completed) => TodoStep::Complete,
        _ => TodoStep::OutOfOrder,
    }
}

/// Output of [`track_todos`].
#[derive(Debug, Clone, Default)]
pub struct TodoTracking {
    /// Items in first-seen order
    pub items: Vec<TodoItem>,
    pub anomalies: Vec<Anomaly>,
}

/// Fold every todo snapshot of a session into tracked items.
///
/// An item belongs to the chain containing the event that carried its
/// snapshot, so the same list entry seen in two chains is two items.
pub fn track_todos(events: &[Event], membership: &ChainMembership) -> TodoTracking {
    let mut tracking = TodoTracking::default();
    let mut index: HashMap<String, usize> = HashMap::new();

    for event in events {
        let Some(snapshot) = &event.todo_snapshot else {
            continue;
        };
        let parent_chain_id = event
            .uuid
            .as_deref()
            .and_then(|uuid| membership.chain_for(uuid))
            .map(str::to_string);

        for entry in snapshot {
            let Some(observed) = TodoStatus::from_snapshot(&entry.status) else {
                tracing::warn!(
                    item_id = %entry.item_id,
                    status = %entry.status,
                    line = event.line,
                    "Unrecognized todo status"
                );
                tracking.anomalies.push(Anomaly::UnrecognizedStatus {
                    item_id: entry.item_id.clone(),
                    line: event.line,
                    status: entry.status.clone(),
                });
                continue;
            };

            let content = single_line(&entry.content);
            let unique_id = stable_id(&[
                &content,
                &entry.item_id,
                &event.session_id,
                parent_chain_id.as_deref().unwrap_or(""),
            ]);
            let slot = index.get(&unique_id).copied();
            let current = slot.map(|i| tracking.items[i].status);

            match transition(current, observed) {
                TodoStep::FirstSeen(status) => {
                    index.insert(unique_id.clone(), tracking.items.len());
                    tracking.items.push(TodoItem {
                        item_id: entry.item_id.clone(),
                        unique_id,
                        session_id: event.session_id.clone(),
                        parent_chain_id: parent_chain_id.clone(),
                        content,
                        status,
                        priority: entry.priority.clone(),
                        usage_at_first_seen: event.cumulative_usage,
                        usage_at_completion: None,
                        delta_usage: None,
                        first_seen_at: event.timestamp,
                        completed_at: None,
                    });
                }
                TodoStep::Advance(status) => {
                    if let Some(i) = slot {
                        tracking.items[i].status = status;
                    }
                }
                TodoStep::Complete => {
                    if let Some(i) = slot {
                        let item = &mut tracking.items[i];
                        item.status = TodoStatus::Completed;
                        item.usage_at_completion = Some(event.cumulative_usage);
                        item.delta_usage =
                            Some(event.cumulative_usage.delta_since(&item.usage_at_first_seen));
                        item.completed_at = event.timestamp;
                        tracing::debug!(
                            unique_id = %item.unique_id,
                            line = event.line,
                            "Todo completed"
                        );
                    }
                }
                TodoStep::Unchanged => {}
                TodoStep::OutOfOrder => {
                    let from = current.unwrap_or(TodoStatus::Unknown);
                    tracing::warn!(
                        unique_id = %unique_id,
                        from = %from,
                        to = %observed,
                        line = event.line,
                        "Out-of-order todo transition"
                    );
                    tracking.anomalies.push(Anomaly::OutOfOrderTransition {
                        unique_id,
                        line: event.line,
                        from,
                        to: observed,
                    });
                }
            }
        }
    }

    tracking
}
