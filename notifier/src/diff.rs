//! Change detection between two observations of the issue store.
//!
//! [`diff`] compares freshly parsed items against the previous
//! [`SnapshotStore`] and classifies the differences into [`Event`]s. It is a
//! pure function: the caller dispatches the events and persists
//! [`DiffOutcome::next`].
//!
//! # Rules
//!
//! Items are processed in id order.
//!
//! 1. An id absent from the previous snapshot emits `Created`, whatever its
//!    status. First sight is never a transition.
//! 2. Otherwise a status change is looked up in
//!    [`TransitionKind::from_statuses`]: entering `in_progress` emits
//!    `WorkStarted`, entering `closed` emits `Completed`, anything else is
//!    silent.
//! 3. Every item's place in the [`AssigneeIndex`] is reconciled on every
//!    scan, before any event is emitted. This covers assignee changes,
//!    comment-derived agent changes and closures alike.
//! 4. When a `Completed` item's agent has no outstanding items left, an
//!    `AssigneeAllComplete` follows that agent's last `Completed` event of
//!    the scan, listing every closed item of the agent in id order.
//!
//! "No outstanding items left" is judged against the index as it stands at
//! the end of the scan, not as it stood when the completed item was reached
//! in id order. The outcome therefore does not depend on how ids sort:
//!
//! - A-1 (alice) closes while Z-9 is newly handed to alice: no summary,
//!   because alice still has Z-9.
//! - A-1 (alice) closes while alice's Z-9 is handed to bob: a summary for
//!   alice, because nothing of hers remains outstanding.
//!
//! Checking each item against a partially updated index would give the
//! opposite answer in both cases.
//! 5. Ids missing from the new parse are dropped from the records and the
//!    index without an event.
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use beads_notifier::diff::diff;
//! use beads_notifier::snapshot::SnapshotStore;
//! use beads_notifier::types::{EventKind, Item, Status};
//!
//! let mut items = BTreeMap::new();
//! items.insert("X-1".to_string(), Item::new("X-1", "Fix bug", Status::Open));
//! let first = diff(&items, &SnapshotStore::new());
//! assert_eq!(first.events[0].kind(), EventKind::Created);
//!
//! items.insert("X-1".to_string(), Item::new("X-1", "Fix bug", Status::InProgress));
//! let second = diff(&items, &first.next);
//! assert_eq!(second.events.len(), 1);
//! assert_eq!(second.events[0].kind(), EventKind::WorkStarted);
//! ```

use std::collections::BTreeMap;

use crate::snapshot::{SnapshotRecord, SnapshotStore};
use crate::types::{Event, Item, Status, TransitionKind};

/// Events detected by one scan and the snapshot to persist afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffOutcome {
    /// Events in emission order.
    pub events: Vec<Event>,

    /// Snapshot describing exactly the items of this scan.
    pub next: SnapshotStore,
}

/// Per-item classification computed before emission.
enum Change {
    Created,
    Transition(TransitionKind, Status),
    None,
}

/// Diffs `current` against `previous`. See the [module docs](self).
#[must_use]
pub fn diff(current: &BTreeMap<String, Item>, previous: &SnapshotStore) -> DiffOutcome {
    let mut index = previous.index.clone();
    index.retain_ids(|id| current.contains_key(id));

    let mut records = BTreeMap::new();
    let mut changes = Vec::with_capacity(current.len());
    // Agent -> id of its last completed item in this scan.
    let mut last_completed: BTreeMap<String, &str> = BTreeMap::new();

    for (id, item) in current {
        let record = SnapshotRecord::from_item(item);
        index.place(id, record.agent.as_deref(), &record.status);

        let change = match previous.records.get(id) {
            None => Change::Created,
            Some(old) => match TransitionKind::from_statuses(&old.status, &item.status) {
                Some(kind) => Change::Transition(kind, old.status.clone()),
                None => Change::None,
            },
        };

        if let (Change::Transition(TransitionKind::Completed, _), Some(agent)) =
            (&change, &record.agent)
        {
            last_completed.insert(agent.clone(), id.as_str());
        }

        changes.push((item, record.agent.clone(), change));
        records.insert(id.clone(), record);
    }

    let mut events = Vec::new();
    for (item, agent, change) in changes {
        match change {
            Change::Created => events.push(Event::Created { item: item.clone() }),
            Change::Transition(TransitionKind::WorkStarted, from) => {
                events.push(Event::WorkStarted {
                    item: item.clone(),
                    from,
                });
            }
            Change::Transition(TransitionKind::Completed, from) => {
                events.push(Event::Completed {
                    item: item.clone(),
                    from,
                });

                let Some(agent) = agent else { continue };
                let is_last = last_completed.get(&agent) == Some(&item.id.as_str());
                if is_last && index.is_clear(&agent) {
                    let items = closed_items_for(current, &agent);
                    if !items.is_empty() {
                        events.push(Event::AssigneeAllComplete { agent, items });
                    }
                }
            }
            Change::None => {}
        }
    }

    DiffOutcome {
        events,
        next: SnapshotStore { records, index },
    }
}

/// Closed items currently assigned to `agent`, in id order.
fn closed_items_for(current: &BTreeMap<String, Item>, agent: &str) -> Vec<Item> {
    current
        .values()
        .filter(|item| item.status == Status::Closed)
        .filter(|item| item.assigned_agent().as_deref() == Some(agent))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::AssigneeIndex;
    use crate::types::EventKind;
    use proptest::prelude::*;

    fn map(items: &[Item]) -> BTreeMap<String, Item> {
        items.iter().map(|i| (i.id.clone(), i.clone())).collect()
    }

    fn kinds(outcome: &DiffOutcome) -> Vec<(EventKind, String)> {
        outcome
            .events
            .iter()
            .map(|e| (e.kind(), e.subject().to_string()))
            .collect()
    }

    /// Baseline state as the service builds it at startup.
    fn baseline(items: &[Item]) -> SnapshotStore {
        let mut store = SnapshotStore::new();
        store.absorb_baseline(&map(items));
        store
    }

    #[test]
    fn new_item_emits_created_only_even_when_closed() {
        let out = diff(
            &map(&[Item::new("X-1", "Done already", Status::Closed).with_assignee("alice")]),
            &SnapshotStore::new(),
        );
        assert_eq!(kinds(&out), vec![(EventKind::Created, "X-1".to_string())]);
    }

    #[test]
    fn unchanged_store_is_idempotent() {
        let items = [
            Item::new("X-1", "a", Status::Open).with_assignee("alice"),
            Item::new("X-2", "b", Status::InProgress),
            Item::new("X-3", "c", Status::Closed).with_comment("@assigned bob"),
        ];
        let first = diff(&map(&items), &SnapshotStore::new());
        let second = diff(&map(&items), &first.next);

        assert!(second.events.is_empty());
        assert_eq!(second.next, first.next);
    }

    #[test]
    fn open_in_progress_closed_across_three_scans() {
        let s1 = baseline(&[Item::new("X-1", "Fix bug", Status::Open)]);

        let s2 = diff(&map(&[Item::new("X-1", "Fix bug", Status::InProgress)]), &s1);
        assert_eq!(kinds(&s2), vec![(EventKind::WorkStarted, "X-1".to_string())]);
        match &s2.events[0] {
            Event::WorkStarted { item, from } => {
                assert_eq!(item.title, "Fix bug");
                assert_eq!(*from, Status::Open);
            }
            other => panic!("unexpected event {other:?}"),
        }

        let s3 = diff(&map(&[Item::new("X-1", "Fix bug", Status::Closed)]), &s2.next);
        assert_eq!(kinds(&s3), vec![(EventKind::Completed, "X-1".to_string())]);
    }

    #[test]
    fn open_to_closed_skips_work_started() {
        let prev = baseline(&[Item::new("X-1", "t", Status::Open)]);
        let out = diff(&map(&[Item::new("X-1", "t", Status::Closed)]), &prev);
        assert_eq!(kinds(&out), vec![(EventKind::Completed, "X-1".to_string())]);
    }

    #[test]
    fn other_status_changes_are_silent_but_recorded() {
        let prev = baseline(&[Item::new("X-1", "t", Status::InProgress).with_assignee("alice")]);
        let out = diff(
            &map(&[Item::new("X-1", "t", Status::Other("blocked".into())).with_assignee("alice")]),
            &prev,
        );
        assert!(out.events.is_empty());
        assert_eq!(out.next.records["X-1"].status, Status::Other("blocked".into()));
        assert!(out.next.index.is_clear("alice"));
    }

    #[test]
    fn reopening_is_silent() {
        let prev = baseline(&[Item::new("X-1", "t", Status::Closed)]);
        let out = diff(&map(&[Item::new("X-1", "t", Status::Open)]), &prev);
        assert!(out.events.is_empty());
    }

    #[test]
    fn assignee_completes_after_last_outstanding_item() {
        let x = Item::new("X", "first", Status::Open).with_assignee("A");
        let y = Item::new("Y", "second", Status::Open).with_assignee("A");
        let s0 = baseline(&[x.clone(), y.clone()]);

        let x_closed = Item::new("X", "first", Status::Closed).with_assignee("A");
        let s1 = diff(&map(&[x_closed.clone(), y.clone()]), &s0);
        assert_eq!(kinds(&s1), vec![(EventKind::Completed, "X".to_string())]);

        let y_closed = Item::new("Y", "second", Status::Closed).with_assignee("A");
        let s2 = diff(&map(&[x_closed, y_closed]), &s1.next);
        assert_eq!(
            kinds(&s2),
            vec![
                (EventKind::Completed, "Y".to_string()),
                (EventKind::AssigneeAllComplete, "A".to_string()),
            ]
        );
        match &s2.events[1] {
            Event::AssigneeAllComplete { agent, items } => {
                assert_eq!(agent, "A");
                let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
                assert_eq!(ids, vec!["X", "Y"]);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn closing_several_items_of_one_agent_emits_one_summary() {
        let s0 = baseline(&[
            Item::new("X", "a", Status::Open).with_assignee("A"),
            Item::new("Y", "b", Status::InProgress).with_assignee("A"),
        ]);

        let out = diff(
            &map(&[
                Item::new("X", "a", Status::Closed).with_assignee("A"),
                Item::new("Y", "b", Status::Closed).with_assignee("A"),
            ]),
            &s0,
        );
        assert_eq!(
            kinds(&out),
            vec![
                (EventKind::Completed, "X".to_string()),
                (EventKind::Completed, "Y".to_string()),
                (EventKind::AssigneeAllComplete, "A".to_string()),
            ]
        );
    }

    #[test]
    fn outstanding_item_later_in_id_order_blocks_summary() {
        let s0 = baseline(&[
            Item::new("A-1", "a", Status::Open).with_assignee("alice"),
            Item::new("Z-9", "z", Status::Open),
        ]);

        // Z-9 is handed to alice in the same scan that closes A-1.
        let out = diff(
            &map(&[
                Item::new("A-1", "a", Status::Closed).with_assignee("alice"),
                Item::new("Z-9", "z", Status::Open).with_assignee("alice"),
            ]),
            &s0,
        );
        assert_eq!(kinds(&out), vec![(EventKind::Completed, "A-1".to_string())]);
        assert!(out.next.index.outstanding("alice").unwrap().contains("Z-9"));
    }

    #[test]
    fn outstanding_item_handed_away_later_in_id_order_allows_summary() {
        let s0 = baseline(&[
            Item::new("A-1", "a", Status::Open).with_assignee("alice"),
            Item::new("Z-9", "z", Status::InProgress).with_assignee("alice"),
        ]);

        // Z-9 leaves alice in the same scan that closes A-1.
        let out = diff(
            &map(&[
                Item::new("A-1", "a", Status::Closed).with_assignee("alice"),
                Item::new("Z-9", "z", Status::InProgress).with_assignee("bob"),
            ]),
            &s0,
        );
        assert_eq!(
            kinds(&out),
            vec![
                (EventKind::Completed, "A-1".to_string()),
                (EventKind::AssigneeAllComplete, "alice".to_string()),
            ]
        );
        assert!(out.next.index.is_clear("alice"));
        assert!(!out.next.index.is_clear("bob"));
    }

    #[test]
    fn completed_without_agent_has_no_summary() {
        let prev = baseline(&[Item::new("X-1", "t", Status::Open)]);
        let out = diff(&map(&[Item::new("X-1", "t", Status::Closed)]), &prev);
        assert_eq!(out.events.len(), 1);
    }

    #[test]
    fn reassignment_moves_index_membership() {
        let prev = baseline(&[Item::new("X-1", "t", Status::Open).with_assignee("alice")]);
        let out = diff(
            &map(&[Item::new("X-1", "t", Status::Open).with_assignee("bob")]),
            &prev,
        );
        assert!(out.events.is_empty());
        assert!(out.next.index.is_clear("alice"));
        assert!(out.next.index.outstanding("bob").unwrap().contains("X-1"));
    }

    #[test]
    fn comment_directive_reassignment_is_tracked() {
        let item = Item::new("X-1", "t", Status::Open).with_comment("@assigned alice");
        let prev = baseline(&[item.clone()]);
        let out = diff(&map(&[item.with_comment("@assigned bob")]), &prev);
        assert!(out.next.index.is_clear("alice"));
        assert_eq!(out.next.records["X-1"].agent.as_deref(), Some("bob"));
    }

    #[test]
    fn vanished_items_are_dropped_silently() {
        let prev = baseline(&[
            Item::new("X-1", "a", Status::Open).with_assignee("alice"),
            Item::new("X-2", "b", Status::Open),
        ]);
        let out = diff(&map(&[Item::new("X-2", "b", Status::Open)]), &prev);
        assert!(out.events.is_empty());
        assert!(!out.next.records.contains_key("X-1"));
        assert!(out.next.index.is_empty());
    }

    #[test]
    fn summary_lists_only_closed_items_of_that_agent() {
        let prev = baseline(&[
            Item::new("X-1", "a", Status::InProgress).with_assignee("alice"),
            Item::new("X-2", "b", Status::Closed).with_assignee("alice"),
            Item::new("X-3", "c", Status::Closed).with_assignee("bob"),
        ]);
        let out = diff(
            &map(&[
                Item::new("X-1", "a", Status::Closed).with_assignee("alice"),
                Item::new("X-2", "b", Status::Closed).with_assignee("alice"),
                Item::new("X-3", "c", Status::Closed).with_assignee("bob"),
            ]),
            &prev,
        );
        let Some(Event::AssigneeAllComplete { items, .. }) = out.events.last() else {
            panic!("expected summary, got {:?}", out.events);
        };
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["X-1", "X-2"]);
    }

    fn arb_status() -> impl Strategy<Value = Status> {
        prop_oneof![
            Just(Status::Open),
            Just(Status::InProgress),
            Just(Status::Closed),
            Just(Status::Other("blocked".to_string())),
        ]
    }

    fn arb_items() -> impl Strategy<Value = Vec<Item>> {
        proptest::collection::vec(
            (0u8..12, arb_status(), proptest::option::of(0u8..3)),
            0..12,
        )
        .prop_map(|rows| {
            rows.into_iter()
                .map(|(id, status, agent)| {
                    let item = Item::new(format!("I-{id}"), "t", status);
                    match agent {
                        Some(a) => item.with_assignee(format!("agent-{a}")),
                        None => item,
                    }
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn next_snapshot_is_total_and_index_is_derivable(
            first in arb_items(),
            second in arb_items(),
        ) {
            let s1 = diff(&map(&first), &SnapshotStore::new());
            let current = map(&second);
            let s2 = diff(&current, &s1.next);

            let ids: Vec<&String> = s2.next.records.keys().collect();
            let expected: Vec<&String> = current.keys().collect();
            prop_assert_eq!(ids, expected);
            prop_assert_eq!(
                &s2.next.index,
                &AssigneeIndex::rebuild(s2.next.records.values())
            );

            let again = diff(&current, &s2.next);
            prop_assert!(again.events.is_empty());
            prop_assert_eq!(again.next, s2.next);
        }

        #[test]
        fn first_sight_never_emits_transitions(items in arb_items()) {
            let out = diff(&map(&items), &SnapshotStore::new());
            prop_assert!(out.events.iter().all(|e| e.kind() == EventKind::Created));
        }
    }
}
