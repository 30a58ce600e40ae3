//! Durable last-known state of every item.
//!
//! The snapshot is the diff baseline: one [`SnapshotRecord`] per item seen in
//! the most recent processed scan, plus an [`AssigneeIndex`] of outstanding
//! item ids per agent. The index is a cache and can always be rebuilt from
//! the records with [`AssigneeIndex::rebuild`].
//!
//! # On-disk format
//!
//! A single pretty-printed JSON document, rewritten in full after every
//! processed scan and kept at mode `0600`:
//!
//! ```json
//! {
//!   "previous_issues": {
//!     "X-1": { "id": "X-1", "status": "open", "assignee": null, "title": "Fix bug", "agent": null }
//!   },
//!   "assignee_issues": {
//!     "alice": ["X-2", "X-3"]
//!   }
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::secrets::write_private;
use crate::types::{Item, Status};

/// Errors that can occur while persisting the snapshot.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// Failed to write the state file.
    #[error("failed to write state file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to serialize the snapshot.
    #[error("failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Minimal persisted projection of an [`Item`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub id: String,

    pub status: Status,

    #[serde(default)]
    pub assignee: Option<String>,

    #[serde(default)]
    pub title: String,

    /// Resolved agent at the time of the snapshot. Absent in state files
    /// written before it was recorded.
    #[serde(default)]
    pub agent: Option<String>,
}

impl SnapshotRecord {
    /// Projects an item.
    #[must_use]
    pub fn from_item(item: &Item) -> Self {
        Self {
            id: item.id.clone(),
            status: item.status.clone(),
            assignee: item.assignee.clone(),
            title: item.title.clone(),
            agent: item.assigned_agent(),
        }
    }
}

/// Outstanding item ids per agent.
///
/// An id appears in at most one agent's set, and only while its status is
/// outstanding. Agents with no outstanding items have no entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssigneeIndex(BTreeMap<String, BTreeSet<String>>);

impl AssigneeIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Places `id` according to its current agent and status.
    ///
    /// The id is removed from every set, then added under `agent` if one is
    /// given and `status` is outstanding. Sets left empty are dropped.
    pub fn place(&mut self, id: &str, agent: Option<&str>, status: &Status) {
        self.remove(id);

        if let Some(agent) = agent {
            if status.is_outstanding() {
                self.0
                    .entry(agent.to_string())
                    .or_default()
                    .insert(id.to_string());
            }
        }
    }

    /// Removes `id` from whichever set holds it.
    pub fn remove(&mut self, id: &str) {
        self.0.retain(|_, ids| {
            ids.remove(id);
            !ids.is_empty()
        });
    }

    /// Outstanding ids for `agent`, if any.
    #[must_use]
    pub fn outstanding(&self, agent: &str) -> Option<&BTreeSet<String>> {
        self.0.get(agent)
    }

    /// Returns `true` if `agent` has no outstanding items.
    #[must_use]
    pub fn is_clear(&self, agent: &str) -> bool {
        self.outstanding(agent).map_or(true, BTreeSet::is_empty)
    }

    /// Drops every id for which `keep` returns `false`.
    pub fn retain_ids<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        self.0.retain(|_, ids| {
            ids.retain(|id| keep(id));
            !ids.is_empty()
        });
    }

    /// Recomputes the index from snapshot records alone.
    #[must_use]
    pub fn rebuild<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a SnapshotRecord>,
    {
        let mut index = Self::new();
        for record in records {
            index.place(&record.id, record.agent.as_deref(), &record.status);
        }
        index
    }

    /// Agents with at least one outstanding item, in order.
    pub fn agents(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of agents with outstanding items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no agent has outstanding items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The persisted snapshot: records plus the derived index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotStore {
    /// Last-seen projection per item id.
    #[serde(rename = "previous_issues", default)]
    pub records: BTreeMap<String, SnapshotRecord>,

    /// Outstanding ids per agent.
    #[serde(rename = "assignee_issues", default)]
    pub index: AssigneeIndex,
}

impl SnapshotStore {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the snapshot from `path`.
    ///
    /// A missing file yields an empty snapshot. An unreadable or corrupt file
    /// is logged and also yields an empty snapshot, which the startup
    /// baseline then repopulates silently. Index entries for unknown ids are
    /// discarded.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No state file, starting empty");
                return Self::new();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read state file, starting empty");
                return Self::new();
            }
        };

        match serde_json::from_str::<Self>(&contents) {
            Ok(mut store) => {
                let records = &store.records;
                store.index.retain_ids(|id| records.contains_key(id));
                debug!(
                    path = %path.display(),
                    records = store.records.len(),
                    agents = store.index.len(),
                    "Loaded state file"
                );
                store
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt state file, starting empty");
                Self::new()
            }
        }
    }

    /// Rewrites the state file at `path` with owner-only permissions.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] if serialization or the write fails. The
    /// in-memory snapshot is unaffected either way.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_vec_pretty(self)?;
        write_private(path, &json)?;
        debug!(path = %path.display(), records = self.records.len(), "Saved state file");
        Ok(())
    }

    /// Records `items` not yet in the snapshot without emitting anything.
    ///
    /// Known records are left as they are, so a transition that happened
    /// while the notifier was stopped is still reported by the next scan.
    /// Records for items no longer present are dropped. Returns the number
    /// of items absorbed.
    pub fn absorb_baseline(&mut self, items: &BTreeMap<String, Item>) -> usize {
        self.records.retain(|id, _| items.contains_key(id));
        let records = &self.records;
        self.index.retain_ids(|id| records.contains_key(id));

        let mut absorbed = 0;
        for (id, item) in items {
            if self.records.contains_key(id) {
                continue;
            }
            let record = SnapshotRecord::from_item(item);
            self.index
                .place(&record.id, record.agent.as_deref(), &record.status);
            self.records.insert(id.clone(), record);
            absorbed += 1;
        }
        absorbed
    }
}
