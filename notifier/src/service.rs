//! The scan cycle: read the store, diff, dispatch and persist.
//!
//! [`NotifierService`] owns the in-memory snapshot and the dispatcher. The
//! daemon calls [`NotifierService::initialize`] once and
//! [`NotifierService::scan`] for every admitted trigger; scans never overlap
//! because the service is driven from a single task.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::diff::diff;
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::snapshot::{SnapshotError, SnapshotStore};
use crate::store::{parse_store, ReadError};
use crate::transport::Transport;
use crate::types::Event;

/// What one scan detected and what happened to each notification.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    /// Events in emission order.
    pub events: Vec<Event>,

    /// One outcome per event, in the same order.
    pub outcomes: Vec<DispatchOutcome>,
}

impl ScanReport {
    /// Number of notifications actually delivered.
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_delivered()).count()
    }
}

/// Watches one issue store and notifies about its changes.
#[derive(Debug)]
pub struct NotifierService<T> {
    issues_path: PathBuf,
    state_path: PathBuf,
    snapshot: SnapshotStore,
    dispatcher: Dispatcher<T>,
}

impl<T: Transport> NotifierService<T> {
    /// Creates a service with an empty snapshot.
    #[must_use]
    pub fn new(
        issues_path: impl Into<PathBuf>,
        state_path: impl Into<PathBuf>,
        dispatcher: Dispatcher<T>,
    ) -> Self {
        Self {
            issues_path: issues_path.into(),
            state_path: state_path.into(),
            snapshot: SnapshotStore::new(),
            dispatcher,
        }
    }

    /// Loads the persisted snapshot and absorbs the current store contents
    /// without notifying.
    ///
    /// Returns the number of items absorbed. A missing store leaves the
    /// loaded snapshot as it is.
    pub fn initialize(&mut self) -> usize {
        self.snapshot = SnapshotStore::load(&self.state_path);

        let absorbed = match parse_store(&self.issues_path) {
            Ok(parsed) => self.snapshot.absorb_baseline(&parsed.items),
            Err(e) => {
                warn!(error = %e, "Issue store not readable at startup");
                0
            }
        };

        info!(
            known = self.snapshot.records.len(),
            absorbed,
            "Established baseline"
        );
        self.persist_or_warn();
        absorbed
    }

    /// Runs one scan cycle.
    ///
    /// # Errors
    ///
    /// Returns [`ReadError`] if the store cannot be read; the snapshot is left
    /// untouched and nothing is sent.
    pub async fn scan(&mut self) -> Result<ScanReport, ReadError> {
        let parsed = parse_store(&self.issues_path)?;
        if parsed.items.is_empty() && !self.snapshot.records.is_empty() {
            warn!(
                path = %self.issues_path.display(),
                known = self.snapshot.records.len(),
                skipped = parsed.skipped,
                "Issue store is empty, dropping every known item"
            );
        }
        let outcome = diff(&parsed.items, &self.snapshot);

        let mut outcomes = Vec::with_capacity(outcome.events.len());
        for event in &outcome.events {
            outcomes.push(self.dispatcher.dispatch(event).await);
        }

        self.snapshot = outcome.next;
        self.persist_or_warn();

        let report = ScanReport {
            events: outcome.events,
            outcomes,
        };
        if report.events.is_empty() {
            debug!(items = parsed.items.len(), "Scan found no changes");
        } else {
            info!(
                items = parsed.items.len(),
                events = report.events.len(),
                delivered = report.delivered(),
                "Scan complete"
            );
        }
        Ok(report)
    }

    /// Writes the snapshot to the state file.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] if the write fails.
    pub fn persist(&self) -> Result<(), SnapshotError> {
        self.snapshot.save(&self.state_path)
    }

    fn persist_or_warn(&self) {
        if let Err(e) = self.persist() {
            warn!(path = %self.state_path.display(), error = %e, "Failed to save state file");
        }
    }

    /// The current in-memory snapshot.
    #[must_use]
    pub fn snapshot(&self) -> &SnapshotStore {
        &self.snapshot
    }

    /// The dispatcher used for every event.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher<T> {
        &self.dispatcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotifyPolicy;
    use crate::dispatch::SkipReason;
    use crate::transport::test_support::RecordingTransport;
    use crate::types::{EventKind, Status};
    use std::fs;
    use std::io::{self, Write};
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn line(id: &str, status: &str, assignee: Option<&str>) -> String {
        let mut value = serde_json::json!({
            "id": id,
            "title": format!("Task {id}"),
            "status": status,
        });
        if let Some(a) = assignee {
            value["assignee"] = serde_json::json!(a);
        }
        value.to_string()
    }

    fn write_store(path: &Path, lines: &[String]) {
        fs::write(path, lines.join("\n") + "\n").unwrap();
    }

    struct Fixture {
        _dir: TempDir,
        issues: PathBuf,
        state: PathBuf,
        transport: RecordingTransport,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let beads = dir.path().join(".beads");
            fs::create_dir_all(&beads).unwrap();
            Self {
                issues: beads.join("issues.jsonl"),
                state: beads.join("state.json"),
                transport: RecordingTransport::default(),
                _dir: dir,
            }
        }

        fn service(&self, policy: NotifyPolicy) -> NotifierService<RecordingTransport> {
            let dispatcher = Dispatcher::new(policy, Some(self.transport.clone()), None);
            NotifierService::new(&self.issues, &self.state, dispatcher)
        }
    }

    #[tokio::test]
    async fn baseline_is_silent_and_persisted() {
        let fx = Fixture::new();
        write_store(&fx.issues, &[line("X-1", "open", None), line("X-2", "closed", None)]);

        let mut service = fx.service(NotifyPolicy::default());
        assert_eq!(service.initialize(), 2);
        assert!(fx.transport.sent().is_empty());
        assert_eq!(SnapshotStore::load(&fx.state).records.len(), 2);

        let report = service.scan().await.unwrap();
        assert!(report.events.is_empty());
    }

    #[tokio::test]
    async fn work_started_is_notified_once() {
        let fx = Fixture::new();
        write_store(&fx.issues, &[line("X-1", "open", None)]);
        let mut service = fx.service(NotifyPolicy::default());
        service.initialize();

        write_store(&fx.issues, &[line("X-1", "in_progress", None)]);
        let report = service.scan().await.unwrap();
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].kind(), EventKind::WorkStarted);
        assert_eq!(report.delivered(), 1);
        assert!(fx.transport.sent()[0].text.contains("Task X-1"));

        let report = service.scan().await.unwrap();
        assert!(report.events.is_empty());
        assert_eq!(fx.transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn disabled_kind_still_updates_snapshot() {
        let fx = Fixture::new();
        write_store(&fx.issues, &[line("X-1", "open", None)]);
        let policy = NotifyPolicy::default().with(EventKind::WorkStarted, false);
        let mut service = fx.service(policy);
        service.initialize();

        write_store(&fx.issues, &[line("X-1", "in_progress", None)]);
        let report = service.scan().await.unwrap();
        assert_eq!(
            report.outcomes,
            vec![DispatchOutcome::Skipped(SkipReason::Disabled)]
        );
        assert!(fx.transport.sent().is_empty());
        assert_eq!(service.snapshot().records["X-1"].status, Status::InProgress);
    }

    #[tokio::test]
    async fn disabled_completion_still_clears_assignee() {
        let fx = Fixture::new();
        write_store(&fx.issues, &[line("X-1", "open", Some("alice"))]);
        let policy = NotifyPolicy::default().with(EventKind::Completed, false);
        let mut service = fx.service(policy);
        service.initialize();
        assert!(!service.snapshot().index.is_clear("alice"));

        write_store(&fx.issues, &[line("X-1", "closed", Some("alice"))]);
        let report = service.scan().await.unwrap();

        let kinds: Vec<_> = report.events.iter().map(Event::kind).collect();
        assert_eq!(
            kinds,
            vec![EventKind::Completed, EventKind::AssigneeAllComplete]
        );
        assert_eq!(
            report.outcomes[0],
            DispatchOutcome::Skipped(SkipReason::Disabled)
        );
        assert!(service.snapshot().index.is_clear("alice"));
        assert_eq!(service.snapshot().records["X-1"].status, Status::Closed);
    }

    #[tokio::test]
    async fn closing_with_completion_kinds_disabled_sends_nothing() {
        let fx = Fixture::new();
        write_store(&fx.issues, &[line("X-1", "open", Some("alice"))]);
        let policy = NotifyPolicy::default()
            .with(EventKind::Completed, false)
            .with(EventKind::AssigneeAllComplete, false);
        let mut service = fx.service(policy);
        service.initialize();

        write_store(&fx.issues, &[line("X-1", "closed", Some("alice"))]);
        let report = service.scan().await.unwrap();

        assert_eq!(
            report.outcomes,
            vec![
                DispatchOutcome::Skipped(SkipReason::Disabled),
                DispatchOutcome::Skipped(SkipReason::Disabled)
            ]
        );
        assert!(fx.transport.sent().is_empty());
        assert!(service.snapshot().index.is_clear("alice"));
        assert!(SnapshotStore::load(&fx.state).index.is_clear("alice"));
    }

    #[tokio::test]
    async fn disabled_agent_summary_still_clears_assignee() {
        let fx = Fixture::new();
        write_store(&fx.issues, &[line("X-1", "in_progress", Some("alice"))]);
        let policy = NotifyPolicy::default().with(EventKind::AssigneeAllComplete, false);
        let mut service = fx.service(policy);
        service.initialize();

        write_store(&fx.issues, &[line("X-1", "closed", Some("alice"))]);
        let report = service.scan().await.unwrap();

        assert_eq!(
            report.outcomes,
            vec![
                DispatchOutcome::Delivered,
                DispatchOutcome::Skipped(SkipReason::Disabled)
            ]
        );
        assert_eq!(fx.transport.sent().len(), 1);
        assert!(service.snapshot().index.is_clear("alice"));
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn emptied_store_is_warned_about() {
        let buf = SharedBuf::default();
        let sink = buf.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || sink.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let fx = Fixture::new();
        write_store(&fx.issues, &[line("X-1", "open", None)]);
        let mut service = fx.service(NotifyPolicy::default());
        service.initialize();

        fs::write(&fx.issues, "").unwrap();
        let report = service.scan().await.unwrap();
        assert!(report.events.is_empty());
        assert!(service.snapshot().records.is_empty());

        let out = buf.contents();
        assert!(out.contains("WARN"), "{out}");
        assert!(out.contains("Issue store is empty"), "{out}");
    }

    #[tokio::test]
    async fn missing_store_skips_cycle() {
        let fx = Fixture::new();
        write_store(&fx.issues, &[line("X-1", "open", None)]);
        let mut service = fx.service(NotifyPolicy::default());
        service.initialize();

        fs::remove_file(&fx.issues).unwrap();
        assert!(service.scan().await.is_err());
        assert_eq!(service.snapshot().records.len(), 1);
    }

    #[tokio::test]
    async fn restart_reports_transition_made_while_stopped() {
        let fx = Fixture::new();
        write_store(&fx.issues, &[line("X-1", "open", Some("alice"))]);
        fx.service(NotifyPolicy::default()).initialize();

        write_store(&fx.issues, &[line("X-1", "closed", Some("alice"))]);
        let mut service = fx.service(NotifyPolicy::default());
        assert_eq!(service.initialize(), 0);

        let report = service.scan().await.unwrap();
        let kinds: Vec<_> = report.events.iter().map(Event::kind).collect();
        assert_eq!(
            kinds,
            vec![EventKind::Completed, EventKind::AssigneeAllComplete]
        );
    }

    #[tokio::test]
    async fn new_item_after_baseline_is_created() {
        let fx = Fixture::new();
        write_store(&fx.issues, &[line("X-1", "open", None)]);
        let mut service = fx.service(NotifyPolicy::default());
        service.initialize();

        write_store(&fx.issues, &[line("X-1", "open", None), line("X-2", "open", None)]);
        let report = service.scan().await.unwrap();
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].kind(), EventKind::Created);
        assert_eq!(report.events[0].subject(), "X-2");
    }
}
