use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dd_common::events::{EventBus, SnapshotEvent};
use dd_common::types::{CacheStats, DisplayEntry, EntryGroup, Snapshot};
use dd_resolver::group_entries;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};

use crate::cycle::{Sources, run_cycle};
use crate::machine::{Effect, Phase, RefreshMachine};
use crate::store::SnapshotStore;

const COMMAND_QUEUE: usize = 64;

#[derive(Debug, Clone)]
pub struct RefreshSettings {
    /// Quiet period after the last request before a cycle starts.
    pub debounce: Duration,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(5),
        }
    }
}

enum Command {
    Request,
    Immediate { done: oneshot::Sender<bool> },
}

/// Owns the refresh machine. Runs as a single task; everything else talks
/// to it through a [`CoordinatorHandle`].
pub struct Coordinator {
    machine: RefreshMachine,
    sources: Sources,
    store: Arc<SnapshotStore>,
    events: Arc<EventBus>,
    phase: watch::Sender<Phase>,
    debounce: Duration,
}

impl Coordinator {
    /// Start the coordinator task. The store begins empty; nothing is
    /// fetched until the first request or immediate refresh.
    pub fn spawn(
        sources: Sources,
        bookmarks: Vec<DisplayEntry>,
        settings: RefreshSettings,
    ) -> CoordinatorHandle {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
        let (phase_tx, phase_rx) = watch::channel(Phase::Idle);
        let store = Arc::new(SnapshotStore::new());
        let events = Arc::new(EventBus::new());

        let coordinator = Coordinator {
            machine: RefreshMachine::new(),
            sources,
            store: Arc::clone(&store),
            events: Arc::clone(&events),
            phase: phase_tx,
            debounce: settings.debounce,
        };
        tokio::spawn(coordinator.run(rx));

        CoordinatorHandle {
            tx,
            store,
            events,
            bookmarks: Arc::new(bookmarks),
            phase: phase_rx,
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        let mut deadline: Option<Instant> = None;
        let mut in_flight: Option<JoinHandle<()>> = None;
        let mut waiters: Vec<oneshot::Sender<bool>> = Vec::new();

        loop {
            let effect = tokio::select! {
                command = rx.recv() => match command {
                    Some(Command::Request) => self.machine.on_request(),
                    Some(Command::Immediate { done }) => {
                        let effect = self.machine.on_immediate();
                        if effect == Effect::StartRefresh {
                            waiters.push(done);
                        } else {
                            debug!("Immediate refresh skipped, a cycle is already running");
                            let _ = done.send(false);
                        }
                        effect
                    }
                    None => break,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    deadline = None;
                    self.machine.on_timer()
                }
                joined = wait_cycle(&mut in_flight), if in_flight.is_some() => {
                    in_flight = None;
                    let published = match joined {
                        Ok(()) => true,
                        Err(e) => {
                            error!("Refresh task aborted: {e}");
                            self.publish_aborted(&e).await;
                            false
                        }
                    };
                    for done in waiters.drain(..) {
                        let _ = done.send(published);
                    }
                    self.machine.on_complete()
                }
            };

            match effect {
                Effect::None => {}
                Effect::ArmTimer => deadline = Some(Instant::now() + self.debounce),
                Effect::StartRefresh => {
                    deadline = None;
                    in_flight = Some(tokio::spawn(refresh(
                        self.sources.clone(),
                        Arc::clone(&self.store),
                        Arc::clone(&self.events),
                    )));
                }
            }
            self.phase.send_replace(self.machine.phase());
        }

        debug!("Refresh coordinator stopped");
    }

    /// A cycle task that panicked or was cancelled never published; carry the
    /// previous data over with the abort recorded as the error.
    async fn publish_aborted(&self, e: &JoinError) {
        let previous = self.store.current().await;
        let snapshot = Snapshot::failed(&previous, format!("refresh task aborted: {e}"), Utc::now());
        announce(&self.store, &self.events, snapshot).await;
    }
}

async fn wait_cycle(task: &mut Option<JoinHandle<()>>) -> Result<(), JoinError> {
    match task {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

/// One cycle: build a snapshot (or carry the previous one over with the
/// error), publish it, then announce it on the event bus.
async fn refresh(sources: Sources, store: Arc<SnapshotStore>, events: Arc<EventBus>) {
    let started = Instant::now();

    let snapshot = match run_cycle(&sources).await {
        Ok(output) => {
            let report = &output.report;
            info!(
                environments = report.environments,
                entries = report.entries,
                skipped = report.skipped_environments.len(),
                proxy_hosts = %report.proxy_hosts,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Refresh cycle complete"
            );
            Snapshot::fresh(output.environments, output.entries, Utc::now())
        }
        Err(e) => {
            warn!("Refresh cycle failed, keeping previous data: {e}");
            let previous = store.current().await;
            Snapshot::failed(&previous, e.to_string(), Utc::now())
        }
    };

    announce(&store, &events, snapshot).await;
}

async fn announce(store: &SnapshotStore, events: &EventBus, snapshot: Snapshot) {
    let environments = snapshot.environments.len();
    let entries = snapshot.entries.len();
    let error = snapshot.last_error.clone();
    let cycle = store.publish(snapshot).await;

    // No subscribers is fine.
    let _ = events.snapshots.send(SnapshotEvent {
        cycle,
        environments,
        entries,
        error,
    });
}

/// Cheap, cloneable access to the coordinator and its published data.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<Command>,
    store: Arc<SnapshotStore>,
    events: Arc<EventBus>,
    bookmarks: Arc<Vec<DisplayEntry>>,
    phase: watch::Receiver<Phase>,
}

impl CoordinatorHandle {
    /// Debounced refresh trigger. Never blocks.
    pub fn request_refresh(&self) {
        match self.tx.try_send(Command::Request) {
            Ok(()) => {}
            // Queued requests already cover this one.
            Err(TrySendError::Full(_)) => debug!("Refresh queue full, request coalesced"),
            Err(TrySendError::Closed(_)) => warn!("Refresh coordinator stopped, request dropped"),
        }
    }

    /// Run a cycle now, bypassing the debounce. Resolves `true` once the
    /// cycle it started has published, `false` if a cycle was already running
    /// or the cycle task aborted.
    pub async fn refresh_immediate(&self) -> bool {
        let (done, rx) = oneshot::channel();
        if self.tx.send(Command::Immediate { done }).await.is_err() {
            warn!("Refresh coordinator stopped, immediate refresh dropped");
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Latest published snapshot with the bookmarks appended.
    pub async fn get(&self) -> Snapshot {
        let published = self.store.current().await;
        let mut snapshot = Snapshot::clone(&published);
        snapshot.entries.extend(self.bookmarks.iter().cloned());
        snapshot
    }

    pub async fn groups(&self) -> Vec<EntryGroup> {
        group_entries(&self.get().await.entries)
    }

    pub async fn stats(&self) -> CacheStats {
        let snapshot = self.get().await;
        CacheStats {
            environments: snapshot.environments.len(),
            entries: snapshot.entries.len(),
            bookmarks: self.bookmarks.len(),
            groups: group_entries(&snapshot.entries).len(),
            last_update_time: snapshot.last_update_time,
            last_error: snapshot.last_error,
            refreshing: self.phase() == Phase::Refreshing,
            cycles: self.store.cycles(),
        }
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    pub fn watch_phase(&self) -> watch::Receiver<Phase> {
        self.phase.clone()
    }

    /// Snapshot publications, one event per completed cycle.
    pub fn subscribe(&self) -> broadcast::Receiver<SnapshotEvent> {
        self.events.snapshots.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use dd_common::types::{Environment, EnvironmentRef, PortBinding, ProxyHost, RawRecord};
    use dd_upstream::{ContainerSource, ProxyHostSource, UpstreamError};
    use tokio::time::sleep;

    use super::*;

    const DEBOUNCE: Duration = Duration::from_secs(5);
    const CYCLE_TIME: Duration = Duration::from_secs(10);

    /// Container source whose environment listing takes `CYCLE_TIME` of
    /// (paused) clock time and counts calls and overlap.
    struct SlowSource {
        environments: Mutex<Result<Vec<Environment>, UpstreamError>>,
        calls: AtomicUsize,
        running: AtomicUsize,
        max_running: AtomicUsize,
    }

    impl SlowSource {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                environments: Mutex::new(Ok(vec![Environment {
                    id: "1".into(),
                    name: "local".into(),
                    kind: None,
                    public_ip: "10.0.0.5".into(),
                }])),
                calls: AtomicUsize::new(0),
                running: AtomicUsize::new(0),
                max_running: AtomicUsize::new(0),
            })
        }

        fn fail_with(&self, error: UpstreamError) {
            *self.environments.lock().unwrap() = Err(error);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ContainerSource for SlowSource {
        async fn environments(&self) -> Result<Vec<Environment>, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            sleep(CYCLE_TIME).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            self.environments.lock().unwrap().clone()
        }

        async fn containers(&self, _environment_id: &str) -> Result<Vec<RawRecord>, UpstreamError> {
            Ok(vec![RawRecord {
                id: "abc".into(),
                name: "/web".into(),
                image: "nginx".into(),
                state: "running".into(),
                ports: vec![PortBinding {
                    ip: "0.0.0.0".into(),
                    private_port: Some(80),
                    public_port: Some(8080),
                    protocol: Some("tcp".into()),
                }],
                ..Default::default()
            }])
        }
    }

    struct DownProxy;

    #[async_trait]
    impl ProxyHostSource for DownProxy {
        async fn proxy_hosts(&self) -> Result<Vec<ProxyHost>, UpstreamError> {
            Err(UpstreamError::Request("connection refused".into()))
        }
    }

    fn bookmark() -> DisplayEntry {
        DisplayEntry {
            id: "bookmark-0011223344556677".into(),
            display_name: "Router".into(),
            group: "Network".into(),
            environment_ref: EnvironmentRef::bookmark(),
            url: "http://192.168.1.1".into(),
            icon: None,
            icon_url: String::new(),
            image: String::new(),
        }
    }

    fn spawn(source: &Arc<SlowSource>, bookmarks: Vec<DisplayEntry>) -> CoordinatorHandle {
        let sources = Sources {
            containers: Arc::clone(source) as Arc<dyn ContainerSource>,
            proxy_hosts: None,
        };
        Coordinator::spawn(sources, bookmarks, RefreshSettings { debounce: DEBOUNCE })
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_runs_one_cycle() {
        let source = SlowSource::new();
        let handle = spawn(&source, Vec::new());

        for _ in 0..10 {
            handle.request_refresh();
            sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(handle.phase(), Phase::PendingDebounce);
        assert_eq!(source.calls(), 0);

        sleep(Duration::from_secs(60)).await;
        assert_eq!(source.calls(), 1);
        assert_eq!(handle.phase(), Phase::Idle);
        assert_eq!(handle.get().await.entries.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_during_cycle_run_exactly_one_more() {
        let source = SlowSource::new();
        let handle = spawn(&source, Vec::new());

        // Cycle 1 runs from t=5 to t=15.
        handle.request_refresh();
        sleep(Duration::from_secs(7)).await;
        assert_eq!(handle.phase(), Phase::Refreshing);

        // Fires at t=12 (mid-cycle); the t=13 request is absorbed too.
        handle.request_refresh();
        sleep(Duration::from_secs(6)).await;
        handle.request_refresh();

        sleep(Duration::from_secs(60)).await;
        assert_eq!(source.calls(), 2);
        assert_eq!(source.max_running.load(Ordering::SeqCst), 1);
        assert_eq!(handle.stats().await.cycles, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_skipped_while_refreshing() {
        let source = SlowSource::new();
        let handle = spawn(&source, Vec::new());

        let first = tokio::spawn({
            let handle = handle.clone();
            async move { handle.refresh_immediate().await }
        });

        let mut phase = handle.watch_phase();
        phase.wait_for(|p| *p == Phase::Refreshing).await.unwrap();

        assert!(!handle.refresh_immediate().await);
        assert!(first.await.unwrap());
        assert_eq!(source.calls(), 1);
        assert_eq!(handle.phase(), Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_keeps_previous_entries() {
        let source = SlowSource::new();
        let handle = spawn(&source, Vec::new());

        assert!(handle.refresh_immediate().await);
        let first = handle.get().await;
        assert_eq!(first.entries.len(), 1);
        assert!(first.last_error.is_none());

        source.fail_with(UpstreamError::Auth("bad password".into()));
        assert!(handle.refresh_immediate().await);

        let second = handle.get().await;
        assert_eq!(second.entries, first.entries);
        assert_eq!(second.environments, first.environments);
        assert!(second.last_error.as_deref().unwrap().contains("bad password"));
        assert!(second.last_update_time.is_some());
        assert!(second.last_update_time >= first.last_update_time);
        assert_eq!(handle.stats().await.cycles, 2);
    }

    struct PanickingSource;

    #[async_trait]
    impl ContainerSource for PanickingSource {
        async fn environments(&self) -> Result<Vec<Environment>, UpstreamError> {
            panic!("environment listing blew up");
        }

        async fn containers(&self, _environment_id: &str) -> Result<Vec<RawRecord>, UpstreamError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborted_cycle_reports_failure() {
        let sources = Sources {
            containers: Arc::new(PanickingSource),
            proxy_hosts: None,
        };
        let handle = Coordinator::spawn(sources, vec![bookmark()], RefreshSettings::default());
        let mut events = handle.subscribe();

        assert!(!handle.refresh_immediate().await);
        assert_eq!(handle.phase(), Phase::Idle);

        let snapshot = handle.get().await;
        assert!(snapshot.last_error.as_deref().unwrap().contains("aborted"));
        assert!(snapshot.last_update_time.is_some());
        assert_eq!(snapshot.entries, vec![bookmark()]);

        let event = events.recv().await.unwrap();
        assert_eq!(event.cycle, 1);
        assert!(event.error.is_some());

        // The coordinator keeps serving after a panicked cycle.
        assert!(!handle.refresh_immediate().await);
        assert_eq!(handle.stats().await.cycles, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_proxy_outage_does_not_fail_cycle() {
        let source = SlowSource::new();
        let sources = Sources {
            containers: Arc::clone(&source) as Arc<dyn ContainerSource>,
            proxy_hosts: Some(Arc::new(DownProxy)),
        };
        let handle = Coordinator::spawn(sources, Vec::new(), RefreshSettings::default());

        assert!(handle.refresh_immediate().await);
        let snapshot = handle.get().await;
        assert!(snapshot.last_error.is_none());
        assert_eq!(snapshot.entries[0].url, "http://10.0.0.5:8080");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_do_not_wait_for_cycle() {
        let source = SlowSource::new();
        let handle = spawn(&source, vec![bookmark()]);

        // Bookmarks are visible before any cycle has run.
        let before = handle.get().await;
        assert_eq!(before.entries.len(), 1);
        assert!(before.last_update_time.is_none());

        let running = tokio::spawn({
            let handle = handle.clone();
            async move { handle.refresh_immediate().await }
        });
        handle
            .watch_phase()
            .wait_for(|p| *p == Phase::Refreshing)
            .await
            .unwrap();

        let started = Instant::now();
        let during = handle.get().await;
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(during, before);

        assert!(running.await.unwrap());
        let after = handle.get().await;
        assert_eq!(after.entries.len(), 2);
        assert!(after.entries.last().unwrap().environment_ref.is_bookmark());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_and_events() {
        let source = SlowSource::new();
        let handle = spawn(&source, vec![bookmark()]);
        let mut events = handle.subscribe();

        assert!(handle.refresh_immediate().await);

        let event = events.recv().await.unwrap();
        assert_eq!(event.cycle, 1);
        assert_eq!(event.entries, 1);
        assert!(event.error.is_none());

        let stats = handle.stats().await;
        assert_eq!(stats.environments, 1);
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.bookmarks, 1);
        assert_eq!(stats.groups, 2);
        assert_eq!(stats.cycles, 1);
        assert!(!stats.refreshing);
        assert!(stats.last_update_time.is_some());

        let groups = handle.groups().await;
        let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["Network", "ungrouped"]);
    }
}
