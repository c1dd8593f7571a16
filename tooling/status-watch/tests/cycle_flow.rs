use ethrex_status_watch::{
    alerter::{AlertError, AlertMessage, Notifier},
    feed::{FeedError, FeedReport, IncidentFeed},
    models::{FeedIncident, Impact, IncidentId, IncidentStatus, Snapshot},
    service::{CycleError, CycleOutcome, Delivery, run_cycle, watch},
    storage::{SnapshotStore, StorageError},
};
use reqwest::StatusCode;
use std::{
    collections::VecDeque,
    io,
    path::PathBuf,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::time;

const FALLBACK_PAGE: &str = "https://status.example.com";

#[derive(Default)]
struct ScriptedFeed {
    polls: Mutex<VecDeque<Result<FeedReport, FeedError>>>,
}

impl ScriptedFeed {
    fn push(&self, poll: Result<FeedReport, FeedError>) {
        if let Ok(mut guard) = self.polls.lock() {
            guard.push_back(poll);
        }
    }
}

#[async_trait::async_trait]
impl IncidentFeed for ScriptedFeed {
    async fn fetch_unresolved(&self) -> Result<FeedReport, FeedError> {
        let next = match self.polls.lock() {
            Ok(mut guard) => guard.pop_front(),
            Err(_) => None,
        };
        next.unwrap_or_else(|| Ok(FeedReport::default()))
    }
}

/// A feed whose polls never answer.
#[derive(Default)]
struct StalledFeed {
    polls: AtomicUsize,
}

#[async_trait::async_trait]
impl IncidentFeed for StalledFeed {
    async fn fetch_unresolved(&self) -> Result<FeedReport, FeedError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

#[derive(Default)]
struct MemoryStore {
    snapshot: Mutex<Option<Snapshot>>,
    fail_reads: bool,
}

impl SnapshotStore for MemoryStore {
    fn read(&self) -> Result<Option<Snapshot>, StorageError> {
        if self.fail_reads {
            return Err(StorageError::Io {
                path: PathBuf::from("memory"),
                source: io::Error::other("store offline"),
            });
        }
        Ok(self.snapshot.lock().ok().and_then(|guard| guard.clone()))
    }

    fn write(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        if let Ok(mut guard) = self.snapshot.lock() {
            *guard = Some(snapshot.clone());
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        if let Ok(mut guard) = self.snapshot.lock() {
            *guard = None;
        }
        Ok(())
    }
}

#[derive(Default)]
struct MockNotifier {
    sent: Mutex<Vec<AlertMessage>>,
    fail: bool,
}

impl MockNotifier {
    fn sent(&self) -> Vec<AlertMessage> {
        self.sent.lock().map(|guard| guard.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Notifier for MockNotifier {
    async fn send_alert(&self, message: &AlertMessage) -> Result<(), AlertError> {
        if self.fail {
            return Err(AlertError::WebhookStatus(StatusCode::BAD_GATEWAY));
        }
        if let Ok(mut guard) = self.sent.lock() {
            guard.push(message.clone());
        }
        Ok(())
    }
}

fn incident(id: &str, name: &str, status: IncidentStatus, impact: Impact) -> FeedIncident {
    FeedIncident {
        id: Some(id.to_owned()),
        name: name.to_owned(),
        status,
        impact,
    }
}

fn report(incidents: Vec<FeedIncident>) -> FeedReport {
    FeedReport {
        page_url: None,
        incidents,
    }
}

fn snapshot_of(ids: &[&str]) -> Snapshot {
    ids.iter().filter_map(|raw| IncidentId::parse(raw)).collect()
}

fn stored(store: &MemoryStore) -> Option<Snapshot> {
    store.read().ok().flatten()
}

#[tokio::test]
async fn incident_alerts_on_second_consecutive_poll_only() {
    let feed = ScriptedFeed::default();
    let store = MemoryStore::default();
    let notifier = MockNotifier::default();

    feed.push(Ok(report(vec![incident(
        "abc",
        "Actions",
        IncidentStatus::Investigating,
        Impact::Minor,
    )])));
    feed.push(Ok(report(vec![incident(
        "abc",
        "Actions",
        IncidentStatus::Identified,
        Impact::Minor,
    )])));
    feed.push(Ok(report(vec![])));
    feed.push(Ok(report(vec![incident(
        "abc",
        "Actions",
        IncidentStatus::Investigating,
        Impact::Minor,
    )])));

    let first = run_cycle(&feed, &store, &notifier, FALLBACK_PAGE).await;
    assert!(matches!(
        first,
        Ok(CycleOutcome::Evaluated {
            delivery: Delivery::NotNeeded,
            ..
        })
    ));
    assert!(notifier.sent().is_empty());
    assert_eq!(stored(&store), Some(snapshot_of(&["abc"])));

    let second = run_cycle(&feed, &store, &notifier, FALLBACK_PAGE).await;
    assert!(matches!(
        second,
        Ok(CycleOutcome::Evaluated {
            delivery: Delivery::Sent,
            ..
        })
    ));
    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent.first().map(AlertMessage::render).as_deref(),
        Some("Actions — identified (minor)\nhttps://status.example.com")
    );

    let third = run_cycle(&feed, &store, &notifier, FALLBACK_PAGE).await;
    assert!(third.is_ok());
    assert_eq!(stored(&store), None);

    // After a reset the incident has to be confirmed again.
    let fourth = run_cycle(&feed, &store, &notifier, FALLBACK_PAGE).await;
    assert!(fourth.is_ok());
    assert_eq!(notifier.sent().len(), 1);
    assert_eq!(stored(&store), Some(snapshot_of(&["abc"])));
}

#[tokio::test]
async fn feed_failure_skips_cycle_and_keeps_baseline() {
    let feed = ScriptedFeed::default();
    let store = MemoryStore::default();
    let notifier = MockNotifier::default();
    assert!(store.write(&snapshot_of(&["abc"])).is_ok());

    feed.push(Err(FeedError::Status(StatusCode::SERVICE_UNAVAILABLE)));
    feed.push(Ok(report(vec![incident(
        "abc",
        "Pages",
        IncidentStatus::Monitoring,
        Impact::Major,
    )])));

    let skipped = run_cycle(&feed, &store, &notifier, FALLBACK_PAGE).await;
    assert!(matches!(skipped, Ok(CycleOutcome::Skipped)));
    assert_eq!(stored(&store), Some(snapshot_of(&["abc"])));
    assert!(notifier.sent().is_empty());

    let confirmed = run_cycle(&feed, &store, &notifier, FALLBACK_PAGE).await;
    assert!(confirmed.is_ok());
    assert_eq!(notifier.sent().len(), 1);
}

#[tokio::test]
async fn unreadable_store_aborts_cycle_without_alerting() {
    let feed = ScriptedFeed::default();
    let store = MemoryStore {
        fail_reads: true,
        ..MemoryStore::default()
    };
    let notifier = MockNotifier::default();

    feed.push(Ok(report(vec![incident(
        "abc",
        "Actions",
        IncidentStatus::Identified,
        Impact::Critical,
    )])));

    let outcome = run_cycle(&feed, &store, &notifier, FALLBACK_PAGE).await;

    assert!(matches!(outcome, Err(CycleError::SnapshotRead(_))));
    assert!(notifier.sent().is_empty());
    assert!(matches!(store.snapshot.lock().map(|guard| guard.is_none()), Ok(true)));
}

#[tokio::test]
async fn failed_delivery_still_rolls_snapshot_forward() {
    let feed = ScriptedFeed::default();
    let store = MemoryStore::default();
    let notifier = MockNotifier {
        fail: true,
        ..MockNotifier::default()
    };
    assert!(store.write(&snapshot_of(&["abc", "old"])).is_ok());

    feed.push(Ok(report(vec![
        incident("abc", "Actions", IncidentStatus::Identified, Impact::Minor),
        incident("new", "Codespaces", IncidentStatus::Investigating, Impact::Minor),
    ])));

    let outcome = run_cycle(&feed, &store, &notifier, FALLBACK_PAGE).await;

    assert!(matches!(
        outcome,
        Ok(CycleOutcome::Evaluated {
            delivery: Delivery::Failed,
            ..
        })
    ));
    assert_eq!(stored(&store), Some(snapshot_of(&["abc", "new"])));
}

#[tokio::test]
async fn alert_links_to_the_page_advertised_by_the_feed() {
    let feed = ScriptedFeed::default();
    let store = MemoryStore::default();
    let notifier = MockNotifier::default();
    assert!(store.write(&snapshot_of(&["abc"])).is_ok());

    feed.push(Ok(FeedReport {
        page_url: Some("https://www.githubstatus.com".to_owned()),
        incidents: vec![
            FeedIncident {
                id: None,
                name: "Broken record".to_owned(),
                ..FeedIncident::default()
            },
            incident("abc", "Git Operations", IncidentStatus::Monitoring, Impact::Major),
        ],
    }));

    let outcome = run_cycle(&feed, &store, &notifier, FALLBACK_PAGE).await;

    let rejected = match &outcome {
        Ok(CycleOutcome::Evaluated { evaluation, .. }) => evaluation.rejected.len(),
        _ => 0,
    };
    assert_eq!(rejected, 1);
    assert_eq!(
        notifier.sent().first().map(AlertMessage::render).as_deref(),
        Some("Git Operations — monitoring (major)\nhttps://www.githubstatus.com")
    );
}

#[tokio::test]
async fn watch_confirms_across_ticks_until_shutdown() {
    let feed = ScriptedFeed::default();
    let store = MemoryStore::default();
    let notifier = MockNotifier::default();
    for _ in 0..2 {
        feed.push(Ok(report(vec![incident(
            "abc",
            "Actions",
            IncidentStatus::Investigating,
            Impact::Minor,
        )])));
    }

    let alerted = async {
        while notifier.sent().is_empty() {
            time::sleep(Duration::from_millis(2)).await;
        }
    };
    let watched = time::timeout(
        Duration::from_secs(5),
        watch(&feed, &store, &notifier, FALLBACK_PAGE, Duration::from_millis(10), alerted),
    )
    .await;

    assert!(watched.is_ok());
    assert_eq!(
        notifier.sent().first().map(AlertMessage::render).as_deref(),
        Some("Actions — investigating (minor)\nhttps://status.example.com")
    );
}

#[tokio::test]
async fn shutdown_interrupts_a_cycle_in_progress() {
    let feed = StalledFeed::default();
    let store = MemoryStore::default();
    let notifier = MockNotifier::default();
    assert!(store.write(&snapshot_of(&["abc"])).is_ok());

    // Fires only once the first poll is already hanging.
    let shutdown = async {
        while feed.polls.load(Ordering::SeqCst) == 0 {
            time::sleep(Duration::from_millis(2)).await;
        }
    };

    let watched = time::timeout(
        Duration::from_secs(5),
        watch(&feed, &store, &notifier, FALLBACK_PAGE, Duration::from_secs(60), shutdown),
    )
    .await;

    assert!(watched.is_ok());
    assert_eq!(feed.polls.load(Ordering::SeqCst), 1);
    assert_eq!(stored(&store), Some(snapshot_of(&["abc"])));
    assert!(notifier.sent().is_empty());
}
