use crate::{
    alerter::{AlertMessage, Notifier},
    feed::{FeedReport, IncidentFeed},
    models::Snapshot,
    storage::{SnapshotStore, StorageError},
    tracker::{self, Decision, Evaluation},
};
use std::time::Duration;
use thiserror::Error;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("failed to read previous snapshot: {0}")]
    SnapshotRead(#[source] StorageError),
    #[error("failed to persist snapshot: {0}")]
    SnapshotWrite(#[source] StorageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    NotNeeded,
    Sent,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The feed could not be polled; the stored snapshot was left untouched.
    Skipped,
    Evaluated {
        evaluation: Evaluation,
        delivery: Delivery,
    },
}

/// Builds the message for an alerting evaluation. The feed's own page link is
/// preferred over `fallback_page_url`.
pub fn alert_message(
    report: &FeedReport,
    evaluation: &Evaluation,
    fallback_page_url: &str,
) -> Option<AlertMessage> {
    match &evaluation.decision {
        Decision::NoAlert => None,
        Decision::Alert(incidents) => Some(AlertMessage::new(
            incidents.clone(),
            report.page_url.as_deref().unwrap_or(fallback_page_url),
        )),
    }
}

/// One poll: fetch, read the previous snapshot, evaluate, notify, persist.
pub async fn run_cycle(
    feed: &dyn IncidentFeed,
    store: &dyn SnapshotStore,
    notifier: &dyn Notifier,
    fallback_page_url: &str,
) -> Result<CycleOutcome, CycleError> {
    let report = match feed.fetch_unresolved().await {
        Ok(report) => report,
        Err(error) => {
            warn!(error = %error, "status feed poll failed, skipping cycle");
            return Ok(CycleOutcome::Skipped);
        }
    };

    let previous = store.read().map_err(CycleError::SnapshotRead)?;
    let evaluation = tracker::evaluate(previous.as_ref(), &report.incidents);

    for rejected in &evaluation.rejected {
        warn!(error = %rejected, "skipping malformed incident record");
    }
    for id in &evaluation.newly_seen {
        info!(incident_id = %id, "incident seen for the first time, awaiting confirmation");
    }
    for id in &evaluation.resolved {
        info!(incident_id = %id, "incident no longer reported, dropping");
    }

    let delivery = match alert_message(&report, &evaluation, fallback_page_url) {
        None => Delivery::NotNeeded,
        Some(message) => {
            let incident_count = message.incidents.len();
            match notifier.send_alert(&message).await {
                Ok(()) => {
                    info!(incident_count, "persistent incident alert sent");
                    Delivery::Sent
                }
                Err(error) => {
                    warn!(incident_count, error = %error, "failed to send persistent incident alert");
                    Delivery::Failed
                }
            }
        }
    };

    persist(store, &evaluation.snapshot).map_err(CycleError::SnapshotWrite)?;
    debug!(active = evaluation.snapshot.len(), "snapshot persisted");

    Ok(CycleOutcome::Evaluated {
        evaluation,
        delivery,
    })
}

/// Polls on every `poll_interval` tick until `shutdown` completes. The first
/// cycle starts immediately and missed ticks are skipped.
///
/// `shutdown` is watched during cycles too; a cycle cut short that way
/// leaves the stored snapshot as it was before that cycle or as it was
/// fully written, never partially written.
pub async fn watch(
    feed: &dyn IncidentFeed,
    store: &dyn SnapshotStore,
    notifier: &dyn Notifier,
    fallback_page_url: &str,
    poll_interval: Duration,
    shutdown: impl Future<Output = ()>,
) {
    let mut ticker = time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            () = &mut shutdown => break,
            _ = ticker.tick() => {}
        }

        tokio::select! {
            biased;
            () = &mut shutdown => {
                info!("shutdown requested during a status check");
                break;
            }
            result = run_cycle(feed, store, notifier, fallback_page_url) => match result {
                Ok(outcome) => log_outcome(&outcome),
                Err(error) => warn!(error = %error, "status check aborted, retrying next tick"),
            },
        }
    }
}

pub fn log_outcome(outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Skipped => {}
        CycleOutcome::Evaluated {
            evaluation,
            delivery,
        } => {
            info!(
                active = evaluation.snapshot.len(),
                pending = evaluation.newly_seen.len(),
                confirmed = evaluation.persistent.len(),
                alerted = *delivery == Delivery::Sent,
                "status check complete"
            );
        }
    }
}

fn persist(store: &dyn SnapshotStore, snapshot: &Snapshot) -> Result<(), StorageError> {
    if snapshot.is_empty() {
        store.clear()
    } else {
        store.write(snapshot)
    }
}
