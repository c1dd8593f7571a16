//! Two-cycle confirmation of unresolved incidents.
//!
//! An incident is only worth a notification once it has been seen in two
//! consecutive polls. The tracker keeps no state of its own: the previous
//! poll's id set goes in, the next one comes out, and the caller owns
//! persisting it between cycles.
//!
//! ```text
//!            first sighting           seen again
//!  Unseen ─────────────────► Pending ───────────► Confirmed (alert)
//!                              │                      │
//!                              │ missing from feed    │ missing from feed
//!                              ▼                      ▼
//!                           Resolved ◄────────────────┘
//! ```

use crate::models::{FeedIncident, Incident, IncidentId, InvalidIncidentError, Snapshot};
use std::{collections::BTreeMap, fmt};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    NoAlert,
    /// Incidents present in both the previous and the current poll, ordered
    /// by id, carrying the attributes of the current poll.
    Alert(Vec<Incident>),
}

impl Decision {
    pub fn is_alert(&self) -> bool {
        matches!(self, Self::Alert(_))
    }

    pub fn incidents(&self) -> &[Incident] {
        match self {
            Self::NoAlert => &[],
            Self::Alert(incidents) => incidents,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Unseen,
    Pending,
    Confirmed,
    Resolved,
}

impl DebounceState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Unseen => "unseen",
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Resolved => "resolved",
        }
    }
}

impl fmt::Display for DebounceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub decision: Decision,
    /// Ids of every valid incident in the current poll. Empty means the
    /// stored baseline should be cleared.
    pub snapshot: Snapshot,
    pub newly_seen: Vec<IncidentId>,
    pub persistent: Vec<IncidentId>,
    pub resolved: Vec<IncidentId>,
    /// Records skipped because they could not be identified.
    pub rejected: Vec<InvalidIncidentError>,
}

impl Evaluation {
    pub fn state_of(&self, id: &IncidentId) -> DebounceState {
        if self.persistent.contains(id) {
            DebounceState::Confirmed
        } else if self.newly_seen.contains(id) {
            DebounceState::Pending
        } else if self.resolved.contains(id) {
            DebounceState::Resolved
        } else {
            DebounceState::Unseen
        }
    }
}

pub fn evaluate(previous: Option<&Snapshot>, current: &[FeedIncident]) -> Evaluation {
    let mut rejected = Vec::new();
    let mut latest: BTreeMap<IncidentId, Incident> = BTreeMap::new();

    // Later duplicates overwrite earlier ones.
    for (position, record) in current.iter().enumerate() {
        match record.validate(position) {
            Ok(incident) => {
                latest.insert(incident.id.clone(), incident);
            }
            Err(error) => rejected.push(error),
        }
    }

    let snapshot: Snapshot = latest.keys().cloned().collect();

    let resolved: Vec<IncidentId> = previous
        .map(|previous| {
            previous
                .iter()
                .filter(|id| !snapshot.contains(id))
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    let mut persistent_incidents = Vec::new();
    let mut newly_seen = Vec::new();
    for (id, incident) in latest {
        if previous.is_some_and(|previous| previous.contains(&id)) {
            persistent_incidents.push(incident);
        } else {
            newly_seen.push(id);
        }
    }

    let persistent: Vec<IncidentId> = persistent_incidents
        .iter()
        .map(|incident| incident.id.clone())
        .collect();

    let decision = if persistent_incidents.is_empty() {
        Decision::NoAlert
    } else {
        Decision::Alert(persistent_incidents)
    };

    Evaluation {
        decision,
        snapshot,
        newly_seen,
        persistent,
        resolved,
        rejected,
    }
}
