use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt};
use thiserror::Error;

/// Opaque, stable incident identifier assigned by the status feed.
///
/// Decoding goes through [`IncidentId::parse`], so a stored snapshot obeys
/// the same rules as a feed record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IncidentId(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("incident id must not be blank")]
pub struct BlankIdError;

impl IncidentId {
    /// Builds an id from a raw feed value. Blank values are not identifiers.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for IncidentId {
    type Error = BlankIdError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw).ok_or(BlankIdError)
    }
}

impl From<IncidentId> for String {
    fn from(id: IncidentId) -> Self {
        id.0
    }
}

impl fmt::Display for IncidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IncidentStatus {
    #[default]
    Investigating,
    Identified,
    Monitoring,
    Resolved,
    Postmortem,
    Other(String),
}

impl From<String> for IncidentStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "investigating" => Self::Investigating,
            "identified" => Self::Identified,
            "monitoring" => Self::Monitoring,
            "resolved" => Self::Resolved,
            "postmortem" => Self::Postmortem,
            _ => Self::Other(raw),
        }
    }
}

impl From<IncidentStatus> for String {
    fn from(status: IncidentStatus) -> Self {
        status.to_string()
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Investigating => "investigating",
            Self::Identified => "identified",
            Self::Monitoring => "monitoring",
            Self::Resolved => "resolved",
            Self::Postmortem => "postmortem",
            Self::Other(raw) => raw,
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Impact {
    #[default]
    None,
    Minor,
    Major,
    Critical,
    Maintenance,
    Other(String),
}

impl From<String> for Impact {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "none" => Self::None,
            "minor" => Self::Minor,
            "major" => Self::Major,
            "critical" => Self::Critical,
            "maintenance" => Self::Maintenance,
            _ => Self::Other(raw),
        }
    }
}

impl From<Impact> for String {
    fn from(impact: Impact) -> Self {
        impact.to_string()
    }
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::None => "none",
            Self::Minor => "minor",
            Self::Major => "major",
            Self::Critical => "critical",
            Self::Maintenance => "maintenance",
            Self::Other(raw) => raw,
        };
        f.write_str(label)
    }
}

/// A validated incident as reported to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    pub id: IncidentId,
    pub name: String,
    pub status: IncidentStatus,
    pub impact: Impact,
}

/// An incident record exactly as the feed delivered it. Fields beyond these
/// four are ignored during decoding.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeedIncident {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: IncidentStatus,
    #[serde(default)]
    pub impact: Impact,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidIncidentError {
    #[error("incident record #{position} ({name:?}) has no id")]
    MissingId { position: usize, name: String },
}

impl FeedIncident {
    /// Validates the record found at `position` in the feed listing.
    pub fn validate(&self, position: usize) -> Result<Incident, InvalidIncidentError> {
        let id = self
            .id
            .as_deref()
            .and_then(IncidentId::parse)
            .ok_or_else(|| InvalidIncidentError::MissingId {
                position,
                name: self.name.clone(),
            })?;

        Ok(Incident {
            id,
            name: self.name.clone(),
            status: self.status.clone(),
            impact: self.impact.clone(),
        })
    }
}

/// The set of unresolved incident ids observed at the end of a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    ids: BTreeSet<IncidentId>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &IncidentId) -> bool {
        self.ids.contains(id)
    }

    pub fn insert(&mut self, id: IncidentId) -> bool {
        self.ids.insert(id)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &IncidentId> {
        self.ids.iter()
    }
}

impl FromIterator<IncidentId> for Snapshot {
    fn from_iter<T: IntoIterator<Item = IncidentId>>(iter: T) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}
