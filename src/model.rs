use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

/// One exported completion log: the source file the sessions were recorded
/// against plus every session captured for it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFile {
    pub file_path: String,
    pub sessions: Vec<Session>,
}

/// One completed user interaction. A well-formed session carries exactly one
/// lookup; that invariant is checked when the log is loaded.
#[derive(Debug, Clone, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(rename = "expectedText")]
    pub expected_text: String,
    #[serde(rename = "_lookups")]
    pub lookups: Vec<Lookup>,
    /// Attributed per-contributor durations, filled in during evaluation.
    /// `None` means the lookup's contributor windows interleave and no
    /// attribution is possible.
    #[serde(skip)]
    pub latencies: Option<BTreeMap<ContributorKey, f64>>,
}

impl Session {
    /// The session's single lookup. Only valid after the one-lookup
    /// invariant has been checked on load.
    pub fn lookup(&self) -> &Lookup {
        &self.lookups[0]
    }

    pub fn is_contiguous(&self) -> bool {
        self.latencies.is_some()
    }
}

/// One completion-popup invocation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lookup {
    pub suggestions: Vec<Suggestion>,
    pub popup_latency: f64,
}

/// One candidate completion offered during a lookup, with the cumulative
/// time (ms since lookup start) at which each pipeline stage completed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub text: String,
    pub contributor: String,
    pub contributor_kind: String,
    pub created_latency: f64,
    pub resultset_latency: f64,
    pub indicator_latency: f64,
    pub lookup_latency: f64,
    pub rendered_latency: f64,
}

impl Suggestion {
    pub fn key(&self) -> ContributorKey {
        ContributorKey {
            contributor: self.contributor.clone(),
            kind: self.contributor_kind.clone(),
        }
    }

    pub fn latency(&self, field: LatencyField) -> f64 {
        match field {
            LatencyField::Created => self.created_latency,
            LatencyField::Resultset => self.resultset_latency,
            LatencyField::Indicator => self.indicator_latency,
            LatencyField::Lookup => self.lookup_latency,
            LatencyField::Rendered => self.rendered_latency,
        }
    }
}

/// Composite identity of a suggestion's source: the contributor plus its
/// category. Two suggestions share a latency window iff their keys match.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContributorKey {
    pub contributor: String,
    pub kind: String,
}

impl ContributorKey {
    pub fn new(contributor: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            contributor: contributor.into(),
            kind: kind.into(),
        }
    }
}

impl fmt::Display for ContributorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.contributor, self.kind)
    }
}

/// The per-stage latency measurements a suggestion carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyField {
    Created,
    Resultset,
    Indicator,
    Lookup,
    Rendered,
}

impl LatencyField {
    pub const ALL: [LatencyField; 5] = [
        LatencyField::Created,
        LatencyField::Resultset,
        LatencyField::Indicator,
        LatencyField::Lookup,
        LatencyField::Rendered,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "createdLatency",
            Self::Resultset => "resultsetLatency",
            Self::Indicator => "indicatorLatency",
            Self::Lookup => "lookupLatency",
            Self::Rendered => "renderedLatency",
        }
    }
}
