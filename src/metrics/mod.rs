use std::io::{self, Write};

use crate::model::{ContributorKey, LatencyField, Session};

mod kinds;
mod latency;
mod recall;

pub use self::kinds::{ContiguousKinds, ContributorKindDuration, ContributorKindRecall};
pub use self::latency::{
    MeanApproxLatency, MeanPopupLatency, OracleLatency, PriorityBaseline, ReorderOracleLatency,
};
pub use self::recall::{ApproxRecall, ContiguousApproxRecall, ContiguousRecall, Recall};

/// One unit of measurement over a stream of sessions.
///
/// `update` observes one annotated session and mutates internal counters;
/// `print` renders the accumulated state to the sink, one line (or one
/// header line plus indented detail lines) per call. Printing with zero
/// observations must succeed and report zero-valued ratios.
pub trait Metric {
    fn update(&mut self, session: &Session);
    fn print(&self, out: &mut dyn Write) -> io::Result<()>;
}

/// How a family of oracle metrics collapses the matching latency values of
/// one session into a single observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Min,
    Mean,
    Max,
}

impl Aggregation {
    pub fn label(self) -> &'static str {
        match self {
            Self::Min => "min",
            Self::Mean => "mean",
            Self::Max => "max",
        }
    }

    /// `None` when there is nothing to aggregate.
    pub fn apply(self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let result = match self {
            Self::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Mean => values.iter().sum::<f64>() / values.len() as f64,
        };
        Some(result)
    }
}

/// Zero denominators report as 0.0 rather than dividing.
pub(crate) fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Contributor identities the baseline policy prefers, in priority order.
const BASELINE_CONTRIBUTORS: [(&str, &str); 3] = [
    ("BasicCompletionContributor", "BASIC"),
    ("MLRankingCompletionContributor", "ML"),
    ("WordCompletionContributor", "WORD"),
];

/// The canonical metric catalog used for one evaluation run, per-file or
/// corpus-wide. One instance of everything the harness reports.
pub fn registry() -> Vec<Box<dyn Metric>> {
    let baseline = BASELINE_CONTRIBUTORS
        .iter()
        .map(|(contributor, kind)| ContributorKey::new(*contributor, *kind))
        .collect();

    let mut metrics: Vec<Box<dyn Metric>> = vec![
        Box::new(Recall::new()),
        Box::new(ContiguousRecall::new()),
        Box::new(ApproxRecall::new(50.0)),
        Box::new(ApproxRecall::new(100.0)),
        Box::new(ApproxRecall::new(200.0)),
        Box::new(ContiguousApproxRecall::new(100.0)),
    ];

    for field in LatencyField::ALL {
        metrics.push(Box::new(ContiguousKinds::new(field)));
    }

    metrics.push(Box::new(MeanPopupLatency::new()));
    for aggregation in [Aggregation::Min, Aggregation::Mean, Aggregation::Max] {
        metrics.push(Box::new(OracleLatency::new(aggregation)));
    }
    for aggregation in [Aggregation::Min, Aggregation::Mean, Aggregation::Max] {
        metrics.push(Box::new(ReorderOracleLatency::new(aggregation)));
    }
    metrics.push(Box::new(MeanApproxLatency::new(50.0)));
    metrics.push(Box::new(MeanApproxLatency::new(100.0)));
    metrics.push(Box::new(MeanApproxLatency::new(200.0)));
    metrics.push(Box::new(ContributorKindRecall::new()));
    metrics.push(Box::new(ContributorKindDuration::new()));
    metrics.push(Box::new(PriorityBaseline::new(baseline)));

    metrics
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::latency::reconstruct;
    use crate::model::{LatencyField, Lookup, Session, Suggestion};

    pub fn suggestion(text: &str, contributor: &str, kind: &str, created: f64) -> Suggestion {
        Suggestion {
            text: text.to_string(),
            contributor: contributor.to_string(),
            contributor_kind: kind.to_string(),
            created_latency: created,
            resultset_latency: created + 1.0,
            indicator_latency: created + 2.0,
            lookup_latency: created + 3.0,
            rendered_latency: created + 4.0,
        }
    }

    /// An annotated session, the way the evaluator hands sessions to metrics.
    pub fn session(expected: &str, suggestions: Vec<Suggestion>) -> Session {
        let latencies = reconstruct(&suggestions, LatencyField::Created);
        Session {
            id: "test-session".to_string(),
            expected_text: expected.to_string(),
            lookups: vec![Lookup {
                suggestions,
                popup_latency: 0.0,
            }],
            latencies,
        }
    }

    pub fn printed(metric: &dyn super::Metric) -> String {
        let mut out = Vec::new();
        metric.print(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }
}
