use std::io::{self, Write};

use crate::model::{ContributorKey, Session};

use super::{Aggregation, Metric, ratio};

/// Mean time until the completion popup became visible.
pub struct MeanPopupLatency {
    total: f64,
    count: u64,
}

impl MeanPopupLatency {
    pub fn new() -> Self {
        Self {
            total: 0.0,
            count: 0,
        }
    }
}

impl Metric for MeanPopupLatency {
    fn update(&mut self, session: &Session) {
        self.total += session.lookup().popup_latency;
        self.count += 1;
    }

    fn print(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(
            out,
            "mean popup latency: {:.3} ({:.3} / {})",
            ratio(self.total, self.count as f64),
            self.total,
            self.count
        )
    }
}

/// Idealized latency assuming the accepted suggestion is known in advance:
/// aggregates the raw creation latencies of the suggestions matching the
/// accepted text. Sessions where nothing matches are skipped.
pub struct OracleLatency {
    aggregation: Aggregation,
    total: f64,
    count: u64,
    skipped: u64,
}

impl OracleLatency {
    pub fn new(aggregation: Aggregation) -> Self {
        Self {
            aggregation,
            total: 0.0,
            count: 0,
            skipped: 0,
        }
    }
}

impl Metric for OracleLatency {
    fn update(&mut self, session: &Session) {
        let matches: Vec<f64> = session
            .lookup()
            .suggestions
            .iter()
            .filter(|suggestion| suggestion.text == session.expected_text)
            .map(|suggestion| suggestion.created_latency)
            .collect();

        match self.aggregation.apply(&matches) {
            Some(latency) => {
                self.total += latency;
                self.count += 1;
            }
            None => self.skipped += 1,
        }
    }

    fn print(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(
            out,
            "{} oracle latency: {:.3} ({:.3} / {}, skipped = {})",
            self.aggregation.label(),
            ratio(self.total, self.count as f64),
            self.total,
            self.count,
            self.skipped
        )
    }
}

/// The oracle family over *attributed* durations instead of raw creation
/// latencies: what the accepted suggestion's contributor actually cost once
/// windows are reconstructed. Sessions that cannot be attributed, or where
/// nothing matches, are skipped.
pub struct ReorderOracleLatency {
    aggregation: Aggregation,
    total: f64,
    count: u64,
    skipped: u64,
}

impl ReorderOracleLatency {
    pub fn new(aggregation: Aggregation) -> Self {
        Self {
            aggregation,
            total: 0.0,
            count: 0,
            skipped: 0,
        }
    }
}

impl Metric for ReorderOracleLatency {
    fn update(&mut self, session: &Session) {
        let Some(latencies) = &session.latencies else {
            self.skipped += 1;
            return;
        };

        let matches: Vec<f64> = session
            .lookup()
            .suggestions
            .iter()
            .filter(|suggestion| suggestion.text == session.expected_text)
            .filter_map(|suggestion| latencies.get(&suggestion.key()).copied())
            .collect();

        match self.aggregation.apply(&matches) {
            Some(latency) => {
                self.total += latency;
                self.count += 1;
            }
            None => self.skipped += 1,
        }
    }

    fn print(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(
            out,
            "{} reorder oracle latency: {:.3} ({:.3} / {}, skipped = {})",
            self.aggregation.label(),
            ratio(self.total, self.count as f64),
            self.total,
            self.count,
            self.skipped
        )
    }
}

/// Latency a progressively-rendered popup would show: the fastest creation
/// latency plus the render window. Only lookups with no suggestions at all
/// are skipped.
pub struct MeanApproxLatency {
    delay_ms: f64,
    total: f64,
    count: u64,
    skipped: u64,
}

impl MeanApproxLatency {
    pub fn new(delay_ms: f64) -> Self {
        Self {
            delay_ms,
            total: 0.0,
            count: 0,
            skipped: 0,
        }
    }
}

impl Metric for MeanApproxLatency {
    fn update(&mut self, session: &Session) {
        let min_latency = session
            .lookup()
            .suggestions
            .iter()
            .map(|suggestion| suggestion.created_latency)
            .min_by(f64::total_cmp);

        match min_latency {
            Some(latency) => {
                self.total += latency + self.delay_ms;
                self.count += 1;
            }
            None => self.skipped += 1,
        }
    }

    fn print(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(
            out,
            "mean approx latency ({}ms): {:.3} ({:.3} / {}, skipped = {})",
            self.delay_ms,
            ratio(self.total, self.count as f64),
            self.total,
            self.count,
            self.skipped
        )
    }
}

/// Latency and recall of a fixed baseline policy: always wait for the first
/// identity from a priority-ordered allow-list that contributed to the
/// session. Sessions without attribution, or where no listed identity
/// contributed, are skipped.
pub struct PriorityBaseline {
    priority: Vec<ContributorKey>,
    total: f64,
    found: u64,
    count: u64,
    skipped: u64,
}

impl PriorityBaseline {
    pub fn new(priority: Vec<ContributorKey>) -> Self {
        Self {
            priority,
            total: 0.0,
            found: 0,
            count: 0,
            skipped: 0,
        }
    }
}

impl Metric for PriorityBaseline {
    fn update(&mut self, session: &Session) {
        let Some(latencies) = &session.latencies else {
            self.skipped += 1;
            return;
        };
        let Some(key) = self.priority.iter().find(|key| latencies.contains_key(key)) else {
            self.skipped += 1;
            return;
        };

        self.total += latencies[key];
        let found = session
            .lookup()
            .suggestions
            .iter()
            .any(|suggestion| suggestion.key() == *key && suggestion.text == session.expected_text);
        self.found += u64::from(found);
        self.count += 1;
    }

    fn print(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(
            out,
            "baseline latency: {:.3} ({:.3} / {}), baseline recall: {:.3} ({} / {}, skipped = {})",
            ratio(self.total, self.count as f64),
            self.total,
            self.count,
            ratio(self.found as f64, self.count as f64),
            self.found,
            self.count,
            self.skipped
        )
    }
}
