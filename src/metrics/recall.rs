use std::io::{self, Write};

use crate::model::{Session, Suggestion};

use super::{Metric, ratio};

/// Whether the accepted text appears among the lookup's suggestions.
pub struct Recall {
    found: u64,
    count: u64,
}

impl Recall {
    pub fn new() -> Self {
        Self { found: 0, count: 0 }
    }
}

impl Metric for Recall {
    fn update(&mut self, session: &Session) {
        let found = session
            .lookup()
            .suggestions
            .iter()
            .any(|suggestion| suggestion.text == session.expected_text);
        self.found += u64::from(found);
        self.count += 1;
    }

    fn print(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(
            out,
            "recall: {:.3} ({} / {})",
            ratio(self.found as f64, self.count as f64),
            self.found,
            self.count
        )
    }
}

/// Recall restricted to sessions whose latency attribution succeeded.
pub struct ContiguousRecall {
    found: u64,
    count: u64,
    skipped: u64,
}

impl ContiguousRecall {
    pub fn new() -> Self {
        Self {
            found: 0,
            count: 0,
            skipped: 0,
        }
    }
}

impl Metric for ContiguousRecall {
    fn update(&mut self, session: &Session) {
        if !session.is_contiguous() {
            self.skipped += 1;
            return;
        }
        let found = session
            .lookup()
            .suggestions
            .iter()
            .any(|suggestion| suggestion.text == session.expected_text);
        self.found += u64::from(found);
        self.count += 1;
    }

    fn print(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(
            out,
            "contiguous recall: {:.3} ({} / {}, skipped = {})",
            ratio(self.found as f64, self.count as f64),
            self.found,
            self.count,
            self.skipped
        )
    }
}

/// Suggestions visible within `delay_ms` of the fastest one, by creation
/// latency. Models a popup that renders progressively: the user cannot tell
/// apart contributors that finish inside the same short window.
fn visible_within(suggestions: &[Suggestion], delay_ms: f64) -> Vec<&Suggestion> {
    let min_latency = suggestions
        .iter()
        .map(|suggestion| suggestion.created_latency)
        .fold(f64::INFINITY, f64::min);

    suggestions
        .iter()
        .filter(|suggestion| suggestion.created_latency <= min_latency + delay_ms)
        .collect()
}

/// Whether the accepted text would have been visible within `delay_ms` of
/// the fastest contributor.
pub struct ApproxRecall {
    delay_ms: f64,
    found: u64,
    count: u64,
}

impl ApproxRecall {
    pub fn new(delay_ms: f64) -> Self {
        Self {
            delay_ms,
            found: 0,
            count: 0,
        }
    }
}

impl Metric for ApproxRecall {
    fn update(&mut self, session: &Session) {
        let found = visible_within(&session.lookup().suggestions, self.delay_ms)
            .iter()
            .any(|suggestion| suggestion.text == session.expected_text);
        self.found += u64::from(found);
        self.count += 1;
    }

    fn print(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(
            out,
            "approx recall ({}ms): {:.3} ({} / {})",
            self.delay_ms,
            ratio(self.found as f64, self.count as f64),
            self.found,
            self.count
        )
    }
}

/// The approx-window check over attributable sessions only.
pub struct ContiguousApproxRecall {
    delay_ms: f64,
    found: u64,
    count: u64,
    skipped: u64,
}

impl ContiguousApproxRecall {
    pub fn new(delay_ms: f64) -> Self {
        Self {
            delay_ms,
            found: 0,
            count: 0,
            skipped: 0,
        }
    }
}

impl Metric for ContiguousApproxRecall {
    fn update(&mut self, session: &Session) {
        if !session.is_contiguous() {
            self.skipped += 1;
            return;
        }
        let found = visible_within(&session.lookup().suggestions, self.delay_ms)
            .iter()
            .any(|suggestion| suggestion.text == session.expected_text);
        self.found += u64::from(found);
        self.count += 1;
    }

    fn print(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(
            out,
            "contiguous approx recall ({}ms): {:.3} ({} / {}, skipped = {})",
            self.delay_ms,
            ratio(self.found as f64, self.count as f64),
            self.found,
            self.count,
            self.skipped
        )
    }
}
