use std::collections::BTreeMap;
use std::io::{self, Write};

use crate::latency::reconstruct;
use crate::model::{LatencyField, Session};

use super::{Metric, ratio};

/// Share of sessions whose contributors occupy contiguous windows when the
/// lookup's suggestions are ordered by the named latency field. A lookup
/// with no suggestions counts but is never good.
pub struct ContiguousKinds {
    field: LatencyField,
    good: u64,
    count: u64,
}

impl ContiguousKinds {
    pub fn new(field: LatencyField) -> Self {
        Self {
            field,
            good: 0,
            count: 0,
        }
    }
}

impl Metric for ContiguousKinds {
    fn update(&mut self, session: &Session) {
        self.count += 1;

        let suggestions = &session.lookup().suggestions;
        if suggestions.is_empty() {
            return;
        }
        if reconstruct(suggestions, self.field).is_some() {
            self.good += 1;
        }
    }

    fn print(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(
            out,
            "contiguous ({}): {:.3} ({} / {})",
            self.field.as_str(),
            ratio(self.good as f64, self.count as f64),
            self.good,
            self.count
        )
    }
}

/// Per-contributor-kind hit counters: how often each kind produced the
/// suggestion the user accepted.
pub struct ContributorKindRecall {
    hits: BTreeMap<String, u64>,
    count: u64,
}

impl ContributorKindRecall {
    pub fn new() -> Self {
        Self {
            hits: BTreeMap::new(),
            count: 0,
        }
    }
}

impl Metric for ContributorKindRecall {
    fn update(&mut self, session: &Session) {
        self.count += 1;
        for suggestion in &session.lookup().suggestions {
            if suggestion.text == session.expected_text {
                *self.hits.entry(suggestion.contributor_kind.clone()).or_insert(0) += 1;
            }
        }
    }

    fn print(&self, out: &mut dyn Write) -> io::Result<()> {
        let mut kinds: Vec<(&String, &u64)> = self.hits.iter().collect();
        kinds.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        writeln!(
            out,
            "contributor kind recall ({} kinds, {} sessions):",
            kinds.len(),
            self.count
        )?;
        for (kind, hits) in kinds {
            writeln!(
                out,
                "    {}: {:.3} ({} / {})",
                kind,
                ratio(*hits as f64, self.count as f64),
                hits,
                self.count
            )?;
        }
        Ok(())
    }
}

/// Mean attributed duration per contributor kind, over sessions whose
/// attribution succeeded. Kinds backed by several contributors accumulate
/// every contributor's window.
pub struct ContributorKindDuration {
    totals: BTreeMap<String, f64>,
    occurrences: BTreeMap<String, u64>,
    skipped: u64,
}

impl ContributorKindDuration {
    pub fn new() -> Self {
        Self {
            totals: BTreeMap::new(),
            occurrences: BTreeMap::new(),
            skipped: 0,
        }
    }
}

impl Metric for ContributorKindDuration {
    fn update(&mut self, session: &Session) {
        let Some(latencies) = &session.latencies else {
            self.skipped += 1;
            return;
        };
        for (key, duration) in latencies {
            *self.totals.entry(key.kind.clone()).or_insert(0.0) += duration;
            *self.occurrences.entry(key.kind.clone()).or_insert(0) += 1;
        }
    }

    fn print(&self, out: &mut dyn Write) -> io::Result<()> {
        let mut kinds: Vec<(&String, f64, u64)> = self
            .totals
            .iter()
            .map(|(kind, total)| (kind, *total, self.occurrences[kind]))
            .collect();
        kinds.sort_by(|a, b| {
            let mean_a = ratio(a.1, a.2 as f64);
            let mean_b = ratio(b.1, b.2 as f64);
            mean_b.total_cmp(&mean_a).then_with(|| a.0.cmp(b.0))
        });

        writeln!(
            out,
            "contributor kind duration ({} kinds, skipped = {}):",
            kinds.len(),
            self.skipped
        )?;
        for (kind, total, occurrences) in kinds {
            writeln!(
                out,
                "    {}: {:.3} ({:.3} / {})",
                kind,
                ratio(total, occurrences as f64),
                total,
                occurrences
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{printed, session, suggestion};
    use super::*;

    #[test]
    fn print_before_update_reports_zero() {
        assert_eq!(
            printed(&ContiguousKinds::new(LatencyField::Created)),
            "contiguous (createdLatency): 0.000 (0 / 0)\n"
        );
        assert_eq!(
            printed(&ContributorKindRecall::new()),
            "contributor kind recall (0 kinds, 0 sessions):\n"
        );
        assert_eq!(
            printed(&ContributorKindDuration::new()),
            "contributor kind duration (0 kinds, skipped = 0):\n"
        );
    }

    #[test]
    fn contiguous_kinds_rejects_interleaved_windows() {
        let mut metric = ContiguousKinds::new(LatencyField::Created);
        metric.update(&session(
            "x",
            vec![
                suggestion("a1", "A", "k1", 5.0),
                suggestion("b1", "B", "k1", 10.0),
                suggestion("a2", "A", "k1", 15.0),
            ],
        ));

        assert_eq!(
            printed(&metric),
            "contiguous (createdLatency): 0.000 (0 / 1)\n"
        );
    }

    #[test]
    fn contiguous_kinds_counts_empty_lookups_without_crediting_them() {
        let mut metric = ContiguousKinds::new(LatencyField::Created);
        metric.update(&session("x", vec![]));
        metric.update(&session("x", vec![suggestion("x", "A", "k1", 10.0)]));

        assert_eq!(
            printed(&metric),
            "contiguous (createdLatency): 0.500 (1 / 2)\n"
        );
    }

    #[test]
    fn kind_recall_orders_kinds_by_hit_count() {
        let mut metric = ContributorKindRecall::new();
        metric.update(&session(
            "foo",
            vec![
                suggestion("foo", "A", "template", 10.0),
                suggestion("foo", "B", "basic", 20.0),
            ],
        ));
        metric.update(&session("bar", vec![suggestion("bar", "A", "template", 5.0)]));

        assert_eq!(
            printed(&metric),
            concat!(
                "contributor kind recall (2 kinds, 2 sessions):\n",
                "    template: 1.000 (2 / 2)\n",
                "    basic: 0.500 (1 / 2)\n"
            )
        );
    }

    #[test]
    fn kind_duration_sums_match_the_attributed_durations() {
        // Two contributors of the same kind plus one of another kind.
        let suggestions = vec![
            suggestion("a", "A", "basic", 10.0),
            suggestion("b", "B", "basic", 30.0),
            suggestion("c", "C", "ml", 70.0),
        ];
        let observed = session("a", suggestions);
        let attributed: f64 = observed.latencies.as_ref().unwrap().values().sum();

        let mut metric = ContributorKindDuration::new();
        metric.update(&observed);

        let report = printed(&metric);
        assert!(report.contains("basic: 15.000 (30.000 / 2)"));
        assert!(report.contains("ml: 40.000 (40.000 / 1)"));

        // Round trip: per-kind totals sum to the per-contributor total.
        assert_eq!(attributed, 30.0 + 40.0);
    }

    #[test]
    fn kind_duration_skips_unattributable_sessions() {
        let mut metric = ContributorKindDuration::new();
        metric.update(&session(
            "x",
            vec![
                suggestion("a1", "A", "k1", 5.0),
                suggestion("b1", "B", "k1", 10.0),
                suggestion("a2", "A", "k1", 15.0),
            ],
        ));

        assert_eq!(
            printed(&metric),
            "contributor kind duration (0 kinds, skipped = 1):\n"
        );
    }
}
