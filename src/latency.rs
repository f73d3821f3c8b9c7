use std::collections::BTreeMap;

use crate::model::{ContributorKey, LatencyField, Suggestion};

/// Reconstructs the exclusive time window each contributor owned during a
/// lookup, keyed by the named latency field.
///
/// The log records, per suggestion, only the cumulative time since lookup
/// start at which that suggestion's source finished contributing. Sorted by
/// that timestamp, contributors must occupy disjoint contiguous windows: the
/// first window opens at 0, every later one at the previous contributor's
/// boundary timestamp. A contributor whose window closes and then reappears
/// later in the order violates that assumption and the whole lookup is
/// unattributable (`None`).
///
/// An empty lookup is vacuously contiguous and maps to an empty attribution.
pub fn reconstruct(
    suggestions: &[Suggestion],
    field: LatencyField,
) -> Option<BTreeMap<ContributorKey, f64>> {
    let mut pairs: Vec<(f64, ContributorKey)> = suggestions
        .iter()
        .map(|suggestion| (suggestion.latency(field), suggestion.key()))
        .collect();
    // Stable sort: equal timestamps keep their logged order.
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut begin: BTreeMap<ContributorKey, f64> = BTreeMap::new();
    let mut durations: BTreeMap<ContributorKey, f64> = BTreeMap::new();

    for index in 0..pairs.len() {
        let (timestamp, key) = &pairs[index];

        if index == 0 {
            begin.insert(key.clone(), 0.0);
        } else {
            let (prev_timestamp, prev_key) = &pairs[index - 1];
            if key != prev_key {
                if begin.contains_key(key) {
                    // The window for this contributor already closed.
                    return None;
                }
                durations.insert(prev_key.clone(), prev_timestamp - begin[prev_key]);
                begin.insert(key.clone(), *prev_timestamp);
            }
        }

        if index == pairs.len() - 1 {
            durations.insert(key.clone(), timestamp - begin[key]);
        }
    }

    Some(durations)
}
