//! The competitive fitness order.

use std::cmp::Ordering;

use gensort_core::{Evaluation, FitnessConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Metric {
    /// Higher is better.
    Sortedness,
    /// Higher is better.
    SetFidelity,
    /// Fewer executed ops is better.
    Efficiency,
}

/// Priority-weighted lexicographic comparison of evaluations.
///
/// Priority 0 skips a metric; nonzero priorities compare in ascending
/// priority order. All-zero priorities fall back to the default order:
/// sortedness, set fidelity, efficiency.
pub struct FitnessRanker {
    keys: Vec<Metric>,
}

impl FitnessRanker {
    pub fn new(config: &FitnessConfig) -> Self {
        let mut entries: Vec<(u64, Metric)> = [
            (config.sortedness_priority, Metric::Sortedness),
            (config.set_fidelity_priority, Metric::SetFidelity),
            (config.efficiency_priority, Metric::Efficiency),
        ]
        .into_iter()
        .filter(|(priority, _)| *priority != 0)
        .collect();

        if entries.is_empty() {
            return Self {
                keys: vec![Metric::Sortedness, Metric::SetFidelity, Metric::Efficiency],
            };
        }
        entries.sort_by_key(|(priority, _)| *priority);
        Self {
            keys: entries.into_iter().map(|(_, metric)| metric).collect(),
        }
    }

    /// `Less` means `a` outranks `b`.
    pub fn compare(&self, a: &Evaluation, b: &Evaluation) -> Ordering {
        for metric in &self.keys {
            let ordering = match metric {
                Metric::Sortedness => b.sortedness.cmp(&a.sortedness),
                Metric::SetFidelity => b.set_fidelity.cmp(&a.set_fidelity),
                Metric::Efficiency => a.instructions_executed.cmp(&b.instructions_executed),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}
