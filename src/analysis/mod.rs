//! Statistical comparison of run records across environments.
//!
//! Every analyzer consumes a flat slice of [`RunRecord`]s and produces
//! plain result rows, keyed by the `(model_clean, quantization)` pair so
//! that different quantizations of one model never get compared:
//!
//! - [`placements`]: margin-aware podium counts per environment
//! - [`pairwise`]: head-to-head win counts between two environments
//! - [`features`]: paired fused-attention and backend-variant effects
//! - [`tolerance`]: within-tolerance winner counts per cohort

pub mod features;
pub mod pairwise;
pub mod placements;
pub mod tolerance;

pub use features::{flag_effect, variant_effect, FlagEffectRow, VariantEffectRow, VariantPair};
pub use pairwise::{head_to_head, HeadToHead};
pub use placements::{margin_aware_placements, PlacementCounts, PlacementTable};
pub use tolerance::{tolerance_summary, CohortStat, ToleranceReport};

use crate::record::RunRecord;

/// Comparison key: same cleaned model name and same quantization.
pub(crate) type ModelKey = (String, Option<String>);

pub(crate) fn model_key(record: &RunRecord) -> ModelKey {
    (record.model_clean.clone(), record.quantization.clone())
}

/// Median with the usual even-length average. Empty input yields 0.0.
pub(crate) fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Arithmetic mean. Empty input yields 0.0.
pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
