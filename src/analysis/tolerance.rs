//! Within-tolerance winner counts.
//!
//! A cohort is an `(environment, fused-attention)` pair. For every model
//! the best mean defines a tolerance bar (`best - multiplier * stderr`),
//! and every cohort at or above the bar counts a win. Unlike the podium
//! sweep this groups by model name alone, so it reads across
//! quantizations of the same model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::analysis::mean;
use crate::record::{RunRecord, TestKind};

/// One `(environment, fused-attention)` cohort in a tolerance summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortStat {
    /// Environment name.
    pub environment: String,
    /// Fused-attention state of the cohort.
    pub fused_attention: bool,
    /// Models where this cohort was within tolerance of the best.
    pub wins: u32,
    /// Mean throughput over the cohort's measurements.
    pub mean_throughput: f64,
    /// Number of measurements in the cohort.
    pub samples: usize,
}

/// Within-tolerance winner counts for one test kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToleranceReport {
    /// Throughput phase summarized.
    pub test: TestKind,
    /// Standard-error multiplier that defined the bar.
    pub multiplier: f64,
    /// Distinct models considered.
    pub models: usize,
    /// Cohorts sorted by wins, then name.
    pub cohorts: Vec<CohortStat>,
}

/// Count, per cohort, how many models it ran within tolerance of the best.
///
/// For each model the measurement with the highest mean sets the bar at
/// `best_mean - multiplier * best_stderr`; every measurement of that
/// model with `mean >= bar` scores a win for its cohort. A multiplier of
/// zero demands matching the best outright.
#[must_use]
pub fn tolerance_summary(runs: &[RunRecord], test: TestKind, multiplier: f64) -> ToleranceReport {
    let mut by_model: BTreeMap<&str, Vec<&RunRecord>> = BTreeMap::new();
    for run in runs {
        if run.failed || run.test_kind != Some(test) || run.throughput_mean.is_none() {
            continue;
        }
        by_model.entry(run.model_clean.as_str()).or_default().push(run);
    }

    let mut wins: BTreeMap<(String, bool), u32> = BTreeMap::new();
    let mut throughput: BTreeMap<(String, bool), Vec<f64>> = BTreeMap::new();

    for entries in by_model.values() {
        let mut best: Option<&RunRecord> = None;
        for &run in entries {
            let better = match best {
                None => true,
                Some(current) => run.throughput_mean > current.throughput_mean,
            };
            if better {
                best = Some(run);
            }
        }
        let Some(best) = best else {
            continue;
        };
        let (Some(best_mean), Some(best_stderr)) = (best.throughput_mean, best.throughput_stderr)
        else {
            continue;
        };
        let bar = best_mean - multiplier * best_stderr;

        for run in entries {
            let Some(value) = run.throughput_mean else {
                continue;
            };
            let key = (run.environment.clone(), run.fused_attention);
            if value >= bar {
                *wins.entry(key.clone()).or_insert(0) += 1;
            }
            throughput.entry(key).or_default().push(value);
        }
    }

    let mut cohorts: Vec<CohortStat> = throughput
        .iter()
        .map(|((environment, fused), means)| CohortStat {
            environment: environment.clone(),
            fused_attention: *fused,
            wins: wins
                .get(&(environment.clone(), *fused))
                .copied()
                .unwrap_or(0),
            mean_throughput: mean(means),
            samples: means.len(),
        })
        .collect();
    cohorts.sort_by(|a, b| {
        b.wins
            .cmp(&a.wins)
            .then_with(|| a.environment.cmp(&b.environment))
            .then_with(|| a.fused_attention.cmp(&b.fused_attention))
    });

    ToleranceReport {
        test,
        multiplier,
        models: by_model.len(),
        cohorts,
    }
}
