//! Margin-aware placement counts.
//!
//! For every `(model, quantization)` group the environments are ranked
//! by median throughput, but environments whose uncertainty intervals
//! overlap the tier leader share its rank instead of being split by
//! noise. An environment therefore earns a "first" even when it is
//! statistically indistinguishable from the top performer.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::analysis::{median, model_key, ModelKey};
use crate::record::{FlagFilter, RunRecord, TestKind};

/// Podium counts for one environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementCounts {
    /// Shared-rank first places.
    pub first: u32,
    /// Shared-rank second places.
    pub second: u32,
    /// Shared-rank third places.
    pub third: u32,
}

impl PlacementCounts {
    /// Total podium appearances.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.first + self.second + self.third
    }

    /// Mean podium rank, `None` when the environment never placed.
    #[must_use]
    pub fn average_rank(&self) -> Option<f64> {
        let total = self.total();
        if total == 0 {
            return None;
        }
        let weighted = self.first + 2 * self.second + 3 * self.third;
        Some(f64::from(weighted) / f64::from(total))
    }
}

/// Placement counts per environment plus the number of comparable groups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementTable {
    /// Environments that placed at least once, with their counts.
    pub placements: BTreeMap<String, PlacementCounts>,
    /// Model groups that had at least two measured environments.
    pub samples: usize,
}

impl PlacementTable {
    /// Environments holding the most first places. Empty when nothing
    /// placed first; ties share the lead.
    #[must_use]
    pub fn leaders(&self) -> Vec<String> {
        let best = self
            .placements
            .values()
            .map(|counts| counts.first)
            .max()
            .unwrap_or(0);
        if best == 0 {
            return Vec::new();
        }
        self.placements
            .iter()
            .filter(|(_, counts)| counts.first == best)
            .map(|(environment, _)| environment.clone())
            .collect()
    }
}

/// Count shared-rank podium placements across all comparable model groups.
///
/// Records are filtered to non-failed measurements of `test` that pass
/// `flag` and belong to one of the requested `environments`. Within a
/// group, each environment is summarized by the median of its means and
/// the median of its standard errors; the interval is median ± error.
/// Groups measured in fewer than two environments are skipped.
///
/// Ranking sweeps at most three tiers: the interval of the best
/// remaining environment defines the tier, every remaining interval that
/// overlaps it joins the tier at the same rank, and the next tier gets
/// the next rank. Equal medians keep the requested environment order.
#[must_use]
pub fn margin_aware_placements(
    runs: &[RunRecord],
    environments: &[String],
    test: TestKind,
    flag: FlagFilter,
) -> PlacementTable {
    let mut grouped: BTreeMap<ModelKey, Vec<&RunRecord>> = BTreeMap::new();
    for run in runs {
        if run.failed || run.test_kind != Some(test) || !flag.matches(run.fused_attention) {
            continue;
        }
        if !environments.iter().any(|e| e == &run.environment) {
            continue;
        }
        grouped.entry(model_key(run)).or_default().push(run);
    }

    let mut placements: BTreeMap<String, PlacementCounts> = BTreeMap::new();
    let mut samples = 0;

    for entries in grouped.values() {
        // (environment, low, high, median), one per measured environment
        let mut intervals: Vec<(&str, f64, f64, f64)> = Vec::new();
        for environment in environments {
            let mut means = Vec::new();
            let mut errors = Vec::new();
            for run in entries.iter().filter(|r| &r.environment == environment) {
                if let (Some(mean), Some(stderr)) = (run.throughput_mean, run.throughput_stderr) {
                    means.push(mean);
                    errors.push(stderr);
                }
            }
            if means.is_empty() {
                continue;
            }
            let center = median(&means);
            let error = median(&errors);
            intervals.push((environment, center - error, center + error, center));
        }
        if intervals.len() < 2 {
            continue;
        }
        samples += 1;

        intervals.sort_by(|a, b| b.3.partial_cmp(&a.3).unwrap_or(Ordering::Equal));

        let mut rank = 1u32;
        while !intervals.is_empty() && rank <= 3 {
            let (_, tier_low, tier_high, _) = intervals[0];
            let tier: Vec<&str> = intervals
                .iter()
                .filter(|(_, low, high, _)| !(*low > tier_high || *high < tier_low))
                .map(|(environment, ..)| *environment)
                .collect();
            for environment in &tier {
                let counts = placements.entry((*environment).to_string()).or_default();
                match rank {
                    1 => counts.first += 1,
                    2 => counts.second += 1,
                    _ => counts.third += 1,
                }
            }
            intervals.retain(|(environment, ..)| !tier.contains(environment));
            rank += 1;
        }
    }

    PlacementTable {
        placements,
        samples,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(model: &str, env: &str, test: TestKind, mean: f64, stderr: f64) -> RunRecord {
        RunRecord {
            model_raw: model.to_string(),
            model_clean: model.to_string(),
            environment: env.to_string(),
            environment_base: env.to_string(),
            environment_variant: None,
            fused_attention: true,
            context_tag: "default".to_string(),
            context_tokens: None,
            test_kind: Some(test),
            throughput_mean: Some(mean),
            throughput_stderr: Some(stderr),
            failed: false,
            failure_kind: None,
            quantization: Some("Q8_0".to_string()),
            param_count_billion: None,
            file_size_gib: None,
            backend: None,
            gpu_layers: None,
            mmap: None,
            source_path: String::new(),
            is_distributed: false,
            build: None,
        }
    }

    fn envs(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_disjoint_intervals_rank_in_order() {
        let runs = vec![
            run("a", "envx", TestKind::Prefill, 100.0, 2.0),
            run("a", "envy", TestKind::Prefill, 90.0, 1.0),
        ];
        let table = margin_aware_placements(
            &runs,
            &envs(&["envx", "envy"]),
            TestKind::Prefill,
            FlagFilter::On,
        );
        assert_eq!(table.samples, 1);
        assert_eq!(table.placements["envx"].first, 1);
        assert_eq!(table.placements["envx"].second, 0);
        assert_eq!(table.placements["envy"].second, 1);
        assert_eq!(table.leaders(), vec!["envx"]);
    }

    #[test]
    fn test_overlapping_intervals_share_first() {
        let runs = vec![
            run("a", "envx", TestKind::Prefill, 100.0, 5.0),
            run("a", "envy", TestKind::Prefill, 98.0, 5.0),
        ];
        let table = margin_aware_placements(
            &runs,
            &envs(&["envx", "envy"]),
            TestKind::Prefill,
            FlagFilter::On,
        );
        assert_eq!(table.placements["envx"].first, 1);
        assert_eq!(table.placements["envy"].first, 1);
        assert_eq!(table.leaders(), vec!["envx", "envy"]);
    }

    #[test]
    fn test_three_tiers_then_stop() {
        let runs = vec![
            run("a", "e1", TestKind::Generation, 100.0, 0.5),
            run("a", "e2", TestKind::Generation, 90.0, 0.5),
            run("a", "e3", TestKind::Generation, 80.0, 0.5),
            run("a", "e4", TestKind::Generation, 70.0, 0.5),
        ];
        let table = margin_aware_placements(
            &runs,
            &envs(&["e1", "e2", "e3", "e4"]),
            TestKind::Generation,
            FlagFilter::Either,
        );
        assert_eq!(table.placements["e1"].first, 1);
        assert_eq!(table.placements["e2"].second, 1);
        assert_eq!(table.placements["e3"].third, 1);
        // ranking stops after three tiers
        assert!(!table.placements.contains_key("e4"));
    }

    #[test]
    fn test_single_environment_group_skipped() {
        let runs = vec![run("a", "envx", TestKind::Prefill, 100.0, 2.0)];
        let table = margin_aware_placements(
            &runs,
            &envs(&["envx", "envy"]),
            TestKind::Prefill,
            FlagFilter::Either,
        );
        assert_eq!(table.samples, 0);
        assert!(table.placements.is_empty());
        assert!(table.leaders().is_empty());
    }

    #[test]
    fn test_median_over_repeated_runs() {
        // envx measured three times; median 95 ± 2 beats envy's 90 ± 1
        let runs = vec![
            run("a", "envx", TestKind::Prefill, 80.0, 2.0),
            run("a", "envx", TestKind::Prefill, 95.0, 2.0),
            run("a", "envx", TestKind::Prefill, 200.0, 2.0),
            run("a", "envy", TestKind::Prefill, 90.0, 1.0),
        ];
        let table = margin_aware_placements(
            &runs,
            &envs(&["envx", "envy"]),
            TestKind::Prefill,
            FlagFilter::Either,
        );
        assert_eq!(table.placements["envx"].first, 1);
        assert_eq!(table.placements["envy"].second, 1);
    }

    #[test]
    fn test_filters_exclude_runs() {
        let mut off = run("a", "envx", TestKind::Prefill, 100.0, 2.0);
        off.fused_attention = false;
        let mut failed = run("a", "envy", TestKind::Prefill, 90.0, 1.0);
        failed.failed = true;
        failed.test_kind = None;
        failed.throughput_mean = None;
        failed.throughput_stderr = None;
        let runs = vec![
            off,
            failed,
            run("a", "envy", TestKind::Generation, 95.0, 1.0),
        ];
        let table = margin_aware_placements(
            &runs,
            &envs(&["envx", "envy"]),
            TestKind::Prefill,
            FlagFilter::On,
        );
        assert_eq!(table.samples, 0);
    }

    #[test]
    fn test_quantizations_not_compared() {
        let mut q4 = run("a", "envx", TestKind::Prefill, 100.0, 1.0);
        q4.quantization = Some("Q4_K_M".to_string());
        let q8 = run("a", "envy", TestKind::Prefill, 90.0, 1.0);
        let runs = vec![q4, q8];
        let table = margin_aware_placements(
            &runs,
            &envs(&["envx", "envy"]),
            TestKind::Prefill,
            FlagFilter::Either,
        );
        assert_eq!(table.samples, 0);
    }

    #[test]
    fn test_average_rank() {
        let counts = PlacementCounts {
            first: 2,
            second: 1,
            third: 1,
        };
        assert_eq!(counts.total(), 4);
        assert_eq!(counts.average_rank(), Some(1.75));
        assert_eq!(PlacementCounts::default().average_rank(), None);
    }
}
