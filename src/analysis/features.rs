//! Paired feature effects: fused attention and backend variants.
//!
//! Both analyzers answer "how much does toggling X change throughput",
//! pairing measurements of the same `(model, quantization)` key so the
//! model mix cannot skew the comparison. Percentages are reported at
//! full precision; rounding is a rendering concern.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::analysis::{median, model_key, ModelKey};
use crate::record::{RunRecord, TestKind};

// ============================================================================
// Fused Attention Effect
// ============================================================================

/// Relative fused-attention effect for one environment and test kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagEffectRow {
    /// Environment the pairs were measured in.
    pub environment: String,
    /// Throughput phase.
    pub test: TestKind,
    /// Model keys measured in both flag states.
    pub pairs: usize,
    /// Median percentage change, enabled versus disabled.
    pub median_pct: f64,
    /// Smallest percentage change across the pairs.
    pub min_pct: f64,
    /// Largest percentage change across the pairs.
    pub max_pct: f64,
}

/// Measure the fused-attention effect per environment and test kind.
///
/// Within one environment and test, every model key keeps one mean per
/// flag state (later records overwrite earlier ones). Keys measured in
/// both states with a positive baseline contribute
/// `(on - off) / off * 100`; environments with no such pair produce no
/// row. Rows follow the requested environment and test order.
#[must_use]
pub fn flag_effect(
    runs: &[RunRecord],
    environments: &[String],
    tests: &[TestKind],
) -> Vec<FlagEffectRow> {
    let mut rows = Vec::new();
    for environment in environments {
        for &test in tests {
            let mut by_model: BTreeMap<ModelKey, (Option<f64>, Option<f64>)> = BTreeMap::new();
            for run in runs {
                if run.failed || run.test_kind != Some(test) || &run.environment != environment {
                    continue;
                }
                let Some(mean) = run.throughput_mean else {
                    continue;
                };
                let slot = by_model.entry(model_key(run)).or_default();
                if run.fused_attention {
                    slot.0 = Some(mean);
                } else {
                    slot.1 = Some(mean);
                }
            }

            let mut deltas = Vec::new();
            for &(enabled, disabled) in by_model.values() {
                if let (Some(on), Some(off)) = (enabled, disabled) {
                    if off > 0.0 {
                        deltas.push((on - off) / off * 100.0);
                    }
                }
            }
            if deltas.is_empty() {
                continue;
            }

            rows.push(FlagEffectRow {
                environment: environment.clone(),
                test,
                pairs: deltas.len(),
                median_pct: median(&deltas),
                min_pct: deltas.iter().copied().fold(f64::INFINITY, f64::min),
                max_pct: deltas.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            });
        }
    }
    rows
}

// ============================================================================
// Backend Variant Effect
// ============================================================================

/// An environment pair differing only by one backend variant, such as
/// a GEMM library toggle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantPair {
    /// Human-readable label for reports.
    pub label: String,
    /// Environment with the variant enabled.
    pub enabled: String,
    /// Baseline environment.
    pub disabled: String,
}

impl VariantPair {
    /// Build a pair from a label and its two environment names.
    pub fn new(
        label: impl Into<String>,
        enabled: impl Into<String>,
        disabled: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            enabled: enabled.into(),
            disabled: disabled.into(),
        }
    }
}

/// Median relative change between two environments over shared models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantEffectRow {
    /// Label of the variant pair.
    pub label: String,
    /// Throughput phase.
    pub test: TestKind,
    /// Environment with the variant enabled.
    pub environment_on: String,
    /// Baseline environment.
    pub environment_off: String,
    /// Model keys measured on both sides.
    pub pairs: usize,
    /// Median percentage change, enabled versus baseline.
    pub median_pct: f64,
}

/// Measure backend-variant effects across environment pairs.
///
/// Unlike [`flag_effect`], repeated measurements per key are kept and
/// summarized by their median on each side before the sides are
/// compared; keys with a non-positive baseline median are skipped. The
/// reported percentage is the median of `(on / off - 1) * 100` over the
/// shared keys.
#[must_use]
pub fn variant_effect(
    runs: &[RunRecord],
    pairs: &[VariantPair],
    tests: &[TestKind],
) -> Vec<VariantEffectRow> {
    let mut rows = Vec::new();
    for pair in pairs {
        for &test in tests {
            let collect = |environment: &str| -> BTreeMap<ModelKey, Vec<f64>> {
                let mut side: BTreeMap<ModelKey, Vec<f64>> = BTreeMap::new();
                for run in runs {
                    if run.failed || run.test_kind != Some(test) || run.environment != environment
                    {
                        continue;
                    }
                    if let Some(mean) = run.throughput_mean {
                        side.entry(model_key(run)).or_default().push(mean);
                    }
                }
                side
            };

            let on = collect(&pair.enabled);
            let off = collect(&pair.disabled);

            let mut ratios = Vec::new();
            for (key, on_means) in &on {
                let Some(off_means) = off.get(key) else {
                    continue;
                };
                let median_off = median(off_means);
                if median_off > 0.0 {
                    ratios.push((median(on_means) / median_off - 1.0) * 100.0);
                }
            }
            if ratios.is_empty() {
                continue;
            }

            rows.push(VariantEffectRow {
                label: pair.label.clone(),
                test,
                environment_on: pair.enabled.clone(),
                environment_off: pair.disabled.clone(),
                pairs: ratios.len(),
                median_pct: median(&ratios),
            });
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(model: &str, env: &str, test: TestKind, fused: bool, mean: f64) -> RunRecord {
        RunRecord {
            model_raw: model.to_string(),
            model_clean: model.to_string(),
            environment: env.to_string(),
            environment_base: env.to_string(),
            environment_variant: None,
            fused_attention: fused,
            context_tag: "default".to_string(),
            context_tokens: None,
            test_kind: Some(test),
            throughput_mean: Some(mean),
            throughput_stderr: Some(1.0),
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
    fn test_flag_effect_basic() {
        let runs = vec![
            run("a", "envx", TestKind::Prefill, true, 110.0),
            run("a", "envx", TestKind::Prefill, false, 100.0),
            run("b", "envx", TestKind::Prefill, true, 90.0),
            run("b", "envx", TestKind::Prefill, false, 100.0),
        ];
        let rows = flag_effect(&runs, &envs(&["envx"]), &[TestKind::Prefill]);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.pairs, 2);
        assert!((row.median_pct - 0.0).abs() < 1e-9);
        assert!((row.min_pct - -10.0).abs() < 1e-9);
        assert!((row.max_pct - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_flag_effect_requires_both_states() {
        let runs = vec![
            run("a", "envx", TestKind::Prefill, true, 110.0),
            run("b", "envx", TestKind::Prefill, false, 100.0),
        ];
        assert!(flag_effect(&runs, &envs(&["envx"]), &[TestKind::Prefill]).is_empty());
    }

    #[test]
    fn test_flag_effect_zero_baseline_skipped() {
        let runs = vec![
            run("a", "envx", TestKind::Prefill, true, 110.0),
            run("a", "envx", TestKind::Prefill, false, 0.0),
        ];
        assert!(flag_effect(&runs, &envs(&["envx"]), &[TestKind::Prefill]).is_empty());
    }

    #[test]
    fn test_flag_effect_later_record_overwrites() {
        let runs = vec![
            run("a", "envx", TestKind::Prefill, true, 50.0),
            run("a", "envx", TestKind::Prefill, true, 110.0),
            run("a", "envx", TestKind::Prefill, false, 100.0),
        ];
        let rows = flag_effect(&runs, &envs(&["envx"]), &[TestKind::Prefill]);
        assert!((rows[0].median_pct - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_flag_effect_row_order_follows_request() {
        let runs = vec![
            run("a", "envx", TestKind::Prefill, true, 110.0),
            run("a", "envx", TestKind::Prefill, false, 100.0),
            run("a", "envy", TestKind::Generation, true, 55.0),
            run("a", "envy", TestKind::Generation, false, 50.0),
        ];
        let rows = flag_effect(
            &runs,
            &envs(&["envy", "envx"]),
            &[TestKind::Prefill, TestKind::Generation],
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].environment, "envy");
        assert_eq!(rows[0].test, TestKind::Generation);
        assert_eq!(rows[1].environment, "envx");
    }

    #[test]
    fn test_variant_effect_medians_per_side() {
        let runs = vec![
            run("a", "rocm7-rocwmma", TestKind::Prefill, true, 105.0),
            run("a", "rocm7-rocwmma", TestKind::Prefill, true, 115.0),
            run("a", "rocm7", TestKind::Prefill, true, 100.0),
            run("b", "rocm7-rocwmma", TestKind::Prefill, true, 80.0),
            run("b", "rocm7", TestKind::Prefill, true, 100.0),
        ];
        let pairs = vec![VariantPair::new("rocWMMA", "rocm7-rocwmma", "rocm7")];
        let rows = variant_effect(&runs, &pairs, &[TestKind::Prefill]);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.pairs, 2);
        // deltas are +10% and -20%; median is their average
        assert!((row.median_pct - -5.0).abs() < 1e-9);
        assert_eq!(row.environment_on, "rocm7-rocwmma");
    }

    #[test]
    fn test_variant_effect_no_shared_models() {
        let runs = vec![
            run("a", "rocm7-rocwmma", TestKind::Prefill, true, 105.0),
            run("b", "rocm7", TestKind::Prefill, true, 100.0),
        ];
        let pairs = vec![VariantPair::new("rocWMMA", "rocm7-rocwmma", "rocm7")];
        assert!(variant_effect(&runs, &pairs, &[TestKind::Prefill]).is_empty());
    }
}
