//! Head-to-head win counts between two environments.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::analysis::{model_key, ModelKey};
use crate::record::{FlagFilter, RunRecord, TestKind};

/// Win/tie counts over the model groups two environments share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadToHead {
    /// First environment compared.
    pub environment_a: String,
    /// Second environment compared.
    pub environment_b: String,
    /// Groups where `environment_a` was strictly faster.
    pub wins_a: u32,
    /// Groups where `environment_b` was strictly faster.
    pub wins_b: u32,
    /// Groups with exactly equal throughput.
    pub ties: u32,
    /// Groups measured in both environments.
    pub total: u32,
}

/// Compare two environments over their shared `(model, quantization)` keys.
///
/// Per environment each key maps to one throughput value; when a key was
/// measured several times the last record wins. Only keys present on
/// both sides are compared, and a win requires strictly greater
/// throughput.
#[must_use]
pub fn head_to_head(
    runs: &[RunRecord],
    environment_a: &str,
    environment_b: &str,
    test: TestKind,
    flag: FlagFilter,
) -> HeadToHead {
    let side = |environment: &str| -> BTreeMap<ModelKey, f64> {
        let mut best = BTreeMap::new();
        for run in runs {
            if run.failed || run.test_kind != Some(test) || !flag.matches(run.fused_attention) {
                continue;
            }
            if run.environment != environment {
                continue;
            }
            if let Some(mean) = run.throughput_mean {
                best.insert(model_key(run), mean);
            }
        }
        best
    };

    let a = side(environment_a);
    let b = side(environment_b);

    let (mut wins_a, mut wins_b, mut ties) = (0u32, 0u32, 0u32);
    for (key, value_a) in &a {
        let Some(value_b) = b.get(key) else {
            continue;
        };
        if value_a > value_b {
            wins_a += 1;
        } else if value_b > value_a {
            wins_b += 1;
        } else {
            ties += 1;
        }
    }

    HeadToHead {
        environment_a: environment_a.to_string(),
        environment_b: environment_b.to_string(),
        wins_a,
        wins_b,
        ties,
        total: wins_a + wins_b + ties,
    }
}
