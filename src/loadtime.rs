//! Load-time benchmark log parsing.
//!
//! The load-time harness prints one line per model/environment attempt:
//!
//! ```text
//! ✔ [rocm7_rc] gemma-3-12b-it-Q8_0 avg=5.32s over 3 runs
//! ✖ [vulkan_radv] gemma-3-12b-it-Q8_0 all runs failed
//! ```
//!
//! Everything else in the log is progress noise and is skipped.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One parsed load-time attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadTimeRecord {
    /// Environment the model was loaded under.
    pub environment: String,
    /// Model identifier as printed by the harness.
    pub model: String,
    /// Average load-plus-first-inference wall time in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_seconds: Option<f64>,
    /// Number of successful runs behind the average.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runs: Option<u32>,
    /// True when every run of this attempt failed.
    pub failed: bool,
}

/// Parse a load-time harness log into records, skipping unrelated lines.
#[must_use]
pub fn parse_loadtime_log(text: &str) -> Vec<LoadTimeRecord> {
    text.lines().filter_map(parse_line).collect()
}

/// Fastest environment per model, over the last observation of each
/// `(model, environment)` pair. Models with no successful attempt are
/// absent; ties go to the lexicographically first environment.
#[must_use]
pub fn fastest_by_model(records: &[LoadTimeRecord]) -> BTreeMap<String, String> {
    let mut latest: BTreeMap<(&str, &str), Option<f64>> = BTreeMap::new();
    for record in records {
        let value = if record.failed {
            None
        } else {
            record.avg_seconds
        };
        latest.insert((record.model.as_str(), record.environment.as_str()), value);
    }

    let mut best: BTreeMap<&str, f64> = BTreeMap::new();
    let mut fastest: BTreeMap<String, String> = BTreeMap::new();
    for (&(model, environment), avg) in &latest {
        let Some(avg) = avg else {
            continue;
        };
        let replace = match best.get(model) {
            None => true,
            Some(current) => avg < current,
        };
        if replace {
            best.insert(model, *avg);
            fastest.insert(model.to_string(), environment.to_string());
        }
    }
    fastest
}

fn parse_line(line: &str) -> Option<LoadTimeRecord> {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix("✔ [") {
        let (environment, rest) = split_tag(rest)?;
        let (model, rest) = split_word(rest)?;
        let rest = rest.strip_prefix("avg=")?;
        let (avg, rest) = split_float(rest)?;
        let rest = rest.strip_prefix('s')?;
        let rest = rest.strip_prefix(" over ")?;
        let (runs, rest) = split_digits(rest)?;
        if !rest.starts_with(" runs") {
            return None;
        }
        return Some(LoadTimeRecord {
            environment,
            model,
            avg_seconds: Some(avg),
            runs: Some(runs),
            failed: false,
        });
    }
    if let Some(rest) = line.strip_prefix("✖ [") {
        let (environment, rest) = split_tag(rest)?;
        let (model, rest) = split_word(rest)?;
        if rest.starts_with("all runs failed") {
            return Some(LoadTimeRecord {
                environment,
                model,
                avg_seconds: None,
                runs: None,
                failed: true,
            });
        }
    }
    None
}

fn split_tag(s: &str) -> Option<(String, &str)> {
    let end = s.find(']')?;
    if end == 0 {
        return None;
    }
    let rest = s[end + 1..].strip_prefix(' ')?;
    Some((s[..end].to_string(), rest))
}

fn split_word(s: &str) -> Option<(String, &str)> {
    let end = s.find(' ')?;
    if end == 0 {
        return None;
    }
    Some((s[..end].to_string(), &s[end + 1..]))
}

fn split_float(s: &str) -> Option<(f64, &str)> {
    let end = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    let value = s[..end].parse().ok()?;
    Some((value, &s[end..]))
}

fn split_digits(s: &str) -> Option<(u32, &str)> {
    let end = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    let value = s[..end].parse().ok()?;
    Some((value, &s[end..]))
}
