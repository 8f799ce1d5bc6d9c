//! CLI command implementations
//!
//! This module contains all the business logic for CLI commands,
//! extracted from main.rs for testability. `scan` turns transcript
//! directories into a dataset; every analysis subcommand reads such a
//! dataset back and prints its result as pretty JSON. Rendering beyond
//! JSON is left to downstream report tooling.

// CLI glue code - relaxed lint requirements
#![allow(clippy::needless_pass_by_value)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::analysis::{
    flag_effect, head_to_head, margin_aware_placements, tolerance_summary, variant_effect,
    VariantPair,
};
use crate::error::{CotejarError, Result};
use crate::loadtime::{fastest_by_model, parse_loadtime_log, LoadTimeRecord};
use crate::record::{FailureKind, FlagFilter, TestKind};
use crate::store::{ingest, list_transcripts, IngestConfig, IngestSource, RunStore};
use crate::transcript::{
    classify_failure, is_failed_run, is_non_transient_oom, is_transient_failure,
};

/// Cotejar - collate benchmark transcripts and compare runtime backends.
#[derive(Parser)]
#[command(name = "cotejar")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// All cotejar subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Ingest transcript directories into a dataset JSON
    ///
    /// Examples:
    ///   cotejar scan results/
    ///   cotejar scan results/ --distributed results-rpc/ --out results.json
    Scan {
        /// Directories of single-node transcripts
        #[arg(value_name = "DIR")]
        dirs: Vec<PathBuf>,

        /// Directories of multi-node RPC transcripts
        #[arg(long, value_name = "DIR")]
        distributed: Vec<PathBuf>,

        /// Replace the dataset legend stored in the metadata
        #[arg(long)]
        notes: Option<String>,

        /// Write the dataset here instead of stdout
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Margin-aware podium counts per environment
    Placements {
        /// Dataset JSON produced by `scan`
        #[arg(value_name = "DATASET")]
        data: PathBuf,

        /// Environment to compare (repeatable; defaults to every
        /// environment in the dataset)
        #[arg(short, long = "env", value_name = "ENV")]
        env: Vec<String>,

        /// Throughput phase: pp or tg
        #[arg(short, long, default_value = "pp")]
        test: String,

        /// Fused-attention filter: on, off, or either
        #[arg(short, long, default_value = "on")]
        flag: String,
    },
    /// Head-to-head wins between two environments
    Pairwise {
        /// Dataset JSON produced by `scan`
        #[arg(value_name = "DATASET")]
        data: PathBuf,

        /// First environment
        #[arg(value_name = "ENV_A")]
        env_a: String,

        /// Second environment
        #[arg(value_name = "ENV_B")]
        env_b: String,

        /// Throughput phase: pp or tg
        #[arg(short, long, default_value = "pp")]
        test: String,

        /// Fused-attention filter: on, off, or either
        #[arg(short, long, default_value = "on")]
        flag: String,
    },
    /// Paired fused-attention effect per environment and test
    FeatureEffect {
        /// Dataset JSON produced by `scan`
        #[arg(value_name = "DATASET")]
        data: PathBuf,

        /// Environment to report (repeatable; defaults to every
        /// environment in the dataset)
        #[arg(short, long = "env", value_name = "ENV")]
        env: Vec<String>,

        /// Throughput phase to report (repeatable; defaults to both)
        #[arg(short, long = "test", value_name = "TEST")]
        test: Vec<String>,
    },
    /// Backend-variant effect across environment pairs
    ///
    /// Examples:
    ///   cotejar variant-effect results.json \
    ///     --pair "rocWMMA=rocm7_rc-rocwmma:rocm7_rc" \
    ///     --pair "hipBLASLt=rocm7_rc:rocm7_rc-hblt0"
    VariantEffect {
        /// Dataset JSON produced by `scan`
        #[arg(value_name = "DATASET")]
        data: PathBuf,

        /// Variant pair as <label>=<env-on>:<env-off> (repeatable)
        #[arg(short, long = "pair", value_name = "SPEC", required = true)]
        pair: Vec<String>,

        /// Throughput phase to report (repeatable; defaults to both)
        #[arg(short, long = "test", value_name = "TEST")]
        test: Vec<String>,
    },
    /// Within-tolerance winner counts per cohort
    Tolerance {
        /// Dataset JSON produced by `scan`
        #[arg(value_name = "DATASET")]
        data: PathBuf,

        /// Throughput phase: pp or tg
        #[arg(short, long, default_value = "pp")]
        test: String,

        /// Standard-error multiplier defining the tolerance bar
        #[arg(short, long, default_value_t = 1.0)]
        multiplier: f64,
    },
    /// Classify failed transcripts for curation (performs no deletion)
    Curate {
        /// Directories of transcripts to classify
        #[arg(value_name = "DIR", required = true)]
        dirs: Vec<PathBuf>,
    },
    /// Summarize a load-time harness console log
    Loadtime {
        /// Captured load-time harness output
        #[arg(value_name = "LOG")]
        log: PathBuf,
    },
}

/// Main CLI entrypoint - dispatches commands to handlers.
pub fn entrypoint(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Scan {
            dirs,
            distributed,
            notes,
            out,
        } => handle_scan(&dirs, &distributed, notes.as_deref(), out.as_deref()),
        Commands::Placements {
            data,
            env,
            test,
            flag,
        } => handle_placements(&data, &env, &test, &flag),
        Commands::Pairwise {
            data,
            env_a,
            env_b,
            test,
            flag,
        } => handle_pairwise(&data, &env_a, &env_b, &test, &flag),
        Commands::FeatureEffect { data, env, test } => handle_feature_effect(&data, &env, &test),
        Commands::VariantEffect { data, pair, test } => handle_variant_effect(&data, &pair, &test),
        Commands::Tolerance {
            data,
            test,
            multiplier,
        } => handle_tolerance(&data, &test, multiplier),
        Commands::Curate { dirs } => handle_curate(&dirs),
        Commands::Loadtime { log } => handle_loadtime(&log),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Ingest transcript directories and emit the dataset JSON.
pub fn handle_scan(
    dirs: &[PathBuf],
    distributed: &[PathBuf],
    notes: Option<&str>,
    out: Option<&Path>,
) -> Result<()> {
    if dirs.is_empty() && distributed.is_empty() {
        return Err(CotejarError::invalid(
            "scan needs at least one transcript directory",
        ));
    }
    let mut config = IngestConfig::new();
    for dir in dirs {
        config = config.with_source(IngestSource::local(dir));
    }
    for dir in distributed {
        config = config.with_source(IngestSource::distributed(dir));
    }
    if let Some(notes) = notes {
        config = config.with_notes(notes);
    }

    let store = ingest(&config)?;
    log::info!(
        "extracted {} records across {} environments",
        store.runs.len(),
        store.meta.environments.len()
    );
    emit(out, &store.to_json_pretty()?)
}

/// Print the margin-aware placement table for one test kind.
pub fn handle_placements(data: &Path, env: &[String], test: &str, flag: &str) -> Result<()> {
    let store = load_store(data)?;
    let environments = cohort(&store, env);
    let table = margin_aware_placements(
        &store.runs,
        &environments,
        parse_test(test)?,
        parse_flag(flag)?,
    );
    print_json(&table)
}

/// Print head-to-head win counts between two environments.
pub fn handle_pairwise(
    data: &Path,
    env_a: &str,
    env_b: &str,
    test: &str,
    flag: &str,
) -> Result<()> {
    let store = load_store(data)?;
    let result = head_to_head(
        &store.runs,
        env_a,
        env_b,
        parse_test(test)?,
        parse_flag(flag)?,
    );
    print_json(&result)
}

/// Print the paired fused-attention effect rows.
pub fn handle_feature_effect(data: &Path, env: &[String], test: &[String]) -> Result<()> {
    let store = load_store(data)?;
    let environments = cohort(&store, env);
    let rows = flag_effect(&store.runs, &environments, &parse_tests(test)?);
    print_json(&rows)
}

/// Print backend-variant effect rows for the requested pairs.
pub fn handle_variant_effect(data: &Path, pairs: &[String], test: &[String]) -> Result<()> {
    let store = load_store(data)?;
    let pairs = pairs
        .iter()
        .map(|spec| parse_pair(spec))
        .collect::<Result<Vec<_>>>()?;
    let rows = variant_effect(&store.runs, &pairs, &parse_tests(test)?);
    print_json(&rows)
}

/// Print the within-tolerance winner summary for one test kind.
pub fn handle_tolerance(data: &Path, test: &str, multiplier: f64) -> Result<()> {
    if !multiplier.is_finite() || multiplier < 0.0 {
        return Err(CotejarError::invalid(format!(
            "tolerance multiplier must be a non-negative number, got {multiplier}"
        )));
    }
    let store = load_store(data)?;
    let report = tolerance_summary(&store.runs, parse_test(test)?, multiplier);
    print_json(&report)
}

/// Curation verdict for one failed transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurationRow {
    /// Transcript path.
    pub transcript: String,
    /// Failure category the transcript classified as.
    pub failure_kind: FailureKind,
    /// True for the hard out-of-memory condition that will recur on retry.
    pub non_transient_oom: bool,
    /// True when a curation pass may safely delete the transcript.
    pub transient: bool,
}

/// List failed transcripts with their keep/delete classification.
///
/// Only classification is printed; deleting transcripts stays a manual
/// step.
pub fn handle_curate(dirs: &[PathBuf]) -> Result<()> {
    let mut rows = Vec::new();
    for dir in dirs {
        for path in list_transcripts(dir)? {
            let text = match fs::read(&path) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(err) => {
                    log::warn!("skipping unreadable transcript {}: {err}", path.display());
                    continue;
                }
            };
            if !is_failed_run(&text) {
                continue;
            }
            let Some(failure_kind) = classify_failure(&text) else {
                continue;
            };
            rows.push(CurationRow {
                transcript: path.display().to_string(),
                failure_kind,
                non_transient_oom: is_non_transient_oom(&text),
                transient: is_transient_failure(&text),
            });
        }
    }
    print_json(&rows)
}

/// Load-time records plus the fastest environment per model.
#[derive(Debug, Serialize)]
struct LoadTimeSummary {
    records: Vec<LoadTimeRecord>,
    fastest: BTreeMap<String, String>,
}

/// Parse a load-time harness log and print records plus fastest picks.
pub fn handle_loadtime(log: &Path) -> Result<()> {
    let text =
        fs::read_to_string(log).map_err(|err| CotejarError::io(log.display().to_string(), err))?;
    let records = parse_loadtime_log(&text);
    let fastest = fastest_by_model(&records);
    print_json(&LoadTimeSummary { records, fastest })
}

// ============================================================================
// Argument Conversion
// ============================================================================

/// Read a dataset produced by `scan`.
fn load_store(path: &Path) -> Result<RunStore> {
    let text = fs::read_to_string(path)
        .map_err(|err| CotejarError::io(path.display().to_string(), err))?;
    RunStore::from_json(&text)
}

/// Requested environments, or every environment in the dataset.
fn cohort(store: &RunStore, requested: &[String]) -> Vec<String> {
    if requested.is_empty() {
        store.meta.environments.clone()
    } else {
        requested.to_vec()
    }
}

fn parse_test(s: &str) -> Result<TestKind> {
    TestKind::parse(s).ok_or_else(|| {
        CotejarError::invalid(format!("unknown test kind '{s}' (expected pp or tg)"))
    })
}

fn parse_tests(specs: &[String]) -> Result<Vec<TestKind>> {
    if specs.is_empty() {
        return Ok(vec![TestKind::Prefill, TestKind::Generation]);
    }
    specs.iter().map(|spec| parse_test(spec)).collect()
}

fn parse_flag(s: &str) -> Result<FlagFilter> {
    FlagFilter::parse(s).ok_or_else(|| {
        CotejarError::invalid(format!(
            "unknown flag filter '{s}' (expected on, off, or either)"
        ))
    })
}

/// Parse a `<label>=<env-on>:<env-off>` variant pair spec.
fn parse_pair(spec: &str) -> Result<VariantPair> {
    let malformed = || {
        CotejarError::invalid(format!(
            "variant pair '{spec}' must look like <label>=<env-on>:<env-off>"
        ))
    };
    let (label, envs) = spec.split_once('=').ok_or_else(malformed)?;
    let (enabled, disabled) = envs.split_once(':').ok_or_else(malformed)?;
    if label.is_empty() || enabled.is_empty() || disabled.is_empty() {
        return Err(malformed());
    }
    Ok(VariantPair::new(label, enabled, disabled))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn emit(out: Option<&Path>, text: &str) -> Result<()> {
    match out {
        Some(path) => {
            fs::write(path, text).map_err(|err| CotejarError::io(path.display().to_string(), err))
        }
        None => {
            println!("{text}");
            Ok(())
        }
    }
}
