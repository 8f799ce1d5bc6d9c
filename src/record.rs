//! Core data model for benchmark run records.
//!
//! A [`RunRecord`] is one observed outcome from one transcript: either a
//! throughput measurement, a classified failure, or an unknown outcome.
//! Exactly one of those three shapes holds for any record:
//!
//! - measurement: `test_kind` present, `throughput_mean`/`throughput_stderr`
//!   present, `failed == false`
//! - failure: `failed == true`, `failure_kind` present, no throughput
//! - unknown: no `test_kind`, no throughput, `failed == false`

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Test Kind
// ============================================================================

/// Which throughput phase a measurement covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TestKind {
    /// Compute-bound prompt ingestion (`pp512` style rows).
    #[serde(rename = "prefill-throughput")]
    Prefill,
    /// Memory-bound token emission (`tg128` style rows).
    #[serde(rename = "generation-throughput")]
    Generation,
}

impl TestKind {
    /// String form used in the persisted dataset.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TestKind::Prefill => "prefill-throughput",
            TestKind::Generation => "generation-throughput",
        }
    }

    /// Classify a benchmark table `test` cell by its phase prefix.
    ///
    /// `pp512`, `pp2048`, `PP512` all map to [`TestKind::Prefill`];
    /// `tg128` style cells map to [`TestKind::Generation`]. Anything
    /// else (warmup rows, blank cells) is `None`.
    #[must_use]
    pub fn classify(cell: &str) -> Option<Self> {
        let cell = cell.trim();
        let bytes = cell.as_bytes();
        if bytes.len() < 2 {
            return None;
        }
        match (
            bytes[0].to_ascii_lowercase(),
            bytes[1].to_ascii_lowercase(),
        ) {
            (b'p', b'p') => Some(TestKind::Prefill),
            (b't', b'g') => Some(TestKind::Generation),
            _ => None,
        }
    }

    /// Parse a user-facing name: `pp`, `tg`, a raw cell like `pp512`,
    /// or the dataset names `prefill-throughput` / `generation-throughput`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "prefill" | "prefill-throughput" => Some(TestKind::Prefill),
            "generation" | "generation-throughput" => Some(TestKind::Generation),
            other => Self::classify(other),
        }
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Failure Kind
// ============================================================================

/// Category of a failed run, decided by an ordered rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// Model never loaded (missing file, device allocation failure).
    Load,
    /// Device hang or hardware exception.
    Hang,
    /// The run started but aborted with a runtime error.
    Runtime,
}

impl FailureKind {
    /// String form used in the persisted dataset.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Load => "load",
            FailureKind::Hang => "hang",
            FailureKind::Runtime => "runtime",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Flag Filter
// ============================================================================

/// Fused-attention filter applied by the analyzers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagFilter {
    /// Keep only runs with the flag enabled.
    On,
    /// Keep only runs with the flag disabled.
    Off,
    /// Keep runs regardless of the flag.
    #[default]
    Either,
}

impl FlagFilter {
    /// String form for display and CLI round-trips.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagFilter::On => "on",
            FlagFilter::Off => "off",
            FlagFilter::Either => "either",
        }
    }

    /// Parse `on`, `off`, or `either` (case-insensitive; `any` is accepted
    /// as a synonym for `either`).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "on" => Some(FlagFilter::On),
            "off" => Some(FlagFilter::Off),
            "either" | "any" => Some(FlagFilter::Either),
            _ => None,
        }
    }

    /// Whether a run with the given flag state passes this filter.
    #[must_use]
    pub fn matches(&self, enabled: bool) -> bool {
        match self {
            FlagFilter::On => enabled,
            FlagFilter::Off => !enabled,
            FlagFilter::Either => true,
        }
    }
}

impl fmt::Display for FlagFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Build Info
// ============================================================================

/// Build fingerprint of the benchmark binary, from the transcript footer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BuildInfo {
    /// Abbreviated commit hash (at least seven hex digits).
    pub hash: String,
    /// Monotonic build sequence number.
    pub sequence: u64,
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.hash, self.sequence)
    }
}

// ============================================================================
// Run Record
// ============================================================================

/// One observed benchmark outcome, flattened for JSON persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Model identifier exactly as written in the filename.
    pub model_raw: String,
    /// Model identifier with shard suffixes removed.
    pub model_clean: String,
    /// Full canonical environment name (base plus variant).
    pub environment: String,
    /// Environment up to the first hyphen of the canonical name.
    pub environment_base: String,
    /// Remainder after the first hyphen, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_variant: Option<String>,
    /// Whether fused attention was enabled for this run.
    pub fused_attention: bool,
    /// Context-length label, `default` unless the filename says otherwise.
    pub context_tag: String,
    /// Numeric context length parsed from the context tag, if present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_tokens: Option<u64>,
    /// Throughput phase, absent for failures and unknown outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_kind: Option<TestKind>,
    /// Mean throughput in tokens per second.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throughput_mean: Option<f64>,
    /// Standard error of the throughput mean.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throughput_stderr: Option<f64>,
    /// True when the transcript classified as a failed run.
    pub failed: bool,
    /// Failure category, present exactly when `failed` is true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    /// Quantization label extracted from the clean model name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantization: Option<String>,
    /// Parameter count in billions, from the table or the model name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param_count_billion: Option<f64>,
    /// On-disk model size in GiB, from the table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size_gib: Option<f64>,
    /// Compute backend column from the table (`ROCm`, `Vulkan`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    /// GPU offload layer count (`ngl` column).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_layers: Option<u32>,
    /// Memory-mapping setting (`mmap` column).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mmap: Option<u32>,
    /// Transcript path this record was extracted from.
    pub source_path: String,
    /// True when the run used a multi-node RPC setup.
    pub is_distributed: bool,
    /// Benchmark binary build, if the transcript footer carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildInfo>,
}

impl RunRecord {
    /// True when the record carries a successful throughput measurement.
    #[must_use]
    pub fn is_measurement(&self) -> bool {
        !self.failed && self.test_kind.is_some() && self.throughput_mean.is_some()
    }
}
