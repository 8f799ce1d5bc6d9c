//! Dataset assembly: walk transcript directories, extract records, and
//! wrap them with metadata.
//!
//! Ingestion is read-only and order-deterministic: paths are sorted per
//! source, transcripts are decoded in parallel, and the resulting records
//! keep path order. Persistence stays with the caller; the store only
//! converts to and from JSON text.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{CotejarError, Result};
use crate::naming::parse_stem;
use crate::record::{BuildInfo, RunRecord};
use crate::transcript::extract_records;

/// Default legend stored in dataset metadata.
pub const DEFAULT_NOTES: &str =
    "pp512 = prompt processing; tg128 = text generation; t/s = tokens/second";

// ============================================================================
// Dataset Types
// ============================================================================

/// Metadata block persisted alongside the records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMeta {
    /// UTC timestamp of the ingest, RFC 3339 with second precision.
    pub generated_at: String,
    /// Distinct benchmark binary builds seen, sorted.
    pub builds: Vec<BuildInfo>,
    /// Distinct canonical environment names seen, sorted.
    pub environments: Vec<String>,
    /// Free-form legend for readers of the dataset.
    pub notes: String,
}

/// A full dataset: metadata plus every extracted run record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStore {
    /// Ingest metadata.
    pub meta: RunMeta,
    /// All records, in sorted-path order.
    pub runs: Vec<RunRecord>,
}

impl RunStore {
    /// Serialize the dataset as pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize a dataset from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

// ============================================================================
// Ingest Configuration
// ============================================================================

/// One directory of transcripts to ingest.
#[derive(Debug, Clone)]
pub struct IngestSource {
    /// Directory holding the transcript files.
    pub root: PathBuf,
    /// Mark every record from this source as a distributed run.
    pub distributed: bool,
}

impl IngestSource {
    /// A directory of single-node transcripts.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            distributed: false,
        }
    }

    /// A directory of multi-node RPC transcripts.
    pub fn distributed(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            distributed: true,
        }
    }
}

/// Ingest settings: which directories to walk and the metadata legend.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Sources scanned in order.
    pub sources: Vec<IngestSource>,
    /// Legend copied into [`RunMeta::notes`].
    pub notes: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            notes: DEFAULT_NOTES.to_string(),
        }
    }
}

impl IngestConfig {
    /// Empty configuration with the default legend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a source directory.
    #[must_use]
    pub fn with_source(mut self, source: IngestSource) -> Self {
        self.sources.push(source);
        self
    }

    /// Replace the metadata legend.
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }
}

// ============================================================================
// Ingestion
// ============================================================================

/// List regular files under a transcript directory, sorted by path.
pub fn list_transcripts(root: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let root = root.as_ref();
    let entries =
        fs::read_dir(root).map_err(|err| CotejarError::io(root.display().to_string(), err))?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| CotejarError::io(root.display().to_string(), err))?;
        let path = entry.path();
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Walk every configured source and build a [`RunStore`].
///
/// Transcripts are decoded in parallel but records keep sorted-path
/// order, so repeated ingests of the same tree differ only in the
/// `generated_at` stamp. Files without a `__` in their stem and files
/// whose identity cannot be decoded are skipped; unreadable files are
/// logged and skipped. A missing source directory is an error.
pub fn ingest(config: &IngestConfig) -> Result<RunStore> {
    let mut jobs: Vec<(PathBuf, bool)> = Vec::new();
    for source in &config.sources {
        for path in list_transcripts(&source.root)? {
            jobs.push((path, source.distributed));
        }
    }

    let per_file: Vec<Vec<RunRecord>> = jobs
        .par_iter()
        .map(|(path, distributed)| scan_transcript(path, *distributed))
        .collect();
    let runs: Vec<RunRecord> = per_file.into_iter().flatten().collect();

    let mut builds: BTreeSet<BuildInfo> = BTreeSet::new();
    let mut environments: BTreeSet<String> = BTreeSet::new();
    for run in &runs {
        if let Some(build) = &run.build {
            builds.insert(build.clone());
        }
        environments.insert(run.environment.clone());
    }

    Ok(RunStore {
        meta: RunMeta {
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            builds: builds.into_iter().collect(),
            environments: environments.into_iter().collect(),
            notes: config.notes.clone(),
        },
        runs,
    })
}

fn scan_transcript(path: &Path, distributed_source: bool) -> Vec<RunRecord> {
    let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
        return Vec::new();
    };
    if !stem.contains("__") {
        return Vec::new();
    }
    let Some(mut identity) = parse_stem(stem) else {
        log::debug!("no usable identity in {}", path.display());
        return Vec::new();
    };
    identity.distributed = identity.distributed || distributed_source;

    let text = match fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(err) => {
            log::warn!("skipping unreadable transcript {}: {err}", path.display());
            return Vec::new();
        }
    };

    extract_records(&text, &identity, &path.display().to_string())
}
