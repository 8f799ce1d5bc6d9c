//! # Cotejar
//!
//! Collate `llama-bench` transcripts into structured run records and
//! margin-aware backend rankings.
//!
//! Cotejar (Spanish: "to collate, to compare") ingests the raw console
//! captures of a GPU inference benchmark sweep, one file per
//! model/environment/flag combination, and turns them into a structured
//! dataset plus statistical comparisons between runtime backends.
//!
//! ## Pipeline
//!
//! - [`naming`] decodes run identity from the filename convention
//! - [`transcript`] recovers table rows, the build footer, and failure
//!   classifications from one transcript's text
//! - [`store`] walks transcript directories and assembles the dataset
//! - [`analysis`] ranks backends and quantifies feature effects
//! - [`loadtime`] handles the companion load-time harness logs
//!
//! Extraction is tolerant by construction: a malformed transcript never
//! aborts an ingest, it degrades to a failure or unknown-outcome record.
//!
//! ## Example
//!
//! ```rust
//! use cotejar::naming::parse_stem;
//! use cotejar::transcript::extract_records;
//!
//! let text = "\
//! | model | test  | t/s         |
//! | ----- | ----- | ----------- |
//! | m     | pp512 | 100.0 ± 2.0 |
//! ";
//! let identity = parse_stem("modelA__envX__fa1").unwrap();
//! let records = extract_records(text, &identity, "results/modelA__envX__fa1.log");
//! assert_eq!(records.len(), 1);
//! assert_eq!(records[0].throughput_mean, Some(100.0));
//! assert!(records[0].fused_attention);
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

// Clippy allows (MUST come after deny/warn to override them)
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)] // Not all methods need #[must_use]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_precision_loss)] // usize -> f64 for averages is safe
#![allow(clippy::float_cmp)] // Allow float comparisons in tests
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::doc_markdown)] // Allow technical terms without backticks
#![allow(clippy::too_many_lines)]
#![allow(clippy::single_char_pattern)]
#![allow(clippy::if_not_else)]

/// Statistical comparison of run records across environments
pub mod analysis;
/// CLI command implementations (extracted for testability)
pub mod cli;
pub mod error;
pub mod loadtime;
pub mod naming;
pub mod record;
pub mod store;
/// Tolerant extraction from one transcript's text
pub mod transcript;

// Re-exports for convenience
pub use error::{CotejarError, Result};
pub use record::{BuildInfo, FailureKind, FlagFilter, RunRecord, TestKind};
pub use store::{RunMeta, RunStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
