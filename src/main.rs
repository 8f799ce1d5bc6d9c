//! Cotejar CLI - benchmark transcript collation and backend comparison
//!
//! Turns a directory of `llama-bench` console captures into a structured
//! dataset and answers ranking questions about it.
//!
//! # Commands
//!
//! - `scan` - Ingest transcript directories into a dataset JSON
//! - `placements` - Margin-aware podium counts per environment
//! - `pairwise` - Head-to-head wins between two environments
//! - `feature-effect` - Paired fused-attention effect
//! - `variant-effect` - Backend-variant effect across environment pairs
//! - `tolerance` - Within-tolerance winner counts per cohort
//! - `curate` - Keep/delete classification for failed transcripts
//! - `loadtime` - Load-time harness log summary

use clap::Parser;

use cotejar::cli::{entrypoint, Cli};
use cotejar::error::Result;

fn main() -> Result<()> {
    env_logger::init();
    entrypoint(Cli::parse())
}
