//! End-to-end pipeline tests: transcript files on disk through ingestion
//! into the analyzers and the CLI handlers.
//!
//! Focus areas:
//! - Full sweep ingestion (filename decoding, table extraction, metadata)
//! - Failure classification precedence and record shapes
//! - Curation predicates on real failure transcripts
//! - Analyzer results against hand-computed expectations
//! - CLI handlers driving the same flow through dataset files

use std::fs;
use std::path::Path;

use cotejar::analysis::{
    flag_effect, head_to_head, margin_aware_placements, tolerance_summary, variant_effect,
    VariantPair,
};
use cotejar::cli::{
    handle_curate, handle_feature_effect, handle_loadtime, handle_pairwise, handle_placements,
    handle_scan, handle_tolerance, handle_variant_effect,
};
use cotejar::naming::parse_stem;
use cotejar::record::{FailureKind, FlagFilter, TestKind};
use cotejar::store::{ingest, IngestConfig, IngestSource, RunStore};
use cotejar::transcript::{extract_records, is_non_transient_oom, is_transient_failure};

// ============================================================================
// Helper Functions
// ============================================================================

/// Write one transcript into the directory.
fn write_log(dir: &Path, name: &str, body: &str) {
    fs::write(dir.join(name), body).unwrap();
}

/// A healthy two-row benchmark transcript with the full column set.
fn bench_table(pp: &str, tg: &str) -> String {
    format!(
        "ggml_vulkan: Found 1 Vulkan devices:\n\
         | model           |       size |   params | backend | ngl | test  |            t/s |\n\
         | --------------- | ---------: | -------: | ------- | --: | ----- | -------------: |\n\
         | gemma3 12B Q8_0 |  11.12 GiB |  11.77 B | ROCm    |  99 | pp512 | {pp} |\n\
         | gemma3 12B Q8_0 |  11.12 GiB |  11.77 B | ROCm    |  99 | tg128 | {tg} |\n\
         \n\
         build: cd6983d5 (6119)\n"
    )
}

fn environments(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| (*name).to_string()).collect()
}

// ============================================================================
// Ingestion
// ============================================================================

#[test]
fn test_sweep_ingestion_decodes_identity_and_table() {
    let dir = tempfile::tempdir().unwrap();
    write_log(
        dir.path(),
        "gemma-3-12b-it-Q8_0__rocm7_rc__fa1.log",
        &bench_table("1043.48 ± 4.29", "26.38 ± 0.08"),
    );

    let config = IngestConfig::new().with_source(IngestSource::local(dir.path()));
    let store = ingest(&config).unwrap();

    assert_eq!(store.runs.len(), 2);
    let pp = &store.runs[0];
    assert_eq!(pp.model_clean, "gemma-3-12b-it-Q8_0");
    assert_eq!(pp.environment, "rocm7_rc");
    assert!(pp.fused_attention);
    assert_eq!(pp.test_kind, Some(TestKind::Prefill));
    assert_eq!(pp.throughput_mean, Some(1043.48));
    assert_eq!(pp.throughput_stderr, Some(4.29));
    assert_eq!(pp.quantization.as_deref(), Some("Q8_0"));
    // the params column beats the (absent) name hint
    assert_eq!(pp.param_count_billion, Some(11.77));
    assert_eq!(pp.file_size_gib, Some(11.12));
    assert_eq!(pp.backend.as_deref(), Some("ROCm"));
    assert_eq!(pp.gpu_layers, Some(99));
    assert!(!pp.failed);

    let tg = &store.runs[1];
    assert_eq!(tg.test_kind, Some(TestKind::Generation));
    assert_eq!(tg.throughput_mean, Some(26.38));

    assert_eq!(store.meta.environments, vec!["rocm7_rc"]);
    assert_eq!(store.meta.builds.len(), 1);
    assert_eq!(store.meta.builds[0].hash, "cd6983d5");
    assert_eq!(store.meta.builds[0].sequence, 6119);
}

#[test]
fn test_ingestion_folds_flags_and_aliases() {
    let dir = tempfile::tempdir().unwrap();
    write_log(
        dir.path(),
        "llama-2-7b.Q4_0__rocm7_1__hblt0__fa1__longctx8192.log",
        &bench_table("800.00 ± 1.00", "40.00 ± 0.50"),
    );
    write_log(
        dir.path(),
        "llama-2-7b.Q4_0__vulkan__rpc.log",
        &bench_table("700.00 ± 1.00", "35.00 ± 0.50"),
    );

    let config = IngestConfig::new().with_source(IngestSource::local(dir.path()));
    let store = ingest(&config).unwrap();
    assert_eq!(store.runs.len(), 4);

    let aliased = &store.runs[0];
    assert_eq!(aliased.environment, "rocm7.1-hblt0");
    assert_eq!(aliased.environment_base, "rocm7.1");
    assert_eq!(aliased.environment_variant.as_deref(), Some("hblt0"));
    assert!(aliased.fused_attention);
    assert_eq!(aliased.context_tag, "longctx8192");
    assert_eq!(aliased.context_tokens, Some(8192));
    assert!(!aliased.is_distributed);

    let rpc = &store.runs[2];
    assert_eq!(rpc.environment, "vulkan");
    assert!(rpc.is_distributed);
    assert_eq!(rpc.context_tag, "default");

    assert_eq!(store.meta.environments, vec!["rocm7.1-hblt0", "vulkan"]);
}

#[test]
fn test_distributed_source_marks_all_records() {
    let dir = tempfile::tempdir().unwrap();
    write_log(
        dir.path(),
        "m__vulkan.log",
        &bench_table("10.0 ± 0.1", "5.0 ± 0.1"),
    );

    let config = IngestConfig::new().with_source(IngestSource::distributed(dir.path()));
    let store = ingest(&config).unwrap();
    assert_eq!(store.runs.len(), 2);
    assert!(store.runs.iter().all(|run| run.is_distributed));
}

#[test]
fn test_fused_attention_column_overrides_filename() {
    let dir = tempfile::tempdir().unwrap();
    // filename claims fa1 but the table records fa=0
    write_log(
        dir.path(),
        "m__rocm7__fa1.log",
        "| model | fa | test  | t/s |\n\
         | ----- | -- | ----- | --- |\n\
         | m     |  0 | pp512 | 100.0 ± 1.0 |\n",
    );

    let config = IngestConfig::new().with_source(IngestSource::local(dir.path()));
    let store = ingest(&config).unwrap();
    assert_eq!(store.runs.len(), 1);
    assert!(!store.runs[0].fused_attention);
}

// ============================================================================
// Failure Classification
// ============================================================================

#[test]
fn test_failure_transcript_yields_single_load_record() {
    let dir = tempfile::tempdir().unwrap();
    write_log(
        dir.path(),
        "big-model__vulkan.log",
        "llama_model_load: error loading model\n\
         main: failed to load model 'big-model.gguf'\n\
         main: error: unable to load model\n",
    );

    let config = IngestConfig::new().with_source(IngestSource::local(dir.path()));
    let store = ingest(&config).unwrap();

    assert_eq!(store.runs.len(), 1);
    let record = &store.runs[0];
    assert!(record.failed);
    // both load and runtime phrases are present; load wins
    assert_eq!(record.failure_kind, Some(FailureKind::Load));
    assert_eq!(record.test_kind, None);
    assert_eq!(record.throughput_mean, None);
    assert_eq!(record.build, None);
}

#[test]
fn test_failure_precedence_hang_and_runtime() {
    let dir = tempfile::tempdir().unwrap();
    write_log(
        dir.path(),
        "m1__rocm7.log",
        "amdgpu: GPU Hang detected\nmain: error: backend crashed\n",
    );
    write_log(dir.path(), "m2__rocm7.log", "./run.sh: line 9: exit 139\n");
    write_log(dir.path(), "m3__rocm7.log", "benchmark skipped, exit 0\n");

    let config = IngestConfig::new().with_source(IngestSource::local(dir.path()));
    let store = ingest(&config).unwrap();
    assert_eq!(store.runs.len(), 3);

    assert_eq!(store.runs[0].failure_kind, Some(FailureKind::Hang));
    assert_eq!(store.runs[1].failure_kind, Some(FailureKind::Runtime));
    // a clean exit 0 with no table is an unknown outcome, not a failure
    assert!(!store.runs[2].failed);
    assert_eq!(store.runs[2].failure_kind, None);
    assert_eq!(store.runs[2].test_kind, None);
}

#[test]
fn test_curation_predicates_on_oom_transcripts() {
    let hard_oom = "\
ggml_vulkan: Device memory allocation of size 17243383808 failed\n\
ggml_vulkan: Requested buffer size exceeds device buffer size limit\n\
llama_model_load: failed to load model\n";
    assert!(is_non_transient_oom(hard_oom));
    assert!(!is_transient_failure(hard_oom));

    let transient = "main: failed to load model 'm.gguf'\n";
    assert!(!is_non_transient_oom(transient));
    assert!(is_transient_failure(transient));

    let healthy = bench_table("100.0 ± 1.0", "50.0 ± 1.0");
    assert!(!is_transient_failure(&healthy));
}

// ============================================================================
// Extraction Properties
// ============================================================================

#[test]
fn test_extraction_is_idempotent() {
    let text = bench_table("1043.48 ± 4.29", "26.38 ± 0.08");
    let identity = parse_stem("gemma-3-12b-it-Q8_0__rocm7_rc__fa1").unwrap();
    let first = extract_records(&text, &identity, "results/run.log");
    let second = extract_records(&text, &identity, "results/run.log");
    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
}

#[test]
fn test_dataset_json_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    write_log(
        dir.path(),
        "gemma-3-12b-it-Q8_0__rocm7_rc__fa1.log",
        &bench_table("1043.48 ± 4.29", "26.38 ± 0.08"),
    );
    write_log(dir.path(), "broken__vulkan.log", "main: error: exploded\n");

    let config = IngestConfig::new().with_source(IngestSource::local(dir.path()));
    let store = ingest(&config).unwrap();
    let json = store.to_json_pretty().unwrap();
    let back = RunStore::from_json(&json).unwrap();
    assert_eq!(store, back);
}

// ============================================================================
// Analyzers Over Ingested Data
// ============================================================================

/// Two-environment sweep used by the analyzer tests below.
fn sweep_store() -> RunStore {
    let dir = tempfile::tempdir().unwrap();
    write_log(
        dir.path(),
        "modelA__envX__fa1.log",
        &bench_table("100.0 ± 2.0", "50.0 ± 1.0"),
    );
    write_log(
        dir.path(),
        "modelA__envY__fa1.log",
        &bench_table("90.0 ± 1.0", "55.0 ± 2.0"),
    );
    let config = IngestConfig::new().with_source(IngestSource::local(dir.path()));
    ingest(&config).unwrap()
}

#[test]
fn test_placements_disjoint_intervals_split_ranks() {
    let store = sweep_store();
    let envs = environments(&["envX", "envY"]);

    // pp: [98, 102] vs [89, 91] - envX alone on top
    let pp = margin_aware_placements(&store.runs, &envs, TestKind::Prefill, FlagFilter::On);
    assert_eq!(pp.samples, 1);
    assert_eq!(pp.placements["envX"].first, 1);
    assert_eq!(pp.placements["envX"].second, 0);
    assert_eq!(pp.placements["envY"].first, 0);
    assert_eq!(pp.placements["envY"].second, 1);
    assert_eq!(pp.leaders(), vec!["envX"]);

    // tg: [49, 51] vs [53, 57] - order flips
    let tg = margin_aware_placements(&store.runs, &envs, TestKind::Generation, FlagFilter::On);
    assert_eq!(tg.placements["envY"].first, 1);
    assert_eq!(tg.placements["envX"].second, 1);
}

#[test]
fn test_placements_overlapping_intervals_share_first() {
    let dir = tempfile::tempdir().unwrap();
    write_log(
        dir.path(),
        "modelA__envX.log",
        &bench_table("100.0 ± 2.0", "50.0 ± 1.0"),
    );
    write_log(
        dir.path(),
        "modelA__envY.log",
        &bench_table("99.0 ± 2.0", "50.0 ± 1.0"),
    );
    let config = IngestConfig::new().with_source(IngestSource::local(dir.path()));
    let store = ingest(&config).unwrap();
    let envs = environments(&["envX", "envY"]);

    // [98, 102] and [97, 101] overlap, so both tie for first
    let table = margin_aware_placements(&store.runs, &envs, TestKind::Prefill, FlagFilter::Either);
    assert_eq!(table.placements["envX"].first, 1);
    assert_eq!(table.placements["envY"].first, 1);
    assert_eq!(table.placements["envX"].second, 0);
    assert_eq!(table.placements["envY"].second, 0);
}

#[test]
fn test_pairwise_wins_over_sweep() {
    let store = sweep_store();

    let pp = head_to_head(&store.runs, "envX", "envY", TestKind::Prefill, FlagFilter::On);
    assert_eq!(pp.wins_a, 1);
    assert_eq!(pp.wins_b, 0);
    assert_eq!(pp.ties, 0);
    assert_eq!(pp.total, 1);

    let tg = head_to_head(&store.runs, "envX", "envY", TestKind::Generation, FlagFilter::On);
    assert_eq!(tg.wins_a, 0);
    assert_eq!(tg.wins_b, 1);
}

#[test]
fn test_flag_effect_needs_both_states() {
    // the sweep has fused attention enabled everywhere, so no pairs form
    let store = sweep_store();
    let envs = environments(&["envX", "envY"]);
    let rows = flag_effect(
        &store.runs,
        &envs,
        &[TestKind::Prefill, TestKind::Generation],
    );
    assert!(rows.is_empty());
}

#[test]
fn test_flag_effect_paired_delta() {
    let dir = tempfile::tempdir().unwrap();
    write_log(
        dir.path(),
        "modelA__envX__fa1.log",
        &bench_table("110.0 ± 1.0", "55.0 ± 0.5"),
    );
    write_log(
        dir.path(),
        "modelA__envX.log",
        &bench_table("100.0 ± 1.0", "50.0 ± 0.5"),
    );
    let config = IngestConfig::new().with_source(IngestSource::local(dir.path()));
    let store = ingest(&config).unwrap();

    let rows = flag_effect(
        &store.runs,
        &environments(&["envX"]),
        &[TestKind::Prefill, TestKind::Generation],
    );
    assert_eq!(rows.len(), 2);

    let pp = &rows[0];
    assert_eq!(pp.environment, "envX");
    assert_eq!(pp.test, TestKind::Prefill);
    assert_eq!(pp.pairs, 1);
    assert!((pp.median_pct - 10.0).abs() < 1e-9);
    assert!((pp.min_pct - 10.0).abs() < 1e-9);
    assert!((pp.max_pct - 10.0).abs() < 1e-9);

    let tg = &rows[1];
    assert_eq!(tg.test, TestKind::Generation);
    assert!((tg.median_pct - 10.0).abs() < 1e-9);
}

#[test]
fn test_variant_effect_across_environment_pair() {
    let dir = tempfile::tempdir().unwrap();
    write_log(
        dir.path(),
        "modelA__rocm7-rocwmma__fa1.log",
        &bench_table("110.0 ± 1.0", "55.0 ± 0.5"),
    );
    write_log(
        dir.path(),
        "modelA__rocm7__fa1.log",
        &bench_table("100.0 ± 1.0", "50.0 ± 0.5"),
    );
    let config = IngestConfig::new().with_source(IngestSource::local(dir.path()));
    let store = ingest(&config).unwrap();

    let pairs = vec![VariantPair::new("rocWMMA", "rocm7-rocwmma", "rocm7")];
    let rows = variant_effect(&store.runs, &pairs, &[TestKind::Prefill]);
    assert_eq!(rows.len(), 1);

    let row = &rows[0];
    assert_eq!(row.label, "rocWMMA");
    assert_eq!(row.environment_on, "rocm7-rocwmma");
    assert_eq!(row.environment_off, "rocm7");
    assert_eq!(row.pairs, 1);
    assert!((row.median_pct - 10.0).abs() < 1e-6);
}

#[test]
fn test_tolerance_summary_full_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    write_log(
        dir.path(),
        "modelA__envX__fa1.log",
        &bench_table("100.0 ± 2.0", "50.0 ± 1.0"),
    );
    write_log(
        dir.path(),
        "modelA__envY__fa1.log",
        &bench_table("99.0 ± 1.0", "49.0 ± 1.0"),
    );
    write_log(
        dir.path(),
        "modelA__envZ__fa1.log",
        &bench_table("90.0 ± 1.0", "45.0 ± 1.0"),
    );
    let config = IngestConfig::new().with_source(IngestSource::local(dir.path()));
    let store = ingest(&config).unwrap();

    // bar = 100 - 1.0 * 2 = 98; envX and envY clear it, envZ does not
    let report = tolerance_summary(&store.runs, TestKind::Prefill, 1.0);
    assert_eq!(report.test, TestKind::Prefill);
    assert_eq!(report.models, 1);
    assert_eq!(report.cohorts.len(), 3);

    assert_eq!(report.cohorts[0].environment, "envX");
    assert_eq!(report.cohorts[0].wins, 1);
    assert_eq!(report.cohorts[1].environment, "envY");
    assert_eq!(report.cohorts[1].wins, 1);
    assert_eq!(report.cohorts[2].environment, "envZ");
    assert_eq!(report.cohorts[2].wins, 0);
    assert!((report.cohorts[2].mean_throughput - 90.0).abs() < 1e-9);
    assert!(report.cohorts.iter().all(|cohort| cohort.fused_attention));
    assert!(report.cohorts.iter().all(|cohort| cohort.samples == 1));
}

// ============================================================================
// CLI Handlers
// ============================================================================

#[test]
fn test_cli_handlers_drive_full_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let transcripts = dir.path().join("results");
    fs::create_dir(&transcripts).unwrap();
    write_log(
        &transcripts,
        "modelA__rocm7-rocwmma__fa1.log",
        &bench_table("110.0 ± 1.0", "55.0 ± 0.5"),
    );
    write_log(
        &transcripts,
        "modelA__rocm7__fa1.log",
        &bench_table("100.0 ± 1.0", "50.0 ± 0.5"),
    );
    write_log(
        &transcripts,
        "modelA__rocm7.log",
        &bench_table("95.0 ± 1.0", "48.0 ± 0.5"),
    );
    write_log(
        &transcripts,
        "broken__vulkan.log",
        "main: failed to load model 'broken.gguf'\n",
    );

    let data = dir.path().join("results.json");
    handle_scan(&[transcripts.clone()], &[], None, Some(&data)).unwrap();

    let store = RunStore::from_json(&fs::read_to_string(&data).unwrap()).unwrap();
    assert_eq!(store.runs.len(), 7);
    assert_eq!(
        store.meta.environments,
        vec!["rocm7", "rocm7-rocwmma", "vulkan"]
    );

    handle_placements(&data, &[], "pp", "on").unwrap();
    handle_pairwise(&data, "rocm7-rocwmma", "rocm7", "tg", "on").unwrap();
    handle_feature_effect(&data, &["rocm7".to_string()], &[]).unwrap();
    handle_variant_effect(&data, &["rocWMMA=rocm7-rocwmma:rocm7".to_string()], &[]).unwrap();
    handle_tolerance(&data, "pp", 1.0).unwrap();
    handle_curate(&[transcripts]).unwrap();
}

#[test]
fn test_cli_loadtime_summary() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("loadtime.log");
    fs::write(
        &log,
        "starting sweep\n\
         ✔ [rocm7] gemma-3-12b avg=12.34s over 3 runs\n\
         ✔ [vulkan] gemma-3-12b avg=9.87s over 3 runs\n\
         ✖ [rocm6_4_2] gemma-3-12b all runs failed\n",
    )
    .unwrap();

    handle_loadtime(&log).unwrap();
}
