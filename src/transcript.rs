//! Benchmark transcript decoding.
//!
//! A transcript is the captured stdout/stderr of one `llama-bench`
//! invocation. The interesting part is a markdown-style table plus a
//! build footer:
//!
//! ```text
//! | model           |     size | params | backend | ngl | fa | test  |           t/s |
//! | --------------- | -------: | -----: | ------- | --: | -: | ----- | ------------: |
//! | gemma3 12B Q8_0 | 11.12 GiB| 11.77 B| ROCm    |  99 |  1 | pp512 | 1043.48 ± 4.29|
//! | gemma3 12B Q8_0 | 11.12 GiB| 11.77 B| ROCm    |  99 |  1 | tg128 |   26.38 ± 0.08|
//!
//! build: cd6983d5 (6119)
//! ```
//!
//! Decoding is total: anything that does not parse degrades to a failure
//! or unknown-outcome record, never an error. Column layout is taken from
//! the header row, so tables with or without the `fa` column both decode.

use std::collections::BTreeMap;

use crate::naming::{extract_quantization, params_from_name, RunIdentity};
use crate::record::{BuildInfo, FailureKind, RunRecord, TestKind};

/// One table row, keyed by lower-cased header names.
pub type TableRow = BTreeMap<String, String>;

// ============================================================================
// Line Classification
// ============================================================================

/// Shape of a single transcript line, as seen by the table scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    /// Empty or whitespace-only.
    Blank,
    /// Pipe-delimited line whose first cell is `model`.
    Header,
    /// Pipe-delimited dash ruler under the header.
    Separator,
    /// Any other pipe-delimited line.
    Cells,
    /// Log noise that is not part of a table.
    Noise,
}

fn classify_line(line: &str) -> LineKind {
    if line.trim().is_empty() {
        return LineKind::Blank;
    }
    if !line.starts_with('|') {
        return LineKind::Noise;
    }
    if is_header_line(line) {
        return LineKind::Header;
    }
    if is_separator_line(line) {
        return LineKind::Separator;
    }
    LineKind::Cells
}

fn is_header_line(line: &str) -> bool {
    let Some(rest) = line.strip_prefix('|') else {
        return false;
    };
    let Some(end) = rest.find('|') else {
        return false;
    };
    rest[..end].trim().eq_ignore_ascii_case("model")
}

fn is_separator_line(line: &str) -> bool {
    match line.strip_prefix('|') {
        Some(rest) => rest.trim_start().starts_with('-'),
        None => false,
    }
}

/// Split a pipe-delimited line into trimmed cells.
///
/// Outer pipes are stripped first, so `| a | b |` and `a | b` both yield
/// two cells. Interior empty cells are preserved.
fn split_cells(line: &str) -> Vec<String> {
    line.trim()
        .trim_matches('|')
        .split('|')
        .map(|cell| cell.trim().to_string())
        .collect()
}

// ============================================================================
// Table Scanning
// ============================================================================

/// Scan the first benchmark table out of a transcript.
///
/// The scanner is a two-state machine: it seeks a header line, then
/// collects rows until the table block ends. While collecting:
///
/// - separator lines and interleaved log noise are skipped
/// - rows with fewer cells than the header are skipped
/// - a second header-shaped line is skipped (the first header wins)
/// - the first blank line after at least one accepted row ends the scan
#[must_use]
pub fn scan_table(text: &str) -> Vec<TableRow> {
    let mut names: Vec<String> = Vec::new();
    let mut collecting = false;
    let mut rows: Vec<TableRow> = Vec::new();

    for line in text.lines() {
        let kind = classify_line(line);
        if !collecting {
            if kind == LineKind::Header {
                names = split_cells(line)
                    .into_iter()
                    .map(|cell| cell.to_ascii_lowercase())
                    .collect();
                collecting = true;
            }
            continue;
        }
        match kind {
            LineKind::Blank => {
                if !rows.is_empty() {
                    break;
                }
            }
            LineKind::Cells => {
                let cells = split_cells(line);
                if cells.len() < names.len() {
                    log::debug!("skipping short table row: {line:?}");
                    continue;
                }
                let mut row = TableRow::new();
                for (idx, name) in names.iter().enumerate() {
                    row.insert(name.clone(), cells[idx].clone());
                }
                rows.push(row);
            }
            LineKind::Header | LineKind::Separator | LineKind::Noise => {}
        }
    }

    rows
}

// ============================================================================
// Cell Decoding
// ============================================================================

/// Decode a `t/s` cell of the form `<mean> ± <stderr>`.
///
/// Both numbers must parse; a cell where either side is malformed yields
/// nothing rather than a half-populated measurement.
#[must_use]
pub fn parse_throughput_cell(cell: &str) -> Option<(f64, f64)> {
    for (idx, sign) in cell.match_indices('±') {
        let left = trailing_number(&cell[..idx]);
        let right = leading_number(&cell[idx + sign.len()..]);
        if let (Some(mean), Some(stderr)) = (left, right) {
            if let (Ok(mean), Ok(stderr)) = (mean.parse::<f64>(), stderr.parse::<f64>()) {
                return Some((mean, stderr));
            }
        }
    }
    None
}

/// Longest `[0-9.]` run ending at the (whitespace-trimmed) end of `s`.
fn trailing_number(s: &str) -> Option<&str> {
    let trimmed = s.trim_end();
    let start = trimmed
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit() || *c == '.')
        .last()
        .map(|(idx, _)| idx)?;
    Some(&trimmed[start..])
}

/// Longest `[0-9.]` run starting at the (whitespace-trimmed) start of `s`.
fn leading_number(s: &str) -> Option<&str> {
    let trimmed = s.trim_start();
    let end = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    if end == 0 {
        None
    } else {
        Some(&trimmed[..end])
    }
}

/// Decode a `params` cell like `11.77 B` or `1,234 B` into billions.
#[must_use]
pub fn params_cell(cell: &str) -> Option<f64> {
    suffixed_number(cell, "b")
}

/// Decode a `size` cell like `11.12 GiB` into GiB.
#[must_use]
pub fn size_cell(cell: &str) -> Option<f64> {
    suffixed_number(cell, "gib")
}

/// First `[0-9.,]` run followed (after optional whitespace) by `suffix`,
/// matched case-insensitively. Commas are stripped before parsing.
fn suffixed_number(cell: &str, suffix: &str) -> Option<f64> {
    let bytes = cell.as_bytes();
    let mut pos = 0;
    while pos < bytes.len() {
        if is_number_byte(bytes[pos]) {
            let start = pos;
            let mut end = pos;
            while end < bytes.len() && is_number_byte(bytes[end]) {
                end += 1;
            }
            let mut after = end;
            while after < bytes.len() && bytes[after].is_ascii_whitespace() {
                after += 1;
            }
            if bytes.len() >= after + suffix.len()
                && bytes[after..after + suffix.len()].eq_ignore_ascii_case(suffix.as_bytes())
            {
                let digits: String = cell[start..end].chars().filter(|c| *c != ',').collect();
                return digits.parse().ok();
            }
            pos = end;
        }
        pos += 1;
    }
    None
}

fn is_number_byte(b: u8) -> bool {
    b.is_ascii_digit() || b == b'.' || b == b','
}

/// Parse an all-digits cell (`ngl`, `mmap` columns).
fn digits_field(cell: &str) -> Option<u32> {
    if cell.is_empty() || !cell.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    cell.parse().ok()
}

// ============================================================================
// Build Footer
// ============================================================================

/// Find the benchmark binary build fingerprint, e.g. `build: cd6983d5 (6119)`.
///
/// The hash needs at least seven hex digits. When a transcript carries
/// several build lines (reruns appended to the same file) the last one wins.
#[must_use]
pub fn scan_build(text: &str) -> Option<BuildInfo> {
    let mut found = None;
    for line in text.lines() {
        let mut from = 0;
        while let Some(rel) = find_ci(&line[from..], "build:") {
            let after = from + rel + "build:".len();
            if let Some(info) = build_at(&line[after..]) {
                found = Some(info);
            }
            from += rel + 1;
        }
    }
    found
}

fn build_at(s: &str) -> Option<BuildInfo> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    let hash_start = i;
    while i < bytes.len() && bytes[i].is_ascii_hexdigit() {
        i += 1;
    }
    if i - hash_start < 7 {
        return None;
    }
    let hash = &s[hash_start..i];
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if i >= bytes.len() || bytes[i] != b'(' {
        return None;
    }
    i += 1;
    let seq_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i == seq_start || i >= bytes.len() || bytes[i] != b')' {
        return None;
    }
    let sequence = s[seq_start..i].parse().ok()?;
    Some(BuildInfo {
        hash: hash.to_string(),
        sequence,
    })
}

// ============================================================================
// Failure Classification
// ============================================================================

/// Ordered failure rules; the first signal that fires decides the kind.
const FAILURE_RULES: &[(fn(&str) -> bool, FailureKind)] = &[
    (signals_load_failure, FailureKind::Load),
    (signals_hang, FailureKind::Hang),
    (signals_runtime_failure, FailureKind::Runtime),
];

/// Classify a transcript without usable measurements as a failure.
///
/// Load failures take precedence over hangs, hangs over generic runtime
/// errors, so a transcript that both failed to load and printed
/// `error:` classifies as a load failure.
#[must_use]
pub fn classify_failure(text: &str) -> Option<FailureKind> {
    FAILURE_RULES
        .iter()
        .find(|(signal, _)| signal(text))
        .map(|(_, kind)| *kind)
}

fn signals_load_failure(text: &str) -> bool {
    contains_ci(text, "failed to load model")
        || device_allocation_failed(text)
        || marker_then_word(text, "⚠️", "fail")
}

fn signals_hang(text: &str) -> bool {
    contains_ci(text, "gpu hang") || contains_ci(text, "hw exception")
}

fn signals_runtime_failure(text: &str) -> bool {
    contains_ci(text, "error:")
        || mentions_nonzero_exit(text)
        || contains_ci(text, "runtime error")
}

/// `Device memory allocation ... failed` on a single line.
fn device_allocation_failed(text: &str) -> bool {
    text.lines().any(|line| {
        find_ci(line, "device memory allocation")
            .map(|pos| find_ci(&line[pos..], "failed").is_some())
            .unwrap_or(false)
    })
}

/// `exit <N>` with N > 0. A clean `exit 0` is not a failure signal.
fn mentions_nonzero_exit(text: &str) -> bool {
    let bytes = text.as_bytes();
    let mut from = 0;
    while let Some(rel) = find_ci(&text[from..], "exit ") {
        let digit_start = from + rel + "exit ".len();
        let mut i = digit_start;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i > digit_start && text[digit_start..i].bytes().any(|b| b != b'0') {
            return true;
        }
        from += rel + 1;
    }
    false
}

/// `marker`, optional whitespace, then `word` (word matched case-insensitively).
fn marker_then_word(text: &str, marker: &str, word: &str) -> bool {
    let bytes = text.as_bytes();
    let mut from = 0;
    while let Some(rel) = text[from..].find(marker) {
        let mut idx = from + rel + marker.len();
        while idx < bytes.len() && bytes[idx].is_ascii_whitespace() {
            idx += 1;
        }
        if bytes.len() >= idx + word.len()
            && bytes[idx..idx + word.len()].eq_ignore_ascii_case(word.as_bytes())
        {
            return true;
        }
        from += rel + marker.len();
    }
    false
}

fn contains_ci(text: &str, needle: &str) -> bool {
    find_ci(text, needle).is_some()
}

fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    let h = haystack.as_bytes();
    let n = needle.as_bytes();
    if n.is_empty() || h.len() < n.len() {
        return None;
    }
    (0..=h.len() - n.len()).find(|&i| h[i..i + n.len()].eq_ignore_ascii_case(n))
}

// ============================================================================
// Curation Predicates
// ============================================================================

/// True when the transcript ran out of device memory in a way that will
/// recur on retry (the requested buffer exceeds the device limit).
#[must_use]
pub fn is_non_transient_oom(text: &str) -> bool {
    text.contains("ggml_vulkan: Device memory allocation of size")
        && text.contains("Requested buffer size exceeds device buffer size limit")
}

/// True when the transcript has no measurable rows and classifies as failed.
#[must_use]
pub fn is_failed_run(text: &str) -> bool {
    let rows = scan_table(text);
    let measured = rows
        .iter()
        .any(|row| row.get("test").and_then(|cell| TestKind::classify(cell)).is_some());
    !measured && classify_failure(text).is_some()
}

/// True for failed runs worth re-running: everything except a
/// non-transient out-of-memory failure.
#[must_use]
pub fn is_transient_failure(text: &str) -> bool {
    is_failed_run(text) && !is_non_transient_oom(text)
}

// ============================================================================
// Record Extraction
// ============================================================================

/// Extract run records from one transcript.
///
/// Every accepted table row with a recognized test kind and a decodable
/// throughput cell yields one measurement record. A transcript with no
/// measurable rows yields exactly one record: a failure record when the
/// failure rules fire, otherwise an unknown-outcome record, so every
/// readable transcript stays visible in the dataset.
///
/// When the table carries an `fa` column, its first row overrides the
/// filename's fused-attention token.
#[must_use]
pub fn extract_records(text: &str, identity: &RunIdentity, source_path: &str) -> Vec<RunRecord> {
    let rows = scan_table(text);
    let build = scan_build(text);

    let has_measured_kind = rows
        .iter()
        .any(|row| row.get("test").and_then(|cell| TestKind::classify(cell)).is_some());
    let failure = if has_measured_kind {
        None
    } else {
        classify_failure(text)
    };

    let fused_attention = table_flag_override(&rows).unwrap_or(identity.fused_attention);
    let quantization = extract_quantization(&identity.model_clean);
    let name_params = params_from_name(&identity.model_clean);

    let template = RunRecord {
        model_raw: identity.model_raw.clone(),
        model_clean: identity.model_clean.clone(),
        environment: identity.environment.clone(),
        environment_base: identity.environment_base.clone(),
        environment_variant: identity.environment_variant.clone(),
        fused_attention,
        context_tag: identity.context_tag.clone(),
        context_tokens: identity.context_tokens,
        test_kind: None,
        throughput_mean: None,
        throughput_stderr: None,
        failed: false,
        failure_kind: None,
        quantization,
        param_count_billion: name_params,
        file_size_gib: None,
        backend: None,
        gpu_layers: None,
        mmap: None,
        source_path: source_path.to_string(),
        is_distributed: identity.distributed,
        build,
    };

    let mut records = Vec::new();
    for row in &rows {
        let Some(kind) = row.get("test").and_then(|cell| TestKind::classify(cell)) else {
            continue;
        };
        let Some((mean, stderr)) = row.get("t/s").and_then(|cell| parse_throughput_cell(cell))
        else {
            log::debug!("no throughput in {} row of {source_path}", kind.as_str());
            continue;
        };
        let mut record = template.clone();
        record.test_kind = Some(kind);
        record.throughput_mean = Some(mean);
        record.throughput_stderr = Some(stderr);
        record.param_count_billion = row
            .get("params")
            .and_then(|cell| params_cell(cell))
            .or(name_params);
        record.file_size_gib = row.get("size").and_then(|cell| size_cell(cell));
        record.backend = row.get("backend").cloned();
        record.gpu_layers = row.get("ngl").and_then(|cell| digits_field(cell));
        record.mmap = row.get("mmap").and_then(|cell| digits_field(cell));
        records.push(record);
    }

    if records.is_empty() {
        let mut record = template;
        if let Some(kind) = failure {
            record.failed = true;
            record.failure_kind = Some(kind);
        }
        records.push(record);
    }

    records
}

/// First row of the `fa` column, parsed as an integer flag.
fn table_flag_override(rows: &[TableRow]) -> Option<bool> {
    let first = rows.iter().find(|row| row.contains_key("fa"))?;
    first.get("fa")?.parse::<i64>().ok().map(|value| value == 1)
}
