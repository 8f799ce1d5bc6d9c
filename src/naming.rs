//! Filename and model-name conventions.
//!
//! Transcript filenames encode run identity as `__`-delimited fields:
//!
//! ```text
//! <model>__<environment>[__fa1][__hblt0][__longctx<N>][__rpc]
//! ```
//!
//! This module decodes that convention into a [`RunIdentity`], applies
//! legacy environment aliases, strips multi-file shard suffixes from
//! model names, and pulls quantization / parameter-count hints out of
//! model names.

// ============================================================================
// Run Identity
// ============================================================================

/// Identity fields decoded from a transcript filename stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunIdentity {
    /// Model field exactly as written.
    pub model_raw: String,
    /// Model field with shard suffixes removed.
    pub model_clean: String,
    /// Canonical environment name.
    pub environment: String,
    /// Environment up to the first hyphen.
    pub environment_base: String,
    /// Environment remainder after the first hyphen, if any.
    pub environment_variant: Option<String>,
    /// True when an `fa1` token was present.
    pub fused_attention: bool,
    /// Context label, `default` unless a `longctx*` token was present.
    pub context_tag: String,
    /// Context length parsed out of the `longctx*` token.
    pub context_tokens: Option<u64>,
    /// True when an `rpc` token was present.
    pub distributed: bool,
}

/// Legacy environment spellings and their canonical names.
///
/// Applied to the environment field after flag tokens have been folded
/// in: an exact match is replaced outright, and a `<legacy>-` prefix is
/// replaced while keeping the suffix.
const ENV_ALIASES: &[(&str, &str)] = &[
    ("rocm7_1", "rocm7.1"),
    ("rocm7_alpha", "rocm-7alpha"),
];

/// Decode a filename stem into a [`RunIdentity`].
///
/// Returns `None` when the stem has no `__` separator or the environment
/// field comes out empty; such transcripts carry no usable identity.
///
/// Flag tokens are lower-cased before matching. `fa1` enables fused
/// attention, `hblt0` is folded into the environment name, `longctx<N>`
/// sets the context tag and token count, `rpc` marks a distributed run,
/// and unrecognized tokens are ignored.
#[must_use]
pub fn parse_stem(stem: &str) -> Option<RunIdentity> {
    let parts: Vec<&str> = stem.split("__").collect();
    if parts.len() < 2 {
        return None;
    }

    let model_raw = parts[0];
    let mut environment = parts[1].to_string();
    let mut fused_attention = false;
    let mut context_tag = String::from("default");
    let mut context_tokens = None;
    let mut distributed = false;

    for raw_token in &parts[2..] {
        let token = raw_token.to_lowercase();
        match token.as_str() {
            "fa1" => fused_attention = true,
            "hblt0" => environment = format!("{environment}-hblt0"),
            "rpc" => distributed = true,
            _ if token.starts_with("longctx") => {
                context_tokens = longctx_tokens(&token);
                context_tag = token;
            }
            _ => {}
        }
    }

    let environment = canonical_environment(&environment);
    if environment.is_empty() {
        return None;
    }

    let (base, variant) = split_base_variant(&environment);
    let environment_base = base.to_string();
    let environment_variant = variant.map(str::to_string);

    Some(RunIdentity {
        model_raw: model_raw.to_string(),
        model_clean: clean_model_name(model_raw),
        environment,
        environment_base,
        environment_variant,
        fused_attention,
        context_tag,
        context_tokens,
        distributed,
    })
}

fn longctx_tokens(token: &str) -> Option<u64> {
    let rest = token.strip_prefix("longctx")?;
    let digits: &str = {
        let end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        &rest[..end]
    };
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

// ============================================================================
// Environment Names
// ============================================================================

/// Replace legacy environment spellings with their canonical names.
#[must_use]
pub fn canonical_environment(environment: &str) -> String {
    for (legacy, canon) in ENV_ALIASES {
        if environment == *legacy {
            return (*canon).to_string();
        }
        if let Some(rest) = environment.strip_prefix(legacy) {
            if let Some(suffix) = rest.strip_prefix('-') {
                return format!("{canon}-{suffix}");
            }
        }
    }
    environment.to_string()
}

/// Split a canonical environment into base and variant at the first hyphen.
///
/// `rocm6_4_2-rocwmma` becomes `("rocm6_4_2", Some("rocwmma"))`; a name
/// without a hyphen has no variant.
#[must_use]
pub fn split_base_variant(environment: &str) -> (&str, Option<&str>) {
    match environment.split_once('-') {
        Some((base, variant)) => (base, Some(variant)),
        None => (environment, None),
    }
}

// ============================================================================
// Model Names
// ============================================================================

/// Remove every shard suffix (`-00001-of-00003` style) from a model name.
#[must_use]
pub fn clean_model_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while !rest.is_empty() {
        if let Some(len) = shard_suffix_len(rest) {
            rest = &rest[len..];
            continue;
        }
        let mut chars = rest.chars();
        if let Some(ch) = chars.next() {
            out.push(ch);
            rest = chars.as_str();
        }
    }
    out
}

/// Length in bytes of a shard suffix at the start of `s`, if one is there.
///
/// The shape is `-000<digits>-of-000<digits>` with a case-insensitive `of`.
fn shard_suffix_len(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    if !bytes.starts_with(b"-000") {
        return None;
    }
    let mut i = 4;
    let first_digits = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i == first_digits {
        return None;
    }
    if bytes.len() < i + 7 {
        return None;
    }
    if !bytes[i..i + 4].eq_ignore_ascii_case(b"-of-") {
        return None;
    }
    if &bytes[i + 4..i + 7] != b"000" {
        return None;
    }
    let mut j = i + 7;
    let second_digits = j;
    while j < bytes.len() && bytes[j].is_ascii_digit() {
        j += 1;
    }
    if j == second_digits {
        return None;
    }
    Some(j)
}

/// Extract a quantization label from a model name.
///
/// The leftmost occurrence of `Q<digits>_<alnum>`, `BF16`, `F16`, `F32`,
/// or `mxfp<digits>` wins (matched case-insensitively), and the result is
/// upper-cased. `UD-Q4_K_XL` therefore yields `Q4_K_XL`.
#[must_use]
pub fn extract_quantization(name: &str) -> Option<String> {
    for (pos, _) in name.char_indices() {
        if let Some(label) = quantization_at(&name[pos..]) {
            return Some(label);
        }
    }
    None
}

fn quantization_at(s: &str) -> Option<String> {
    let bytes = s.as_bytes();

    // Q<digits>_<alnum/underscore>+
    if bytes.len() >= 4 && bytes[0].eq_ignore_ascii_case(&b'q') && bytes[1].is_ascii_digit() {
        let mut i = 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i < bytes.len() && bytes[i] == b'_' {
            let tail_start = i + 1;
            let mut j = tail_start;
            while j < bytes.len() && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_') {
                j += 1;
            }
            if j > tail_start {
                return Some(s[..j].to_ascii_uppercase());
            }
        }
    }

    for literal in ["BF16", "F16", "F32"] {
        if bytes.len() >= literal.len()
            && bytes[..literal.len()].eq_ignore_ascii_case(literal.as_bytes())
        {
            return Some(literal.to_string());
        }
    }

    // mxfp<digits>
    if bytes.len() >= 5 && bytes[..4].eq_ignore_ascii_case(b"mxfp") {
        let mut j = 4;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > 4 {
            return Some(s[..j].to_ascii_uppercase());
        }
    }

    None
}

/// Parse a parameter count from a model name, e.g. `30B` or `0.6B`.
///
/// The `B` is matched case-sensitively so quantization tails like `q4_0b`
/// do not produce phantom counts.
#[must_use]
pub fn params_from_name(name: &str) -> Option<f64> {
    let bytes = name.as_bytes();
    let mut pos = 0;
    while pos < bytes.len() {
        if bytes[pos].is_ascii_digit() {
            let start = pos;
            let mut end = pos;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
            if end + 1 < bytes.len() && bytes[end] == b'.' && bytes[end + 1].is_ascii_digit() {
                end += 1;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
            }
            if end < bytes.len() && bytes[end] == b'B' {
                return name[start..end].parse().ok();
            }
            pos = end;
        }
        pos += 1;
    }
    None
}
