//! Slug allocator.
//!
//! # Responsibility
//! - Derive URL-safe, lowercase, hyphen-separated slugs from post titles.
//! - Compute the next disambiguated slug after a collision.
//!
//! # Invariants
//! - Both functions are pure and deterministic.
//! - Output only contains `[a-z0-9-]`, never starts/ends with `-` and never
//!   contains `--`.

use deunicode::deunicode;
use once_cell::sync::Lazy;
use regex::Regex;

/// Returned when a title has no alphanumeric content left after
/// normalization.
pub const PLACEHOLDER_SLUG: &str = "post";

static NON_SLUG_RUN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("valid slug separator regex"));

/// Derives the base slug for a title.
///
/// Rules:
/// - `@` is spelled out as the word `at`.
/// - Non-Latin scripts are transliterated to ASCII.
/// - Runs of non-alphanumeric characters collapse into one hyphen.
/// - Leading and trailing hyphens are trimmed.
pub fn derive_slug(title: &str) -> String {
    let spelled = title.replace('@', " at ");
    let ascii = deunicode(&spelled).to_lowercase();
    let hyphenated = NON_SLUG_RUN_RE.replace_all(&ascii, "-");
    let trimmed = hyphenated.trim_matches('-');

    if trimmed.is_empty() {
        PLACEHOLDER_SLUG.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Computes the successor of a slug that is already taken.
///
/// `base-<n>` becomes `base-<n+1>`; anything else gets `-1` appended.
pub fn next_slug(previous: &str) -> String {
    if let Some((base, suffix)) = previous.rsplit_once('-') {
        if !base.is_empty() && !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) {
            if let Some(next) = suffix.parse::<u64>().ok().and_then(|n| n.checked_add(1)) {
                return format!("{base}-{next}");
            }
        }
    }

    format!("{previous}-1")
}

/// Returns whether a value is a well-formed slug.
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && !slug.contains("--")
        && slug
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}
