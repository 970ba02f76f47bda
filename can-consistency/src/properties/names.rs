//! Property name extraction from free text (bug comments)

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static ASCII_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z0-9_]+").unwrap());

static PROPERTY_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z](?:[A-Z]*_[A-Z0-9]+)+[A-Z]*$").unwrap());

/// Extract VHAL property names mentioned in a text
///
/// A property name is upper-case letters, digits and underscores, contains at
/// least one underscore and never two digits in a row (which rules out dates
/// and ids such as `LOG_2025_12`). Results keep first-seen order without
/// duplicates.
pub fn extract_property_names(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    // Tokens are split on any non-ASCII character, so names glued to CJK text still count
    ASCII_TOKEN
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(|token| PROPERTY_SHAPE.is_match(token))
        .filter(|name| !has_consecutive_digits(name))
        .filter(|name| seen.insert(*name))
        .map(str::to_string)
        .collect()
}

fn has_consecutive_digits(name: &str) -> bool {
    name.as_bytes()
        .windows(2)
        .any(|w| w[0].is_ascii_digit() && w[1].is_ascii_digit())
}
