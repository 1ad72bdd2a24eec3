//! Pattern helpers for prompt detection.

use regex::bytes::{Match, Regex};

/// Find the first pattern (in priority order) that matches `data`.
///
/// Returns the index of the pattern together with the match.
pub fn first_match<'d>(patterns: &[&Regex], data: &'d [u8]) -> Option<(usize, Match<'d>)> {
    patterns
        .iter()
        .enumerate()
        .find_map(|(i, p)| p.find(data).map(|m| (i, m)))
}

/// The first of `markers` contained in `text`.
pub fn contains_any<'m>(markers: &'m [String], text: &str) -> Option<&'m str> {
    markers
        .iter()
        .find(|m| text.contains(m.as_str()))
        .map(String::as_str)
}
