//! Shared text normalization and comparison utilities

/// Normalize a name for fuzzy matching.
/// Removes separators and extra whitespace, converts to lowercase.
pub fn normalize_for_matching(name: &str) -> String {
    name.to_lowercase()
        .replace(['.', '-', '_', '\'', '\u{2019}', ':', ',', '!', '?'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Calculate similarity between two strings (0.0 to 1.0).
///
/// Blends Jaro-Winkler (rewards shared prefixes, good for short titles) with
/// normalized Levenshtein (penalizes length differences).
pub fn string_similarity(s1: &str, s2: &str) -> f64 {
    let jw = strsim::jaro_winkler(s1, s2);
    let lev = strsim::normalized_levenshtein(s1, s2);
    0.6 * jw + 0.4 * lev
}

/// Similarity between two titles after normalizing both
pub fn title_similarity(a: &str, b: &str) -> f64 {
    string_similarity(&normalize_for_matching(a), &normalize_for_matching(b))
}
