//! Suggestion utilities for helpful error messages.
//!
//! Provides Levenshtein distance calculation for suggesting corrections
//! when users mistype listener attribute names.

/// Calculate the Levenshtein distance between two strings.
///
/// This is the minimum number of single-character edits (insertions,
/// deletions, or substitutions) required to change one string into the other.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    // Two rolling rows instead of the full matrix
    let mut previous: Vec<usize> = (0..=b_chars.len()).collect();
    let mut current = vec![0usize; b_chars.len() + 1];

    for (i, a_char) in a_chars.iter().enumerate() {
        current[0] = i + 1;
        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = usize::from(a_char != b_char);
            current[j + 1] = (previous[j + 1] + 1) // deletion
                .min(current[j] + 1) // insertion
                .min(previous[j] + cost); // substitution
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b_chars.len()]
}

/// Find the closest name from `valid`, compared case-insensitively.
///
/// Returns `Some(suggestion)` if a close match is found (distance <= 3),
/// `None` otherwise.
pub fn find_closest(unknown: &str, valid: &[&str]) -> Option<String> {
    let unknown = unknown.to_ascii_lowercase();
    valid
        .iter()
        .map(|&name| (name, levenshtein_distance(&unknown, &name.to_ascii_lowercase())))
        .filter(|(_, d)| *d <= 3)
        .min_by_key(|(_, d)| *d)
        .map(|(name, _)| name.to_string())
}

/// Format an error for a listener attribute naming an unknown event.
pub fn format_unknown_listener_error(tag: &str, prop: &str, valid: &[&str]) -> String {
    let mut msg = format!("unknown listener `{prop}` on `{tag}`");

    if let Some(suggestion) = find_closest(prop, valid) {
        msg.push_str(&format!("\n\nDid you mean `{suggestion}`?"));
    }
    msg.push_str("\n\nUse a `\"data-on<event>\"` attribute to listen for custom events.");

    msg
}

/// Format an error for a lowercase listener name that would be set as a
/// plain attribute.
pub fn format_lowercase_listener_error(prop: &str, suggestion: &str) -> String {
    format!("`{prop}` is a plain attribute, not a listener\n\nDid you mean `{suggestion}`?")
}

/// Format an error for an attribute one edit away from a reserved one.
pub fn format_reserved_typo_error(tag: &str, prop: &str, reserved: &str) -> String {
    format!("unknown attribute `{prop}` on `{tag}`\n\nDid you mean `{reserved}`?")
}

/// Format an error for children given to a void element.
pub fn format_void_children_error(tag: &str) -> String {
    format!("`{tag}` is a void element and cannot have children")
}

/// Format an error for an attribute given twice.
pub fn format_duplicate_prop_error(tag: &str, prop: &str) -> String {
    format!("attribute `{prop}` is given more than once on `{tag}`")
}
