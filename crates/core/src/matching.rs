//! The matching policies every lookup in the system shares.
//!
//! Phone matching is deliberately loose: a stored number matches when it
//! merely *contains* the queried fragment, because some sheet rows carry a
//! country prefix and some do not, while channel identities always arrive
//! prefix-stripped. Both identity resolution and cancellation authorization
//! rely on this; tightening it to equality silently breaks existing data.

/// True when the stored phone value contains `fragment` anywhere.
pub fn phone_matches(stored: &str, fragment: &str) -> bool {
    contains_ci(stored, fragment)
}

/// Case-insensitive substring match.
pub fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Case-insensitive equality.
pub fn eq_ci(left: &str, right: &str) -> bool {
    left.to_lowercase() == right.to_lowercase()
}

/// Splits a free-text product query into a name and an implicit size taken
/// from the trailing whitespace-separated token: `"Bota Texana 38"` becomes
/// `("Bota Texana", Some("38"))`. This is a heuristic, not a tokenizer; a
/// single-word query carries no size.
pub fn split_trailing_size(query: &str) -> (String, Option<String>) {
    let trimmed = query.trim();
    match trimmed.rsplit_once(char::is_whitespace) {
        Some((name, size)) if !name.trim().is_empty() && !size.is_empty() => {
            (name.trim_end().to_string(), Some(size.to_string()))
        }
        _ => (trimmed.to_string(), None),
    }
}
