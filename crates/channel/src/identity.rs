//! Sender identity normalization and admission.

use std::collections::HashSet;

/// Reduces a raw transport sender id to the bare number the rest of the
/// system keys on: everything from the first `@` is dropped, then the
/// country prefix is stripped once, and only from the front. A prefix
/// sequence appearing later in the number is part of the number.
pub fn normalize_sender(raw: &str, country_prefix: &str) -> String {
    let bare = raw.split('@').next().unwrap_or(raw).trim();
    if country_prefix.is_empty() {
        return bare.to_string();
    }
    match bare.strip_prefix(country_prefix) {
        Some(rest) => rest.to_string(),
        None => bare.to_string(),
    }
}

/// Closed set of senders the channel will talk to. The list is the only
/// admission control on the channel, so an empty list admits nobody.
#[derive(Clone, Debug, Default)]
pub struct SenderAllowList {
    senders: HashSet<String>,
}

impl SenderAllowList {
    pub fn new<I, S>(senders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            senders: senders
                .into_iter()
                .map(|sender| sender.into().trim().to_string())
                .filter(|sender| !sender.is_empty())
                .collect(),
        }
    }

    pub fn permits(&self, identity: &str) -> bool {
        self.senders.contains(identity)
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_drops_the_transport_suffix_and_the_country_prefix() {
        assert_eq!(normalize_sender("5491144445555@c.us", "549"), "1144445555");
        assert_eq!(normalize_sender("5491144445555", "549"), "1144445555");
    }

    #[test]
    fn the_prefix_is_stripped_once_and_only_from_the_front() {
        // A number that begins with the prefix twice loses exactly one.
        assert_eq!(normalize_sender("5495491111@c.us", "549"), "5491111");
        // An inner occurrence is part of the number.
        assert_eq!(normalize_sender("1154911111@c.us", "549"), "1154911111");
    }

    #[test]
    fn an_empty_prefix_leaves_the_number_alone() {
        assert_eq!(normalize_sender("5491144445555@c.us", ""), "5491144445555");
    }

    #[test]
    fn the_allow_list_is_exact_and_closed_by_default() {
        let list = SenderAllowList::new(["1144445555", " 1166667777 "]);
        assert!(list.permits("1144445555"));
        assert!(list.permits("1166667777"));
        assert!(!list.permits("1199998888"));
        assert!(!list.permits("144445555"));

        assert!(!SenderAllowList::default().permits("1144445555"));
    }
}
