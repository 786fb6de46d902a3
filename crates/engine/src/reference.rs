//! Reservation reference generation.

use chrono::{Local, NaiveDate};
use rand::Rng;

const SUFFIX_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const SUFFIX_LEN: usize = 4;

/// Produces candidate references of the form `RES-YYYYMMDD-XXXX`. The
/// ledger draws from this seam until it finds one no existing reservation
/// uses, so an implementation does not need to guarantee uniqueness.
pub trait ReferenceSource: Send + Sync {
    fn next_reference(&self) -> String;
}

pub fn format_reference(date: NaiveDate, suffix: &str) -> String {
    format!("RES-{}-{suffix}", date.format("%Y%m%d"))
}

/// Four random base-36 characters on the shop's local date.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomReferenceSource;

impl ReferenceSource for RandomReferenceSource {
    fn next_reference(&self) -> String {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
            .collect();

        format_reference(Local::now().date_naive(), &suffix)
    }
}

/// Always yields the same reference, so collision handling in the ledger
/// can be exercised deterministically.
#[cfg(test)]
pub(crate) struct StaticReferenceSource {
    reference: String,
}

#[cfg(test)]
impl StaticReferenceSource {
    pub(crate) fn new(reference: impl Into<String>) -> Self {
        Self { reference: reference.into() }
    }
}

#[cfg(test)]
impl ReferenceSource for StaticReferenceSource {
    fn next_reference(&self) -> String {
        self.reference.clone()
    }
}
