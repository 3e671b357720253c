//! Content fingerprints for message sets.
//!
//! A fingerprint is a BLAKE3 hash of the sorted dedup keys of a message set.
//! Because messages are immutable once observed, two sets with equal
//! fingerprints produce identical derived views, so a caller can compare the
//! fingerprint against the one its last snapshot was computed from and skip
//! the recompute.

use crate::model::Message;

/// Fingerprint of a message set, independent of input order.
#[must_use]
pub fn fingerprint<'a, I>(messages: I) -> String
where
    I: IntoIterator<Item = &'a Message>,
{
    let mut keys: Vec<(&str, &str, &str)> = messages
        .into_iter()
        .map(|m| (m.id.as_str(), m.from.as_str(), m.to.as_str()))
        .collect();
    keys.sort_unstable();

    let mut hasher = blake3::Hasher::new();
    for (id, from, to) in keys {
        hasher.update(id.as_bytes());
        hasher.update(b"\x00");
        hasher.update(from.as_bytes());
        hasher.update(b"\x00");
        hasher.update(to.as_bytes());
        hasher.update(b"\x00");
    }
    format!("blake3:{}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn msg(id: &str, to: &str) -> Message {
        let t = Utc.timestamp_opt(1_700_000_000, 0).single().expect("valid ts");
        Message::new(id, "a", to, t, "")
    }

    #[test]
    fn order_does_not_matter() {
        let a = [msg("1", "t"), msg("2", "t")];
        let b = [msg("2", "t"), msg("1", "t")];
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn target_is_part_of_identity() {
        assert_ne!(fingerprint(&[msg("1", "t")]), fingerprint(&[msg("1", "u")]));
    }
}
