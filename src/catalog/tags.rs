//! Column tags and deterministic tag generation.
//!
//! A tag is a column's durable identity. New columns get a tag derived from
//! the table name, the kinds of the columns already in the table, and the new
//! column's name and kind, so two writers adding the same column to the same
//! table independently end up with the same tag.

use std::collections::BTreeSet;

use sha2::{Digest, Sha256};

use super::types::ColumnKind;

/// Durable column identity.
pub type Tag = u64;

/// Tags at or above this value are reserved for system tables.
pub const RESERVED_TAG_MIN: Tag = 1 << 50;

/// generated tags start out below this bound; it grows with the number of tags in use
const INITIAL_TAG_RANGE: Tag = 128 * 128;

/// Generate a tag for a new column.
///
/// The result is never in `existing` and always below [`RESERVED_TAG_MIN`].
/// Callers generating several tags in one pass must add each result to
/// `existing` (and its kind to `existing_kinds`) before the next call.
pub fn auto_generate_tag(
    existing: &BTreeSet<Tag>,
    table: &str,
    existing_kinds: &[ColumnKind],
    name: &str,
    kind: ColumnKind,
) -> Tag {
    let range = tag_range(existing.len());

    let mut seed = Sha256::new();
    seed.update((table.len() as u64).to_be_bytes());
    seed.update(table.as_bytes());
    for existing_kind in existing_kinds {
        seed.update([existing_kind.code()]);
    }
    seed.update((name.len() as u64).to_be_bytes());
    seed.update(name.as_bytes());
    seed.update([kind.code()]);
    let seed = seed.finalize();

    let mut attempt: u64 = 0;
    loop {
        let mut hasher = Sha256::new();
        hasher.update(seed);
        hasher.update(attempt.to_be_bytes());
        let digest = hasher.finalize();

        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let tag = u64::from_be_bytes(head) % range;

        if !existing.contains(&tag) {
            return tag;
        }
        attempt += 1;
    }
}

/// keep the range at least twice the number of tags in use
fn tag_range(in_use: usize) -> Tag {
    let mut range = INITIAL_TAG_RANGE;
    while range / 2 < in_use as Tag && range < RESERVED_TAG_MIN {
        range = range.saturating_mul(128).min(RESERVED_TAG_MIN);
    }
    range
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_is_deterministic() {
        let existing = BTreeSet::new();
        let a = auto_generate_tag(&existing, "people", &[ColumnKind::Int], "name", ColumnKind::Text);
        let b = auto_generate_tag(&existing, "people", &[ColumnKind::Int], "name", ColumnKind::Text);
        assert_eq!(a, b);
        assert!(a < INITIAL_TAG_RANGE);
    }

    #[test]
    fn test_inputs_change_the_tag() {
        let existing = BTreeSet::new();
        let base = auto_generate_tag(&existing, "people", &[], "name", ColumnKind::Text);
        let other_table = auto_generate_tag(&existing, "places", &[], "name", ColumnKind::Text);
        let other_kind = auto_generate_tag(&existing, "people", &[], "name", ColumnKind::Int);
        assert!(base != other_table || base != other_kind);
    }

    #[test]
    fn test_avoids_existing_tags() {
        let mut existing = BTreeSet::new();
        let first = auto_generate_tag(&existing, "t", &[], "c", ColumnKind::Int);
        existing.insert(first);

        let second = auto_generate_tag(&existing, "t", &[], "c", ColumnKind::Int);
        assert_ne!(first, second);
        assert!(!existing.contains(&second));
    }

    #[test]
    fn test_range_grows_with_usage() {
        assert_eq!(tag_range(0), INITIAL_TAG_RANGE);
        assert_eq!(tag_range(8192), INITIAL_TAG_RANGE);
        assert_eq!(tag_range(8193), INITIAL_TAG_RANGE * 128);
        assert!(tag_range(usize::MAX) <= RESERVED_TAG_MIN);
    }
}
