//! Deterministic traffic bucketing.
//!
//! A user's bucketing id concatenated with an entity-specific key is hashed
//! with MurmurHash3 (x86, 32-bit, seed 1) and scaled into `[0, 10000)`. The
//! same inputs always land in the same bucket, across processes and
//! releases.
use std::io::Cursor;

use crate::project_config::TrafficRange;

const HASH_SEED: u32 = 1;

/// Number of buckets traffic is divided into.
pub const MAX_BUCKET: u32 = 10_000;

/// The bucket for the given combined key, in `[0, MAX_BUCKET)`.
pub fn bucket_value(bucketing_key: &str) -> u32 {
    let hash = murmur3::murmur3_32(&mut Cursor::new(bucketing_key.as_bytes()), HASH_SEED)
        .expect("reading from an in-memory cursor cannot fail");
    let ratio = f64::from(hash) / (f64::from(u32::MAX) + 1.0);
    (ratio * f64::from(MAX_BUCKET)) as u32
}

/// Walk cumulative ranges and return the entity owning the bucket.
///
/// Returns `None` when the bucket falls past every range, or when the owning
/// entry has an empty entity id (a slice of traffic deliberately left
/// unallocated).
pub fn find_bucket<'a>(
    bucketing_id: &str,
    entity_key: &str,
    ranges: &'a [TrafficRange],
) -> Option<&'a str> {
    let key = format!("{bucketing_id}{entity_key}");
    let bucket = bucket_value(&key);
    log::trace!(target: "flagship",
                bucketing_key = key.as_str(),
                bucket;
                "assigned bucket");
    entity_for_bucket(bucket, ranges)
}

fn entity_for_bucket<'a>(bucket: u32, ranges: &'a [TrafficRange]) -> Option<&'a str> {
    let range = ranges.iter().find(|r| bucket < r.end_of_range)?;
    if range.entity_id.is_empty() {
        None
    } else {
        Some(&range.entity_id)
    }
}
