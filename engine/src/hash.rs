use std::hash::BuildHasher;

use once_cell::sync::Lazy;

/// Number of high hash bits used to select a shard.
pub const SHARD_BITS: u32 = 8;

/// Number of shards in a [`ShardedTable`](crate::ShardedTable).
pub const NUM_SHARDS: usize = 1 << SHARD_BITS;

// Fixed seeds keep hashes stable for the whole process, across every table
// instance, so a key always lands in the same shard.
static KEY_HASHER: Lazy<ahash::RandomState> = Lazy::new(|| {
  ahash::RandomState::with_seeds(
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
  )
});

/// Murmur3 64-bit finalizer.
#[inline]
fn fmix64(mut hash: u64) -> u64 {
  hash ^= hash >> 33;
  hash = hash.wrapping_mul(0xff51_afd7_ed55_8ccd);
  hash ^= hash >> 33;
  hash = hash.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
  hash ^= hash >> 33;
  hash
}

/// Hashes the entire key text into a capacity-independent 64-bit value.
///
/// Callers must reject empty keys before hashing; tables treat them as no-ops.
#[inline]
pub fn hash_key(key: &str) -> u64 {
  fmix64(KEY_HASHER.hash_one(key.as_bytes()))
}

/// Returns the shard selected by the top [`SHARD_BITS`] of a hash.
#[inline]
pub(crate) fn shard_index(hash: u64) -> usize {
  (hash >> (u64::BITS - SHARD_BITS)) as usize
}

/// Maps a hash onto one of `buckets` buckets using its high bits.
///
/// Uniform for any bucket count; with [`NUM_SHARDS`] buckets it selects the
/// same bucket as the shard index.
#[inline]
pub(crate) fn bucket_index(hash: u64, buckets: usize) -> usize {
  ((u128::from(hash) * buckets as u128) >> u64::BITS) as usize
}

/// Returns the shard a key belongs to in a [`ShardedTable`](crate::ShardedTable).
///
/// This is a pure function of the key: it does not depend on table size,
/// insertion order or which table instance is asked.
#[inline]
pub fn shard_of(key: &str) -> usize {
  shard_index(hash_key(key))
}
