//! Responsibility Partitioning
//!
//! Deterministic assignment of a resource key to one responsible node among
//! the current member list. Every node must evaluate the same key against the
//! same ordered member list and reach the same answer, so the hash is
//! implemented by hand: the std `DefaultHasher` is randomly seeded per
//! process and cannot be used here.

use crate::error::{Error, Result};

/// Stable 31-multiplier rolling hash over the key bytes.
///
/// Identical on every node running the same protocol version, for the
/// lifetime of the process.
fn stable_hash(key: &str) -> u32 {
    let mut hash: u32 = 0;
    for byte in key.as_bytes() {
        hash = hash.wrapping_mul(31).wrapping_add(*byte as u32);
    }
    hash
}

/// Index of the member responsible for `key` in an ordered member list
fn responsible_index(key: &str, member_count: usize) -> usize {
    ((stable_hash(key) & i32::MAX as u32) as usize) % member_count
}

/// Pick the member responsible for `key` from an ordered member list.
///
/// Callers must pass the canonical cluster view order (sorted identically on
/// every node); the result is otherwise meaningless.
pub fn responsible_member<'a>(key: &str, members: &'a [String]) -> Result<&'a str> {
    if members.is_empty() {
        return Err(Error::EmptyMemberList(key.to_string()));
    }
    Ok(members[responsible_index(key, members.len())].as_str())
}

/// Whether `local` is the member responsible for `key`
pub fn is_responsible(key: &str, members: &[String], local: &str) -> Result<bool> {
    Ok(responsible_member(key, members)? == local)
}
