//! Key partitioning over the sorted active-node snapshot.
//!
//! Ownership is `abs(hash(key)) mod N` where the hash is the polynomial
//! `h = h * 31 + codepoint` over the key's characters and `N` is the
//! number of active nodes. The snapshot must be ordered by node id (see
//! [`NodeRegistry::snapshot_active`](super::registry::NodeRegistry::snapshot_active)).
//!
//! There is no ring stability: any membership change may move every key.

use super::node::Node;

/// Polynomial rolling hash over the key's Unicode scalar values.
///
/// Arithmetic wraps on overflow, matching a 64-bit signed accumulator.
pub fn key_hash(key: &str) -> i64 {
    key.chars().fold(0i64, |h, c| {
        h.wrapping_mul(31).wrapping_add(i64::from(u32::from(c)))
    })
}

/// Index of the owning node in a snapshot of `n` nodes, or `None` if empty.
pub fn owner_index(key: &str, n: usize) -> Option<usize> {
    if n == 0 {
        return None;
    }
    let idx = key_hash(key).unsigned_abs() % n as u64;
    Some(idx as usize)
}

/// The node owning `key`, or `None` if the snapshot is empty.
pub fn owner_of<'a>(key: &str, active: &'a [Node]) -> Option<&'a Node> {
    owner_index(key, active.len()).map(|i| &active[i])
}

/// Ordered replica set for `key`: the owner followed by the next
/// `factor - 1` nodes of the snapshot, wrapping at the end.
///
/// Never returns more than `active.len()` nodes and never repeats one.
pub fn replica_set(key: &str, active: &[Node], factor: usize) -> Vec<Node> {
    let n = active.len();
    let Some(primary) = owner_index(key, n) else {
        return Vec::new();
    };
    (0..factor.min(n))
        .map(|i| active[(primary + i) % n].clone())
        .collect()
}
