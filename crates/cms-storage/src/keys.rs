/// `raft_log` keyspace: `index(8)` big-endian, so lexicographic order is
/// numeric order.
pub fn raft_log_key(index: u64) -> [u8; 8] {
    index.to_be_bytes()
}

/// Inverse of [`raft_log_key`]. `None` for keys of the wrong width.
pub fn raft_log_index(key: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = key.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}
