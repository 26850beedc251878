//! CRC32 checksums for log records and scan segment assignment.

use crc32fast::Hasher;

/// Computes a CRC32 (IEEE) checksum over the provided data.
pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Verifies that the computed checksum matches the expected checksum.
pub fn verify_checksum(data: &[u8], expected: u32) -> bool {
    compute_checksum(data) == expected
}

/// Parallel scan segment owning `hash_key` when the table is split `total_segments` ways.
///
/// Assignment is stable across processes and restarts.
pub fn segment_of(hash_key: &str, total_segments: u32) -> u32 {
    if total_segments == 0 {
        return 0;
    }
    compute_checksum(hash_key.as_bytes()) % total_segments
}
