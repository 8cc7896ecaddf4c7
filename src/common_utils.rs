use chrono::Utc;

/// Get current timestamp in milliseconds (UTC)
pub fn get_current_timestamp_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Get current timestamp in nanoseconds (UTC)
pub fn get_current_timestamp_ns() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

// ============================================================================
// CRC32 Utilities
// ============================================================================

/// Compute CRC32 of a single byte slice (simple case)
#[inline]
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Compute CRC32 of multiple byte slices
#[inline]
pub fn crc32_multi(slices: &[&[u8]]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    for slice in slices {
        hasher.update(slice);
    }
    hasher.finalize()
}

/// Verify CRC32 checksum
#[inline]
pub fn crc32_verify(data: &[u8], expected: u32) -> bool {
    crc32fast::hash(data) == expected
}

/// Verify CRC32 checksum of multiple slices
#[inline]
pub fn crc32_verify_multi(slices: &[&[u8]], expected: u32) -> bool {
    crc32_multi(slices) == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_multi_matches_single() {
        let data = b"order journal frame";
        let split = crc32_multi(&[&data[..5], &data[5..]]);
        assert_eq!(split, crc32(data));
    }

    #[test]
    fn test_crc32_verify() {
        let data = b"payload";
        let crc = crc32(data);
        assert!(crc32_verify(data, crc));
        assert!(!crc32_verify(data, crc ^ 1));
        assert!(crc32_verify_multi(&[b"pay", b"load"], crc));
    }
}
