use humansize::{BINARY, format_size as humanize};

use crate::TransferError;

const MIB: u64 = 1024 * 1024;

/// Formats a byte count for people, e.g. `10 GiB`.
pub fn format_size(bytes: u64) -> String {
    humanize(bytes, BINARY)
}

/// Converts a limit in MiB to bytes, saturating on overflow.
pub fn max_size_bytes(max_size_mb: u64) -> u64 {
    max_size_mb.saturating_mul(MIB)
}

/// Checks that a file of `size` bytes fits under `max_size_mb` MiB.
///
/// A file exactly at the limit is accepted.
pub fn validate_file_size(size: u64, max_size_mb: u64) -> Result<(), TransferError> {
    let limit = max_size_bytes(max_size_mb);
    if size > limit {
        return Err(TransferError::Validation {
            size: format_size(size),
            limit: format_size(limit),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_file_under_limit() {
        assert!(validate_file_size(12 * MIB, 10240).is_ok());
    }

    #[test]
    fn accepts_file_exactly_at_limit() {
        assert!(validate_file_size(10240 * MIB, 10240).is_ok());
    }

    #[test]
    fn rejects_oversized_file_with_readable_message() {
        let err = validate_file_size(11000 * MIB, 10240).unwrap_err();
        assert!(matches!(err, TransferError::Validation { .. }));
        let msg = err.to_string();
        assert!(msg.contains("10.74 GiB"), "{msg}");
        assert!(msg.contains("10 GiB"), "{msg}");
    }

    #[test]
    fn one_byte_over_is_rejected() {
        assert!(validate_file_size(MIB + 1, 1).is_err());
    }

    #[test]
    fn zero_limit_only_accepts_empty_files() {
        assert!(validate_file_size(0, 0).is_ok());
        assert!(validate_file_size(1, 0).is_err());
    }

    #[test]
    fn huge_limit_does_not_overflow() {
        assert_eq!(max_size_bytes(u64::MAX), u64::MAX);
        assert!(validate_file_size(u64::MAX, u64::MAX).is_ok());
    }

    #[test]
    fn format_size_uses_binary_units() {
        assert_eq!(format_size(5 * MIB), "5 MiB");
        assert_eq!(format_size(512), "512 B");
    }
}
