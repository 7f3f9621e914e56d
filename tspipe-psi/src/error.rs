//! PSI/SI error types.

use thiserror::Error;

/// Errors raised by section-level parsing and serialization.
///
/// Table-level codecs (PMT and friends) never raise errors for malformed
/// content; they produce a value flagged invalid instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PsiError {
    /// Section shorter than its header or declared length.
    #[error("Section too short: need {needed} bytes, got {got}")]
    SectionTooShort { needed: usize, got: usize },

    /// Section length field inconsistent with the data.
    #[error("Invalid section length: {0}")]
    InvalidSectionLength(u16),

    /// CRC-32 check failure.
    #[error("CRC mismatch: expected 0x{expected:08X}, got 0x{actual:08X}")]
    CrcMismatch { expected: u32, actual: u32 },

    /// Payload exceeds the maximum a section can carry.
    #[error("Section payload too long: {size} bytes")]
    PayloadTooLong { size: usize },

    /// Descriptor payload exceeds the 8-bit length field.
    #[error("Descriptor payload too long: {size} bytes")]
    DescriptorTooLong { size: usize },

    /// Section does not belong to the table it was added to.
    #[error("Section does not match table: {0}")]
    SectionMismatch(String),
}

/// Result type for PSI operations.
pub type Result<T> = std::result::Result<T, PsiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PsiError::CrcMismatch {
            expected: 0xDEADBEEF,
            actual: 0xCAFEBABE,
        };
        assert_eq!(
            err.to_string(),
            "CRC mismatch: expected 0xDEADBEEF, got 0xCAFEBABE"
        );
    }
}
