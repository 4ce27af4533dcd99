//! Persistence error types.

/// Errors that can occur while reading or writing column files.
///
/// These are column-level failures. Corruption confined to a single section
/// is not an error at this level: the section is replaced with an all-default
/// one and logged, and the column load succeeds.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// Filesystem failure.
    #[error("column file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The file does not start with the expected magic bytes.
    #[error("invalid magic bytes")]
    BadMagic,

    /// The format version is not supported by this build.
    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u8),

    /// The file ended before the declared structure did.
    #[error("data truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Minimum expected byte count.
        expected: usize,
        /// Actual byte count available.
        actual: usize,
    },

    /// A state record held bytes that are not valid UTF-8.
    #[error("invalid UTF-8 in state record")]
    InvalidString,
}
