//! Error types for hetbuf.

use thiserror::Error;

/// Result type alias using hetbuf's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for buffer operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Owned storage could not be allocated.
    ///
    /// Raised by the shape-only and sequence constructors. No buffer is
    /// created when this is returned.
    #[error("memory allocation failed: {0}")]
    AllocationFailed(String),

    /// The element type of an output cursor does not match the buffer's.
    #[error("write-back sink element type mismatch: buffer holds `{expected}`, sink expects `{found}`")]
    SinkTypeMismatch {
        /// Element type of the buffer.
        expected: &'static str,
        /// Element type of the rejected destination.
        found: &'static str,
    },

    /// The write-back destination cannot hold the buffer's contents.
    #[error("write-back sink too small: {required} elements required, {available} available")]
    SinkTooSmall {
        /// Number of elements the buffer will write back.
        required: usize,
        /// Number of elements the destination can receive.
        available: usize,
    },

    /// A shape with a zero extent, an overflowing element count, or an
    /// empty source sequence.
    #[error("invalid shape: {0}")]
    InvalidShape(String),

    /// Caller-provided backing memory is shorter than the requested shape.
    #[error("backing memory holds {actual} elements, shape requires {expected}")]
    LengthMismatch {
        /// Element count required by the shape.
        expected: usize,
        /// Element count of the provided memory.
        actual: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = Error::SinkTypeMismatch {
            expected: "f32",
            found: "u8",
        };
        assert_eq!(
            err.to_string(),
            "write-back sink element type mismatch: buffer holds `f32`, sink expects `u8`"
        );

        let err = Error::LengthMismatch {
            expected: 4,
            actual: 3,
        };
        assert_eq!(
            err.to_string(),
            "backing memory holds 3 elements, shape requires 4"
        );
    }
}
