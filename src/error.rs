//! Error kinds
//!
//! Every fallible ceremony operation returns [`Result`]. The variants map
//! one-to-one onto the failure classes a coordinator has to distinguish:
//! bad invocation, I/O, malformed bytes, invalid group elements, failed
//! cryptographic consistency, forbidden upward transforms, and circuits
//! that exceed the ceremony size. Nothing in this crate swallows an error;
//! output-producing operations remove their temporary file on any failure
//! path before the error propagates.

#![forbid(unsafe_code)]

use thiserror::Error;

/// Failure classes surfaced by ceremony operations.
#[derive(Debug, Error)]
pub enum SetupError {
    /// Caller-supplied parameter out of range (power, chunk geometry, …).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Underlying read/write/seek failure; the source is preserved.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed header, truncated vector, or non-canonical encoding.
    #[error("malformed transcript data: {0}")]
    Decode(String),

    /// A deserialized point is not on the curve, not in the prime-order
    /// subgroup, or encodes infinity where infinity is not permitted.
    #[error("invalid group element: {0}")]
    Curve(String),

    /// A pairing check, proof of knowledge, hash chain, or header
    /// comparison failed: the transcript is not a valid ceremony state.
    #[error("consistency check failed: {0}")]
    Consistency(String),

    /// A transform was asked to grow a transcript; only truncation exists.
    #[error("cannot transform a power-{from} transcript up to power {to}")]
    UpscaleForbidden {
        /// Power of the input transcript.
        from: u8,
        /// Larger power that was requested.
        to: u8,
    },

    /// The R1CS does not fit the Phase-1 domain.
    #[error("circuit has {constraints} constraints but the transcript supports at most {max}")]
    CircuitTooLarge {
        /// Constraint count declared by the R1CS header.
        constraints: usize,
        /// Capacity of the Phase-1 transcript (`2^power`).
        max: usize,
    },
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, SetupError>;
