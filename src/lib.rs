//! Public surface & core types
//!
//! This crate implements the coordinator-agnostic ceremony logic for a
//! two-phase Groth16 trusted setup on the BN254 pairing-friendly curve,
//! ending in the extraction of standards-compatible proving and verifying
//! keys for a concrete R1CS.
//!
//! The ceremony is a multi-party computation: every participant folds fresh
//! secret randomness into the running transcript, and the setup is sound as
//! long as at least one honest participant destroys their secret. The crate
//! exposes one operation per ceremony step; a coordinator sequences them and
//! moves the produced files between participants:
//!
//! ```text
//!   phase1::initialize → phase1::contribute (×N) → phase1::verify
//!     → phase1::transform (optional downshift)
//!     → phase2::initialize(phase1, r1cs) → phase2::contribute (×M)
//!     → phase2::verify → keys::extract_keys
//! ```
//!
//! ## Transcript & ordering (public contract)
//!
//! Both phases maintain a running Keccak-256 **contribution chain**: the
//! genesis hash is a fixed domain-separation string (plus the header), and
//! every appended contribution record hashes the previous chain value
//! together with its own serialized fields. The chain imposes a strict total
//! order on contributions, doubles as the anti-replay device, and is the
//! Fiat–Shamir source for every challenge the verifier derives (the
//! hash-to-G2 points that anchor proofs of knowledge, and the random-linear-
//! combination scalars that batch per-index pairing checks into O(1)
//! pairings).
//!
//! ## Streaming discipline
//!
//! Transcript vectors at the maximum power hold 2²⁷ G1 points (≈ 8 GiB raw);
//! operations therefore stream vectors chunk-at-a-time through [`codec`] and
//! never require a whole file in memory. Outputs are written to a temporary
//! sibling path and renamed atomically on success, so a cancelled or failed
//! command leaves no partial file behind.

#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms)]

/// Random-linear-combination batching of pairing ratio checks.
pub mod batch;
/// Raw/compressed group-element encodings, chunked vector I/O, atomic writes.
pub mod codec;
/// Power-of-two evaluation domain; inverse NTT over group elements.
pub mod domain;
/// Error kinds returned by every fallible ceremony operation.
pub mod error;
/// Final key assembly: Groth16 proving/verifying keys from a finished ceremony.
pub mod keys;
/// Phase 1 — the universal "powers of tau" transcript.
pub mod phase1;
/// Phase 2 — the circuit-specific transcript and its evaluations file.
pub mod phase2;
/// Secret scalars and proofs of knowledge tying contributors to them.
pub mod pok;
/// Constraint-system interface: sparse rows streamed from monolithic or parted files.
pub mod r1cs;
/// Keccak-256 contribution chain, challenge derivation, hash-to-G2.
pub mod transcript;

pub use error::{Result, SetupError};

/// Scalar field of BN254; exponents of all ceremony secrets live here.
pub type F = ark_bn254::Fr;

/// G1 group element in affine form.
pub type G1 = ark_bn254::G1Affine;

/// G2 group element in affine form.
pub type G2 = ark_bn254::G2Affine;

/// Largest supported Phase-1 power: transcripts hold `2^(p+1) − 1` G1 tau
/// powers, and the BN254 scalar field has two-adicity 28, so 26 keeps every
/// required evaluation domain available.
pub const MAX_POWER: u8 = 26;
