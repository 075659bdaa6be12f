//! Contribution chain & challenge derivation
//!
//! This module implements the deterministic hashing layer both ceremony
//! phases share:
//!
//! - the **contribution chain**: a running Keccak-256 digest seeded by a
//!   fixed domain-separation string (plus the header) and extended by every
//!   contribution record in file order. The chain value stored in record
//!   `k` binds the entire history up to and including `k`; independent
//!   verifiers replay it byte-for-byte.
//! - **hash-to-G2**: the challenge point `G_s = HashToG2(h ‖ tag)` that
//!   anchors each proof of knowledge. The digest seeds a ChaCha20 stream
//!   and a uniform G2 element is sampled from it, so no contributor can
//!   influence their own challenge point.
//! - **challenge scalars**: SHAKE-256 expansion of the chain value into the
//!   random-linear-combination coefficients used to batch pairing checks.
//!   Each draw reduces 64 bytes modulo `r`, keeping the sampling bias
//!   negligible.
//!
//! Byte ordering is explicit and append-only to pin transcript identity:
//! records absorb their raw point encodings exactly as they appear on disk.

#![forbid(unsafe_code)]

use ark_ec::CurveGroup;
use ark_ff::PrimeField;
use ark_serialize::CanonicalSerialize;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use sha3::digest::{ExtendableOutput, XofReader};
use sha3::{Digest, Keccak256};

use crate::codec::HASH_LEN;
use crate::{F, G1, G2};

/// Domain-separation tag for τ proofs of knowledge.
pub const TAG_TAU: &[u8] = b"TAU";
/// Domain-separation tag for α proofs of knowledge.
pub const TAG_ALPHA: &[u8] = b"ALPHA";
/// Domain-separation tag for β proofs of knowledge.
pub const TAG_BETA: &[u8] = b"BETA";
/// Domain-separation tag for δ proofs of knowledge.
pub const TAG_DELTA: &[u8] = b"DELTA";

const PHASE1_DST: &[u8] = b"groth16-setup/phase1/v1";
const PHASE2_DST: &[u8] = b"groth16-setup/phase2/v1";
const CHALLENGE_DST: &[u8] = b"groth16-setup/challenge/v1";
const HASH_TO_G2_DST: &[u8] = b"groth16-setup/hash-to-g2/v1";

// ------------------------- Chain hashing -------------------------

/// Incremental Keccak-256 over one contribution record.
///
/// `begin` binds the previous chain value; the record's fields are then
/// absorbed in their on-disk order and `finish` yields the new chain value.
pub struct ChainHasher {
    h: Keccak256,
}

impl ChainHasher {
    /// Start a record hash bound to the previous chain value.
    pub fn begin(prev: &[u8; HASH_LEN]) -> Self {
        let mut h = Keccak256::new();
        h.update(prev);
        Self { h }
    }

    /// Absorb raw bytes.
    pub fn absorb(&mut self, bytes: &[u8]) {
        self.h.update(bytes);
    }

    /// Absorb a G1 element in its raw on-disk encoding.
    pub fn absorb_g1(&mut self, p: &G1) {
        let mut buf = [0u8; crate::codec::G1_RAW_LEN];
        p.serialize_uncompressed(buf.as_mut_slice())
            .expect("fixed-size buffer matches the raw G1 encoding");
        self.h.update(buf);
    }

    /// Absorb a G2 element in its raw on-disk encoding.
    pub fn absorb_g2(&mut self, p: &G2) {
        let mut buf = [0u8; crate::codec::G2_RAW_LEN];
        p.serialize_uncompressed(buf.as_mut_slice())
            .expect("fixed-size buffer matches the raw G2 encoding");
        self.h.update(buf);
    }

    /// Finalize into the new chain value.
    pub fn finish(self) -> [u8; HASH_LEN] {
        self.h.finalize().into()
    }
}

/// Genesis chain value of a fresh Phase-1 transcript at `power`.
pub fn phase1_genesis(power: u8) -> [u8; HASH_LEN] {
    let mut h = Keccak256::new();
    h.update(PHASE1_DST);
    h.update([power]);
    h.finalize().into()
}

/// Genesis chain value of a fresh Phase-2 transcript.
///
/// Binds the full header so transcripts for different circuit shapes can
/// never share a chain; verifiers recompute it from the header alone.
pub fn phase2_genesis(
    power: u8,
    domain: u32,
    wires: u32,
    witness: u32,
    public: u32,
) -> [u8; HASH_LEN] {
    let mut h = Keccak256::new();
    h.update(PHASE2_DST);
    h.update([power]);
    h.update(domain.to_le_bytes());
    h.update(wires.to_le_bytes());
    h.update(witness.to_le_bytes());
    h.update(public.to_le_bytes());
    h.finalize().into()
}

// ------------------------- Challenge derivation -------------------------

/// Derive the challenge point `G_s = HashToG2(h ‖ tag)`.
///
/// The 32-byte digest of `(dst ‖ h ‖ tag)` seeds a ChaCha20 stream from
/// which a uniform G2 group element is sampled. The construction is fully
/// deterministic in `(h, tag)` and outside any contributor's control, which
/// is what makes the ratio-style proof of knowledge sound.
pub fn hash_to_g2(hash: &[u8; HASH_LEN], tag: &[u8]) -> G2 {
    use ark_std::UniformRand;
    let mut h = Keccak256::new();
    h.update(HASH_TO_G2_DST);
    h.update(hash);
    h.update(tag);
    let seed: [u8; 32] = h.finalize().into();
    let mut rng = ChaCha20Rng::from_seed(seed);
    ark_bn254::G2Projective::rand(&mut rng).into_affine()
}

/// Expand `count` field challenges from a chain value.
///
/// A single SHAKE-256 stream is keyed with `(dst ‖ hash ‖ label)`; each
/// draw reads 64 bytes and reduces them modulo `r` (little-endian), the
/// arkworks canonical reduction.
pub fn challenge_scalars(hash: &[u8; HASH_LEN], label: &[u8], count: usize) -> Vec<F> {
    let mut h = sha3::Shake256::default();
    sha3::digest::Update::update(&mut h, CHALLENGE_DST);
    sha3::digest::Update::update(&mut h, hash);
    sha3::digest::Update::update(&mut h, label);
    let mut xof = h.finalize_xof();

    let mut out = Vec::with_capacity(count);
    let mut buf = [0u8; 64];
    for _ in 0..count {
        xof.read(&mut buf);
        out.push(F::from_le_bytes_mod_order(&buf));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ec::AffineRepr;

    #[test]
    fn genesis_depends_on_power() {
        assert_ne!(phase1_genesis(4), phase1_genesis(5));
        assert_eq!(phase1_genesis(4), phase1_genesis(4));
    }

    #[test]
    fn chain_is_order_sensitive() {
        let g = phase1_genesis(4);
        let mut a = ChainHasher::begin(&g);
        a.absorb(b"first");
        a.absorb(b"second");
        let mut b = ChainHasher::begin(&g);
        b.absorb(b"second");
        b.absorb(b"first");
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn point_absorption_matches_raw_encoding() {
        let g = phase1_genesis(4);
        let p = G1::generator();
        let mut a = ChainHasher::begin(&g);
        a.absorb_g1(&p);

        let mut raw = Vec::new();
        crate::codec::write_g1(&mut raw, &p).unwrap();
        let mut b = ChainHasher::begin(&g);
        b.absorb(&raw);

        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn hash_to_g2_is_deterministic_and_tag_separated() {
        let h = phase1_genesis(8);
        let a = hash_to_g2(&h, TAG_TAU);
        let b = hash_to_g2(&h, TAG_TAU);
        let c = hash_to_g2(&h, TAG_ALPHA);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(!a.is_zero());
        crate::codec::validate_g2(&a).unwrap();
    }

    #[test]
    fn challenge_scalars_are_deterministic_and_label_separated() {
        let h = phase1_genesis(8);
        let a = challenge_scalars(&h, b"tau-g1", 8);
        let b = challenge_scalars(&h, b"tau-g1", 8);
        let c = challenge_scalars(&h, b"tau-g2", 8);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 8);
        // Distinct draws within one stream.
        assert_ne!(a[0], a[1]);
    }
}
