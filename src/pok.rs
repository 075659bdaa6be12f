//! Secrets & proofs of knowledge
//!
//! A contribution folds a fresh secret scalar `s` into the transcript by
//! scaling group elements. The contributor must prove two things without
//! revealing `s`: that the update really is multiplication by a single
//! scalar, and that they *know* that scalar (so they cannot replay or
//! invert someone else's work).
//!
//! Both are certified by one published G2 element. Let `h` be the chain
//! value before the contribution and `G_s = HashToG2(h ‖ tag)` — a point
//! the contributor cannot influence. The contributor publishes
//! `P = s·G_s`; the verifier recomputes `G_s` and checks the pairing ratio
//!
//! ```text
//!   e(X′, G_s) == e(X, P)
//! ```
//!
//! where `X → X′` is the cumulative element the record claims to update
//! (`[1]₁ → [τ]₁` for the first contributor, and so on). The check passes
//! iff `X′ = s·X` for the same `s` hidden in `P`, and binding `G_s` to the
//! transcript makes `P` unforgeable without knowing `s`.
//!
//! Secrets live only inside [`Secret`]: sampled nonzero from a
//! cryptographic RNG, handed out by reference, and scrubbed on drop. They
//! are never serialized and never appear in any output file.

#![forbid(unsafe_code)]

use ark_ff::{Field, Zero};
use ark_std::UniformRand;
use rand::{CryptoRng, RngCore};

use crate::batch::same_ratio;
use crate::codec::HASH_LEN;
use crate::error::{Result, SetupError};
use crate::transcript::hash_to_g2;
use crate::{F, G1, G2};

// ------------------------- Secret scalars -------------------------

/// An ephemeral ceremony secret (τ, α, β or δ).
///
/// Sampled uniformly from `Fr \ {0}` and overwritten with zero when
/// dropped, on success and failure paths alike.
pub struct Secret(F);

impl Secret {
    /// Sample a fresh nonzero secret from `rng`.
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        loop {
            let s = F::rand(rng);
            if !s.is_zero() {
                return Self(s);
            }
        }
    }

    /// Borrow the scalar for exponentiations.
    pub fn expose(&self) -> &F {
        &self.0
    }

    /// The multiplicative inverse, as its own scrubbed secret.
    pub fn inverse(&self) -> Secret {
        Secret(self.0.inverse().expect("secret is sampled nonzero"))
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        // Scrub the limbs on the way out.
        self.0 = F::zero();
    }
}

// ------------------------- Proofs of knowledge -------------------------

/// Produce the published proof element `P = s·G_s` for `tag` under the
/// chain value `prev_hash`.
pub fn prove(secret: &Secret, prev_hash: &[u8; HASH_LEN], tag: &[u8]) -> G2 {
    use ark_ec::CurveGroup;
    let g_s = hash_to_g2(prev_hash, tag);
    (g_s * secret.expose()).into_affine()
}

/// Verify that `prev → cur` is a single-scalar update whose scalar the
/// contributor knows, given their published proof element.
///
/// `context` names the secret in the error message (e.g. `"tau"`).
pub fn verify_update(
    prev: &G1,
    cur: &G1,
    proof: &G2,
    prev_hash: &[u8; HASH_LEN],
    tag: &[u8],
    context: &str,
) -> Result<()> {
    let g_s = hash_to_g2(prev_hash, tag);
    if !same_ratio((*prev, *cur), (g_s, *proof)) {
        return Err(SetupError::Consistency(format!(
            "proof of knowledge for {context} does not match the claimed update"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::{phase1_genesis, TAG_ALPHA, TAG_TAU};
    use ark_ec::{AffineRepr, CurveGroup};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn honest_update_verifies() {
        let mut rng = StdRng::from_seed([1u8; 32]);
        let h = phase1_genesis(6);
        let s = Secret::random(&mut rng);

        let prev = G1::generator();
        let cur = (prev * s.expose()).into_affine();
        let proof = prove(&s, &h, TAG_TAU);

        verify_update(&prev, &cur, &proof, &h, TAG_TAU, "tau").unwrap();
    }

    #[test]
    fn wrong_scalar_or_tag_or_hash_is_rejected() {
        let mut rng = StdRng::from_seed([2u8; 32]);
        let h = phase1_genesis(6);
        let s = Secret::random(&mut rng);
        let other = Secret::random(&mut rng);

        let prev = G1::generator();
        let cur = (prev * s.expose()).into_affine();
        let proof = prove(&s, &h, TAG_TAU);

        // Update scaled by a different secret than the proof claims.
        let forged = (prev * other.expose()).into_affine();
        assert!(verify_update(&prev, &forged, &proof, &h, TAG_TAU, "tau").is_err());

        // Same proof replayed under a different domain tag.
        assert!(verify_update(&prev, &cur, &proof, &h, TAG_ALPHA, "alpha").is_err());

        // Same proof replayed under a different chain value.
        let h2 = phase1_genesis(7);
        assert!(verify_update(&prev, &cur, &proof, &h2, TAG_TAU, "tau").is_err());
    }

    #[test]
    fn inverse_round_trips() {
        let mut rng = StdRng::from_seed([3u8; 32]);
        let s = Secret::random(&mut rng);
        let inv = s.inverse();
        assert_eq!(*s.expose() * inv.expose(), F::from(1u64));
    }
}
