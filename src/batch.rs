//! Pairing ratio checks & random-linear-combination batching
//!
//! Verifying a transcript naively costs one pairing equation per vector
//! index, which is intractable at real ceremony sizes. This module reduces
//! those `O(n)` checks to `O(1)` pairings:
//!
//! Given `v1 = [a, b, c]` and `v2 = [a·s, b·s, c·s]`, draw random scalars
//! `r₁, r₂, r₃` and form `(a·r₁ + b·r₂ + c·r₃, (as)·r₁ + (bs)·r₂ + (cs)·r₃)`.
//! With overwhelming probability over the `rᵢ`, the combined pair has ratio
//! `s` iff every element pair does, so a single [`same_ratio`] pairing check
//! covers the whole vector. The scalars come from the transcript hash
//! (SHAKE-256 expansion), so verification stays deterministic.
//!
//! Combiners accept chunk-at-a-time input keyed by global start index, which
//! lets the verifier stream multi-gigabyte vectors straight off disk while
//! accumulating the combination via multi-scalar multiplication.

#![forbid(unsafe_code)]

use ark_bn254::Bn254;
use ark_ec::pairing::Pairing;
use ark_ec::{CurveGroup, VariableBaseMSM};
use ark_ff::One;

use crate::{F, G1, G2};

/// Single pairing ratio equality: holds iff the two pairs encode the same
/// exponent ratio, i.e. `e(g1.1, g2.0) == e(g1.0, g2.1)`.
///
/// For a pair `(X, s·X)` in G1 and `(Y, s·Y)` in G2 this is the standard
/// "same ratio" test; both orientations used by the verifier (ratio on the
/// G1 side against a fixed G2 pair, and vice versa) reduce to it.
pub fn same_ratio(g1: (G1, G1), g2: (G2, G2)) -> bool {
    // e(g1.1, g2.0) · e(−g1.0, g2.1) == 1, one Miller loop + one final exp.
    let mlo = Bn254::multi_miller_loop(
        [
            <Bn254 as Pairing>::G1Prepared::from(g1.1),
            <Bn254 as Pairing>::G1Prepared::from(-g1.0),
        ],
        [
            <Bn254 as Pairing>::G2Prepared::from(g2.0),
            <Bn254 as Pairing>::G2Prepared::from(g2.1),
        ],
    );
    match Bn254::final_exponentiation(mlo) {
        Some(fe) => fe.0.is_one(),
        None => false,
    }
}

// ------------------------- Streaming combiners -------------------------

/// Random linear combination `Σ rᵢ·vᵢ` of a single vector, fed in chunks.
pub struct LinearCombiner<Gp: VariableBaseMSM<ScalarField = F>> {
    scalars: Vec<F>,
    acc: Gp,
    seen: usize,
}

impl<Gp: VariableBaseMSM<ScalarField = F> + CurveGroup> LinearCombiner<Gp> {
    /// Create a combiner over `scalars` (one per vector element).
    pub fn new(scalars: Vec<F>) -> Self {
        Self {
            scalars,
            acc: Gp::zero(),
            seen: 0,
        }
    }

    /// Feed the chunk starting at global index `start`.
    pub fn feed(&mut self, start: usize, chunk: &[Gp::MulBase]) {
        assert!(
            start + chunk.len() <= self.scalars.len(),
            "chunk exceeds combiner length: start={}, len={}, total={}",
            start,
            chunk.len(),
            self.scalars.len()
        );
        self.acc += Gp::msm_unchecked(chunk, &self.scalars[start..start + chunk.len()]);
        self.seen += chunk.len();
    }

    /// Finish and return the combined element.
    pub fn finish(self) -> Gp::MulBase {
        assert_eq!(
            self.seen,
            self.scalars.len(),
            "combiner fed {} of {} elements",
            self.seen,
            self.scalars.len()
        );
        self.acc.into_affine()
    }
}

/// Random linear combination over **adjacent pairs** `(vᵢ, vᵢ₊₁)` of one
/// vector: accumulates `L = Σ rᵢ·vᵢ` and `R = Σ rᵢ·vᵢ₊₁` for
/// `i ∈ [0, n−2]`, fed in chunks.
///
/// `same_ratio((L, R), (Y, s·Y))` then certifies that the whole vector is a
/// geometric progression with ratio `s` — the powers-of-tau shape check.
pub struct AdjacentPairCombiner<Gp: VariableBaseMSM<ScalarField = F>> {
    total: usize,
    scalars: Vec<F>, // n−1 coefficients
    lhs: Gp,
    rhs: Gp,
    seen: usize,
}

impl<Gp: VariableBaseMSM<ScalarField = F> + CurveGroup> AdjacentPairCombiner<Gp> {
    /// Create a combiner for a vector of `total` elements; `scalars` holds
    /// one coefficient per adjacent pair (`total − 1`).
    pub fn new(total: usize, scalars: Vec<F>) -> Self {
        assert!(total >= 2, "adjacent-pair combination needs two elements");
        assert_eq!(scalars.len(), total - 1, "one scalar per adjacent pair");
        Self {
            total,
            scalars,
            lhs: Gp::zero(),
            rhs: Gp::zero(),
            seen: 0,
        }
    }

    /// Feed the chunk starting at global index `start`.
    ///
    /// Chunk boundaries need no overlap: element `i` contributes `rᵢ·vᵢ` to
    /// the left side (while `i ≤ n−2`) and `rᵢ₋₁·vᵢ` to the right side
    /// (while `i ≥ 1`), both of which only need the element itself.
    pub fn feed(&mut self, start: usize, chunk: &[Gp::MulBase]) {
        let len = chunk.len();
        assert!(start + len <= self.total, "chunk exceeds declared length");

        // Left side: indices [start, min(start+len, total−1)).
        let l_len = (self.total - 1).saturating_sub(start).min(len);
        if l_len > 0 {
            self.lhs += Gp::msm_unchecked(&chunk[..l_len], &self.scalars[start..start + l_len]);
        }

        // Right side: indices [max(start, 1), start+len), scalar index i−1.
        let off = usize::from(start == 0);
        if len > off {
            self.rhs += Gp::msm_unchecked(
                &chunk[off..],
                &self.scalars[start + off - 1..start + len - 1],
            );
        }

        self.seen += len;
    }

    /// Finish and return `(L, R)`.
    pub fn finish(self) -> (Gp::MulBase, Gp::MulBase) {
        assert_eq!(
            self.seen, self.total,
            "combiner fed {} of {} elements",
            self.seen, self.total
        );
        (self.lhs.into_affine(), self.rhs.into_affine())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_bn254::{G1Projective, G2Projective};
    use ark_ec::AffineRepr;
    use ark_std::UniformRand;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn powers_g1(base: F, n: usize) -> Vec<G1> {
        let mut acc = F::one();
        (0..n)
            .map(|_| {
                let p = (G1::generator() * acc).into_affine();
                acc *= base;
                p
            })
            .collect()
    }

    #[test]
    fn same_ratio_accepts_and_rejects() {
        let mut rng = StdRng::from_seed([7u8; 32]);
        let s = F::rand(&mut rng);
        let x = (G1::generator() * F::rand(&mut rng)).into_affine();
        let y = (G2::generator() * F::rand(&mut rng)).into_affine();
        let xs = (x * s).into_affine();
        let ys = (y * s).into_affine();

        assert!(same_ratio((x, xs), (y, ys)));
        assert!(!same_ratio((x, xs), (ys, y)));
        assert!(!same_ratio((xs, x), (y, ys)));
    }

    #[test]
    fn adjacent_pairs_certify_a_geometric_vector() {
        let mut rng = StdRng::from_seed([8u8; 32]);
        let tau = F::rand(&mut rng);
        let n = 33;
        let v = powers_g1(tau, n);
        let g2_tau = (G2::generator() * tau).into_affine();

        let scalars: Vec<F> = (0..n - 1).map(|_| F::rand(&mut rng)).collect();
        let mut comb = AdjacentPairCombiner::<G1Projective>::new(n, scalars.clone());
        // Feed with a chunk size that does not divide n, exercising the
        // boundary bookkeeping.
        for (ci, chunk) in v.chunks(5).enumerate() {
            comb.feed(ci * 5, chunk);
        }
        let (l, r) = comb.finish();
        assert!(same_ratio((l, r), (G2::generator(), g2_tau)));

        // A single out-of-place element must break the combination.
        let mut bad = v.clone();
        bad[7] = (bad[7] * F::from(2u64)).into_affine();
        let mut comb = AdjacentPairCombiner::<G1Projective>::new(n, scalars);
        comb.feed(0, &bad);
        let (l, r) = comb.finish();
        assert!(!same_ratio((l, r), (G2::generator(), g2_tau)));
    }

    #[test]
    fn adjacent_pairs_work_on_the_g2_side() {
        let mut rng = StdRng::from_seed([9u8; 32]);
        let tau = F::rand(&mut rng);
        let n = 16;
        let mut acc = F::one();
        let v: Vec<G2> = (0..n)
            .map(|_| {
                let p = (G2::generator() * acc).into_affine();
                acc *= tau;
                p
            })
            .collect();
        let g1_tau = (G1::generator() * tau).into_affine();

        let scalars: Vec<F> = (0..n - 1).map(|_| F::rand(&mut rng)).collect();
        let mut comb = AdjacentPairCombiner::<G2Projective>::new(n, scalars);
        comb.feed(0, &v);
        let (l, r) = comb.finish();
        // e(τ·G1, L) == e(G1, R): the G2 vector advances by τ each step.
        assert!(same_ratio((G1::generator(), g1_tau), (l, r)));
    }

    #[test]
    fn linear_combiner_matches_direct_msm() {
        let mut rng = StdRng::from_seed([10u8; 32]);
        let v = powers_g1(F::rand(&mut rng), 20);
        let scalars: Vec<F> = (0..20).map(|_| F::rand(&mut rng)).collect();

        let direct = G1Projective::msm_unchecked(&v, &scalars).into_affine();
        let mut comb = LinearCombiner::<G1Projective>::new(scalars);
        for (ci, chunk) in v.chunks(7).enumerate() {
            comb.feed(ci * 7, chunk);
        }
        assert_eq!(comb.finish(), direct);
    }
}
