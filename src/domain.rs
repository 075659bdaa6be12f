//! Evaluation domain & group-side transforms
//!
//! Phase 2 moves the Phase-1 tau powers from the monomial basis to the
//! Lagrange basis of the constraint domain `H = <ω>` of size `d`. The
//! twist compared to an ordinary IFFT is that the vectors live *in the
//! exponent*: entries are `[τ^i]₁` / `[τ^i]₂`, not field elements, so the
//! butterflies add curve points and the twiddle multiplications become
//! scalar multiplications. Linearity makes this exactly the inverse DFT:
//!
//! ```text
//!   L_j(X) = (1/d) · Σ_i ω^{−ij} X^i   ⇒   [L_j(τ)] = INTT([τ^i])_j
//! ```
//!
//! The radix-2 structure is the classical iterative Cooley–Tukey with a
//! bit-reversal pass and per-stage twiddles computed once per call. Sizes
//! are powers of two up to the scalar field's two-adic limit; BN254's `r−1`
//! carries 2²⁸, comfortably above the ceremony's maximum power of 26.

#![forbid(unsafe_code)]

use ark_ec::CurveGroup;
use ark_ff::{FftField, Field, One};

use crate::error::{Result, SetupError};
use crate::F;

/// Power-of-two evaluation domain over the BN254 scalar field.
#[derive(Debug, Clone)]
pub struct Radix2Domain {
    /// Domain size `d` (power of two).
    pub size: usize,
    /// Primitive `d`-th root of unity `ω`.
    pub root: F,
    /// `ω⁻¹`, the forward root of the inverse transform.
    pub root_inv: F,
    /// `d⁻¹`, the inverse-transform output scaling.
    pub size_inv: F,
}

impl Radix2Domain {
    /// Construct the domain of the given power-of-two `size`.
    pub fn new(size: usize) -> Result<Self> {
        if !size.is_power_of_two() {
            return Err(SetupError::InvalidArgument(format!(
                "domain size {size} is not a power of two"
            )));
        }
        let root = F::get_root_of_unity(size as u64).ok_or_else(|| {
            SetupError::InvalidArgument(format!(
                "no 2-adic root of unity of order {size} in the scalar field"
            ))
        })?;
        let root_inv = root.inverse().expect("roots of unity are nonzero");
        let size_inv = F::from(size as u64)
            .inverse()
            .expect("domain size is nonzero in the field");
        Ok(Self {
            size,
            root,
            root_inv,
            size_inv,
        })
    }
}

/// Running geometric series `first, first·ratio, first·ratio², …`.
///
/// Contributions scale transcript vectors chunk-at-a-time; this keeps the
/// scalar stream flowing across chunk boundaries without recomputing
/// powers from scratch.
pub struct GeometricSeries {
    next: F,
    ratio: F,
}

impl GeometricSeries {
    /// Start a series at `first` advancing by `ratio`.
    pub fn new(first: F, ratio: F) -> Self {
        Self { next: first, ratio }
    }

    /// Produce the next `count` terms.
    pub fn take(&mut self, count: usize) -> Vec<F> {
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.next);
            self.next *= self.ratio;
        }
        out
    }
}

// ------------------------- Group-side inverse NTT -------------------------

/// Inverse NTT over group elements: monomial-basis powers in the exponent
/// to Lagrange-basis evaluations in the exponent.
///
/// Input length must equal the domain size. The result is affine-normalized
/// in one batch inversion at the end.
pub fn ifft_in_group<Gp>(domain: &Radix2Domain, points: &[Gp::Affine]) -> Vec<Gp::Affine>
where
    Gp: CurveGroup<ScalarField = F>,
{
    assert_eq!(
        points.len(),
        domain.size,
        "group IFFT length {} does not match domain size {}",
        points.len(),
        domain.size
    );

    let mut a: Vec<Gp> = points.iter().map(|p| (*p).into()).collect();

    // Bit-reversal permutation.
    let n = a.len();
    let mut j = 0usize;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j ^= bit;
        if i < j {
            a.swap(i, j);
        }
    }

    // Cooley–Tukey butterflies with per-stage twiddles of the inverse root.
    let mut len = 2;
    while len <= n {
        let w_len = pow(domain.root_inv, (n / len) as u64);
        for start in (0..n).step_by(len) {
            let mut w = F::one();
            let half = len / 2;
            for i in 0..half {
                let u = a[start + i];
                let v = a[start + i + half] * w;
                a[start + i] = u + v;
                a[start + i + half] = u - v;
                w *= w_len;
            }
        }
        len <<= 1;
    }

    // Scale by d⁻¹ and normalize to affine in one batch.
    for x in a.iter_mut() {
        *x *= domain.size_inv;
    }
    Gp::normalize_batch(&a)
}

/// Square-and-multiply scalar exponentiation.
#[inline]
pub fn pow(mut base: F, mut exp: u64) -> F {
    let mut acc = F::one();
    while exp > 0 {
        if (exp & 1) == 1 {
            acc *= base;
        }
        base.square_in_place();
        exp >>= 1;
    }
    acc
}
