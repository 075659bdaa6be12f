//! Groth16 key extraction
//!
//! Assembles the proving and verifying keys from a finished Phase-2
//! transcript and its evaluations file. The field order matches the
//! downstream prover/verifier convention:
//!
//! - **Proving key**: `[α]₁, [β]₁, [δ]₁; [β]₂, [δ]₂;` the per-wire query
//!   arrays `a`, `b` (G1) and `b2` (G2) with their point-at-infinity
//!   entries filtered out; the quotient powers `z` (the Phase-2 vector
//!   *minus its final slot* — the downstream prover consumes `d − 1`
//!   entries); the private K column `k = pkk`; the infinity masks and
//!   `u64` counts that let a consumer reconstruct the full-length arrays;
//!   and the Pedersen commitment keys (empty when no wire is marked).
//! - **Verifying key**: `[α]₁; [β]₂, [γ]₂, [δ]₂;` the public K column
//!   `k = vkk`; and the Pedersen verifying key. `γ` is the canonical G2
//!   generator — it is never touched by the ceremony and is not stored in
//!   any transcript.
//!
//! Filtering the infinity entries halves the serialized size for sparse
//! circuits; the boolean masks (original length) record where they sat.
//! Key files use the compressed point encoding.

#![forbid(unsafe_code)]

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use ark_ec::{AffineRepr, CurveGroup};
use rand::rngs::OsRng;

use crate::codec::{self, AtomicFile};
use crate::error::{Result, SetupError};
use crate::phase2::{Evals, Phase2};
use crate::pok::Secret;
use crate::{G1, G2};

// ------------------------- Key material -------------------------

/// Pedersen commitment proving key derived from the CKK column.
pub struct PedersenProvingKey {
    /// Commitment basis: the K-column evaluations of the marked wires.
    pub basis: Vec<G1>,
    /// The basis scaled by the commitment trapdoor σ.
    pub basis_exp_sigma: Vec<G1>,
}

/// Pedersen commitment verifying key.
pub struct PedersenVerifyingKey {
    /// `[1]₂`.
    pub g: G2,
    /// `[σ]₂`.
    pub g_sigma: G2,
}

/// Groth16 proving key.
pub struct ProvingKey {
    /// `[α]₁`.
    pub alpha_g1: G1,
    /// `[β]₁`.
    pub beta_g1: G1,
    /// `[δ]₁`.
    pub delta_g1: G1,
    /// `[β]₂`.
    pub beta_g2: G2,
    /// `[δ]₂`.
    pub delta_g2: G2,
    /// `[A_j(τ)]₁`, infinity entries removed.
    pub a: Vec<G1>,
    /// `[B_j(τ)]₁`, infinity entries removed.
    pub b1: Vec<G1>,
    /// `[B_j(τ)]₂`, infinity entries removed.
    pub b2: Vec<G2>,
    /// Quotient powers `[τ^i·t(τ)/δ]₁`, `d − 1` entries.
    pub z: Vec<G1>,
    /// Private K column `[(β·A_j + α·B_j + C_j)(τ)/δ]₁`.
    pub k: Vec<G1>,
    /// Mask over the original `a` array: `true` where an infinity sat.
    pub infinity_a: Vec<bool>,
    /// Mask over the original `b` arrays.
    pub infinity_b: Vec<bool>,
    /// Number of filtered `a` entries.
    pub n_infinity_a: u64,
    /// Number of filtered `b` entries.
    pub n_infinity_b: u64,
    /// Pedersen commitment keys (empty without marked wires).
    pub pedersen: Vec<PedersenProvingKey>,
}

/// Groth16 verifying key.
pub struct VerifyingKey {
    /// `[α]₁`.
    pub alpha_g1: G1,
    /// `[β]₂`.
    pub beta_g2: G2,
    /// `[γ]₂` — the canonical G2 generator.
    pub gamma_g2: G2,
    /// `[δ]₂`.
    pub delta_g2: G2,
    /// Public K column (γ = 1), one entry per public wire.
    pub k: Vec<G1>,
    /// Pedersen verifying key, present when CKK is non-empty.
    pub pedersen: Option<PedersenVerifyingKey>,
}

// ------------------------- Infinity filtering -------------------------

/// Split the infinity entries out of a G1 array: returns the filtered
/// array, the position mask (original length), and the filtered count.
pub fn filter_infinity_g1(points: &[G1]) -> (Vec<G1>, Vec<bool>, u64) {
    let mut mask = vec![false; points.len()];
    let mut filtered = Vec::with_capacity(points.len());
    for (i, p) in points.iter().enumerate() {
        if p.is_zero() {
            mask[i] = true;
        } else {
            filtered.push(*p);
        }
    }
    let dropped = (points.len() - filtered.len()) as u64;
    (filtered, mask, dropped)
}

/// G2 variant of [`filter_infinity_g1`].
pub fn filter_infinity_g2(points: &[G2]) -> (Vec<G2>, Vec<bool>, u64) {
    let mut mask = vec![false; points.len()];
    let mut filtered = Vec::with_capacity(points.len());
    for (i, p) in points.iter().enumerate() {
        if p.is_zero() {
            mask[i] = true;
        } else {
            filtered.push(*p);
        }
    }
    let dropped = (points.len() - filtered.len()) as u64;
    (filtered, mask, dropped)
}

/// Rebuild the full-length array from a filtered array and its mask;
/// the inverse of [`filter_infinity_g1`].
pub fn reconstruct_g1(filtered: &[G1], mask: &[bool]) -> Vec<G1> {
    let mut out = Vec::with_capacity(mask.len());
    let mut next = 0usize;
    for &at_infinity in mask {
        if at_infinity {
            out.push(G1::zero());
        } else {
            out.push(filtered[next]);
            next += 1;
        }
    }
    out
}

/// G2 variant of [`reconstruct_g1`].
pub fn reconstruct_g2(filtered: &[G2], mask: &[bool]) -> Vec<G2> {
    let mut out = Vec::with_capacity(mask.len());
    let mut next = 0usize;
    for &at_infinity in mask {
        if at_infinity {
            out.push(G2::zero());
        } else {
            out.push(filtered[next]);
            next += 1;
        }
    }
    out
}

// ------------------------- Extraction -------------------------

/// Assemble both keys from the final Phase-2 transcript and the
/// evaluations file written at initialization, and write them to
/// `pk_path` / `vk_path`.
///
/// The evaluations file is named after the *initialization* output (see
/// [`crate::phase2::evals_path`]); contributions never rewrite it, so the
/// caller passes its path alongside whichever contribution file ended the
/// ceremony.
pub fn extract_keys(
    phase2_path: &Path,
    evals_file: &Path,
    pk_path: &Path,
    vk_path: &Path,
) -> Result<()> {
    let transcript = Phase2::read(phase2_path)?;
    let evals = Evals::read(evals_file)?;

    let wires = transcript.header.wires as usize;
    if evals.a.len() != wires || evals.b.len() != wires || evals.b2.len() != wires {
        return Err(SetupError::Consistency(
            "evaluations file does not match the transcript's wire count".into(),
        ));
    }
    if evals.vkk.len() != transcript.header.public as usize {
        return Err(SetupError::Consistency(
            "evaluations file does not match the transcript's public wire count".into(),
        ));
    }

    let (a, infinity_a, n_infinity_a) = filter_infinity_g1(&evals.a);
    let (b1, infinity_b, n_infinity_b) = filter_infinity_g1(&evals.b);
    // B's G2 image vanishes on exactly the wires where its G1 image does,
    // so the single B mask covers both arrays.
    let (b2, _, _) = filter_infinity_g2(&evals.b2);

    // The downstream prover consumes d − 1 quotient powers; the transcript
    // stores one more (an identity filler) that is dropped here.
    let d = transcript.header.domain as usize;
    let z = transcript.z[..d - 1].to_vec();

    // The Pedersen trapdoor is local to extraction: commitment binding does
    // not consume ceremony randomness.
    let (pedersen_pk, pedersen_vk) = if evals.ckk.is_empty() {
        (Vec::new(), None)
    } else {
        let sigma = Secret::random(&mut OsRng);
        let basis_exp_sigma: Vec<G1> = evals
            .ckk
            .iter()
            .map(|p| (*p * sigma.expose()).into_affine())
            .collect();
        let vk = PedersenVerifyingKey {
            g: G2::generator(),
            g_sigma: (G2::generator() * sigma.expose()).into_affine(),
        };
        (
            vec![PedersenProvingKey {
                basis: evals.ckk.clone(),
                basis_exp_sigma,
            }],
            Some(vk),
        )
    };

    let pk = ProvingKey {
        alpha_g1: evals.alpha_g1,
        beta_g1: evals.beta_g1,
        delta_g1: transcript.delta_g1,
        beta_g2: evals.beta_g2,
        delta_g2: transcript.delta_g2,
        a,
        b1,
        b2,
        z,
        k: transcript.pkk.clone(),
        infinity_a,
        infinity_b,
        n_infinity_a,
        n_infinity_b,
        pedersen: pedersen_pk,
    };
    let vk = VerifyingKey {
        alpha_g1: evals.alpha_g1,
        beta_g2: evals.beta_g2,
        gamma_g2: G2::generator(),
        delta_g2: transcript.delta_g2,
        k: evals.vkk.clone(),
        pedersen: pedersen_vk,
    };

    pk.write(pk_path)?;
    vk.write(vk_path)
}

// ------------------------- Serialization -------------------------

fn write_g1_vec_compressed(w: &mut impl Write, points: &[G1]) -> Result<()> {
    codec::write_u32(w, points.len() as u32)?;
    for p in points {
        codec::write_g1_compressed(w, p)?;
    }
    Ok(())
}

fn write_g2_vec_compressed(w: &mut impl Write, points: &[G2]) -> Result<()> {
    codec::write_u32(w, points.len() as u32)?;
    for p in points {
        codec::write_g2_compressed(w, p)?;
    }
    Ok(())
}

fn read_g1_vec_compressed(r: &mut impl Read) -> Result<Vec<G1>> {
    let len = codec::read_u32(r)? as usize;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        out.push(codec::read_g1_compressed(r)?);
    }
    Ok(out)
}

fn read_g2_vec_compressed(r: &mut impl Read) -> Result<Vec<G2>> {
    let len = codec::read_u32(r)? as usize;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        out.push(codec::read_g2_compressed(r)?);
    }
    Ok(out)
}

fn write_mask(w: &mut impl Write, mask: &[bool]) -> Result<()> {
    codec::write_u32(w, mask.len() as u32)?;
    for &b in mask {
        codec::write_u8(w, u8::from(b))?;
    }
    Ok(())
}

fn read_mask(r: &mut impl Read) -> Result<Vec<bool>> {
    let len = codec::read_u32(r)? as usize;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        out.push(match codec::read_u8(r)? {
            0 => false,
            1 => true,
            other => {
                return Err(SetupError::Decode(format!(
                    "invalid mask byte {other}"
                )))
            }
        });
    }
    Ok(out)
}

impl ProvingKey {
    /// Write the proving key file (compressed points).
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut w = AtomicFile::create(path)?;
        codec::write_g1_compressed(&mut w, &self.alpha_g1)?;
        codec::write_g1_compressed(&mut w, &self.beta_g1)?;
        codec::write_g1_compressed(&mut w, &self.delta_g1)?;
        codec::write_g2_compressed(&mut w, &self.beta_g2)?;
        codec::write_g2_compressed(&mut w, &self.delta_g2)?;
        write_g1_vec_compressed(&mut w, &self.a)?;
        write_g1_vec_compressed(&mut w, &self.b1)?;
        write_g2_vec_compressed(&mut w, &self.b2)?;
        write_g1_vec_compressed(&mut w, &self.z)?;
        write_g1_vec_compressed(&mut w, &self.k)?;
        write_mask(&mut w, &self.infinity_a)?;
        codec::write_u64(&mut w, self.n_infinity_a)?;
        write_mask(&mut w, &self.infinity_b)?;
        codec::write_u64(&mut w, self.n_infinity_b)?;
        codec::write_u32(&mut w, self.pedersen.len() as u32)?;
        for key in &self.pedersen {
            write_g1_vec_compressed(&mut w, &key.basis)?;
            write_g1_vec_compressed(&mut w, &key.basis_exp_sigma)?;
        }
        w.commit()
    }

    /// Read a proving key file.
    pub fn read(path: &Path) -> Result<Self> {
        let mut r = BufReader::new(File::open(path)?);
        let alpha_g1 = codec::read_g1_compressed(&mut r)?;
        let beta_g1 = codec::read_g1_compressed(&mut r)?;
        let delta_g1 = codec::read_g1_compressed(&mut r)?;
        let beta_g2 = codec::read_g2_compressed(&mut r)?;
        let delta_g2 = codec::read_g2_compressed(&mut r)?;
        let a = read_g1_vec_compressed(&mut r)?;
        let b1 = read_g1_vec_compressed(&mut r)?;
        let b2 = read_g2_vec_compressed(&mut r)?;
        let z = read_g1_vec_compressed(&mut r)?;
        let k = read_g1_vec_compressed(&mut r)?;
        let infinity_a = read_mask(&mut r)?;
        let n_infinity_a = codec::read_u64(&mut r)?;
        let infinity_b = read_mask(&mut r)?;
        let n_infinity_b = codec::read_u64(&mut r)?;
        let n_pedersen = codec::read_u32(&mut r)? as usize;
        let mut pedersen = Vec::with_capacity(n_pedersen);
        for _ in 0..n_pedersen {
            pedersen.push(PedersenProvingKey {
                basis: read_g1_vec_compressed(&mut r)?,
                basis_exp_sigma: read_g1_vec_compressed(&mut r)?,
            });
        }
        Ok(Self {
            alpha_g1,
            beta_g1,
            delta_g1,
            beta_g2,
            delta_g2,
            a,
            b1,
            b2,
            z,
            k,
            infinity_a,
            infinity_b,
            n_infinity_a,
            n_infinity_b,
            pedersen,
        })
    }
}

impl VerifyingKey {
    /// Write the verifying key file (compressed points).
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut w = AtomicFile::create(path)?;
        codec::write_g1_compressed(&mut w, &self.alpha_g1)?;
        codec::write_g2_compressed(&mut w, &self.beta_g2)?;
        codec::write_g2_compressed(&mut w, &self.gamma_g2)?;
        codec::write_g2_compressed(&mut w, &self.delta_g2)?;
        write_g1_vec_compressed(&mut w, &self.k)?;
        match &self.pedersen {
            None => codec::write_u32(&mut w, 0)?,
            Some(pvk) => {
                codec::write_u32(&mut w, 1)?;
                codec::write_g2_compressed(&mut w, &pvk.g)?;
                codec::write_g2_compressed(&mut w, &pvk.g_sigma)?;
            }
        }
        w.commit()
    }

    /// Read a verifying key file.
    pub fn read(path: &Path) -> Result<Self> {
        let mut r = BufReader::new(File::open(path)?);
        let alpha_g1 = codec::read_g1_compressed(&mut r)?;
        let beta_g2 = codec::read_g2_compressed(&mut r)?;
        let gamma_g2 = codec::read_g2_compressed(&mut r)?;
        let delta_g2 = codec::read_g2_compressed(&mut r)?;
        let k = read_g1_vec_compressed(&mut r)?;
        let pedersen = match codec::read_u32(&mut r)? {
            0 => None,
            1 => Some(PedersenVerifyingKey {
                g: codec::read_g2_compressed(&mut r)?,
                g_sigma: codec::read_g2_compressed(&mut r)?,
            }),
            other => {
                return Err(SetupError::Decode(format!(
                    "invalid Pedersen key count {other}"
                )))
            }
        };
        Ok(Self {
            alpha_g1,
            beta_g2,
            gamma_g2,
            delta_g2,
            k,
            pedersen,
        })
    }
}
