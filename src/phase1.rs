//! Phase 1 — the universal "powers of tau" transcript
//!
//! A Phase-1 transcript at power `p` (n = 2^p) carries the group powers
//!
//! ```text
//!   tau_g1       = [1, τ, τ², …, τ^{2n−2}]₁
//!   tau_g2       = [1, τ, τ², …, τ^{n−1}]₂
//!   alpha_tau_g1 = [α, ατ, …, ατ^{n−1}]₁
//!   beta_tau_g1  = [β, βτ, …, βτ^{n−1}]₁
//!   beta_g2      = [β]₂
//! ```
//!
//! of the accumulated secrets τ, α, β — products over every contribution
//! made so far. The G1 tau powers run to `2n−2` because the Groth16 H query
//! needs `τ^i·(τ^n − 1)` up to `i = n−2`.
//!
//! Contributions multiply fresh secrets in position-wise powers; each appends a
//! record carrying the new cumulative `[τ]₁`, `[α]₁`, `[β]₁`, `[β]₂`, one
//! proof-of-knowledge element per secret, and the extended chain hash.
//! History is append-only: a transcript never loses records.
//!
//! All file traversal is chunk-at-a-time; no operation materializes a full
//! vector except the explicit in-memory loader used by Phase-2
//! initialization (whose FFT needs the vectors resident anyway).

#![forbid(unsafe_code)]

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

use ark_bn254::{G1Projective, G2Projective};
use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::One;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use rayon::prelude::*;

use crate::batch::{same_ratio, AdjacentPairCombiner};
use crate::codec::{self, AtomicFile, InfinityPolicy, HASH_LEN};
use crate::domain::GeometricSeries;
use crate::error::{Result, SetupError};
use crate::pok::{self, Secret};
use crate::transcript::{self, ChainHasher, TAG_ALPHA, TAG_BETA, TAG_TAU};
use crate::{F, G1, G2, MAX_POWER};

/// Byte length of the fixed file header (`u8` power + `u32` record count).
const HEADER_LEN: u64 = 5;

// ------------------------- Header & records -------------------------

/// Phase-1 file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Ceremony power `p`; vectors are sized from `n = 2^p`.
    pub power: u8,
    /// Number of contribution records appended so far.
    pub contributions: u32,
}

impl Header {
    /// `n = 2^p`.
    pub fn n(&self) -> usize {
        1usize << self.power
    }

    /// Length of the G1 tau-power vector (`2n − 1`).
    pub fn tau_g1_len(&self) -> usize {
        2 * self.n() - 1
    }

    /// Byte length of the vector body between header and records.
    fn vectors_byte_len(&self) -> u64 {
        let n = self.n() as u64;
        (2 * n - 1) * codec::G1_RAW_LEN as u64      // tau_g1
            + n * codec::G2_RAW_LEN as u64          // tau_g2
            + n * codec::G1_RAW_LEN as u64          // alpha_tau_g1
            + n * codec::G1_RAW_LEN as u64          // beta_tau_g1
            + codec::G2_RAW_LEN as u64              // beta_g2
    }

    fn write(&self, w: &mut impl Write) -> Result<()> {
        codec::write_u8(w, self.power)?;
        codec::write_u32(w, self.contributions)
    }

    fn read(r: &mut impl Read) -> Result<Self> {
        let power = codec::read_u8(r)?;
        let contributions = codec::read_u32(r)?;
        if power < 1 || power > MAX_POWER {
            return Err(SetupError::Decode(format!(
                "header power {power} outside the supported range 1..={MAX_POWER}"
            )));
        }
        Ok(Self {
            power,
            contributions,
        })
    }
}

/// One contribution record: the cumulative public secrets after the update,
/// the proof-of-knowledge elements, and the extended chain hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contribution {
    /// Cumulative `[τ]₁` after this contribution.
    pub tau_g1: G1,
    /// Cumulative `[α]₁`.
    pub alpha_g1: G1,
    /// Cumulative `[β]₁`.
    pub beta_g1: G1,
    /// Cumulative `[β]₂`.
    pub beta_g2: G2,
    /// Proof element `s_τ·G_s` for the τ update.
    pub pok_tau: G2,
    /// Proof element for the α update.
    pub pok_alpha: G2,
    /// Proof element for the β update.
    pub pok_beta: G2,
    /// Chain hash through this record.
    pub hash: [u8; HASH_LEN],
}

impl Contribution {
    fn write(&self, w: &mut impl Write) -> Result<()> {
        codec::write_g1(w, &self.tau_g1)?;
        codec::write_g1(w, &self.alpha_g1)?;
        codec::write_g1(w, &self.beta_g1)?;
        codec::write_g2(w, &self.beta_g2)?;
        codec::write_g2(w, &self.pok_tau)?;
        codec::write_g2(w, &self.pok_alpha)?;
        codec::write_g2(w, &self.pok_beta)?;
        w.write_all(&self.hash)?;
        Ok(())
    }

    fn read(r: &mut impl Read) -> Result<Self> {
        Ok(Self {
            tau_g1: codec::read_g1(r, InfinityPolicy::Reject)?,
            alpha_g1: codec::read_g1(r, InfinityPolicy::Reject)?,
            beta_g1: codec::read_g1(r, InfinityPolicy::Reject)?,
            beta_g2: codec::read_g2(r, InfinityPolicy::Reject)?,
            pok_tau: codec::read_g2(r, InfinityPolicy::Reject)?,
            pok_alpha: codec::read_g2(r, InfinityPolicy::Reject)?,
            pok_beta: codec::read_g2(r, InfinityPolicy::Reject)?,
            hash: codec::read_hash(r)?,
        })
    }

    /// Recompute the chain hash this record should carry given the previous
    /// chain value.
    pub fn chain_hash(&self, prev: &[u8; HASH_LEN]) -> [u8; HASH_LEN] {
        let mut h = ChainHasher::begin(prev);
        h.absorb_g1(&self.tau_g1);
        h.absorb_g1(&self.alpha_g1);
        h.absorb_g1(&self.beta_g1);
        h.absorb_g2(&self.beta_g2);
        h.absorb_g2(&self.pok_tau);
        h.absorb_g2(&self.pok_alpha);
        h.absorb_g2(&self.pok_beta);
        h.finish()
    }
}

/// The cumulative public values a record chain ends at; generators before
/// any contribution.
#[derive(Debug, Clone, Copy)]
struct Cumulative {
    tau_g1: G1,
    alpha_g1: G1,
    beta_g1: G1,
    beta_g2: G2,
}

impl Cumulative {
    fn untouched() -> Self {
        Self {
            tau_g1: G1::generator(),
            alpha_g1: G1::generator(),
            beta_g1: G1::generator(),
            beta_g2: G2::generator(),
        }
    }

    fn from_record(c: &Contribution) -> Self {
        Self {
            tau_g1: c.tau_g1,
            alpha_g1: c.alpha_g1,
            beta_g1: c.beta_g1,
            beta_g2: c.beta_g2,
        }
    }
}

/// Replay the record chain: hash linkage only (cheap, no pairings).
///
/// Returns the records, the final chain value, and the final cumulative
/// public values. Used by `contribute`, which must refuse to extend a
/// corrupted file; the pairing-level checks belong to `verify`.
fn replay_records(
    r: &mut impl Read,
    header: &Header,
) -> Result<(Vec<Contribution>, [u8; HASH_LEN], Cumulative)> {
    let mut prev = transcript::phase1_genesis(header.power);
    let mut cumulative = Cumulative::untouched();
    let mut records = Vec::with_capacity(header.contributions as usize);
    for k in 0..header.contributions {
        let rec = Contribution::read(r)?;
        if rec.chain_hash(&prev) != rec.hash {
            return Err(SetupError::Consistency(format!(
                "transcript hash chain breaks at contribution {k}"
            )));
        }
        prev = rec.hash;
        cumulative = Cumulative::from_record(&rec);
        records.push(rec);
    }
    Ok((records, prev, cumulative))
}

// ------------------------- In-memory loader -------------------------

/// A fully materialized Phase-1 transcript.
///
/// Only Phase-2 initialization and tests load transcripts whole; the
/// ceremony operations in this module stream instead.
pub struct Phase1 {
    /// File header.
    pub header: Header,
    /// `[τ^i]₁`, `2n − 1` entries.
    pub tau_g1: Vec<G1>,
    /// `[τ^i]₂`, `n` entries.
    pub tau_g2: Vec<G2>,
    /// `[α·τ^i]₁`, `n` entries.
    pub alpha_tau_g1: Vec<G1>,
    /// `[β·τ^i]₁`, `n` entries.
    pub beta_tau_g1: Vec<G1>,
    /// `[β]₂`.
    pub beta_g2: G2,
    /// Contribution history.
    pub contributions: Vec<Contribution>,
}

impl Phase1 {
    /// Read and validate a whole transcript file.
    pub fn read(path: &Path) -> Result<Self> {
        let mut r = BufReader::new(File::open(path)?);
        let header = Header::read(&mut r)?;
        let n = header.n();
        let tau_g1 = codec::read_g1_vec(&mut r, 2 * n - 1, InfinityPolicy::Reject)?;
        let tau_g2 = codec::read_g2_vec(&mut r, n, InfinityPolicy::Reject)?;
        let alpha_tau_g1 = codec::read_g1_vec(&mut r, n, InfinityPolicy::Reject)?;
        let beta_tau_g1 = codec::read_g1_vec(&mut r, n, InfinityPolicy::Reject)?;
        let beta_g2 = codec::read_g2(&mut r, InfinityPolicy::Reject)?;
        let (contributions, _, _) = replay_records(&mut r, &header)?;
        Ok(Self {
            header,
            tau_g1,
            tau_g2,
            alpha_tau_g1,
            beta_tau_g1,
            beta_g2,
            contributions,
        })
    }

    /// Final chain value (genesis if no contribution was made yet).
    pub fn final_hash(&self) -> [u8; HASH_LEN] {
        self.contributions
            .last()
            .map(|c| c.hash)
            .unwrap_or_else(|| transcript::phase1_genesis(self.header.power))
    }
}

// ------------------------- Initialize -------------------------

/// Write the canonical untouched transcript at `power`: every vector entry
/// is the group generator (τ = α = β = 1), no contributions.
pub fn initialize(power: u8, path: &Path) -> Result<()> {
    if power < 1 || power > MAX_POWER {
        return Err(SetupError::InvalidArgument(format!(
            "power must be between 1 and {MAX_POWER}, got {power}"
        )));
    }
    let header = Header {
        power,
        contributions: 0,
    };
    let n = header.n();

    // All entries are identical, so serialize each generator once and
    // repeat the bytes.
    let mut g1_raw = Vec::with_capacity(codec::G1_RAW_LEN);
    codec::write_g1(&mut g1_raw, &G1::generator())?;
    let mut g2_raw = Vec::with_capacity(codec::G2_RAW_LEN);
    codec::write_g2(&mut g2_raw, &G2::generator())?;

    let mut out = AtomicFile::create(path)?;
    header.write(&mut out)?;
    for _ in 0..2 * n - 1 {
        out.write_all(&g1_raw)?; // tau_g1
    }
    for _ in 0..n {
        out.write_all(&g2_raw)?; // tau_g2
    }
    for _ in 0..2 * n {
        out.write_all(&g1_raw)?; // alpha_tau_g1 then beta_tau_g1
    }
    out.write_all(&g2_raw)?; // beta_g2
    out.commit()
}

// ------------------------- Contribute -------------------------

/// Contribute to a transcript using the operating-system RNG.
pub fn contribute(input: &Path, output: &Path) -> Result<()> {
    contribute_with_rng(input, output, &mut OsRng)
}

/// Contribute with a caller-supplied cryptographic RNG.
///
/// Secrets are sampled in the order τ, α, β, used to scale the vectors
/// position-wise, proven with PoKs bound to the pre-update chain value, and
/// scrubbed before returning on every path.
pub fn contribute_with_rng<R: RngCore + CryptoRng>(
    input: &Path,
    output: &Path,
    rng: &mut R,
) -> Result<()> {
    let mut reader = BufReader::new(File::open(input)?);
    let header = Header::read(&mut reader)?;
    let n = header.n();

    // Pass 1: jump over the vectors and replay the record chain.
    reader.seek(SeekFrom::Start(HEADER_LEN + header.vectors_byte_len()))?;
    let (records, prev_hash, _) = replay_records(&mut reader, &header)?;

    let tau = Secret::random(rng);
    let alpha = Secret::random(rng);
    let beta = Secret::random(rng);

    let mut out = AtomicFile::create(output)?;
    Header {
        power: header.power,
        contributions: header.contributions + 1,
    }
    .write(&mut out)?;

    // Pass 2: stream-scale the vectors into the output, capturing the new
    // cumulative public values as index 1 (tau) / index 0 (alpha, beta) go by.
    reader.seek(SeekFrom::Start(HEADER_LEN))?;

    let mut new_tau_g1 = None;
    let mut series = GeometricSeries::new(F::one(), *tau.expose());
    codec::for_each_g1_chunk(&mut reader, 2 * n - 1, InfinityPolicy::Reject, |start, chunk| {
        let scaled = scale_g1_chunk(chunk, &series.take(chunk.len()));
        if start == 0 {
            new_tau_g1 = Some(scaled[1]);
        }
        codec::write_g1_slice(&mut out, &scaled)
    })?;

    let mut series = GeometricSeries::new(F::one(), *tau.expose());
    codec::for_each_g2_chunk(&mut reader, n, InfinityPolicy::Reject, |_, chunk| {
        let scaled = scale_g2_chunk(chunk, &series.take(chunk.len()));
        codec::write_g2_slice(&mut out, &scaled)
    })?;

    let mut new_alpha_g1 = None;
    let mut series = GeometricSeries::new(*alpha.expose(), *tau.expose());
    codec::for_each_g1_chunk(&mut reader, n, InfinityPolicy::Reject, |start, chunk| {
        let scaled = scale_g1_chunk(chunk, &series.take(chunk.len()));
        if start == 0 {
            new_alpha_g1 = Some(scaled[0]);
        }
        codec::write_g1_slice(&mut out, &scaled)
    })?;

    let mut new_beta_g1 = None;
    let mut series = GeometricSeries::new(*beta.expose(), *tau.expose());
    codec::for_each_g1_chunk(&mut reader, n, InfinityPolicy::Reject, |start, chunk| {
        let scaled = scale_g1_chunk(chunk, &series.take(chunk.len()));
        if start == 0 {
            new_beta_g1 = Some(scaled[0]);
        }
        codec::write_g1_slice(&mut out, &scaled)
    })?;

    let old_beta_g2 = codec::read_g2(&mut reader, InfinityPolicy::Reject)?;
    let new_beta_g2 = (old_beta_g2 * beta.expose()).into_affine();
    codec::write_g2(&mut out, &new_beta_g2)?;

    // Record: PoKs are bound to the chain value *before* this contribution.
    let mut record = Contribution {
        tau_g1: new_tau_g1.expect("first tau chunk always holds index 1"),
        alpha_g1: new_alpha_g1.expect("first alpha chunk always holds index 0"),
        beta_g1: new_beta_g1.expect("first beta chunk always holds index 0"),
        beta_g2: new_beta_g2,
        pok_tau: pok::prove(&tau, &prev_hash, TAG_TAU),
        pok_alpha: pok::prove(&alpha, &prev_hash, TAG_ALPHA),
        pok_beta: pok::prove(&beta, &prev_hash, TAG_BETA),
        hash: [0u8; HASH_LEN],
    };
    record.hash = record.chain_hash(&prev_hash);

    for rec in &records {
        rec.write(&mut out)?;
    }
    record.write(&mut out)?;
    out.commit()
}

fn scale_g1_chunk(points: &[G1], scalars: &[F]) -> Vec<G1> {
    let scaled: Vec<G1Projective> = points
        .par_iter()
        .zip(scalars.par_iter())
        .map(|(p, s)| *p * s)
        .collect();
    G1Projective::normalize_batch(&scaled)
}

fn scale_g2_chunk(points: &[G2], scalars: &[F]) -> Vec<G2> {
    let scaled: Vec<G2Projective> = points
        .par_iter()
        .zip(scalars.par_iter())
        .map(|(p, s)| *p * s)
        .collect();
    G2Projective::normalize_batch(&scaled)
}

// ------------------------- Verify -------------------------

/// Standalone verification of a transcript file.
///
/// Replays the record chain (hash linkage, proofs of knowledge, and the
/// per-record `[β]₁ / [β]₂` agreement), then streams the vectors once to
/// run the batched powers-of-tau consistency checks:
///
/// 1. `tau_g1` is a geometric progression with the ratio committed in
///    `tau_g2[1]` (random linear combination over adjacent pairs).
/// 2. `tau_g2` advances by the same τ (combination checked from the G1 side).
/// 3. `alpha_tau_g1` and `beta_tau_g1` advance by τ as well, anchored at
///    index 0 by the last record's cumulative `[α]₁` / `[β]₁`.
/// 4. `e(beta_tau_g1[0], [1]₂) == e([1]₁, beta_g2)`.
pub fn verify(path: &Path) -> Result<()> {
    let mut reader = BufReader::new(File::open(path)?);
    let header = Header::read(&mut reader)?;
    let n = header.n();

    // Record chain first: it is cheap and yields the challenge source.
    reader.seek(SeekFrom::Start(HEADER_LEN + header.vectors_byte_len()))?;
    let (records, final_hash, cumulative) = verify_record_chain(&mut reader, &header)?;
    let mut probe = [0u8; 1];
    if reader.read(&mut probe)? != 0 {
        return Err(SetupError::Decode(
            "trailing bytes after the last contribution record".into(),
        ));
    }
    drop(records);

    // Challenge scalars for the four batched checks, all derived from the
    // final chain value.
    let r_tau_g1 = transcript::challenge_scalars(&final_hash, b"rlc/tau-g1", 2 * n - 2);
    let r_tau_g2 = transcript::challenge_scalars(&final_hash, b"rlc/tau-g2", n - 1);
    let r_alpha = transcript::challenge_scalars(&final_hash, b"rlc/alpha-tau-g1", n - 1);
    let r_beta = transcript::challenge_scalars(&final_hash, b"rlc/beta-tau-g1", n - 1);

    // Single streaming pass over the vectors.
    reader.seek(SeekFrom::Start(HEADER_LEN))?;

    let mut tau_g1_head: [Option<G1>; 2] = [None, None];
    let mut comb_tau_g1 = AdjacentPairCombiner::<G1Projective>::new(2 * n - 1, r_tau_g1);
    codec::for_each_g1_chunk(&mut reader, 2 * n - 1, InfinityPolicy::Reject, |start, chunk| {
        if start == 0 {
            tau_g1_head = [Some(chunk[0]), Some(chunk[1])];
        }
        comb_tau_g1.feed(start, chunk);
        Ok(())
    })?;
    let (tau_g1_0, tau_g1_1) = (
        tau_g1_head[0].expect("nonempty vector"),
        tau_g1_head[1].expect("vector has at least two entries"),
    );

    let mut tau_g2_head: [Option<G2>; 2] = [None, None];
    let mut comb_tau_g2 = AdjacentPairCombiner::<G2Projective>::new(n, r_tau_g2);
    codec::for_each_g2_chunk(&mut reader, n, InfinityPolicy::Reject, |start, chunk| {
        if start == 0 {
            tau_g2_head = [Some(chunk[0]), Some(chunk[1])];
        }
        comb_tau_g2.feed(start, chunk);
        Ok(())
    })?;
    let (tau_g2_0, tau_g2_1) = (
        tau_g2_head[0].expect("nonempty vector"),
        tau_g2_head[1].expect("vector has at least two entries"),
    );

    let mut alpha_0 = None;
    let mut comb_alpha = AdjacentPairCombiner::<G1Projective>::new(n, r_alpha);
    codec::for_each_g1_chunk(&mut reader, n, InfinityPolicy::Reject, |start, chunk| {
        if start == 0 {
            alpha_0 = Some(chunk[0]);
        }
        comb_alpha.feed(start, chunk);
        Ok(())
    })?;
    let alpha_0 = alpha_0.expect("nonempty vector");

    let mut beta_0 = None;
    let mut comb_beta = AdjacentPairCombiner::<G1Projective>::new(n, r_beta);
    codec::for_each_g1_chunk(&mut reader, n, InfinityPolicy::Reject, |start, chunk| {
        if start == 0 {
            beta_0 = Some(chunk[0]);
        }
        comb_beta.feed(start, chunk);
        Ok(())
    })?;
    let beta_0 = beta_0.expect("nonempty vector");

    let beta_g2 = codec::read_g2(&mut reader, InfinityPolicy::Reject)?;

    // Anchors: vector heads must match the generators and the last record's
    // cumulative values.
    if tau_g1_0 != G1::generator() || tau_g2_0 != G2::generator() {
        return Err(SetupError::Consistency(
            "index-0 powers must be the group generators".into(),
        ));
    }
    if tau_g1_1 != cumulative.tau_g1 {
        return Err(SetupError::Consistency(
            "tau_g1[1] does not match the last contribution's cumulative [τ]₁".into(),
        ));
    }
    if alpha_0 != cumulative.alpha_g1 {
        return Err(SetupError::Consistency(
            "alpha_tau_g1[0] does not match the last contribution's cumulative [α]₁".into(),
        ));
    }
    if beta_0 != cumulative.beta_g1 {
        return Err(SetupError::Consistency(
            "beta_tau_g1[0] does not match the last contribution's cumulative [β]₁".into(),
        ));
    }
    if beta_g2 != cumulative.beta_g2 {
        return Err(SetupError::Consistency(
            "beta_g2 does not match the last contribution's cumulative [β]₂".into(),
        ));
    }

    // Batched ratio checks.
    let (l, r) = comb_tau_g1.finish();
    if !same_ratio((l, r), (tau_g2_0, tau_g2_1)) {
        return Err(SetupError::Consistency(
            "tau_g1 is not a geometric progression in τ".into(),
        ));
    }
    let (l2, r2) = comb_tau_g2.finish();
    if !same_ratio((tau_g1_0, tau_g1_1), (l2, r2)) {
        return Err(SetupError::Consistency(
            "tau_g2 is not a geometric progression in τ".into(),
        ));
    }
    let (l, r) = comb_alpha.finish();
    if !same_ratio((l, r), (tau_g2_0, tau_g2_1)) {
        return Err(SetupError::Consistency(
            "alpha_tau_g1 is not a geometric progression in τ".into(),
        ));
    }
    let (l, r) = comb_beta.finish();
    if !same_ratio((l, r), (tau_g2_0, tau_g2_1)) {
        return Err(SetupError::Consistency(
            "beta_tau_g1 is not a geometric progression in τ".into(),
        ));
    }
    if !same_ratio((G1::generator(), beta_0), (G2::generator(), beta_g2)) {
        return Err(SetupError::Consistency(
            "beta_tau_g1[0] and beta_g2 disagree on β".into(),
        ));
    }

    Ok(())
}

/// Replay the record chain with full cryptographic checks: hash linkage,
/// the three proofs of knowledge per record, and `[β]₁ / [β]₂` agreement.
fn verify_record_chain(
    r: &mut impl Read,
    header: &Header,
) -> Result<(Vec<Contribution>, [u8; HASH_LEN], Cumulative)> {
    let mut prev_hash = transcript::phase1_genesis(header.power);
    let mut cumulative = Cumulative::untouched();
    let mut records = Vec::with_capacity(header.contributions as usize);
    for k in 0..header.contributions {
        let rec = Contribution::read(r)?;

        pok::verify_update(
            &cumulative.tau_g1,
            &rec.tau_g1,
            &rec.pok_tau,
            &prev_hash,
            TAG_TAU,
            &format!("tau (contribution {k})"),
        )?;
        pok::verify_update(
            &cumulative.alpha_g1,
            &rec.alpha_g1,
            &rec.pok_alpha,
            &prev_hash,
            TAG_ALPHA,
            &format!("alpha (contribution {k})"),
        )?;
        pok::verify_update(
            &cumulative.beta_g1,
            &rec.beta_g1,
            &rec.pok_beta,
            &prev_hash,
            TAG_BETA,
            &format!("beta (contribution {k})"),
        )?;
        if !same_ratio(
            (G1::generator(), rec.beta_g1),
            (G2::generator(), rec.beta_g2),
        ) {
            return Err(SetupError::Consistency(format!(
                "contribution {k}: [β]₁ and [β]₂ disagree"
            )));
        }
        if rec.chain_hash(&prev_hash) != rec.hash {
            return Err(SetupError::Consistency(format!(
                "transcript hash chain breaks at contribution {k}"
            )));
        }

        prev_hash = rec.hash;
        cumulative = Cumulative::from_record(&rec);
        records.push(rec);
    }
    Ok((records, prev_hash, cumulative))
}

// ------------------------- Transform -------------------------

/// Truncate a transcript from `in_power` down to `out_power`, preserving
/// the full contribution history and its hash chain.
pub fn transform(input: &Path, output: &Path, in_power: u8, out_power: u8) -> Result<()> {
    if out_power > in_power {
        return Err(SetupError::UpscaleForbidden {
            from: in_power,
            to: out_power,
        });
    }
    if out_power < 1 {
        return Err(SetupError::InvalidArgument(
            "output power must be at least 1".into(),
        ));
    }

    let mut reader = BufReader::new(File::open(input)?);
    let header = Header::read(&mut reader)?;
    if header.power != in_power {
        return Err(SetupError::InvalidArgument(format!(
            "input transcript has power {}, not the declared {in_power}",
            header.power
        )));
    }
    let n = header.n();
    let m = 1usize << out_power;

    let mut out = AtomicFile::create(output)?;
    Header {
        power: out_power,
        contributions: header.contributions,
    }
    .write(&mut out)?;

    copy_g1_prefix(&mut reader, &mut out, 2 * m - 1, (2 * n - 1) - (2 * m - 1))?;
    copy_g2_prefix(&mut reader, &mut out, m, n - m)?;
    copy_g1_prefix(&mut reader, &mut out, m, n - m)?; // alpha_tau_g1
    copy_g1_prefix(&mut reader, &mut out, m, n - m)?; // beta_tau_g1
    let beta_g2 = codec::read_g2(&mut reader, InfinityPolicy::Reject)?;
    codec::write_g2(&mut out, &beta_g2)?;

    for _ in 0..header.contributions {
        Contribution::read(&mut reader)?.write(&mut out)?;
    }
    out.commit()
}

fn copy_g1_prefix(
    r: &mut BufReader<File>,
    w: &mut impl Write,
    take: usize,
    skip: usize,
) -> Result<()> {
    codec::for_each_g1_chunk(r, take, InfinityPolicy::Reject, |_, chunk| {
        codec::write_g1_slice(w, chunk)
    })?;
    r.seek_relative((skip * codec::G1_RAW_LEN) as i64)?;
    Ok(())
}

fn copy_g2_prefix(
    r: &mut BufReader<File>,
    w: &mut impl Write,
    take: usize,
    skip: usize,
) -> Result<()> {
    codec::for_each_g2_chunk(r, take, InfinityPolicy::Reject, |_, chunk| {
        codec::write_g2_slice(w, chunk)
    })?;
    r.seek_relative((skip * codec::G2_RAW_LEN) as i64)?;
    Ok(())
}

/// Verify `transformed` as a prefix-in-power truncation of `original`.
///
/// `original` is verified standalone first; the pair check then asserts
/// the truncated vectors are element-wise prefixes and the contribution
/// history is identical.
pub fn verify_transformed(original: &Path, transformed: &Path) -> Result<()> {
    verify(original)?;

    let mut orig = BufReader::new(File::open(original)?);
    let mut trans = BufReader::new(File::open(transformed)?);
    let orig_header = Header::read(&mut orig)?;
    let trans_header = Header::read(&mut trans)?;

    if trans_header.power > orig_header.power {
        return Err(SetupError::Consistency(
            "transformed transcript has a larger power than its original".into(),
        ));
    }
    if trans_header.contributions != orig_header.contributions {
        return Err(SetupError::Consistency(
            "transformed transcript does not carry the same contribution count".into(),
        ));
    }

    let n = orig_header.n();
    let m = trans_header.n();

    compare_g1_prefix(&mut orig, &mut trans, 2 * m - 1, "tau_g1")?;
    orig.seek_relative((((2 * n - 1) - (2 * m - 1)) * codec::G1_RAW_LEN) as i64)?;
    compare_g2_prefix(&mut orig, &mut trans, m, "tau_g2")?;
    orig.seek_relative(((n - m) * codec::G2_RAW_LEN) as i64)?;
    compare_g1_prefix(&mut orig, &mut trans, m, "alpha_tau_g1")?;
    orig.seek_relative(((n - m) * codec::G1_RAW_LEN) as i64)?;
    compare_g1_prefix(&mut orig, &mut trans, m, "beta_tau_g1")?;
    orig.seek_relative(((n - m) * codec::G1_RAW_LEN) as i64)?;

    let beta_orig = codec::read_g2(&mut orig, InfinityPolicy::Reject)?;
    let beta_trans = codec::read_g2(&mut trans, InfinityPolicy::Reject)?;
    if beta_orig != beta_trans {
        return Err(SetupError::Consistency(
            "transformed transcript altered beta_g2".into(),
        ));
    }

    for k in 0..orig_header.contributions {
        let a = Contribution::read(&mut orig)?;
        let b = Contribution::read(&mut trans)?;
        if a != b {
            return Err(SetupError::Consistency(format!(
                "transformed transcript altered contribution record {k}"
            )));
        }
    }
    Ok(())
}

fn compare_g1_prefix(
    a: &mut BufReader<File>,
    b: &mut BufReader<File>,
    count: usize,
    what: &str,
) -> Result<()> {
    for i in 0..count {
        let pa = codec::read_g1(a, InfinityPolicy::Reject)?;
        let pb = codec::read_g1(b, InfinityPolicy::Reject)?;
        if pa != pb {
            return Err(SetupError::Consistency(format!(
                "{what}[{i}] differs between original and transformed transcript"
            )));
        }
    }
    Ok(())
}

fn compare_g2_prefix(
    a: &mut BufReader<File>,
    b: &mut BufReader<File>,
    count: usize,
    what: &str,
) -> Result<()> {
    for i in 0..count {
        let pa = codec::read_g2(a, InfinityPolicy::Reject)?;
        let pb = codec::read_g2(b, InfinityPolicy::Reject)?;
        if pa != pb {
            return Err(SetupError::Consistency(format!(
                "{what}[{i}] differs between original and transformed transcript"
            )));
        }
    }
    Ok(())
}
