//! Group-element encodings & streaming file I/O
//!
//! This module centralizes the on-disk encoding discipline shared by both
//! ceremony phases:
//!   - **raw** (uncompressed) point encodings used inside transcripts:
//!     64 bytes for G1 (X‖Y), 128 bytes for G2, infinity flagged in the
//!     trailing byte of the canonical arkworks layout,
//!   - **compressed** encodings (32/64 bytes) used by the extracted keys,
//!   - little-endian integer fields for headers and length prefixes,
//!   - chunk-at-a-time vector traversal so multi-gigabyte transcripts are
//!     never resident in memory,
//!   - an atomic output file that becomes visible only on [`AtomicFile::commit`].
//!
//! Every deserialized point is validated (on-curve and prime-order-subgroup)
//! before it reaches any ceremony logic; callers choose per vector whether
//! the point at infinity is a legal value. Decoding failures and validation
//! failures surface as distinct error kinds so a coordinator can tell a
//! truncated file from a forged point.

#![forbid(unsafe_code)]

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use ark_serialize::{CanonicalDeserialize, CanonicalSerialize, SerializationError};

use crate::error::{Result, SetupError};
use crate::{G1, G2};

/// Raw (uncompressed) G1 byte length: X‖Y over Fp.
pub const G1_RAW_LEN: usize = 64;
/// Raw (uncompressed) G2 byte length: X‖Y over Fp².
pub const G2_RAW_LEN: usize = 128;
/// Compressed G1 byte length (X plus sign/infinity flags).
pub const G1_COMPRESSED_LEN: usize = 32;
/// Compressed G2 byte length.
pub const G2_COMPRESSED_LEN: usize = 64;
/// Keccak-256 digest length used throughout the transcript chain.
pub const HASH_LEN: usize = 32;

/// Points per streamed chunk. At 64 raw bytes per G1 element this bounds a
/// chunk to 4 MiB of G1 data, keeping the live working set flat regardless
/// of the transcript power.
pub const CHUNK_POINTS: usize = 1 << 16;

/// Whether a vector position may legally hold the point at infinity.
///
/// Phase-1 power vectors never contain the identity (secrets are sampled
/// nonzero over generator-seeded vectors), so their reader rejects it as a
/// forged encoding. Phase-2 `z`/`pkk` vectors and the evaluation arrays may
/// contain it (unused wires evaluate to the identity).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InfinityPolicy {
    /// The identity is a legal vector entry.
    Allow,
    /// The identity is rejected with a `Curve` error.
    Reject,
}

/// `read_exact` that reports end-of-file as a truncation (`Decode`) rather
/// than a plain I/O failure; other I/O errors pass through with their cause.
fn read_exact_or_truncated(r: &mut impl Read, buf: &mut [u8], what: &str) -> Result<()> {
    r.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            SetupError::Decode(format!("truncated {what}"))
        } else {
            SetupError::Io(e)
        }
    })
}

#[inline]
fn decode_err(context: &str, e: SerializationError) -> SetupError {
    match e {
        SerializationError::IoError(io) => SetupError::Io(io),
        other => SetupError::Decode(format!("{context}: {other}")),
    }
}

#[inline]
fn write_err(e: SerializationError) -> SetupError {
    match e {
        SerializationError::IoError(io) => SetupError::Io(io),
        other => SetupError::Decode(format!("serialization failed: {other}")),
    }
}

// ------------------------- Integers -------------------------

/// Write a `u8`.
pub fn write_u8(w: &mut impl Write, v: u8) -> Result<()> {
    w.write_all(&[v])?;
    Ok(())
}

/// Read a `u8`.
pub fn read_u8(r: &mut impl Read) -> Result<u8> {
    let mut buf = [0u8; 1];
    read_exact_or_truncated(r, &mut buf, "byte field")?;
    Ok(buf[0])
}

/// Write a little-endian `u32`.
pub fn write_u32(w: &mut impl Write, v: u32) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Read a little-endian `u32`.
pub fn read_u32(r: &mut impl Read) -> Result<u32> {
    let mut buf = [0u8; 4];
    read_exact_or_truncated(r, &mut buf, "u32 field")?;
    Ok(u32::from_le_bytes(buf))
}

/// Write a little-endian `u64`.
pub fn write_u64(w: &mut impl Write, v: u64) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Read a little-endian `u64`.
pub fn read_u64(r: &mut impl Read) -> Result<u64> {
    let mut buf = [0u8; 8];
    read_exact_or_truncated(r, &mut buf, "u64 field")?;
    Ok(u64::from_le_bytes(buf))
}

/// Read a 32-byte transcript hash.
pub fn read_hash(r: &mut impl Read) -> Result<[u8; HASH_LEN]> {
    let mut buf = [0u8; HASH_LEN];
    read_exact_or_truncated(r, &mut buf, "transcript hash")?;
    Ok(buf)
}

// ------------------------- Point validation -------------------------

/// Check a G1 element: on-curve and in the prime-order subgroup.
///
/// The identity passes (it is the additive identity, not a forgery); use
/// [`InfinityPolicy::Reject`] at the call sites where it cannot occur.
pub fn validate_g1(p: &G1) -> Result<()> {
    use ark_ec::AffineRepr;
    if p.is_zero() {
        return Ok(());
    }
    if !p.is_on_curve() {
        return Err(SetupError::Curve("G1 point is not on the curve".into()));
    }
    if !p.is_in_correct_subgroup_assuming_on_curve() {
        return Err(SetupError::Curve(
            "G1 point is not in the prime-order subgroup".into(),
        ));
    }
    Ok(())
}

/// Check a G2 element: on-curve and in the prime-order subgroup.
pub fn validate_g2(p: &G2) -> Result<()> {
    use ark_ec::AffineRepr;
    if p.is_zero() {
        return Ok(());
    }
    if !p.is_on_curve() {
        return Err(SetupError::Curve("G2 point is not on the curve".into()));
    }
    if !p.is_in_correct_subgroup_assuming_on_curve() {
        return Err(SetupError::Curve(
            "G2 point is not in the prime-order subgroup".into(),
        ));
    }
    Ok(())
}

// ------------------------- Raw points -------------------------

/// Write one G1 element in raw (uncompressed) form.
pub fn write_g1(w: &mut impl Write, p: &G1) -> Result<()> {
    p.serialize_uncompressed(&mut *w).map_err(write_err)
}

/// Write one G2 element in raw (uncompressed) form.
pub fn write_g2(w: &mut impl Write, p: &G2) -> Result<()> {
    p.serialize_uncompressed(&mut *w).map_err(write_err)
}

/// Read and validate one raw G1 element.
pub fn read_g1(r: &mut impl Read, infinity: InfinityPolicy) -> Result<G1> {
    use ark_ec::AffineRepr;
    let mut buf = [0u8; G1_RAW_LEN];
    read_exact_or_truncated(r, &mut buf, "raw G1 element")?;
    let p = G1::deserialize_uncompressed_unchecked(buf.as_slice())
        .map_err(|e| decode_err("raw G1", e))?;
    validate_g1(&p)?;
    if infinity == InfinityPolicy::Reject && p.is_zero() {
        return Err(SetupError::Curve(
            "unexpected G1 point at infinity".into(),
        ));
    }
    Ok(p)
}

/// Read and validate one raw G2 element.
pub fn read_g2(r: &mut impl Read, infinity: InfinityPolicy) -> Result<G2> {
    use ark_ec::AffineRepr;
    let mut buf = [0u8; G2_RAW_LEN];
    read_exact_or_truncated(r, &mut buf, "raw G2 element")?;
    let p = G2::deserialize_uncompressed_unchecked(buf.as_slice())
        .map_err(|e| decode_err("raw G2", e))?;
    validate_g2(&p)?;
    if infinity == InfinityPolicy::Reject && p.is_zero() {
        return Err(SetupError::Curve(
            "unexpected G2 point at infinity".into(),
        ));
    }
    Ok(p)
}

// ------------------------- Vectors -------------------------

/// Write a slice of G1 elements in raw form, back to back.
pub fn write_g1_slice(w: &mut impl Write, points: &[G1]) -> Result<()> {
    for p in points {
        write_g1(w, p)?;
    }
    Ok(())
}

/// Write a slice of G2 elements in raw form, back to back.
pub fn write_g2_slice(w: &mut impl Write, points: &[G2]) -> Result<()> {
    for p in points {
        write_g2(w, p)?;
    }
    Ok(())
}

/// Read `len` raw G1 elements into memory.
pub fn read_g1_vec(r: &mut impl Read, len: usize, infinity: InfinityPolicy) -> Result<Vec<G1>> {
    let mut out = Vec::with_capacity(len);
    for_each_g1_chunk(r, len, infinity, |_, chunk| {
        out.extend_from_slice(chunk);
        Ok(())
    })?;
    Ok(out)
}

/// Read `len` raw G2 elements into memory.
pub fn read_g2_vec(r: &mut impl Read, len: usize, infinity: InfinityPolicy) -> Result<Vec<G2>> {
    let mut out = Vec::with_capacity(len);
    for_each_g2_chunk(r, len, infinity, |_, chunk| {
        out.extend_from_slice(chunk);
        Ok(())
    })?;
    Ok(out)
}

/// Stream `total` raw G1 elements through `f` in [`CHUNK_POINTS`]-sized
/// chunks. `f` receives the global start index of each chunk; chunks arrive
/// in increasing index order and only one chunk is live at a time.
pub fn for_each_g1_chunk(
    r: &mut impl Read,
    total: usize,
    infinity: InfinityPolicy,
    mut f: impl FnMut(usize, &[G1]) -> Result<()>,
) -> Result<()> {
    let mut chunk = Vec::with_capacity(CHUNK_POINTS.min(total));
    let mut start = 0usize;
    while start < total {
        let len = CHUNK_POINTS.min(total - start);
        chunk.clear();
        for _ in 0..len {
            chunk.push(read_g1(r, infinity)?);
        }
        f(start, &chunk)?;
        start += len;
    }
    Ok(())
}

/// Stream `total` raw G2 elements through `f`; see [`for_each_g1_chunk`].
pub fn for_each_g2_chunk(
    r: &mut impl Read,
    total: usize,
    infinity: InfinityPolicy,
    mut f: impl FnMut(usize, &[G2]) -> Result<()>,
) -> Result<()> {
    let mut chunk = Vec::with_capacity(CHUNK_POINTS.min(total));
    let mut start = 0usize;
    while start < total {
        let len = CHUNK_POINTS.min(total - start);
        chunk.clear();
        for _ in 0..len {
            chunk.push(read_g2(r, infinity)?);
        }
        f(start, &chunk)?;
        start += len;
    }
    Ok(())
}

/// Write a `u32` length prefix followed by raw G1 elements.
pub fn write_g1_vec_prefixed(w: &mut impl Write, points: &[G1]) -> Result<()> {
    write_u32(w, points.len() as u32)?;
    write_g1_slice(w, points)
}

/// Write a `u32` length prefix followed by raw G2 elements.
pub fn write_g2_vec_prefixed(w: &mut impl Write, points: &[G2]) -> Result<()> {
    write_u32(w, points.len() as u32)?;
    write_g2_slice(w, points)
}

/// Read a `u32`-length-prefixed raw G1 vector.
pub fn read_g1_vec_prefixed(r: &mut impl Read, infinity: InfinityPolicy) -> Result<Vec<G1>> {
    let len = read_u32(r)? as usize;
    read_g1_vec(r, len, infinity)
}

/// Read a `u32`-length-prefixed raw G2 vector.
pub fn read_g2_vec_prefixed(r: &mut impl Read, infinity: InfinityPolicy) -> Result<Vec<G2>> {
    let len = read_u32(r)? as usize;
    read_g2_vec(r, len, infinity)
}

// ------------------------- Compressed points -------------------------

/// Write one G1 element in compressed form (key files).
pub fn write_g1_compressed(w: &mut impl Write, p: &G1) -> Result<()> {
    p.serialize_compressed(&mut *w).map_err(write_err)
}

/// Write one G2 element in compressed form (key files).
pub fn write_g2_compressed(w: &mut impl Write, p: &G2) -> Result<()> {
    p.serialize_compressed(&mut *w).map_err(write_err)
}

/// Read and validate one compressed G1 element.
pub fn read_g1_compressed(r: &mut impl Read) -> Result<G1> {
    let mut buf = [0u8; G1_COMPRESSED_LEN];
    read_exact_or_truncated(r, &mut buf, "compressed G1 element")?;
    let p = G1::deserialize_compressed_unchecked(buf.as_slice())
        .map_err(|e| decode_err("compressed G1", e))?;
    validate_g1(&p)?;
    Ok(p)
}

/// Read and validate one compressed G2 element.
pub fn read_g2_compressed(r: &mut impl Read) -> Result<G2> {
    let mut buf = [0u8; G2_COMPRESSED_LEN];
    read_exact_or_truncated(r, &mut buf, "compressed G2 element")?;
    let p = G2::deserialize_compressed_unchecked(buf.as_slice())
        .map_err(|e| decode_err("compressed G2", e))?;
    validate_g2(&p)?;
    Ok(p)
}

// ------------------------- Scalars -------------------------

/// Write a scalar as 32 little-endian bytes.
pub fn write_fr(w: &mut impl Write, v: &crate::F) -> Result<()> {
    v.serialize_uncompressed(&mut *w).map_err(write_err)
}

/// Read a canonical 32-byte little-endian scalar.
pub fn read_fr(r: &mut impl Read) -> Result<crate::F> {
    let mut buf = [0u8; 32];
    read_exact_or_truncated(r, &mut buf, "scalar")?;
    crate::F::deserialize_uncompressed(buf.as_slice()).map_err(|e| decode_err("scalar", e))
}

// ------------------------- Atomic output files -------------------------

/// An output file that only becomes visible at its destination path when
/// [`AtomicFile::commit`] succeeds.
///
/// Bytes are buffered into `<dest>.tmp`; `commit` flushes and renames over
/// the destination. Dropping an uncommitted `AtomicFile` (any error or
/// cancellation path) removes the temporary file, so readers never observe
/// a partial transcript.
pub struct AtomicFile {
    dest: PathBuf,
    tmp: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl AtomicFile {
    /// Open `<dest>.tmp` for writing.
    pub fn create(dest: &Path) -> Result<Self> {
        let mut tmp_os = dest.as_os_str().to_os_string();
        tmp_os.push(".tmp");
        let tmp = PathBuf::from(tmp_os);
        let file = File::create(&tmp)?;
        Ok(Self {
            dest: dest.to_path_buf(),
            tmp,
            writer: Some(BufWriter::new(file)),
        })
    }

    /// Flush the buffer and atomically rename the temporary file into place.
    ///
    /// A failure at either step removes the temporary file before the
    /// error propagates.
    pub fn commit(mut self) -> Result<()> {
        let mut writer = self
            .writer
            .take()
            .expect("AtomicFile::commit called twice");
        if let Err(e) = writer.flush() {
            drop(writer);
            let _ = fs::remove_file(&self.tmp);
            return Err(e.into());
        }
        drop(writer);
        if let Err(e) = fs::rename(&self.tmp, &self.dest) {
            let _ = fs::remove_file(&self.tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

impl Write for AtomicFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer
            .as_mut()
            .expect("write after commit")
            .write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.as_mut().expect("flush after commit").flush()
    }
}

impl Drop for AtomicFile {
    fn drop(&mut self) {
        if self.writer.take().is_some() {
            // Uncommitted: discard the partial output.
            let _ = fs::remove_file(&self.tmp);
        }
    }
}
