//! Constraint-system interface
//!
//! Phase-2 initialization consumes an R1CS as an opaque stream: a shape
//! header (constraint/wire counts plus Pedersen-commitment wire metadata)
//! and one sparse row per constraint. Producing that stream from circuit
//! tooling is a front-end concern; this module only defines the stream
//! contract ([`ConstraintSource`]) and two file-backed implementations:
//!
//! - [`R1csFile`]: a monolithic little-endian binary file, header + rows;
//! - [`PartedR1cs`]: the same header file accompanied by row-only chunk
//!   files `<base>.0 … <base>.{k−1}` of `batch_size` rows each, so circuits
//!   too large for one resident pass stream chunk by chunk.
//!
//! Row encoding per matrix (A, B, C): `u32` term count, then terms as
//! `u32` wire index + 32-byte little-endian scalar. Wire indices are
//! validated against the header on read.

#![forbid(unsafe_code)]

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use crate::codec::{self, AtomicFile};
use crate::error::{Result, SetupError};
use crate::F;

/// File magic of the binary R1CS header.
const MAGIC: &[u8; 4] = b"r1cs";

/// Circuit shape: counts and wire metadata shared by all sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitShape {
    /// Number of constraints (rows).
    pub constraints: usize,
    /// Total wire count, public wires included.
    pub wires: u32,
    /// Leading wires that are public (the constant-one wire included).
    pub public_wires: u32,
    /// Wires whose K-column evaluations feed the Pedersen commitment key.
    pub commitment_wires: Vec<u32>,
}

impl CircuitShape {
    fn validate(&self) -> Result<()> {
        if self.public_wires > self.wires {
            return Err(SetupError::Decode(format!(
                "public wire count {} exceeds total wires {}",
                self.public_wires, self.wires
            )));
        }
        for &w in &self.commitment_wires {
            if w >= self.wires {
                return Err(SetupError::Decode(format!(
                    "commitment wire {w} out of range (wires = {})",
                    self.wires
                )));
            }
        }
        Ok(())
    }
}

/// One sparse matrix entry: `coeff · wire`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    /// Wire index.
    pub wire: u32,
    /// Coefficient in the scalar field.
    pub coeff: F,
}

/// One constraint row `⟨A,w⟩ · ⟨B,w⟩ = ⟨C,w⟩`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Constraint {
    /// Sparse A-row terms.
    pub a: Vec<Term>,
    /// Sparse B-row terms.
    pub b: Vec<Term>,
    /// Sparse C-row terms.
    pub c: Vec<Term>,
}

/// A stream of constraints with known shape.
///
/// Rows arrive exactly once, in index order; implementations may re-read
/// from disk per call but must present a fresh full stream each time.
pub trait ConstraintSource {
    /// The circuit shape this source will stream.
    fn shape(&self) -> &CircuitShape;

    /// Stream every constraint through `f` as `(row index, row)`.
    fn for_each_constraint(
        &mut self,
        f: impl FnMut(usize, &Constraint) -> Result<()>,
    ) -> Result<()>;
}

// ------------------------- Row codec -------------------------

fn write_terms(w: &mut impl Write, terms: &[Term]) -> Result<()> {
    codec::write_u32(w, terms.len() as u32)?;
    for t in terms {
        codec::write_u32(w, t.wire)?;
        codec::write_fr(w, &t.coeff)?;
    }
    Ok(())
}

fn read_terms(r: &mut impl Read, wires: u32) -> Result<Vec<Term>> {
    let count = codec::read_u32(r)? as usize;
    let mut terms = Vec::with_capacity(count);
    for _ in 0..count {
        let wire = codec::read_u32(r)?;
        if wire >= wires {
            return Err(SetupError::Decode(format!(
                "constraint references wire {wire} out of range (wires = {wires})"
            )));
        }
        terms.push(Term {
            wire,
            coeff: codec::read_fr(r)?,
        });
    }
    Ok(terms)
}

fn write_constraint(w: &mut impl Write, row: &Constraint) -> Result<()> {
    write_terms(w, &row.a)?;
    write_terms(w, &row.b)?;
    write_terms(w, &row.c)
}

fn read_constraint(r: &mut impl Read, wires: u32) -> Result<Constraint> {
    Ok(Constraint {
        a: read_terms(r, wires)?,
        b: read_terms(r, wires)?,
        c: read_terms(r, wires)?,
    })
}

fn write_shape(w: &mut impl Write, shape: &CircuitShape) -> Result<()> {
    w.write_all(MAGIC)?;
    codec::write_u32(w, shape.constraints as u32)?;
    codec::write_u32(w, shape.wires)?;
    codec::write_u32(w, shape.public_wires)?;
    codec::write_u32(w, shape.commitment_wires.len() as u32)?;
    for &cw in &shape.commitment_wires {
        codec::write_u32(w, cw)?;
    }
    Ok(())
}

fn read_shape(r: &mut impl Read) -> Result<CircuitShape> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(SetupError::Decode("bad R1CS magic".into()));
    }
    let constraints = codec::read_u32(r)? as usize;
    let wires = codec::read_u32(r)?;
    let public_wires = codec::read_u32(r)?;
    let n_commitment = codec::read_u32(r)? as usize;
    let mut commitment_wires = Vec::with_capacity(n_commitment);
    for _ in 0..n_commitment {
        commitment_wires.push(codec::read_u32(r)?);
    }
    let shape = CircuitShape {
        constraints,
        wires,
        public_wires,
        commitment_wires,
    };
    shape.validate()?;
    Ok(shape)
}

// ------------------------- Monolithic file -------------------------

/// Monolithic binary R1CS: header followed by all rows.
pub struct R1csFile {
    path: PathBuf,
    shape: CircuitShape,
    header_len: u64,
}

impl R1csFile {
    /// Open and parse the header; rows are streamed on demand.
    pub fn open(path: &Path) -> Result<Self> {
        let mut r = BufReader::new(File::open(path)?);
        let shape = read_shape(&mut r)?;
        let header_len = (4 + 4 * 4 + 4 * shape.commitment_wires.len()) as u64;
        Ok(Self {
            path: path.to_path_buf(),
            shape,
            header_len,
        })
    }
}

impl ConstraintSource for R1csFile {
    fn shape(&self) -> &CircuitShape {
        &self.shape
    }

    fn for_each_constraint(
        &mut self,
        mut f: impl FnMut(usize, &Constraint) -> Result<()>,
    ) -> Result<()> {
        use std::io::Seek;
        let mut r = BufReader::new(File::open(&self.path)?);
        r.seek(std::io::SeekFrom::Start(self.header_len))?;
        for i in 0..self.shape.constraints {
            let row = read_constraint(&mut r, self.shape.wires)?;
            f(i, &row)?;
        }
        Ok(())
    }
}

/// Write a monolithic R1CS file (coordinator/front-end helper).
pub fn write_r1cs_file(path: &Path, shape: &CircuitShape, rows: &[Constraint]) -> Result<()> {
    shape.validate()?;
    if rows.len() != shape.constraints {
        return Err(SetupError::InvalidArgument(format!(
            "shape declares {} constraints but {} rows were supplied",
            shape.constraints,
            rows.len()
        )));
    }
    let mut out = AtomicFile::create(path)?;
    write_shape(&mut out, shape)?;
    for row in rows {
        write_constraint(&mut out, row)?;
    }
    out.commit()
}

// ------------------------- Parted files -------------------------

/// Parted R1CS: the header file at `base`, rows split into chunk files
/// `<base>.0 … <base>.{nb_chunks−1}` of `batch_size` rows each (the final
/// chunk may be short). The total row count is authoritative and must
/// satisfy `nb_chunks · batch_size ≥ constraints`.
pub struct PartedR1cs {
    base: PathBuf,
    shape: CircuitShape,
    nb_chunks: usize,
    batch_size: usize,
}

impl PartedR1cs {
    /// Open the header file and validate the chunk geometry.
    pub fn open(base: &Path, nb_cons: usize, nb_chunks: usize, batch_size: usize) -> Result<Self> {
        if batch_size == 0 || nb_chunks == 0 {
            return Err(SetupError::InvalidArgument(
                "parted R1CS needs a positive chunk count and batch size".into(),
            ));
        }
        if nb_chunks * batch_size < nb_cons {
            return Err(SetupError::InvalidArgument(format!(
                "{nb_chunks} chunks of {batch_size} rows cannot hold {nb_cons} constraints"
            )));
        }
        let mut r = BufReader::new(File::open(base)?);
        let shape = read_shape(&mut r)?;
        if shape.constraints != nb_cons {
            return Err(SetupError::InvalidArgument(format!(
                "header declares {} constraints, caller declared {nb_cons}",
                shape.constraints
            )));
        }
        Ok(Self {
            base: base.to_path_buf(),
            shape,
            nb_chunks,
            batch_size,
        })
    }

    fn chunk_path(&self, i: usize) -> PathBuf {
        let mut os = self.base.as_os_str().to_os_string();
        os.push(format!(".{i}"));
        PathBuf::from(os)
    }
}

impl ConstraintSource for PartedR1cs {
    fn shape(&self) -> &CircuitShape {
        &self.shape
    }

    fn for_each_constraint(
        &mut self,
        mut f: impl FnMut(usize, &Constraint) -> Result<()>,
    ) -> Result<()> {
        let total = self.shape.constraints;
        let mut index = 0usize;
        for ci in 0..self.nb_chunks {
            if index == total {
                break;
            }
            let expected = self.batch_size.min(total - index);
            let mut r = BufReader::new(File::open(self.chunk_path(ci))?);
            for _ in 0..expected {
                let row = read_constraint(&mut r, self.shape.wires)?;
                f(index, &row)?;
                index += 1;
            }
        }
        if index != total {
            return Err(SetupError::Decode(format!(
                "parted R1CS streamed {index} of {total} constraints"
            )));
        }
        Ok(())
    }
}

/// Write a parted R1CS: the header at `base` plus row chunks of
/// `batch_size`. Returns the number of chunk files written.
pub fn write_parted_r1cs(
    base: &Path,
    shape: &CircuitShape,
    rows: &[Constraint],
    batch_size: usize,
) -> Result<usize> {
    shape.validate()?;
    if rows.len() != shape.constraints {
        return Err(SetupError::InvalidArgument(format!(
            "shape declares {} constraints but {} rows were supplied",
            shape.constraints,
            rows.len()
        )));
    }
    if batch_size == 0 {
        return Err(SetupError::InvalidArgument(
            "batch size must be positive".into(),
        ));
    }

    let mut header = AtomicFile::create(base)?;
    write_shape(&mut header, shape)?;
    header.commit()?;

    let mut written = 0usize;
    for (ci, chunk) in rows.chunks(batch_size).enumerate() {
        let mut os = base.as_os_str().to_os_string();
        os.push(format!(".{ci}"));
        let mut out = AtomicFile::create(&PathBuf::from(os))?;
        for row in chunk {
            write_constraint(&mut out, row)?;
        }
        out.commit()?;
        written += 1;
    }
    Ok(written)
}
