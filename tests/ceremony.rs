//! End-to-end ceremony runs: honest flows, tamper detection, and a Groth16
//! proof assembled from the extracted keys for a reference circuit.

use std::fs;
use std::path::{Path, PathBuf};

use ark_bn254::{Bn254, G1Projective, G2Projective};
use ark_ec::pairing::Pairing;
use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::Zero;
use ark_std::UniformRand;
use rand::rngs::StdRng;
use rand::SeedableRng;

use groth16_setup::batch::same_ratio;
use groth16_setup::domain::{pow, Radix2Domain};
use groth16_setup::keys::{self, reconstruct_g1, reconstruct_g2};
use groth16_setup::phase1::{self, Phase1};
use groth16_setup::phase2::{self, evals_path, Phase2};
use groth16_setup::r1cs::{write_parted_r1cs, write_r1cs_file, CircuitShape, Constraint, Term};
use groth16_setup::{SetupError, F, G1, G2};

const P1_HEADER: usize = 5;
const P1_RECORD: usize = 3 * 64 + 128 + 3 * 128 + 32;
const P2_HEADER: usize = 21;

fn tmp(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "groth16-setup-e2e-{}-{}",
        std::process::id(),
        name
    ))
}

fn p1_vectors_len(power: u8) -> usize {
    let n = 1usize << power;
    (2 * n - 1) * 64 + n * 128 + 2 * n * 64 + 128
}

fn mutate(src: &Path, dst: &Path, f: impl FnOnce(&mut Vec<u8>)) {
    let mut bytes = fs::read(src).unwrap();
    f(&mut bytes);
    fs::write(dst, bytes).unwrap();
}

fn rm<P: AsRef<Path>>(paths: &[P]) {
    for p in paths {
        let _ = fs::remove_file(p);
    }
}

// ------------------------- Phase 1 flows -------------------------

#[test]
fn honest_runs_verify_across_powers_and_contribution_counts() {
    for power in [3u8, 4, 5] {
        for rounds in [1usize, 2, 3] {
            let mut cur = tmp(&format!("honest-{power}-{rounds}-0"));
            phase1::initialize(power, &cur).unwrap();
            let mut files = vec![cur.clone()];
            for k in 0..rounds {
                let next = tmp(&format!("honest-{power}-{rounds}-{}", k + 1));
                let mut rng = StdRng::from_seed([(power + k as u8); 32]);
                phase1::contribute_with_rng(&cur, &next, &mut rng).unwrap();
                files.push(next.clone());
                cur = next;
            }
            phase1::verify(&cur).unwrap();
            let t = Phase1::read(&cur).unwrap();
            assert_eq!(t.contributions.len(), rounds);
            rm(&files);
        }
    }
}

#[test]
fn contributions_compose_multiplicatively() {
    let a = tmp("compose-a");
    let b = tmp("compose-b");
    let c = tmp("compose-c");
    phase1::initialize(3, &a).unwrap();
    phase1::contribute_with_rng(&a, &b, &mut StdRng::from_seed([61u8; 32])).unwrap();
    phase1::contribute_with_rng(&b, &c, &mut StdRng::from_seed([62u8; 32])).unwrap();

    // Secrets are sampled in the order τ, α, β from the seeded RNG.
    let mut r1 = StdRng::from_seed([61u8; 32]);
    let tau1 = F::rand(&mut r1);
    let mut r2 = StdRng::from_seed([62u8; 32]);
    let tau2 = F::rand(&mut r2);

    let t = Phase1::read(&c).unwrap();
    let product_g2 = (G2::generator() * (tau1 * tau2)).into_affine();

    // e(tau_g1[1], [1]₂) == e([1]₁, [τ₁·τ₂]₂)
    assert!(same_ratio(
        (G1::generator(), t.tau_g1[1]),
        (G2::generator(), product_g2)
    ));
    assert_eq!(t.contributions.last().unwrap().tau_g1, t.tau_g1[1]);
    rm(&[&a, &b, &c]);
}

#[test]
fn transcripts_round_trip_byte_identically() {
    let a = tmp("rt-a");
    let b = tmp("rt-b");
    let c = tmp("rt-c");
    phase1::initialize(3, &a).unwrap();
    phase1::contribute_with_rng(&a, &b, &mut StdRng::from_seed([63u8; 32])).unwrap();

    // A same-power transform decodes and re-encodes every element; the
    // canonical encoding must reproduce the input bit for bit.
    phase1::transform(&b, &c, 3, 3).unwrap();
    assert_eq!(fs::read(&b).unwrap(), fs::read(&c).unwrap());
    rm(&[&a, &b, &c]);
}

#[test]
fn tampering_with_a_vector_entry_is_detected() {
    let a = tmp("tamper-vec-a");
    let b = tmp("tamper-vec-b");
    let bad = tmp("tamper-vec-bad");
    phase1::initialize(4, &a).unwrap();
    phase1::contribute_with_rng(&a, &b, &mut StdRng::from_seed([64u8; 32])).unwrap();

    // Byte flip inside tau_g1[3]: no longer a valid curve point.
    mutate(&b, &bad, |bytes| {
        bytes[P1_HEADER + 3 * 64 + 17] ^= 0x01;
    });
    assert!(matches!(
        phase1::verify(&bad),
        Err(SetupError::Curve(_) | SetupError::Consistency(_) | SetupError::Decode(_))
    ));

    // Substituting a *valid* point must still fail, via the batched
    // powers check rather than decoding.
    mutate(&b, &bad, |bytes| {
        let (src, dst) = (P1_HEADER + 5 * 64, P1_HEADER + 3 * 64);
        let copied: Vec<u8> = bytes[src..src + 64].to_vec();
        bytes[dst..dst + 64].copy_from_slice(&copied);
    });
    assert!(matches!(
        phase1::verify(&bad),
        Err(SetupError::Consistency(_))
    ));
    rm(&[&a, &b, &bad]);
}

#[test]
fn swapped_or_forged_contribution_records_are_detected() {
    let a = tmp("tamper-rec-a");
    let b = tmp("tamper-rec-b");
    let c = tmp("tamper-rec-c");
    let bad = tmp("tamper-rec-bad");
    phase1::initialize(3, &a).unwrap();
    phase1::contribute_with_rng(&a, &b, &mut StdRng::from_seed([65u8; 32])).unwrap();
    phase1::contribute_with_rng(&b, &c, &mut StdRng::from_seed([66u8; 32])).unwrap();

    let records_at = P1_HEADER + p1_vectors_len(3);

    // Swap the two contribution records.
    mutate(&c, &bad, |bytes| {
        let first: Vec<u8> = bytes[records_at..records_at + P1_RECORD].to_vec();
        let second: Vec<u8> =
            bytes[records_at + P1_RECORD..records_at + 2 * P1_RECORD].to_vec();
        bytes[records_at..records_at + P1_RECORD].copy_from_slice(&second);
        bytes[records_at + P1_RECORD..records_at + 2 * P1_RECORD].copy_from_slice(&first);
    });
    assert!(matches!(
        phase1::verify(&bad),
        Err(SetupError::Consistency(_))
    ));

    // Replace the τ proof of knowledge with the α one inside record 0.
    mutate(&c, &bad, |bytes| {
        let pok_tau = records_at + 3 * 64 + 128;
        let pok_alpha = pok_tau + 128;
        let copied: Vec<u8> = bytes[pok_alpha..pok_alpha + 128].to_vec();
        bytes[pok_tau..pok_tau + 128].copy_from_slice(&copied);
    });
    assert!(matches!(
        phase1::verify(&bad),
        Err(SetupError::Consistency(_))
    ));
    rm(&[&a, &b, &c, &bad]);
}

// ------------------------- Reference circuit -------------------------

/// Wires: [one, z, x, y, t] with z public. Constraints: x·y = t, t·1 = z.
fn reference_circuit() -> (CircuitShape, Vec<Constraint>) {
    let one = F::from(1u64);
    let shape = CircuitShape {
        constraints: 2,
        wires: 5,
        public_wires: 2,
        commitment_wires: vec![],
    };
    let rows = vec![
        Constraint {
            a: vec![Term { wire: 2, coeff: one }],
            b: vec![Term { wire: 3, coeff: one }],
            c: vec![Term { wire: 4, coeff: one }],
        },
        Constraint {
            a: vec![Term { wire: 4, coeff: one }],
            b: vec![Term { wire: 0, coeff: one }],
            c: vec![Term { wire: 1, coeff: one }],
        },
    ];
    (shape, rows)
}

/// A satisfying assignment for [`reference_circuit`].
fn reference_witness() -> Vec<F> {
    let (x, y) = (F::from(3u64), F::from(5u64));
    let t = x * y;
    vec![F::from(1u64), t, x, y, t]
}

/// The files a full ceremony run leaves on disk.
struct CeremonyFiles {
    /// Final Phase-2 transcript (after both δ contributions).
    final_p2: PathBuf,
    /// Phase-2 initialization output, the verification origin.
    origin: PathBuf,
    /// Evaluations file written beside the origin.
    evals: PathBuf,
    /// Everything created, for cleanup.
    all: Vec<PathBuf>,
}

/// Run the whole ceremony: init → 2 τ/α/β contributions → verify →
/// Phase-2 init → 2 δ contributions → verify.
fn run_full_ceremony(label: &str, power: u8) -> CeremonyFiles {
    let p1a = tmp(&format!("{label}-p1a"));
    let p1b = tmp(&format!("{label}-p1b"));
    let p1c = tmp(&format!("{label}-p1c"));
    let r1cs = tmp(&format!("{label}-r1cs"));
    let p2a = tmp(&format!("{label}-p2a"));
    let p2b = tmp(&format!("{label}-p2b"));
    let p2c = tmp(&format!("{label}-p2c"));

    phase1::initialize(power, &p1a).unwrap();
    phase1::contribute_with_rng(&p1a, &p1b, &mut StdRng::from_seed([71u8; 32])).unwrap();
    phase1::contribute_with_rng(&p1b, &p1c, &mut StdRng::from_seed([72u8; 32])).unwrap();
    phase1::verify(&p1c).unwrap();

    let (shape, rows) = reference_circuit();
    write_r1cs_file(&r1cs, &shape, &rows).unwrap();

    phase2::initialize(&p1c, &r1cs, &p2a).unwrap();
    phase2::contribute_with_rng(&p2a, &p2b, &mut StdRng::from_seed([73u8; 32])).unwrap();
    phase2::contribute_with_rng(&p2b, &p2c, &mut StdRng::from_seed([74u8; 32])).unwrap();
    phase2::verify(&p2c, &p2a).unwrap();

    let evals = evals_path(&p2a);
    CeremonyFiles {
        final_p2: p2c.clone(),
        origin: p2a.clone(),
        evals: evals.clone(),
        all: vec![p1a, p1b, p1c, r1cs, p2a, p2b, p2c, evals],
    }
}

#[test]
fn phase2_delta_telescopes_and_tampering_is_detected() {
    let run = run_full_ceremony("tele", 3);

    // δ telescoping: the final [δ]₁ is the product of both contributions.
    let mut r1 = StdRng::from_seed([73u8; 32]);
    let d1 = F::rand(&mut r1);
    let mut r2 = StdRng::from_seed([74u8; 32]);
    let d2 = F::rand(&mut r2);
    let t = Phase2::read(&run.final_p2).unwrap();
    assert_eq!(t.delta_g1, (G1::generator() * (d1 * d2)).into_affine());
    assert!(same_ratio(
        (G1::generator(), t.delta_g1),
        (G2::generator(), t.delta_g2)
    ));

    // Tamper with the z vector: flipped byte (invalid point) and valid
    // point substitution (caught by the batched check).
    let bad = tmp("tele-bad");
    let z_at = P2_HEADER + 64 + 128;
    mutate(&run.final_p2, &bad, |bytes| {
        bytes[z_at + 9] ^= 0x40;
    });
    assert!(matches!(
        phase2::verify(&bad, &run.origin),
        Err(SetupError::Curve(_) | SetupError::Consistency(_) | SetupError::Decode(_))
    ));
    mutate(&run.final_p2, &bad, |bytes| {
        let copied: Vec<u8> = bytes[z_at + 64..z_at + 128].to_vec();
        bytes[z_at..z_at + 64].copy_from_slice(&copied);
    });
    assert!(matches!(
        phase2::verify(&bad, &run.origin),
        Err(SetupError::Consistency(_))
    ));

    rm(&run.all);
    rm(&[&bad]);
}

#[test]
fn parted_initialization_matches_monolithic() {
    let p1a = tmp("part-p1a");
    let p1b = tmp("part-p1b");
    let r1cs = tmp("part-r1cs");
    let r1cs_parted = tmp("part-r1cs-chunks");
    let mono = tmp("part-mono");
    let parted = tmp("part-parted");

    phase1::initialize(3, &p1a).unwrap();
    phase1::contribute_with_rng(&p1a, &p1b, &mut StdRng::from_seed([75u8; 32])).unwrap();

    let (shape, rows) = reference_circuit();
    write_r1cs_file(&r1cs, &shape, &rows).unwrap();
    let chunks = write_parted_r1cs(&r1cs_parted, &shape, &rows, 1).unwrap();
    assert_eq!(chunks, 2);

    phase2::initialize(&p1b, &r1cs, &mono).unwrap();
    phase2::initialize_from_parted_r1cs(&p1b, &r1cs_parted, &parted, 2, 2, 1).unwrap();

    assert_eq!(fs::read(&mono).unwrap(), fs::read(&parted).unwrap());
    assert_eq!(
        fs::read(evals_path(&mono)).unwrap(),
        fs::read(evals_path(&parted)).unwrap()
    );

    let mut chunk_files = Vec::new();
    for i in 0..chunks {
        chunk_files.push(PathBuf::from(format!("{}.{i}", r1cs_parted.display())));
    }
    rm(&[&p1a, &p1b, &r1cs, &r1cs_parted, &mono, &parted]);
    rm(&[&evals_path(&mono), &evals_path(&parted)]);
    rm(&chunk_files);
}

// ------------------------- Key extraction & proof -------------------------

/// Naive inverse DFT: evaluations over H to monomial coefficients.
fn interpolate(domain: &Radix2Domain, evals: &[F]) -> Vec<F> {
    let d = domain.size;
    (0..d)
        .map(|k| {
            let mut acc = F::zero();
            for (i, v) in evals.iter().enumerate() {
                acc += *v * pow(domain.root_inv, (i * k) as u64);
            }
            acc * domain.size_inv
        })
        .collect()
}

#[test]
fn extracted_keys_prove_and_verify_a_groth16_statement() {
    let run = run_full_ceremony("proof", 3);
    let pk_path = tmp("proof-pk");
    let vk_path = tmp("proof-vk");
    keys::extract_keys(&run.final_p2, &run.evals, &pk_path, &vk_path).unwrap();

    let pk = keys::ProvingKey::read(&pk_path).unwrap();
    let vk = keys::VerifyingKey::read(&vk_path).unwrap();

    // Structural properties.
    let t = Phase2::read(&run.final_p2).unwrap();
    let d = t.header.domain as usize;
    assert_eq!(vk.gamma_g2, G2::generator());
    assert_eq!(pk.z.len(), d - 1);
    assert_eq!(vk.k.len(), 2);
    assert_eq!(pk.k.len(), 3);
    assert_eq!(pk.infinity_a.len(), 5);
    // The A matrix only touches wires 2 (x) and 4 (t); the mask flags the
    // other three, and the popcount matches.
    assert_eq!(pk.n_infinity_a, 3);
    assert_eq!(pk.infinity_a, vec![true, true, false, true, false]);
    assert_eq!(pk.a.len(), 2);
    // B touches wires 3 (y) and 0 (one).
    assert_eq!(pk.infinity_b, vec![false, true, true, false, true]);
    assert_eq!(pk.b1.len(), 2);
    assert_eq!(pk.b2.len(), 2);
    assert!(pk.pedersen.is_empty());
    assert!(vk.pedersen.is_none());

    // ---- Prove x·y = z with the extracted material (r = s = 0). ----
    let (shape, rows) = reference_circuit();
    let witness = reference_witness();
    let public = &witness[..shape.public_wires as usize];

    let full_a = reconstruct_g1(&pk.a, &pk.infinity_a);
    let full_b2 = reconstruct_g2(&pk.b2, &pk.infinity_b);

    // A = [α + Σ aⱼ·uⱼ(τ)]₁
    let mut a_acc = G1Projective::from(pk.alpha_g1);
    for (j, w) in witness.iter().enumerate() {
        a_acc += full_a[j] * w;
    }
    let proof_a = a_acc.into_affine();

    // B = [β + Σ aⱼ·vⱼ(τ)]₂
    let mut b_acc = G2Projective::from(pk.beta_g2);
    for (j, w) in witness.iter().enumerate() {
        b_acc += full_b2[j] * w;
    }
    let proof_b = b_acc.into_affine();

    // Quotient h(X) = (U·V − W) / (X^d − 1), computed field-side.
    let domain = Radix2Domain::new(d).unwrap();
    let mut ua = vec![F::zero(); d];
    let mut ub = vec![F::zero(); d];
    let mut uc = vec![F::zero(); d];
    for (i, row) in rows.iter().enumerate() {
        for term in &row.a {
            ua[i] += term.coeff * witness[term.wire as usize];
        }
        for term in &row.b {
            ub[i] += term.coeff * witness[term.wire as usize];
        }
        for term in &row.c {
            uc[i] += term.coeff * witness[term.wire as usize];
        }
    }
    let u = interpolate(&domain, &ua);
    let v = interpolate(&domain, &ub);
    let w_poly = interpolate(&domain, &uc);

    // Schoolbook multiply, subtract, then divide by X^d − 1.
    let mut p = vec![F::zero(); 2 * d - 1];
    for (i, ui) in u.iter().enumerate() {
        for (j, vj) in v.iter().enumerate() {
            p[i + j] += *ui * vj;
        }
    }
    for (i, wi) in w_poly.iter().enumerate() {
        p[i] -= wi;
    }
    let mut h = vec![F::zero(); d - 1];
    for k in (d..2 * d - 1).rev() {
        let coeff = p[k];
        h[k - d] += coeff;
        p[k - d] += coeff;
        p[k] = F::zero();
    }
    assert!(
        p.iter().all(|c| c.is_zero()),
        "U·V − W must vanish on the whole domain"
    );

    // C = [Σ_private aⱼ·kⱼ + h(τ)·t(τ)/δ]₁
    let mut c_acc = G1Projective::zero();
    for (idx, w) in witness[shape.public_wires as usize..].iter().enumerate() {
        c_acc += pk.k[idx] * w;
    }
    for (i, hi) in h.iter().enumerate() {
        c_acc += pk.z[i] * hi;
    }
    let proof_c = c_acc.into_affine();

    // e(A, B) == e(α, β) · e(Σ_pub aⱼ·vkⱼ, γ) · e(C, δ)
    let mut pub_acc = G1Projective::zero();
    for (j, w) in public.iter().enumerate() {
        pub_acc += vk.k[j] * w;
    }
    let lhs = Bn254::pairing(proof_a, proof_b);
    let rhs = Bn254::pairing(pk.alpha_g1, vk.beta_g2)
        + Bn254::pairing(pub_acc.into_affine(), vk.gamma_g2)
        + Bn254::pairing(proof_c, vk.delta_g2);
    assert_eq!(lhs, rhs, "Groth16 verification equation must hold");

    // A proof over a non-satisfying witness must fail the same equation.
    let mut bad_witness = witness.clone();
    bad_witness[1] += F::from(1u64);
    let mut bad_pub = G1Projective::zero();
    for (j, w) in bad_witness[..shape.public_wires as usize].iter().enumerate() {
        bad_pub += vk.k[j] * w;
    }
    let bad_rhs = Bn254::pairing(pk.alpha_g1, vk.beta_g2)
        + Bn254::pairing(bad_pub.into_affine(), vk.gamma_g2)
        + Bn254::pairing(proof_c, vk.delta_g2);
    assert_ne!(lhs, bad_rhs);

    rm(&run.all);
    rm(&[&pk_path, &vk_path]);
}
