//! Seeded synthetic solver inputs for tests
//!

use nalgebra::DMatrix;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Binomial, Distribution};
use rand_xoshiro::Xoshiro256StarStar;

use crate::clone_model::{
    CloneObservations, GERMLINE_SEGMENT_COPY_NUMBER, get_root_node_index, set_germline_row,
};

pub fn get_test_rng(seed: u64) -> Xoshiro256StarStar {
    SeedableRng::seed_from_u64(seed)
}

/// Random usage matrix with rows normalized onto the simplex
pub fn random_usage(
    rng: &mut Xoshiro256StarStar,
    sample_count: usize,
    node_count: usize,
) -> DMatrix<f64> {
    let mut usage = DMatrix::from_fn(sample_count, node_count, |_, _| rng.r#gen::<f64>());
    for mut row in usage.row_iter_mut() {
        let sum = row.sum();
        row /= sum;
    }
    usage
}

/// Random copy number matrix in 0..=4 with a germline root row
///
/// This does not respect the mate pair or breakpoint-in-segment constraints.
///
pub fn random_copy_number(
    rng: &mut Xoshiro256StarStar,
    node_count: usize,
    breakpoint_count: usize,
    segment_count: usize,
) -> DMatrix<f64> {
    let mut copy_number = DMatrix::from_fn(
        node_count,
        breakpoint_count + segment_count,
        |_, _| (rng.r#gen::<f64>() * 4.0).round(),
    );
    set_germline_row(
        &mut copy_number,
        get_root_node_index(node_count),
        breakpoint_count,
    );
    copy_number
}

/// Place each breakpoint in one random segment
pub fn random_breakpoint_segments(
    rng: &mut Xoshiro256StarStar,
    breakpoint_count: usize,
    segment_count: usize,
) -> DMatrix<f64> {
    let mut q = DMatrix::zeros(breakpoint_count, segment_count);
    for breakpoint_index in 0..breakpoint_count {
        q[(breakpoint_index, rng.gen_range(0..segment_count))] = 1.0;
    }
    q
}

/// Pair all breakpoints into random mates, breakpoint count must be even
pub fn random_mate_pairs(rng: &mut Xoshiro256StarStar, breakpoint_count: usize) -> DMatrix<f64> {
    assert_eq!(breakpoint_count % 2, 0);
    let mut indices = (0..breakpoint_count).collect::<Vec<_>>();
    indices.shuffle(rng);
    let mut g = DMatrix::zeros(breakpoint_count, breakpoint_count);
    for pair in indices.chunks(2) {
        let (i, j) = (pair[0], pair[1]);
        g[(i, j)] = 1.0;
        g[(j, i)] = 1.0;
        g[(i, i)] = 1.0;
        g[(j, j)] = 1.0;
    }
    g
}

/// Random mixed copy number where every segment signal is at least that of its breakpoints
pub fn random_mixed_copy_number(
    rng: &mut Xoshiro256StarStar,
    breakpoint_segments: &DMatrix<f64>,
    sample_count: usize,
    scale: f64,
) -> DMatrix<f64> {
    let breakpoint_count = breakpoint_segments.nrows();
    let segment_count = breakpoint_segments.ncols();
    let half_scale = scale / 2.0;
    let mut f = DMatrix::from_fn(sample_count, breakpoint_count + segment_count, |_, _| {
        half_scale * rng.r#gen::<f64>()
    });
    for b in 0..breakpoint_count {
        for s in 0..segment_count {
            if breakpoint_segments[(b, s)] == 0.0 {
                continue;
            }
            for p in 0..sample_count {
                let locus = breakpoint_count + s;
                f[(p, locus)] = f[(p, locus)].max(f[(p, b)]);
                f[(p, locus)] += half_scale * rng.r#gen::<f64>();
            }
        }
    }
    f
}

/// Complete random observation set, with allele counts drawn from Binomial(100, 0.25) at depth 100
pub fn random_observations(
    seed: u64,
    sample_count: usize,
    breakpoint_count: usize,
    segment_count: usize,
) -> CloneObservations {
    let mut rng = get_test_rng(seed);
    let breakpoint_segments = random_breakpoint_segments(&mut rng, breakpoint_count, segment_count);
    let mixed_copy_number =
        random_mixed_copy_number(&mut rng, &breakpoint_segments, sample_count, 5.0);
    let mate_pairs = random_mate_pairs(&mut rng, breakpoint_count);

    let depth = 100;
    let binomial = Binomial::new(depth, 0.25).unwrap();
    let allele_counts = DMatrix::from_fn(sample_count, breakpoint_count, |_, _| {
        binomial.sample(&mut rng) as f64
    });
    let total_depth = DMatrix::from_element(sample_count, breakpoint_count, depth as f64);

    CloneObservations {
        mixed_copy_number,
        breakpoint_segments,
        mate_pairs,
        allele_counts,
        total_depth,
    }
}

/// Assert every copy number constraint on `copy_number`, including integrality
pub fn check_copy_number_invariants(
    observations: &CloneObservations,
    copy_number: &DMatrix<f64>,
    max_copy_number: u32,
) {
    let breakpoint_count = observations.breakpoint_count();
    let root = copy_number.nrows() - 1;

    for x in copy_number.iter() {
        assert!(*x >= 0.0 && *x <= max_copy_number as f64);
        assert_eq!(*x, x.round());
    }
    for locus in 0..copy_number.ncols() {
        let expected = if locus < breakpoint_count {
            0.0
        } else {
            GERMLINE_SEGMENT_COPY_NUMBER
        };
        assert_eq!(copy_number[(root, locus)], expected);
    }
    for i in 0..breakpoint_count {
        for j in 0..breakpoint_count {
            if observations.mate_pairs[(i, j)] == 1.0 {
                for node in 0..copy_number.nrows() {
                    assert_eq!(copy_number[(node, i)], copy_number[(node, j)]);
                }
            }
        }
        for s in 0..observations.segment_count() {
            if observations.breakpoint_segments[(i, s)] == 1.0 {
                for node in 0..copy_number.nrows() {
                    assert!(
                        copy_number[(node, i)] <= copy_number[(node, breakpoint_count + s)]
                    );
                }
            }
        }
    }
}
