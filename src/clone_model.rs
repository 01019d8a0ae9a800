//! Observed data, locus layout and objective function shared by all clone decomposition solve steps
//!
//! Loci are always ordered as all breakpoints followed by all segments, so that column `b` of a
//! copy number matrix is breakpoint `b` and column `breakpoint_count + s` is segment `s`.
//!

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::solve_error::{SolveError, SolveResult};

/// Germline copy number of every segment locus in the root clone
pub const GERMLINE_SEGMENT_COPY_NUMBER: f64 = 2.0;

/// Germline copy number of every breakpoint locus in the root clone
pub const GERMLINE_BREAKPOINT_COPY_NUMBER: f64 = 0.0;

/// Tolerance used to check that usage rows are on the probability simplex
pub const SIMPLEX_TOLERANCE: f64 = 1e-6;

/// Get the total node count of the clone tree for a given leaf clone count
///
/// A binary tree over `clone_count` leaves carries `clone_count - 1` ancestral internal nodes, and every
/// node has its own row in the copy number matrix. The root is always the last node.
///
pub fn get_clone_node_count(clone_count: usize) -> SolveResult<usize> {
    if clone_count == 0 {
        return Err(SolveError::MalformedInput(
            "Clone count must be greater than 0".to_string(),
        ));
    }
    Ok(2 * clone_count - 1)
}

pub fn get_root_node_index(node_count: usize) -> usize {
    node_count - 1
}

/// Observed input matrices for one tumor sample set
///
pub struct CloneObservations {
    /// F: sample x locus average copy number
    pub mixed_copy_number: DMatrix<f64>,

    /// Q: breakpoint x segment binary matrix, 1 where the breakpoint lies in the segment
    pub breakpoint_segments: DMatrix<f64>,

    /// G: symmetric breakpoint x breakpoint binary matrix, 1 for the two ends of one junction
    pub mate_pairs: DMatrix<f64>,

    /// A: sample x breakpoint variant supporting read count
    pub allele_counts: DMatrix<f64>,

    /// H: sample x breakpoint total read depth
    pub total_depth: DMatrix<f64>,
}

fn check_shape(label: &str, x: &DMatrix<f64>, nrows: usize, ncols: usize) -> SolveResult<()> {
    if x.nrows() != nrows || x.ncols() != ncols {
        return Err(SolveError::MalformedInput(format!(
            "{label} matrix has shape {}x{}, expected {nrows}x{ncols}",
            x.nrows(),
            x.ncols()
        )));
    }
    Ok(())
}

fn check_nonnegative(label: &str, x: &DMatrix<f64>) -> SolveResult<()> {
    if let Some(val) = x.iter().find(|v| !v.is_finite() || **v < 0.0) {
        return Err(SolveError::MalformedInput(format!(
            "{label} matrix contains invalid value {val}, all values must be finite and non-negative"
        )));
    }
    Ok(())
}

fn check_binary(label: &str, x: &DMatrix<f64>) -> SolveResult<()> {
    if let Some(val) = x.iter().find(|v| **v != 0.0 && **v != 1.0) {
        return Err(SolveError::MalformedInput(format!(
            "{label} matrix contains non-binary value {val}"
        )));
    }
    Ok(())
}

impl CloneObservations {
    pub fn sample_count(&self) -> usize {
        self.mixed_copy_number.nrows()
    }

    pub fn locus_count(&self) -> usize {
        self.mixed_copy_number.ncols()
    }

    pub fn breakpoint_count(&self) -> usize {
        self.breakpoint_segments.nrows()
    }

    pub fn segment_count(&self) -> usize {
        self.breakpoint_segments.ncols()
    }

    /// Check all matrix shapes against each other and the value domain of each matrix
    ///
    pub fn validate(&self) -> SolveResult<()> {
        let sample_count = self.sample_count();
        let breakpoint_count = self.breakpoint_count();
        let segment_count = self.segment_count();

        if sample_count == 0 {
            return Err(SolveError::MalformedInput(
                "Mixed copy number matrix has no samples".to_string(),
            ));
        }
        if segment_count == 0 {
            return Err(SolveError::MalformedInput(
                "Breakpoint-segment matrix has no segments".to_string(),
            ));
        }

        check_shape(
            "Mixed copy number",
            &self.mixed_copy_number,
            sample_count,
            breakpoint_count + segment_count,
        )?;
        check_shape(
            "Mate pair",
            &self.mate_pairs,
            breakpoint_count,
            breakpoint_count,
        )?;
        check_shape(
            "Allele count",
            &self.allele_counts,
            sample_count,
            breakpoint_count,
        )?;
        check_shape(
            "Total depth",
            &self.total_depth,
            sample_count,
            breakpoint_count,
        )?;

        check_nonnegative("Mixed copy number", &self.mixed_copy_number)?;
        check_nonnegative("Allele count", &self.allele_counts)?;
        check_nonnegative("Total depth", &self.total_depth)?;
        check_binary("Breakpoint-segment", &self.breakpoint_segments)?;
        check_binary("Mate pair", &self.mate_pairs)?;

        for breakpoint_index in 0..breakpoint_count {
            let row = self.breakpoint_segments.row(breakpoint_index);
            if row.iter().all(|x| *x == 0.0) {
                return Err(SolveError::MalformedInput(format!(
                    "Breakpoint {breakpoint_index} is not contained in any segment"
                )));
            }
        }

        for i in 0..breakpoint_count {
            for j in (i + 1)..breakpoint_count {
                if self.mate_pairs[(i, j)] != self.mate_pairs[(j, i)] {
                    return Err(SolveError::MalformedInput(format!(
                        "Mate pair matrix is not symmetric at breakpoints {i} and {j}"
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Check that a usage matrix has the expected shape and that every row is on the probability simplex
///
pub fn check_usage_matrix(
    usage: &DMatrix<f64>,
    sample_count: usize,
    node_count: usize,
) -> SolveResult<()> {
    check_shape("Usage", usage, sample_count, node_count)?;
    for (sample_index, row) in usage.row_iter().enumerate() {
        if row.iter().any(|x| !x.is_finite() || *x < -SIMPLEX_TOLERANCE) {
            return Err(SolveError::MalformedInput(format!(
                "Usage row for sample {sample_index} contains a negative or non-finite value"
            )));
        }
        let sum = row.sum();
        if (sum - 1.0).abs() > SIMPLEX_TOLERANCE {
            return Err(SolveError::MalformedInput(format!(
                "Usage row for sample {sample_index} sums to {sum} instead of 1"
            )));
        }
    }
    Ok(())
}

/// Index structures derived from the breakpoint-segment and mate pair matrices
///
/// Mate groups are the connected components of the mate pair graph. All breakpoints in one mate group
/// are constrained to the same copy number in every clone, so the copy number search treats each group
/// as a single value.
///
#[derive(Debug)]
pub struct LocusLayout {
    pub breakpoint_count: usize,
    pub segment_count: usize,

    /// Segments containing each breakpoint
    pub breakpoint_segments: Vec<Vec<usize>>,

    /// Breakpoints contained in each segment
    pub segment_breakpoints: Vec<Vec<usize>>,

    /// Breakpoints of each mate group, in ascending order
    pub mate_groups: Vec<Vec<usize>>,

    /// Mate group index of each breakpoint
    pub breakpoint_mate_group: Vec<usize>,

    /// Union of all segments containing any breakpoint of each mate group
    pub mate_group_segments: Vec<Vec<usize>>,

    /// Mate groups with at least one breakpoint in each segment
    pub segment_mate_groups: Vec<Vec<usize>>,
}

impl LocusLayout {
    pub fn new(breakpoint_segments: &DMatrix<f64>, mate_pairs: &DMatrix<f64>) -> Self {
        let breakpoint_count = breakpoint_segments.nrows();
        let segment_count = breakpoint_segments.ncols();

        let mut bp_segments = vec![Vec::new(); breakpoint_count];
        let mut segment_breakpoints = vec![Vec::new(); segment_count];
        for breakpoint_index in 0..breakpoint_count {
            for segment_index in 0..segment_count {
                if breakpoint_segments[(breakpoint_index, segment_index)] != 0.0 {
                    bp_segments[breakpoint_index].push(segment_index);
                    segment_breakpoints[segment_index].push(breakpoint_index);
                }
            }
        }

        // Connected components of the mate pair graph:
        let mut breakpoint_mate_group = vec![usize::MAX; breakpoint_count];
        let mut mate_groups = Vec::new();
        for start_index in 0..breakpoint_count {
            if breakpoint_mate_group[start_index] != usize::MAX {
                continue;
            }
            let group_index = mate_groups.len();
            let mut group = Vec::new();
            let mut stack = vec![start_index];
            breakpoint_mate_group[start_index] = group_index;
            while let Some(breakpoint_index) = stack.pop() {
                group.push(breakpoint_index);
                for mate_index in 0..breakpoint_count {
                    if mate_pairs[(breakpoint_index, mate_index)] != 0.0
                        && breakpoint_mate_group[mate_index] == usize::MAX
                    {
                        breakpoint_mate_group[mate_index] = group_index;
                        stack.push(mate_index);
                    }
                }
            }
            group.sort_unstable();
            mate_groups.push(group);
        }

        let mut mate_group_segments = Vec::new();
        let mut segment_mate_groups = vec![Vec::new(); segment_count];
        for (group_index, group) in mate_groups.iter().enumerate() {
            let mut segments = group
                .iter()
                .flat_map(|b| bp_segments[*b].iter().copied())
                .collect::<Vec<_>>();
            segments.sort_unstable();
            segments.dedup();
            for segment_index in segments.iter() {
                segment_mate_groups[*segment_index].push(group_index);
            }
            mate_group_segments.push(segments);
        }

        Self {
            breakpoint_count,
            segment_count,
            breakpoint_segments: bp_segments,
            segment_breakpoints,
            mate_groups,
            breakpoint_mate_group,
            mate_group_segments,
            segment_mate_groups,
        }
    }

    pub fn locus_count(&self) -> usize {
        self.breakpoint_count + self.segment_count
    }

    pub fn segment_locus(&self, segment_index: usize) -> usize {
        self.breakpoint_count + segment_index
    }
}

/// Set one copy number row to the germline state
pub fn set_germline_row(copy_number: &mut DMatrix<f64>, node_index: usize, breakpoint_count: usize) {
    for locus_index in 0..copy_number.ncols() {
        copy_number[(node_index, locus_index)] = if locus_index < breakpoint_count {
            GERMLINE_BREAKPOINT_COPY_NUMBER
        } else {
            GERMLINE_SEGMENT_COPY_NUMBER
        };
    }
}

/// Regularization weights of the composite objective
///
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct ObjectiveWeights {
    /// Weight of the gap between breakpoint copy number and the copy number of its containing segments
    pub lambda1: f64,

    /// Weight of the mismatch between observed allele read counts and copy number implied breakpoint
    /// fractions
    pub lambda2: f64,
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            lambda1: 1.0,
            lambda2: 0.01,
        }
    }
}

/// Weighted contribution of each term to the composite objective
///
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct ObjectiveTerms {
    /// L1 distance between observed and reconstructed mixed copy number
    pub reconstruction: f64,

    /// lambda1-weighted breakpoint to segment copy number gap
    pub adjacency: f64,

    /// lambda2-weighted allele read count mismatch
    pub allele: f64,
}

impl ObjectiveTerms {
    pub fn total(&self) -> f64 {
        self.reconstruction + self.adjacency + self.allele
    }
}

/// Reconstructed mixed copy number E = U·C
pub fn get_mixed_copy_number(usage: &DMatrix<f64>, copy_number: &DMatrix<f64>) -> DMatrix<f64> {
    usage * copy_number
}

/// Unweighted L1 reconstruction error of one locus column
pub fn get_locus_reconstruction_cost(
    observations: &CloneObservations,
    mixed_copy_number: &DMatrix<f64>,
    locus_index: usize,
) -> f64 {
    (0..observations.sample_count())
        .map(|sample_index| {
            (observations.mixed_copy_number[(sample_index, locus_index)]
                - mixed_copy_number[(sample_index, locus_index)])
                .abs()
        })
        .sum()
}

/// Unweighted allele read count mismatch of one breakpoint
///
/// For each sample this is `|H * E_b - A * mean(E_s)|` over the segments `s` containing breakpoint `b`,
/// the count-scaled linearization of comparing the allele fraction `A/H` to the breakpoint fraction
/// `E_b / mean(E_s)`. Loci without read depth contribute nothing.
///
pub fn get_breakpoint_allele_cost(
    observations: &CloneObservations,
    layout: &LocusLayout,
    mixed_copy_number: &DMatrix<f64>,
    breakpoint_index: usize,
) -> f64 {
    let segments = &layout.breakpoint_segments[breakpoint_index];
    if segments.is_empty() {
        return 0.0;
    }
    let mut cost = 0.0;
    for sample_index in 0..observations.sample_count() {
        let depth = observations.total_depth[(sample_index, breakpoint_index)];
        let allele_count = observations.allele_counts[(sample_index, breakpoint_index)];
        let segment_mean = segments
            .iter()
            .map(|s| mixed_copy_number[(sample_index, layout.segment_locus(*s))])
            .sum::<f64>()
            / segments.len() as f64;
        cost += (depth * mixed_copy_number[(sample_index, breakpoint_index)]
            - allele_count * segment_mean)
            .abs();
    }
    cost
}

/// Unweighted copy number gap between one breakpoint and one containing segment, summed over all clones
pub fn get_adjacency_cost(
    layout: &LocusLayout,
    copy_number: &DMatrix<f64>,
    breakpoint_index: usize,
    segment_index: usize,
) -> f64 {
    let segment_locus = layout.segment_locus(segment_index);
    (0..copy_number.nrows())
        .map(|node_index| {
            copy_number[(node_index, segment_locus)] - copy_number[(node_index, breakpoint_index)]
        })
        .sum()
}

/// Evaluate the composite objective given a precomputed mixed copy number matrix
///
pub fn compute_objective_terms(
    observations: &CloneObservations,
    layout: &LocusLayout,
    copy_number: &DMatrix<f64>,
    mixed_copy_number: &DMatrix<f64>,
    weights: &ObjectiveWeights,
) -> ObjectiveTerms {
    let reconstruction = (0..layout.locus_count())
        .map(|locus_index| {
            get_locus_reconstruction_cost(observations, mixed_copy_number, locus_index)
        })
        .sum();

    let mut adjacency = 0.0;
    for (breakpoint_index, segments) in layout.breakpoint_segments.iter().enumerate() {
        for segment_index in segments.iter() {
            adjacency += get_adjacency_cost(layout, copy_number, breakpoint_index, *segment_index);
        }
    }

    let allele = (0..layout.breakpoint_count)
        .map(|breakpoint_index| {
            get_breakpoint_allele_cost(observations, layout, mixed_copy_number, breakpoint_index)
        })
        .sum::<f64>();

    ObjectiveTerms {
        reconstruction,
        adjacency: weights.lambda1 * adjacency,
        allele: weights.lambda2 * allele,
    }
}

/// Evaluate the composite objective for a usage and copy number matrix pair
///
pub fn compute_objective(
    observations: &CloneObservations,
    layout: &LocusLayout,
    usage: &DMatrix<f64>,
    copy_number: &DMatrix<f64>,
    weights: &ObjectiveWeights,
) -> ObjectiveTerms {
    let mixed_copy_number = get_mixed_copy_number(usage, copy_number);
    compute_objective_terms(
        observations,
        layout,
        copy_number,
        &mixed_copy_number,
        weights,
    )
}
