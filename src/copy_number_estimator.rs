//! Estimate the integer clone copy number matrix given a fixed usage matrix
//!
//! The search runs directly over integer copy numbers bounded by the max copy number. Each non-root clone
//! node holds one value per segment and one value per mate group, so mate pair equality holds by
//! construction. Every move repairs the breakpoint-in-segment constraint: lowering a segment lowers any
//! mate group above it, and raising a mate group raises any segment below it.
//!
//! Moves are evaluated by applying them to the current state, measuring the objective change over the
//! loci they touched, and reverting. The search is a deterministic descent which finishes once a complete
//! sweep over all moves finds no improvement.
//!

use log::debug;
use nalgebra::DMatrix;

use crate::clone_model::{
    CloneObservations, LocusLayout, ObjectiveTerms, ObjectiveWeights, check_usage_matrix,
    compute_objective_terms, get_adjacency_cost, get_breakpoint_allele_cost, get_clone_node_count,
    get_locus_reconstruction_cost, get_mixed_copy_number, get_root_node_index, set_germline_row,
};
use crate::copy_number_constraints::{
    CopyNumberConstraintBuilder, LinearConstraint, find_violated_constraint,
    get_constraint_class_counts, propagate_copy_number_bounds,
};
use crate::log_utils::debug_msg;
use crate::solve_error::{SolveError, SolveResult};

/// Largest supported max copy number setting
pub const MAX_COPY_NUMBER_LIMIT: u32 = 255;

#[derive(Clone, Debug)]
pub struct CopyNumberSolverSettings {
    /// Limit on the number of complete sweeps over all moves
    pub max_sweeps: usize,

    /// A move is only accepted if it lowers the objective by more than this value
    pub improvement_tolerance: f64,
}

impl Default for CopyNumberSolverSettings {
    fn default() -> Self {
        Self {
            max_sweeps: 500,
            improvement_tolerance: 1e-9,
        }
    }
}

/// All inputs to one copy number estimation
pub struct CopyNumberProblem<'a> {
    pub observations: &'a CloneObservations,

    /// Sample x clone node usage matrix, held fixed
    pub usage: &'a DMatrix<f64>,

    pub clone_count: usize,
    pub max_copy_number: u32,
    pub weights: ObjectiveWeights,

    /// Optional copy number matrix to start the search from. It is only used if it satisfies every
    /// copy number constraint.
    pub warm_start: Option<&'a DMatrix<f64>>,
}

#[derive(Clone, Debug)]
pub struct CopyNumberSolution {
    pub objective: f64,
    pub objective_terms: ObjectiveTerms,

    /// C: clone node x locus copy number
    pub copy_number: DMatrix<f64>,

    /// E = U·C
    pub mixed_copy_number: DMatrix<f64>,

    /// R = F - E
    pub residual: DMatrix<f64>,

    /// Number of search sweeps completed
    pub sweep_count: usize,
}

/// Copy number values which the search assigns as a single unit in one clone node
#[derive(Clone, Copy, Debug)]
enum CopyNumberTarget {
    Segment(usize),
    MateGroup(usize),
}

#[derive(Clone, Copy, Debug)]
enum SearchMove {
    /// Set the target to the given value in one clone node
    Assign {
        node: usize,
        target: CopyNumberTarget,
        value: f64,
    },

    /// Move one copy of the target from one clone node to another
    Transfer {
        from_node: usize,
        to_node: usize,
        target: CopyNumberTarget,
    },
}

struct CopyNumberSearch<'a> {
    observations: &'a CloneObservations,
    layout: &'a LocusLayout,
    usage: &'a DMatrix<f64>,
    weights: ObjectiveWeights,
    max_copy_number: f64,
    targets: Vec<CopyNumberTarget>,

    copy_number: DMatrix<f64>,
    mixed_copy_number: DMatrix<f64>,

    /// Previous values of each (node, locus) entry changed since the last commit
    change_log: Vec<(usize, usize, f64)>,
}

impl<'a> CopyNumberSearch<'a> {
    fn new(
        observations: &'a CloneObservations,
        layout: &'a LocusLayout,
        usage: &'a DMatrix<f64>,
        weights: ObjectiveWeights,
        max_copy_number: u32,
        copy_number: DMatrix<f64>,
    ) -> Self {
        let mixed_copy_number = get_mixed_copy_number(usage, &copy_number);
        let targets = (0..layout.segment_count)
            .map(CopyNumberTarget::Segment)
            .chain((0..layout.mate_groups.len()).map(CopyNumberTarget::MateGroup))
            .collect();
        Self {
            observations,
            layout,
            usage,
            weights,
            max_copy_number: max_copy_number as f64,
            targets,
            copy_number,
            mixed_copy_number,
            change_log: Vec::new(),
        }
    }

    fn node_count(&self) -> usize {
        self.copy_number.nrows()
    }

    fn write_entry(&mut self, node: usize, locus: usize, value: f64) {
        let delta = value - self.copy_number[(node, locus)];
        self.copy_number[(node, locus)] = value;
        for sample_index in 0..self.mixed_copy_number.nrows() {
            self.mixed_copy_number[(sample_index, locus)] += self.usage[(sample_index, node)] * delta;
        }
    }

    fn set_entry(&mut self, node: usize, locus: usize, value: f64) {
        let previous = self.copy_number[(node, locus)];
        if previous == value {
            return;
        }
        self.change_log.push((node, locus, previous));
        self.write_entry(node, locus, value);
    }

    fn set_mate_group(&mut self, node: usize, group_index: usize, value: f64) {
        for breakpoint_index in 0..self.layout.mate_groups[group_index].len() {
            let locus = self.layout.mate_groups[group_index][breakpoint_index];
            self.set_entry(node, locus, value);
        }
    }

    fn get_target_value(&self, node: usize, target: CopyNumberTarget) -> f64 {
        let locus = match target {
            CopyNumberTarget::Segment(s) => self.layout.segment_locus(s),
            CopyNumberTarget::MateGroup(g) => self.layout.mate_groups[g][0],
        };
        self.copy_number[(node, locus)]
    }

    /// Set a target value in one node, repairing the breakpoint-in-segment constraint
    fn set_target(&mut self, node: usize, target: CopyNumberTarget, value: f64) {
        match target {
            CopyNumberTarget::Segment(segment_index) => {
                self.set_entry(node, self.layout.segment_locus(segment_index), value);
                for i in 0..self.layout.segment_mate_groups[segment_index].len() {
                    let group_index = self.layout.segment_mate_groups[segment_index][i];
                    if self.get_target_value(node, CopyNumberTarget::MateGroup(group_index)) > value
                    {
                        self.set_mate_group(node, group_index, value);
                    }
                }
            }
            CopyNumberTarget::MateGroup(group_index) => {
                self.set_mate_group(node, group_index, value);
                for i in 0..self.layout.mate_group_segments[group_index].len() {
                    let segment_index = self.layout.mate_group_segments[group_index][i];
                    let locus = self.layout.segment_locus(segment_index);
                    if self.copy_number[(node, locus)] < value {
                        self.set_entry(node, locus, value);
                    }
                }
            }
        }
    }

    /// Apply a move, returns false without changing state if the move is out of bounds
    fn apply_move(&mut self, search_move: SearchMove) -> bool {
        match search_move {
            SearchMove::Assign {
                node,
                target,
                value,
            } => {
                self.set_target(node, target, value);
            }
            SearchMove::Transfer {
                from_node,
                to_node,
                target,
            } => {
                let from_value = self.get_target_value(from_node, target);
                let to_value = self.get_target_value(to_node, target);
                if from_value < 1.0 || to_value + 1.0 > self.max_copy_number {
                    return false;
                }
                self.set_target(from_node, target, from_value - 1.0);
                self.set_target(to_node, target, to_value + 1.0);
            }
        }
        true
    }

    fn revert(&mut self) {
        while let Some((node, locus, previous)) = self.change_log.pop() {
            self.write_entry(node, locus, previous);
        }
    }

    fn commit(&mut self) {
        self.change_log.clear();
    }

    fn get_changed_loci(&self) -> Vec<usize> {
        let mut loci = self
            .change_log
            .iter()
            .map(|(_, locus, _)| *locus)
            .collect::<Vec<_>>();
        loci.sort_unstable();
        loci.dedup();
        loci
    }

    /// Objective contribution of every term which depends on the given loci
    fn get_local_cost(&self, loci: &[usize]) -> f64 {
        let layout = self.layout;

        let mut breakpoints = Vec::new();
        let mut adjacent_pairs = Vec::new();
        for &locus in loci.iter() {
            if locus < layout.breakpoint_count {
                breakpoints.push(locus);
                for &segment_index in layout.breakpoint_segments[locus].iter() {
                    adjacent_pairs.push((locus, segment_index));
                }
            } else {
                let segment_index = locus - layout.breakpoint_count;
                for &breakpoint_index in layout.segment_breakpoints[segment_index].iter() {
                    breakpoints.push(breakpoint_index);
                    adjacent_pairs.push((breakpoint_index, segment_index));
                }
            }
        }
        breakpoints.sort_unstable();
        breakpoints.dedup();
        adjacent_pairs.sort_unstable();
        adjacent_pairs.dedup();

        let reconstruction = loci
            .iter()
            .map(|locus| {
                get_locus_reconstruction_cost(self.observations, &self.mixed_copy_number, *locus)
            })
            .sum::<f64>();
        let allele = breakpoints
            .iter()
            .map(|b| {
                get_breakpoint_allele_cost(self.observations, layout, &self.mixed_copy_number, *b)
            })
            .sum::<f64>();
        let adjacency = adjacent_pairs
            .iter()
            .map(|(b, s)| get_adjacency_cost(layout, &self.copy_number, *b, *s))
            .sum::<f64>();

        reconstruction + self.weights.lambda1 * adjacency + self.weights.lambda2 * allele
    }

    /// Objective change from a move, or None if the move is not applicable
    ///
    /// The search state is unchanged on return.
    ///
    fn evaluate_move(&mut self, search_move: SearchMove) -> Option<f64> {
        if !self.apply_move(search_move) {
            return None;
        }
        let loci = self.get_changed_loci();
        let after = self.get_local_cost(&loci);
        self.revert();
        let before = self.get_local_cost(&loci);
        Some(after - before)
    }

    fn accept_move(&mut self, search_move: SearchMove) {
        self.apply_move(search_move);
        self.commit();
    }

    /// Run one sweep over all moves, returns true if any move was accepted
    fn run_sweep(&mut self, improvement_tolerance: f64) -> bool {
        let mut improved = false;
        let free_node_count = get_root_node_index(self.node_count());
        let max_value = self.max_copy_number as usize;

        // Exhaustive reassignment of each target in each node:
        for node in 0..free_node_count {
            for target_index in 0..self.targets.len() {
                let target = self.targets[target_index];
                let current = self.get_target_value(node, target);
                let mut best: Option<(f64, SearchMove)> = None;
                for value in 0..=max_value {
                    let value = value as f64;
                    if value == current {
                        continue;
                    }
                    let search_move = SearchMove::Assign {
                        node,
                        target,
                        value,
                    };
                    if let Some(delta) = self.evaluate_move(search_move) {
                        let best_delta = best.map_or(-improvement_tolerance, |x| x.0);
                        if delta < best_delta {
                            best = Some((delta, search_move));
                        }
                    }
                }
                if let Some((_, search_move)) = best {
                    self.accept_move(search_move);
                    improved = true;
                }
            }
        }

        // Unit copy transfers between pairs of nodes:
        for target_index in 0..self.targets.len() {
            let target = self.targets[target_index];
            for from_node in 0..free_node_count {
                for to_node in 0..free_node_count {
                    if from_node == to_node {
                        continue;
                    }
                    let search_move = SearchMove::Transfer {
                        from_node,
                        to_node,
                        target,
                    };
                    if let Some(delta) = self.evaluate_move(search_move)
                        && delta < -improvement_tolerance
                    {
                        self.accept_move(search_move);
                        improved = true;
                    }
                }
            }
        }

        improved
    }
}

/// Copy number matrix with every clone node in the germline state
fn get_germline_start(node_count: usize, layout: &LocusLayout) -> DMatrix<f64> {
    let mut copy_number = DMatrix::zeros(node_count, layout.locus_count());
    for node in 0..node_count {
        set_germline_row(&mut copy_number, node, layout.breakpoint_count);
    }
    copy_number
}

/// Mean observed signal over all samples and the given loci, rounded and clamped to a valid copy number
fn get_rounded_mean_signal(
    observations: &CloneObservations,
    loci: &[usize],
    max_copy_number: f64,
) -> f64 {
    let f = &observations.mixed_copy_number;
    let total = loci.iter().map(|locus| f.column(*locus).sum()).sum::<f64>();
    (total / (observations.sample_count() * loci.len()) as f64)
        .round()
        .clamp(0.0, max_copy_number)
}

/// Copy number matrix with every non-root node set to the rounded sample mean signal of each locus
///
/// Mate group values are capped at the value of their segments so the result is feasible.
///
fn get_mean_signal_start(
    observations: &CloneObservations,
    layout: &LocusLayout,
    node_count: usize,
    max_copy_number: u32,
) -> DMatrix<f64> {
    let max_copy_number = max_copy_number as f64;
    let segment_values = (0..layout.segment_count)
        .map(|s| {
            get_rounded_mean_signal(observations, &[layout.segment_locus(s)], max_copy_number)
        })
        .collect::<Vec<_>>();
    let group_values = layout
        .mate_groups
        .iter()
        .zip(layout.mate_group_segments.iter())
        .map(|(group, segments)| {
            segments
                .iter()
                .map(|s| segment_values[*s])
                .fold(
                    get_rounded_mean_signal(observations, group, max_copy_number),
                    f64::min,
                )
        })
        .collect::<Vec<_>>();

    let mut copy_number = get_germline_start(node_count, layout);
    for node in 0..get_root_node_index(node_count) {
        for (segment_index, value) in segment_values.iter().enumerate() {
            copy_number[(node, layout.segment_locus(segment_index))] = *value;
        }
        for (group, value) in layout.mate_groups.iter().zip(group_values.iter()) {
            for breakpoint_index in group.iter() {
                copy_number[(node, *breakpoint_index)] = *value;
            }
        }
    }
    copy_number
}

fn is_valid_warm_start(
    warm_start: &DMatrix<f64>,
    constraints: &[LinearConstraint],
    node_count: usize,
    locus_count: usize,
) -> bool {
    warm_start.nrows() == node_count
        && warm_start.ncols() == locus_count
        && warm_start.iter().all(|x| x.is_finite() && *x == x.round())
        && find_violated_constraint(constraints, warm_start).is_none()
}

fn check_problem_settings(problem: &CopyNumberProblem) -> SolveResult<()> {
    if problem.max_copy_number > MAX_COPY_NUMBER_LIMIT {
        return Err(SolveError::MalformedInput(format!(
            "Max copy number {} exceeds the supported limit of {MAX_COPY_NUMBER_LIMIT}",
            problem.max_copy_number
        )));
    }
    let weights = problem.weights;
    if [weights.lambda1, weights.lambda2]
        .iter()
        .any(|x| !x.is_finite() || *x < 0.0)
    {
        return Err(SolveError::MalformedInput(format!(
            "Objective weights must be finite and non-negative, found lambda1: {} lambda2: {}",
            weights.lambda1, weights.lambda2
        )));
    }
    Ok(())
}

/// Estimate clone copy number C given F, U, Q, G, A and H
///
/// This is the plain form of the estimator, see `estimate_copy_number_with_settings`.
///
pub fn estimate_copy_number(
    observations: &CloneObservations,
    usage: &DMatrix<f64>,
    clone_count: usize,
    max_copy_number: u32,
    lambda1: f64,
    lambda2: f64,
) -> SolveResult<CopyNumberSolution> {
    let problem = CopyNumberProblem {
        observations,
        usage,
        clone_count,
        max_copy_number,
        weights: ObjectiveWeights { lambda1, lambda2 },
        warm_start: None,
    };
    estimate_copy_number_with_settings(&problem, &CopyNumberSolverSettings::default())
}

/// Estimate clone copy number C given a fixed usage matrix
///
/// Returns the objective value with its term breakdown, C, E = U·C and the residual R = F - E.
///
/// Returns an `InfeasibleConstraints` error if the constraint system admits no copy number matrix for the
/// given max copy number, and a `SolverNonconvergence` error if the search did not finish within the sweep
/// limit.
///
pub fn estimate_copy_number_with_settings(
    problem: &CopyNumberProblem,
    settings: &CopyNumberSolverSettings,
) -> SolveResult<CopyNumberSolution> {
    let debug = false;

    let observations = problem.observations;
    observations.validate()?;
    check_problem_settings(problem)?;

    let node_count = get_clone_node_count(problem.clone_count)?;
    check_usage_matrix(problem.usage, observations.sample_count(), node_count)?;

    let layout = LocusLayout::new(&observations.breakpoint_segments, &observations.mate_pairs);
    let locus_count = layout.locus_count();

    let constraints = CopyNumberConstraintBuilder::new(
        &observations.breakpoint_segments,
        &observations.mate_pairs,
        node_count,
        problem.max_copy_number,
    )
    .build();
    debug!(
        "Copy number constraint counts by class: {:?}",
        get_constraint_class_counts(&constraints)
    );
    propagate_copy_number_bounds(&constraints, node_count, locus_count)?;

    // Select the best feasible starting point:
    let mut starts = vec![
        get_germline_start(node_count, &layout),
        get_mean_signal_start(observations, &layout, node_count, problem.max_copy_number),
    ];
    if let Some(warm_start) = problem.warm_start {
        if is_valid_warm_start(warm_start, &constraints, node_count, locus_count) {
            starts.push(warm_start.clone());
        } else {
            debug!("Ignoring copy number warm start which does not satisfy all constraints");
        }
    }
    let start_objective = |copy_number: &DMatrix<f64>| {
        let mixed_copy_number = get_mixed_copy_number(problem.usage, copy_number);
        compute_objective_terms(
            observations,
            &layout,
            copy_number,
            &mixed_copy_number,
            &problem.weights,
        )
        .total()
    };
    let mut best_start_index = 0;
    let mut best_start_objective = f64::INFINITY;
    for (start_index, start) in starts.iter().enumerate() {
        let objective = start_objective(start);
        if objective < best_start_objective {
            best_start_index = start_index;
            best_start_objective = objective;
        }
    }
    let start = starts.swap_remove(best_start_index);

    let mut search = CopyNumberSearch::new(
        observations,
        &layout,
        problem.usage,
        problem.weights,
        problem.max_copy_number,
        start,
    );

    let mut sweep_count = 0;
    let mut converged = false;
    while sweep_count < settings.max_sweeps {
        sweep_count += 1;
        let improved = search.run_sweep(settings.improvement_tolerance);
        debug_msg!(debug, "Copy number search sweep {sweep_count} improved: {improved}");
        if !improved {
            converged = true;
            break;
        }
    }
    if !converged {
        return Err(SolveError::SolverNonconvergence(format!(
            "Copy number search was still improving after {} sweeps",
            settings.max_sweeps
        )));
    }

    let copy_number = search.copy_number;
    let violated_constraint = find_violated_constraint(&constraints, &copy_number);
    assert!(
        violated_constraint.is_none(),
        "Copy number search produced a solution violating a {} constraint",
        violated_constraint.map_or("", |x| x.class.as_ref())
    );

    // Recompute from scratch to avoid accumulated incremental update error:
    let mixed_copy_number = get_mixed_copy_number(problem.usage, &copy_number);
    let objective_terms = compute_objective_terms(
        observations,
        &layout,
        &copy_number,
        &mixed_copy_number,
        &problem.weights,
    );
    let residual = &observations.mixed_copy_number - &mixed_copy_number;

    debug!(
        "Copy number search finished after {sweep_count} sweeps, objective {} (start objective {best_start_objective})",
        objective_terms.total()
    );

    Ok(CopyNumberSolution {
        objective: objective_terms.total(),
        objective_terms,
        copy_number,
        mixed_copy_number,
        residual,
        sweep_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clone_model::compute_objective;
    use crate::test_utils::{
        check_copy_number_invariants, get_test_rng, random_observations, random_usage,
    };

    #[test]
    fn test_estimate_copy_number_invariants() {
        let observations = random_observations(1, 3, 6, 10);
        let mut rng = get_test_rng(2);
        let usage = random_usage(&mut rng, 3, 7);

        let solution = estimate_copy_number(&observations, &usage, 4, 7, 1.0, 0.01).unwrap();
        assert_eq!(solution.copy_number.shape(), (7, 16));
        assert_eq!(solution.mixed_copy_number.shape(), (3, 16));
        assert_eq!(solution.residual.shape(), (3, 16));
        check_copy_number_invariants(&observations, &solution.copy_number, 7);

        // Reported objective matches an independent evaluation
        let layout = LocusLayout::new(&observations.breakpoint_segments, &observations.mate_pairs);
        let weights = ObjectiveWeights {
            lambda1: 1.0,
            lambda2: 0.01,
        };
        let terms = compute_objective(
            &observations,
            &layout,
            &usage,
            &solution.copy_number,
            &weights,
        );
        approx::assert_relative_eq!(terms.total(), solution.objective, max_relative = 1e-9);

        let residual = &observations.mixed_copy_number - &usage * &solution.copy_number;
        approx::assert_relative_eq!(residual, solution.residual, epsilon = 1e-9);
    }

    #[test]
    fn test_estimate_copy_number_improves_on_starts() {
        let observations = random_observations(5, 3, 6, 10);
        let mut rng = get_test_rng(6);
        let usage = random_usage(&mut rng, 3, 7);
        let weights = ObjectiveWeights {
            lambda1: 1.0,
            lambda2: 0.01,
        };
        let layout = LocusLayout::new(&observations.breakpoint_segments, &observations.mate_pairs);

        let solution = estimate_copy_number(&observations, &usage, 4, 7, 1.0, 0.01).unwrap();
        let germline = get_germline_start(7, &layout);
        let germline_objective =
            compute_objective(&observations, &layout, &usage, &germline, &weights).total();
        assert!(solution.objective <= germline_objective + 1e-9);
    }

    #[test]
    fn test_estimate_copy_number_warm_start_idempotence() {
        let observations = random_observations(11, 3, 6, 10);
        let mut rng = get_test_rng(12);
        let usage = random_usage(&mut rng, 3, 7);

        let first = estimate_copy_number(&observations, &usage, 4, 7, 1.0, 0.01).unwrap();
        let problem = CopyNumberProblem {
            observations: &observations,
            usage: &usage,
            clone_count: 4,
            max_copy_number: 7,
            weights: ObjectiveWeights {
                lambda1: 1.0,
                lambda2: 0.01,
            },
            warm_start: Some(&first.copy_number),
        };
        let second =
            estimate_copy_number_with_settings(&problem, &CopyNumberSolverSettings::default())
                .unwrap();
        assert!(second.objective <= first.objective + 1e-9);
    }

    #[test]
    fn test_estimate_copy_number_exact_single_clone() {
        // One sample made only of clone 0, with copy numbers consistent with all constraints
        let observations = CloneObservations {
            mixed_copy_number: DMatrix::from_row_slice(1, 4, &[1.0, 1.0, 3.0, 1.0]),
            breakpoint_segments: DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1.0]),
            mate_pairs: DMatrix::from_element(2, 2, 1.0),
            allele_counts: DMatrix::from_row_slice(1, 2, &[33.0, 100.0]),
            total_depth: DMatrix::from_row_slice(1, 2, &[100.0, 100.0]),
        };
        let usage = DMatrix::from_row_slice(1, 3, &[1.0, 0.0, 0.0]);

        let solution = estimate_copy_number(&observations, &usage, 2, 5, 0.0, 0.0).unwrap();
        approx::assert_abs_diff_eq!(solution.objective, 0.0);
        assert_eq!(
            solution.copy_number.row(0).iter().copied().collect::<Vec<_>>(),
            vec![1.0, 1.0, 3.0, 1.0]
        );
        check_copy_number_invariants(&observations, &solution.copy_number, 5);
    }

    #[test]
    fn test_estimate_copy_number_infeasible() {
        let observations = random_observations(1, 2, 4, 5);
        let mut rng = get_test_rng(2);
        let usage = random_usage(&mut rng, 2, 5);

        let result = estimate_copy_number(&observations, &usage, 3, 1, 1.0, 0.01);
        assert!(matches!(result, Err(SolveError::InfeasibleConstraints(_))));
    }

    #[test]
    fn test_estimate_copy_number_malformed_usage() {
        let observations = random_observations(1, 2, 4, 5);
        let usage = DMatrix::from_element(2, 5, 0.5);
        let result = estimate_copy_number(&observations, &usage, 3, 7, 1.0, 0.01);
        assert!(matches!(result, Err(SolveError::MalformedInput(_))));

        let mut rng = get_test_rng(2);
        let usage = random_usage(&mut rng, 2, 5);
        let result = estimate_copy_number(&observations, &usage, 3, 7, -1.0, 0.01);
        assert!(matches!(result, Err(SolveError::MalformedInput(_))));
    }

    #[test]
    fn test_search_move_repairs_constraints() {
        let observations = random_observations(3, 2, 4, 3);
        let layout = LocusLayout::new(&observations.breakpoint_segments, &observations.mate_pairs);
        let mut rng = get_test_rng(4);
        let usage = random_usage(&mut rng, 2, 3);
        let start = get_mean_signal_start(&observations, &layout, 3, 6);
        let mut search = CopyNumberSearch::new(
            &observations,
            &layout,
            &usage,
            ObjectiveWeights::default(),
            6,
            start.clone(),
        );

        // Raising a mate group raises its segments, lowering a segment lowers its mate groups
        search.accept_move(SearchMove::Assign {
            node: 0,
            target: CopyNumberTarget::MateGroup(0),
            value: 6.0,
        });
        check_copy_number_invariants(&observations, &search.copy_number, 6);
        let segment_index = layout.mate_group_segments[0][0];
        search.accept_move(SearchMove::Assign {
            node: 0,
            target: CopyNumberTarget::Segment(segment_index),
            value: 0.0,
        });
        check_copy_number_invariants(&observations, &search.copy_number, 6);
        assert_eq!(
            search.get_target_value(0, CopyNumberTarget::MateGroup(0)),
            0.0
        );

        search.accept_move(SearchMove::Assign {
            node: 1,
            target: CopyNumberTarget::Segment(segment_index),
            value: 3.0,
        });
        check_copy_number_invariants(&observations, &search.copy_number, 6);

        // Incremental mixed copy number tracks the full product
        let expected = &usage * &search.copy_number;
        approx::assert_relative_eq!(search.mixed_copy_number, expected, epsilon = 1e-9);

        // Evaluating a move leaves the state unchanged
        let before = search.copy_number.clone();
        let delta = search.evaluate_move(SearchMove::Transfer {
            from_node: 1,
            to_node: 0,
            target: CopyNumberTarget::Segment(segment_index),
        });
        assert!(delta.is_some());
        assert_eq!(search.copy_number, before);
    }
}
