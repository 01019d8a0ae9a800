//! Alternating joint estimation of clone usage and clone copy number
//!
//! Each round runs the copy number estimator with the current usage matrix, then the usage estimator with
//! the resulting copy number matrix. Both half-steps are optimal only for the other matrix held fixed, so
//! the joint objective is not monotone over the alternation. The driver keeps the best state seen after
//! any half-step and returns that state, not the last one.
//!

use hhmmss::Hhmmss;
use log::{debug, info};
use nalgebra::DMatrix;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use serde::{Deserialize, Serialize};
use unwrap::unwrap;

use crate::clone_model::{
    CloneObservations, LocusLayout, ObjectiveTerms, ObjectiveWeights, compute_objective_terms,
    get_clone_node_count, get_mixed_copy_number,
};
use crate::copy_number_estimator::{
    CopyNumberProblem, CopyNumberSolverSettings, estimate_copy_number_with_settings,
};
use crate::solve_error::{SolveError, SolveResult};
use crate::usage_estimator::{UsageSolverSettings, estimate_usage_with_settings};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct JointSolveSettings {
    /// Leaf clone count, the clone tree has `2 * clone_count - 1` nodes
    pub clone_count: usize,

    pub max_copy_number: u32,

    pub weights: ObjectiveWeights,

    /// Maximum number of copy number/usage rounds. A value of 0 still runs one round.
    pub max_iterations: usize,

    /// Stop once a round improves the best objective by less than this fraction of its magnitude
    pub convergence_tolerance: f64,

    /// Seed for the random initial usage matrix
    pub seed: u64,
}

impl Default for JointSolveSettings {
    fn default() -> Self {
        Self {
            clone_count: 2,
            max_copy_number: 7,
            weights: ObjectiveWeights::default(),
            max_iterations: 10,
            convergence_tolerance: 1e-6,
            seed: 1,
        }
    }
}

/// Final state of the joint solve
#[derive(Clone, Debug)]
pub struct JointSolution {
    /// U: sample x clone node usage
    pub usage: DMatrix<f64>,

    /// C: clone node x locus copy number
    pub copy_number: DMatrix<f64>,

    /// E = U·C
    pub mixed_copy_number: DMatrix<f64>,

    pub objective: f64,
    pub objective_terms: ObjectiveTerms,

    /// Number of copy number/usage rounds run
    pub iteration_count: usize,

    /// True if the solve stopped because the objective stopped improving
    pub converged: bool,

    /// Joint objective after every half-step, in run order
    pub objective_trace: Vec<f64>,
}

/// Random starting usage matrix, each row is a uniform draw normalized onto the simplex
///
pub fn get_initial_usage(sample_count: usize, node_count: usize, seed: u64) -> DMatrix<f64> {
    let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(seed);
    let mut usage = DMatrix::from_fn(sample_count, node_count, |_, _| {
        // Keep every weight positive so each row has a non-zero sum
        rng.gen_range(f64::EPSILON..1.0)
    });
    for mut row in usage.row_iter_mut() {
        let sum = row.sum();
        row /= sum;
    }
    usage
}

fn check_joint_settings(settings: &JointSolveSettings) -> SolveResult<()> {
    if !settings.convergence_tolerance.is_finite() || settings.convergence_tolerance < 0.0 {
        return Err(SolveError::MalformedInput(format!(
            "Convergence tolerance must be finite and non-negative, found {}",
            settings.convergence_tolerance
        )));
    }
    Ok(())
}

struct JointState {
    usage: DMatrix<f64>,
    copy_number: DMatrix<f64>,
    objective_terms: ObjectiveTerms,
}

impl JointState {
    fn objective(&self) -> f64 {
        self.objective_terms.total()
    }
}

/// Estimate U, C and E jointly with default estimator settings
///
/// See `solve_joint_with_settings`.
///
pub fn solve_joint(
    observations: &CloneObservations,
    settings: &JointSolveSettings,
) -> SolveResult<JointSolution> {
    solve_joint_with_settings(
        observations,
        settings,
        &UsageSolverSettings::default(),
        &CopyNumberSolverSettings::default(),
    )
}

/// Estimate U, C and E jointly by alternating the copy number and usage estimators
///
/// Returns the lowest objective state seen over all half-steps, or the first error reported by either
/// estimator. No estimator error is retried.
///
pub fn solve_joint_with_settings(
    observations: &CloneObservations,
    settings: &JointSolveSettings,
    usage_settings: &UsageSolverSettings,
    copy_number_settings: &CopyNumberSolverSettings,
) -> SolveResult<JointSolution> {
    observations.validate()?;
    check_joint_settings(settings)?;
    let node_count = get_clone_node_count(settings.clone_count)?;
    let layout = LocusLayout::new(&observations.breakpoint_segments, &observations.mate_pairs);

    let start = std::time::Instant::now();
    let round_count = settings.max_iterations.max(1);

    info!(
        "Starting joint solve for {} samples, {} breakpoints, {} segments and {node_count} clone nodes",
        observations.sample_count(),
        observations.breakpoint_count(),
        observations.segment_count()
    );

    let mut usage = get_initial_usage(observations.sample_count(), node_count, settings.seed);
    let mut previous_copy_number: Option<DMatrix<f64>> = None;
    let mut best_state: Option<JointState> = None;
    let mut objective_trace = Vec::new();
    let mut iteration_count = 0;
    let mut converged = false;

    for round_index in 0..round_count {
        iteration_count += 1;
        let previous_best = best_state.as_ref().map(|x| x.objective());

        // Copy number half-step
        let copy_number_solution = {
            let problem = CopyNumberProblem {
                observations,
                usage: &usage,
                clone_count: settings.clone_count,
                max_copy_number: settings.max_copy_number,
                weights: settings.weights,
                warm_start: previous_copy_number.as_ref(),
            };
            estimate_copy_number_with_settings(&problem, copy_number_settings)?
        };
        objective_trace.push(copy_number_solution.objective);
        let copy_number_state = JointState {
            usage: usage.clone(),
            copy_number: copy_number_solution.copy_number,
            objective_terms: copy_number_solution.objective_terms,
        };

        // Usage half-step
        let next_usage = estimate_usage_with_settings(
            &observations.mixed_copy_number,
            &copy_number_state.copy_number,
            settings.clone_count,
            usage_settings,
        )?;
        let usage_objective_terms = compute_objective_terms(
            observations,
            &layout,
            &copy_number_state.copy_number,
            &get_mixed_copy_number(&next_usage, &copy_number_state.copy_number),
            &settings.weights,
        );
        objective_trace.push(usage_objective_terms.total());
        let usage_state = JointState {
            usage: next_usage.clone(),
            copy_number: copy_number_state.copy_number.clone(),
            objective_terms: usage_objective_terms,
        };

        info!(
            "Joint solve round {}: copy number step objective {:.6}, usage step objective {:.6}",
            round_index + 1,
            copy_number_state.objective(),
            usage_state.objective()
        );

        previous_copy_number = Some(copy_number_state.copy_number.clone());
        usage = next_usage;

        for state in [copy_number_state, usage_state] {
            if best_state
                .as_ref()
                .is_none_or(|x| state.objective() < x.objective())
            {
                best_state = Some(state);
            }
        }

        if let Some(previous_best) = previous_best {
            let best = best_state.as_ref().map_or(previous_best, |x| x.objective());
            let improvement = previous_best - best;
            debug!("Joint solve round {} improvement {improvement}", round_index + 1);
            if improvement < settings.convergence_tolerance * previous_best.abs().max(1.0) {
                converged = true;
                break;
            }
        }
    }

    let best_state = unwrap!(best_state, "Joint solve completed without any rounds");
    let mixed_copy_number = get_mixed_copy_number(&best_state.usage, &best_state.copy_number);

    info!(
        "Finished joint solve after {iteration_count} rounds (converged: {converged}), objective {:.6}, runtime {}",
        best_state.objective(),
        start.elapsed().hhmmssxxx()
    );

    Ok(JointSolution {
        objective: best_state.objective(),
        objective_terms: best_state.objective_terms,
        usage: best_state.usage,
        copy_number: best_state.copy_number,
        mixed_copy_number,
        iteration_count,
        converged,
        objective_trace,
    })
}
