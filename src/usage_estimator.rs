//! Estimate per-sample clone usage given a fixed clone copy number matrix
//!
//! Each sample row is an independent simplex-constrained least squares problem:
//!
//! minimize `0.5 * |f - u·C|^2` subject to `u >= 0`, `sum(u) = 1`
//!
//! Rows are solved with accelerated projected gradient descent using the exact Euclidean projection onto
//! the probability simplex, and are distributed over the rayon thread pool.
//!

use log::debug;
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::clone_model::get_clone_node_count;
use crate::solve_error::{SolveError, SolveResult};

#[derive(Clone, Debug)]
pub struct UsageSolverSettings {
    /// Iteration limit for each sample row
    pub max_iterations: usize,

    /// Converged once no usage value changes by more than this in one iteration
    pub tolerance: f64,

    /// Converged once one iteration lowers the objective by no more than this fraction of its magnitude
    pub objective_tolerance: f64,
}

impl Default for UsageSolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: 20_000,
            tolerance: 1e-10,
            objective_tolerance: 1e-15,
        }
    }
}

/// Euclidean projection of `x` onto the probability simplex
///
/// Uses the sort-and-threshold method: find the largest threshold `theta` such that
/// `sum(max(x - theta, 0)) = 1`.
///
pub fn project_onto_simplex(x: &[f64]) -> Vec<f64> {
    assert!(!x.is_empty());
    let mut sorted = x.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));

    let mut cumulative_sum = 0.0;
    let mut theta = 0.0;
    for (index, val) in sorted.iter().enumerate() {
        cumulative_sum += val;
        let candidate = (cumulative_sum - 1.0) / (index + 1) as f64;
        if val - candidate > 0.0 {
            theta = candidate;
        }
    }

    x.iter().map(|v| (v - theta).max(0.0)).collect()
}

fn project_vector_onto_simplex(x: &DVector<f64>) -> DVector<f64> {
    DVector::from_vec(project_onto_simplex(x.as_slice()))
}

/// Solve the usage of one sample
///
/// # Arguments
/// * `sample_signal` - Observed mixed copy number of the sample over all loci
/// * `gram` - `C·C^T` for copy number matrix C
/// * `lipschitz` - Largest eigenvalue of `gram`
///
/// Returns the usage row over all clone tree nodes
///
pub fn solve_usage_row(
    sample_signal: &[f64],
    copy_number: &DMatrix<f64>,
    gram: &DMatrix<f64>,
    lipschitz: f64,
    settings: &UsageSolverSettings,
) -> SolveResult<Vec<f64>> {
    let node_count = copy_number.nrows();
    let uniform = DVector::from_element(node_count, 1.0 / node_count as f64);

    // Every point on the simplex is optimal if no clone contributes to any locus
    if lipschitz <= 0.0 {
        return Ok(uniform.as_slice().to_vec());
    }

    let signal = DVector::from_column_slice(sample_signal);
    let linear = copy_number * signal;

    // Objective without the constant term
    let objective = |u: &DVector<f64>| 0.5 * u.dot(&(gram * u)) - u.dot(&linear);

    let step_size = 1.0 / lipschitz;
    let mut x = uniform;
    let mut y = x.clone();
    let mut t: f64 = 1.0;
    let mut prev_objective = objective(&x);

    for _ in 0..settings.max_iterations {
        let gradient = gram * &y - &linear;
        let x_next = project_vector_onto_simplex(&(&y - gradient * step_size));
        let next_objective = objective(&x_next);

        if next_objective > prev_objective {
            // With t at 1, y is x and this was a plain projected gradient step, which can only fail to
            // descend through rounding error at the optimum:
            if t == 1.0 {
                return Ok(x.as_slice().to_vec());
            }

            // Restart momentum from the last iterate:
            t = 1.0;
            y = x.clone();
            continue;
        }

        let step = (&x_next - &x).amax();
        let objective_change = prev_objective - next_objective;
        if step <= settings.tolerance
            || objective_change <= settings.objective_tolerance * prev_objective.abs().max(1.0)
        {
            return Ok(x_next.as_slice().to_vec());
        }

        let t_next = (1.0 + (1.0 + 4.0 * t * t).sqrt()) / 2.0;
        y = &x_next + (&x_next - &x) * ((t - 1.0) / t_next);
        x = x_next;
        t = t_next;
        prev_objective = next_objective;
    }

    Err(SolveError::SolverNonconvergence(format!(
        "Usage estimation did not converge within {} iterations",
        settings.max_iterations
    )))
}

/// Estimate usage matrix U from the mixed copy number signal F and copy number matrix C
///
/// See `estimate_usage_with_settings` for details.
///
pub fn estimate_usage(
    mixed_copy_number: &DMatrix<f64>,
    copy_number: &DMatrix<f64>,
    clone_count: usize,
) -> SolveResult<DMatrix<f64>> {
    estimate_usage_with_settings(
        mixed_copy_number,
        copy_number,
        clone_count,
        &UsageSolverSettings::default(),
    )
}

/// Estimate usage matrix U from the mixed copy number signal F and copy number matrix C
///
/// # Arguments
/// * `mixed_copy_number` - Sample x locus observed signal F
/// * `copy_number` - Clone node x locus copy number matrix C
/// * `clone_count` - Leaf clone count, C must have `2 * clone_count - 1` rows
///
/// Returns the sample x clone node usage matrix, with every row on the probability simplex
///
pub fn estimate_usage_with_settings(
    mixed_copy_number: &DMatrix<f64>,
    copy_number: &DMatrix<f64>,
    clone_count: usize,
    settings: &UsageSolverSettings,
) -> SolveResult<DMatrix<f64>> {
    let node_count = get_clone_node_count(clone_count)?;
    let sample_count = mixed_copy_number.nrows();

    if copy_number.nrows() != node_count {
        return Err(SolveError::MalformedInput(format!(
            "Copy number matrix has {} rows, expected {node_count} for clone count {clone_count}",
            copy_number.nrows()
        )));
    }
    if copy_number.ncols() != mixed_copy_number.ncols() {
        return Err(SolveError::MalformedInput(format!(
            "Copy number matrix has {} loci but mixed copy number matrix has {}",
            copy_number.ncols(),
            mixed_copy_number.ncols()
        )));
    }
    if sample_count == 0 {
        return Err(SolveError::MalformedInput(
            "Mixed copy number matrix has no samples".to_string(),
        ));
    }
    if mixed_copy_number
        .iter()
        .chain(copy_number.iter())
        .any(|x| !x.is_finite())
    {
        return Err(SolveError::MalformedInput(
            "Usage estimation input contains non-finite values".to_string(),
        ));
    }

    let gram = copy_number * copy_number.transpose();
    let lipschitz = gram.clone().symmetric_eigen().eigenvalues.max();

    debug!("Estimating usage for {sample_count} samples, gradient Lipschitz constant {lipschitz}");

    let usage_rows = (0..sample_count)
        .into_par_iter()
        .map(|sample_index| {
            let sample_signal = mixed_copy_number
                .row(sample_index)
                .iter()
                .copied()
                .collect::<Vec<_>>();
            solve_usage_row(&sample_signal, copy_number, &gram, lipschitz, settings)
        })
        .collect::<SolveResult<Vec<_>>>()?;

    Ok(DMatrix::from_fn(sample_count, node_count, |i, j| {
        usage_rows[i][j]
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clone_model::{SIMPLEX_TOLERANCE, check_usage_matrix};
    use rand::Rng;

    use crate::test_utils::{get_test_rng, random_copy_number, random_usage};

    #[test]
    fn test_project_onto_simplex() {
        let x = project_onto_simplex(&[0.5, 0.5]);
        approx::assert_ulps_eq!(x[0], 0.5);
        approx::assert_ulps_eq!(x[1], 0.5);

        let x = project_onto_simplex(&[2.0, 0.0]);
        approx::assert_ulps_eq!(x[0], 1.0);
        approx::assert_ulps_eq!(x[1], 0.0);

        let x = project_onto_simplex(&[0.1, 0.1, 0.1]);
        for v in x {
            approx::assert_ulps_eq!(v, 1.0 / 3.0, max_ulps = 4);
        }

        let x = project_onto_simplex(&[-1.0, 3.0, 0.5]);
        assert_eq!(x, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_estimate_usage_recovers_exact_mixture() {
        let mut rng = get_test_rng(1);
        let clone_count = 4;
        let node_count = 2 * clone_count - 1;
        let usage = random_usage(&mut rng, 3, node_count);
        let copy_number = random_copy_number(&mut rng, node_count, 6, 10);
        let mixed_copy_number = &usage * &copy_number;

        let estimated = estimate_usage(&mixed_copy_number, &copy_number, clone_count).unwrap();
        check_usage_matrix(&estimated, 3, node_count).unwrap();
        assert!(estimated.iter().all(|x| *x >= 0.0));

        // The generating usage has zero reconstruction error, the estimate must match it
        let error = (&estimated * &copy_number - &mixed_copy_number).norm();
        assert!(error < 1e-4, "reconstruction error {error}");
    }

    #[test]
    fn test_estimate_usage_rows_on_simplex() {
        let mut rng = get_test_rng(7);
        let clone_count = 3;
        let node_count = 2 * clone_count - 1;
        let copy_number = random_copy_number(&mut rng, node_count, 4, 6);

        // Signal far outside the span of C still gives a valid usage matrix
        let mixed_copy_number = DMatrix::from_fn(4, 10, |i, j| ((i * 10 + j) % 7) as f64 * 3.0);
        let estimated = estimate_usage(&mixed_copy_number, &copy_number, clone_count).unwrap();
        for row in estimated.row_iter() {
            assert!((row.sum() - 1.0).abs() < SIMPLEX_TOLERANCE);
            assert!(row.iter().all(|x| *x >= 0.0));
        }
    }

    #[test]
    fn test_estimate_usage_zero_copy_number() {
        let copy_number = DMatrix::zeros(3, 5);
        let mixed_copy_number = DMatrix::from_element(2, 5, 1.0);
        let estimated = estimate_usage(&mixed_copy_number, &copy_number, 2).unwrap();
        for x in estimated.iter() {
            approx::assert_ulps_eq!(*x, 1.0 / 3.0, max_ulps = 4);
        }
    }

    #[test]
    fn test_estimate_usage_duplicate_clone_rows() {
        let mut rng = get_test_rng(11);
        let clone_count = 4;
        let node_count = 2 * clone_count - 1;
        let mut copy_number = random_copy_number(&mut rng, node_count, 6, 10);
        let first_row = copy_number.row(0).clone_owned();
        copy_number.set_row(1, &first_row);
        copy_number.set_row(2, &first_row);

        // Exactly representable signal, optimal usage is not unique
        let usage = random_usage(&mut rng, 3, node_count);
        let mixed_copy_number = &usage * &copy_number;
        let estimated = estimate_usage(&mixed_copy_number, &copy_number, clone_count).unwrap();
        check_usage_matrix(&estimated, 3, node_count).unwrap();
        let error = (&estimated * &copy_number - &mixed_copy_number).norm();
        assert!(error < 1e-3, "reconstruction error {error}");

        // Signal outside the span of C
        let mixed_copy_number = DMatrix::from_fn(3, 16, |i, j| ((i * 16 + j) % 5) as f64 * 1.5);
        let estimated = estimate_usage(&mixed_copy_number, &copy_number, clone_count).unwrap();
        check_usage_matrix(&estimated, 3, node_count).unwrap();
    }

    #[test]
    fn test_estimate_usage_near_duplicate_clone_rows() {
        let mut rng = get_test_rng(12);
        for _ in 0..20 {
            let mut copy_number = random_copy_number(&mut rng, 5, 4, 6);
            let mut near_row = copy_number.row(0).clone_owned();
            near_row[4] += 1e-9;
            copy_number.set_row(1, &near_row);

            let usage = random_usage(&mut rng, 2, 5);
            let noise = DMatrix::from_fn(2, 10, |_, _| rng.r#gen::<f64>() * 0.1);
            let mixed_copy_number = &usage * &copy_number + noise;
            let estimated = estimate_usage(&mixed_copy_number, &copy_number, 3).unwrap();
            check_usage_matrix(&estimated, 2, 5).unwrap();
        }
    }

    #[test]
    fn test_solve_usage_row_stops_at_optimum() {
        // Identical clone rows give a flat objective along the difference of their usage values
        let copy_number = DMatrix::from_row_slice(3, 2, &[1.0, 2.0, 1.0, 2.0, 2.0, 2.0]);
        let gram = &copy_number * copy_number.transpose();
        let lipschitz = gram.clone().symmetric_eigen().eigenvalues.max();
        let settings = UsageSolverSettings::default();
        let usage =
            solve_usage_row(&[2.0, 2.0], &copy_number, &gram, lipschitz, &settings).unwrap();
        approx::assert_relative_eq!(usage.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        approx::assert_relative_eq!(usage[2], 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_estimate_usage_malformed_input() {
        let copy_number = DMatrix::zeros(3, 5);
        let mixed_copy_number = DMatrix::from_element(2, 4, 1.0);
        assert!(matches!(
            estimate_usage(&mixed_copy_number, &copy_number, 2),
            Err(SolveError::MalformedInput(_))
        ));

        let mixed_copy_number = DMatrix::from_element(2, 5, 1.0);
        assert!(matches!(
            estimate_usage(&mixed_copy_number, &copy_number, 3),
            Err(SolveError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_estimate_usage_iteration_limit() {
        let mut rng = get_test_rng(3);
        let node_count = 7;
        let usage = random_usage(&mut rng, 2, node_count);
        let copy_number = random_copy_number(&mut rng, node_count, 6, 10);
        let mixed_copy_number = &usage * &copy_number;

        let settings = UsageSolverSettings {
            max_iterations: 1,
            tolerance: 1e-12,
            objective_tolerance: 0.0,
        };
        let result = estimate_usage_with_settings(&mixed_copy_number, &copy_number, 4, &settings);
        assert!(matches!(result, Err(SolveError::SolverNonconvergence(_))));
    }
}
