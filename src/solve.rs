use std::error;

use camino::Utf8Path;
use hhmmss::Hhmmss;
use log::info;
use simple_error::{SimpleResult, try_with};

use crate::cli;
use crate::clone_model::{CloneObservations, get_clone_node_count};
use crate::filenames::{
    COPY_NUMBER_FILENAME, ESTIMATED_MIXED_COPY_NUMBER_FILENAME, MIXED_COPY_NUMBER_FILENAME,
    OBJECTIVE_FILENAME, RESIDUAL_FILENAME, USAGE_FILENAME,
};
use crate::joint_solver::{JointSolution, solve_joint};
use crate::matrix_io::{read_observations, write_matrix};
use crate::run_stats::{InputStats, RunStep, SolveRunStats, SolverStats, write_solve_run_stats};

/// Write all solution matrices and the objective value to `output_dir`
///
/// The input signal F is copied alongside the solution so that the output directory is complete
/// for downstream evaluation.
///
pub fn write_solve_output(
    output_dir: &Utf8Path,
    observations: &CloneObservations,
    solution: &JointSolution,
) -> SimpleResult<()> {
    let residual = &observations.mixed_copy_number - &solution.mixed_copy_number;

    for (filename, matrix) in [
        (COPY_NUMBER_FILENAME, &solution.copy_number),
        (USAGE_FILENAME, &solution.usage),
        (ESTIMATED_MIXED_COPY_NUMBER_FILENAME, &solution.mixed_copy_number),
        (RESIDUAL_FILENAME, &residual),
        (MIXED_COPY_NUMBER_FILENAME, &observations.mixed_copy_number),
    ] {
        write_matrix(&output_dir.join(filename), matrix)?;
    }

    let filename = output_dir.join(OBJECTIVE_FILENAME);
    try_with!(
        std::fs::write(&filename, format!("{}\n", solution.objective)),
        "Unable to write objective value file: '{filename}'"
    );
    Ok(())
}

pub fn run_solve(settings: &cli::SolveSettings) -> Result<(), Box<dyn error::Error>> {
    cli::write_solve_settings(&settings.output_dir, settings);

    let observations = read_observations(&settings.input_dir)?;
    let joint_settings = settings.get_joint_solve_settings();

    let start = std::time::Instant::now();
    let solution = solve_joint(&observations, &joint_settings)?;
    let solve_time = start.elapsed();

    info!(
        "Objective {} (reconstruction {}, adjacency {}, allele {})",
        solution.objective,
        solution.objective_terms.reconstruction,
        solution.objective_terms.adjacency,
        solution.objective_terms.allele
    );
    info!("Joint solve time: {}", solve_time.hhmmssxxx());

    write_solve_output(&settings.output_dir, &observations, &solution)?;

    let run_stats = SolveRunStats {
        run_step: RunStep::new("solve"),
        input_stats: InputStats::new(
            &observations,
            get_clone_node_count(joint_settings.clone_count)?,
        ),
        solver_stats: SolverStats::new(&solution, solve_time.as_secs_f64()),
    };
    write_solve_run_stats(&settings.output_dir, &run_stats);

    Ok(())
}
