//! Track stats for the whole solve run
//!

use std::fs::File;

use camino::Utf8Path;
use log::info;
use serde::{Deserialize, Serialize};
use unwrap::unwrap;

use crate::clone_model::{CloneObservations, ObjectiveTerms};
use crate::filenames::RUN_STATS_FILENAME;
use crate::globals::{PROGRAM_NAME, PROGRAM_VERSION};
use crate::joint_solver::JointSolution;

#[derive(Deserialize, Serialize)]
pub struct RunStep {
    pub name: String,
    pub version: String,
}

impl RunStep {
    pub fn new(step_name: &str) -> Self {
        Self {
            name: format!("{PROGRAM_NAME} {step_name}"),
            version: PROGRAM_VERSION.to_string(),
        }
    }
}

#[derive(Default, Deserialize, Serialize)]
pub struct InputStats {
    pub sample_count: usize,
    pub breakpoint_count: usize,
    pub segment_count: usize,
    pub clone_node_count: usize,
}

impl InputStats {
    pub fn new(observations: &CloneObservations, clone_node_count: usize) -> Self {
        Self {
            sample_count: observations.sample_count(),
            breakpoint_count: observations.breakpoint_count(),
            segment_count: observations.segment_count(),
            clone_node_count,
        }
    }
}

#[derive(Default, Deserialize, Serialize)]
pub struct SolverStats {
    pub iteration_count: usize,
    pub converged: bool,
    pub objective: f64,
    pub objective_terms: ObjectiveTerms,

    /// Joint objective after each copy number and usage half-step
    pub objective_trace: Vec<f64>,

    pub total_solve_time_secs: f64,
}

impl SolverStats {
    pub fn new(solution: &JointSolution, total_solve_time_secs: f64) -> Self {
        Self {
            iteration_count: solution.iteration_count,
            converged: solution.converged,
            objective: solution.objective,
            objective_terms: solution.objective_terms,
            objective_trace: solution.objective_trace.clone(),
            total_solve_time_secs,
        }
    }
}

#[derive(Deserialize, Serialize)]
pub struct SolveRunStats {
    pub run_step: RunStep,
    pub input_stats: InputStats,
    pub solver_stats: SolverStats,
}

/// Write run_stats structure out in json format
pub fn write_solve_run_stats(output_dir: &Utf8Path, run_stats: &SolveRunStats) {
    let filename = output_dir.join(RUN_STATS_FILENAME);

    info!("Writing run statistics to file: '{filename}'");

    let f = unwrap!(
        File::create(&filename),
        "Unable to create run statistics json file: '{filename}'"
    );

    unwrap!(
        serde_json::to_writer_pretty(&f, &run_stats),
        "Unable to write run statistics json file: '{filename}'"
    );
}
