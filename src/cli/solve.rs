use camino::{Utf8Path, Utf8PathBuf};
use clap::Args;
use const_format::concatcp;
use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail};
use unwrap::unwrap;

use super::defaults::{
    CONVERGENCE_TOLERANCE, LAMBDA1, LAMBDA2, MAX_COPY_NUMBER, MAX_ITERATIONS, SEED,
};
use super::utils::{check_required_dirname, check_required_filename};
use crate::clone_model::ObjectiveWeights;
use crate::copy_number_estimator::MAX_COPY_NUMBER_LIMIT;
use crate::filenames::{
    ALLELE_COUNTS_FILENAME, BREAKPOINT_SEGMENTS_FILENAME, MATE_PAIRS_FILENAME,
    MIXED_COPY_NUMBER_FILENAME, SETTINGS_FILENAME, TOTAL_DEPTH_FILENAME,
};
use crate::joint_solver::JointSolveSettings;

#[derive(Args, Clone, Debug, Deserialize, Serialize)]
pub struct SolveSettings {
    /// Directory containing the solver input matrices F.tsv, Q.tsv, G.tsv, A.tsv and H.tsv
    #[arg(long, value_name = "DIR")]
    pub input_dir: Utf8PathBuf,

    /// Directory for all solve command output (must not already exist)
    #[arg(long, value_name = "DIR", default_value = concatcp!(env!("CARGO_PKG_NAME"), "_solve_output"))]
    pub output_dir: Utf8PathBuf,

    /// Number of leaf clones. The clone tree will have 2 * CLONE_COUNT - 1 nodes.
    #[arg(long, value_name = "CLONE_COUNT")]
    pub clone_count: usize,

    /// Maximum copy number allowed for any segment or breakpoint in any clone
    #[arg(long, default_value_t = MAX_COPY_NUMBER)]
    pub max_copy_number: u32,

    /// Weight of the breakpoint/segment adjacency penalty
    #[arg(long, default_value_t = LAMBDA1)]
    pub lambda1: f64,

    /// Weight of the breakpoint read count penalty
    #[arg(long, default_value_t = LAMBDA2)]
    pub lambda2: f64,

    /// Maximum number of alternating copy number/usage rounds
    ///
    /// A value of 0 is treated as a single round.
    ///
    #[arg(long = "max-iters", default_value_t = MAX_ITERATIONS)]
    pub max_iterations: usize,

    /// Stop once a round improves the objective by less than this relative amount
    #[arg(hide = true, long, default_value_t = CONVERGENCE_TOLERANCE)]
    pub convergence_tolerance: f64,

    /// Random seed for the initial usage matrix
    #[arg(long, default_value_t = SEED)]
    pub seed: u64,
}

impl SolveSettings {
    pub fn get_joint_solve_settings(&self) -> JointSolveSettings {
        JointSolveSettings {
            clone_count: self.clone_count,
            max_copy_number: self.max_copy_number,
            weights: ObjectiveWeights {
                lambda1: self.lambda1,
                lambda2: self.lambda2,
            },
            max_iterations: self.max_iterations,
            convergence_tolerance: self.convergence_tolerance,
            seed: self.seed,
        }
    }
}

/// Validate settings and update to parameters that can't be processed automatically by clap.
///
/// Assumes that the logger is not setup
///
pub fn validate_and_fix_solve_settings(settings: SolveSettings) -> SimpleResult<SolveSettings> {
    check_required_dirname(&settings.input_dir, "input")?;

    for (filename, label) in [
        (MIXED_COPY_NUMBER_FILENAME, "mixed copy number"),
        (BREAKPOINT_SEGMENTS_FILENAME, "breakpoint segment"),
        (MATE_PAIRS_FILENAME, "mate pair"),
        (ALLELE_COUNTS_FILENAME, "breakpoint read count"),
        (TOTAL_DEPTH_FILENAME, "breakpoint depth"),
    ] {
        check_required_filename(&settings.input_dir.join(filename), label)?;
    }

    if settings.clone_count == 0 {
        bail!("--clone-count argument must be greater than 0");
    }

    if settings.max_copy_number > MAX_COPY_NUMBER_LIMIT {
        bail!("--max-copy-number argument must not exceed {MAX_COPY_NUMBER_LIMIT}");
    }

    for (value, label) in [
        (settings.lambda1, "--lambda1"),
        (settings.lambda2, "--lambda2"),
        (settings.convergence_tolerance, "--convergence-tolerance"),
    ] {
        if !value.is_finite() || value < 0.0 {
            bail!("{label} argument must be a non-negative number");
        }
    }

    let mut settings = settings;
    settings.input_dir = unwrap!(
        settings.input_dir.canonicalize_utf8(),
        "Unable to canonicalize input directory path: '{}'",
        settings.input_dir
    );

    Ok(settings)
}

/// Write solve settings out in json format
pub fn write_solve_settings(output_dir: &Utf8Path, settings: &SolveSettings) {
    use log::info;

    let filename = output_dir.join(SETTINGS_FILENAME);

    info!("Writing solve settings to file: '{filename}'");

    let f = unwrap!(
        std::fs::File::create(&filename),
        "Unable to create solve settings json file: '{filename}'"
    );

    unwrap!(
        serde_json::to_writer_pretty(&f, &settings),
        "Unable to write solve settings json file: '{filename}'"
    );
}
