mod cli;
mod clone_model;
mod copy_number_constraints;
mod copy_number_estimator;
mod filenames;
mod globals;
mod joint_solver;
mod log_utils;
mod logger;
mod matrix_io;
mod os_utils;
mod run_stats;
mod solve;
mod solve_error;
mod usage_estimator;

#[cfg(test)]
mod test_utils;

use std::{error, process};

use hhmmss::Hhmmss;
use log::{error, info};

use crate::cli::Commands;
use crate::globals::{PROGRAM_NAME, PROGRAM_VERSION};
use crate::logger::setup_output_dir_and_logger;
use crate::solve::run_solve;

/// Size the global rayon pool used by the usage estimator
///
fn setup_thread_pool(thread_count: usize) -> Result<(), rayon::ThreadPoolBuildError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(thread_count)
        .build_global()
}

fn run(settings: &cli::Settings) -> Result<(), Box<dyn error::Error>> {
    info!("Starting {PROGRAM_NAME} {PROGRAM_VERSION}");
    info!(
        "cmdline: {}",
        std::env::args().collect::<Vec<_>>().join(" ")
    );
    info!("Running on {} threads", settings.shared.thread_count);

    setup_thread_pool(settings.shared.thread_count)?;

    let start = std::time::Instant::now();

    match &settings.command {
        Commands::Solve(x) => {
            run_solve(x)?;
        }
    }

    info!(
        "{PROGRAM_NAME} completed. Total Runtime: {}",
        start.elapsed().hhmmssxxx()
    );
    Ok(())
}

fn main() {
    let settings = cli::validate_and_fix_settings(cli::parse_settings());

    // Setup logger, including creation of the output directory for the log file:
    setup_output_dir_and_logger(
        settings.get_output_dir(),
        settings.shared.clobber,
        settings.shared.debug,
    );

    if let Err(err) = run(&settings) {
        error!("{err}");
        process::exit(2);
    }
}
