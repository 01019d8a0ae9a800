//! Methods specific to the program logger
//!

use camino::Utf8Path;

use crate::cli;
use crate::globals::PROGRAM_NAME;
use crate::os_utils::create_dir_all;

fn get_log_level(debug: bool) -> log::LevelFilter {
    if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    }
}

/// Log to stderr, and additionally to a log file in `output_dir` if provided
///
fn setup_logger(output_dir: Option<&Utf8Path>, debug: bool) -> Result<(), fern::InitError> {
    let logger = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                PROGRAM_NAME,
                record.level(),
                message
            ))
        })
        .level(get_log_level(debug))
        .chain(std::io::stderr());

    let logger = match output_dir {
        Some(output_dir) => {
            let log_filename = output_dir.join(format!("{PROGRAM_NAME}.log"));
            logger.chain(fern::log_file(log_filename)?)
        }
        None => logger,
    };

    logger.apply()?;
    Ok(())
}

/// Check and create output directory, then setup logger to write there
///
/// #Arguments
/// * `clobber` - If true an existing output directory is reused
/// * `debug` - If true use debug log level, and info level otherwise
///
pub fn setup_output_dir_and_logger(output_dir: &Utf8Path, clobber: bool, debug: bool) {
    // No logger exists yet, so errors follow the command-line settings validation pattern
    if let Err(msg) = cli::check_novel_dirname(output_dir, "Output directory") {
        if !clobber {
            eprintln!("Invalid command-line setting: {msg}");
            std::process::exit(exitcode::USAGE);
        }
    };
    create_dir_all(output_dir, "output");
    if let Err(err) = setup_logger(Some(output_dir), debug) {
        eprintln!("Unable to setup logger in output directory '{output_dir}': {err}");
        std::process::exit(exitcode::CANTCREAT);
    }
}
