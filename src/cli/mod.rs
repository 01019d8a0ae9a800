mod defaults;
mod shared;
mod solve;
mod utils;

use camino::Utf8Path;
use clap::{Parser, Subcommand};
use simple_error::{SimpleResult, bail};

use self::shared::validate_and_fix_shared_settings;
pub use self::shared::SharedSettings;
use self::solve::validate_and_fix_solve_settings;
pub use self::solve::{SolveSettings, write_solve_settings};

#[derive(Subcommand)]
pub enum Commands {
    /// Jointly estimate clone usage and clone copy number from the mixed copy number signal of one to many samples
    Solve(SolveSettings),
}

#[derive(Parser)]
#[command(
    author,
    version,
    about,
    after_help = "This program comes with ABSOLUTELY NO WARRANTY.",
    help_template = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}"
)]
#[clap(propagate_version = true, rename_all = "kebab_case")]
pub struct Settings {
    #[command(flatten)]
    pub shared: SharedSettings,

    #[command(subcommand)]
    pub command: Commands,
}

impl Settings {
    pub fn get_output_dir(&self) -> &Utf8Path {
        match &self.command {
            Commands::Solve(x) => &x.output_dir,
        }
    }
}

/// Checks if a directory does not exist
///
pub fn check_novel_dirname(dirname: &Utf8Path, label: &str) -> SimpleResult<()> {
    if dirname.exists() {
        bail!("{label} already exists: \"{dirname}\"");
    }
    Ok(())
}

/// Validate settings and update parameters that can't be processed by clap
///
pub fn validate_and_fix_settings_impl(mut settings: Settings) -> SimpleResult<Settings> {
    settings.shared = validate_and_fix_shared_settings(settings.shared)?;

    settings.command = match settings.command {
        Commands::Solve(x) => {
            let x = validate_and_fix_solve_settings(x)?;
            Commands::Solve(x)
        }
    };

    Ok(settings)
}

/// Validate settings and update to parameters that can't be processed automatically by clap.
///
pub fn validate_and_fix_settings(settings: Settings) -> Settings {
    match validate_and_fix_settings_impl(settings) {
        Ok(x) => x,
        Err(msg) => {
            eprintln!("Invalid command-line setting: {msg}");
            std::process::exit(exitcode::USAGE);
        }
    }
}

pub fn parse_settings() -> Settings {
    Settings::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_solve_settings() {
        let settings = Settings::try_parse_from([
            "clone-deconv",
            "solve",
            "--input-dir",
            "in",
            "--clone-count",
            "3",
            "--lambda2",
            "0.5",
            "--threads",
            "2",
        ])
        .unwrap();
        assert_eq!(settings.get_output_dir().as_str(), "clone-deconv_solve_output");
        let Commands::Solve(x) = &settings.command;
        assert_eq!(x.clone_count, 3);
        assert_eq!(x.max_copy_number, 7);
        assert_eq!(x.lambda2, 0.5);
        assert_eq!(x.max_iterations, 10);

        let settings = validate_and_fix_shared_settings(settings.shared).unwrap();
        assert_eq!(settings.thread_count, 2);
    }

    #[test]
    fn test_parse_requires_clone_count() {
        assert!(Settings::try_parse_from(["clone-deconv", "solve", "--input-dir", "in"]).is_err());
    }
}
