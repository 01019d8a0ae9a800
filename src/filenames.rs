//! Input and output filenames for the solve step
//!

/// Observed mixed copy number signal, sample x locus
pub const MIXED_COPY_NUMBER_FILENAME: &str = "F.tsv";

/// Breakpoint to segment membership, breakpoint x segment
pub const BREAKPOINT_SEGMENTS_FILENAME: &str = "Q.tsv";

/// Breakpoint mate pairs, breakpoint x breakpoint
pub const MATE_PAIRS_FILENAME: &str = "G.tsv";

/// Breakpoint-supporting read counts, sample x breakpoint
pub const ALLELE_COUNTS_FILENAME: &str = "A.tsv";

/// Total read depth at each breakpoint, sample x breakpoint
pub const TOTAL_DEPTH_FILENAME: &str = "H.tsv";

pub const COPY_NUMBER_FILENAME: &str = "C.tsv";
pub const USAGE_FILENAME: &str = "U.tsv";
pub const ESTIMATED_MIXED_COPY_NUMBER_FILENAME: &str = "E.tsv";
pub const RESIDUAL_FILENAME: &str = "R.tsv";
pub const OBJECTIVE_FILENAME: &str = "obj_val.txt";

pub const RUN_STATS_FILENAME: &str = "run.stats.json";
pub const SETTINGS_FILENAME: &str = "solve.settings.json";
