//! Error types shared by the copy number and usage estimators
//!

use thiserror::Error;

/// Errors which can terminate any of the clone decomposition solve steps
///
/// Estimators return this as an explicit value so that the alternating driver can halt cleanly on the
/// first failure. No returned matrix should be trusted unless the solve step completed without error.
///
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    /// The bound, germline, mate-pair and breakpoint-in-segment constraints admit no solution
    #[error("Infeasible copy number constraints: {0}")]
    InfeasibleConstraints(String),

    /// A numeric solver reached its iteration limit before meeting its convergence criteria
    #[error("Solver did not converge: {0}")]
    SolverNonconvergence(String),

    /// Input matrix shapes or values are inconsistent with each other or the clone count
    #[error("Malformed solver input: {0}")]
    MalformedInput(String),
}

pub type SolveResult<T> = Result<T, SolveError>;
