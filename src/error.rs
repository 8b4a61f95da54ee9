use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

use crate::optimizer::{SolverStatus, TerminationCondition};

/// Pipeline stage at which a failure was detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Configuration,
    TimeIndex,
    Timeseries,
    Profiles,
    NetworkBuild,
    Compile,
    Solve,
    Extract,
    Persist,
}

/// Errors returned by the dispatch pipeline.
///
/// Every variant is terminal for the current run. Retrying (re-solving with a
/// relaxed bound, rewriting an artifact) is left to the caller.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("configuration error in {stage}: {message}")]
    Configuration { stage: Stage, message: String },

    #[error("invariant violated in {stage}: {message}")]
    InvariantViolation { stage: Stage, message: String },

    #[error(
        "solver failed (status: {status}, termination condition: {termination}): {message}"
    )]
    SolveFailure {
        status: SolverStatus,
        termination: TerminationCondition,
        message: String,
    },

    #[error("i/o error in {stage} at {}: {source}", path.display())]
    Io {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DispatchError {
    pub fn configuration(stage: Stage, message: impl Into<String>) -> Self {
        Self::Configuration {
            stage,
            message: message.into(),
        }
    }

    pub fn invariant(stage: Stage, message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            stage,
            message: message.into(),
        }
    }

    pub fn io(stage: Stage, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            stage,
            path: path.into(),
            source,
        }
    }

    /// Stage at which the run was aborted
    pub fn stage(&self) -> Stage {
        match self {
            Self::Configuration { stage, .. }
            | Self::InvariantViolation { stage, .. }
            | Self::Io { stage, .. } => *stage,
            Self::SolveFailure { .. } => Stage::Solve,
        }
    }
}

pub type Result<T, E = DispatchError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solve_failure_reports_raw_solver_values() {
        let err = DispatchError::SolveFailure {
            status: SolverStatus::Warning,
            termination: TerminationCondition::Infeasible,
            message: "problem is infeasible".to_string(),
        };

        let text = err.to_string();
        assert!(text.contains("warning"));
        assert!(text.contains("infeasible"));
        assert!(text.contains("problem is infeasible"));
        assert_eq!(err.stage(), Stage::Solve);
    }

    #[test]
    fn test_stage_is_reported() {
        let err = DispatchError::invariant(Stage::NetworkBuild, "min_level_fraction 0.9 > max 0.5");
        assert_eq!(err.stage(), Stage::NetworkBuild);
        assert!(err.to_string().contains("network_build"));
    }
}
