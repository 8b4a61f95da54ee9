use std::time::Instant;

use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::{error, info};

use super::program::LinearProgram;
use crate::error::{DispatchError, Result};

/// Coarse outcome reported by the solver process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SolverStatus {
    Ok,
    Warning,
    Error,
    Aborted,
    Unknown,
}

/// Why the solver stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TerminationCondition {
    Optimal,
    Infeasible,
    Unbounded,
    InfeasibleOrUnbounded,
    MaxTimeLimit,
    SolverError,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverOptions {
    /// Algorithm / backend identifier, e.g. `minilp`
    pub name: String,
    pub verbose: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            name: "minilp".to_string(),
            verbose: false,
        }
    }
}

/// Raw answer of a solver backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveResponse {
    pub status: SolverStatus,
    pub termination: TerminationCondition,
    pub message: String,
    /// One value per program variable, in variable order
    pub assignment: Vec<f64>,
    pub objective: Option<f64>,
}

impl SolveResponse {
    pub fn failed(
        status: SolverStatus,
        termination: TerminationCondition,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status,
            termination,
            message: message.into(),
            assignment: Vec::new(),
            objective: None,
        }
    }

    pub fn is_optimal(&self) -> bool {
        self.status == SolverStatus::Ok && self.termination == TerminationCondition::Optimal
    }
}

/// Blocking LP solver backend.
///
/// Injected into the pipeline so tests can substitute a deterministic fake.
#[cfg_attr(test, mockall::automock)]
pub trait SolverClient {
    fn solve(&self, program: &LinearProgram, options: &SolverOptions) -> SolveResponse;
}

/// Run metadata kept next to the extracted series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverMeta {
    pub solver: String,
    pub status: SolverStatus,
    pub termination: TerminationCondition,
    pub message: String,
    pub objective: f64,
    pub variables: usize,
    pub constraints: usize,
    pub solve_time_ms: u64,
}

/// Solved program: the optimal response plus its metadata
#[derive(Debug, Clone, PartialEq)]
pub struct SolvedProgram {
    pub response: SolveResponse,
    pub meta: SolverMeta,
}

/// Submit the program and accept the answer only if it is optimal.
///
/// Any other status / termination pair becomes [`DispatchError::SolveFailure`]
/// carrying the raw values.
pub fn solve_checked(
    client: &dyn SolverClient,
    program: &LinearProgram,
    options: &SolverOptions,
) -> Result<SolvedProgram> {
    let started = Instant::now();
    let response = client.solve(program, options);
    let elapsed = started.elapsed();

    if !response.is_optimal() {
        error!(
            status = %response.status,
            termination = %response.termination,
            message = %response.message,
            "the energy system could not be solved"
        );
        return Err(DispatchError::SolveFailure {
            status: response.status,
            termination: response.termination,
            message: response.message,
        });
    }

    if response.assignment.len() != program.variables.len() {
        let message = format!(
            "solver returned {} values for {} variables",
            response.assignment.len(),
            program.variables.len()
        );
        error!(status = %response.status, termination = %response.termination, %message, "malformed solver response");
        return Err(DispatchError::SolveFailure {
            status: response.status,
            termination: response.termination,
            message,
        });
    }

    let objective = response
        .objective
        .unwrap_or_else(|| program.objective_value(&response.assignment));

    info!(
        solver = %options.name,
        objective,
        elapsed_ms = elapsed.as_millis() as u64,
        "model solved to optimality"
    );

    let meta = SolverMeta {
        solver: options.name.clone(),
        status: response.status,
        termination: response.termination,
        message: response.message.clone(),
        objective,
        variables: program.variables.len(),
        constraints: program.constraints.len(),
        solve_time_ms: elapsed.as_millis() as u64,
    };

    Ok(SolvedProgram { response, meta })
}
