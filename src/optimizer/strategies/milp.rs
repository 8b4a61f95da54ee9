//! Linear programming backend on `good_lp`.
//!
//! Translates a [`LinearProgram`] into a `good_lp` problem and solves it with
//! the pure-Rust `minilp` simplex solver, so no native solver library is
//! needed at build or run time.

use good_lp::solvers::minilp::minilp;
use good_lp::{
    constraint, variable, Expression, ProblemVariables, ResolutionError, Solution, SolverModel,
};
use tracing::{debug, info, warn};

use crate::optimizer::program::{LinearProgram, Sense, VarId};
use crate::optimizer::solver::{
    SolveResponse, SolverClient, SolverOptions, SolverStatus, TerminationCondition,
};

/// Solver names this backend answers to
pub const SUPPORTED_SOLVERS: [&str; 2] = ["minilp", "default"];

// Above this many variables the dense simplex gets slow
const LARGE_PROBLEM_VARIABLES: usize = 20_000;

#[derive(Debug, Clone, Copy, Default)]
pub struct MiniLpSolver;

impl MiniLpSolver {
    pub fn new() -> Self {
        Self
    }
}

impl SolverClient for MiniLpSolver {
    fn solve(&self, program: &LinearProgram, options: &SolverOptions) -> SolveResponse {
        if !SUPPORTED_SOLVERS.contains(&options.name.as_str()) {
            return SolveResponse::failed(
                SolverStatus::Error,
                TerminationCondition::SolverError,
                format!(
                    "solver '{}' is not available, supported: {}",
                    options.name,
                    SUPPORTED_SOLVERS.join(", ")
                ),
            );
        }

        if program.variables.len() > LARGE_PROBLEM_VARIABLES {
            warn!(
                variables = program.variables.len(),
                "large program for the minilp backend, solving may take a while"
            );
        }

        let mut problem = ProblemVariables::new();
        let vars: Vec<good_lp::Variable> = program
            .variables
            .iter()
            .map(|v| {
                let definition = variable().min(v.lower);
                match v.upper {
                    Some(upper) => problem.add(definition.max(upper)),
                    None => problem.add(definition),
                }
            })
            .collect();

        let expression = |terms: &[(VarId, f64)]| -> Expression {
            terms.iter().map(|&(v, c)| c * vars[v.0]).sum()
        };

        let objective = expression(&program.objective);
        let mut model = problem.minimise(objective).using(minilp);

        for c in &program.constraints {
            let lhs = expression(&c.terms);
            let rhs = c.rhs;
            model = match c.sense {
                Sense::Eq => model.with(constraint!(lhs == rhs)),
                Sense::Le => model.with(constraint!(lhs <= rhs)),
                Sense::Ge => model.with(constraint!(lhs >= rhs)),
            };
        }

        if options.verbose {
            info!(
                variables = program.variables.len(),
                constraints = program.constraints.len(),
                objective_terms = program.objective.len(),
                "submitting program to minilp"
            );
        }

        match model.solve() {
            Ok(solution) => {
                let assignment: Vec<f64> = vars.iter().map(|&v| solution.value(v)).collect();
                let objective = program.objective_value(&assignment);
                debug!(objective, "minilp returned an optimal basis");
                SolveResponse {
                    status: SolverStatus::Ok,
                    termination: TerminationCondition::Optimal,
                    message: "optimal solution found".to_string(),
                    assignment,
                    objective: Some(objective),
                }
            }
            Err(ResolutionError::Infeasible) => SolveResponse::failed(
                SolverStatus::Warning,
                TerminationCondition::Infeasible,
                "problem is infeasible",
            ),
            Err(ResolutionError::Unbounded) => SolveResponse::failed(
                SolverStatus::Warning,
                TerminationCondition::Unbounded,
                "problem is unbounded",
            ),
            Err(e) => SolveResponse::failed(
                SolverStatus::Error,
                TerminationCondition::SolverError,
                e.to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> SolverOptions {
        SolverOptions::default()
    }

    #[test]
    fn test_solves_small_program() {
        // min 2x + 3y  s.t.  x + y = 4, x <= 3
        let mut lp = LinearProgram::new();
        let x = lp.add_variable("x", 0.0, Some(3.0));
        let y = lp.add_variable("y", 0.0, None);
        lp.add_constraint("sum", vec![(x, 1.0), (y, 1.0)], Sense::Eq, 4.0);
        lp.add_objective_term(x, 2.0);
        lp.add_objective_term(y, 3.0);

        let response = MiniLpSolver::new().solve(&lp, &options());

        assert!(response.is_optimal());
        assert!((response.assignment[0] - 3.0).abs() < 1e-6);
        assert!((response.assignment[1] - 1.0).abs() < 1e-6);
        assert!((response.objective.unwrap() - 9.0).abs() < 1e-6);
    }

    #[test]
    fn test_reports_infeasible() {
        let mut lp = LinearProgram::new();
        let x = lp.add_variable("x", 0.0, Some(1.0));
        lp.add_constraint("too_much", vec![(x, 1.0)], Sense::Ge, 2.0);

        let response = MiniLpSolver::new().solve(&lp, &options());

        assert_eq!(response.status, SolverStatus::Warning);
        assert_eq!(response.termination, TerminationCondition::Infeasible);
        assert!(response.assignment.is_empty());
    }

    #[test]
    fn test_unknown_solver_name() {
        let lp = LinearProgram::new();
        let response = MiniLpSolver::new().solve(
            &lp,
            &SolverOptions {
                name: "cbc".to_string(),
                verbose: false,
            },
        );

        assert_eq!(response.status, SolverStatus::Error);
        assert!(response.message.contains("'cbc'"));
    }
}
