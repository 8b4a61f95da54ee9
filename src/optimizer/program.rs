use serde::{Deserialize, Serialize};
use strum::Display;

/// Index of a decision variable in a [`LinearProgram`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarId(pub usize);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub lower: f64,
    /// `None` leaves the variable unbounded above
    pub upper: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum Sense {
    #[strum(serialize = "=")]
    Eq,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">=")]
    Ge,
}

/// `Σ coefficient × variable  (sense)  rhs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub name: String,
    pub terms: Vec<(VarId, f64)>,
    pub sense: Sense,
    pub rhs: f64,
}

impl Constraint {
    pub fn lhs(&self, assignment: &[f64]) -> f64 {
        self.terms.iter().map(|(v, c)| c * assignment[v.0]).sum()
    }
}

/// Solver-independent linear program, minimised.
///
/// The compiler emits this form; solver backends translate it into their own
/// modelling API. Keeping it plain data lets tests feed a fake solver and
/// lets the program be written out as an LP file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearProgram {
    pub variables: Vec<Variable>,
    pub constraints: Vec<Constraint>,
    pub objective: Vec<(VarId, f64)>,
}

impl LinearProgram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_variable(&mut self, name: impl Into<String>, lower: f64, upper: Option<f64>) -> VarId {
        self.variables.push(Variable {
            name: name.into(),
            lower,
            upper,
        });
        VarId(self.variables.len() - 1)
    }

    pub fn add_constraint(
        &mut self,
        name: impl Into<String>,
        terms: Vec<(VarId, f64)>,
        sense: Sense,
        rhs: f64,
    ) {
        self.constraints.push(Constraint {
            name: name.into(),
            terms,
            sense,
            rhs,
        });
    }

    pub fn add_objective_term(&mut self, var: VarId, coefficient: f64) {
        if coefficient != 0.0 {
            self.objective.push((var, coefficient));
        }
    }

    pub fn objective_value(&self, assignment: &[f64]) -> f64 {
        self.objective.iter().map(|(v, c)| c * assignment[v.0]).sum()
    }

    /// Largest bound or constraint violation of an assignment
    pub fn max_violation(&self, assignment: &[f64]) -> f64 {
        let bounds = self.variables.iter().zip(assignment).map(|(var, x)| {
            let below = var.lower - x;
            let above = var.upper.map_or(0.0, |u| x - u);
            below.max(above).max(0.0)
        });
        let rows = self.constraints.iter().map(|c| {
            let gap = c.lhs(assignment) - c.rhs;
            match c.sense {
                Sense::Eq => gap.abs(),
                Sense::Le => gap.max(0.0),
                Sense::Ge => (-gap).max(0.0),
            }
        });
        bounds.chain(rows).fold(0.0, f64::max)
    }
}
