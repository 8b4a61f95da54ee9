//! Optimal dispatch read back from a solved program.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{DispatchError, Result, Stage};
use crate::network::NetworkModel;
use crate::optimizer::{CompiledModel, SolvedProgram, SolverMeta};

/// Realised values of one flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSeries {
    pub source: String,
    pub sink: String,
    pub values: Vec<f64>,
}

impl FlowSeries {
    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }
}

/// Realised end-of-step levels of one storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSeries {
    pub label: String,
    pub levels: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    pub meta: SolverMeta,
    pub flows: Vec<FlowSeries>,
    pub storages: Vec<StorageSeries>,
}

impl Solution {
    pub fn objective(&self) -> f64 {
        self.meta.objective
    }

    pub fn flow(&self, source: &str, sink: &str) -> Option<&[f64]> {
        self.flows
            .iter()
            .find(|f| f.source == source && f.sink == sink)
            .map(|f| f.values.as_slice())
    }

    pub fn storage_level(&self, label: &str) -> Option<&[f64]> {
        self.storages
            .iter()
            .find(|s| s.label == label)
            .map(|s| s.levels.as_slice())
    }

    /// Total cost recomputed from the flows and their unit costs
    pub fn total_cost(&self, model: &NetworkModel) -> f64 {
        let dt = model.time_index.interval_hours();
        model
            .flows
            .iter()
            .zip(&self.flows)
            .map(|(flow, series)| flow.variable_cost * series.total() * dt)
            .sum()
    }
}

/// Read the solver assignment back into per-flow and per-storage series.
///
/// A pure read of the assignment: values are copied as returned, nothing is
/// rounded or recomputed.
pub fn extract(
    model: &NetworkModel,
    compiled: &CompiledModel,
    solved: &SolvedProgram,
) -> Result<Solution> {
    let assignment = &solved.response.assignment;
    if assignment.len() != compiled.program.variables.len() {
        return Err(DispatchError::invariant(
            Stage::Extract,
            format!(
                "solver returned {} values for {} variables",
                assignment.len(),
                compiled.program.variables.len()
            ),
        ));
    }

    let flows = model
        .flows
        .iter()
        .zip(&compiled.flow_vars)
        .map(|(flow, vars)| FlowSeries {
            source: flow.source.clone(),
            sink: flow.sink.clone(),
            values: vars.iter().map(|v| assignment[v.0]).collect(),
        })
        .collect();

    let storages = model
        .storages
        .iter()
        .zip(&compiled.level_vars)
        .map(|(storage, vars)| StorageSeries {
            label: storage.label.clone(),
            levels: vars.iter().map(|v| assignment[v.0]).collect(),
        })
        .collect();

    info!(objective = solved.meta.objective, "extracted results");

    Ok(Solution {
        meta: solved.meta.clone(),
        flows,
        storages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Bus, Flow};
    use crate::optimizer::{compile, SolveResponse, SolverStatus, TerminationCondition};
    use crate::time_index::{Frequency, TimeIndex};

    fn solved(compiled: &CompiledModel, assignment: Vec<f64>) -> SolvedProgram {
        SolvedProgram {
            meta: SolverMeta {
                solver: "fake".to_string(),
                status: SolverStatus::Ok,
                termination: TerminationCondition::Optimal,
                message: String::new(),
                objective: compiled.program.objective_value(&assignment),
                variables: compiled.program.variables.len(),
                constraints: compiled.program.constraints.len(),
                solve_time_ms: 0,
            },
            response: SolveResponse {
                status: SolverStatus::Ok,
                termination: TerminationCondition::Optimal,
                message: String::new(),
                assignment,
                objective: None,
            },
        }
    }

    fn model() -> NetworkModel {
        let index = TimeIndex::from_date("2022-01-01", 2, Frequency::minutes(60).unwrap()).unwrap();
        let mut model = NetworkModel::new(index);
        model.add_bus(Bus::new("el")).unwrap();
        model
            .add_source("grid", vec![Flow::new("", "el").variable_cost(2.0)])
            .unwrap();
        model
            .add_sink("load", vec![Flow::new("el", "").fixed(vec![1.0, 2.0]).nominal_value(1.0)])
            .unwrap();
        model
    }

    #[test]
    fn test_extract_is_a_pure_read() {
        let model = model();
        let compiled = compile(&model).unwrap();
        let assignment = vec![0.1 + 0.2, 2.000_000_000_1, 1.0, 2.0];
        let solved = solved(&compiled, assignment.clone());

        let first = extract(&model, &compiled, &solved).unwrap();
        let second = extract(&model, &compiled, &solved).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.flow("grid", "el").unwrap(), &assignment[..2]);
        assert_eq!(first.flow("el", "load").unwrap(), &[1.0, 2.0]);
    }

    #[test]
    fn test_assignment_length_mismatch() {
        let model = model();
        let compiled = compile(&model).unwrap();
        let solved = solved(&compiled, vec![1.0]);

        let err = extract(&model, &compiled, &solved).unwrap_err();
        assert_eq!(err.stage(), Stage::Extract);
    }

    #[test]
    fn test_total_cost() {
        let model = model();
        let compiled = compile(&model).unwrap();
        let solution = extract(&model, &compiled, &solved(&compiled, vec![1.0, 2.0, 1.0, 2.0])).unwrap();

        assert_eq!(solution.total_cost(&model), 6.0);
        assert_eq!(solution.objective(), 6.0);
    }
}
