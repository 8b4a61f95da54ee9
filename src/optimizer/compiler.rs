use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::program::{LinearProgram, Sense, VarId};
use crate::error::{DispatchError, Result, Stage};
use crate::network::NetworkModel;

/// Linear program of a network plus the variable maps needed to read it back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledModel {
    pub program: LinearProgram,
    /// `flow_vars[f][t]` is the variable of flow `f` at timestep `t`
    pub flow_vars: Vec<Vec<VarId>>,
    /// `level_vars[s][t]` is the level of storage `s` at the end of timestep `t`
    pub level_vars: Vec<Vec<VarId>>,
}

/// Compile a validated network into a linear program.
///
/// Flow values are average power over a timestep, so costs and storage
/// transitions are weighted by the timestep length in hours.
pub fn compile(model: &NetworkModel) -> Result<CompiledModel> {
    model.validate()?;
    check_lp_names(model)?;

    let periods = model.periods();
    let dt = model.time_index.interval_hours();
    let mut program = LinearProgram::new();

    let flow_vars: Vec<Vec<VarId>> = model
        .flows
        .iter()
        .map(|flow| {
            let name = format!("flow_{}_{}", lp_name(&flow.source), lp_name(&flow.sink));
            (0..periods)
                .map(|t| {
                    let (lower, upper) = flow.bounds(t);
                    program.add_variable(format!("{name}_{t}"), lower, upper)
                })
                .collect()
        })
        .collect();

    for (flow, vars) in model.flows.iter().zip(&flow_vars) {
        for &var in vars {
            program.add_objective_term(var, flow.variable_cost * dt);
        }
    }

    for bus in model.buses.iter().filter(|b| b.balanced) {
        let view = model.bus_view(&bus.label);
        for t in 0..periods {
            let terms = view
                .inbound
                .iter()
                .map(|&f| (flow_vars[f][t], 1.0))
                .chain(view.outbound.iter().map(|&f| (flow_vars[f][t], -1.0)))
                .collect();
            program.add_constraint(
                format!("balance_{}_{t}", lp_name(&bus.label)),
                terms,
                Sense::Eq,
                0.0,
            );
        }
    }

    let mut level_vars = Vec::with_capacity(model.storages.len());
    for storage in &model.storages {
        let (inflow, outflow) = model.storage_flows(&storage.label).ok_or_else(|| {
            DispatchError::invariant(
                Stage::Compile,
                format!("storage '{}' is not connected", storage.label),
            )
        })?;
        let name = lp_name(&storage.label);

        let levels: Vec<VarId> = (0..periods)
            .map(|t| {
                program.add_variable(
                    format!("level_{name}_{t}"),
                    storage.min_level(),
                    Some(storage.max_level()),
                )
            })
            .collect();

        // level[t] - level[t-1] - dt*in[t] + dt*out[t] = -dt*loss[t], level[-1] = initial
        for t in 0..periods {
            let mut terms = vec![
                (levels[t], 1.0),
                (flow_vars[inflow][t], -dt),
                (flow_vars[outflow][t], dt),
            ];
            let mut rhs = -dt * storage.fixed_losses[t];
            if t == 0 {
                rhs += storage.initial_level();
            } else {
                terms.push((levels[t - 1], -1.0));
            }
            program.add_constraint(format!("transition_{name}_{t}"), terms, Sense::Eq, rhs);
        }

        if let (true, Some(&last)) = (storage.balanced, levels.last()) {
            program.add_constraint(
                format!("cycle_{name}"),
                vec![(last, 1.0)],
                Sense::Eq,
                storage.initial_level(),
            );
        }

        level_vars.push(levels);
    }

    info!(
        variables = program.variables.len(),
        constraints = program.constraints.len(),
        periods,
        "compiled linear program"
    );

    Ok(CompiledModel {
        program,
        flow_vars,
        level_vars,
    })
}

/// Reject networks whose labels collapse to the same LP identifier.
///
/// Names are `<base>_<t>` with a numeric `t`, so distinct bases give
/// distinct names.
fn check_lp_names(model: &NetworkModel) -> Result<()> {
    let bases = model
        .flows
        .iter()
        .map(|f| {
            (
                format!("flow_{}_{}", lp_name(&f.source), lp_name(&f.sink)),
                f.label(),
            )
        })
        .chain(
            model
                .buses
                .iter()
                .map(|b| (format!("balance_{}", lp_name(&b.label)), b.label.clone())),
        )
        .chain(
            model
                .storages
                .iter()
                .map(|s| (format!("level_{}", lp_name(&s.label)), s.label.clone())),
        );

    let mut seen: HashMap<String, String> = HashMap::new();
    for (base, label) in bases {
        if let Some(other) = seen.get(&base) {
            return Err(DispatchError::invariant(
                Stage::Compile,
                format!("'{other}' and '{label}' both map to LP name '{base}'"),
            ));
        }
        seen.insert(base, label);
    }
    Ok(())
}

/// Identifier safe for LP files
pub fn lp_name(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}
