use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, Result, Stage};
use crate::results::Solution;
use crate::time_index::TimeIndex;

/// Conservation node for one energy carrier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bus {
    pub label: String,
    /// Inflow equals outflow at every timestep
    pub balanced: bool,
}

impl Bus {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            balanced: true,
        }
    }
}

/// Node with outbound flows only (generation, grid import)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub label: String,
}

/// Node with inbound flows only (demand, export, curtailment)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sink {
    pub label: String,
}

/// Energy store charged and discharged through one bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Storage {
    pub label: String,
    /// Nominal capacity (kWh)
    pub capacity: f64,
    pub min_level_fraction: f64,
    pub max_level_fraction: f64,
    pub initial_level_fraction: f64,
    /// Parasitic draw per timestep (kW), independent of the storage flows
    pub fixed_losses: Vec<f64>,
    /// Last level must return to the initial level
    #[serde(default)]
    pub balanced: bool,
}

impl Storage {
    pub fn min_level(&self) -> f64 {
        self.capacity * self.min_level_fraction
    }

    pub fn max_level(&self) -> f64 {
        self.capacity * self.max_level_fraction
    }

    pub fn initial_level(&self) -> f64 {
        self.capacity * self.initial_level_fraction
    }

    pub fn validate(&self) -> Result<()> {
        let fraction = |name: &str, v: f64| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(DispatchError::invariant(
                    Stage::NetworkBuild,
                    format!("storage '{}': {name} {v} outside [0, 1]", self.label),
                ))
            }
        };

        if !self.capacity.is_finite() || self.capacity <= 0.0 {
            return Err(DispatchError::invariant(
                Stage::NetworkBuild,
                format!("storage '{}': capacity {} must be positive", self.label, self.capacity),
            ));
        }
        fraction("min_level_fraction", self.min_level_fraction)?;
        fraction("max_level_fraction", self.max_level_fraction)?;
        fraction("initial_level_fraction", self.initial_level_fraction)?;

        if self.min_level_fraction > self.max_level_fraction {
            return Err(DispatchError::invariant(
                Stage::NetworkBuild,
                format!(
                    "storage '{}': min_level_fraction {} > max_level_fraction {}",
                    self.label, self.min_level_fraction, self.max_level_fraction
                ),
            ));
        }
        if self.initial_level_fraction < self.min_level_fraction
            || self.initial_level_fraction > self.max_level_fraction
        {
            return Err(DispatchError::invariant(
                Stage::NetworkBuild,
                format!(
                    "storage '{}': initial_level_fraction {} outside [{}, {}]",
                    self.label,
                    self.initial_level_fraction,
                    self.min_level_fraction,
                    self.max_level_fraction
                ),
            ));
        }
        Ok(())
    }
}

/// Per-timestep profile of a flow, relative to its nominal value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "values", rename_all = "snake_case")]
pub enum FlowProfile {
    /// Flow pinned to `values[t] × nominal_value`
    Fixed(Vec<f64>),
    /// Flow capped at `values[t] × nominal_value`
    Max(Vec<f64>),
}

impl FlowProfile {
    pub fn values(&self) -> &[f64] {
        match self {
            Self::Fixed(v) | Self::Max(v) => v,
        }
    }
}

/// Directed, time-indexed arc between a bus and a component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub source: String,
    pub sink: String,
    pub nominal_value: Option<f64>,
    pub profile: Option<FlowProfile>,
    /// Currency per kWh; negative values are credits
    pub variable_cost: f64,
}

impl Flow {
    pub fn new(source: impl Into<String>, sink: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            sink: sink.into(),
            nominal_value: None,
            profile: None,
            variable_cost: 0.0,
        }
    }

    pub fn nominal_value(mut self, value: f64) -> Self {
        self.nominal_value = Some(value);
        self
    }

    pub fn fixed(mut self, profile: Vec<f64>) -> Self {
        self.profile = Some(FlowProfile::Fixed(profile));
        self
    }

    pub fn max(mut self, profile: Vec<f64>) -> Self {
        self.profile = Some(FlowProfile::Max(profile));
        self
    }

    pub fn variable_cost(mut self, cost: f64) -> Self {
        self.variable_cost = cost;
        self
    }

    pub fn label(&self) -> String {
        format!("{}->{}", self.source, self.sink)
    }

    /// Lower and upper bound of the flow at timestep `t`
    pub fn bounds(&self, t: usize) -> (f64, Option<f64>) {
        match (&self.profile, self.nominal_value) {
            (Some(FlowProfile::Fixed(p)), Some(n)) => (p[t] * n, Some(p[t] * n)),
            (Some(FlowProfile::Max(p)), Some(n)) => (0.0, Some(p[t] * n)),
            (None, Some(n)) => (0.0, Some(n)),
            _ => (0.0, None),
        }
    }
}

/// Kind of a node referenced by a flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Bus,
    Source,
    Sink,
    Storage,
}

/// Inbound and outbound flow indices of a bus
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BusView {
    pub inbound: Vec<usize>,
    pub outbound: Vec<usize>,
}

/// The full flow network of one run.
///
/// Built once, then handed to the compiler; the only later mutation is
/// [`NetworkModel::attach_results`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkModel {
    pub time_index: TimeIndex,
    pub buses: Vec<Bus>,
    pub sources: Vec<Source>,
    pub sinks: Vec<Sink>,
    pub storages: Vec<Storage>,
    pub flows: Vec<Flow>,
    #[serde(default)]
    pub results: Option<Solution>,
}

impl NetworkModel {
    pub fn new(time_index: TimeIndex) -> Self {
        Self {
            time_index,
            buses: Vec::new(),
            sources: Vec::new(),
            sinks: Vec::new(),
            storages: Vec::new(),
            flows: Vec::new(),
            results: None,
        }
    }

    pub fn periods(&self) -> usize {
        self.time_index.len()
    }

    pub fn node_kind(&self, label: &str) -> Option<NodeKind> {
        if self.buses.iter().any(|b| b.label == label) {
            Some(NodeKind::Bus)
        } else if self.sources.iter().any(|s| s.label == label) {
            Some(NodeKind::Source)
        } else if self.sinks.iter().any(|s| s.label == label) {
            Some(NodeKind::Sink)
        } else if self.storages.iter().any(|s| s.label == label) {
            Some(NodeKind::Storage)
        } else {
            None
        }
    }

    fn ensure_new_label(&self, label: &str) -> Result<()> {
        if self.node_kind(label).is_some() {
            return Err(DispatchError::invariant(
                Stage::NetworkBuild,
                format!("duplicate node label '{label}'"),
            ));
        }
        Ok(())
    }

    pub fn add_bus(&mut self, bus: Bus) -> Result<()> {
        self.ensure_new_label(&bus.label)?;
        self.buses.push(bus);
        Ok(())
    }

    pub fn add_source(&mut self, label: &str, outputs: Vec<Flow>) -> Result<()> {
        self.ensure_new_label(label)?;
        self.sources.push(Source {
            label: label.to_string(),
        });
        for flow in outputs {
            self.add_flow(Flow {
                source: label.to_string(),
                ..flow
            })?;
        }
        Ok(())
    }

    pub fn add_sink(&mut self, label: &str, inputs: Vec<Flow>) -> Result<()> {
        self.ensure_new_label(label)?;
        self.sinks.push(Sink {
            label: label.to_string(),
        });
        for flow in inputs {
            self.add_flow(Flow {
                sink: label.to_string(),
                ..flow
            })?;
        }
        Ok(())
    }

    /// Add a storage with one unbounded, cost-free charge and discharge flow on `bus`
    pub fn add_storage(&mut self, storage: Storage, bus: &str) -> Result<()> {
        storage.validate()?;
        self.ensure_new_label(&storage.label)?;
        let label = storage.label.clone();
        self.storages.push(storage);
        self.add_flow(Flow::new(bus, &label))?;
        self.add_flow(Flow::new(&label, bus))
    }

    fn add_flow(&mut self, flow: Flow) -> Result<()> {
        let source = self.node_kind(&flow.source);
        let sink = self.node_kind(&flow.sink);
        match (source, sink) {
            (None, _) | (_, None) => Err(DispatchError::invariant(
                Stage::NetworkBuild,
                format!("flow {} references an unknown node", flow.label()),
            )),
            (Some(NodeKind::Bus), Some(NodeKind::Bus)) => Err(DispatchError::invariant(
                Stage::NetworkBuild,
                format!("flow {} connects two buses", flow.label()),
            )),
            (Some(a), Some(b)) if a != NodeKind::Bus && b != NodeKind::Bus => {
                Err(DispatchError::invariant(
                    Stage::NetworkBuild,
                    format!("flow {} does not touch a bus", flow.label()),
                ))
            }
            (_, Some(NodeKind::Source)) => Err(DispatchError::invariant(
                Stage::NetworkBuild,
                format!("source '{}' cannot have inbound flows", flow.sink),
            )),
            (Some(NodeKind::Sink), _) => Err(DispatchError::invariant(
                Stage::NetworkBuild,
                format!("sink '{}' cannot have outbound flows", flow.source),
            )),
            _ => {
                if self
                    .flows
                    .iter()
                    .any(|f| f.source == flow.source && f.sink == flow.sink)
                {
                    return Err(DispatchError::invariant(
                        Stage::NetworkBuild,
                        format!("duplicate flow {}", flow.label()),
                    ));
                }
                self.flows.push(flow);
                Ok(())
            }
        }
    }

    pub fn flow_index(&self, source: &str, sink: &str) -> Option<usize> {
        self.flows
            .iter()
            .position(|f| f.source == source && f.sink == sink)
    }

    pub fn bus_view(&self, bus: &str) -> BusView {
        let mut view = BusView::default();
        for (i, flow) in self.flows.iter().enumerate() {
            if flow.sink == bus {
                view.inbound.push(i);
            }
            if flow.source == bus {
                view.outbound.push(i);
            }
        }
        view
    }

    /// Charge and discharge flow indices of a storage
    pub fn storage_flows(&self, storage: &str) -> Option<(usize, usize)> {
        let inflow = self.flows.iter().position(|f| f.sink == storage)?;
        let outflow = self.flows.iter().position(|f| f.source == storage)?;
        Some((inflow, outflow))
    }

    /// Check structural and data invariants before compilation
    pub fn validate(&self) -> Result<()> {
        let periods = self.periods();

        for flow in &self.flows {
            if let Some(profile) = &flow.profile {
                if flow.nominal_value.is_none() {
                    return Err(DispatchError::configuration(
                        Stage::NetworkBuild,
                        format!("flow {} has a profile but no nominal value", flow.label()),
                    ));
                }
                let values = profile.values();
                if values.len() < periods {
                    return Err(DispatchError::configuration(
                        Stage::NetworkBuild,
                        format!(
                            "profile of flow {} has {} values, time index needs {periods}",
                            flow.label(),
                            values.len()
                        ),
                    ));
                }
                if values[..periods].iter().any(|v| !v.is_finite() || *v < 0.0) {
                    return Err(DispatchError::configuration(
                        Stage::NetworkBuild,
                        format!("profile of flow {} has negative or non-finite values", flow.label()),
                    ));
                }
            }
            if let Some(n) = flow.nominal_value {
                if !n.is_finite() || n < 0.0 {
                    return Err(DispatchError::configuration(
                        Stage::NetworkBuild,
                        format!("flow {} has invalid nominal value {n}", flow.label()),
                    ));
                }
            }
            if !flow.variable_cost.is_finite() {
                return Err(DispatchError::configuration(
                    Stage::NetworkBuild,
                    format!("flow {} has a non-finite cost", flow.label()),
                ));
            }
        }

        for source in &self.sources {
            if !self.flows.iter().any(|f| f.source == source.label) {
                return Err(DispatchError::invariant(
                    Stage::NetworkBuild,
                    format!("source '{}' has no outbound flow", source.label),
                ));
            }
        }
        for sink in &self.sinks {
            if !self.flows.iter().any(|f| f.sink == sink.label) {
                return Err(DispatchError::invariant(
                    Stage::NetworkBuild,
                    format!("sink '{}' has no inbound flow", sink.label),
                ));
            }
        }

        for storage in &self.storages {
            storage.validate()?;
            if storage.fixed_losses.len() < periods {
                return Err(DispatchError::configuration(
                    Stage::NetworkBuild,
                    format!(
                        "storage '{}' has {} fixed losses, time index needs {periods}",
                        storage.label,
                        storage.fixed_losses.len()
                    ),
                ));
            }
            let inbound: Vec<&Flow> = self.flows.iter().filter(|f| f.sink == storage.label).collect();
            let outbound: Vec<&Flow> = self.flows.iter().filter(|f| f.source == storage.label).collect();
            match (inbound.as_slice(), outbound.as_slice()) {
                ([i], [o]) if i.source == o.sink => {}
                _ => {
                    return Err(DispatchError::invariant(
                        Stage::NetworkBuild,
                        format!(
                            "storage '{}' needs exactly one inbound and one outbound flow on the same bus",
                            storage.label
                        ),
                    ))
                }
            }
        }

        let connected: BTreeSet<&str> = self
            .flows
            .iter()
            .flat_map(|f| [f.source.as_str(), f.sink.as_str()])
            .collect();
        if let Some(bus) = self.buses.iter().find(|b| !connected.contains(b.label.as_str())) {
            return Err(DispatchError::invariant(
                Stage::NetworkBuild,
                format!("bus '{}' has no flows", bus.label),
            ));
        }

        Ok(())
    }

    pub fn attach_results(&mut self, solution: Solution) {
        self.results = Some(solution);
    }
}
