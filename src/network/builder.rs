use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::model::{Bus, Flow, NetworkModel, Storage};
use crate::error::Result;
use crate::time_index::TimeIndex;
use crate::timeseries::SiteSeries;

pub const BUS_ELECTRICITY: &str = "electricity";
pub const BUS_MOBILITY: &str = "mobility";
pub const PV: &str = "pv";
pub const GRID: &str = "grid-supply";
pub const WALLBOX: &str = "wallbox";
pub const EXCESS: &str = "excess_bel";
pub const DEMAND: &str = "demand";
pub const BEV_STORAGE: &str = "BEV_Storage";

/// Numeric parameters of the site network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteParameters {
    /// Grid import capacity (kW)
    pub grid_supply_kw: f64,
    /// Wallbox charging power (kW)
    pub wallbox_power_kw: f64,
    /// Import price, currency per kWh
    pub grid_price: f64,
    /// Export remuneration as a cost, negative for a credit
    pub feed_in_credit: f64,
    pub pv_cost: f64,
    pub bev: BevParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BevParameters {
    pub capacity_kwh: f64,
    pub min_level_fraction: f64,
    pub max_level_fraction: f64,
    pub initial_level_fraction: f64,
    /// Factor applied to the consumption series; defaults to steps per hour
    pub consumption_scale: Option<f64>,
    pub balanced: bool,
}

impl Default for SiteParameters {
    fn default() -> Self {
        Self {
            grid_supply_kw: 30.0,
            wallbox_power_kw: 11.0,
            grid_price: 30.0,
            feed_in_credit: -7.9,
            pv_cost: 0.0,
            bev: BevParameters::default(),
        }
    }
}

impl Default for BevParameters {
    fn default() -> Self {
        Self {
            capacity_kwh: 45.0,
            min_level_fraction: 0.4,
            max_level_fraction: 0.95,
            initial_level_fraction: 0.95,
            consumption_scale: None,
            balanced: false,
        }
    }
}

/// Build the two-bus site network.
///
/// ```text
///        electricity                  mobility
///            |                            |
///  pv ------>|                 wallbox -->|<---> BEV_Storage
///  grid ---->|                            |
///            |----> excess_bel
///            |----> demand
/// ```
///
/// The wallbox feeds the mobility bus directly and is priced at the grid
/// price; its draw is not balanced against the electricity bus.
pub fn build_site_network(
    index: &TimeIndex,
    series: &SiteSeries,
    params: &SiteParameters,
) -> Result<NetworkModel> {
    let mut model = NetworkModel::new(index.clone());

    model.add_bus(Bus::new(BUS_ELECTRICITY))?;
    model.add_bus(Bus::new(BUS_MOBILITY))?;

    model.add_source(
        PV,
        vec![Flow::new(PV, BUS_ELECTRICITY)
            .fixed(series.pv_kw.clone())
            .nominal_value(1.0)
            .variable_cost(params.pv_cost)],
    )?;

    model.add_source(
        WALLBOX,
        vec![Flow::new(WALLBOX, BUS_MOBILITY)
            .max(series.bev_at_home.clone())
            .nominal_value(params.wallbox_power_kw)
            .variable_cost(params.grid_price)],
    )?;

    model.add_source(
        GRID,
        vec![Flow::new(GRID, BUS_ELECTRICITY)
            .nominal_value(params.grid_supply_kw)
            .variable_cost(params.grid_price)],
    )?;

    model.add_sink(
        EXCESS,
        vec![Flow::new(BUS_ELECTRICITY, EXCESS).variable_cost(params.feed_in_credit)],
    )?;

    model.add_sink(
        DEMAND,
        vec![Flow::new(BUS_ELECTRICITY, DEMAND)
            .fixed(series.load_kw.clone())
            .nominal_value(1.0)],
    )?;

    let scale = params
        .bev
        .consumption_scale
        .unwrap_or_else(|| index.steps_per_hour());
    debug!(scale, "scaling vehicle consumption to fixed losses");

    model.add_storage(
        Storage {
            label: BEV_STORAGE.to_string(),
            capacity: params.bev.capacity_kwh,
            min_level_fraction: params.bev.min_level_fraction,
            max_level_fraction: params.bev.max_level_fraction,
            initial_level_fraction: params.bev.initial_level_fraction,
            fixed_losses: series.consumption.iter().map(|c| c * scale).collect(),
            balanced: params.bev.balanced,
        },
        BUS_MOBILITY,
    )?;

    model.validate()?;

    info!(
        buses = model.buses.len(),
        flows = model.flows.len(),
        storages = model.storages.len(),
        "site network built"
    );
    Ok(model)
}
