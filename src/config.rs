use std::path::{Path, PathBuf};

use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, Stage};
use crate::network::{BevParameters, SiteParameters};
use crate::optimizer::SolverOptions;
use crate::time_index::{Frequency, TimeIndex};

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
pub const ENV_PREFIX: &str = "BEV__";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub horizon: HorizonConfig,
    pub site: SiteConfig,
    pub bev: BevConfig,
    pub solver: SolverConfig,
    pub paths: PathsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizonConfig {
    pub start_date: String,
    pub periods: usize,
    pub freq: Frequency,
}

impl Default for HorizonConfig {
    fn default() -> Self {
        Self {
            start_date: "2022-01-01".to_string(),
            periods: 672,
            freq: Frequency::QUARTER_HOUR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteConfig {
    pub grid_supply_kw: f64,
    pub wallbox_power_kw: f64,
    pub grid_price: f64,
    pub feed_in_credit: f64,
    pub pv_cost: f64,
}

impl Default for SiteConfig {
    fn default() -> Self {
        let site = SiteParameters::default();
        Self {
            grid_supply_kw: site.grid_supply_kw,
            wallbox_power_kw: site.wallbox_power_kw,
            grid_price: site.grid_price,
            feed_in_credit: site.feed_in_credit,
            pv_cost: site.pv_cost,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BevConfig {
    pub capacity_kwh: f64,
    pub min_level_fraction: f64,
    pub max_level_fraction: f64,
    pub initial_level_fraction: f64,
    pub consumption_scale: Option<f64>,
    pub balanced: bool,
}

impl Default for BevConfig {
    fn default() -> Self {
        let bev = BevParameters::default();
        Self {
            capacity_kwh: bev.capacity_kwh,
            min_level_fraction: bev.min_level_fraction,
            max_level_fraction: bev.max_level_fraction,
            initial_level_fraction: bev.initial_level_fraction,
            consumption_scale: bev.consumption_scale,
            balanced: bev.balanced,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    pub name: String,
    pub verbose: bool,
    /// Write the compiled program here before solving
    pub lp_file: Option<PathBuf>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        let options = SolverOptions::default();
        Self {
            name: options.name,
            verbose: options.verbose,
            lp_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    pub timeseries: PathBuf,
    pub dumps: PathBuf,
    pub profiles: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            timeseries: PathBuf::from("input_timeseries/input_timeseries_with_BEV.csv"),
            dumps: PathBuf::from("dumps"),
            profiles: PathBuf::from("db"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Also log to this file
    pub file: Option<PathBuf>,
}

impl Config {
    /// Defaults, then `config/default.toml` if present, then `BEV__*` variables.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(DEFAULT_CONFIG_PATH))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        let cfg: Config = figment.extract()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), DispatchError> {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(DispatchError::configuration(
                    Stage::Configuration,
                    format!("{name} must be positive, got {v}"),
                ))
            }
        };
        positive("site.grid_supply_kw", self.site.grid_supply_kw)?;
        positive("site.wallbox_power_kw", self.site.wallbox_power_kw)?;
        positive("bev.capacity_kwh", self.bev.capacity_kwh)?;
        if let Some(scale) = self.bev.consumption_scale {
            positive("bev.consumption_scale", scale)?;
        }
        for (name, v) in [
            ("site.grid_price", self.site.grid_price),
            ("site.feed_in_credit", self.site.feed_in_credit),
            ("site.pv_cost", self.site.pv_cost),
        ] {
            if !v.is_finite() {
                return Err(DispatchError::configuration(
                    Stage::Configuration,
                    format!("{name} must be finite"),
                ));
            }
        }
        if self.solver.name.trim().is_empty() {
            return Err(DispatchError::configuration(
                Stage::Configuration,
                "solver.name must not be empty",
            ));
        }
        Ok(())
    }

    pub fn time_index(&self) -> Result<TimeIndex, DispatchError> {
        TimeIndex::from_date(&self.horizon.start_date, self.horizon.periods, self.horizon.freq)
    }

    pub fn site_parameters(&self) -> SiteParameters {
        SiteParameters {
            grid_supply_kw: self.site.grid_supply_kw,
            wallbox_power_kw: self.site.wallbox_power_kw,
            grid_price: self.site.grid_price,
            feed_in_credit: self.site.feed_in_credit,
            pv_cost: self.site.pv_cost,
            bev: BevParameters {
                capacity_kwh: self.bev.capacity_kwh,
                min_level_fraction: self.bev.min_level_fraction,
                max_level_fraction: self.bev.max_level_fraction,
                initial_level_fraction: self.bev.initial_level_fraction,
                consumption_scale: self.bev.consumption_scale,
                balanced: self.bev.balanced,
            },
        }
    }

    pub fn solver_options(&self) -> SolverOptions {
        SolverOptions {
            name: self.solver.name.clone(),
            verbose: self.solver.verbose,
        }
    }
}
