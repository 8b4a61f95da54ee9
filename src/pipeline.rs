//! Build, compile, solve, extract.
//!
//! One run is strictly sequential and owns its time index, network and
//! solution. Runs are independent; a sweep runs them one after another and
//! keeps going past failed runs.

use std::path::PathBuf;

use tracing::{error, info, info_span};

use crate::error::Result;
use crate::network::{build_site_network, NetworkModel, SiteParameters};
use crate::optimizer::{compile, solve_checked, write_lp_file, SolverClient, SolverOptions};
use crate::profiles::ConsumptionSeries;
use crate::repo::DumpRepository;
use crate::results::extract;
use crate::time_index::TimeIndex;
use crate::timeseries::{ExogenousSeries, COL_BEV_AT_HOME, COL_CONSUMPTION};

pub struct Pipeline<'a> {
    solver: &'a dyn SolverClient,
    options: SolverOptions,
    lp_file: Option<PathBuf>,
}

impl<'a> Pipeline<'a> {
    pub fn new(solver: &'a dyn SolverClient, options: SolverOptions) -> Self {
        Self {
            solver,
            options,
            lp_file: None,
        }
    }

    /// Write each compiled program to `path` before solving
    pub fn with_lp_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.lp_file = Some(path.into());
        self
    }

    /// Run the site pipeline on a table of exogenous series.
    ///
    /// Returns the network with its solution attached. Nothing is persisted.
    pub fn run(
        &self,
        index: &TimeIndex,
        table: &ExogenousSeries,
        params: &SiteParameters,
    ) -> Result<NetworkModel> {
        info!(periods = index.len(), freq = %index.freq(), "define time index");
        let series = table.site_series(index)?;

        info!("create energy system objects");
        let model = build_site_network(index, &series, params)?;

        self.solve(model)
    }

    /// Compile, solve and extract an already built network
    pub fn solve(&self, mut model: NetworkModel) -> Result<NetworkModel> {
        let compiled = compile(&model)?;

        if let Some(path) = &self.lp_file {
            write_lp_file(&compiled.program, path)?;
        }

        info!(solver = %self.options.name, "solve the optimization problem");
        let solved = solve_checked(self.solver, &compiled.program, &self.options)?;

        let solution = extract(&model, &compiled, &solved)?;
        model.attach_results(solution);
        Ok(model)
    }

    /// Run once per consumption profile and persist each solved run as
    /// `<run_id>_<profile>`.
    ///
    /// A failed profile is logged and recorded; the sweep continues.
    pub fn sweep<'p>(
        &self,
        run_id: &str,
        index: &TimeIndex,
        table: &ExogenousSeries,
        params: &SiteParameters,
        profiles: impl IntoIterator<Item = (&'p str, &'p ConsumptionSeries)>,
        repo: &DumpRepository,
    ) -> Vec<SweepOutcome> {
        let mut outcomes = Vec::new();
        for (profile, series) in profiles {
            let profile_run = format!("{run_id}_{profile}");
            let span = info_span!("sweep", run_id = %profile_run);
            let _enter = span.enter();

            let table = with_profile(table, series);
            let result = self
                .run(index, &table, params)
                .and_then(|model| {
                    repo.save(&profile_run, &model)?;
                    Ok(model.results.map_or(f64::NAN, |r| r.objective()))
                });

            if let Err(e) = &result {
                error!(stage = %e.stage(), error = %e, "run failed, continuing with next profile");
            }
            outcomes.push(SweepOutcome {
                profile: profile.to_string(),
                run_id: profile_run,
                result,
            });
        }

        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        info!(runs = outcomes.len(), failed, "sweep finished");
        outcomes
    }
}

/// Result of one sweep run: the objective value or the error that ended it
#[derive(Debug)]
pub struct SweepOutcome {
    pub profile: String,
    pub run_id: String,
    pub result: Result<f64>,
}

/// Replace the vehicle columns of the site table with a profile's series
pub fn with_profile(table: &ExogenousSeries, profile: &ConsumptionSeries) -> ExogenousSeries {
    let mut table = table.clone();
    table.insert(COL_CONSUMPTION, profile.consumption.clone());
    if let Some(at_home) = &profile.bev_at_home {
        table.insert(COL_BEV_AT_HOME, at_home.clone());
    }
    table
}
