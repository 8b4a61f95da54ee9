//! End-to-end runs of the site network on the minilp backend.

#![cfg(feature = "optimization")]

use bev_dispatch::network::{
    BevParameters, NetworkModel, SiteParameters, BEV_STORAGE, BUS_ELECTRICITY, BUS_MOBILITY,
    DEMAND, EXCESS, GRID, PV, WALLBOX,
};
use bev_dispatch::optimizer::{
    compile, MiniLpSolver, SolverOptions, SolverStatus, TerminationCondition,
};
use bev_dispatch::pipeline::Pipeline;
use bev_dispatch::profiles::ConsumptionSeries;
use bev_dispatch::repo::DumpRepository;
use bev_dispatch::time_index::{Frequency, TimeIndex};
use bev_dispatch::timeseries::{
    ExogenousSeries, COL_BEV_AT_HOME, COL_CHARGING_POWER, COL_CONSUMPTION, COL_LOAD, COL_PV,
};
use bev_dispatch::DispatchError;

const EPS: f64 = 1e-6;

fn assert_close(actual: f64, expected: f64, what: &str) {
    assert!(
        (actual - expected).abs() < EPS,
        "{what}: expected {expected}, got {actual}"
    );
}

fn table(at_home: Vec<f64>, pv: Vec<f64>, load: Vec<f64>, consumption: Vec<f64>) -> ExogenousSeries {
    let t = pv.len();
    ExogenousSeries::new()
        .with_column(COL_BEV_AT_HOME, at_home)
        .with_column(COL_PV, pv)
        .with_column(COL_LOAD, load)
        .with_column(COL_CONSUMPTION, consumption)
        .with_column(COL_CHARGING_POWER, vec![11.0; t])
}

fn hourly(t: usize) -> TimeIndex {
    TimeIndex::from_date("2022-01-01", t, Frequency::HOUR).unwrap()
}

fn quarter_hourly(t: usize) -> TimeIndex {
    TimeIndex::from_date("2022-01-01", t, Frequency::QUARTER_HOUR).unwrap()
}

fn solve(index: &TimeIndex, table: &ExogenousSeries, params: &SiteParameters) -> Result<NetworkModel, DispatchError> {
    let solver = MiniLpSolver::new();
    Pipeline::new(&solver, SolverOptions::default()).run(index, table, params)
}

/// Largest violation of the compiled program by the extracted solution
fn max_violation(model: &NetworkModel) -> f64 {
    let compiled = compile(model).unwrap();
    let results = model.results.as_ref().unwrap();

    let mut assignment = vec![f64::NAN; compiled.program.variables.len()];
    let flows = compiled.flow_vars.iter().zip(results.flows.iter().map(|f| &f.values));
    let levels = compiled.level_vars.iter().zip(results.storages.iter().map(|s| &s.levels));
    for (vars, values) in flows.chain(levels) {
        for (var, value) in vars.iter().zip(values) {
            assignment[var.0] = *value;
        }
    }
    assert!(assignment.iter().all(|v| v.is_finite()), "unassigned variables");

    compiled.program.max_violation(&assignment)
}

#[test]
fn pv_surplus_is_exported_and_deficit_imported() {
    let params = SiteParameters::default();
    let table = table(
        vec![0.0; 4],
        vec![0.0, 0.0, 10.0, 10.0],
        vec![5.0; 4],
        vec![0.0; 4],
    );

    let model = solve(&hourly(4), &table, &params).unwrap();
    let results = model.results.as_ref().unwrap();

    let grid = results.flow(GRID, BUS_ELECTRICITY).unwrap();
    let excess = results.flow(BUS_ELECTRICITY, EXCESS).unwrap();
    for (t, (g, e)) in [(5.0, 0.0), (5.0, 0.0), (0.0, 5.0), (0.0, 5.0)].into_iter().enumerate() {
        assert_close(grid[t], g, &format!("grid at {t}"));
        assert_close(excess[t], e, &format!("excess at {t}"));
    }

    let expected = 2.0 * 5.0 * params.grid_price + 2.0 * 5.0 * params.feed_in_credit;
    assert_close(results.objective(), expected, "objective");
    assert_close(results.total_cost(&model), expected, "recomputed cost");

    assert_eq!(results.meta.status, SolverStatus::Ok);
    assert_eq!(results.meta.termination, TerminationCondition::Optimal);
    assert!(max_violation(&model) < EPS);
}

#[test]
fn vehicle_is_charged_just_enough_at_home() {
    let index = quarter_hourly(8);
    let dt = index.interval_hours();
    let at_home = vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0];
    let consumption = vec![1.5; 8];
    let params = SiteParameters {
        bev: BevParameters {
            initial_level_fraction: 0.5,
            ..BevParameters::default()
        },
        ..SiteParameters::default()
    };
    let table = table(at_home.clone(), vec![0.0; 8], vec![1.0; 8], consumption.clone());

    let model = solve(&index, &table, &params).unwrap();
    let results = model.results.as_ref().unwrap();

    let pv = results.flow(PV, BUS_ELECTRICITY).unwrap();
    let grid = results.flow(GRID, BUS_ELECTRICITY).unwrap();
    let excess = results.flow(BUS_ELECTRICITY, EXCESS).unwrap();
    let demand = results.flow(BUS_ELECTRICITY, DEMAND).unwrap();
    let wallbox = results.flow(WALLBOX, BUS_MOBILITY).unwrap();
    let charge = results.flow(BUS_MOBILITY, BEV_STORAGE).unwrap();
    let discharge = results.flow(BEV_STORAGE, BUS_MOBILITY).unwrap();
    let level = results.storage_level(BEV_STORAGE).unwrap();

    let capacity = params.bev.capacity_kwh;
    let mut previous = capacity * params.bev.initial_level_fraction;
    for t in 0..index.len() {
        assert_close(pv[t] + grid[t], excess[t] + demand[t], &format!("electricity balance at {t}"));
        assert_close(wallbox[t] + discharge[t], charge[t], &format!("mobility balance at {t}"));

        let losses = consumption[t] * index.steps_per_hour();
        assert_close(
            level[t],
            previous + (charge[t] - discharge[t] - losses) * dt,
            &format!("storage transition at {t}"),
        );
        previous = level[t];

        assert!(level[t] >= capacity * params.bev.min_level_fraction - EPS);
        assert!(level[t] <= capacity * params.bev.max_level_fraction + EPS);
        assert!(wallbox[t] >= -EPS);
        assert!(wallbox[t] <= params.wallbox_power_kw * at_home[t] + EPS);
        assert!(grid[t] <= params.grid_supply_kw + EPS);
    }

    // 22.5 kWh at start, 12 kWh driven, 18 kWh floor
    let charged: f64 = wallbox.iter().map(|p| p * dt).sum();
    assert_close(charged, 7.5, "charged energy");
    assert_close(level[7], 18.0, "final level");

    let expected = params.grid_price * (1.0 * dt * 8.0 + charged);
    assert_close(results.objective(), expected, "objective");
    assert!(max_violation(&model) < EPS);
}

#[test]
fn balanced_storage_returns_to_initial_level() {
    let index = quarter_hourly(8);
    let params = SiteParameters {
        bev: BevParameters {
            initial_level_fraction: 0.5,
            balanced: true,
            ..BevParameters::default()
        },
        ..SiteParameters::default()
    };
    let table = table(vec![1.0; 8], vec![0.0; 8], vec![1.0; 8], vec![1.0; 8]);

    let model = solve(&index, &table, &params).unwrap();
    let level = model.results.as_ref().unwrap().storage_level(BEV_STORAGE).unwrap();

    assert_close(level[7], 22.5, "final level");
    assert!(max_violation(&model) < EPS);
}

#[test]
fn demand_above_supply_is_a_solve_failure() {
    let table = table(vec![0.0; 4], vec![0.0; 4], vec![50.0; 4], vec![0.0; 4]);

    let err = solve(&hourly(4), &table, &SiteParameters::default()).unwrap_err();

    match err {
        DispatchError::SolveFailure { termination, .. } => {
            assert_ne!(termination, TerminationCondition::Optimal)
        }
        other => panic!("expected solve failure, got {other}"),
    }
}

#[test]
fn unknown_solver_name_is_a_solve_failure() {
    let table = table(vec![0.0; 4], vec![0.0; 4], vec![1.0; 4], vec![0.0; 4]);
    let solver = MiniLpSolver::new();
    let options = SolverOptions {
        name: "cbc".to_string(),
        verbose: false,
    };

    let err = Pipeline::new(&solver, options)
        .run(&hourly(4), &table, &SiteParameters::default())
        .unwrap_err();

    assert!(matches!(
        err,
        DispatchError::SolveFailure {
            status: SolverStatus::Error,
            ..
        }
    ));
}

#[test]
fn stored_run_reloads_identically() {
    let dir = tempfile::tempdir().unwrap();
    let repo = DumpRepository::new(dir.path());
    let table = table(
        vec![1.0, 1.0, 0.0, 0.0],
        vec![0.0, 3.3, 7.1, 0.4],
        vec![0.7, 1.1, 2.3, 0.9],
        vec![0.0, 0.0, 0.9, 1.3],
    );
    let model = solve(&quarter_hourly(4), &table, &SiteParameters::default()).unwrap();

    repo.save("base", &model).unwrap();
    let artifact = repo.load("base").unwrap();

    assert_eq!(artifact.run_id, "base");
    assert_eq!(artifact.model, model);
    assert_eq!(repo.list().unwrap(), vec!["base"]);
}

#[test]
fn lp_file_is_written_before_solving() {
    let dir = tempfile::tempdir().unwrap();
    let lp = dir.path().join("lp").join("model.lp");
    let table = table(vec![0.0; 2], vec![0.0; 2], vec![1.0; 2], vec![0.0; 2]);
    let solver = MiniLpSolver::new();

    Pipeline::new(&solver, SolverOptions::default())
        .with_lp_file(&lp)
        .run(&hourly(2), &table, &SiteParameters::default())
        .unwrap();

    let text = std::fs::read_to_string(lp).unwrap();
    assert!(text.starts_with("\\"), "missing header comment");
    assert!(text.contains("Subject To"));
    assert!(text.contains("balance_electricity_0"));
}

#[test]
fn sweep_continues_past_a_failed_profile() {
    let dir = tempfile::tempdir().unwrap();
    let repo = DumpRepository::new(dir.path());
    let index = quarter_hourly(4);
    let base = table(vec![1.0; 4], vec![0.0; 4], vec![1.0; 4], vec![0.0; 4]);

    let light = ConsumptionSeries {
        consumption: vec![0.5; 4],
        bev_at_home: None,
    };
    // 50 kWh per step empties the battery below its floor
    let heavy = ConsumptionSeries {
        consumption: vec![50.0; 4],
        bev_at_home: Some(vec![0.0; 4]),
    };
    let profiles = [("commuter", &light), ("long_haul", &heavy)];

    let solver = MiniLpSolver::new();
    let outcomes = Pipeline::new(&solver, SolverOptions::default()).sweep(
        "week",
        &index,
        &base,
        &SiteParameters::default(),
        profiles,
        &repo,
    );

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].run_id, "week_commuter");
    assert!(outcomes[0].result.is_ok());
    assert_eq!(outcomes[1].run_id, "week_long_haul");
    assert!(matches!(
        outcomes[1].result,
        Err(DispatchError::SolveFailure { .. })
    ));

    assert_eq!(repo.list().unwrap(), vec!["week_commuter"]);
}
