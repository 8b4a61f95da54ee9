use std::path::PathBuf;

use anyhow::{Context, Result};
use bev_dispatch::config::{Config, DEFAULT_CONFIG_PATH};
use bev_dispatch::optimizer::MiniLpSolver;
use bev_dispatch::profiles::ProfileDatabase;
use bev_dispatch::repo::DumpRepository;
use bev_dispatch::telemetry::init_tracing;
use bev_dispatch::timeseries::ExogenousSeries;
use bev_dispatch::Pipeline;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "bev-dispatch")]
#[command(about = "Least-cost dispatch of a PV site with grid exchange and an EV battery", long_about = None)]
struct Cli {
    /// Configuration file, layered over the built-in defaults
    #[arg(short, long, global = true, env = "BEV_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Solve the site for the configured horizon and store the result
    Solve {
        /// Name of the stored artifact
        run_id: String,
    },
    /// Solve once per consumption profile in the profile database
    Sweep {
        /// Prefix of the stored artifacts, `<RUN_ID>_<profile>`
        run_id: String,
    },
    /// Print a summary of a stored run
    Inspect {
        run_id: String,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let cfg = Config::load_from(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    let _guard = init_tracing(cfg.logging.file.as_deref());

    let repo = DumpRepository::new(&cfg.paths.dumps);

    match cli.command {
        Command::Solve { run_id } => {
            // fail on a bad run id before spending time in the solver
            repo.path_for(&run_id)?;

            let index = cfg.time_index()?;
            let table = ExogenousSeries::from_csv_path(&cfg.paths.timeseries)?;
            let solver = MiniLpSolver::new();
            let model = pipeline(&cfg, &solver).run(&index, &table, &cfg.site_parameters())?;

            let path = repo.save(&run_id, &model)?;
            if let Some(results) = &model.results {
                info!(run_id = %run_id, objective = results.objective(), path = %path.display(), "run stored");
            }
        }
        Command::Sweep { run_id } => {
            let index = cfg.time_index()?;
            let table = ExogenousSeries::from_csv_path(&cfg.paths.timeseries)?;
            let db = ProfileDatabase::load(&cfg.paths.profiles)?;
            let profiles = db.consumption_series();

            let solver = MiniLpSolver::new();
            let outcomes = pipeline(&cfg, &solver).sweep(
                &run_id,
                &index,
                &table,
                &cfg.site_parameters(),
                profiles.iter().map(|(name, series)| (name.as_str(), series)),
                &repo,
            );

            for outcome in &outcomes {
                match &outcome.result {
                    Ok(objective) => println!("{:<40} ok      {objective:>14.4}", outcome.run_id),
                    Err(e) => println!("{:<40} failed  {e}", outcome.run_id),
                }
            }
            if outcomes.iter().any(|o| o.result.is_err()) {
                warn!("some profiles could not be solved");
            }
            info!(dir = %repo.dir().display(), "sweep artifacts stored");
        }
        Command::Inspect { run_id } => {
            let artifact = repo.load(&run_id)?;
            let model = &artifact.model;
            let results = model
                .results
                .as_ref()
                .with_context(|| format!("run '{run_id}' has no results"))?;

            println!("run:         {}", artifact.run_id);
            println!("created:     {}", artifact.created_at);
            println!(
                "horizon:     {} x {} from {}",
                model.time_index.len(),
                model.time_index.freq(),
                model.time_index.start()
            );
            println!(
                "solver:      {} ({}, {})",
                results.meta.solver, results.meta.status, results.meta.termination
            );
            println!("objective:   {:.4}", results.objective());
            println!();
            for flow in &results.flows {
                println!(
                    "{:<32} {:>12.3} kWh",
                    format!("{} -> {}", flow.source, flow.sink),
                    flow.total() * model.time_index.interval_hours()
                );
            }
            for storage in &results.storages {
                if let (Some(first), Some(last)) = (storage.levels.first(), storage.levels.last()) {
                    println!("{:<32} {first:>12.3} .. {last:.3} kWh", storage.label);
                }
            }
        }
    }

    Ok(())
}

fn pipeline<'a>(cfg: &Config, solver: &'a MiniLpSolver) -> Pipeline<'a> {
    let pipeline = Pipeline::new(solver, cfg.solver_options());
    match &cfg.solver.lp_file {
        Some(path) => pipeline.with_lp_file(path),
        None => pipeline,
    }
}
