//! Least-cost dispatch of a residential PV site with grid exchange,
//! household demand and an electric vehicle battery.
//!
//! A run builds a flow network over a fixed time index, compiles it to a
//! linear program, hands it to a [`optimizer::SolverClient`] and reads the
//! optimal flows and storage levels back into a [`results::Solution`].

pub mod config;
pub mod error;
pub mod network;
pub mod optimizer;
pub mod pipeline;
pub mod profiles;
pub mod repo;
pub mod results;
pub mod telemetry;
pub mod time_index;
pub mod timeseries;

pub use error::{DispatchError, Result, Stage};
pub use pipeline::{Pipeline, SweepOutcome};
