//! Solver backends
//!
//! - MILP: `good_lp` with the `minilp` simplex solver

#[cfg(feature = "optimization")]
pub mod milp;

#[cfg(feature = "optimization")]
pub use milp::*;
