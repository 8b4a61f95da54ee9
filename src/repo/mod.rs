//! Durable storage of solved runs.

pub mod dumps;

pub use dumps::*;
