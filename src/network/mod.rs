//! Flow network of the site.
//!
//! Typed nodes (buses, sources, sinks, storages) connected by directed flows,
//! and the builder that assembles the PV / grid / EV network from the site
//! series.

pub mod builder;
pub mod model;

pub use builder::*;
pub use model::*;
