pub mod compiler;
pub mod lp_file;
pub mod program;
pub mod solver;
pub mod strategies;

pub use compiler::*;
pub use lp_file::*;
pub use program::*;
pub use solver::*;
pub use strategies::*;
