//! Command implementations.

pub mod positions;
pub mod run;

pub use positions::run_positions;
pub use run::run_scenario;
