//! Output formatting for CLI results.

pub mod detail;
pub mod table;

pub use detail::{build_report, format_summary};
pub use table::{format_positions_table, format_steps_table};
