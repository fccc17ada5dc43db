//! CLI command implementations for pmctop.
//!
//! This module provides implementations for all CLI subcommands:
//! - `batch`: the default refresh loop printing one line per task
//! - `screens`: screen listing
//! - `export`: configuration export, every screen included
//! - `check`: runtime requirement validation

pub mod batch;
pub mod check;
pub mod export;
pub mod screens;

// Re-export command functions
pub use batch::command_batch;
pub use check::command_check_requirements;
pub use export::command_export;
pub use screens::command_list_screens;
