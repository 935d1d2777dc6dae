//! Command-line interface components
//!
//! Argument parsing, startup validation, the progress bar, and the build
//! command handler.

pub mod args;
pub mod commands;
pub mod progress;
pub mod startup;

pub use args::{Cli, GlobalArgs};
pub use commands::handle_build;
pub use progress::ProgressBarObserver;
pub use startup::{validate_startup, StartupStatus};
