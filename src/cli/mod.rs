//! Command-line interface components
//!
//! This module contains CLI-specific code for the DEM Fetcher application,
//! including argument parsing, command handlers and progress display.

pub mod args;
pub mod commands;
pub mod progress;

pub use args::{
    Cli, Commands, ConfigAction, ConfigArgs, FetchArgs, GlobalArgs, SourceArgs, TilesArgs,
};
pub use commands::{handle_config, handle_fetch, handle_tiles};
pub use progress::{ProgressConfig, ProgressDisplay};
