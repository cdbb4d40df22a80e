//! Command-line interface for crunch-agent.
//!
//! Provides commands for processing one dataset, claiming the next one,
//! looping until the coordinator runs dry, and inspecting storage.

mod commands;

pub use commands::{
    parse_cli, process_dataset, process_next, run, run_with_cli, Cli, Commands, NoDatasets,
    ProcessArgs,
};
