//! CLI module for postrank - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for the job worker,
//! scoring runs and job management.

pub mod commands;

pub use commands::Cli;
