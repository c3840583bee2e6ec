//! Subcommand implementations

pub mod benchmarks;
