//! CLI subcommand implementations

pub mod health;
pub mod rank;
pub mod snapshot;
