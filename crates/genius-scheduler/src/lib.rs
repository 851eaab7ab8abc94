//! GPU-aware scheduler extender
//!
//! Exposes the HTTP API and configuration of the `genius-scheduler` daemon so
//! they can be driven from integration tests.

pub mod api;
pub mod config;
