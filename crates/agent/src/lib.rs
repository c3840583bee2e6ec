//! Benchmark agent service
//!
//! HTTP surface and configuration of the agent binary, exposed as a library
//! so the router can be exercised in integration tests.

pub mod api;
pub mod config;
