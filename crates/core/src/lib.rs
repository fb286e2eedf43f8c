//! Core types and utilities for the pricer
//!
//! This crate provides shared types used across all components:
//! - Tracked keys, work items and observations
//! - Price and failure records emitted by the aggregator
//! - Poller configuration and validation
//! - Error types

pub mod types;
pub mod config;
pub mod errors;

pub use types::*;
pub use config::*;
pub use errors::*;
