//! Shared domain types for the sixelping workspace.

pub mod clock;
pub mod config;
pub mod metrics;
pub mod params;

mod errors;

pub use errors::{Result, SixelError};
