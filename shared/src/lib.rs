//! Shared types and models for the irrigation agent
//!
//! This crate holds the pure domain layer: sensor readings, weather rows,
//! the feature vector, the decision policy, the season table and the
//! schedule aggregate. Nothing here performs I/O.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
