//! HTTP handlers for the operations API

mod decision;
mod health;
mod schedule;
mod sensor;

pub use decision::*;
pub use health::*;
pub use schedule::*;
pub use sensor::*;
