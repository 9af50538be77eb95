//! Domain models for the irrigation agent

mod decision;
mod features;
mod schedule;
mod season;
mod sensor;
mod weather;

pub use decision::*;
pub use features::*;
pub use schedule::*;
pub use season::*;
pub use sensor::*;
pub use weather::*;
