//! Dynamical system models
//!
//! - `System` trait and evaluation `Context`
//! - Linear time-invariant systems (continuous or discrete)
//! - Damped pendulum

pub mod system;
pub mod linear;
pub mod pendulum;

pub use system::*;
pub use linear::*;
pub use pendulum::*;
