//! Mathematical utilities
//!
//! Scalar polynomials used as trajectory segments, and explicit
//! integrators for forward simulation of continuous dynamics.

pub mod polynomial;
pub mod integrator;

pub use polynomial::*;
pub use integrator::*;
