//! # Trajopt Core
//!
//! Numerical building blocks for trajectory optimization.
//!
//! ## Modules
//!
//! - [`math`]: Scalar polynomials and explicit integrators
//! - [`trajectories`]: Piecewise polynomial trajectories (ZOH, FOH, cubic splines)
//! - [`dynamics`]: Dynamical system abstraction and concrete plants

pub mod math;
pub mod trajectories;
pub mod dynamics;

pub use dynamics::{Context, Linearization, LinearSystem, PendulumParams, PendulumPlant, System, SystemError};
pub use math::Polynomial;
pub use trajectories::{PiecewisePolynomial, PolynomialMatrix, TrajectoryError};
