//! System abstraction
//!
//! A system has a fixed number of states and inputs and is either
//! continuous-time,
//!
//! ẋ = f(t, x, u; p)
//!
//! or discrete-time with a fixed period T,
//!
//! x[k+1] = g(t, x[k], u[k]; p)
//!
//! where p is the numeric parameter vector carried by the [`Context`].

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// System evaluation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SystemError {
    #[error("Dimension mismatch for {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("System has no continuous-time dynamics")]
    NotContinuous,
    #[error("System has no discrete-time update")]
    NotDiscrete,
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Evaluation context: time, state and parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    /// Time [s]
    pub time: f64,
    /// State vector
    pub state: DVector<f64>,
    /// Numeric parameters
    pub parameters: DVector<f64>,
}

impl Context {
    pub fn new(state: DVector<f64>, parameters: DVector<f64>) -> Self {
        Self {
            time: 0.0,
            state,
            parameters,
        }
    }
}

/// Jacobians of the dynamics with respect to state and input
///
/// For a continuous system these are ∂f/∂x and ∂f/∂u; for a discrete
/// system ∂g/∂x and ∂g/∂u.
#[derive(Debug, Clone, PartialEq)]
pub struct Linearization {
    pub a: DMatrix<f64>,
    pub b: DMatrix<f64>,
}

/// Dynamical system
pub trait System {
    fn num_states(&self) -> usize;

    fn num_inputs(&self) -> usize;

    /// (states, inputs)
    fn dimensions(&self) -> (usize, usize) {
        (self.num_states(), self.num_inputs())
    }

    /// Update period for discrete systems, `None` for continuous ones
    fn time_period(&self) -> Option<f64> {
        None
    }

    fn is_continuous(&self) -> bool {
        self.time_period().is_none()
    }

    /// Whether the dynamics ignore the time argument
    fn is_time_invariant(&self) -> bool {
        false
    }

    fn default_parameters(&self) -> DVector<f64> {
        DVector::zeros(0)
    }

    /// Context with zero time and state and the default parameters
    fn create_default_context(&self) -> Context {
        Context::new(DVector::zeros(self.num_states()), self.default_parameters())
    }

    /// ẋ = f(t, x, u)
    fn continuous_dynamics(
        &self,
        _context: &Context,
        _t: f64,
        _x: &DVector<f64>,
        _u: &DVector<f64>,
    ) -> Result<DVector<f64>, SystemError> {
        Err(SystemError::NotContinuous)
    }

    /// x[k+1] = g(t, x[k], u[k])
    fn discrete_update(
        &self,
        _context: &Context,
        _t: f64,
        _x: &DVector<f64>,
        _u: &DVector<f64>,
    ) -> Result<DVector<f64>, SystemError> {
        Err(SystemError::NotDiscrete)
    }

    /// Analytic Jacobians, if the system provides them
    fn linearize(
        &self,
        _context: &Context,
        _t: f64,
        _x: &DVector<f64>,
        _u: &DVector<f64>,
    ) -> Option<Linearization> {
        None
    }

    /// Check state and input lengths against the system dimensions
    fn check_dimensions(&self, x: &DVector<f64>, u: &DVector<f64>) -> Result<(), SystemError> {
        if x.len() != self.num_states() {
            return Err(SystemError::DimensionMismatch {
                what: "state",
                expected: self.num_states(),
                got: x.len(),
            });
        }
        if u.len() != self.num_inputs() {
            return Err(SystemError::DimensionMismatch {
                what: "input",
                expected: self.num_inputs(),
                got: u.len(),
            });
        }
        Ok(())
    }
}
