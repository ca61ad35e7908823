//! Damped simple pendulum
//!
//! State x = [θ, θ̇], input u = [τ]:
//!
//! m l² θ̈ = τ - m g l sin θ - b θ̇
//!
//! where:
//! - m: point mass at the end of the rod
//! - l: rod length
//! - b: viscous damping
//! - g: gravitational acceleration
//!
//! θ = 0 is hanging straight down, θ = π is the upright equilibrium.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::{Context, Linearization, System, SystemError};

/// Pendulum parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendulumParams {
    /// Mass [kg]
    pub mass: f64,
    /// Length [m]
    pub length: f64,
    /// Damping [N·m·s]
    pub damping: f64,
    /// Gravity [m/s²]
    pub gravity: f64,
}

impl Default for PendulumParams {
    fn default() -> Self {
        Self {
            mass: 1.0,
            length: 0.5,
            damping: 0.1,
            gravity: 9.81,
        }
    }
}

impl PendulumParams {
    /// Pack into the context parameter vector [m, l, b, g]
    pub fn to_vector(&self) -> DVector<f64> {
        DVector::from_vec(vec![self.mass, self.length, self.damping, self.gravity])
    }

    /// Unpack from a context parameter vector
    pub fn from_vector(p: &DVector<f64>) -> Result<Self, SystemError> {
        if p.len() != 4 {
            return Err(SystemError::DimensionMismatch {
                what: "pendulum parameters",
                expected: 4,
                got: p.len(),
            });
        }
        let params = Self {
            mass: p[0],
            length: p[1],
            damping: p[2],
            gravity: p[3],
        };
        if params.mass <= 0.0 || params.length <= 0.0 {
            return Err(SystemError::InvalidParameter(
                "pendulum mass and length must be positive".to_string(),
            ));
        }
        Ok(params)
    }

    /// Moment of inertia about the pivot
    pub fn inertia(&self) -> f64 {
        self.mass * self.length * self.length
    }
}

/// Torque-actuated pendulum (continuous time)
///
/// Parameters live in the [`Context`], so one plant can be evaluated with
/// different parameter sets.
#[derive(Debug, Clone, Default)]
pub struct PendulumPlant {
    defaults: PendulumParams,
}

impl PendulumPlant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(params: PendulumParams) -> Self {
        Self { defaults: params }
    }
}

impl System for PendulumPlant {
    fn num_states(&self) -> usize {
        2
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn is_time_invariant(&self) -> bool {
        true
    }

    fn default_parameters(&self) -> DVector<f64> {
        self.defaults.to_vector()
    }

    fn continuous_dynamics(
        &self,
        context: &Context,
        _t: f64,
        x: &DVector<f64>,
        u: &DVector<f64>,
    ) -> Result<DVector<f64>, SystemError> {
        self.check_dimensions(x, u)?;
        let p = PendulumParams::from_vector(&context.parameters)?;

        let (theta, theta_dot) = (x[0], x[1]);
        let theta_ddot = (u[0]
            - p.mass * p.gravity * p.length * theta.sin()
            - p.damping * theta_dot)
            / p.inertia();

        Ok(DVector::from_vec(vec![theta_dot, theta_ddot]))
    }

    fn linearize(
        &self,
        context: &Context,
        _t: f64,
        x: &DVector<f64>,
        u: &DVector<f64>,
    ) -> Option<Linearization> {
        self.check_dimensions(x, u).ok()?;
        let p = PendulumParams::from_vector(&context.parameters).ok()?;
        let inertia = p.inertia();

        let a = DMatrix::from_row_slice(
            2,
            2,
            &[
                0.0,
                1.0,
                -p.mass * p.gravity * p.length * x[0].cos() / inertia,
                -p.damping / inertia,
            ],
        );
        let b = DMatrix::from_row_slice(2, 1, &[0.0, 1.0 / inertia]);
        Some(Linearization { a, b })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_default_context() {
        let plant = PendulumPlant::new();
        let ctx = plant.create_default_context();
        assert!(plant.is_time_invariant());
        assert_eq!(ctx.state.len(), 2);
        assert_eq!(ctx.parameters, PendulumParams::default().to_vector());
    }

    #[test]
    fn test_equilibria() {
        let plant = PendulumPlant::new();
        let ctx = plant.create_default_context();
        let u = DVector::zeros(1);

        for theta in [0.0, PI] {
            let x = DVector::from_vec(vec![theta, 0.0]);
            let xdot = plant.continuous_dynamics(&ctx, 0.0, &x, &u).unwrap();
            assert_relative_eq!(xdot.norm(), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_dynamics() {
        let plant = PendulumPlant::new();
        let ctx = plant.create_default_context();
        let p = PendulumParams::default();

        let x = DVector::from_vec(vec![PI / 2.0, 1.0]);
        let u = DVector::from_vec(vec![0.2]);
        let xdot = plant.continuous_dynamics(&ctx, 0.0, &x, &u).unwrap();

        let expected = (0.2 - p.mass * p.gravity * p.length - p.damping) / p.inertia();
        assert_relative_eq!(xdot[0], 1.0);
        assert_relative_eq!(xdot[1], expected, epsilon = 1e-12);
    }

    #[test]
    fn test_linearization_matches_finite_difference() {
        let plant = PendulumPlant::new();
        let ctx = plant.create_default_context();
        let x = DVector::from_vec(vec![0.3, -0.7]);
        let u = DVector::from_vec(vec![0.1]);
        let lin = plant.linearize(&ctx, 0.0, &x, &u).unwrap();

        let eps = 1e-6;
        for j in 0..2 {
            let mut xp = x.clone();
            let mut xm = x.clone();
            xp[j] += eps;
            xm[j] -= eps;
            let fp = plant.continuous_dynamics(&ctx, 0.0, &xp, &u).unwrap();
            let fm = plant.continuous_dynamics(&ctx, 0.0, &xm, &u).unwrap();
            let column = (fp - fm) / (2.0 * eps);
            for i in 0..2 {
                assert_relative_eq!(lin.a[(i, j)], column[i], epsilon = 1e-6);
            }
        }
        assert_relative_eq!(lin.b[(1, 0)], 1.0 / PendulumParams::default().inertia());
    }

    #[test]
    fn test_linearize_rejects_wrong_dimensions() {
        let plant = PendulumPlant::new();
        let ctx = plant.create_default_context();
        let u = DVector::zeros(1);
        assert!(plant.linearize(&ctx, 0.0, &DVector::zeros(1), &u).is_none());
        assert!(plant.linearize(&ctx, 0.0, &DVector::zeros(2), &DVector::zeros(2)).is_none());
    }

    #[test]
    fn test_bad_parameters() {
        let plant = PendulumPlant::new();
        let mut ctx = plant.create_default_context();
        ctx.parameters = DVector::zeros(3);
        let result = plant.continuous_dynamics(&ctx, 0.0, &DVector::zeros(2), &DVector::zeros(1));
        assert!(matches!(result, Err(SystemError::DimensionMismatch { .. })));
    }
}
