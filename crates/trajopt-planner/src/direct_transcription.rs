//! Direct transcription
//!
//! Fixed-step forward simulation as equality constraints:
//!
//! x_{i+1} = g(tᵢ, xᵢ, uᵢ),   tᵢ = i·h
//!
//! where g is the native update of a discrete system (h is its period) or
//! one explicit integration step of a continuous system.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use trajopt_core::math::{euler, rk4};
use trajopt_core::{Context, PiecewisePolynomial, System};

use crate::program::{EvaluationError, Evaluator};
use crate::symbolic::Variable;
use crate::trajectory_optimization::{Quadrature, TrajectoryOptimization, TrajoptError};

/// Integration scheme for continuous-time systems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IntegrationScheme {
    #[default]
    ExplicitEuler,
    RungeKutta4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Discrete,
    Continuous(IntegrationScheme),
}

/// Defect x_{i+1} - g(tᵢ, xᵢ, uᵢ) over inputs [xᵢ, uᵢ, xᵢ₊₁]
struct TranscriptionConstraint<S> {
    system: Arc<S>,
    context: Context,
    transition: Transition,
    timestep: f64,
    time: f64,
    num_states: usize,
    num_inputs: usize,
}

impl<S: System + Send + Sync> TranscriptionConstraint<S> {
    fn split(&self, z: &DVector<f64>) -> (DVector<f64>, DVector<f64>, DVector<f64>) {
        let (n, m) = (self.num_states, self.num_inputs);
        (
            z.rows(0, n).into_owned(),
            z.rows(n, m).into_owned(),
            z.rows(n + m, n).into_owned(),
        )
    }
}

impl<S: System + Send + Sync> Evaluator for TranscriptionConstraint<S> {
    fn num_outputs(&self) -> usize {
        self.num_states
    }

    fn eval(&self, z: &DVector<f64>) -> Result<DVector<f64>, EvaluationError> {
        let (x0, u0, x1) = self.split(z);
        let (t, h) = (self.time, self.timestep);
        let dynamics = |t: f64, x: &DVector<f64>| self.system.continuous_dynamics(&self.context, t, x, &u0);

        let next = match self.transition {
            Transition::Discrete => self.system.discrete_update(&self.context, t, &x0, &u0)?,
            Transition::Continuous(IntegrationScheme::ExplicitEuler) => euler(&x0, t, h, dynamics)?,
            Transition::Continuous(IntegrationScheme::RungeKutta4) => rk4(&x0, t, h, dynamics)?,
        };
        Ok(x1 - next)
    }

    /// [-∂g/∂x, -∂g/∂u, I] from the system linearization
    ///
    /// Euler steps give ∂g/∂x = I + hA and ∂g/∂u = hB. RK4 steps use
    /// finite differences.
    fn jacobian(&self, z: &DVector<f64>) -> Result<Option<DMatrix<f64>>, EvaluationError> {
        let (n, m) = (self.num_states, self.num_inputs);
        let (x0, u0, _) = self.split(z);
        let Some(lin) = self.system.linearize(&self.context, self.time, &x0, &u0) else {
            return Ok(None);
        };

        let (dg_dx, dg_du) = match self.transition {
            Transition::Discrete => (lin.a, lin.b),
            Transition::Continuous(IntegrationScheme::ExplicitEuler) => {
                (DMatrix::identity(n, n) + lin.a * self.timestep, lin.b * self.timestep)
            }
            Transition::Continuous(IntegrationScheme::RungeKutta4) => return Ok(None),
        };

        let mut jac = DMatrix::zeros(n, 2 * n + m);
        jac.view_mut((0, 0), (n, n)).copy_from(&(-dg_dx));
        jac.view_mut((0, n), (n, m)).copy_from(&(-dg_du));
        jac.view_mut((0, n + m), (n, n)).fill_with_identity();
        Ok(Some(jac))
    }

    fn description(&self) -> String {
        format!("transcription constraint at t = {}", self.time)
    }
}

/// Direct transcription engine
pub struct DirectTranscription<S> {
    base: TrajectoryOptimization,
    system: Arc<S>,
    transition: Transition,
    timestep: f64,
}

impl<S> DirectTranscription<S>
where
    S: System + Send + Sync + 'static,
{
    /// Transcribe a discrete-time system; the timestep is its period
    pub fn new(system: S, context: &Context, num_knots: usize) -> Result<Self, TrajoptError> {
        let period = system.time_period().ok_or_else(|| {
            TrajoptError::Configuration(
                "direct transcription without a timestep requires a discrete-time system".to_string(),
            )
        })?;
        Self::build(system, context, num_knots, period, Transition::Discrete)
    }

    /// Transcribe a continuous-time system with explicit Euler steps of length `timestep`
    pub fn with_fixed_timestep(
        system: S,
        context: &Context,
        num_knots: usize,
        timestep: f64,
    ) -> Result<Self, TrajoptError> {
        Self::with_integrator(system, context, num_knots, timestep, IntegrationScheme::ExplicitEuler)
    }

    /// Transcribe a continuous-time system with the given integration scheme
    pub fn with_integrator(
        system: S,
        context: &Context,
        num_knots: usize,
        timestep: f64,
        scheme: IntegrationScheme,
    ) -> Result<Self, TrajoptError> {
        if !system.is_continuous() {
            return Err(TrajoptError::Configuration(
                "a fixed integration timestep requires a continuous-time system".to_string(),
            ));
        }
        Self::build(system, context, num_knots, timestep, Transition::Continuous(scheme))
    }

    fn build(
        system: S,
        context: &Context,
        num_knots: usize,
        timestep: f64,
        transition: Transition,
    ) -> Result<Self, TrajoptError> {
        let (num_states, num_inputs) = system.dimensions();
        let mut base = TrajectoryOptimization::with_fixed_timestep(
            num_knots,
            num_states,
            num_inputs,
            timestep,
            Quadrature::LeftRectangle,
        )?;
        let system = Arc::new(system);

        for i in 0..num_knots - 1 {
            let (x0, u0) = base.knot_variables(i)?;
            let (x1, _) = base.knot_variables(i + 1)?;
            let vars: Vec<Variable> = x0.iter().chain(u0).chain(x1).cloned().collect();

            let constraint = TranscriptionConstraint {
                system: Arc::clone(&system),
                context: context.clone(),
                transition,
                timestep,
                time: i as f64 * timestep,
                num_states,
                num_inputs,
            };
            base.prog_mut().add_constraint_evaluator(
                Arc::new(constraint),
                &vars,
                DVector::zeros(num_states),
                DVector::zeros(num_states),
            )?;
        }

        Ok(Self {
            base,
            system,
            transition,
            timestep,
        })
    }

    pub fn system(&self) -> &S {
        &self.system
    }

    /// Duration of every transition
    pub fn fixed_timestep(&self) -> f64 {
        self.timestep
    }

    /// Integration scheme (`None` for discrete systems)
    pub fn integration_scheme(&self) -> Option<IntegrationScheme> {
        match self.transition {
            Transition::Discrete => None,
            Transition::Continuous(scheme) => Some(scheme),
        }
    }

    fn column_samples(samples: &DMatrix<f64>) -> Vec<DMatrix<f64>> {
        samples
            .column_iter()
            .map(|c| DMatrix::from_column_slice(c.len(), 1, c.into_owned().as_slice()))
            .collect()
    }

    /// First-order hold through the solved states
    pub fn reconstruct_state_trajectory(&self) -> Result<PiecewisePolynomial, TrajoptError> {
        let solution = self.base.solved()?;
        Ok(PiecewisePolynomial::first_order_hold(
            solution.sample_times.as_slice(),
            &Self::column_samples(&solution.states),
        )?)
    }

    /// Solved inputs: zero-order hold for discrete systems, first-order hold otherwise
    pub fn reconstruct_input_trajectory(&self) -> Result<PiecewisePolynomial, TrajoptError> {
        let solution = self.base.solved()?;
        let times = solution.sample_times.as_slice();
        let samples = Self::column_samples(&solution.inputs);
        let traj = match self.transition {
            Transition::Discrete => PiecewisePolynomial::zero_order_hold(times, &samples)?,
            Transition::Continuous(_) => PiecewisePolynomial::first_order_hold(times, &samples)?,
        };
        Ok(traj)
    }
}

impl<S> Deref for DirectTranscription<S> {
    type Target = TrajectoryOptimization;

    fn deref(&self) -> &TrajectoryOptimization {
        &self.base
    }
}

impl<S> DerefMut for DirectTranscription<S> {
    fn deref_mut(&mut self) -> &mut TrajectoryOptimization {
        &mut self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::finite_difference_jacobian;
    use approx::assert_relative_eq;
    use trajopt_core::{LinearSystem, PendulumPlant};

    fn pendulum_constraint(transition: Transition) -> TranscriptionConstraint<PendulumPlant> {
        let plant = Arc::new(PendulumPlant::new());
        TranscriptionConstraint {
            context: plant.create_default_context(),
            system: plant,
            transition,
            timestep: 0.05,
            time: 0.0,
            num_states: 2,
            num_inputs: 1,
        }
    }

    #[test]
    fn test_constructors() {
        let discrete = LinearSystem::discrete(DMatrix::zeros(1, 1), DMatrix::identity(1, 1), 0.1).unwrap();
        let ctx = discrete.create_default_context();
        let dirtran = DirectTranscription::new(discrete.clone(), &ctx, 21).unwrap();
        assert_relative_eq!(dirtran.fixed_timestep(), 0.1);
        assert_eq!(dirtran.integration_scheme(), None);
        assert_eq!(dirtran.prog().num_constraints(), 20);
        assert!(!dirtran.has_free_timesteps());

        assert!(matches!(
            DirectTranscription::with_fixed_timestep(discrete, &ctx, 21, 0.1),
            Err(TrajoptError::Configuration(_))
        ));

        let plant = PendulumPlant::new();
        let ctx = plant.create_default_context();
        assert!(matches!(
            DirectTranscription::new(plant.clone(), &ctx, 10),
            Err(TrajoptError::Configuration(_))
        ));
        let dirtran = DirectTranscription::with_integrator(plant, &ctx, 10, 0.05, IntegrationScheme::RungeKutta4)
            .unwrap();
        assert_eq!(dirtran.integration_scheme(), Some(IntegrationScheme::RungeKutta4));
        assert_eq!(dirtran.prog().num_constraints(), 18);
    }

    #[test]
    fn test_discrete_defect() {
        let sys = Arc::new(
            LinearSystem::discrete(DMatrix::from_element(1, 1, 0.5), DMatrix::identity(1, 1), 0.1).unwrap(),
        );
        let constraint = TranscriptionConstraint {
            context: sys.create_default_context(),
            system: Arc::clone(&sys),
            transition: Transition::Discrete,
            timestep: 0.1,
            time: 0.0,
            num_states: 1,
            num_inputs: 1,
        };
        // x1 = 0.5 x0 + u0
        let z = DVector::from_vec(vec![2.0, 1.0, 2.0]);
        assert_relative_eq!(constraint.eval(&z).unwrap()[0], 0.0);

        let jac = constraint.jacobian(&z).unwrap().unwrap();
        assert_eq!(jac, DMatrix::from_row_slice(1, 3, &[-0.5, -1.0, 1.0]));
    }

    #[test]
    fn test_euler_jacobian_matches_finite_difference() {
        let constraint = pendulum_constraint(Transition::Continuous(IntegrationScheme::ExplicitEuler));
        let z = DVector::from_vec(vec![0.4, -0.3, 0.2, 0.45, -0.2]);

        let analytic = constraint.jacobian(&z).unwrap().unwrap();
        let numeric = finite_difference_jacobian(&z, 2, 1e-6, |v| constraint.eval(v)).unwrap();
        assert_relative_eq!(analytic, numeric, epsilon = 1e-6);
    }

    #[test]
    fn test_rk4_uses_finite_differences() {
        let constraint = pendulum_constraint(Transition::Continuous(IntegrationScheme::RungeKutta4));
        let z = DVector::from_vec(vec![0.4, -0.3, 0.2, 0.45, -0.2]);
        assert!(constraint.jacobian(&z).unwrap().is_none());

        // Zero defect when x1 is the RK4 prediction
        let x0 = DVector::from_vec(vec![0.4, -0.3]);
        let u0 = DVector::from_vec(vec![0.2]);
        let plant = PendulumPlant::new();
        let ctx = plant.create_default_context();
        let x1 = rk4(&x0, 0.0, 0.05, |t, x: &DVector<f64>| plant.continuous_dynamics(&ctx, t, x, &u0)).unwrap();
        let z = DVector::from_vec(vec![x0[0], x0[1], u0[0], x1[0], x1[1]]);
        assert_relative_eq!(constraint.eval(&z).unwrap().norm(), 0.0, epsilon = 1e-12);
    }
}
