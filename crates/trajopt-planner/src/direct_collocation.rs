//! Direct collocation (Hermite-Simpson)
//!
//! Each transition i with duration h is constrained at its midpoint:
//!
//! ```text
//! ẋ₀ = f(tᵢ, xᵢ, uᵢ)            ẋ₁ = f(tᵢ + h, xᵢ₊₁, uᵢ₊₁)
//! x_c  = ½(xᵢ + xᵢ₊₁) + h/8 (ẋ₀ - ẋ₁)
//! ẋ_c  = 3/(2h) (xᵢ₊₁ - xᵢ) - ¼(ẋ₀ + ẋ₁)
//! u_c  = ½(uᵢ + uᵢ₊₁)
//! 0    = ẋ_c - f(tᵢ + h/2, x_c, u_c)
//! ```
//!
//! i.e. the cubic Hermite interpolant of the knot states must satisfy the
//! dynamics at the segment midpoint.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use trajopt_core::{Context, PiecewisePolynomial, System};

use crate::program::{EvaluationError, Evaluator};
use crate::symbolic::Variable;
use crate::trajectory_optimization::{Quadrature, TrajectoryOptimization, TrajoptError};

/// Collocation defect of one transition
///
/// Input layout: [h₀ … hᵢ, xᵢ, xᵢ₊₁, uᵢ, uᵢ₊₁] for time-varying dynamics,
/// where the leading durations give tᵢ = h₀ + … + hᵢ₋₁. Time-invariant
/// dynamics bind only [hᵢ, xᵢ, xᵢ₊₁, uᵢ, uᵢ₊₁] and are evaluated at tᵢ = 0.
struct HermiteSimpsonConstraint<S> {
    system: Arc<S>,
    context: Context,
    transition: usize,
    time_varying: bool,
    num_states: usize,
    num_inputs: usize,
}

impl<S: System + Send + Sync> Evaluator for HermiteSimpsonConstraint<S> {
    fn num_outputs(&self) -> usize {
        self.num_states
    }

    fn eval(&self, z: &DVector<f64>) -> Result<DVector<f64>, EvaluationError> {
        let (n, m) = (self.num_states, self.num_inputs);
        let i = if self.time_varying { self.transition } else { 0 };
        let h = z[i];
        let t = z.rows(0, i).sum();

        let offset = i + 1;
        let x0 = z.rows(offset, n).into_owned();
        let x1 = z.rows(offset + n, n).into_owned();
        let u0 = z.rows(offset + 2 * n, m).into_owned();
        let u1 = z.rows(offset + 2 * n + m, m).into_owned();

        let f0 = self.system.continuous_dynamics(&self.context, t, &x0, &u0)?;
        let f1 = self.system.continuous_dynamics(&self.context, t + h, &x1, &u1)?;

        let xc = (&x0 + &x1) * 0.5 + (&f0 - &f1) * (h / 8.0);
        let xdot_c = (&x1 - &x0) * (1.5 / h) - (&f0 + &f1) * 0.25;
        let uc = (&u0 + &u1) * 0.5;

        let fc = self.system.continuous_dynamics(&self.context, t + 0.5 * h, &xc, &uc)?;
        Ok(xdot_c - fc)
    }

    fn description(&self) -> String {
        format!("collocation constraint {}", self.transition)
    }
}

/// Direct collocation engine for continuous-time systems
pub struct DirectCollocation<S> {
    base: TrajectoryOptimization,
    system: Arc<S>,
    context: Context,
}

impl<S> DirectCollocation<S>
where
    S: System + Send + Sync + 'static,
{
    /// Transcribe `system` over `num_knots` knots with durations in
    /// [min_timestep, max_timestep]
    pub fn new(
        system: S,
        context: &Context,
        num_knots: usize,
        min_timestep: f64,
        max_timestep: f64,
    ) -> Result<Self, TrajoptError> {
        if !system.is_continuous() {
            return Err(TrajoptError::Configuration(
                "direct collocation requires a continuous-time system".to_string(),
            ));
        }
        let (num_states, num_inputs) = system.dimensions();
        let mut base = TrajectoryOptimization::with_free_timesteps(
            num_knots,
            num_states,
            num_inputs,
            min_timestep,
            max_timestep,
            Quadrature::Trapezoidal,
        )?;

        let time_varying = !system.is_time_invariant();
        let system = Arc::new(system);
        let hs = base.timestep_variables().to_vec();

        for i in 0..num_knots - 1 {
            let (x0, u0) = base.knot_variables(i)?;
            let (x1, u1) = base.knot_variables(i + 1)?;
            let first = if time_varying { 0 } else { i };
            let vars: Vec<Variable> = hs[first..=i]
                .iter()
                .chain(x0)
                .chain(x1)
                .chain(u0)
                .chain(u1)
                .cloned()
                .collect();

            let constraint = HermiteSimpsonConstraint {
                system: Arc::clone(&system),
                context: context.clone(),
                transition: i,
                time_varying,
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
            context: context.clone(),
        })
    }

    pub fn system(&self) -> &S {
        &self.system
    }

    /// Cubic Hermite spline through the solved states, with knot
    /// derivatives from the dynamics
    pub fn reconstruct_state_trajectory(&self) -> Result<PiecewisePolynomial, TrajoptError> {
        let solution = self.base.solved()?;
        let times = solution.sample_times.as_slice();

        let mut samples = Vec::with_capacity(times.len());
        let mut derivatives = Vec::with_capacity(times.len());
        for (k, &t) in times.iter().enumerate() {
            let x = solution.states.column(k).into_owned();
            let u = solution.inputs.column(k).into_owned();
            let xdot = self.system.continuous_dynamics(&self.context, t, &x, &u)?;
            samples.push(DMatrix::from_column_slice(x.len(), 1, x.as_slice()));
            derivatives.push(DMatrix::from_column_slice(xdot.len(), 1, xdot.as_slice()));
        }

        Ok(PiecewisePolynomial::cubic_hermite(times, &samples, &derivatives)?)
    }

    /// First-order hold through the solved inputs
    pub fn reconstruct_input_trajectory(&self) -> Result<PiecewisePolynomial, TrajoptError> {
        let solution = self.base.solved()?;
        let samples: Vec<_> = (0..solution.inputs.ncols())
            .map(|k| solution.inputs.column(k).into_owned())
            .map(|u| DMatrix::from_column_slice(u.len(), 1, u.as_slice()))
            .collect();
        Ok(PiecewisePolynomial::first_order_hold(solution.sample_times.as_slice(), &samples)?)
    }
}

impl<S> Deref for DirectCollocation<S> {
    type Target = TrajectoryOptimization;

    fn deref(&self) -> &TrajectoryOptimization {
        &self.base
    }
}

impl<S> DerefMut for DirectCollocation<S> {
    fn deref_mut(&mut self) -> &mut TrajectoryOptimization {
        &mut self.base
    }
}
