//! Trajectory optimization base
//!
//! Shared decision-variable layout and registration logic for the
//! transcription engines:
//!
//! ```text
//! knots        k = 0 .. N-1      x_k ∈ ℝⁿˣ, u_k ∈ ℝⁿᵘ
//! transitions  i = 0 .. N-2      h_i  (free variable or fixed value)
//! time         t_k = Σ_{j<k} h_j
//! ```
//!
//! Costs and constraints written over the placeholder symbols returned by
//! [`TrajectoryOptimization::time`], [`TrajectoryOptimization::state`] and
//! [`TrajectoryOptimization::input`] are substituted per knot.

use std::collections::HashMap;

use log::info;
use nalgebra::{DMatrix, DVector};
use thiserror::Error;
use trajopt_core::{PiecewisePolynomial, SystemError, TrajectoryError};

use crate::config::SolverConfig;
use crate::program::{MathematicalProgram, ProgramError, ProgramResult};
use crate::solver::{NlpSolver, SolveStatistics, SolverError, SqpSolver};
use crate::symbolic::{Expr, ExprVector, Formula, Variable};

/// Trajectory optimization errors
#[derive(Debug, Error)]
pub enum TrajoptError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("No solution available: solve() has not succeeded")]
    NotSolved,
    #[error("Solver failed: {0}")]
    Solver(#[from] SolverError),
    #[error("Trajectory error: {0}")]
    Trajectory(#[from] TrajectoryError),
    #[error("System error: {0}")]
    System(#[from] SystemError),
    #[error("Program error: {0}")]
    Program(#[from] ProgramError),
}

/// Running-cost quadrature rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quadrature {
    /// ½ h_i (g_i + g_{i+1}) per transition
    Trapezoidal,
    /// h_i g_i per transition
    LeftRectangle,
}

#[derive(Debug, Clone)]
enum Timesteps {
    Free {
        vars: Vec<Variable>,
        min: f64,
        max: f64,
    },
    Fixed(f64),
}

/// Solved trajectory samples
#[derive(Debug, Clone)]
pub struct Solution {
    /// Knot times (length N, starting at 0)
    pub sample_times: DVector<f64>,
    /// States (n_x × N)
    pub states: DMatrix<f64>,
    /// Inputs (n_u × N)
    pub inputs: DMatrix<f64>,
    /// Transition durations (length N-1)
    pub timesteps: DVector<f64>,
    pub objective: f64,
    pub statistics: SolveStatistics,
}

/// Common engine state: program, layout, placeholders and last solution
pub struct TrajectoryOptimization {
    prog: MathematicalProgram,
    num_knots: usize,
    num_states: usize,
    num_inputs: usize,
    timesteps: Timesteps,
    x_vars: Vec<Vec<Variable>>,
    u_vars: Vec<Vec<Variable>>,
    time_placeholder: Variable,
    state_placeholders: Vec<Variable>,
    input_placeholders: Vec<Variable>,
    quadrature: Quadrature,
    solver: Box<dyn NlpSolver>,
    solution: Option<Solution>,
}

impl TrajectoryOptimization {
    /// Layout with free durations bounded in [min_timestep, max_timestep]
    pub fn with_free_timesteps(
        num_knots: usize,
        num_states: usize,
        num_inputs: usize,
        min_timestep: f64,
        max_timestep: f64,
        quadrature: Quadrature,
    ) -> Result<Self, TrajoptError> {
        if !(min_timestep > 0.0 && min_timestep <= max_timestep && max_timestep.is_finite()) {
            return Err(TrajoptError::Configuration(format!(
                "timestep bounds must satisfy 0 < min <= max, got [{min_timestep}, {max_timestep}]"
            )));
        }
        let mut prog = MathematicalProgram::new();
        let vars = prog.new_continuous_variables(num_knots.saturating_sub(1), "h");
        let guess = 0.5 * (min_timestep + max_timestep);
        for h in &vars {
            prog.set_bounds(h, min_timestep, max_timestep)?;
            prog.set_initial_guess(std::slice::from_ref(h), &[guess])?;
        }
        let timesteps = Timesteps::Free {
            vars,
            min: min_timestep,
            max: max_timestep,
        };
        Self::build(prog, num_knots, num_states, num_inputs, timesteps, quadrature)
    }

    /// Layout with every duration fixed to `timestep`
    pub fn with_fixed_timestep(
        num_knots: usize,
        num_states: usize,
        num_inputs: usize,
        timestep: f64,
        quadrature: Quadrature,
    ) -> Result<Self, TrajoptError> {
        if !(timestep > 0.0 && timestep.is_finite()) {
            return Err(TrajoptError::Configuration(format!(
                "fixed timestep must be positive, got {timestep}"
            )));
        }
        Self::build(
            MathematicalProgram::new(),
            num_knots,
            num_states,
            num_inputs,
            Timesteps::Fixed(timestep),
            quadrature,
        )
    }

    fn build(
        mut prog: MathematicalProgram,
        num_knots: usize,
        num_states: usize,
        num_inputs: usize,
        timesteps: Timesteps,
        quadrature: Quadrature,
    ) -> Result<Self, TrajoptError> {
        if num_knots < 2 {
            return Err(TrajoptError::Configuration(format!(
                "at least 2 knot points are required, got {num_knots}"
            )));
        }

        let x_vars = (0..num_knots)
            .map(|k| prog.new_continuous_variables(num_states, &format!("x{k}")))
            .collect();
        let u_vars = (0..num_knots)
            .map(|k| prog.new_continuous_variables(num_inputs, &format!("u{k}")))
            .collect();

        // Placeholders are not program variables
        let state_placeholders = (0..num_states).map(|i| Variable::new(&format!("x({i})"))).collect();
        let input_placeholders = (0..num_inputs).map(|i| Variable::new(&format!("u({i})"))).collect();

        Ok(Self {
            prog,
            num_knots,
            num_states,
            num_inputs,
            timesteps,
            x_vars,
            u_vars,
            time_placeholder: Variable::new("t"),
            state_placeholders,
            input_placeholders,
            quadrature,
            solver: Box::new(SqpSolver::new(SolverConfig::default())),
            solution: None,
        })
    }

    pub fn num_knots(&self) -> usize {
        self.num_knots
    }

    pub fn num_states(&self) -> usize {
        self.num_states
    }

    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    pub fn quadrature(&self) -> Quadrature {
        self.quadrature
    }

    /// True if the durations are decision variables
    pub fn has_free_timesteps(&self) -> bool {
        matches!(self.timesteps, Timesteps::Free { .. })
    }

    pub fn prog(&self) -> &MathematicalProgram {
        &self.prog
    }

    pub fn prog_mut(&mut self) -> &mut MathematicalProgram {
        &mut self.prog
    }

    fn check_knot(&self, k: usize) -> Result<(), TrajoptError> {
        if k >= self.num_knots {
            return Err(TrajoptError::Configuration(format!(
                "knot index {k} out of range (N = {})",
                self.num_knots
            )));
        }
        Ok(())
    }

    /// Generic time placeholder
    pub fn time(&self) -> Expr {
        Expr::var(&self.time_placeholder)
    }

    /// Duration of transition i
    pub fn timestep(&self, i: usize) -> Result<Expr, TrajoptError> {
        if i + 1 >= self.num_knots {
            return Err(TrajoptError::Configuration(format!(
                "transition index {i} out of range ({} transitions)",
                self.num_knots - 1
            )));
        }
        Ok(match &self.timesteps {
            Timesteps::Free { vars, .. } => Expr::var(&vars[i]),
            Timesteps::Fixed(h) => Expr::constant(*h),
        })
    }

    /// Elapsed time at knot k
    pub fn time_at(&self, k: usize) -> Result<Expr, TrajoptError> {
        self.check_knot(k)?;
        Ok(match &self.timesteps {
            Timesteps::Free { vars, .. } => vars[..k].iter().fold(Expr::zero(), |acc, h| acc + Expr::var(h)),
            Timesteps::Fixed(h) => Expr::constant(k as f64 * h),
        })
    }

    /// Generic state placeholder vector
    pub fn state(&self) -> ExprVector {
        ExprVector::from_variables(&self.state_placeholders)
    }

    /// Generic input placeholder vector
    pub fn input(&self) -> ExprVector {
        ExprVector::from_variables(&self.input_placeholders)
    }

    /// State decision variables at knot k
    pub fn state_at(&self, k: usize) -> Result<ExprVector, TrajoptError> {
        self.check_knot(k)?;
        Ok(ExprVector::from_variables(&self.x_vars[k]))
    }

    /// Input decision variables at knot k
    pub fn input_at(&self, k: usize) -> Result<ExprVector, TrajoptError> {
        self.check_knot(k)?;
        Ok(ExprVector::from_variables(&self.u_vars[k]))
    }

    pub fn initial_state(&self) -> ExprVector {
        ExprVector::from_variables(&self.x_vars[0])
    }

    pub fn final_state(&self) -> ExprVector {
        ExprVector::from_variables(&self.x_vars[self.num_knots - 1])
    }

    /// All state variables stacked knot by knot (length N·n_x)
    pub fn all_states(&self) -> ExprVector {
        self.x_vars.iter().flatten().map(Expr::var).collect()
    }

    /// All input variables stacked knot by knot (length N·n_u)
    pub fn all_inputs(&self) -> ExprVector {
        self.u_vars.iter().flatten().map(Expr::var).collect()
    }

    /// Raw decision variables of knot k (states, inputs)
    pub fn knot_variables(&self, k: usize) -> Result<(&[Variable], &[Variable]), TrajoptError> {
        self.check_knot(k)?;
        Ok((&self.x_vars[k], &self.u_vars[k]))
    }

    /// Duration decision variables (empty for fixed steps)
    pub fn timestep_variables(&self) -> &[Variable] {
        match &self.timesteps {
            Timesteps::Free { vars, .. } => vars,
            Timesteps::Fixed(_) => &[],
        }
    }

    fn knot_substitution(&self, k: usize) -> Result<HashMap<Variable, Expr>, TrajoptError> {
        let mut map = HashMap::with_capacity(1 + self.num_states + self.num_inputs);
        map.insert(self.time_placeholder.clone(), self.time_at(k)?);
        for (p, v) in self.state_placeholders.iter().zip(&self.x_vars[k]) {
            map.insert(p.clone(), Expr::var(v));
        }
        for (p, v) in self.input_placeholders.iter().zip(&self.u_vars[k]) {
            map.insert(p.clone(), Expr::var(v));
        }
        Ok(map)
    }

    /// Placeholder template evaluated at knot k
    pub fn substitute_placeholders(&self, expr: &Expr, k: usize) -> Result<Expr, TrajoptError> {
        Ok(expr.substitute(&self.knot_substitution(k)?))
    }

    /// Add a cost over decision variables
    pub fn add_cost(&mut self, expr: Expr) -> Result<(), TrajoptError> {
        self.prog.add_cost(expr)?;
        Ok(())
    }

    /// Add a constraint over decision variables
    pub fn add_constraint(&mut self, formula: Formula) -> Result<(), TrajoptError> {
        self.prog.add_constraint(formula)?;
        Ok(())
    }

    /// Add ∫ g(t, x, u) dt, approximated by the engine's quadrature rule
    pub fn add_running_cost(&mut self, expr: Expr) -> Result<(), TrajoptError> {
        let n = self.num_knots;
        match self.quadrature {
            Quadrature::Trapezoidal => {
                for k in 0..n {
                    let weight = if k == 0 {
                        self.timestep(0)? * 0.5
                    } else if k == n - 1 {
                        self.timestep(n - 2)? * 0.5
                    } else {
                        (self.timestep(k - 1)? + self.timestep(k)?) * 0.5
                    };
                    let term = weight * self.substitute_placeholders(&expr, k)?;
                    self.prog.add_cost(term)?;
                }
            }
            Quadrature::LeftRectangle => {
                for k in 0..n - 1 {
                    let term = self.timestep(k)? * self.substitute_placeholders(&expr, k)?;
                    self.prog.add_cost(term)?;
                }
            }
        }
        Ok(())
    }

    /// Add a cost evaluated at the final knot
    pub fn add_final_cost(&mut self, expr: Expr) -> Result<(), TrajoptError> {
        let term = self.substitute_placeholders(&expr, self.num_knots - 1)?;
        self.prog.add_cost(term)?;
        Ok(())
    }

    /// Add a placeholder constraint at knot k
    pub fn add_constraint_to_knot(&mut self, k: usize, formula: &Formula) -> Result<(), TrajoptError> {
        let map = self.knot_substitution(k)?;
        self.prog.add_constraint(formula.substitute(&map))?;
        Ok(())
    }

    /// Add a placeholder constraint at every knot
    pub fn add_constraint_to_all_knot_points(&mut self, formula: &Formula) -> Result<(), TrajoptError> {
        for k in 0..self.num_knots {
            self.add_constraint_to_knot(k, formula)?;
        }
        Ok(())
    }

    fn free_timesteps(&self, operation: &str) -> Result<&[Variable], TrajoptError> {
        match &self.timesteps {
            Timesteps::Free { vars, .. } => Ok(vars),
            Timesteps::Fixed(_) => Err(TrajoptError::Configuration(format!(
                "{operation} requires free timesteps"
            ))),
        }
    }

    /// Replace the bounds of every duration
    pub fn add_time_interval_bounds(&mut self, lower: f64, upper: f64) -> Result<(), TrajoptError> {
        let vars = self.free_timesteps("time interval bounds")?.to_vec();
        if !(lower > 0.0 && lower <= upper && upper.is_finite()) {
            return Err(TrajoptError::Configuration(format!(
                "time interval bounds must satisfy 0 < lower <= upper, got [{lower}, {upper}]"
            )));
        }
        for h in &vars {
            self.prog.set_bounds(h, lower, upper)?;
        }
        if let Timesteps::Free { min, max, .. } = &mut self.timesteps {
            *min = lower;
            *max = upper;
        }
        Ok(())
    }

    /// Constrain all durations to be equal (N-2 equalities)
    pub fn add_equal_time_intervals_constraints(&mut self) -> Result<(), TrajoptError> {
        let vars = self.free_timesteps("equal time intervals")?.to_vec();
        let first = Expr::var(&vars[0]);
        for h in &vars[1..] {
            self.prog.add_constraint(Expr::var(h).equals(&first))?;
        }
        Ok(())
    }

    /// Bound the total duration Σ h_i
    pub fn add_duration_bounds(&mut self, lower: f64, upper: f64) -> Result<(), TrajoptError> {
        let vars = self.free_timesteps("duration bounds")?;
        if lower > upper {
            return Err(TrajoptError::Configuration(format!(
                "duration bounds [{lower}, {upper}] are empty"
            )));
        }
        let total = vars.iter().fold(Expr::zero(), |acc, h| acc + Expr::var(h));
        self.prog.add_constraint(Formula::between(lower, total, upper))?;
        Ok(())
    }

    fn nominal_timestep(&self) -> f64 {
        match &self.timesteps {
            Timesteps::Free { min, max, .. } => 0.5 * (min + max),
            Timesteps::Fixed(h) => *h,
        }
    }

    /// Warm start from input and state trajectories
    ///
    /// Knots are placed uniformly over the first non-empty trajectory's
    /// time span (or (N-1) times the nominal timestep when neither has a
    /// finite positive duration). Empty trajectories leave their variables
    /// untouched.
    pub fn set_initial_trajectory(
        &mut self,
        input_traj: &PiecewisePolynomial,
        state_traj: &PiecewisePolynomial,
    ) -> Result<(), TrajoptError> {
        for (name, traj, rows) in [
            ("input", input_traj, self.num_inputs),
            ("state", state_traj, self.num_states),
        ] {
            if !traj.is_empty() && (traj.rows() != rows || traj.cols() != 1) {
                return Err(TrajoptError::Configuration(format!(
                    "initial {name} trajectory is {}x{}, expected {rows}x1",
                    traj.rows(),
                    traj.cols()
                )));
            }
        }

        let segments = (self.num_knots - 1) as f64;
        let reference = [input_traj, state_traj].into_iter().find(|t| !t.is_empty());
        let start = reference.map_or(0.0, |t| t.start_time());
        let duration = match (&self.timesteps, reference) {
            (Timesteps::Free { .. }, Some(t)) if t.duration().is_finite() && t.duration() > 0.0 => t.duration(),
            _ => segments * self.nominal_timestep(),
        };
        let h = duration / segments;

        if let Timesteps::Free { vars, .. } = &self.timesteps {
            let guesses = vec![h; vars.len()];
            self.prog.set_initial_guess(vars, &guesses)?;
        }

        for k in 0..self.num_knots {
            let t = start + k as f64 * h;
            if !input_traj.is_empty() {
                let u = input_traj.value(t)?;
                self.prog.set_initial_guess(&self.u_vars[k], u.as_slice())?;
            }
            if !state_traj.is_empty() {
                let x = state_traj.value(t)?;
                self.prog.set_initial_guess(&self.x_vars[k], x.as_slice())?;
            }
        }
        Ok(())
    }

    /// Use the default SQP solver with a different configuration
    pub fn set_solver_config(&mut self, config: SolverConfig) {
        self.solver = Box::new(SqpSolver::new(config));
    }

    /// Replace the NLP solver
    pub fn set_solver(&mut self, solver: Box<dyn NlpSolver>) {
        self.solver = solver;
    }

    pub fn solver_name(&self) -> &str {
        self.solver.name()
    }

    /// Solve the transcribed program
    ///
    /// Any previous solution is discarded first, so accessors fail with
    /// [`TrajoptError::NotSolved`] after an unsuccessful solve.
    pub fn solve(&mut self) -> Result<&Solution, TrajoptError> {
        self.solution = None;
        let result = self.solver.solve(&self.prog)?;
        let solution = self.extract_solution(&result)?;
        info!(
            "Trajectory optimization solved: N = {}, duration = {:.4} s, objective = {:.6e}",
            self.num_knots,
            solution.sample_times[self.num_knots - 1],
            solution.objective
        );
        Ok(self.solution.insert(solution))
    }

    fn extract_solution(&self, result: &ProgramResult) -> Result<Solution, TrajoptError> {
        let n = self.num_knots;
        let timesteps = match &self.timesteps {
            Timesteps::Free { vars, .. } => {
                // Interior-point iterates may sit a rounding error outside their bounds
                let (lower, upper) = (self.prog.lower_bounds(), self.prog.upper_bounds());
                let mut values = result.values(vars)?;
                for (value, v) in values.iter_mut().zip(vars) {
                    let i = self.prog.variable_index(v)?;
                    *value = value.clamp(lower[i], upper[i]);
                }
                values
            }
            Timesteps::Fixed(h) => DVector::from_element(n - 1, *h),
        };

        let mut sample_times = DVector::zeros(n);
        for k in 1..n {
            sample_times[k] = sample_times[k - 1] + timesteps[k - 1];
        }

        let mut states = DMatrix::zeros(self.num_states, n);
        let mut inputs = DMatrix::zeros(self.num_inputs, n);
        for k in 0..n {
            states.set_column(k, &result.values(&self.x_vars[k])?);
            inputs.set_column(k, &result.values(&self.u_vars[k])?);
        }

        Ok(Solution {
            sample_times,
            states,
            inputs,
            timesteps,
            objective: result.objective,
            statistics: result.statistics.clone(),
        })
    }

    /// Last successful solution, if any
    pub fn solution(&self) -> Option<&Solution> {
        self.solution.as_ref()
    }

    pub(crate) fn solved(&self) -> Result<&Solution, TrajoptError> {
        self.solution.as_ref().ok_or(TrajoptError::NotSolved)
    }

    /// Knot times of the last solution
    pub fn sample_times(&self) -> Result<&DVector<f64>, TrajoptError> {
        Ok(&self.solved()?.sample_times)
    }

    /// States of the last solution (n_x × N)
    pub fn state_samples(&self) -> Result<&DMatrix<f64>, TrajoptError> {
        Ok(&self.solved()?.states)
    }

    /// Inputs of the last solution (n_u × N)
    pub fn input_samples(&self) -> Result<&DMatrix<f64>, TrajoptError> {
        Ok(&self.solved()?.inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn free(n: usize) -> TrajectoryOptimization {
        TrajectoryOptimization::with_free_timesteps(n, 2, 1, 0.1, 0.3, Quadrature::Trapezoidal).unwrap()
    }

    fn fixed(n: usize) -> TrajectoryOptimization {
        TrajectoryOptimization::with_fixed_timestep(n, 1, 1, 0.1, Quadrature::LeftRectangle).unwrap()
    }

    #[test]
    fn test_layout() {
        let opt = free(5);
        assert_eq!(opt.prog().num_vars(), 4 + 5 * 2 + 5);
        assert_eq!(opt.timestep_variables().len(), 4);
        assert_eq!(opt.all_states().len(), 10);
        assert_eq!(opt.all_inputs().len(), 5);
        assert_eq!(opt.state().len(), 2);
        assert_eq!(opt.input().len(), 1);
        assert!(opt.state_at(5).is_err());
        assert!(opt.timestep(4).is_err());

        // Duration guesses start at the midpoint of their bounds
        assert_relative_eq!(opt.prog().initial_guess()[0], 0.2);

        let fixed = fixed(3);
        assert_eq!(fixed.prog().num_vars(), 3 + 3);
        assert!(!fixed.has_free_timesteps());
    }

    #[test]
    fn test_invalid_construction() {
        assert!(matches!(
            TrajectoryOptimization::with_free_timesteps(1, 1, 1, 0.1, 0.2, Quadrature::Trapezoidal),
            Err(TrajoptError::Configuration(_))
        ));
        assert!(matches!(
            TrajectoryOptimization::with_free_timesteps(3, 1, 1, 0.3, 0.2, Quadrature::Trapezoidal),
            Err(TrajoptError::Configuration(_))
        ));
        assert!(matches!(
            TrajectoryOptimization::with_fixed_timestep(3, 1, 1, 0.0, Quadrature::LeftRectangle),
            Err(TrajoptError::Configuration(_))
        ));
    }

    #[test]
    fn test_time_at() {
        let opt = free(4);
        assert_eq!(opt.time_at(0).unwrap(), Expr::Constant(0.0));
        let hs = opt.timestep_variables().to_vec();
        let t2 = opt.time_at(2).unwrap();
        assert_eq!(t2.variables(), vec![hs[0].clone(), hs[1].clone()]);

        let fixed = fixed(4);
        assert_eq!(fixed.time_at(3).unwrap().as_constant(), Some(0.1 * 3.0));
        assert_eq!(fixed.timestep(0).unwrap(), Expr::Constant(0.1));
    }

    #[test]
    fn test_running_cost_quadrature() {
        // ∫ 1 dt over N = 4 knots
        let mut opt = free(4);
        opt.add_running_cost(Expr::constant(1.0)).unwrap();
        assert_eq!(opt.prog().costs().len(), 4);

        let mut x = DVector::from_column_slice(opt.prog().initial_guess());
        x[0] = 0.1;
        x[1] = 0.2;
        x[2] = 0.3;
        assert_relative_eq!(opt.prog().evaluate_objective(&x).unwrap(), 0.6, epsilon = 1e-12);

        let mut opt = fixed(4);
        let x_ph = opt.state();
        opt.add_running_cost(x_ph[0].clone()).unwrap();
        assert_eq!(opt.prog().costs().len(), 3);
        // States 1, 2, 3, 4 at the knots: left rectangle uses the first three
        let mut x = DVector::zeros(opt.prog().num_vars());
        for k in 0..4 {
            let (xs, _) = opt.knot_variables(k).unwrap();
            let i = opt.prog().variable_index(&xs[0]).unwrap();
            x[i] = (k + 1) as f64;
        }
        assert_relative_eq!(opt.prog().evaluate_objective(&x).unwrap(), 0.1 * 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_knot_constraints() {
        let mut opt = free(3);
        let u = opt.input();
        opt.add_constraint_to_all_knot_points(&u[0].equals(0.0)).unwrap();
        // Single-variable formulas become bounds
        assert_eq!(opt.prog().num_constraints(), 0);
        for k in 0..3 {
            let (_, us) = opt.knot_variables(k).unwrap();
            let i = opt.prog().variable_index(&us[0]).unwrap();
            assert_eq!(opt.prog().upper_bounds()[i], 0.0);
        }

        let x = opt.state();
        opt.add_constraint_to_knot(1, &(&x[0] + &x[1]).leq(1.0)).unwrap();
        assert_eq!(opt.prog().num_constraints(), 1);
        assert!(opt.add_constraint_to_knot(3, &x[0].equals(0.0)).is_err());
    }

    #[test]
    fn test_time_constraints() {
        let mut opt = free(4);
        opt.add_time_interval_bounds(0.15, 0.25).unwrap();
        assert_eq!(opt.prog().lower_bounds()[0], 0.15);
        assert_eq!(opt.prog().upper_bounds()[2], 0.25);
        assert!(opt.add_time_interval_bounds(0.3, 0.2).is_err());
        // Durations divide the collocation defects, so they must stay positive
        assert!(matches!(opt.add_time_interval_bounds(0.0, 0.2), Err(TrajoptError::Configuration(_))));
        assert!(matches!(opt.add_time_interval_bounds(-0.1, 0.2), Err(TrajoptError::Configuration(_))));
        assert_eq!(opt.prog().lower_bounds()[1], 0.15);

        opt.add_equal_time_intervals_constraints().unwrap();
        assert_eq!(opt.prog().num_constraints(), 2);
        opt.add_duration_bounds(0.5, 0.6).unwrap();
        assert_eq!(opt.prog().num_constraints(), 3);

        let mut opt = fixed(4);
        assert!(matches!(opt.add_time_interval_bounds(0.1, 0.2), Err(TrajoptError::Configuration(_))));
        assert!(matches!(opt.add_duration_bounds(0.1, 0.2), Err(TrajoptError::Configuration(_))));
        assert!(opt.add_equal_time_intervals_constraints().is_err());
    }

    #[test]
    fn test_initial_trajectory() {
        let mut opt = free(3);
        let u = PiecewisePolynomial::first_order_hold(
            &[1.0, 2.0],
            &[DMatrix::from_element(1, 1, 0.0), DMatrix::from_element(1, 1, 4.0)],
        )
        .unwrap();
        opt.set_initial_trajectory(&u, &PiecewisePolynomial::empty()).unwrap();

        let guess = opt.prog().initial_guess().to_vec();
        // h = duration / (N - 1)
        assert_relative_eq!(guess[0], 0.5);
        assert_relative_eq!(guess[1], 0.5);
        for (k, expected) in [0.0, 2.0, 4.0].iter().enumerate() {
            let (_, us) = opt.knot_variables(k).unwrap();
            let i = opt.prog().variable_index(&us[0]).unwrap();
            assert_relative_eq!(guess[i], *expected, epsilon = 1e-12);
        }

        let wrong = PiecewisePolynomial::constant(&DMatrix::zeros(3, 1));
        assert!(matches!(
            opt.set_initial_trajectory(&PiecewisePolynomial::empty(), &wrong),
            Err(TrajoptError::Configuration(_))
        ));
    }

    /// Returns the bound-projected guess with every duration nudged below its lower bound
    struct RoundingSolver;

    impl NlpSolver for RoundingSolver {
        fn name(&self) -> &str {
            "rounding"
        }

        fn solve(&self, prog: &MathematicalProgram) -> Result<ProgramResult, SolverError> {
            let (lower, upper) = (prog.lower_bounds(), prog.upper_bounds());
            let x = DVector::from_fn(prog.num_vars(), |j, _| {
                if prog.variables()[j].name().starts_with('h') {
                    lower[j] - 1e-12
                } else {
                    prog.initial_guess()[j].clamp(lower[j], upper[j])
                }
            });
            Ok(ProgramResult::new(
                prog,
                x,
                0.0,
                crate::solver::SolverStatus::Success,
                SolveStatistics::default(),
            ))
        }
    }

    #[test]
    fn test_solved_durations_clamped_to_bounds() {
        let mut opt = free(4);
        opt.set_solver(Box::new(RoundingSolver));
        let solution = opt.solve().unwrap().clone();

        for &h in solution.timesteps.iter() {
            assert_eq!(h, 0.1);
        }
        let times = opt.sample_times().unwrap();
        for k in 1..times.len() {
            assert!(times[k] > times[k - 1]);
        }
        assert_relative_eq!(times[3], 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_not_solved() {
        let opt = free(3);
        assert!(matches!(opt.sample_times(), Err(TrajoptError::NotSolved)));
        assert!(matches!(opt.state_samples(), Err(TrajoptError::NotSolved)));
        assert!(matches!(opt.input_samples(), Err(TrajoptError::NotSolved)));
        assert!(opt.solution().is_none());
    }
}
