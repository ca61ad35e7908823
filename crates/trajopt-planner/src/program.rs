//! Nonlinear program container
//!
//! ```text
//! minimize    Σⱼ fⱼ(x)
//! subject to  lbᵢ ≤ gᵢ(x) ≤ ubᵢ
//!             x_lb ≤ x ≤ x_ub
//! ```
//!
//! Costs and constraints are bindings of an [`Evaluator`] to a subset of
//! the decision variables. Symbolic expressions are wrapped in an
//! evaluator whose gradient is differentiated symbolically once at
//! registration; numeric evaluators may supply an analytic Jacobian or
//! fall back to central finite differences. Second derivatives of the
//! Lagrangian are always finite differences, taken per binding so only
//! the bound variables are perturbed.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use thiserror::Error;
use trajopt_core::SystemError;

use crate::solver::{SolveStatistics, SolverStatus};
use crate::symbolic::{Expr, Formula, SymbolicError, Variable};

/// Program construction errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProgramError {
    #[error("Variable '{0}' does not belong to this program")]
    UnknownVariable(String),
    #[error("Dimension mismatch for {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("Invalid bounds [{lower}, {upper}] for {what}")]
    InvalidBounds { what: String, lower: f64, upper: f64 },
    #[error("Cost evaluator must have exactly one output, got {0}")]
    NotScalarCost(usize),
}

/// Evaluator failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("System evaluation failed: {0}")]
    System(#[from] SystemError),
    #[error("Symbolic evaluation failed: {0}")]
    Symbolic(#[from] SymbolicError),
    #[error("Non-finite output from {0}")]
    NonFinite(String),
    #[error("Evaluator {what} returned {got} outputs, expected {expected}")]
    OutputSize {
        what: String,
        expected: usize,
        got: usize,
    },
}

/// Vector-valued function of a subset of the decision variables
pub trait Evaluator: Send + Sync {
    fn num_outputs(&self) -> usize;

    fn eval(&self, x: &DVector<f64>) -> Result<DVector<f64>, EvaluationError>;

    /// Analytic Jacobian (num_outputs × inputs), or `None` for finite differences
    fn jacobian(&self, _x: &DVector<f64>) -> Result<Option<DMatrix<f64>>, EvaluationError> {
        Ok(None)
    }

    fn description(&self) -> String {
        String::from("evaluator")
    }
}

/// Central-difference Jacobian with a step relative to |xⱼ|
pub fn finite_difference_jacobian<F>(
    x: &DVector<f64>,
    num_outputs: usize,
    step: f64,
    f: F,
) -> Result<DMatrix<f64>, EvaluationError>
where
    F: Fn(&DVector<f64>) -> Result<DVector<f64>, EvaluationError>,
{
    let mut jac = DMatrix::zeros(num_outputs, x.len());
    let mut point = x.clone();
    for j in 0..x.len() {
        let h = step * x[j].abs().max(1.0);
        point[j] = x[j] + h;
        let plus = f(&point)?;
        point[j] = x[j] - h;
        let minus = f(&point)?;
        point[j] = x[j];
        jac.set_column(j, &((plus - minus) / (2.0 * h)));
    }
    Ok(jac)
}

/// Central second differences of a scalar function, step relative to |xⱼ|
pub fn finite_difference_hessian<F>(x: &DVector<f64>, step: f64, f: F) -> Result<DMatrix<f64>, EvaluationError>
where
    F: Fn(&DVector<f64>) -> Result<f64, EvaluationError>,
{
    let k = x.len();
    let steps: Vec<f64> = x.iter().map(|v| step * v.abs().max(1.0)).collect();
    let center = f(x)?;
    let mut hess = DMatrix::zeros(k, k);
    let mut point = x.clone();

    for i in 0..k {
        point[i] = x[i] + steps[i];
        let plus = f(&point)?;
        point[i] = x[i] - steps[i];
        let minus = f(&point)?;
        point[i] = x[i];
        hess[(i, i)] = (plus - 2.0 * center + minus) / (steps[i] * steps[i]);

        for j in 0..i {
            let mut corners = [0.0; 4];
            for (corner, (si, sj)) in corners.iter_mut().zip([(1.0, 1.0), (1.0, -1.0), (-1.0, 1.0), (-1.0, -1.0)]) {
                point[i] = x[i] + si * steps[i];
                point[j] = x[j] + sj * steps[j];
                *corner = f(&point)?;
            }
            point[i] = x[i];
            point[j] = x[j];
            let value = (corners[0] - corners[1] - corners[2] + corners[3]) / (4.0 * steps[i] * steps[j]);
            hess[(i, j)] = value;
            hess[(j, i)] = value;
        }
    }
    Ok(hess)
}

/// Scalar symbolic expression as an evaluator
struct ExpressionEvaluator {
    expr: Expr,
    gradient: Vec<Expr>,
    inputs: HashMap<Variable, usize>,
}

impl ExpressionEvaluator {
    fn new(expr: Expr, vars: &[Variable]) -> Self {
        let gradient = vars.iter().map(|v| expr.differentiate(v)).collect();
        let inputs = vars.iter().enumerate().map(|(i, v)| (v.clone(), i)).collect();
        Self { expr, gradient, inputs }
    }

    fn value(&self, e: &Expr, x: &DVector<f64>) -> Result<f64, EvaluationError> {
        let value = e.evaluate_with(&|v: &Variable| {
            self.inputs
                .get(v)
                .map(|&i| x[i])
                .ok_or_else(|| SymbolicError::UnboundVariable(v.name().to_string()))
        })?;
        Ok(value)
    }
}

impl Evaluator for ExpressionEvaluator {
    fn num_outputs(&self) -> usize {
        1
    }

    fn eval(&self, x: &DVector<f64>) -> Result<DVector<f64>, EvaluationError> {
        Ok(DVector::from_element(1, self.value(&self.expr, x)?))
    }

    fn jacobian(&self, x: &DVector<f64>) -> Result<Option<DMatrix<f64>>, EvaluationError> {
        let mut jac = DMatrix::zeros(1, self.gradient.len());
        for (j, d) in self.gradient.iter().enumerate() {
            jac[(0, j)] = self.value(d, x)?;
        }
        Ok(Some(jac))
    }

    fn description(&self) -> String {
        self.expr.to_string()
    }
}

/// Evaluator bound to program variables
#[derive(Clone)]
pub struct Binding {
    evaluator: Arc<dyn Evaluator>,
    indices: Vec<usize>,
}

impl Binding {
    pub fn evaluator(&self) -> &Arc<dyn Evaluator> {
        &self.evaluator
    }

    /// Program indices of the bound variables
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    fn gather(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(self.indices.len(), self.indices.iter().map(|&i| x[i]))
    }

    fn eval(&self, x: &DVector<f64>) -> Result<DVector<f64>, EvaluationError> {
        let local = self.gather(x);
        let out = self.evaluator.eval(&local)?;
        let expected = self.evaluator.num_outputs();
        if out.len() != expected {
            return Err(EvaluationError::OutputSize {
                what: self.evaluator.description(),
                expected,
                got: out.len(),
            });
        }
        if out.iter().any(|v| !v.is_finite()) {
            return Err(EvaluationError::NonFinite(self.evaluator.description()));
        }
        Ok(out)
    }

    /// Jacobian with respect to the bound variables
    fn local_jacobian(&self, x: &DVector<f64>, fd_step: f64) -> Result<DMatrix<f64>, EvaluationError> {
        self.jacobian_at(&self.gather(x), fd_step)
    }

    fn jacobian_at(&self, local: &DVector<f64>, fd_step: f64) -> Result<DMatrix<f64>, EvaluationError> {
        match self.evaluator.jacobian(local)? {
            Some(jac) => Ok(jac),
            None => finite_difference_jacobian(local, self.evaluator.num_outputs(), fd_step, |z| {
                self.evaluator.eval(z)
            }),
        }
    }

    /// Hessian of wᵀ e(z) with respect to the bound variables
    ///
    /// Analytic Jacobians are differenced once; otherwise the values are
    /// differenced twice with `second_order_step`.
    fn local_hessian(
        &self,
        x: &DVector<f64>,
        weights: &DVector<f64>,
        fd_step: f64,
        second_order_step: f64,
    ) -> Result<DMatrix<f64>, EvaluationError> {
        let local = self.gather(x);
        if self.evaluator.jacobian(&local)?.is_some() {
            let hess = finite_difference_jacobian(&local, local.len(), fd_step, |z| {
                Ok(self.jacobian_at(z, fd_step)?.tr_mul(weights))
            })?;
            return Ok((&hess + hess.transpose()) * 0.5);
        }
        finite_difference_hessian(&local, second_order_step, |z| Ok(self.evaluator.eval(z)?.dot(weights)))
    }
}

/// Constraint binding with bounds
#[derive(Clone)]
pub struct ConstraintBinding {
    pub binding: Binding,
    pub lower: DVector<f64>,
    pub upper: DVector<f64>,
}

/// Nonlinear program
#[derive(Clone, Default)]
pub struct MathematicalProgram {
    variables: Vec<Variable>,
    index: HashMap<Variable, usize>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    initial_guess: Vec<f64>,
    costs: Vec<Binding>,
    constraints: Vec<ConstraintBinding>,
}

impl fmt::Debug for MathematicalProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MathematicalProgram")
            .field("num_vars", &self.num_vars())
            .field("num_costs", &self.costs.len())
            .field("num_constraints", &self.num_constraints())
            .finish()
    }
}

impl MathematicalProgram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate one unbounded variable
    pub fn new_continuous_variable(&mut self, name: &str) -> Variable {
        let v = Variable::new(name);
        self.index.insert(v.clone(), self.variables.len());
        self.variables.push(v.clone());
        self.lower.push(f64::NEG_INFINITY);
        self.upper.push(f64::INFINITY);
        self.initial_guess.push(0.0);
        v
    }

    /// Allocate `n` unbounded variables named `name(i)`
    pub fn new_continuous_variables(&mut self, n: usize, name: &str) -> Vec<Variable> {
        (0..n)
            .map(|i| self.new_continuous_variable(&format!("{name}({i})")))
            .collect()
    }

    pub fn num_vars(&self) -> usize {
        self.variables.len()
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable_index(&self, v: &Variable) -> Result<usize, ProgramError> {
        self.index
            .get(v)
            .copied()
            .ok_or_else(|| ProgramError::UnknownVariable(v.name().to_string()))
    }

    fn indices_of(&self, vars: &[Variable]) -> Result<Vec<usize>, ProgramError> {
        vars.iter().map(|v| self.variable_index(v)).collect()
    }

    pub fn lower_bounds(&self) -> &[f64] {
        &self.lower
    }

    pub fn upper_bounds(&self) -> &[f64] {
        &self.upper
    }

    pub fn initial_guess(&self) -> &[f64] {
        &self.initial_guess
    }

    pub fn costs(&self) -> &[Binding] {
        &self.costs
    }

    pub fn constraints(&self) -> &[ConstraintBinding] {
        &self.constraints
    }

    /// Total number of constraint rows (excluding variable bounds)
    pub fn num_constraints(&self) -> usize {
        self.constraints.iter().map(|c| c.lower.len()).sum()
    }

    pub fn set_initial_guess(&mut self, vars: &[Variable], values: &[f64]) -> Result<(), ProgramError> {
        if vars.len() != values.len() {
            return Err(ProgramError::DimensionMismatch {
                what: "initial guess",
                expected: vars.len(),
                got: values.len(),
            });
        }
        for (v, &value) in vars.iter().zip(values) {
            let i = self.variable_index(v)?;
            self.initial_guess[i] = value;
        }
        Ok(())
    }

    /// Intersect the bounds of `v` with [lower, upper]
    pub fn add_bounding_box(&mut self, v: &Variable, lower: f64, upper: f64) -> Result<(), ProgramError> {
        check_bounds(v.name(), lower, upper)?;
        let i = self.variable_index(v)?;
        self.lower[i] = self.lower[i].max(lower);
        self.upper[i] = self.upper[i].min(upper);
        Ok(())
    }

    /// Replace the bounds of `v`
    pub fn set_bounds(&mut self, v: &Variable, lower: f64, upper: f64) -> Result<(), ProgramError> {
        check_bounds(v.name(), lower, upper)?;
        let i = self.variable_index(v)?;
        self.lower[i] = lower;
        self.upper[i] = upper;
        Ok(())
    }

    /// Add a symbolic cost term
    pub fn add_cost(&mut self, expr: Expr) -> Result<(), ProgramError> {
        let vars = expr.variables();
        let indices = self.indices_of(&vars)?;
        self.costs.push(Binding {
            evaluator: Arc::new(ExpressionEvaluator::new(expr, &vars)),
            indices,
        });
        Ok(())
    }

    /// Add a scalar numeric cost over `vars`
    pub fn add_cost_evaluator(
        &mut self,
        evaluator: Arc<dyn Evaluator>,
        vars: &[Variable],
    ) -> Result<(), ProgramError> {
        if evaluator.num_outputs() != 1 {
            return Err(ProgramError::NotScalarCost(evaluator.num_outputs()));
        }
        let indices = self.indices_of(vars)?;
        self.costs.push(Binding { evaluator, indices });
        Ok(())
    }

    /// Add a symbolic constraint
    ///
    /// Formulas of the form `lb ≤ v + c ≤ ub` become variable bounds.
    pub fn add_constraint(&mut self, formula: Formula) -> Result<(), ProgramError> {
        if let Some((v, lower, upper)) = formula.as_variable_bound() {
            return self.add_bounding_box(&v, lower, upper);
        }
        check_bounds(&formula.expr.to_string(), formula.lower, formula.upper)?;

        let vars = formula.expr.variables();
        let indices = self.indices_of(&vars)?;
        self.constraints.push(ConstraintBinding {
            binding: Binding {
                evaluator: Arc::new(ExpressionEvaluator::new(formula.expr, &vars)),
                indices,
            },
            lower: DVector::from_element(1, formula.lower),
            upper: DVector::from_element(1, formula.upper),
        });
        Ok(())
    }

    /// Add a numeric constraint `lower ≤ evaluator(vars) ≤ upper`
    pub fn add_constraint_evaluator(
        &mut self,
        evaluator: Arc<dyn Evaluator>,
        vars: &[Variable],
        lower: DVector<f64>,
        upper: DVector<f64>,
    ) -> Result<(), ProgramError> {
        let m = evaluator.num_outputs();
        for (what, len) in [("constraint lower bound", lower.len()), ("constraint upper bound", upper.len())] {
            if len != m {
                return Err(ProgramError::DimensionMismatch { what, expected: m, got: len });
            }
        }
        for (l, u) in lower.iter().zip(upper.iter()) {
            check_bounds(&evaluator.description(), *l, *u)?;
        }
        let indices = self.indices_of(vars)?;
        self.constraints.push(ConstraintBinding {
            binding: Binding { evaluator, indices },
            lower,
            upper,
        });
        Ok(())
    }

    /// Σ costs at x
    pub fn evaluate_objective(&self, x: &DVector<f64>) -> Result<f64, EvaluationError> {
        self.costs
            .iter()
            .try_fold(0.0, |acc, c| Ok(acc + c.eval(x)?[0]))
    }

    /// ∇f at x
    pub fn objective_gradient(&self, x: &DVector<f64>, fd_step: f64) -> Result<DVector<f64>, EvaluationError> {
        let mut grad = DVector::zeros(self.num_vars());
        for cost in &self.costs {
            let jac = cost.local_jacobian(x, fd_step)?;
            for (k, &i) in cost.indices.iter().enumerate() {
                grad[i] += jac[(0, k)];
            }
        }
        Ok(grad)
    }

    /// Stacked constraint values g(x)
    pub fn constraint_values(&self, x: &DVector<f64>) -> Result<DVector<f64>, EvaluationError> {
        let mut values = DVector::zeros(self.num_constraints());
        let mut row = 0;
        for c in &self.constraints {
            let out = c.binding.eval(x)?;
            values.rows_mut(row, out.len()).copy_from(&out);
            row += out.len();
        }
        Ok(values)
    }

    /// Stacked constraint Jacobian ∂g/∂x (repeated variables accumulate)
    pub fn constraint_jacobian(&self, x: &DVector<f64>, fd_step: f64) -> Result<DMatrix<f64>, EvaluationError> {
        let mut jac = DMatrix::zeros(self.num_constraints(), self.num_vars());
        let mut row = 0;
        for c in &self.constraints {
            let local = c.binding.local_jacobian(x, fd_step)?;
            for (k, &i) in c.binding.indices.iter().enumerate() {
                for r in 0..local.nrows() {
                    jac[(row + r, i)] += local[(r, k)];
                }
            }
            row += c.lower.len();
        }
        Ok(jac)
    }

    /// Hessian of the Lagrangian f(x) + λᵀ g(x)
    ///
    /// Bindings whose multipliers are all zero are skipped.
    pub fn lagrangian_hessian(
        &self,
        x: &DVector<f64>,
        multipliers: &DVector<f64>,
        fd_step: f64,
        second_order_step: f64,
    ) -> Result<DMatrix<f64>, EvaluationError> {
        if multipliers.len() != self.num_constraints() {
            return Err(EvaluationError::OutputSize {
                what: "constraint multipliers".to_string(),
                expected: self.num_constraints(),
                got: multipliers.len(),
            });
        }
        let n = self.num_vars();
        let mut hess = DMatrix::zeros(n, n);
        let mut scatter = |binding: &Binding, local: DMatrix<f64>| {
            for (a, &i) in binding.indices.iter().enumerate() {
                for (b, &j) in binding.indices.iter().enumerate() {
                    hess[(i, j)] += local[(a, b)];
                }
            }
        };

        let unit = DVector::from_element(1, 1.0);
        for cost in &self.costs {
            scatter(cost, cost.local_hessian(x, &unit, fd_step, second_order_step)?);
        }
        let mut row = 0;
        for c in &self.constraints {
            let weights = multipliers.rows(row, c.lower.len()).into_owned();
            row += c.lower.len();
            if weights.iter().all(|w| *w == 0.0) {
                continue;
            }
            scatter(&c.binding, c.binding.local_hessian(x, &weights, fd_step, second_order_step)?);
        }
        Ok(hess)
    }

    /// Stacked constraint bounds (lower, upper)
    pub fn constraint_bounds(&self) -> (DVector<f64>, DVector<f64>) {
        let lower: Vec<f64> = self.constraints.iter().flat_map(|c| c.lower.iter().copied()).collect();
        let upper: Vec<f64> = self.constraints.iter().flat_map(|c| c.upper.iter().copied()).collect();
        (DVector::from_vec(lower), DVector::from_vec(upper))
    }

    /// Largest violation over constraints and variable bounds
    pub fn max_violation(&self, x: &DVector<f64>) -> Result<f64, EvaluationError> {
        let g = self.constraint_values(x)?;
        let (lower, upper) = self.constraint_bounds();
        let rows = (0..g.len()).map(|i| row_violation(g[i], lower[i], upper[i]));
        let vars = (0..x.len()).map(|i| row_violation(x[i], self.lower[i], self.upper[i]));
        Ok(rows.chain(vars).fold(0.0, f64::max))
    }
}

/// Distance of `value` outside [lower, upper]
pub(crate) fn row_violation(value: f64, lower: f64, upper: f64) -> f64 {
    (lower - value).max(value - upper).max(0.0)
}

fn check_bounds(what: &str, lower: f64, upper: f64) -> Result<(), ProgramError> {
    if lower.is_nan() || upper.is_nan() || lower == f64::INFINITY || upper == f64::NEG_INFINITY {
        return Err(ProgramError::InvalidBounds {
            what: what.to_string(),
            lower,
            upper,
        });
    }
    Ok(())
}

/// Solution of a [`MathematicalProgram`]
#[derive(Debug, Clone)]
pub struct ProgramResult {
    /// Optimal decision vector, ordered like the program variables
    pub x: DVector<f64>,
    pub objective: f64,
    pub status: SolverStatus,
    pub statistics: SolveStatistics,
    index: HashMap<Variable, usize>,
}

impl ProgramResult {
    pub fn new(
        prog: &MathematicalProgram,
        x: DVector<f64>,
        objective: f64,
        status: SolverStatus,
        statistics: SolveStatistics,
    ) -> Self {
        Self {
            x,
            objective,
            status,
            statistics,
            index: prog.index.clone(),
        }
    }

    /// Solved value of one variable
    pub fn value(&self, v: &Variable) -> Result<f64, ProgramError> {
        self.index
            .get(v)
            .map(|&i| self.x[i])
            .ok_or_else(|| ProgramError::UnknownVariable(v.name().to_string()))
    }

    pub fn values(&self, vars: &[Variable]) -> Result<DVector<f64>, ProgramError> {
        let values = vars.iter().map(|v| self.value(v)).collect::<Result<Vec<_>, _>>()?;
        Ok(DVector::from_vec(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct Product;

    impl Evaluator for Product {
        fn num_outputs(&self) -> usize {
            2
        }

        fn eval(&self, x: &DVector<f64>) -> Result<DVector<f64>, EvaluationError> {
            Ok(DVector::from_vec(vec![x[0] * x[1], x[0] + x[1]]))
        }
    }

    #[test]
    fn test_variable_allocation() {
        let mut prog = MathematicalProgram::new();
        let x = prog.new_continuous_variables(3, "x");
        assert_eq!(prog.num_vars(), 3);
        assert_eq!(x[1].name(), "x(1)");
        assert_eq!(prog.variable_index(&x[2]).unwrap(), 2);
        assert_eq!(prog.lower_bounds()[0], f64::NEG_INFINITY);

        let stranger = Variable::new("y");
        assert!(matches!(
            prog.variable_index(&stranger),
            Err(ProgramError::UnknownVariable(_))
        ));
    }

    #[test]
    fn test_bounds() {
        let mut prog = MathematicalProgram::new();
        let x = prog.new_continuous_variable("x");

        prog.add_bounding_box(&x, -1.0, 2.0).unwrap();
        prog.add_bounding_box(&x, 0.0, 5.0).unwrap();
        assert_eq!((prog.lower_bounds()[0], prog.upper_bounds()[0]), (0.0, 2.0));

        prog.set_bounds(&x, -3.0, 3.0).unwrap();
        assert_eq!((prog.lower_bounds()[0], prog.upper_bounds()[0]), (-3.0, 3.0));

        // x - 1 == 0 is a bound, not a general constraint
        prog.add_constraint(Expr::var(&x).equals(1.0)).unwrap();
        assert_eq!(prog.num_constraints(), 0);
        assert_eq!((prog.lower_bounds()[0], prog.upper_bounds()[0]), (1.0, 1.0));

        assert!(prog.set_bounds(&x, f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_objective_and_gradient() {
        let mut prog = MathematicalProgram::new();
        let v = prog.new_continuous_variables(2, "v");
        let (a, b) = (Expr::var(&v[0]), Expr::var(&v[1]));
        prog.add_cost(a.squared() + 3.0 * &b).unwrap();
        prog.add_cost(&a * &b).unwrap();

        let x = DVector::from_vec(vec![2.0, -1.0]);
        assert_relative_eq!(prog.evaluate_objective(&x).unwrap(), 4.0 - 3.0 - 2.0);

        let grad = prog.objective_gradient(&x, 1e-6).unwrap();
        assert_relative_eq!(grad[0], 2.0 * 2.0 - 1.0, epsilon = 1e-12);
        assert_relative_eq!(grad[1], 3.0 + 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_constraint_assembly() {
        let mut prog = MathematicalProgram::new();
        let v = prog.new_continuous_variables(3, "v");
        prog.add_constraint(Expr::var(&v[0]).squared().leq(Expr::var(&v[2])))
            .unwrap();
        prog.add_constraint_evaluator(
            Arc::new(Product),
            &[v[2].clone(), v[1].clone()],
            DVector::from_vec(vec![0.0, 1.0]),
            DVector::from_vec(vec![0.0, 1.0]),
        )
        .unwrap();
        assert_eq!(prog.num_constraints(), 3);

        let x = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let g = prog.constraint_values(&x).unwrap();
        assert_relative_eq!(g, DVector::from_vec(vec![1.0 - 3.0, 6.0, 5.0]));

        let jac = prog.constraint_jacobian(&x, 1e-6).unwrap();
        let expected = DMatrix::from_row_slice(
            3,
            3,
            &[
                2.0, 0.0, -1.0, //
                0.0, 3.0, 2.0, //
                0.0, 1.0, 1.0,
            ],
        );
        assert_relative_eq!(jac, expected, epsilon = 1e-6);

        let (lower, upper) = prog.constraint_bounds();
        assert_eq!(lower[0], f64::NEG_INFINITY);
        assert_eq!(upper[2], 1.0);
        assert_relative_eq!(prog.max_violation(&x).unwrap(), 6.0);
    }

    #[test]
    fn test_lagrangian_hessian() {
        let mut prog = MathematicalProgram::new();
        let v = prog.new_continuous_variables(3, "v");
        let (a, b) = (Expr::var(&v[0]), Expr::var(&v[1]));
        prog.add_cost(a.squared() * &b).unwrap();
        // Product has no analytic Jacobian, so its curvature comes from value differences
        prog.add_constraint_evaluator(
            Arc::new(Product),
            &[v[2].clone(), v[0].clone()],
            DVector::zeros(2),
            DVector::zeros(2),
        )
        .unwrap();

        let x = DVector::from_vec(vec![1.5, -2.0, 0.5]);
        let lambda = DVector::from_vec(vec![3.0, 7.0]);
        let hess = prog.lagrangian_hessian(&x, &lambda, 6e-6, 1e-4).unwrap();

        // ∇²(a² b) = [[2b, 2a, 0], [2a, 0, 0], 0] and ∇²(3 v₂ v₀) couples v₀ and v₂
        let expected = DMatrix::from_row_slice(
            3,
            3,
            &[
                -4.0, 3.0, 3.0, //
                3.0, 0.0, 0.0, //
                3.0, 0.0, 0.0,
            ],
        );
        assert_relative_eq!(hess, expected, epsilon = 1e-5);

        // Without multipliers only the cost contributes
        let hess = prog.lagrangian_hessian(&x, &DVector::zeros(2), 6e-6, 1e-4).unwrap();
        assert_relative_eq!(hess[(0, 2)], 0.0);
        assert!(prog.lagrangian_hessian(&x, &DVector::zeros(1), 6e-6, 1e-4).is_err());
    }

    #[test]
    fn test_finite_difference_hessian() {
        let x = DVector::from_vec(vec![0.3, 2.0]);
        let hess = finite_difference_hessian(&x, 1e-4, |z| Ok(z[0].sin() * z[1] * z[1])).unwrap();
        assert_relative_eq!(hess[(0, 0)], -(0.3_f64.sin()) * 4.0, epsilon = 1e-5);
        assert_relative_eq!(hess[(0, 1)], 0.3_f64.cos() * 4.0, epsilon = 1e-5);
        assert_relative_eq!(hess[(1, 0)], hess[(0, 1)]);
        assert_relative_eq!(hess[(1, 1)], 2.0 * 0.3_f64.sin(), epsilon = 1e-5);
    }

    #[test]
    fn test_evaluator_validation() {
        let mut prog = MathematicalProgram::new();
        let v = prog.new_continuous_variables(2, "v");
        assert!(matches!(
            prog.add_cost_evaluator(Arc::new(Product), &v),
            Err(ProgramError::NotScalarCost(2))
        ));
        assert!(matches!(
            prog.add_constraint_evaluator(Arc::new(Product), &v, DVector::zeros(1), DVector::zeros(2)),
            Err(ProgramError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_result_lookup() {
        let mut prog = MathematicalProgram::new();
        let v = prog.new_continuous_variables(2, "v");
        let result = ProgramResult::new(
            &prog,
            DVector::from_vec(vec![4.0, 5.0]),
            0.0,
            SolverStatus::Success,
            SolveStatistics::default(),
        );
        assert_eq!(result.value(&v[1]).unwrap(), 5.0);
        assert_eq!(result.values(&v).unwrap(), DVector::from_vec(vec![4.0, 5.0]));
        assert!(result.value(&Variable::new("w")).is_err());
    }
}
