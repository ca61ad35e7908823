//! Nonlinear program solvers
//!
//! [`SqpSolver`] is a line-search SQP method:
//!
//! ```text
//! minimize    ½ dᵀ B d + ∇f(x)ᵀ d
//! subject to  lb ≤ g(x) + J(x) d ≤ ub
//!             x_lb ≤ x + d ≤ x_ub
//! ```
//!
//! The QP subproblem is solved with Clarabel. By default B is the
//! finite-difference Lagrangian Hessian at the previous multipliers, plus
//! ρ JₑᵀJₑ over the equality rows, with eigenvalues clipped from below.
//! A damped BFGS model is available through [`HessianApproximation`].
//!
//! Steps are accepted by backtracking on the l1 merit function
//! φ(x) = f(x) + μ ‖viol(x)‖₁. A rejected full step first gets a
//! second-order correction. When the linearized constraints are
//! inconsistent the QP is retried in elastic mode, with the nonlinear rows
//! relaxed by penalized slacks.

use std::time::Instant;

use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus as QpStatus,
    SupportedConeT::{self, NonnegativeConeT, ZeroConeT},
};
use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{HessianApproximation, SolverConfig};
use crate::program::{row_violation, EvaluationError, MathematicalProgram, ProgramResult};

/// Rows whose bounds differ by less than this are equalities
const EQUALITY_GAP: f64 = 1e-12;

/// Tikhonov term of the second-order correction normal equations
const CORRECTION_REGULARIZATION: f64 = 1e-10;

/// Slack weight of the elastic QP relative to the merit penalty
const ELASTIC_WEIGHT_FACTOR: f64 = 10.0;

/// Solver errors
#[derive(Debug, Clone, Error)]
pub enum SolverError {
    #[error("Problem is infeasible: {0}")]
    Infeasible(String),
    #[error("Maximum iterations ({iterations}) reached without convergence (violation {violation:.3e})")]
    MaxIterationsReached { iterations: usize, violation: f64 },
    #[error("QP solver failed: {0}")]
    QpSolverFailed(String),
    #[error("Line search failed at iteration {0}")]
    LineSearchFailed(usize),
    #[error("Evaluation failed: {0}")]
    Evaluation(#[from] EvaluationError),
    #[error("Invalid solver configuration: {0}")]
    InvalidConfig(String),
}

impl SolverError {
    /// Status code summarizing the failure
    pub fn status(&self) -> SolverStatus {
        match self {
            SolverError::Infeasible(_) => SolverStatus::Infeasible,
            SolverError::MaxIterationsReached { .. } => SolverStatus::MaxIterations,
            SolverError::QpSolverFailed(_) => SolverStatus::QpFailure,
            SolverError::LineSearchFailed(_) => SolverStatus::MinStep,
            SolverError::Evaluation(_) => SolverStatus::NaNDetected,
            SolverError::InvalidConfig(_) => SolverStatus::InvalidInput,
        }
    }

    /// Failures of a single QP subproblem that an elastic retry may fix
    fn is_subproblem_failure(&self) -> bool {
        matches!(self, SolverError::Infeasible(_) | SolverError::QpSolverFailed(_))
    }
}

/// Solver status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverStatus {
    Success,
    NaNDetected,
    MaxIterations,
    MinStep,
    QpFailure,
    Infeasible,
    InvalidInput,
}

/// Solution statistics from solver
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SolveStatistics {
    /// Number of SQP iterations
    pub sqp_iterations: usize,
    /// Total interior-point iterations over all QP subproblems
    pub qp_iterations: usize,
    /// Total solve time [ms]
    pub solve_time_ms: f64,
    /// Final constraint violation (infinity norm)
    pub constraint_violation: f64,
    /// Final step size (infinity norm)
    pub step_norm: f64,
    /// Objective value
    pub objective: f64,
    /// Steps accepted after a second-order correction
    pub second_order_corrections: usize,
    /// QP subproblems re-solved with relaxed constraints
    pub elastic_qps: usize,
}

/// Nonlinear program solver
pub trait NlpSolver: Send + Sync {
    fn name(&self) -> &str;

    fn solve(&self, prog: &MathematicalProgram) -> Result<ProgramResult, SolverError>;
}

/// Sequential quadratic programming solver
#[derive(Debug, Clone, Default)]
pub struct SqpSolver {
    config: SolverConfig,
}

/// Variable and constraint row bounds of a program
struct Bounds {
    x_lower: DVector<f64>,
    x_upper: DVector<f64>,
    g_lower: DVector<f64>,
    g_upper: DVector<f64>,
}

impl Bounds {
    fn of(prog: &MathematicalProgram) -> Result<Self, SolverError> {
        let x_lower = DVector::from_column_slice(prog.lower_bounds());
        let x_upper = DVector::from_column_slice(prog.upper_bounds());
        for j in 0..x_lower.len() {
            if x_lower[j] > x_upper[j] {
                warn!("Variable {} has empty bounds", prog.variables()[j]);
                return Err(SolverError::Infeasible(format!(
                    "variable {} has bounds [{}, {}]",
                    prog.variables()[j],
                    x_lower[j],
                    x_upper[j]
                )));
            }
        }
        let (g_lower, g_upper) = prog.constraint_bounds();
        for i in 0..g_lower.len() {
            if g_lower[i] > g_upper[i] {
                return Err(SolverError::Infeasible(format!("constraint row {i} has empty bounds")));
            }
        }
        Ok(Self {
            x_lower,
            x_upper,
            g_lower,
            g_upper,
        })
    }

    fn is_equality_row(&self, i: usize) -> bool {
        self.g_upper[i] - self.g_lower[i] <= EQUALITY_GAP
    }

    fn is_fixed_variable(&self, j: usize) -> bool {
        self.x_upper[j] - self.x_lower[j] <= EQUALITY_GAP
    }

    fn clamp(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_fn(x.len(), |j, _| x[j].clamp(self.x_lower[j], self.x_upper[j]))
    }

    /// Σ violations of constraint rows and variable bounds
    fn l1_violation(&self, x: &DVector<f64>, g: &DVector<f64>) -> f64 {
        let rows: f64 = (0..g.len()).map(|i| row_violation(g[i], self.g_lower[i], self.g_upper[i])).sum();
        let vars: f64 = (0..x.len()).map(|j| row_violation(x[j], self.x_lower[j], self.x_upper[j])).sum();
        rows + vars
    }

    fn max_violation(&self, x: &DVector<f64>, g: &DVector<f64>) -> f64 {
        let rows = (0..g.len()).map(|i| row_violation(g[i], self.g_lower[i], self.g_upper[i]));
        let vars = (0..x.len()).map(|j| row_violation(x[j], self.x_lower[j], self.x_upper[j]));
        rows.chain(vars).fold(0.0, f64::max)
    }
}

/// Values and first derivatives at one iterate
struct Iterate {
    x: DVector<f64>,
    f: f64,
    grad: DVector<f64>,
    g: DVector<f64>,
    jac: DMatrix<f64>,
}

impl Iterate {
    fn evaluate(prog: &MathematicalProgram, x: DVector<f64>, fd_step: f64) -> Result<Self, SolverError> {
        let f = prog.evaluate_objective(&x)?;
        let g = prog.constraint_values(&x)?;
        Self::complete(prog, x, f, g, fd_step)
    }

    /// Add derivatives to values already computed by the line search
    fn complete(
        prog: &MathematicalProgram,
        x: DVector<f64>,
        f: f64,
        g: DVector<f64>,
        fd_step: f64,
    ) -> Result<Self, SolverError> {
        let grad = prog.objective_gradient(&x, fd_step)?;
        let jac = prog.constraint_jacobian(&x, fd_step)?;
        Ok(Self { x, f, grad, g, jac })
    }
}

/// Candidate point of the line search
struct Trial {
    x: DVector<f64>,
    f: f64,
    g: DVector<f64>,
    merit: f64,
}

/// Primal step and constraint multipliers of one QP subproblem
struct QpStep {
    step: DVector<f64>,
    /// λ for the nonlinear constraint rows (∇f + Jᵀλ + ... = 0 convention)
    multipliers: DVector<f64>,
    iterations: usize,
}

/// Linearized row kinds
enum RowKind {
    Equality(f64),
    Range(f64, f64),
}

fn row_kind(lower: f64, upper: f64) -> RowKind {
    if upper - lower <= EQUALITY_GAP {
        RowKind::Equality(0.5 * (lower + upper))
    } else {
        RowKind::Range(lower, upper)
    }
}

/// Origin of a QP row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowSource {
    Constraint(usize),
    Bound,
}

struct QpRow {
    coefficients: DVector<f64>,
    rhs: f64,
    source: RowSource,
    sign: f64,
}

impl SqpSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Solve one QP subproblem at the iterate
    ///
    /// Equality rows go to the zero cone. Range rows become up to two
    /// inequalities in the nonnegative cone (A d + s = b, s ≥ 0). With an
    /// elastic weight every nonlinear row gets nonnegative slack columns
    /// costing that weight, so the subproblem is always feasible.
    fn solve_qp(
        &self,
        iterate: &Iterate,
        bounds: &Bounds,
        hessian: &DMatrix<f64>,
        elastic: Option<f64>,
    ) -> Result<QpStep, SolverError> {
        let n = iterate.x.len();
        let m = iterate.g.len();
        if iterate.x.iter().any(|v| !v.is_finite()) {
            return Err(SolverError::Evaluation(EvaluationError::NonFinite(
                "SQP iterate".to_string(),
            )));
        }

        let mut eq_rows: Vec<QpRow> = Vec::new();
        let mut ineq_rows: Vec<QpRow> = Vec::new();

        let mut push_rows = |coefficients: DVector<f64>, value: f64, lower: f64, upper: f64, source: RowSource| {
            match row_kind(lower, upper) {
                RowKind::Equality(target) => eq_rows.push(QpRow {
                    coefficients,
                    rhs: target - value,
                    source,
                    sign: 1.0,
                }),
                RowKind::Range(lower, upper) => {
                    if upper.is_finite() {
                        ineq_rows.push(QpRow {
                            coefficients: coefficients.clone(),
                            rhs: upper - value,
                            source,
                            sign: 1.0,
                        });
                    }
                    if lower.is_finite() {
                        ineq_rows.push(QpRow {
                            coefficients: -coefficients,
                            rhs: value - lower,
                            source,
                            sign: -1.0,
                        });
                    }
                }
            }
        };

        for i in 0..m {
            push_rows(
                iterate.jac.row(i).transpose(),
                iterate.g[i],
                bounds.g_lower[i],
                bounds.g_upper[i],
                RowSource::Constraint(i),
            );
        }
        for j in 0..n {
            let mut e = DVector::zeros(n);
            e[j] = 1.0;
            push_rows(e, iterate.x[j], bounds.x_lower[j], bounds.x_upper[j], RowSource::Bound);
        }

        if eq_rows.is_empty() && ineq_rows.is_empty() {
            return unconstrained_step(hessian, &iterate.grad, m);
        }

        // Equalities take a slack pair (+p - n), inequalities a single relaxing slack
        let is_elastic = |row: &QpRow| elastic.is_some() && matches!(row.source, RowSource::Constraint(_));
        let num_eq_slacks = 2 * eq_rows.iter().filter(|r| is_elastic(r)).count();
        let num_ineq_slacks = ineq_rows.iter().filter(|r| is_elastic(r)).count();
        let num_slacks = num_eq_slacks + num_ineq_slacks;
        let nv = n + num_slacks;

        let (n_eq, n_ineq) = (eq_rows.len(), ineq_rows.len() + num_slacks);
        let mut a_all = DMatrix::zeros(n_eq + n_ineq, nv);
        let mut b_all = Vec::with_capacity(n_eq + n_ineq);

        let mut slack = n;
        for (r, row) in eq_rows.iter().enumerate() {
            a_all.view_mut((r, 0), (1, n)).copy_from(&row.coefficients.transpose());
            if is_elastic(row) {
                a_all[(r, slack)] = 1.0;
                a_all[(r, slack + 1)] = -1.0;
                slack += 2;
            }
            b_all.push(row.rhs);
        }
        for (k, row) in ineq_rows.iter().enumerate() {
            let r = n_eq + k;
            a_all.view_mut((r, 0), (1, n)).copy_from(&row.coefficients.transpose());
            if is_elastic(row) {
                a_all[(r, slack)] = -1.0;
                slack += 1;
            }
            b_all.push(row.rhs);
        }
        // -s ≤ 0
        for k in 0..num_slacks {
            a_all[(n_eq + ineq_rows.len() + k, n + k)] = -1.0;
            b_all.push(0.0);
        }

        let mut p_full = DMatrix::zeros(nv, nv);
        p_full.view_mut((0, 0), (n, n)).copy_from(hessian);
        let p_csc = dmatrix_to_csc_upper_tri(&p_full);
        let a_csc = dmatrix_to_csc(&a_all);
        let weight = elastic.unwrap_or(0.0);
        let q: Vec<f64> = iterate
            .grad
            .iter()
            .copied()
            .chain(std::iter::repeat(weight).take(num_slacks))
            .collect();

        let mut cones: Vec<SupportedConeT<f64>> = Vec::new();
        if n_eq > 0 {
            cones.push(ZeroConeT(n_eq));
        }
        if n_ineq > 0 {
            cones.push(NonnegativeConeT(n_ineq));
        }

        let settings = DefaultSettingsBuilder::default()
            .max_iter(self.config.qp_max_iterations)
            .verbose(false)
            .tol_gap_abs(self.config.qp_tolerance)
            .tol_gap_rel(self.config.qp_tolerance)
            .tol_feas(self.config.qp_tolerance)
            .build()
            .map_err(|_| SolverError::InvalidConfig("QP settings rejected".to_string()))?;

        let mut solver = DefaultSolver::new(&p_csc, &q, &a_csc, &b_all, &cones, settings)
            .map_err(|_| SolverError::QpSolverFailed("QP setup rejected the problem data".to_string()))?;
        solver.solve();
        let sol = &solver.solution;

        match &sol.status {
            QpStatus::Solved | QpStatus::AlmostSolved => {}
            QpStatus::PrimalInfeasible | QpStatus::AlmostPrimalInfeasible => {
                return Err(SolverError::Infeasible(
                    "linearized constraints are inconsistent".to_string(),
                ));
            }
            status => return Err(SolverError::QpSolverFailed(format!("{status:?}"))),
        }

        let mut multipliers = DVector::zeros(m);
        for (row, z) in eq_rows.iter().chain(&ineq_rows).zip(sol.z.iter()) {
            if let RowSource::Constraint(i) = row.source {
                multipliers[i] += row.sign * z;
            }
        }

        Ok(QpStep {
            step: DVector::from_column_slice(&sol.x[..n]),
            multipliers,
            iterations: sol.iterations as usize,
        })
    }

    /// QP step with elastic retries when the subproblem fails
    fn qp_step(
        &self,
        iterate: &Iterate,
        bounds: &Bounds,
        hessian: &DMatrix<f64>,
        penalty: f64,
        stats: &mut SolveStatistics,
    ) -> Result<QpStep, SolverError> {
        let err = match self.solve_qp(iterate, bounds, hessian, None) {
            Ok(qp) => return Ok(qp),
            Err(err) if err.is_subproblem_failure() => err,
            Err(err) => return Err(err),
        };
        debug!("QP subproblem failed ({err}), retrying with relaxed constraints");

        let weight = ELASTIC_WEIGHT_FACTOR * penalty.max(1.0);
        stats.elastic_qps += 1;
        match self.solve_qp(iterate, bounds, hessian, Some(weight)) {
            Ok(qp) => Ok(qp),
            Err(err) if err.is_subproblem_failure() => {
                let n = iterate.x.len();
                self.solve_qp(iterate, bounds, &DMatrix::identity(n, n), Some(weight))
            }
            Err(err) => Err(err),
        }
    }

    /// Convexified Lagrangian Hessian with the equality augmentation
    fn lagrangian_model(
        &self,
        prog: &MathematicalProgram,
        iterate: &Iterate,
        bounds: &Bounds,
        multipliers: &DVector<f64>,
    ) -> Result<DMatrix<f64>, SolverError> {
        let config = &self.config;
        let mut hessian = prog.lagrangian_hessian(
            &iterate.x,
            multipliers,
            config.finite_difference_step,
            config.second_order_step,
        )?;

        let rho = config.augmented_lagrangian_weight;
        if rho > 0.0 {
            let equalities: Vec<usize> = (0..iterate.g.len()).filter(|&i| bounds.is_equality_row(i)).collect();
            if !equalities.is_empty() {
                let je = iterate.jac.select_rows(equalities.iter());
                hessian += je.tr_mul(&je) * rho;
            }
            for j in 0..iterate.x.len() {
                if bounds.is_fixed_variable(j) {
                    hessian[(j, j)] += rho;
                }
            }
        }

        if hessian.iter().any(|v| !v.is_finite()) {
            return Err(SolverError::Evaluation(EvaluationError::NonFinite(
                "Lagrangian Hessian".to_string(),
            )));
        }
        Ok(convexify(hessian, config.min_curvature))
    }
}

/// Newton step B d = -∇f when nothing constrains the step
fn unconstrained_step(hessian: &DMatrix<f64>, grad: &DVector<f64>, m: usize) -> Result<QpStep, SolverError> {
    let rhs = -grad;
    let step = match hessian.clone().cholesky() {
        Some(chol) => chol.solve(&rhs),
        None => hessian
            .clone()
            .lu()
            .solve(&rhs)
            .ok_or_else(|| SolverError::QpSolverFailed("singular Hessian approximation".to_string()))?,
    };
    Ok(QpStep {
        step,
        multipliers: DVector::zeros(m),
        iterations: 0,
    })
}

/// Clip the eigenvalues of a symmetric matrix to at least `min_curvature`
fn convexify(hessian: DMatrix<f64>, min_curvature: f64) -> DMatrix<f64> {
    let mut eigen = hessian.symmetric_eigen();
    eigen.eigenvalues = eigen.eigenvalues.map(|v| v.max(min_curvature));
    let b = eigen.recompose();
    (&b + b.transpose()) * 0.5
}

/// Minimum-norm step back onto the violated and equality rows
///
/// Uses the Jacobian at the current iterate and moves only variables
/// strictly inside their bounds at the trial point.
fn second_order_correction(iterate: &Iterate, bounds: &Bounds, trial: &Trial) -> Option<DVector<f64>> {
    let mut rows = Vec::new();
    let mut residuals = Vec::new();
    for i in 0..trial.g.len() {
        let (lower, upper, value) = (bounds.g_lower[i], bounds.g_upper[i], trial.g[i]);
        let residual = if bounds.is_equality_row(i) {
            value - 0.5 * (lower + upper)
        } else if value > upper {
            value - upper
        } else if value < lower {
            value - lower
        } else {
            continue;
        };
        rows.push(i);
        residuals.push(residual);
    }
    if rows.is_empty() {
        return None;
    }

    let free: Vec<usize> = (0..trial.x.len())
        .filter(|&j| {
            let t = trial.x[j];
            let tol = 1e-9 * (1.0 + t.abs());
            t - bounds.x_lower[j] > tol && bounds.x_upper[j] - t > tol
        })
        .collect();
    if free.is_empty() {
        return None;
    }

    let a = iterate.jac.select_rows(rows.iter()).select_columns(free.iter());
    let normal = &a * a.transpose() + DMatrix::identity(rows.len(), rows.len()) * CORRECTION_REGULARIZATION;
    let y = normal.lu().solve(&DVector::from_vec(residuals))?;
    let local = -(a.transpose() * y);

    let mut correction = DVector::zeros(trial.x.len());
    for (k, &j) in free.iter().enumerate() {
        correction[j] = local[k];
    }
    correction.iter().all(|v| v.is_finite()).then_some(correction)
}

/// Powell-damped BFGS update keeping B positive definite
fn damped_bfgs_update(b: &mut DMatrix<f64>, s: &DVector<f64>, y: &DVector<f64>) {
    let bs = &*b * s;
    let sbs = s.dot(&bs);
    if sbs <= f64::EPSILON {
        return;
    }
    let sy = s.dot(y);
    let theta = if sy >= 0.2 * sbs { 1.0 } else { 0.8 * sbs / (sbs - sy) };
    let r = y * theta + &bs * (1.0 - theta);
    let sr = s.dot(&r);
    if sr <= f64::EPSILON {
        return;
    }
    *b -= &bs * bs.transpose() / sbs;
    *b += &r * r.transpose() / sr;
}

impl NlpSolver for SqpSolver {
    fn name(&self) -> &str {
        "sqp"
    }

    fn solve(&self, prog: &MathematicalProgram) -> Result<ProgramResult, SolverError> {
        let start = Instant::now();
        let config = &self.config;
        config.validate().map_err(SolverError::InvalidConfig)?;
        let fd = config.finite_difference_step;

        let n = prog.num_vars();
        let bounds = Bounds::of(prog)?;
        let guess = DVector::from_column_slice(prog.initial_guess());
        let mut iterate = Iterate::evaluate(prog, bounds.clamp(&guess), fd)?;

        let mut hessian = DMatrix::identity(n, n);
        let mut multipliers = DVector::zeros(iterate.g.len());
        let mut penalty = config.initial_penalty;
        let mut stats = SolveStatistics::default();
        let mut consecutive_failures = 0;

        debug!(
            "SQP start: {} variables, {} constraint rows, {} costs",
            n,
            iterate.g.len(),
            prog.costs().len()
        );

        for iter in 0..config.max_iterations {
            let violation = bounds.max_violation(&iterate.x, &iterate.g);

            // Identity on the first iteration and after a failed line search
            let exact = config.hessian == HessianApproximation::FiniteDifference;
            if exact && iter > 0 && consecutive_failures == 0 {
                hessian = self.lagrangian_model(prog, &iterate, &bounds, &multipliers)?;
            }

            let qp = self.qp_step(&iterate, &bounds, &hessian, penalty, &mut stats)?;
            stats.qp_iterations += qp.iterations;
            let step_norm = qp.step.amax();

            debug!(
                "SQP iter {:3}: f = {:.6e}, viol = {:.3e}, |d| = {:.3e}, mu = {:.2e}",
                iter, iterate.f, violation, step_norm, penalty
            );

            let step_tolerance = config.tolerance * (1.0 + iterate.x.amax());
            if step_norm <= step_tolerance && violation < config.constraint_tolerance {
                return self.finish(prog, &bounds, iterate, iter, step_norm, stats, start);
            }

            // Non-monotone update from the constraint row multipliers
            let lambda = 1.1 * qp.multipliers.amax();
            penalty = lambda.max(0.5 * (penalty + lambda)).max(config.initial_penalty);

            let l1 = bounds.l1_violation(&iterate.x, &iterate.g);
            let merit = iterate.f + penalty * l1;
            let slope = iterate.grad.dot(&qp.step) - penalty * l1;
            let sufficient =
                |trial: &Trial, alpha: f64| trial.merit <= merit + config.armijo_factor * alpha * slope.min(0.0);
            let evaluate = |x: DVector<f64>| -> Option<Trial> {
                let f = prog.evaluate_objective(&x).ok()?;
                let g = prog.constraint_values(&x).ok()?;
                let merit = f + penalty * bounds.l1_violation(&x, &g);
                merit.is_finite().then_some(Trial { x, f, g, merit })
            };

            let mut alpha = 1.0;
            let mut accepted = None;
            for attempt in 0..config.max_line_search_steps {
                let Some(trial) = evaluate(&iterate.x + &qp.step * alpha) else {
                    alpha *= 0.5;
                    continue;
                };
                if sufficient(&trial, alpha) {
                    accepted = Some(trial);
                    break;
                }
                if attempt == 0 {
                    let corrected = second_order_correction(&iterate, &bounds, &trial)
                        .and_then(|c| evaluate(bounds.clamp(&(&trial.x + c))));
                    if let Some(corrected) = corrected.filter(|c| sufficient(c, 1.0)) {
                        stats.second_order_corrections += 1;
                        accepted = Some(corrected);
                        break;
                    }
                }
                alpha *= 0.5;
            }

            let Some(trial) = accepted else {
                consecutive_failures += 1;
                if consecutive_failures >= 2 {
                    warn!("SQP line search failed twice at iteration {iter}");
                    return Err(SolverError::LineSearchFailed(iter));
                }
                warn!("SQP line search failed at iteration {iter}, resetting Hessian approximation");
                hessian = DMatrix::identity(n, n);
                continue;
            };
            consecutive_failures = 0;

            let next = Iterate::complete(prog, trial.x, trial.f, trial.g, fd)?;
            if config.hessian == HessianApproximation::DampedBfgs {
                // Lagrangian gradient difference
                let s = &next.x - &iterate.x;
                let y = (&next.grad - &iterate.grad)
                    + (next.jac.transpose() - iterate.jac.transpose()) * &qp.multipliers;
                damped_bfgs_update(&mut hessian, &s, &y);
            }

            multipliers = qp.multipliers;
            iterate = next;
            stats.sqp_iterations = iter + 1;
        }

        let violation = bounds.max_violation(&iterate.x, &iterate.g);
        warn!(
            "SQP reached {} iterations without convergence (violation {:.3e})",
            config.max_iterations, violation
        );
        Err(SolverError::MaxIterationsReached {
            iterations: config.max_iterations,
            violation,
        })
    }
}

impl SqpSolver {
    /// Clamp the converged iterate into its bounds and build the result
    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        prog: &MathematicalProgram,
        bounds: &Bounds,
        iterate: Iterate,
        iter: usize,
        step_norm: f64,
        mut stats: SolveStatistics,
        start: Instant,
    ) -> Result<ProgramResult, SolverError> {
        let x = bounds.clamp(&iterate.x);
        let f = prog.evaluate_objective(&x)?;
        let g = prog.constraint_values(&x)?;

        stats.sqp_iterations = iter;
        stats.solve_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        stats.constraint_violation = bounds.max_violation(&x, &g);
        stats.step_norm = step_norm;
        stats.objective = f;
        info!(
            "SQP converged in {} iterations ({:.2} ms), objective = {:.6e}, {} corrections, {} elastic QPs",
            iter, stats.solve_time_ms, f, stats.second_order_corrections, stats.elastic_qps
        );
        Ok(ProgramResult::new(prog, x, f, SolverStatus::Success, stats))
    }
}

/// Convert a nalgebra `DMatrix<f64>` to a Clarabel `CscMatrix<f64>` (full matrix).
fn dmatrix_to_csc(m: &DMatrix<f64>) -> CscMatrix<f64> {
    let (nrows, ncols) = m.shape();
    let mut colptr = vec![0usize; ncols + 1];
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    for j in 0..ncols {
        for i in 0..nrows {
            let v = m[(i, j)];
            if v.abs() > 1e-15 {
                rowval.push(i);
                nzval.push(v);
            }
        }
        colptr[j + 1] = rowval.len();
    }

    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}

/// Upper triangle of a symmetric matrix as `CscMatrix<f64>`.
fn dmatrix_to_csc_upper_tri(m: &DMatrix<f64>) -> CscMatrix<f64> {
    let (nrows, ncols) = m.shape();
    let mut colptr = vec![0usize; ncols + 1];
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    for j in 0..ncols {
        for i in 0..=j.min(nrows.saturating_sub(1)) {
            let v = m[(i, j)];
            if v.abs() > 1e-15 {
                rowval.push(i);
                nzval.push(v);
            }
        }
        colptr[j + 1] = rowval.len();
    }

    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}
