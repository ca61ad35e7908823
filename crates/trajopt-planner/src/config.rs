//! Solver configuration
//!
//! Parameters for the sequential quadratic programming solver that backs
//! every transcription engine.

use serde::{Deserialize, Serialize};

/// Curvature model of the QP subproblems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HessianApproximation {
    /// Finite-difference Lagrangian Hessian, convexified every iteration
    FiniteDifference,
    /// Powell-damped BFGS updates from gradient differences
    DampedBfgs,
}

/// SQP solver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Maximum SQP iterations
    pub max_iterations: usize,
    /// Convergence tolerance on the step (infinity norm)
    pub tolerance: f64,
    /// Convergence tolerance on constraint violation (infinity norm)
    pub constraint_tolerance: f64,
    /// Maximum backtracking steps per line search
    pub max_line_search_steps: usize,
    /// Armijo sufficient-decrease factor
    pub armijo_factor: f64,
    /// Initial l1 merit penalty
    pub initial_penalty: f64,
    /// Relative step for finite-difference derivatives
    pub finite_difference_step: f64,
    /// Maximum interior-point iterations per QP subproblem
    pub qp_max_iterations: u32,
    /// QP gap and feasibility tolerance
    pub qp_tolerance: f64,
    /// Curvature model of the QP subproblems
    pub hessian: HessianApproximation,
    /// Relative step for second-order finite differences
    pub second_order_step: f64,
    /// Weight ρ of the ρ JᵀJ term added over equality rows
    pub augmented_lagrangian_weight: f64,
    /// Smallest eigenvalue kept in the convexified Hessian
    pub min_curvature: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-6,
            constraint_tolerance: 1e-6,
            max_line_search_steps: 30,
            armijo_factor: 1e-4,
            initial_penalty: 1.0,
            finite_difference_step: 6e-6, // ~ cbrt(machine epsilon)
            qp_max_iterations: 200,
            qp_tolerance: 1e-8,
            hessian: HessianApproximation::FiniteDifference,
            second_order_step: 1e-4, // ~ eps^(1/4)
            augmented_lagrangian_weight: 10.0,
            min_curvature: 1e-6,
        }
    }
}

impl SolverConfig {
    /// Check that all parameters are usable
    pub fn validate(&self) -> Result<(), String> {
        if self.max_iterations == 0 {
            return Err("max_iterations must be positive".to_string());
        }
        if !(self.tolerance > 0.0 && self.constraint_tolerance > 0.0) {
            return Err("tolerances must be positive".to_string());
        }
        if !(self.armijo_factor > 0.0 && self.armijo_factor < 0.5) {
            return Err(format!("armijo_factor must be in (0, 0.5), got {}", self.armijo_factor));
        }
        if !(self.finite_difference_step > 0.0) {
            return Err("finite_difference_step must be positive".to_string());
        }
        if self.initial_penalty < 0.0 {
            return Err("initial_penalty must be non-negative".to_string());
        }
        if !(self.second_order_step > 0.0 && self.min_curvature > 0.0) {
            return Err("second_order_step and min_curvature must be positive".to_string());
        }
        if !(self.augmented_lagrangian_weight >= 0.0) {
            return Err(format!(
                "augmented_lagrangian_weight must be non-negative, got {}",
                self.augmented_lagrangian_weight
            ));
        }
        Ok(())
    }

    /// Looser settings for quick interactive use
    pub fn fast() -> Self {
        Self {
            max_iterations: 50,
            tolerance: 1e-4,
            constraint_tolerance: 1e-4,
            ..Self::default()
        }
    }
}
