//! Trajectory Optimization Planner
//!
//! Transcribes optimal control problems for dynamical systems into
//! nonlinear programs and reconstructs trajectories from their solutions.
//!
//! # Architecture
//!
//! ```text
//! minimize    ∫ g(t, x, u) dt + φ(x_N)
//! subject to  ẋ = f(t, x, u)          (collocation or forward simulation)
//!             lb ≤ c(t, x, u) ≤ ub    (at every knot or a single knot)
//!             h_min ≤ hᵢ ≤ h_max      (free timesteps)
//! ```
//!
//! # Components
//!
//! - [`symbolic`]: Expression tree for costs and constraints
//! - [`program`]: Nonlinear program container, evaluators and derivatives
//! - [`solver`]: SQP solver (Clarabel QP subproblems)
//! - [`config`]: Solver configuration
//! - [`trajectory_optimization`]: Shared layout, costs, constraints, solve
//! - [`direct_collocation`]: Hermite-Simpson collocation
//! - [`direct_transcription`]: Fixed-step forward simulation

pub mod config;
pub mod symbolic;
pub mod program;
pub mod solver;
pub mod trajectory_optimization;
pub mod direct_collocation;
pub mod direct_transcription;

// Re-exports
pub use config::{HessianApproximation, SolverConfig};
pub use direct_collocation::DirectCollocation;
pub use direct_transcription::{DirectTranscription, IntegrationScheme};
pub use program::{EvaluationError, Evaluator, MathematicalProgram, ProgramError, ProgramResult};
pub use solver::{NlpSolver, SolveStatistics, SolverError, SolverStatus, SqpSolver};
pub use symbolic::{Expr, ExprVector, Formula, SymbolicError, Variable};
pub use trajectory_optimization::{Quadrature, Solution, TrajectoryOptimization, TrajoptError};
