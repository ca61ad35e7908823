//! Pendulum swing-up with direct collocation
//!
//! Drives the pendulum from hanging at rest to upright at rest with a
//! torque limit, minimizing ∫ u² dt over a free final time.
//!
//! Run with: cargo run -p trajopt-planner --example pendulum_swing_up

use std::error::Error;
use std::f64::consts::PI;

use nalgebra::DMatrix;
use trajopt_core::{PendulumPlant, PiecewisePolynomial, System};
use trajopt_planner::{DirectCollocation, SolverConfig};

const NUM_KNOTS: usize = 21;
const TORQUE_LIMIT: f64 = 3.0;

fn main() -> Result<(), Box<dyn Error>> {
    let plant = PendulumPlant::new();
    let context = plant.create_default_context();
    let mut dircol = DirectCollocation::new(plant, &context, NUM_KNOTS, 0.2, 0.5)?;

    let u = dircol.input();
    dircol.add_constraint_to_all_knot_points(&u[0].leq(TORQUE_LIMIT))?;
    dircol.add_constraint_to_all_knot_points(&u[0].geq(-TORQUE_LIMIT))?;
    dircol.add_equal_time_intervals_constraints()?;

    for formula in dircol.initial_state().equals(&[0.0, 0.0])? {
        dircol.add_constraint(formula)?;
    }
    for formula in dircol.final_state().equals(&[PI, 0.0])? {
        dircol.add_constraint(formula)?;
    }

    dircol.add_running_cost(10.0 * u[0].squared())?;

    // Straight line in state space over a nominal 4 s
    let state_guess = PiecewisePolynomial::first_order_hold(
        &[0.0, 4.0],
        &[DMatrix::zeros(2, 1), DMatrix::from_column_slice(2, 1, &[PI, 0.0])],
    )?;
    dircol.set_initial_trajectory(&PiecewisePolynomial::empty(), &state_guess)?;
    dircol.set_solver_config(SolverConfig {
        max_iterations: 500,
        ..SolverConfig::default()
    });

    let solution = dircol.solve()?.clone();
    let stats = &solution.statistics;
    println!(
        "Solved in {} SQP iterations ({:.1} ms, {} second-order corrections), objective = {:.4}",
        stats.sqp_iterations, stats.solve_time_ms, stats.second_order_corrections, solution.objective
    );
    println!("Duration: {:.3} s", solution.sample_times[NUM_KNOTS - 1]);

    let state_traj = dircol.reconstruct_state_trajectory()?;
    let input_traj = dircol.reconstruct_input_trajectory()?;

    println!("{:>8} {:>10} {:>10} {:>10}", "t [s]", "theta", "theta_dot", "torque");
    let end = state_traj.end_time();
    for i in 0..=10 {
        let t = end * i as f64 / 10.0;
        let x = state_traj.value(t)?;
        let u = input_traj.value(t)?;
        println!("{:>8.3} {:>10.4} {:>10.4} {:>10.4}", t, x[(0, 0)], x[(1, 0)], u[(0, 0)]);
    }

    Ok(())
}
