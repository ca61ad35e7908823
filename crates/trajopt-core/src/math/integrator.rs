//! Numerical integration methods
//!
//! Fixed-step explicit schemes over dynamically sized state vectors.
//! These are the building blocks of fixed-step transcription, where one
//! integrator step maps the state at knot k to the predicted state at k+1.
//!
//! The derivative callback is fallible so that dynamics errors (dimension
//! mismatches, wrong time domain) propagate to the caller unchanged.

use nalgebra::DVector;

/// Single classical Runge-Kutta (RK4) step
///
/// Solves dx/dt = f(t, x) over [t, t + dt].
///
/// # Arguments
/// * `x` - Current state
/// * `t` - Current time
/// * `dt` - Time step
/// * `f` - Derivative function f(t, x) -> dx/dt
///
/// # Returns
/// New state after integration
pub fn rk4<F, E>(x: &DVector<f64>, t: f64, dt: f64, f: F) -> Result<DVector<f64>, E>
where
    F: Fn(f64, &DVector<f64>) -> Result<DVector<f64>, E>,
{
    let k1 = f(t, x)?;
    let k2 = f(t + dt / 2.0, &(x + &k1 * (dt / 2.0)))?;
    let k3 = f(t + dt / 2.0, &(x + &k2 * (dt / 2.0)))?;
    let k4 = f(t + dt, &(x + &k3 * dt))?;

    Ok(x + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (dt / 6.0))
}

/// Single explicit Euler step
///
/// First-order accurate: x(t + dt) ≈ x + dt f(t, x)
pub fn euler<F, E>(x: &DVector<f64>, t: f64, dt: f64, f: F) -> Result<DVector<f64>, E>
where
    F: Fn(f64, &DVector<f64>) -> Result<DVector<f64>, E>,
{
    Ok(x + f(t, x)? * dt)
}

/// Integrate with repeated RK4 steps from t0 to t0 + steps * dt
pub fn rk4_steps<F, E>(
    x0: &DVector<f64>,
    t0: f64,
    dt: f64,
    steps: usize,
    f: F,
) -> Result<DVector<f64>, E>
where
    F: Fn(f64, &DVector<f64>) -> Result<DVector<f64>, E>,
{
    let mut x = x0.clone();
    let mut t = t0;
    for _ in 0..steps {
        x = rk4(&x, t, dt, &f)?;
        t += dt;
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::convert::Infallible;
    use std::f64::consts::PI;

    fn decay(_t: f64, x: &DVector<f64>) -> Result<DVector<f64>, Infallible> {
        Ok(-x)
    }

    #[test]
    fn test_rk4_exponential_decay() {
        // dx/dt = -x, x(0) = 1  =>  x(t) = e^(-t)
        let x0 = DVector::from_element(1, 1.0);
        let x = rk4_steps(&x0, 0.0, 0.01, 100, decay).unwrap();

        let exact = (-1.0_f64).exp();
        assert_relative_eq!(x[0], exact, epsilon = 1e-6);
    }

    #[test]
    fn test_rk4_harmonic_oscillator() {
        // [x, v]' = [v, -x], x(0) = 1, v(0) = 0  =>  x(t) = cos(t)
        let x0 = DVector::from_vec(vec![1.0, 0.0]);
        let dt = 0.001;
        let steps = (PI / 2.0 / dt) as usize;

        let x = rk4_steps(&x0, 0.0, dt, steps, |_t, s: &DVector<f64>| {
            Ok::<_, Infallible>(DVector::from_vec(vec![s[1], -s[0]]))
        })
        .unwrap();

        assert_relative_eq!(x[0], 0.0, epsilon = 1e-3);
        assert_relative_eq!(x[1], -1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_euler_linear() {
        // dx/dt = 2, x(0) = 0  =>  x(0.1) = 0.2 exactly
        let x0 = DVector::from_element(1, 0.0);
        let x = euler(&x0, 0.0, 0.1, |_t, _x: &DVector<f64>| {
            Ok::<_, Infallible>(DVector::from_element(1, 2.0))
        })
        .unwrap();

        assert_relative_eq!(x[0], 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_rk4_vs_euler_accuracy() {
        let x0 = DVector::from_element(1, 1.0);
        let dt = 0.1;

        let mut x_rk4 = x0.clone();
        let mut x_euler = x0;
        let mut t = 0.0;
        for _ in 0..10 {
            x_rk4 = rk4(&x_rk4, t, dt, decay).unwrap();
            x_euler = euler(&x_euler, t, dt, decay).unwrap();
            t += dt;
        }

        let exact = (-1.0_f64).exp();
        let rk4_error = (x_rk4[0] - exact).abs();
        let euler_error = (x_euler[0] - exact).abs();

        assert!(rk4_error < euler_error / 100.0);
    }

    #[test]
    fn test_error_propagates() {
        let x0 = DVector::from_element(1, 1.0);
        let result = rk4(&x0, 0.0, 0.1, |_t, _x: &DVector<f64>| Err::<DVector<f64>, _>("bad"));
        assert_eq!(result, Err("bad"));
    }
}
