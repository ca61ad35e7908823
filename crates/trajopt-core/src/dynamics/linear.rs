//! Linear time-invariant systems
//!
//! Continuous:  ẋ = A x + B u
//! Discrete:    x[k+1] = A x[k] + B u[k]
//! Output:      y = C x + D u

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::{Context, Linearization, System, SystemError};

/// Linear system with an optional update period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearSystem {
    a: DMatrix<f64>,
    b: DMatrix<f64>,
    c: DMatrix<f64>,
    d: DMatrix<f64>,
    /// `Some(T)` for a discrete system with period T
    time_period: Option<f64>,
}

impl LinearSystem {
    /// Create a linear system
    ///
    /// A must be n×n, B n×m, C p×n and D p×m. A time period, if given,
    /// must be positive and finite.
    pub fn new(
        a: DMatrix<f64>,
        b: DMatrix<f64>,
        c: DMatrix<f64>,
        d: DMatrix<f64>,
        time_period: Option<f64>,
    ) -> Result<Self, SystemError> {
        let n = a.nrows();
        let m = b.ncols();
        let p = c.nrows();

        let checks = [
            ("A columns", n, a.ncols()),
            ("B rows", n, b.nrows()),
            ("C columns", n, c.ncols()),
            ("D rows", p, d.nrows()),
            ("D columns", m, d.ncols()),
        ];
        for (what, expected, got) in checks {
            if expected != got {
                return Err(SystemError::DimensionMismatch { what, expected, got });
            }
        }

        if let Some(period) = time_period {
            if !(period.is_finite() && period > 0.0) {
                return Err(SystemError::InvalidParameter(format!(
                    "time period must be positive, got {period}"
                )));
            }
        }

        Ok(Self { a, b, c, d, time_period })
    }

    /// Continuous system with no outputs
    pub fn continuous(a: DMatrix<f64>, b: DMatrix<f64>) -> Result<Self, SystemError> {
        let (n, m) = (a.nrows(), b.ncols());
        Self::new(a, b, DMatrix::zeros(0, n), DMatrix::zeros(0, m), None)
    }

    /// Discrete system with no outputs
    pub fn discrete(a: DMatrix<f64>, b: DMatrix<f64>, time_period: f64) -> Result<Self, SystemError> {
        let (n, m) = (a.nrows(), b.ncols());
        Self::new(a, b, DMatrix::zeros(0, n), DMatrix::zeros(0, m), Some(time_period))
    }

    pub fn a(&self) -> &DMatrix<f64> {
        &self.a
    }

    pub fn b(&self) -> &DMatrix<f64> {
        &self.b
    }

    pub fn c(&self) -> &DMatrix<f64> {
        &self.c
    }

    pub fn d(&self) -> &DMatrix<f64> {
        &self.d
    }

    /// y = C x + D u
    pub fn output(&self, x: &DVector<f64>, u: &DVector<f64>) -> Result<DVector<f64>, SystemError> {
        self.check_dimensions(x, u)?;
        Ok(&self.c * x + &self.d * u)
    }

    fn affine(&self, x: &DVector<f64>, u: &DVector<f64>) -> Result<DVector<f64>, SystemError> {
        self.check_dimensions(x, u)?;
        Ok(&self.a * x + &self.b * u)
    }
}

impl System for LinearSystem {
    fn num_states(&self) -> usize {
        self.a.nrows()
    }

    fn num_inputs(&self) -> usize {
        self.b.ncols()
    }

    fn time_period(&self) -> Option<f64> {
        self.time_period
    }

    fn is_time_invariant(&self) -> bool {
        true
    }

    fn continuous_dynamics(
        &self,
        _context: &Context,
        _t: f64,
        x: &DVector<f64>,
        u: &DVector<f64>,
    ) -> Result<DVector<f64>, SystemError> {
        if self.time_period.is_some() {
            return Err(SystemError::NotContinuous);
        }
        self.affine(x, u)
    }

    fn discrete_update(
        &self,
        _context: &Context,
        _t: f64,
        x: &DVector<f64>,
        u: &DVector<f64>,
    ) -> Result<DVector<f64>, SystemError> {
        if self.time_period.is_none() {
            return Err(SystemError::NotDiscrete);
        }
        self.affine(x, u)
    }

    fn linearize(
        &self,
        _context: &Context,
        _t: f64,
        _x: &DVector<f64>,
        _u: &DVector<f64>,
    ) -> Option<Linearization> {
        Some(Linearization {
            a: self.a.clone(),
            b: self.b.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn double_integrator() -> LinearSystem {
        let a = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 0.0, 0.0]);
        let b = DMatrix::from_row_slice(2, 1, &[0.0, 1.0]);
        LinearSystem::continuous(a, b).unwrap()
    }

    #[test]
    fn test_continuous_dynamics() {
        let sys = double_integrator();
        let ctx = sys.create_default_context();
        assert_eq!(sys.dimensions(), (2, 1));
        assert!(sys.is_continuous());

        let x = DVector::from_vec(vec![1.0, 2.0]);
        let u = DVector::from_vec(vec![3.0]);
        let xdot = sys.continuous_dynamics(&ctx, 0.0, &x, &u).unwrap();
        assert_relative_eq!(xdot, DVector::from_vec(vec![2.0, 3.0]));

        assert_eq!(sys.discrete_update(&ctx, 0.0, &x, &u), Err(SystemError::NotDiscrete));
    }

    #[test]
    fn test_discrete_update() {
        let sys = LinearSystem::discrete(DMatrix::identity(1, 1), DMatrix::identity(1, 1), 0.1).unwrap();
        let ctx = sys.create_default_context();
        assert_eq!(sys.time_period(), Some(0.1));

        let x = DVector::from_vec(vec![1.0]);
        let u = DVector::from_vec(vec![0.5]);
        assert_relative_eq!(sys.discrete_update(&ctx, 0.0, &x, &u).unwrap()[0], 1.5);
        assert_eq!(sys.continuous_dynamics(&ctx, 0.0, &x, &u), Err(SystemError::NotContinuous));
    }

    #[test]
    fn test_output_and_linearize() {
        let sys = LinearSystem::new(
            DMatrix::from_element(1, 1, -1.0),
            DMatrix::from_element(1, 1, 2.0),
            DMatrix::from_element(1, 1, 3.0),
            DMatrix::from_element(1, 1, 0.5),
            None,
        )
        .unwrap();
        let ctx = sys.create_default_context();
        let x = DVector::from_vec(vec![1.0]);
        let u = DVector::from_vec(vec![2.0]);

        assert_relative_eq!(sys.output(&x, &u).unwrap()[0], 4.0);

        let lin = sys.linearize(&ctx, 0.0, &x, &u).unwrap();
        assert_eq!(lin.a, *sys.a());
        assert_eq!(lin.b, *sys.b());
    }

    #[test]
    fn test_invalid_shapes() {
        let result = LinearSystem::continuous(DMatrix::zeros(2, 2), DMatrix::zeros(3, 1));
        assert!(matches!(
            result,
            Err(SystemError::DimensionMismatch { what: "B rows", expected: 2, got: 3 })
        ));

        let result = LinearSystem::discrete(DMatrix::zeros(1, 1), DMatrix::zeros(1, 1), -1.0);
        assert!(matches!(result, Err(SystemError::InvalidParameter(_))));
    }

    #[test]
    fn test_wrong_state_length() {
        let sys = double_integrator();
        let ctx = sys.create_default_context();
        let result = sys.continuous_dynamics(&ctx, 0.0, &DVector::zeros(3), &DVector::zeros(1));
        assert!(matches!(result, Err(SystemError::DimensionMismatch { what: "state", .. })));
    }
}
