//! Piecewise polynomial trajectories
//!
//! A trajectory is a strictly increasing breakpoint sequence
//! t₀ < t₁ < ... < t_{N-1} and one polynomial matrix per segment
//! [tᵢ, tᵢ₊₁]. Segment polynomials are expressed in local time s = t - tᵢ.
//!
//! Evaluation clamps t into [t₀, t_{N-1}]; a time exactly on an interior
//! breakpoint belongs to the segment on its right.
//!
//! Cubic splines without explicit derivatives use not-a-knot end
//! conditions (third derivative continuous at t₁ and t_{N-2}).

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::math::Polynomial;

/// Trajectory construction and evaluation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrajectoryError {
    #[error("Trajectory is empty")]
    Empty,
    #[error("Evaluation time is NaN")]
    NanTime,
    #[error("Breakpoint count {breaks} does not match sample count {samples}")]
    SampleCountMismatch { breaks: usize, samples: usize },
    #[error("At least {required} breakpoints are required, got {got}")]
    TooFewBreakpoints { required: usize, got: usize },
    #[error("Breakpoints must be finite and strictly increasing (violated at index {index})")]
    NonIncreasingBreaks { index: usize },
    #[error("Inconsistent shape at index {index}: expected {expected_rows}x{expected_cols}, got {rows}x{cols}")]
    ShapeMismatch {
        index: usize,
        expected_rows: usize,
        expected_cols: usize,
        rows: usize,
        cols: usize,
    },
    #[error("Polynomial matrix data has {got} entries, expected {expected}")]
    DataLength { expected: usize, got: usize },
    #[error("Spline system is singular")]
    SingularSpline,
    #[error("Incompatible trajectories: {0}")]
    Incompatible(String),
}

/// Matrix of scalar polynomials (column-major storage)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolynomialMatrix {
    rows: usize,
    cols: usize,
    data: Vec<Polynomial>,
}

impl PolynomialMatrix {
    /// Create from column-major entries
    pub fn new(rows: usize, cols: usize, data: Vec<Polynomial>) -> Result<Self, TrajectoryError> {
        if data.len() != rows * cols {
            return Err(TrajectoryError::DataLength {
                expected: rows * cols,
                got: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// Build entry by entry
    pub fn from_fn<F>(rows: usize, cols: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> Polynomial,
    {
        let mut data = Vec::with_capacity(rows * cols);
        for c in 0..cols {
            for r in 0..rows {
                data.push(f(r, c));
            }
        }
        Self { rows, cols, data }
    }

    /// Constant polynomial matrix
    pub fn constant(value: &DMatrix<f64>) -> Self {
        Self::from_fn(value.nrows(), value.ncols(), |r, c| Polynomial::constant(value[(r, c)]))
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Polynomial at (row, col)
    pub fn get(&self, row: usize, col: usize) -> Option<&Polynomial> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.data.get(col * self.rows + row)
    }

    /// Evaluate every entry at local time s
    pub fn evaluate(&self, s: f64) -> DMatrix<f64> {
        DMatrix::from_fn(self.rows, self.cols, |r, c| self.data[c * self.rows + r].evaluate(s))
    }

    /// Entry-wise derivative
    pub fn derivative(&self, order: usize) -> Self {
        self.map(|p| p.derivative(order))
    }

    /// Highest nominal degree over all entries
    pub fn degree(&self) -> usize {
        self.data.iter().map(Polynomial::degree).max().unwrap_or(0)
    }

    fn map<F>(&self, f: F) -> Self
    where
        F: Fn(&Polynomial) -> Polynomial,
    {
        Self {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(f).collect(),
        }
    }

    fn zip_with<F>(&self, other: &Self, f: F) -> Self
    where
        F: Fn(&Polynomial, &Polynomial) -> Polynomial,
    {
        Self {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().zip(&other.data).map(|(a, b)| f(a, b)).collect(),
        }
    }
}

/// End conditions for C² cubic splines
enum SplineEnds<'a> {
    NotAKnot,
    Clamped {
        start: &'a DMatrix<f64>,
        end: &'a DMatrix<f64>,
    },
}

/// Piecewise polynomial trajectory
///
/// Immutable after construction. Algebraic operations return new instances.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PiecewisePolynomial {
    /// Breakpoints t₀ < t₁ < ... (segments + 1 entries, or empty)
    breaks: Vec<f64>,
    /// One polynomial matrix per segment
    segments: Vec<PolynomialMatrix>,
    rows: usize,
    cols: usize,
    /// Value at and after the final breakpoint (zero-order hold only)
    held_final_value: Option<DMatrix<f64>>,
}

impl PiecewisePolynomial {
    /// Trajectory with no segments
    ///
    /// Evaluation fails with [`TrajectoryError::Empty`].
    pub fn empty() -> Self {
        Self::default()
    }

    /// Constant value for all time
    pub fn constant(value: &DMatrix<f64>) -> Self {
        Self {
            breaks: vec![0.0, f64::INFINITY],
            segments: vec![PolynomialMatrix::constant(value)],
            rows: value.nrows(),
            cols: value.ncols(),
            held_final_value: None,
        }
    }

    /// Piecewise constant trajectory
    ///
    /// Segment i holds samples[i] on [breaks[i], breaks[i+1]); the last
    /// sample is the value at the final breakpoint.
    pub fn zero_order_hold(breaks: &[f64], samples: &[DMatrix<f64>]) -> Result<Self, TrajectoryError> {
        let (rows, cols) = validate_samples(breaks, samples)?;

        let segments = samples[..samples.len() - 1]
            .iter()
            .map(PolynomialMatrix::constant)
            .collect();

        Ok(Self {
            breaks: breaks.to_vec(),
            segments,
            rows,
            cols,
            held_final_value: samples.last().cloned(),
        })
    }

    /// Piecewise linear trajectory through the samples
    pub fn first_order_hold(breaks: &[f64], samples: &[DMatrix<f64>]) -> Result<Self, TrajectoryError> {
        let (rows, cols) = validate_samples(breaks, samples)?;

        let segments = (0..breaks.len() - 1)
            .map(|i| {
                let h = breaks[i + 1] - breaks[i];
                let (y0, y1) = (&samples[i], &samples[i + 1]);
                PolynomialMatrix::from_fn(rows, cols, |r, c| {
                    Polynomial::linear(y0[(r, c)], (y1[(r, c)] - y0[(r, c)]) / h)
                })
            })
            .collect();

        Ok(Self::from_parts(breaks.to_vec(), segments, rows, cols))
    }

    /// Cubic Hermite spline matching values and first derivatives at every breakpoint
    ///
    /// The result is C¹; second derivatives are generally discontinuous.
    pub fn cubic_hermite(
        breaks: &[f64],
        samples: &[DMatrix<f64>],
        samples_dot: &[DMatrix<f64>],
    ) -> Result<Self, TrajectoryError> {
        let (rows, cols) = validate_samples(breaks, samples)?;
        if samples_dot.len() != samples.len() {
            return Err(TrajectoryError::SampleCountMismatch {
                breaks: breaks.len(),
                samples: samples_dot.len(),
            });
        }
        check_shapes(samples_dot, rows, cols)?;

        let segments = (0..breaks.len() - 1)
            .map(|i| {
                let h = breaks[i + 1] - breaks[i];
                PolynomialMatrix::from_fn(rows, cols, |r, c| {
                    hermite_segment(
                        h,
                        samples[i][(r, c)],
                        samples[i + 1][(r, c)],
                        samples_dot[i][(r, c)],
                        samples_dot[i + 1][(r, c)],
                    )
                })
            })
            .collect();

        Ok(Self::from_parts(breaks.to_vec(), segments, rows, cols))
    }

    /// C² cubic spline with not-a-knot end conditions
    ///
    /// With two breakpoints the result is linear; with three it is the
    /// single parabola through the samples.
    pub fn cubic(breaks: &[f64], samples: &[DMatrix<f64>]) -> Result<Self, TrajectoryError> {
        validate_samples(breaks, samples)?;
        let slopes = spline_slopes(breaks, samples, SplineEnds::NotAKnot)?;
        Self::cubic_hermite(breaks, samples, &slopes)
    }

    /// C² cubic spline with prescribed first derivatives at both ends
    pub fn cubic_with_endpoint_derivatives(
        breaks: &[f64],
        samples: &[DMatrix<f64>],
        start_derivative: &DMatrix<f64>,
        end_derivative: &DMatrix<f64>,
    ) -> Result<Self, TrajectoryError> {
        let (rows, cols) = validate_samples(breaks, samples)?;
        check_shapes([start_derivative, end_derivative], rows, cols)?;

        let slopes = spline_slopes(
            breaks,
            samples,
            SplineEnds::Clamped {
                start: start_derivative,
                end: end_derivative,
            },
        )?;
        Self::cubic_hermite(breaks, samples, &slopes)
    }

    /// Construct directly from per-segment polynomial matrices
    pub fn from_segments(
        breaks: &[f64],
        segments: Vec<PolynomialMatrix>,
    ) -> Result<Self, TrajectoryError> {
        if breaks.len() != segments.len() + 1 {
            return Err(TrajectoryError::SampleCountMismatch {
                breaks: breaks.len(),
                samples: segments.len() + 1,
            });
        }
        validate_breaks(breaks)?;

        let (rows, cols) = (segments[0].rows(), segments[0].cols());
        for (index, segment) in segments.iter().enumerate() {
            if segment.rows() != rows || segment.cols() != cols {
                return Err(TrajectoryError::ShapeMismatch {
                    index,
                    expected_rows: rows,
                    expected_cols: cols,
                    rows: segment.rows(),
                    cols: segment.cols(),
                });
            }
        }

        Ok(Self::from_parts(breaks.to_vec(), segments, rows, cols))
    }

    fn from_parts(breaks: Vec<f64>, segments: Vec<PolynomialMatrix>, rows: usize, cols: usize) -> Self {
        Self {
            breaks,
            segments,
            rows,
            cols,
            held_final_value: None,
        }
    }

    /// Number of rows of the trajectory value
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns of the trajectory value
    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn number_of_segments(&self) -> usize {
        self.segments.len()
    }

    pub fn breaks(&self) -> &[f64] {
        &self.breaks
    }

    /// Segment polynomial matrix (local time)
    pub fn segment(&self, index: usize) -> Option<&PolynomialMatrix> {
        self.segments.get(index)
    }

    /// First breakpoint (0 for an empty trajectory)
    pub fn start_time(&self) -> f64 {
        self.breaks.first().copied().unwrap_or(0.0)
    }

    /// Last breakpoint (0 for an empty trajectory)
    pub fn end_time(&self) -> f64 {
        self.breaks.last().copied().unwrap_or(0.0)
    }

    pub fn duration(&self) -> f64 {
        self.end_time() - self.start_time()
    }

    /// Index of the segment that owns time t (after clamping)
    pub fn segment_index(&self, t: f64) -> Result<usize, TrajectoryError> {
        if self.segments.is_empty() {
            return Err(TrajectoryError::Empty);
        }
        if t.is_nan() {
            return Err(TrajectoryError::NanTime);
        }
        let t = t.clamp(self.start_time(), self.end_time());
        let index = self.breaks.partition_point(|&b| b <= t).saturating_sub(1);
        Ok(index.min(self.segments.len() - 1))
    }

    /// Trajectory value at time t
    ///
    /// Times outside [start, end] are clamped to the nearest endpoint.
    pub fn value(&self, t: f64) -> Result<DMatrix<f64>, TrajectoryError> {
        self.eval_derivative(t, 0)
    }

    /// n-th time derivative at time t
    pub fn eval_derivative(&self, t: f64, order: usize) -> Result<DMatrix<f64>, TrajectoryError> {
        let index = self.segment_index(t)?;
        let t = t.clamp(self.start_time(), self.end_time());

        if let Some(held) = &self.held_final_value {
            if t >= self.end_time() {
                return Ok(if order == 0 {
                    held.clone()
                } else {
                    DMatrix::zeros(self.rows, self.cols)
                });
            }
        }

        let segment = &self.segments[index];
        let s = t - self.breaks[index];
        Ok(if order == 0 {
            segment.evaluate(s)
        } else {
            segment.derivative(order).evaluate(s)
        })
    }

    /// n-th derivative trajectory
    pub fn derivative(&self, order: usize) -> Self {
        Self {
            breaks: self.breaks.clone(),
            segments: self.segments.iter().map(|s| s.derivative(order)).collect(),
            rows: self.rows,
            cols: self.cols,
            held_final_value: self.held_final_value.as_ref().map(|held| {
                if order == 0 {
                    held.clone()
                } else {
                    DMatrix::zeros(self.rows, self.cols)
                }
            }),
        }
    }

    /// Same trajectory delayed by `offset`
    pub fn shift_right(&self, offset: f64) -> Self {
        Self {
            breaks: self.breaks.iter().map(|b| b + offset).collect(),
            ..self.clone()
        }
    }

    /// Trajectory multiplied by a scalar
    pub fn scale(&self, k: f64) -> Self {
        Self {
            breaks: self.breaks.clone(),
            segments: self.segments.iter().map(|s| s.map(|p| p.scale(k))).collect(),
            rows: self.rows,
            cols: self.cols,
            held_final_value: self.held_final_value.as_ref().map(|held| held * k),
        }
    }

    /// Segment-wise sum; both trajectories must share breakpoints and shape
    pub fn try_add(&self, other: &Self) -> Result<Self, TrajectoryError> {
        self.combine(other, 1.0)
    }

    /// Segment-wise difference; both trajectories must share breakpoints and shape
    pub fn try_sub(&self, other: &Self) -> Result<Self, TrajectoryError> {
        self.combine(other, -1.0)
    }

    fn combine(&self, other: &Self, sign: f64) -> Result<Self, TrajectoryError> {
        if self.is_empty() || other.is_empty() {
            return Err(TrajectoryError::Empty);
        }
        if self.breaks != other.breaks {
            return Err(TrajectoryError::Incompatible("breakpoints differ".to_string()));
        }
        if self.rows != other.rows || self.cols != other.cols {
            return Err(TrajectoryError::Incompatible(format!(
                "shapes {}x{} and {}x{}",
                self.rows, self.cols, other.rows, other.cols
            )));
        }

        let segments = self
            .segments
            .iter()
            .zip(&other.segments)
            .map(|(a, b)| a.zip_with(b, |p, q| p + &q.scale(sign)))
            .collect();

        let held_final_value = if self.held_final_value.is_some() || other.held_final_value.is_some() {
            let end = self.end_time();
            Some(self.value(end)? + other.value(end)? * sign)
        } else {
            None
        };

        Ok(Self {
            breaks: self.breaks.clone(),
            segments,
            rows: self.rows,
            cols: self.cols,
            held_final_value,
        })
    }
}

/// Hermite cubic on [0, h] with values y0, y1 and slopes m0, m1
fn hermite_segment(h: f64, y0: f64, y1: f64, m0: f64, m1: f64) -> Polynomial {
    let delta = (y1 - y0) / h;
    let c2 = (3.0 * delta - 2.0 * m0 - m1) / h;
    let c3 = (m0 + m1 - 2.0 * delta) / (h * h);
    Polynomial::new(vec![y0, m0, c2, c3])
}

/// Solve for the knot slopes of a C² cubic spline
///
/// Unknowns are the slopes mᵢ at every breakpoint. Interior rows enforce
/// continuity of the second derivative:
///
/// ```text
/// 2m_{i-1}/h_{i-1} + 4m_i(1/h_{i-1} + 1/h_i) + 2m_{i+1}/h_i = 6δ_{i-1}/h_{i-1} + 6δ_i/h_i
/// ```
///
/// The first and last rows carry the end conditions. All matrix entries
/// share the system matrix, so it is factored once.
fn spline_slopes(
    breaks: &[f64],
    samples: &[DMatrix<f64>],
    ends: SplineEnds<'_>,
) -> Result<Vec<DMatrix<f64>>, TrajectoryError> {
    let n = breaks.len();
    let (rows, cols) = (samples[0].nrows(), samples[0].ncols());
    let entries = rows * cols;

    let h: Vec<f64> = breaks.windows(2).map(|w| w[1] - w[0]).collect();
    // δᵢ per entry, column-major entry index
    let delta = |i: usize, e: usize| (samples[i + 1][e] - samples[i][e]) / h[i];

    let mut m = DMatrix::<f64>::zeros(n, n);
    let mut rhs = DMatrix::<f64>::zeros(n, entries);

    for i in 1..n - 1 {
        m[(i, i - 1)] = 2.0 / h[i - 1];
        m[(i, i)] = 4.0 / h[i - 1] + 4.0 / h[i];
        m[(i, i + 1)] = 2.0 / h[i];
        for e in 0..entries {
            rhs[(i, e)] = 6.0 * delta(i - 1, e) / h[i - 1] + 6.0 * delta(i, e) / h[i];
        }
    }

    match ends {
        SplineEnds::Clamped { start, end } => {
            m[(0, 0)] = 1.0;
            m[(n - 1, n - 1)] = 1.0;
            for e in 0..entries {
                rhs[(0, e)] = start[e];
                rhs[(n - 1, e)] = end[e];
            }
        }
        SplineEnds::NotAKnot if n == 2 => {
            // Straight line
            m[(0, 0)] = 1.0;
            m[(1, 1)] = 1.0;
            for e in 0..entries {
                rhs[(0, e)] = delta(0, e);
                rhs[(1, e)] = delta(0, e);
            }
        }
        SplineEnds::NotAKnot if n == 3 => {
            // Zero cubic term on both segments: one parabola
            m[(0, 0)] = 1.0;
            m[(0, 1)] = 1.0;
            m[(2, 1)] = 1.0;
            m[(2, 2)] = 1.0;
            for e in 0..entries {
                rhs[(0, e)] = 2.0 * delta(0, e);
                rhs[(2, e)] = 2.0 * delta(1, e);
            }
        }
        SplineEnds::NotAKnot => {
            // Third derivative 6(mₐ + mₐ₊₁ - 2δₐ)/hₐ² continuous at t₁ and t_{n-2}
            let (a0, b0) = (1.0 / (h[0] * h[0]), 1.0 / (h[1] * h[1]));
            m[(0, 0)] = a0;
            m[(0, 1)] = a0 - b0;
            m[(0, 2)] = -b0;

            let (sa, sb) = (n - 3, n - 2);
            let (a1, b1) = (1.0 / (h[sa] * h[sa]), 1.0 / (h[sb] * h[sb]));
            m[(n - 1, n - 3)] = a1;
            m[(n - 1, n - 2)] = a1 - b1;
            m[(n - 1, n - 1)] = -b1;

            for e in 0..entries {
                rhs[(0, e)] = 2.0 * delta(0, e) * a0 - 2.0 * delta(1, e) * b0;
                rhs[(n - 1, e)] = 2.0 * delta(sa, e) * a1 - 2.0 * delta(sb, e) * b1;
            }
        }
    }

    let slopes = m.lu().solve(&rhs).ok_or(TrajectoryError::SingularSpline)?;

    Ok((0..n)
        .map(|i| DMatrix::from_fn(rows, cols, |r, c| slopes[(i, c * rows + r)]))
        .collect())
}

fn validate_breaks(breaks: &[f64]) -> Result<(), TrajectoryError> {
    if breaks.len() < 2 {
        return Err(TrajectoryError::TooFewBreakpoints {
            required: 2,
            got: breaks.len(),
        });
    }
    for (index, b) in breaks.iter().enumerate() {
        if !b.is_finite() || (index > 0 && *b <= breaks[index - 1]) {
            return Err(TrajectoryError::NonIncreasingBreaks { index });
        }
    }
    Ok(())
}

fn check_shapes<'a>(
    samples: impl IntoIterator<Item = &'a DMatrix<f64>>,
    rows: usize,
    cols: usize,
) -> Result<(), TrajectoryError> {
    for (index, sample) in samples.into_iter().enumerate() {
        if sample.nrows() != rows || sample.ncols() != cols {
            return Err(TrajectoryError::ShapeMismatch {
                index,
                expected_rows: rows,
                expected_cols: cols,
                rows: sample.nrows(),
                cols: sample.ncols(),
            });
        }
    }
    Ok(())
}

/// Check the breaks/samples contract and return the common sample shape
fn validate_samples(breaks: &[f64], samples: &[DMatrix<f64>]) -> Result<(usize, usize), TrajectoryError> {
    if breaks.len() != samples.len() {
        return Err(TrajectoryError::SampleCountMismatch {
            breaks: breaks.len(),
            samples: samples.len(),
        });
    }
    validate_breaks(breaks)?;

    let (rows, cols) = (samples[0].nrows(), samples[0].ncols());
    check_shapes(samples, rows, cols)?;
    Ok((rows, cols))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn column(values: &[f64]) -> DMatrix<f64> {
        DMatrix::from_column_slice(values.len(), 1, values)
    }

    fn three_samples() -> Vec<DMatrix<f64>> {
        vec![column(&[1.0, 2.0]), column(&[3.0, 4.0]), column(&[5.0, 6.0])]
    }

    #[test]
    fn test_empty_evaluation_fails() {
        let pp = PiecewisePolynomial::empty();
        assert!(pp.is_empty());
        assert_eq!(pp.rows(), 0);
        assert_eq!(pp.value(0.0), Err(TrajectoryError::Empty));
    }

    #[test]
    fn test_constant() {
        let x = column(&[1.0, 4.0]);
        let pp = PiecewisePolynomial::constant(&x);
        assert_eq!(pp.rows(), 2);
        assert_eq!(pp.cols(), 1);
        assert_eq!(pp.value(11.0).unwrap(), x);
        assert_eq!(pp.value(-3.0).unwrap(), x);
    }

    #[test]
    fn test_zero_order_hold() {
        let pp = PiecewisePolynomial::zero_order_hold(&[0.0, 1.0, 2.0], &three_samples()).unwrap();
        assert_eq!(pp.value(0.5).unwrap(), column(&[1.0, 2.0]));
        // Interior breakpoint belongs to the right segment
        assert_eq!(pp.value(1.0).unwrap(), column(&[3.0, 4.0]));
        assert_eq!(pp.value(1.999).unwrap(), column(&[3.0, 4.0]));
        // Last sample holds at and after the final breakpoint
        assert_eq!(pp.value(2.0).unwrap(), column(&[5.0, 6.0]));
        assert_eq!(pp.value(7.0).unwrap(), column(&[5.0, 6.0]));
    }

    #[test]
    fn test_first_order_hold() {
        let pp = PiecewisePolynomial::first_order_hold(&[0.0, 1.0, 2.0], &three_samples()).unwrap();
        assert_eq!(pp.value(0.5).unwrap(), column(&[2.0, 3.0]));
        assert_relative_eq!(pp.value(1.25).unwrap(), column(&[3.5, 4.5]), epsilon = 1e-12);
        // Clamped outside the time range
        assert_eq!(pp.value(-1.0).unwrap(), column(&[1.0, 2.0]));
        assert_eq!(pp.value(3.0).unwrap(), column(&[5.0, 6.0]));
    }

    #[test]
    fn test_construction_errors() {
        let samples = three_samples();

        assert!(matches!(
            PiecewisePolynomial::zero_order_hold(&[0.0, 1.0], &samples),
            Err(TrajectoryError::SampleCountMismatch { .. })
        ));
        assert!(matches!(
            PiecewisePolynomial::first_order_hold(&[0.0, 2.0, 1.0], &samples),
            Err(TrajectoryError::NonIncreasingBreaks { index: 2 })
        ));
        assert!(matches!(
            PiecewisePolynomial::cubic(&[0.0, 1.0, 1.0], &samples),
            Err(TrajectoryError::NonIncreasingBreaks { .. })
        ));

        let ragged = vec![column(&[1.0, 2.0]), column(&[3.0])];
        assert!(matches!(
            PiecewisePolynomial::first_order_hold(&[0.0, 1.0], &ragged),
            Err(TrajectoryError::ShapeMismatch { index: 1, .. })
        ));

        assert!(matches!(
            PiecewisePolynomial::zero_order_hold(&[0.0], &samples[..1]),
            Err(TrajectoryError::TooFewBreakpoints { .. })
        ));
    }

    fn assert_continuous(pp: &PiecewisePolynomial, order: usize) {
        for i in 1..pp.number_of_segments() {
            let t = pp.breaks()[i];
            let h = pp.breaks()[i] - pp.breaks()[i - 1];
            let left = pp.segment(i - 1).unwrap().derivative(order).evaluate(h);
            let right = pp.segment(i).unwrap().derivative(order).evaluate(0.0);
            assert_relative_eq!(left, right, epsilon = 1e-9);
            assert_relative_eq!(pp.eval_derivative(t, order).unwrap(), right, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_cubic_not_a_knot() {
        let breaks = [0.0, 0.5, 1.5, 2.0, 3.0];
        let samples: Vec<_> = [0.0, 1.0, -1.0, 0.5, 2.0]
            .iter()
            .map(|&v| DMatrix::from_row_slice(1, 2, &[v, v * v]))
            .collect();

        let pp = PiecewisePolynomial::cubic(&breaks, &samples).unwrap();
        assert_eq!((pp.rows(), pp.cols()), (1, 2));

        for (t, sample) in breaks.iter().zip(&samples) {
            assert_relative_eq!(pp.value(*t).unwrap(), sample.clone(), epsilon = 1e-10);
        }
        assert_continuous(&pp, 0);
        assert_continuous(&pp, 1);
        assert_continuous(&pp, 2);
        // Not-a-knot: third derivative continuous at the second breakpoint
        let third_left = pp.segment(0).unwrap().derivative(3).evaluate(0.5);
        let third_right = pp.segment(1).unwrap().derivative(3).evaluate(0.0);
        assert_relative_eq!(third_left, third_right, epsilon = 1e-8);
    }

    #[test]
    fn test_cubic_reproduces_cubic_polynomial() {
        let f = |t: f64| 1.0 - 2.0 * t + 0.5 * t * t * t;
        let breaks = [0.0, 1.0, 2.5, 3.0, 4.0];
        let samples: Vec<_> = breaks.iter().map(|&t| DMatrix::from_element(1, 1, f(t))).collect();

        let pp = PiecewisePolynomial::cubic(&breaks, &samples).unwrap();
        for t in [0.3, 1.7, 2.9, 3.6] {
            assert_relative_eq!(pp.value(t).unwrap()[(0, 0)], f(t), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_cubic_three_points_is_parabola() {
        let samples = three_samples();
        let pp = PiecewisePolynomial::cubic(&[0.0, 1.0, 2.0], &samples).unwrap();
        assert_continuous(&pp, 1);
        // Samples lie on a line, so the parabola is that line
        assert_relative_eq!(pp.value(0.5).unwrap(), column(&[2.0, 3.0]), epsilon = 1e-12);
    }

    #[test]
    fn test_cubic_with_endpoint_derivatives() {
        let samples = three_samples();
        let zero = column(&[0.0, 0.0]);
        let pp = PiecewisePolynomial::cubic_with_endpoint_derivatives(
            &[0.0, 1.0, 2.0],
            &samples,
            &zero,
            &zero,
        )
        .unwrap();

        assert_relative_eq!(pp.eval_derivative(0.0, 1).unwrap(), zero, epsilon = 1e-12);
        assert_relative_eq!(pp.eval_derivative(2.0, 1).unwrap(), zero, epsilon = 1e-12);
        assert_relative_eq!(pp.value(1.0).unwrap(), column(&[3.0, 4.0]), epsilon = 1e-12);
        assert_continuous(&pp, 1);
        assert_continuous(&pp, 2);
    }

    #[test]
    fn test_endpoint_derivative_shape_mismatch() {
        let samples = three_samples();
        let zero = column(&[0.0, 0.0]);
        let err = PiecewisePolynomial::cubic_with_endpoint_derivatives(
            &[0.0, 1.0, 2.0],
            &samples,
            &zero,
            &column(&[0.0, 0.0, 0.0]),
        )
        .unwrap_err();
        assert_eq!(
            err,
            TrajectoryError::ShapeMismatch {
                index: 1,
                expected_rows: 2,
                expected_cols: 1,
                rows: 3,
                cols: 1,
            }
        );
    }

    #[test]
    fn test_cubic_hermite_matches_derivatives() {
        let samples = three_samples();
        let pp = PiecewisePolynomial::cubic_hermite(&[0.0, 1.0, 2.0], &samples, &samples).unwrap();

        for (i, t) in [0.0, 1.0, 2.0].iter().enumerate() {
            assert_relative_eq!(pp.value(*t).unwrap(), samples[i].clone(), epsilon = 1e-12);
            assert_relative_eq!(pp.eval_derivative(*t, 1).unwrap(), samples[i].clone(), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_derivative_and_algebra() {
        let foh = PiecewisePolynomial::first_order_hold(&[0.0, 1.0, 2.0], &three_samples()).unwrap();
        let rate = foh.derivative(1);
        assert_relative_eq!(rate.value(0.5).unwrap(), column(&[2.0, 2.0]), epsilon = 1e-12);

        let doubled = foh.try_add(&foh).unwrap();
        assert_relative_eq!(doubled.value(1.5).unwrap(), foh.scale(2.0).value(1.5).unwrap(), epsilon = 1e-12);

        let zero = foh.try_sub(&foh).unwrap();
        assert_relative_eq!(zero.value(0.7).unwrap(), column(&[0.0, 0.0]), epsilon = 1e-12);

        let shifted = foh.shift_right(1.0);
        assert_relative_eq!(shifted.start_time(), 1.0);
        assert_relative_eq!(shifted.value(1.5).unwrap(), foh.value(0.5).unwrap(), epsilon = 1e-12);

        let other = PiecewisePolynomial::first_order_hold(&[0.0, 2.0], &three_samples()[..2]).unwrap();
        assert!(matches!(foh.try_add(&other), Err(TrajectoryError::Incompatible(_))));
    }

    #[test]
    fn test_from_segments() {
        let seg = PolynomialMatrix::new(1, 1, vec![Polynomial::new(vec![1.0, 2.0])]).unwrap();
        let pp = PiecewisePolynomial::from_segments(&[1.0, 3.0], vec![seg]).unwrap();
        // Local time: p(t) = 1 + 2 (t - 1)
        assert_relative_eq!(pp.value(2.0).unwrap()[(0, 0)], 3.0);
        assert_eq!(pp.segment_index(2.5).unwrap(), 0);
    }
}
