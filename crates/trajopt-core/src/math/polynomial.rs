//! Scalar polynomials
//!
//! A trajectory segment stores one polynomial per matrix entry, expressed in
//! the segment-local variable s = t - t_i:
//!
//! ```text
//! p(s) = c₀ + c₁ s + c₂ s² + ... + c_d s^d
//! ```

use std::ops::{Add, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

/// Univariate polynomial with coefficients in ascending order of power
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polynomial {
    /// c₀, c₁, ..., c_d (never empty)
    coefficients: Vec<f64>,
}

impl Polynomial {
    /// Create a polynomial from ascending coefficients
    ///
    /// An empty coefficient list is the zero polynomial.
    pub fn new(coefficients: Vec<f64>) -> Self {
        if coefficients.is_empty() {
            return Self::zero();
        }
        Self { coefficients }
    }

    /// The zero polynomial
    pub fn zero() -> Self {
        Self { coefficients: vec![0.0] }
    }

    /// Constant polynomial p(s) = c
    pub fn constant(c: f64) -> Self {
        Self { coefficients: vec![c] }
    }

    /// Linear polynomial p(s) = c0 + c1 s
    pub fn linear(c0: f64, c1: f64) -> Self {
        Self { coefficients: vec![c0, c1] }
    }

    /// Nominal degree (number of stored coefficients minus one)
    pub fn degree(&self) -> usize {
        self.coefficients.len() - 1
    }

    /// Ascending coefficients
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Evaluate at s using Horner's method
    pub fn evaluate(&self, s: f64) -> f64 {
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, &c| acc * s + c)
    }

    /// Evaluate the n-th derivative at s
    pub fn evaluate_derivative(&self, s: f64, order: usize) -> f64 {
        self.derivative(order).evaluate(s)
    }

    /// n-th derivative
    pub fn derivative(&self, order: usize) -> Self {
        let mut coefficients = self.coefficients.clone();
        for _ in 0..order {
            if coefficients.len() <= 1 {
                return Self::zero();
            }
            coefficients = coefficients
                .iter()
                .enumerate()
                .skip(1)
                .map(|(k, &c)| k as f64 * c)
                .collect();
        }
        Self::new(coefficients)
    }

    /// Antiderivative with zero integration constant
    pub fn antiderivative(&self) -> Self {
        let mut coefficients = Vec::with_capacity(self.coefficients.len() + 1);
        coefficients.push(0.0);
        coefficients.extend(
            self.coefficients
                .iter()
                .enumerate()
                .map(|(k, &c)| c / (k + 1) as f64),
        );
        Self::new(coefficients)
    }

    /// Multiply every coefficient by k
    pub fn scale(&self, k: f64) -> Self {
        Self::new(self.coefficients.iter().map(|c| c * k).collect())
    }

    /// Re-expand around a shifted origin: q(s) = p(s + offset)
    pub fn shift(&self, offset: f64) -> Self {
        // Horner's scheme on polynomials: q = (...(c_d (s+a) + c_{d-1})(s+a) ...)
        let base = Polynomial::linear(offset, 1.0);
        self.coefficients
            .iter()
            .rev()
            .fold(Polynomial::zero(), |acc, &c| &(&acc * &base) + &Polynomial::constant(c))
    }

    /// True if all coefficients are zero
    pub fn is_zero(&self) -> bool {
        self.coefficients.iter().all(|&c| c == 0.0)
    }
}

impl Default for Polynomial {
    fn default() -> Self {
        Self::zero()
    }
}

impl Add for &Polynomial {
    type Output = Polynomial;

    fn add(self, rhs: &Polynomial) -> Polynomial {
        let n = self.coefficients.len().max(rhs.coefficients.len());
        let coefficients = (0..n)
            .map(|k| {
                self.coefficients.get(k).copied().unwrap_or(0.0)
                    + rhs.coefficients.get(k).copied().unwrap_or(0.0)
            })
            .collect();
        Polynomial::new(coefficients)
    }
}

impl Sub for &Polynomial {
    type Output = Polynomial;

    fn sub(self, rhs: &Polynomial) -> Polynomial {
        self + &(-rhs)
    }
}

impl Neg for &Polynomial {
    type Output = Polynomial;

    fn neg(self) -> Polynomial {
        self.scale(-1.0)
    }
}

impl Mul for &Polynomial {
    type Output = Polynomial;

    fn mul(self, rhs: &Polynomial) -> Polynomial {
        let mut coefficients = vec![0.0; self.coefficients.len() + rhs.coefficients.len() - 1];
        for (i, a) in self.coefficients.iter().enumerate() {
            for (j, b) in rhs.coefficients.iter().enumerate() {
                coefficients[i + j] += a * b;
            }
        }
        Polynomial::new(coefficients)
    }
}

impl Mul<f64> for &Polynomial {
    type Output = Polynomial;

    fn mul(self, rhs: f64) -> Polynomial {
        self.scale(rhs)
    }
}
