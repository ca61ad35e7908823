//! Symbolic expressions over decision variables
//!
//! A small expression tree used to write costs and constraints:
//!
//! ```text
//! e ::= c | v | e + e | e · e | e / e | -e | eⁿ | sin e | cos e | exp e | √e
//! ```
//!
//! Constructors fold constants (0 + e = e, 1 · e = e, ...), so templates
//! substituted with numeric time steps collapse to compact trees.
//! Expressions support evaluation, substitution of variables by
//! expressions, and exact symbolic differentiation.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, Div, Index, Mul, Neg, Sub};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;

static NEXT_VARIABLE_ID: AtomicUsize = AtomicUsize::new(0);

/// Symbolic errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SymbolicError {
    #[error("Variable '{0}' has no value")]
    UnboundVariable(String),
    #[error("Length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },
}

/// Scalar symbolic variable
///
/// Identity is a process-wide unique id; the name is only for display.
#[derive(Clone, Debug)]
pub struct Variable {
    id: usize,
    name: Arc<str>,
}

impl Variable {
    pub fn new(name: &str) -> Self {
        Self {
            id: NEXT_VARIABLE_ID.fetch_add(1, Ordering::Relaxed),
            name: Arc::from(name),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Variable {}

impl Hash for Variable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Variable {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Variable {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Symbolic scalar expression
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Constant(f64),
    Var(Variable),
    Add(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    Powi(Box<Expr>, i32),
    Sin(Box<Expr>),
    Cos(Box<Expr>),
    Exp(Box<Expr>),
    Sqrt(Box<Expr>),
}

fn sum(a: Expr, b: Expr) -> Expr {
    match (&a, &b) {
        (Expr::Constant(x), Expr::Constant(y)) => Expr::Constant(x + y),
        (Expr::Constant(x), _) if *x == 0.0 => b,
        (_, Expr::Constant(y)) if *y == 0.0 => a,
        _ => Expr::Add(Box::new(a), Box::new(b)),
    }
}

fn difference(a: Expr, b: Expr) -> Expr {
    sum(a, negate(b))
}

fn product(a: Expr, b: Expr) -> Expr {
    match (&a, &b) {
        (Expr::Constant(x), Expr::Constant(y)) => Expr::Constant(x * y),
        (Expr::Constant(x), _) | (_, Expr::Constant(x)) if *x == 0.0 => Expr::Constant(0.0),
        (Expr::Constant(x), _) if *x == 1.0 => b,
        (_, Expr::Constant(y)) if *y == 1.0 => a,
        (Expr::Constant(x), _) if *x == -1.0 => negate(b),
        (_, Expr::Constant(y)) if *y == -1.0 => negate(a),
        _ => Expr::Mul(Box::new(a), Box::new(b)),
    }
}

fn quotient(a: Expr, b: Expr) -> Expr {
    match (&a, &b) {
        (Expr::Constant(x), Expr::Constant(y)) => Expr::Constant(x / y),
        (Expr::Constant(x), _) if *x == 0.0 => Expr::Constant(0.0),
        (_, Expr::Constant(y)) if *y == 1.0 => a,
        _ => Expr::Div(Box::new(a), Box::new(b)),
    }
}

fn negate(a: Expr) -> Expr {
    match a {
        Expr::Constant(x) => Expr::Constant(-x),
        Expr::Neg(inner) => *inner,
        other => Expr::Neg(Box::new(other)),
    }
}

impl Expr {
    pub fn constant(value: f64) -> Self {
        Expr::Constant(value)
    }

    pub fn var(variable: &Variable) -> Self {
        Expr::Var(variable.clone())
    }

    pub fn zero() -> Self {
        Expr::Constant(0.0)
    }

    /// Integer power
    pub fn powi(&self, n: i32) -> Expr {
        match (self, n) {
            (_, 0) => Expr::Constant(1.0),
            (_, 1) => self.clone(),
            (Expr::Constant(x), _) => Expr::Constant(x.powi(n)),
            _ => Expr::Powi(Box::new(self.clone()), n),
        }
    }

    pub fn squared(&self) -> Expr {
        self.powi(2)
    }

    pub fn sin(&self) -> Expr {
        match self {
            Expr::Constant(x) => Expr::Constant(x.sin()),
            _ => Expr::Sin(Box::new(self.clone())),
        }
    }

    pub fn cos(&self) -> Expr {
        match self {
            Expr::Constant(x) => Expr::Constant(x.cos()),
            _ => Expr::Cos(Box::new(self.clone())),
        }
    }

    pub fn exp(&self) -> Expr {
        match self {
            Expr::Constant(x) => Expr::Constant(x.exp()),
            _ => Expr::Exp(Box::new(self.clone())),
        }
    }

    pub fn sqrt(&self) -> Expr {
        match self {
            Expr::Constant(x) => Expr::Constant(x.sqrt()),
            _ => Expr::Sqrt(Box::new(self.clone())),
        }
    }

    /// Value if the expression is a constant
    pub fn as_constant(&self) -> Option<f64> {
        match self {
            Expr::Constant(x) => Some(*x),
            _ => None,
        }
    }

    /// Variable if the expression is a bare variable
    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            Expr::Var(v) => Some(v),
            _ => None,
        }
    }

    /// Evaluate with a fallible variable lookup
    pub fn evaluate_with<F, E>(&self, lookup: &F) -> Result<f64, E>
    where
        F: Fn(&Variable) -> Result<f64, E>,
    {
        Ok(match self {
            Expr::Constant(x) => *x,
            Expr::Var(v) => lookup(v)?,
            Expr::Add(a, b) => a.evaluate_with(lookup)? + b.evaluate_with(lookup)?,
            Expr::Mul(a, b) => a.evaluate_with(lookup)? * b.evaluate_with(lookup)?,
            Expr::Div(a, b) => a.evaluate_with(lookup)? / b.evaluate_with(lookup)?,
            Expr::Neg(a) => -a.evaluate_with(lookup)?,
            Expr::Powi(a, n) => a.evaluate_with(lookup)?.powi(*n),
            Expr::Sin(a) => a.evaluate_with(lookup)?.sin(),
            Expr::Cos(a) => a.evaluate_with(lookup)?.cos(),
            Expr::Exp(a) => a.evaluate_with(lookup)?.exp(),
            Expr::Sqrt(a) => a.evaluate_with(lookup)?.sqrt(),
        })
    }

    /// Evaluate with values from a map
    pub fn evaluate(&self, values: &HashMap<Variable, f64>) -> Result<f64, SymbolicError> {
        self.evaluate_with(&|v: &Variable| {
            values
                .get(v)
                .copied()
                .ok_or_else(|| SymbolicError::UnboundVariable(v.name().to_string()))
        })
    }

    /// Replace variables by expressions
    pub fn substitute(&self, map: &HashMap<Variable, Expr>) -> Expr {
        match self {
            Expr::Constant(_) => self.clone(),
            Expr::Var(v) => map.get(v).cloned().unwrap_or_else(|| self.clone()),
            Expr::Add(a, b) => sum(a.substitute(map), b.substitute(map)),
            Expr::Mul(a, b) => product(a.substitute(map), b.substitute(map)),
            Expr::Div(a, b) => quotient(a.substitute(map), b.substitute(map)),
            Expr::Neg(a) => negate(a.substitute(map)),
            Expr::Powi(a, n) => a.substitute(map).powi(*n),
            Expr::Sin(a) => a.substitute(map).sin(),
            Expr::Cos(a) => a.substitute(map).cos(),
            Expr::Exp(a) => a.substitute(map).exp(),
            Expr::Sqrt(a) => a.substitute(map).sqrt(),
        }
    }

    /// ∂e/∂v
    pub fn differentiate(&self, v: &Variable) -> Expr {
        match self {
            Expr::Constant(_) => Expr::zero(),
            Expr::Var(w) => Expr::Constant(if w == v { 1.0 } else { 0.0 }),
            Expr::Add(a, b) => sum(a.differentiate(v), b.differentiate(v)),
            Expr::Mul(a, b) => sum(
                product(a.differentiate(v), (**b).clone()),
                product((**a).clone(), b.differentiate(v)),
            ),
            Expr::Div(a, b) => quotient(
                difference(
                    product(a.differentiate(v), (**b).clone()),
                    product((**a).clone(), b.differentiate(v)),
                ),
                b.powi(2),
            ),
            Expr::Neg(a) => negate(a.differentiate(v)),
            Expr::Powi(a, n) => product(
                product(Expr::Constant(f64::from(*n)), a.powi(n - 1)),
                a.differentiate(v),
            ),
            Expr::Sin(a) => product(a.cos(), a.differentiate(v)),
            Expr::Cos(a) => negate(product(a.sin(), a.differentiate(v))),
            Expr::Exp(a) => product(a.exp(), a.differentiate(v)),
            Expr::Sqrt(a) => quotient(a.differentiate(v), product(Expr::Constant(2.0), a.sqrt())),
        }
    }

    /// Distinct variables, ordered by id
    pub fn variables(&self) -> Vec<Variable> {
        let mut set = BTreeSet::new();
        self.collect_variables(&mut set);
        set.into_iter().collect()
    }

    fn collect_variables(&self, set: &mut BTreeSet<Variable>) {
        match self {
            Expr::Constant(_) => {}
            Expr::Var(v) => {
                set.insert(v.clone());
            }
            Expr::Add(a, b) | Expr::Mul(a, b) | Expr::Div(a, b) => {
                a.collect_variables(set);
                b.collect_variables(set);
            }
            Expr::Neg(a) | Expr::Powi(a, _) | Expr::Sin(a) | Expr::Cos(a) | Expr::Exp(a) | Expr::Sqrt(a) => {
                a.collect_variables(set)
            }
        }
    }

    /// Constraint `self == rhs`
    pub fn equals(&self, rhs: impl Into<Expr>) -> Formula {
        Formula::between(0.0, difference(self.clone(), rhs.into()), 0.0)
    }

    /// Constraint `self <= rhs`
    pub fn leq(&self, rhs: impl Into<Expr>) -> Formula {
        Formula::between(f64::NEG_INFINITY, difference(self.clone(), rhs.into()), 0.0)
    }

    /// Constraint `self >= rhs`
    pub fn geq(&self, rhs: impl Into<Expr>) -> Formula {
        Formula::between(0.0, difference(self.clone(), rhs.into()), f64::INFINITY)
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::Constant(value)
    }
}

impl From<Variable> for Expr {
    fn from(v: Variable) -> Self {
        Expr::Var(v)
    }
}

impl From<&Variable> for Expr {
    fn from(v: &Variable) -> Self {
        Expr::Var(v.clone())
    }
}

impl From<&Expr> for Expr {
    fn from(e: &Expr) -> Self {
        e.clone()
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $build:ident) => {
        impl $trait<Expr> for Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                $build(self, rhs)
            }
        }

        impl $trait<&Expr> for Expr {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                $build(self, rhs.clone())
            }
        }

        impl $trait<Expr> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                $build(self.clone(), rhs)
            }
        }

        impl $trait<&Expr> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                $build(self.clone(), rhs.clone())
            }
        }

        impl $trait<f64> for Expr {
            type Output = Expr;
            fn $method(self, rhs: f64) -> Expr {
                $build(self, Expr::Constant(rhs))
            }
        }

        impl $trait<f64> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: f64) -> Expr {
                $build(self.clone(), Expr::Constant(rhs))
            }
        }

        impl $trait<Expr> for f64 {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                $build(Expr::Constant(self), rhs)
            }
        }

        impl $trait<&Expr> for f64 {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                $build(Expr::Constant(self), rhs.clone())
            }
        }
    };
}

impl_binary_op!(Add, add, sum);
impl_binary_op!(Sub, sub, difference);
impl_binary_op!(Mul, mul, product);
impl_binary_op!(Div, div, quotient);

impl Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        negate(self)
    }
}

impl Neg for &Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        negate(self.clone())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Constant(x) => write!(f, "{x}"),
            Expr::Var(v) => write!(f, "{v}"),
            Expr::Add(a, b) => write!(f, "({a} + {b})"),
            Expr::Mul(a, b) => write!(f, "({a} * {b})"),
            Expr::Div(a, b) => write!(f, "({a} / {b})"),
            Expr::Neg(a) => write!(f, "-{a}"),
            Expr::Powi(a, n) => write!(f, "{a}^{n}"),
            Expr::Sin(a) => write!(f, "sin({a})"),
            Expr::Cos(a) => write!(f, "cos({a})"),
            Expr::Exp(a) => write!(f, "exp({a})"),
            Expr::Sqrt(a) => write!(f, "sqrt({a})"),
        }
    }
}

/// Vector of expressions
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExprVector(Vec<Expr>);

impl ExprVector {
    pub fn new(elements: Vec<Expr>) -> Self {
        Self(elements)
    }

    pub fn from_variables(vars: &[Variable]) -> Self {
        vars.iter().map(Expr::var).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Expr> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Expr] {
        &self.0
    }

    /// Σ aᵢ bᵢ
    pub fn dot(&self, other: &ExprVector) -> Result<Expr, SymbolicError> {
        if self.len() != other.len() {
            return Err(SymbolicError::LengthMismatch {
                left: self.len(),
                right: other.len(),
            });
        }
        Ok(self
            .iter()
            .zip(other.iter())
            .fold(Expr::zero(), |acc, (a, b)| acc + a * b))
    }

    /// Σ aᵢ²
    pub fn squared_norm(&self) -> Expr {
        self.iter().fold(Expr::zero(), |acc, a| acc + a.squared())
    }

    /// Element-wise substitution
    pub fn substitute(&self, map: &HashMap<Variable, Expr>) -> ExprVector {
        self.iter().map(|e| e.substitute(map)).collect()
    }

    /// One formula per element: `self[i] == values[i]`
    pub fn equals(&self, values: &[f64]) -> Result<Vec<Formula>, SymbolicError> {
        if self.len() != values.len() {
            return Err(SymbolicError::LengthMismatch {
                left: self.len(),
                right: values.len(),
            });
        }
        Ok(self.iter().zip(values).map(|(e, &v)| e.equals(v)).collect())
    }
}

impl Index<usize> for ExprVector {
    type Output = Expr;

    fn index(&self, index: usize) -> &Expr {
        &self.0[index]
    }
}

impl FromIterator<Expr> for ExprVector {
    fn from_iter<I: IntoIterator<Item = Expr>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ExprVector {
    type Item = &'a Expr;
    type IntoIter = std::slice::Iter<'a, Expr>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Scalar constraint `lower ≤ expr ≤ upper`
#[derive(Clone, Debug, PartialEq)]
pub struct Formula {
    pub expr: Expr,
    pub lower: f64,
    pub upper: f64,
}

impl Formula {
    pub fn between(lower: f64, expr: Expr, upper: f64) -> Self {
        Self { expr, lower, upper }
    }

    /// Equivalent bound on a single variable, if the formula is
    /// `lower ≤ v + c ≤ upper`
    pub fn as_variable_bound(&self) -> Option<(Variable, f64, f64)> {
        let (v, offset) = match &self.expr {
            Expr::Var(v) => (v, 0.0),
            Expr::Add(a, b) => match (a.as_ref(), b.as_ref()) {
                (Expr::Var(v), Expr::Constant(c)) | (Expr::Constant(c), Expr::Var(v)) => (v, *c),
                _ => return None,
            },
            _ => return None,
        };
        Some((v.clone(), self.lower - offset, self.upper - offset))
    }

    /// Replace variables by expressions in the constrained expression
    pub fn substitute(&self, map: &HashMap<Variable, Expr>) -> Formula {
        Formula {
            expr: self.expr.substitute(map),
            lower: self.lower,
            upper: self.upper,
        }
    }

    /// Bounds hold with equality
    pub fn is_equality(&self) -> bool {
        self.lower == self.upper
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <= {} <= {}", self.lower, self.expr, self.upper)
    }
}
