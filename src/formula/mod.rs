//! Formula evaluation for calculated parameters.
//!
//! A parameter may declare a formula over named variables, e.g.
//! `(titre * normality * 0.1) / weight`. At report time the submitted
//! variable values are substituted and the expression evaluated.
//!
//! The grammar is deliberately narrow: numbers, variables, `+ - * / % ^`,
//! parentheses and a fixed set of math functions for unit conversions.
//! Comparison and logical operators are rejected outright rather than being
//! coerced to numbers.
//!
//! Evaluation is behind the `FormulaEvaluator` trait so the report lifecycle
//! can be handed a different engine without changes.

pub mod lexer;
pub mod parser;

use std::collections::BTreeMap;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    #[error("Formula is empty")]
    Empty,

    #[error("Syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("Operator '{0}' is not permitted in formulas")]
    ForbiddenOperator(String),

    #[error("Unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    #[error("Function '{function}' takes {expected} argument(s), got {found}")]
    Arity {
        function: String,
        expected: String,
        found: usize,
    },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Result is not a finite number")]
    NonFinite,
}

/// Evaluates an arithmetic expression against variable values.
pub trait FormulaEvaluator: Send + Sync {
    fn evaluate(&self, expr: &str, vars: &BTreeMap<String, f64>) -> Result<f64, FormulaError>;
}

impl<T: FormulaEvaluator + ?Sized> FormulaEvaluator for Box<T> {
    fn evaluate(&self, expr: &str, vars: &BTreeMap<String, f64>) -> Result<f64, FormulaError> {
        (**self).evaluate(expr, vars)
    }
}

impl<T: FormulaEvaluator + ?Sized> FormulaEvaluator for &T {
    fn evaluate(&self, expr: &str, vars: &BTreeMap<String, f64>) -> Result<f64, FormulaError> {
        (**self).evaluate(expr, vars)
    }
}

/// Default evaluator: arithmetic only.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArithmeticEvaluator;

impl ArithmeticEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl FormulaEvaluator for ArithmeticEvaluator {
    fn evaluate(&self, expr: &str, vars: &BTreeMap<String, f64>) -> Result<f64, FormulaError> {
        let tree = parser::parse(expr)?;
        let value = parser::eval(&tree, vars)?;
        if !value.is_finite() {
            return Err(FormulaError::NonFinite);
        }
        Ok(value)
    }
}

/// Check a formula at catalogue time: it must parse, call only known
/// functions with the right arity, and reference only `variables` (or the
/// built-in constants).
pub fn validate_formula(expr: &str, variables: &[String]) -> Result<(), FormulaError> {
    let tree = parser::parse(expr)?;
    parser::check_identifiers(&tree, variables)
}

/// Render a computed value the way it is stored on a report:
/// shortest representation that round-trips (`5` not `5.0`).
pub fn format_value(value: f64) -> String {
    if value == 0.0 {
        // Avoid "-0".
        return "0".into();
    }
    value.to_string()
}
