//! Expression evaluators for the two contexts.

use super::{Expr, Operator, Unit, CPU_SYS, CPU_TOT, CPU_USER, PROC_ID};
use thiserror::Error;

/// Sample-time evaluation failures, rendered differently by columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EvalError {
    /// A referenced value is missing or could not be read.
    #[error("invalid input")]
    InvalidInput,

    /// The result is mathematically undefined (division by zero).
    #[error("undefined value")]
    UndefinedValue,
}

/// Latest and previous reads of one counter; `None` marks a failed read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSample {
    pub current: Option<u64>,
    pub previous: Option<u64>,
}

/// Per-task values visible to column expressions.
pub trait SampleSource {
    /// Samples of the counter declared under `alias`, `None` if no such alias.
    fn counter(&self, alias: &str) -> Option<CounterSample>;
    fn cpu_total(&self) -> f64;
    fn cpu_system(&self) -> f64;
    fn cpu_user(&self) -> f64;
    /// Processor last seen running the task, if ever observed.
    fn processor(&self) -> Option<u32>;
}

/// Evaluates a column expression against one task's samples.
pub fn evaluate_column<S: SampleSource + ?Sized>(expr: &Expr, source: &S) -> Result<f64, EvalError> {
    match expr {
        Expr::Unit(unit) => evaluate_unit(unit, source),
        Expr::Op { op, lhs, rhs } => {
            let left = evaluate_column(lhs, source)?;
            let right = evaluate_column(rhs, source)?;
            match op {
                Operator::Add => Ok(left + right),
                Operator::Sub => Ok(left - right),
                Operator::Mul => Ok(left * right),
                Operator::Div => {
                    if right == 0.0 {
                        Err(EvalError::UndefinedValue)
                    } else {
                        Ok(left / right)
                    }
                }
                Operator::Shl | Operator::Shr | Operator::And | Operator::Or => {
                    Err(EvalError::InvalidInput)
                }
            }
        }
    }
}

fn evaluate_unit<S: SampleSource + ?Sized>(unit: &Unit, source: &S) -> Result<f64, EvalError> {
    match unit {
        Unit::Integer(v) => Ok(*v as f64),
        Unit::Float(v) => Ok(*v),
        Unit::Ref { name, delta } => match name.as_str() {
            CPU_TOT => Ok(source.cpu_total()),
            CPU_SYS => Ok(source.cpu_system()),
            CPU_USER => Ok(source.cpu_user()),
            PROC_ID => source
                .processor()
                .map(f64::from)
                .ok_or(EvalError::InvalidInput),
            alias => {
                let sample = source.counter(alias).ok_or(EvalError::InvalidInput)?;
                let current = sample.current.ok_or(EvalError::InvalidInput)?;
                if *delta {
                    let previous = sample.previous.ok_or(EvalError::InvalidInput)?;
                    Ok(current.wrapping_sub(previous) as f64)
                } else {
                    Ok(current as f64)
                }
            }
        },
    }
}

/// Integer evaluator for counter configs.
///
/// Unresolvable names and operators outside `< > & |` do not abort the
/// evaluation: they count as errors and contribute zero. Callers check
/// `errors()` afterwards.
pub struct ConfigEvaluator<R> {
    resolve: R,
    errors: usize,
}

impl<R> ConfigEvaluator<R>
where
    R: Fn(&str) -> Option<u64>,
{
    pub fn new(resolve: R) -> Self {
        Self { resolve, errors: 0 }
    }

    /// Number of errors seen since construction.
    pub fn errors(&self) -> usize {
        self.errors
    }

    pub fn evaluate(&mut self, expr: &Expr) -> u64 {
        match expr {
            Expr::Unit(Unit::Integer(v)) => *v,
            Expr::Unit(Unit::Float(v)) => {
                if v.is_finite() && *v >= 0.0 && v.fract() == 0.0 && *v <= u64::MAX as f64 {
                    *v as u64
                } else {
                    self.errors += 1;
                    0
                }
            }
            Expr::Unit(Unit::Ref { name, .. }) => match (self.resolve)(name) {
                Some(v) => v,
                None => {
                    self.errors += 1;
                    0
                }
            },
            Expr::Op { op, lhs, rhs } => {
                let left = self.evaluate(lhs);
                let right = self.evaluate(rhs);
                match op {
                    Operator::Or => left | right,
                    Operator::And => left & right,
                    Operator::Shl => self.shift(left, right, u64::checked_shl),
                    Operator::Shr => self.shift(left, right, u64::checked_shr),
                    Operator::Add | Operator::Sub | Operator::Mul | Operator::Div => {
                        self.errors += 1;
                        0
                    }
                }
            }
        }
    }

    fn shift(&mut self, value: u64, by: u64, f: fn(u64, u32) -> Option<u64>) -> u64 {
        match u32::try_from(by).ok().and_then(|by| f(value, by)) {
            Some(v) => v,
            None => {
                self.errors += 1;
                0
            }
        }
    }
}
