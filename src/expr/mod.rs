//! Expression language shared by counter configs and screen columns.
//!
//! One grammar, two evaluation contexts:
//! - `ConfigEvaluator`: integer bitmask arithmetic over symbolic event names,
//!   run once when a screen is built to compute a counter's `config` value.
//! - `evaluate_column`: floating-point arithmetic over a thread's counter
//!   samples and CPU statistics, run every refresh cycle.
//!
//! Compiled expressions render back to text through `Display`, which is what
//! the `export` command writes out.

mod eval;
mod parser;

pub use eval::{evaluate_column, ConfigEvaluator, CounterSample, EvalError, SampleSource};
pub use parser::{parse_expression, ParseError};

use std::fmt;

/// Total CPU usage of the task, in percent.
pub const CPU_TOT: &str = "CPU_TOT";
/// Kernel-mode CPU usage of the task, in percent.
pub const CPU_SYS: &str = "CPU_SYS";
/// User-mode CPU usage of the task, in percent.
pub const CPU_USER: &str = "CPU_USER";
/// Processor the task was last seen running on.
pub const PROC_ID: &str = "PROC_ID";

/// Names reserved for per-task statistics that are not hardware counters.
pub const PSEUDO_METRICS: [&str; 4] = [CPU_TOT, CPU_SYS, CPU_USER, PROC_ID];

/// Returns true when `name` is one of the reserved pseudo-metrics.
pub fn is_pseudo_metric(name: &str) -> bool {
    PSEUDO_METRICS.contains(&name)
}

/// Binary operators of the expression language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    /// `<`: shift left (config context only).
    Shl,
    /// `>`: shift right (config context only).
    Shr,
    /// `&`: bitwise and (config context only).
    And,
    /// `|`: bitwise or (config context only).
    Or,
}

impl Operator {
    /// Character used for this operator in expression text.
    pub fn symbol(self) -> char {
        match self {
            Operator::Add => '+',
            Operator::Sub => '-',
            Operator::Mul => '*',
            Operator::Div => '/',
            Operator::Shl => '<',
            Operator::Shr => '>',
            Operator::And => '&',
            Operator::Or => '|',
        }
    }

    pub(crate) fn from_symbol(c: char) -> Option<Self> {
        let op = match c {
            '+' => Operator::Add,
            '-' => Operator::Sub,
            '*' => Operator::Mul,
            '/' => Operator::Div,
            '<' => Operator::Shl,
            '>' => Operator::Shr,
            '&' => Operator::And,
            '|' => Operator::Or,
            _ => return None,
        };
        Some(op)
    }

    /// Bitwise operators are only legal when computing counter configs.
    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            Operator::Shl | Operator::Shr | Operator::And | Operator::Or
        )
    }

    /// `*` and `/` bind tighter than everything else.
    pub(crate) fn is_high_precedence(self) -> bool {
        matches!(self, Operator::Mul | Operator::Div)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Leaf of an expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Unit {
    Integer(u64),
    Float(f64),
    /// Reference to a counter alias, pseudo-metric or symbolic event name.
    Ref { name: String, delta: bool },
}

/// Compiled expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Unit(Unit),
    Op {
        op: Operator,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    /// Parses `text` into an expression tree.
    pub fn parse(text: &str) -> Result<Expr, ParseError> {
        parse_expression(text)
    }

    pub fn binary(op: Operator, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Op {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Names referenced anywhere in the tree, in left-to-right order.
    pub fn references(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Unit(Unit::Ref { name, .. }) => out.push(name),
            Expr::Unit(_) => {}
            Expr::Op { lhs, rhs, .. } => {
                lhs.collect_references(out);
                rhs.collect_references(out);
            }
        }
    }

    /// First bitwise operator found in the tree, if any.
    pub fn find_bitwise(&self) -> Option<Operator> {
        match self {
            Expr::Unit(_) => None,
            Expr::Op { op, lhs, rhs } => {
                if op.is_bitwise() {
                    Some(*op)
                } else {
                    lhs.find_bitwise().or_else(|| rhs.find_bitwise())
                }
            }
        }
    }

    /// Alias of a bare, non-delta reference (`CYCLES` but not `delta(CYCLES)`).
    pub fn as_plain_ref(&self) -> Option<&str> {
        match self {
            Expr::Unit(Unit::Ref { name, delta: false }) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Integer(v) => write!(f, "{}", v),
            // `{}` on f64 is the shortest representation that reads back exactly
            Unit::Float(v) => write!(f, "{}", v),
            Unit::Ref { name, delta: true } => write!(f, "delta({})", name),
            Unit::Ref { name, delta: false } => write!(f, "{}", name),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Unit(unit) => write!(f, "{}", unit),
            Expr::Op { op, lhs, rhs } => write!(f, "({} {} {})", lhs, op, rhs),
        }
    }
}
