//! Screens: a set of counters plus the columns computed from them.
//!
//! Counters are declared with a type name and a config expression that is
//! evaluated once, at declaration time. Columns are expressions over counter
//! aliases and the pseudo-metrics (`CPU_TOT`, `CPU_SYS`, `CPU_USER`,
//! `PROC_ID`), validated when added and evaluated every refresh.

mod builtin;
mod catalog;
mod def;
mod format;
mod layout;
mod target;

pub use builtin::builtin_screens;
pub use catalog::ScreenCatalog;
pub use def::{ColumnDef, CounterDef, ScreenDef};
pub use format::{FormatError, ValueFormat};
pub use layout::{HeaderHighlight, RowLayout};
pub(crate) use layout::USER_WIDTH;
pub use target::{CounterTarget, CpuInfo, HOST_CPU};

use crate::counters::events::{config_code, config_name, type_code, type_name};
use crate::counters::EventSelector;
use crate::expr::{is_pseudo_metric, ConfigEvaluator, EvalError, Expr, Operator, ParseError};
use thiserror::Error;

/// Reasons a counter or column was rejected by a screen.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScreenError {
    #[error("screen '{screen}', counter '{alias}': invalid alias")]
    InvalidAlias { screen: String, alias: String },

    #[error("screen '{screen}', counter '{alias}': alias already defined")]
    DuplicateAlias { screen: String, alias: String },

    #[error("screen '{screen}', counter '{alias}': unknown counter type '{kind}'")]
    UnknownType {
        screen: String,
        alias: String,
        kind: String,
    },

    #[error("screen '{screen}', counter '{alias}': cannot parse config: {source}")]
    ConfigSyntax {
        screen: String,
        alias: String,
        #[source]
        source: ParseError,
    },

    #[error("screen '{screen}', counter '{alias}': {errors} error(s) evaluating config '{config}'")]
    ConfigValue {
        screen: String,
        alias: String,
        config: String,
        errors: usize,
    },

    #[error("screen '{screen}', column '{header}': cannot parse expression: {source}")]
    ColumnSyntax {
        screen: String,
        header: String,
        #[source]
        source: ParseError,
    },

    #[error("screen '{screen}', column '{header}': unknown counter '{alias}'")]
    UnknownCounter {
        screen: String,
        header: String,
        alias: String,
    },

    #[error("screen '{screen}', column '{header}': counter '{alias}' is not available on this CPU")]
    CounterNotAvailable {
        screen: String,
        header: String,
        alias: String,
    },

    #[error("screen '{screen}', column '{header}': operator '{op}' is only allowed in counter configs")]
    BitwiseInColumn {
        screen: String,
        header: String,
        op: Operator,
    },

    #[error("screen '{screen}', column '{header}': {source}")]
    ColumnFormat {
        screen: String,
        header: String,
        #[source]
        source: FormatError,
    },

    #[error("no screen with index {0}")]
    NoSuchScreen(usize),
}

/// A counter opened for every thread while the screen is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterSpec {
    pub alias: String,
    pub kind: u32,
    pub config: u64,
    /// Number of column references.
    pub used: usize,
}

impl CounterSpec {
    pub fn selector(&self) -> EventSelector {
        EventSelector {
            kind: self.kind,
            config: self.config,
        }
    }

    /// Definition equivalent to this counter, with symbolic names where known.
    pub fn to_def(&self) -> CounterDef {
        let kind = type_name(self.kind)
            .map(str::to_string)
            .unwrap_or_else(|| self.kind.to_string());
        let config = config_name(self.kind, self.config)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{:#x}", self.config));
        CounterDef::new(&self.alias, &kind, &config)
    }
}

/// A displayed column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub header: String,
    pub format: ValueFormat,
    pub desc: Option<String>,
    pub expr: Expr,
    /// Shown when the value is undefined (division by zero).
    pub empty_field: String,
    /// Shown when an input could not be read.
    pub error_field: String,
}

impl ColumnSpec {
    fn new(header: &str, format: ValueFormat, desc: Option<&str>, expr: Expr) -> Self {
        let width = header.chars().count().max(1);
        Self {
            header: header.to_string(),
            format,
            desc: desc.map(str::to_string),
            expr,
            empty_field: " ".repeat(width),
            error_field: format!("{}?", " ".repeat(width - 1)),
        }
    }

    /// Renders one evaluation result as a cell.
    pub fn render(&self, value: Result<f64, EvalError>) -> String {
        match value {
            Ok(v) => self.format.format(v),
            Err(EvalError::UndefinedValue) => self.empty_field.clone(),
            Err(EvalError::InvalidInput) => self.error_field.clone(),
        }
    }

    pub fn to_def(&self) -> ColumnDef {
        ColumnDef {
            header: self.header.clone(),
            format: self.format.to_string(),
            desc: self.desc.clone(),
            expr: self.expr.to_string(),
        }
    }
}

fn is_valid_alias(alias: &str) -> bool {
    let mut chars = alias.chars();
    let first_ok = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    first_ok
        && alias.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && alias != "delta"
        && !is_pseudo_metric(alias)
}

/// Counters and columns of one view.
#[derive(Debug, Clone)]
pub struct Screen {
    name: String,
    desc: Option<String>,
    cpu: CpuInfo,
    counters: Vec<CounterSpec>,
    columns: Vec<ColumnSpec>,
    // aliases whose target did not match this CPU
    skipped: Vec<String>,
}

impl Screen {
    /// Screen for the running machine.
    pub fn new(name: &str, desc: Option<&str>) -> Self {
        Self::for_cpu(name, desc, HOST_CPU.clone())
    }

    /// Screen whose target filters are checked against `cpu`.
    pub fn for_cpu(name: &str, desc: Option<&str>, cpu: CpuInfo) -> Self {
        Self {
            name: name.to_string(),
            desc: desc.map(str::to_string),
            cpu,
            counters: Vec::new(),
            columns: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn desc(&self) -> Option<&str> {
        self.desc.as_deref()
    }

    pub fn counters(&self) -> &[CounterSpec] {
        &self.counters
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn counter_index(&self, alias: &str) -> Option<usize> {
        self.counters.iter().position(|c| c.alias == alias)
    }

    /// Declares a counter. Returns `Ok(None)` when `target` excludes this
    /// CPU; columns referencing such a counter are then refused with
    /// `CounterNotAvailable`.
    pub fn add_counter(
        &mut self,
        alias: &str,
        config_expr: &str,
        kind: &str,
        target: Option<&CounterTarget>,
    ) -> Result<Option<usize>, ScreenError> {
        let alias = alias.trim();
        if !is_valid_alias(alias) {
            return Err(ScreenError::InvalidAlias {
                screen: self.name.clone(),
                alias: alias.to_string(),
            });
        }
        if let Some(target) = target {
            if !target.matches(&self.cpu) {
                self.skipped.push(alias.to_string());
                return Ok(None);
            }
        }
        if self.counter_index(alias).is_some() {
            return Err(ScreenError::DuplicateAlias {
                screen: self.name.clone(),
                alias: alias.to_string(),
            });
        }

        let kind = type_code(kind).ok_or_else(|| ScreenError::UnknownType {
            screen: self.name.clone(),
            alias: alias.to_string(),
            kind: kind.to_string(),
        })?;

        let expr = Expr::parse(config_expr).map_err(|source| ScreenError::ConfigSyntax {
            screen: self.name.clone(),
            alias: alias.to_string(),
            source,
        })?;
        let mut evaluator = ConfigEvaluator::new(config_code);
        let config = evaluator.evaluate(&expr);
        if evaluator.errors() > 0 {
            return Err(ScreenError::ConfigValue {
                screen: self.name.clone(),
                alias: alias.to_string(),
                config: config_expr.to_string(),
                errors: evaluator.errors(),
            });
        }

        self.skipped.retain(|a| a != alias);
        self.counters.push(CounterSpec {
            alias: alias.to_string(),
            kind,
            config,
            used: 0,
        });
        Ok(Some(self.counters.len() - 1))
    }

    /// Adds a column computed by `expr`, rendered with the printf-like
    /// `format`.
    pub fn add_column(
        &mut self,
        header: &str,
        format: &str,
        desc: Option<&str>,
        expr: &str,
    ) -> Result<usize, ScreenError> {
        let format = ValueFormat::parse(format).map_err(|source| ScreenError::ColumnFormat {
            screen: self.name.clone(),
            header: header.to_string(),
            source,
        })?;
        let expr = Expr::parse(expr).map_err(|source| ScreenError::ColumnSyntax {
            screen: self.name.clone(),
            header: header.to_string(),
            source,
        })?;
        if let Some(op) = expr.find_bitwise() {
            return Err(ScreenError::BitwiseInColumn {
                screen: self.name.clone(),
                header: header.to_string(),
                op,
            });
        }

        let mut referenced = Vec::new();
        for name in expr.references() {
            if is_pseudo_metric(name) {
                continue;
            }
            match self.counter_index(name) {
                Some(idx) => referenced.push(idx),
                None if self.skipped.iter().any(|a| a == name) => {
                    return Err(ScreenError::CounterNotAvailable {
                        screen: self.name.clone(),
                        header: header.to_string(),
                        alias: name.to_string(),
                    })
                }
                None => {
                    return Err(ScreenError::UnknownCounter {
                        screen: self.name.clone(),
                        header: header.to_string(),
                        alias: name.to_string(),
                    })
                }
            }
        }
        for idx in referenced {
            self.counters[idx].used += 1;
        }

        self.columns.push(ColumnSpec::new(header, format, desc, expr));
        Ok(self.columns.len() - 1)
    }

    /// Drops counters no column references. Returns how many were dropped.
    pub fn prune_unused(&mut self) -> usize {
        let before = self.counters.len();
        self.counters.retain(|c| c.used > 0);
        before - self.counters.len()
    }

    /// Definition reproducing this screen.
    pub fn to_def(&self) -> ScreenDef {
        ScreenDef {
            name: self.name.clone(),
            desc: self.desc.clone(),
            arch: None,
            models: Vec::new(),
            counters: self.counters.iter().map(CounterSpec::to_def).collect(),
            columns: self.columns.iter().map(ColumnSpec::to_def).collect(),
        }
    }
}
