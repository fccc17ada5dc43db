//! Serializable screen definitions, as found in configuration files.

use super::target::CounterTarget;
use serde::{Deserialize, Serialize};

fn default_counter_type() -> String {
    "PERF_TYPE_HARDWARE".to_string()
}

/// A counter to open for every monitored thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterDef {
    pub alias: String,
    /// Config expression, e.g. `PERF_COUNT_HW_CPU_CYCLES` or `0x01c2`.
    pub config: String,
    #[serde(rename = "type", default = "default_counter_type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<String>,
}

impl CounterDef {
    pub fn new(alias: &str, kind: &str, config: &str) -> Self {
        Self {
            alias: alias.to_string(),
            config: config.to_string(),
            kind: kind.to_string(),
            arch: None,
            models: Vec::new(),
        }
    }

    /// Restricts the counter to the given display models.
    pub fn on_models(mut self, models: &[&str]) -> Self {
        self.models = models.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn target(&self) -> CounterTarget {
        CounterTarget {
            arch: self.arch.clone(),
            models: self.models.clone(),
        }
    }
}

/// A displayed column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub header: String,
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    pub expr: String,
}

impl ColumnDef {
    pub fn new(header: &str, format: &str, expr: &str, desc: &str) -> Self {
        Self {
            header: header.to_string(),
            format: format.to_string(),
            desc: if desc.is_empty() {
                None
            } else {
                Some(desc.to_string())
            },
            expr: expr.to_string(),
        }
    }
}

/// A whole screen: counters first, then the columns computed from them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<String>,
    #[serde(default)]
    pub counters: Vec<CounterDef>,
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
}

impl ScreenDef {
    pub fn target(&self) -> CounterTarget {
        CounterTarget {
            arch: self.arch.clone(),
            models: self.models.clone(),
        }
    }
}
