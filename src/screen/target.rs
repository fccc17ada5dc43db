//! Host CPU identification for architecture- and model-specific counters.
//!
//! Models use Intel's display family/model notation, e.g. `06_2a` for
//! family 6, model 0x2a (Sandy Bridge).

use once_cell::sync::Lazy;
use std::fs;
use std::path::Path;
use tracing::debug;

/// What the running processor is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpuInfo {
    pub arch: String,
    pub vendor: Option<String>,
    pub family: Option<u32>,
    pub model: Option<u32>,
}

impl CpuInfo {
    /// Reads `/proc/cpuinfo` for the running machine.
    pub fn detect() -> Self {
        Self::from_cpuinfo_file(Path::new("/proc/cpuinfo"))
    }

    pub fn from_cpuinfo_file(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(std::env::consts::ARCH, &text),
            Err(e) => {
                debug!("Cannot read {}: {}", path.display(), e);
                Self {
                    arch: std::env::consts::ARCH.to_string(),
                    ..Default::default()
                }
            }
        }
    }

    /// Parses the first processor block of a cpuinfo text.
    pub fn parse(arch: &str, cpuinfo: &str) -> Self {
        let mut info = Self {
            arch: arch.to_string(),
            ..Default::default()
        };
        for line in cpuinfo.lines() {
            if line.trim().is_empty() {
                if info.vendor.is_some() {
                    break;
                }
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "vendor_id" => info.vendor = Some(value.to_string()),
                "cpu family" => info.family = value.parse().ok(),
                "model" => info.model = value.parse().ok(),
                _ => {}
            }
        }
        info
    }

    /// Display family/model as `ff_mm`, when both are known.
    pub fn display_model(&self) -> Option<String> {
        match (self.family, self.model) {
            (Some(family), Some(model)) => Some(format!("{:02x}_{:02x}", family, model)),
            _ => None,
        }
    }

    pub fn is_x86(&self) -> bool {
        self.arch == "x86_64" || self.arch == "x86"
    }
}

/// CPU of the running machine, read once.
pub static HOST_CPU: Lazy<CpuInfo> = Lazy::new(CpuInfo::detect);

/// Restricts a counter or screen to some processors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterTarget {
    /// Architecture prefix: `x86` matches both `x86` and `x86_64`.
    pub arch: Option<String>,
    /// Display models (`06_2a`); empty means any model.
    pub models: Vec<String>,
}

impl CounterTarget {
    pub fn is_unrestricted(&self) -> bool {
        self.arch.is_none() && self.models.is_empty()
    }

    pub fn matches(&self, cpu: &CpuInfo) -> bool {
        if let Some(arch) = &self.arch {
            if !cpu.arch.to_ascii_lowercase().starts_with(&arch.to_ascii_lowercase()) {
                return false;
            }
        }
        if self.models.is_empty() {
            return true;
        }
        match cpu.display_model() {
            Some(model) => self.models.iter().any(|m| m.eq_ignore_ascii_case(&model)),
            None => false,
        }
    }
}
