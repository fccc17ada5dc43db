//! Configuration management for pmctop.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use crate::cli::{Args, ConfigFormat, WatchTarget};
use nix::unistd::{getuid, User};
use pmctop::monitor::DEFAULT_CPU_THRESHOLD;
use pmctop::screen::RowLayout;
use pmctop::{MonitorOptions, OwnershipPolicy, ScreenCatalog, ScreenDef, SortOrder};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// Default configuration constants
pub const DEFAULT_DELAY: f64 = 2.0;
pub const DEFAULT_PROC_ROOT: &str = "/proc";
pub const CONFIG_FILE_NAME: &str = ".pmctop.yaml";
pub const CONFIG_DIR_ENV: &str = "PMCTOP";

/// Options and user screens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Refresh
    pub delay: Option<f64>,
    #[serde(alias = "max-iter")]
    pub max_iter: Option<u64>,
    #[serde(alias = "cpu-threshold")]
    pub cpu_threshold: Option<f64>,

    // Display
    #[serde(alias = "show-threads")]
    pub show_threads: Option<bool>,
    #[serde(alias = "show-cmdline")]
    pub show_cmdline: Option<bool>,
    #[serde(alias = "show-user")]
    pub show_user: Option<bool>,
    #[serde(alias = "show-kernel")]
    pub show_kernel: Option<bool>,
    #[serde(alias = "show-timestamp")]
    pub show_timestamp: Option<bool>,
    #[serde(alias = "show-epoch")]
    pub show_epoch: Option<bool>,
    pub sticky: Option<bool>,
    pub idle: Option<bool>,
    /// Initial screen index
    pub screen: Option<usize>,

    // Task selection
    #[serde(alias = "watch-uid")]
    pub watch_uid: Option<u32>,
    #[serde(alias = "watch-pid")]
    pub watch_pid: Option<u32>,
    #[serde(alias = "watch-name")]
    pub watch_name: Option<String>,
    #[serde(alias = "only-pid")]
    pub only_pid: Option<u32>,
    #[serde(alias = "only-name")]
    pub only_name: Option<String>,

    #[serde(alias = "proc-root")]
    pub proc_root: Option<PathBuf>,

    // Logging
    #[serde(alias = "log-level")]
    pub log_level: Option<String>,

    /// Start the catalog with the built-in screens
    #[serde(alias = "builtin-screens")]
    pub builtin_screens: Option<bool>,

    /// User screens, appended after the built-in ones
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub screens: Vec<ScreenDef>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            delay: Some(DEFAULT_DELAY),
            max_iter: Some(0),
            cpu_threshold: Some(DEFAULT_CPU_THRESHOLD),
            show_threads: Some(false),
            show_cmdline: Some(false),
            show_user: Some(false),
            show_kernel: Some(false),
            show_timestamp: Some(false),
            show_epoch: Some(false),
            sticky: Some(false),
            idle: Some(false),
            screen: Some(0),
            watch_uid: None,
            watch_pid: None,
            watch_name: None,
            only_pid: None,
            only_name: None,
            proc_root: Some(PathBuf::from(DEFAULT_PROC_ROOT)),
            log_level: Some("warn".into()),
            builtin_screens: Some(true),
            screens: Vec::new(),
        }
    }
}

impl Config {
    /// Built-in screens for this CPU followed by the configured ones.
    pub fn catalog(&self) -> ScreenCatalog {
        let mut catalog = if self.builtin_screens.unwrap_or(true) {
            ScreenCatalog::with_builtins()
        } else {
            ScreenCatalog::new()
        };
        for def in &self.screens {
            if catalog.add_definition(def).is_none() {
                debug!("Configured screen '{}' skipped on this CPU", def.name);
            }
        }
        catalog
    }

    pub fn proc_root(&self) -> PathBuf {
        self.proc_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROC_ROOT))
    }

    pub fn row_layout(&self) -> RowLayout {
        RowLayout {
            show_timestamp: self.show_timestamp.unwrap_or(false),
            show_epoch: self.show_epoch.unwrap_or(false),
            show_user: self.show_user.unwrap_or(false),
            show_cmdline: self.show_cmdline.unwrap_or(false),
        }
    }

    /// Monitor options. Without an explicit user, root watches everyone
    /// but itself and other users watch their own tasks.
    pub fn monitor_options(&self, sort: SortOrder) -> MonitorOptions {
        let policy = match self.watch_uid {
            Some(uid) => OwnershipPolicy::User(uid),
            None if getuid().is_root() => OwnershipPolicy::EveryoneButSelf,
            None => OwnershipPolicy::User(getuid().as_raw()),
        };
        MonitorOptions {
            show_threads: self.show_threads.unwrap_or(false),
            sticky: self.sticky.unwrap_or(false),
            idle: self.idle.unwrap_or(false),
            cpu_threshold: self.cpu_threshold.unwrap_or(DEFAULT_CPU_THRESHOLD),
            only_pid: self.only_pid,
            only_name: self.only_name.clone(),
            watch_pid: self.watch_pid,
            watch_name: self.watch_name.clone(),
            sort,
            policy,
        }
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(
    cfg: &Config,
    catalog: &ScreenCatalog,
) -> Result<(), Box<dyn std::error::Error>> {
    let delay = cfg.delay.unwrap_or(DEFAULT_DELAY);
    if delay <= 0.0 || delay.is_nan() {
        return Err(format!("delay must be positive, got {}", delay).into());
    }

    let threshold = cfg.cpu_threshold.unwrap_or(DEFAULT_CPU_THRESHOLD);
    if threshold < 0.0 || threshold.is_nan() {
        return Err(format!("cpu_threshold must not be negative, got {}", threshold).into());
    }

    let screen = cfg.screen.unwrap_or(0);
    if screen >= catalog.len() {
        return Err(format!(
            "Screen {} does not exist, {} screen(s) available",
            screen,
            catalog.len()
        )
        .into());
    }

    Ok(())
}

/// Uid for a `--watch-uid` value: a number, or a user name.
fn resolve_user(value: &str) -> Result<u32, Box<dyn std::error::Error>> {
    if let Ok(uid) = value.parse() {
        return Ok(uid);
    }
    match User::from_name(value)? {
        Some(user) => Ok(user.uid.as_raw()),
        None => Err(format!("User name '{}' does not exist", value).into()),
    }
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(delay) = args.delay {
        config.delay = Some(delay);
    }
    if let Some(max_iter) = args.max_iter {
        config.max_iter = Some(max_iter);
    }
    if let Some(threshold) = args.cpu_min {
        config.cpu_threshold = Some(threshold);
    }
    if let Some(screen) = args.screen {
        config.screen = Some(screen);
    }

    // Flags can only switch features on
    if args.show_threads {
        config.show_threads = Some(true);
    }
    if args.show_cmdline {
        config.show_cmdline = Some(true);
    }
    if args.show_user {
        config.show_user = Some(true);
    }
    if args.show_kernel {
        config.show_kernel = Some(true);
    }
    if args.sticky {
        config.sticky = Some(true);
    }
    if args.idle {
        config.idle = Some(true);
    }
    if args.timestamp {
        config.show_timestamp = Some(true);
    }
    if args.epoch {
        config.show_epoch = Some(true);
    }

    if let Some(user) = &args.watch_uid {
        config.watch_uid = Some(resolve_user(user)?);
    }
    match &args.watch {
        Some(WatchTarget::Pid(pid)) => config.watch_pid = Some(*pid),
        Some(WatchTarget::Name(name)) => config.watch_name = Some(name.clone()),
        None => {}
    }
    if let Some(pid) = args.only_pid {
        config.only_pid = Some(pid);
    }
    if let Some(name) = &args.only_name {
        config.only_name = Some(name.clone());
    }
    if let Some(root) = &args.proc_root {
        config.proc_root = Some(root.clone());
    }
    if let Some(level) = &args.log_level {
        config.log_level = Some(level.as_str().to_string());
    }

    Ok(config)
}

/// Config file locations, most specific first.
fn candidate_paths(env_dir: Option<PathBuf>, home: Option<PathBuf>) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(dir) = env_dir {
        paths.push(dir.join(CONFIG_FILE_NAME));
    }
    paths.push(PathBuf::from(".").join(CONFIG_FILE_NAME));
    if let Some(home) = home {
        paths.push(home.join(CONFIG_FILE_NAME));
    }
    paths
}

/// Enhanced configuration loading with multiple format support
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(format!("Config file not found: {}", p.display()).into());
            }
            p.to_path_buf()
        }
        None => {
            let found = candidate_paths(
                env::var_os(CONFIG_DIR_ENV).map(PathBuf::from),
                env::var_os("HOME").map(PathBuf::from),
            )
            .into_iter()
            .find(|p| p.exists());
            match found {
                Some(p) => p,
                None => return Ok(Config::default()),
            }
        }
    };

    let content = fs::read_to_string(&path)?;
    let config = parse_config(&content, &path)?;
    info!("Loaded configuration from: {}", path.display());
    Ok(config)
}

/// Parses `content` in the format implied by the extension of `path`.
pub fn parse_config(content: &str, path: &Path) -> Result<Config, Box<dyn std::error::Error>> {
    let config = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_str(content)?,
        Some("toml") => toml::from_str(content)?,
        // Default to YAML
        _ => serde_yaml::from_str(content)?,
    };
    Ok(config)
}

/// Renders `config` in the requested format
pub fn render_config(
    config: &Config,
    format: ConfigFormat,
) -> Result<String, Box<dyn std::error::Error>> {
    let output = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    };
    Ok(output)
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: ConfigFormat) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", render_config(config, format)?);
    Ok(())
}
