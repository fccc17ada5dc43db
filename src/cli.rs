//! CLI arguments and subcommands for pmctop.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use pmctop::SortOrder;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Configuration format options for output
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Row ordering requested with `--sort`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Tid,
    Name,
    Cmdline,
    Column(usize),
}

impl SortField {
    pub fn to_order(self, ascending: bool) -> SortOrder {
        match self {
            SortField::Tid => SortOrder::Tid,
            SortField::Name => SortOrder::Name,
            SortField::Cmdline => SortOrder::Cmdline,
            SortField::Column(index) => SortOrder::Column {
                index,
                descending: !ascending,
            },
        }
    }
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tid" | "pid" => Ok(SortField::Tid),
            "name" => Ok(SortField::Name),
            "cmdline" => Ok(SortField::Cmdline),
            other => other.parse().map(SortField::Column).map_err(|_| {
                format!("'{}' is not tid, name, cmdline or a column index", other)
            }),
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortField::Tid => write!(f, "tid"),
            SortField::Name => write!(f, "name"),
            SortField::Cmdline => write!(f, "cmdline"),
            SortField::Column(i) => write!(f, "{}", i),
        }
    }
}

/// Task selected with `--watch`: a pid when numeric, otherwise a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchTarget {
    Pid(u32),
    Name(String),
}

impl FromStr for WatchTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err("empty watch target".to_string());
        }
        Ok(match s.parse() {
            Ok(pid) => WatchTarget::Pid(pid),
            Err(_) => WatchTarget::Name(s.to_string()),
        })
    }
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "pmctop",
    about = "Per-task hardware performance counter monitor",
    long_about = "Per-task hardware performance counter monitor.\n\n\
                  Opens hardware counters (cycles, instructions, cache and branch misses, ...) \
                  for every thread on the machine and prints per-process or per-thread \
                  derived metrics such as IPC and miss rates at a fixed interval.",
    version,
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Delay between refreshes, in seconds
    #[arg(short = 'd', long)]
    pub delay: Option<f64>,

    /// Stop after N refreshes (0 = run until interrupted)
    #[arg(short = 'n', long)]
    pub max_iter: Option<u64>,

    /// Initial screen index (see list-screens)
    #[arg(short = 'S', long)]
    pub screen: Option<usize>,

    /// One row per thread instead of one per process
    #[arg(short = 'H', long)]
    pub show_threads: bool,

    /// Also show idle tasks
    #[arg(short = 'i', long)]
    pub idle: bool,

    /// Show the command line instead of the task name
    #[arg(short = 'c', long)]
    pub show_cmdline: bool,

    /// Show the owning user
    #[arg(short = 'U', long)]
    pub show_user: bool,

    /// Count kernel-mode events too
    #[arg(short = 'K', long)]
    pub show_kernel: bool,

    /// Keep exited tasks on display
    #[arg(long)]
    pub sticky: bool,

    /// Minimum %CPU for a task to be shown
    #[arg(long)]
    pub cpu_min: Option<f64>,

    /// Only watch tasks of this user (name or uid)
    #[arg(short = 'u', long)]
    pub watch_uid: Option<String>,

    /// Highlight a task by pid or name
    #[arg(short = 'w', long)]
    pub watch: Option<WatchTarget>,

    /// Only show this pid
    #[arg(short = 'p', long)]
    pub only_pid: Option<u32>,

    /// Only show tasks whose name contains this string
    #[arg(long)]
    pub only_name: Option<String>,

    /// Sort by tid, name, cmdline or a column index
    #[arg(long, default_value = "0")]
    pub sort: SortField,

    /// Sort ascending instead of descending
    #[arg(long)]
    pub ascending: bool,

    /// Prefix each row with the epoch
    #[arg(long)]
    pub epoch: bool,

    /// Prefix each row with the iteration number
    #[arg(long)]
    pub timestamp: bool,

    /// Log level [default: warn]
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'C', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config and export
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Root of the proc filesystem
    #[arg(long)]
    pub proc_root: Option<PathBuf>,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the available screens
    ListScreens {
        /// Also show descriptions and columns
        #[arg(short = 'v', long)]
        verbose: bool,
    },

    /// Write the effective configuration, every screen included
    Export {
        /// Output file path (stdout when omitted)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// Check runtime requirements and permissions
    CheckRequirements,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_field_parse() {
        assert_eq!("tid".parse::<SortField>().unwrap(), SortField::Tid);
        assert_eq!("cmdline".parse::<SortField>().unwrap(), SortField::Cmdline);
        assert_eq!("3".parse::<SortField>().unwrap(), SortField::Column(3));
        assert!("-1".parse::<SortField>().is_err());
        assert!("cpu".parse::<SortField>().is_err());
    }

    #[test]
    fn test_sort_field_to_order() {
        assert_eq!(
            SortField::Column(2).to_order(false),
            SortOrder::Column {
                index: 2,
                descending: true
            }
        );
        assert_eq!(SortField::Name.to_order(true), SortOrder::Name);
    }

    #[test]
    fn test_watch_target_parse() {
        assert_eq!("42".parse::<WatchTarget>().unwrap(), WatchTarget::Pid(42));
        assert_eq!(
            "nginx".parse::<WatchTarget>().unwrap(),
            WatchTarget::Name("nginx".into())
        );
        assert!("".parse::<WatchTarget>().is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "pmctop", "-d", "0.5", "-n", "3", "-H", "-w", "sshd", "--sort", "name",
        ])
        .unwrap();
        assert_eq!(args.delay, Some(0.5));
        assert_eq!(args.max_iter, Some(3));
        assert!(args.show_threads);
        assert_eq!(args.watch, Some(WatchTarget::Name("sshd".into())));
        assert_eq!(args.sort, SortField::Name);
        assert!(args.command.is_none());
    }

    #[test]
    fn test_args_subcommand() {
        let args = Args::try_parse_from(["pmctop", "export", "-o", "out.yaml"]).unwrap();
        match args.command {
            Some(Commands::Export { output }) => {
                assert_eq!(output, Some(PathBuf::from("out.yaml")))
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let args = Args::try_parse_from(["pmctop", "list-screens", "-v"]).unwrap();
        assert!(matches!(
            args.command,
            Some(Commands::ListScreens { verbose: true })
        ));
    }
}
