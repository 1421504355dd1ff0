use crate::collector::ClockKind;
use crate::demo::DemoConfig;
use crate::flamegraph::FlamegraphConfig;
use crate::stats::SortKey;
use crate::utils::config::{DEFAULT_BIND_ADDR, DEFAULT_PUBLISH_INTERVAL, DEFAULT_SAMPLING_INTERVAL, DEFAULT_TOP_PATHS};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

/// Collection strategy picked on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CollectorKind {
    /// Exact call/return timing
    #[default]
    Tracing,
    /// Periodic stack samples
    Sampling,
}

/// Clock used to time calls under tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TimerKind {
    #[default]
    Wall,
    ProcessCpu,
    ThreadCpu,
}

impl From<TimerKind> for ClockKind {
    fn from(timer: TimerKind) -> Self {
        match timer {
            TimerKind::Wall => ClockKind::Monotonic,
            TimerKind::ProcessCpu => ClockKind::ProcessCpu,
            TimerKind::ThreadCpu => ClockKind::ThreadCpu,
        }
    }
}

/// Collector settings shared by every profiling command
#[derive(Debug, Clone, Copy)]
pub struct CollectorArgs {
    pub kind: CollectorKind,
    pub sampling_interval: Duration,
    pub timer: TimerKind,
}

impl Default for CollectorArgs {
    fn default() -> Self {
        Self {
            kind: CollectorKind::default(),
            sampling_interval: DEFAULT_SAMPLING_INTERVAL,
            timer: TimerKind::default(),
        }
    }
}

/// How a snapshot is printed
#[derive(Debug, Clone, Copy)]
pub struct DisplayArgs {
    pub sort: SortKey,
    pub max_depth: Option<usize>,
    /// Per-call-site listing instead of the call tree
    pub flat: bool,
}

impl Default for DisplayArgs {
    fn default() -> Self {
        Self {
            sort: SortKey::default(),
            max_depth: None,
            flat: false,
        }
    }
}

/// Arguments for the profile command
///
/// **Public** - used by main.rs to construct from CLI args
#[derive(Debug, Clone)]
pub struct ProfileArgs {
    pub collector: CollectorArgs,

    pub workload: DemoConfig,

    /// Output path for the JSON dump (optional)
    pub output_json: Option<PathBuf>,

    /// Output path for SVG flamegraph (optional)
    pub output_svg: Option<PathBuf>,

    /// Flamegraph configuration
    pub flamegraph_config: Option<FlamegraphConfig>,

    /// Print the call tree to stdout
    pub print_table: bool,

    pub display: DisplayArgs,

    /// Print hot-path summary to stdout
    pub print_summary: bool,

    /// Number of hot paths to report
    pub top_paths: usize,
}

impl Default for ProfileArgs {
    fn default() -> Self {
        Self {
            collector: CollectorArgs::default(),
            workload: DemoConfig::default(),
            output_json: Some(PathBuf::from("profile.json")),
            output_svg: None,
            flamegraph_config: None,
            print_table: true,
            display: DisplayArgs::default(),
            print_summary: false,
            top_paths: DEFAULT_TOP_PATHS,
        }
    }
}

/// Arguments for the live command
#[derive(Debug, Clone)]
pub struct LiveArgs {
    pub collector: CollectorArgs,
    pub workload: DemoConfig,
    pub publish_interval: Duration,
    /// Stop after this many cycles (runs until interrupted when absent)
    pub cycles: Option<usize>,
    pub display: DisplayArgs,
}

impl Default for LiveArgs {
    fn default() -> Self {
        Self {
            collector: CollectorArgs::default(),
            workload: DemoConfig::default(),
            publish_interval: DEFAULT_PUBLISH_INTERVAL,
            cycles: None,
            display: DisplayArgs::default(),
        }
    }
}

/// Arguments for the serve command
#[derive(Debug, Clone)]
pub struct ServeArgs {
    pub collector: CollectorArgs,
    pub workload: DemoConfig,
    pub bind: String,
    pub publish_interval: Duration,
    /// Drain statistics after every publish cycle
    pub reset_each_cycle: bool,
    /// Workload rounds to run before shutting down
    pub rounds: usize,
    /// Time left for viewers to pick up the final snapshot
    pub linger: Duration,
    pub output_json: Option<PathBuf>,
}

impl Default for ServeArgs {
    fn default() -> Self {
        Self {
            collector: CollectorArgs::default(),
            workload: DemoConfig::default(),
            bind: DEFAULT_BIND_ADDR.to_string(),
            publish_interval: DEFAULT_PUBLISH_INTERVAL,
            reset_each_cycle: false,
            rounds: 10,
            linger: Duration::from_secs(1),
            output_json: None,
        }
    }
}

/// Arguments for the view command
#[derive(Debug, Clone)]
pub struct ViewArgs {
    /// Dump file path, or `host:port` of a profiling server
    pub target: String,
    pub display: DisplayArgs,
    /// Stop after this many stream updates
    pub updates: Option<usize>,
    /// Save the last streamed view as a dump
    pub output_json: Option<PathBuf>,
}
