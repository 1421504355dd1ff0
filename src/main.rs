//! callscope CLI
//!
//! Profiles an instrumented workload with the tracing or sampling
//! collector, streams live statistics to local and remote viewers, and
//! turns profile dumps into tables and flamegraphs.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;
use std::time::Duration;

use callscope::commands::{
    display_schema, display_version, execute_live, execute_profile, execute_serve, execute_view,
    render_dump_flamegraph, validate_dump_file, CollectorArgs, CollectorKind, DisplayArgs,
    LiveArgs, ProfileArgs, ServeArgs, TimerKind, ViewArgs,
};
use callscope::demo::DemoConfig;
use callscope::flamegraph::FlamegraphConfig;
use callscope::stats::SortKey;
use callscope::utils::config::{DEFAULT_BIND_ADDR, DEFAULT_TOP_PATHS};

/// callscope - call-tree profiler with live streaming
#[derive(Parser, Debug)]
#[command(name = "callscope")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Collector selection
#[derive(Args, Debug)]
struct CollectorOpts {
    /// Collection strategy
    #[arg(short, long, value_enum, default_value_t = CollectorKind::Tracing)]
    collector: CollectorKind,

    /// Sampling interval in microseconds
    #[arg(long, default_value = "1000")]
    interval_us: u64,

    /// Clock used to time calls when tracing
    #[arg(long, value_enum, default_value_t = TimerKind::Wall)]
    timer: TimerKind,
}

impl From<CollectorOpts> for CollectorArgs {
    fn from(opts: CollectorOpts) -> Self {
        CollectorArgs {
            kind: opts.collector,
            sampling_interval: Duration::from_micros(opts.interval_us.max(1)),
            timer: opts.timer,
        }
    }
}

/// Size of the demo workload
#[derive(Args, Debug)]
struct WorkloadOpts {
    /// Batches per worker
    #[arg(long, default_value = "20")]
    iterations: usize,

    /// Records per batch
    #[arg(long, default_value = "200")]
    batch_size: usize,

    /// Worker threads
    #[arg(long, default_value = "1")]
    threads: usize,
}

impl From<WorkloadOpts> for DemoConfig {
    fn from(opts: WorkloadOpts) -> Self {
        DemoConfig {
            iterations: opts.iterations,
            batch_size: opts.batch_size,
            threads: opts.threads.max(1),
        }
    }
}

/// Listing options
#[derive(Args, Debug)]
struct DisplayOpts {
    /// Sibling order: deep, own, calls, deep-per-call, own-per-call or name
    #[arg(long, default_value = "deep")]
    sort: SortKey,

    /// Hide nodes deeper than this
    #[arg(long)]
    max_depth: Option<usize>,

    /// List totals per function instead of the call tree
    #[arg(long)]
    flat: bool,
}

impl From<DisplayOpts> for DisplayArgs {
    fn from(opts: DisplayOpts) -> Self {
        DisplayArgs {
            sort: opts.sort,
            max_depth: opts.max_depth,
            flat: opts.flat,
        }
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Profile the demo workload once
    Profile {
        #[command(flatten)]
        collector: CollectorOpts,

        #[command(flatten)]
        workload: WorkloadOpts,

        #[command(flatten)]
        display: DisplayOpts,

        /// Output path for the JSON dump
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output path for SVG flamegraph (optional)
        #[arg(short, long)]
        flamegraph: Option<PathBuf>,

        /// Flamegraph title
        #[arg(long)]
        title: Option<String>,

        /// Flamegraph width in pixels
        #[arg(long, default_value = "1200")]
        width: usize,

        /// Print the call tree
        #[arg(long)]
        table: bool,

        /// Print hot-path summary
        #[arg(long)]
        summary: bool,

        /// Number of hot paths to report
        #[arg(long, default_value_t = DEFAULT_TOP_PATHS)]
        top_paths: usize,
    },

    /// Profile continuously and print each cycle
    Live {
        #[command(flatten)]
        collector: CollectorOpts,

        #[command(flatten)]
        workload: WorkloadOpts,

        #[command(flatten)]
        display: DisplayOpts,

        /// Publish interval in milliseconds
        #[arg(long, default_value = "5000")]
        interval_ms: u64,

        /// Stop after this many cycles
        #[arg(long)]
        cycles: Option<usize>,
    },

    /// Profile the demo workload and stream it to remote viewers
    Serve {
        #[command(flatten)]
        collector: CollectorOpts,

        #[command(flatten)]
        workload: WorkloadOpts,

        /// Address to listen on
        #[arg(short, long, env = "CALLSCOPE_ADDR", default_value = DEFAULT_BIND_ADDR)]
        bind: String,

        /// Publish interval in milliseconds
        #[arg(long, default_value = "5000")]
        interval_ms: u64,

        /// Drain statistics after every publish cycle
        #[arg(long)]
        reset: bool,

        /// Workload rounds before shutting down
        #[arg(long, default_value = "10")]
        rounds: usize,

        /// Milliseconds viewers get to fetch the final snapshot
        #[arg(long, default_value = "1000")]
        linger_ms: u64,

        /// Write the final snapshot to this dump
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show a dump file or follow a profiling server
    View {
        /// Dump file or server address (host:port)
        #[arg(env = "CALLSCOPE_ADDR", default_value = DEFAULT_BIND_ADDR)]
        target: String,

        #[command(flatten)]
        display: DisplayOpts,

        /// Stop after this many stream updates
        #[arg(long)]
        updates: Option<usize>,

        /// Save the last streamed view as a dump
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Render a flamegraph from a dump
    Flamegraph {
        /// Path to profile dump
        #[arg(short, long)]
        input: PathBuf,

        /// Output SVG path
        #[arg(short, long, default_value = "flamegraph.svg")]
        output: PathBuf,

        /// Flamegraph title
        #[arg(long)]
        title: Option<String>,

        /// Fold stacks lighter than this into [other]
        #[arg(long, default_value = "0")]
        min_weight: u64,

        /// Print hot-path summary
        #[arg(long)]
        summary: bool,
    },

    /// Validate a profile dump
    Validate {
        /// Path to profile dump
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Display schema information
    Schema {
        /// Show full schema details
        #[arg(long)]
        show: bool,
    },

    /// Display version information
    Version,
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    // Execute command
    match cli.command {
        Commands::Profile {
            collector,
            workload,
            display,
            output,
            flamegraph,
            title,
            width,
            table,
            summary,
            top_paths,
        } => {
            // Create flamegraph config
            let count_name = match collector.collector {
                CollectorKind::Tracing => "ns",
                CollectorKind::Sampling => "samples",
            };
            let fg_config = flamegraph.as_ref().map(|_| {
                let mut config = FlamegraphConfig::new()
                    .with_count_name(count_name)
                    .with_width(width);
                if let Some(title) = title {
                    config = config.with_title(title);
                }
                config
            });

            let args = ProfileArgs {
                collector: collector.into(),
                workload: workload.into(),
                output_json: output,
                output_svg: flamegraph,
                flamegraph_config: fg_config,
                print_table: table,
                display: display.into(),
                print_summary: summary,
                top_paths,
            };
            execute_profile(args)?;
        }

        Commands::Live {
            collector,
            workload,
            display,
            interval_ms,
            cycles,
        } => {
            execute_live(LiveArgs {
                collector: collector.into(),
                workload: workload.into(),
                publish_interval: Duration::from_millis(interval_ms.max(1)),
                cycles,
                display: display.into(),
            })?;
        }

        Commands::Serve {
            collector,
            workload,
            bind,
            interval_ms,
            reset,
            rounds,
            linger_ms,
            output,
        } => {
            execute_serve(ServeArgs {
                collector: collector.into(),
                workload: workload.into(),
                bind,
                publish_interval: Duration::from_millis(interval_ms.max(1)),
                reset_each_cycle: reset,
                rounds,
                linger: Duration::from_millis(linger_ms),
                output_json: output,
            })?;
        }

        Commands::View {
            target,
            display,
            updates,
            output,
        } => {
            execute_view(ViewArgs {
                target,
                display: display.into(),
                updates,
                output_json: output,
            })?;
        }

        Commands::Flamegraph {
            input,
            output,
            title,
            min_weight,
            summary,
        } => {
            render_dump_flamegraph(input, output, title, min_weight, summary)?;
        }

        Commands::Validate { file } => {
            validate_dump_file(file)?;
        }

        Commands::Schema { show } => {
            display_schema(show);
        }

        Commands::Version => {
            display_version();
        }
    }

    Ok(())
}
