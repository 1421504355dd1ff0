//! Profile command implementation.
//!
//! The profile command:
//! 1. Builds a profiler for the demo workload's host
//! 2. Runs the workload under the profiler
//! 3. Builds collapsed stacks and hot paths
//! 4. Generates a flamegraph
//! 5. Writes output files and listings

use super::models::{CollectorArgs, CollectorKind, DisplayArgs, ProfileArgs};
use crate::aggregator::{build_collapsed_stacks, calculate_distribution, calculate_hot_paths};
use crate::call_site;
use crate::demo::{DemoConfig, DemoWorkload};
use crate::flamegraph::{generate_flamegraph, generate_text_summary, FlamegraphConfig};
use crate::frame::{BoundarySpec, CallSite};
use crate::host::ShadowStack;
use crate::output::{render_flat, render_table, write_dump, write_svg, ProfileDump};
use crate::profiler::{Profiler, ProfilerConfig};
use crate::stats::Snapshot;
use anyhow::{Context, Result};
use log::{debug, info};
use std::sync::Arc;
use std::time::Instant;

/// Call site wrapping every workload run; excluded from the statistics
pub(crate) fn session_site() -> CallSite {
    call_site!("session")
}

/// Build a profiler over `host` that hides the session scope
///
/// **Public** - shared by every command that profiles the demo workload
pub fn build_profiler(host: &Arc<ShadowStack>, collector: &CollectorArgs) -> Profiler {
    let config = ProfilerConfig::new()
        .with_boundary(BoundarySpec::new().upper_code(session_site()))
        .with_timer(collector.timer.into())
        .with_sampling_interval(collector.sampling_interval);

    match collector.kind {
        CollectorKind::Tracing => Profiler::tracing(host.clone(), config),
        CollectorKind::Sampling => Profiler::sampling(host.clone(), config),
    }
}

/// Run the workload once inside the session scope
pub(crate) fn run_session(host: &Arc<ShadowStack>, workload: DemoConfig) -> u64 {
    let demo = DemoWorkload::new(host.clone(), workload);
    host.scope(session_site(), || demo.run())
}

/// Print `snapshot` the way `display` asks for
pub(crate) fn print_snapshot(snapshot: &Snapshot, display: &DisplayArgs) {
    if display.flat {
        print!("{}", render_flat(snapshot, None));
    } else {
        print!("{}", render_table(snapshot, display.sort, display.max_depth));
    }
}

/// Execute the profile command
///
/// **Public** - main entry point called from main.rs
///
/// # Returns
/// The final snapshot, after every requested output was written
///
/// # Errors
/// * The host already has a collector attached
/// * Flamegraph rendering fails
/// * File write errors
pub fn execute_profile(args: ProfileArgs) -> Result<Snapshot> {
    let start_time = Instant::now();
    info!(
        "Profiling demo workload ({} iterations x {} records on {} threads)",
        args.workload.iterations, args.workload.batch_size, args.workload.threads
    );

    // Step 1: Build the profiler
    info!("Step 1/5: Attaching {:?} collector...", args.collector.kind);
    let host = ShadowStack::new();
    let mut profiler = build_profiler(&host, &args.collector);
    profiler.start().context("Failed to start profiler")?;

    // Step 2: Run the workload
    info!("Step 2/5: Running workload...");
    let checksum = run_session(&host, args.workload);
    let snapshot = profiler.result();
    debug!("Workload checksum: {}", checksum);
    info!(
        "Collected {} {} over {} calls",
        snapshot.deep_value(),
        snapshot.mode.unit(),
        snapshot.total_calls()
    );

    // Step 3: Build collapsed stacks
    info!("Step 3/5: Building collapsed stacks...");
    let stacks = build_collapsed_stacks(&snapshot);
    let distribution = calculate_distribution(&stacks);
    info!("Distribution: {}", distribution.summary(snapshot.mode.unit()));

    let hot_paths = calculate_hot_paths(&stacks, snapshot.deep_value(), args.top_paths);
    debug!("Top 3 hot paths:");
    for (i, path) in hot_paths.iter().take(3).enumerate() {
        debug!(
            "  {}. {} {} ({:.1}%): {}",
            i + 1,
            path.value,
            snapshot.mode.unit(),
            path.percentage,
            path.stack
        );
    }

    // Step 4: Generate flamegraph (if requested)
    let svg_content = if args.output_svg.is_some() {
        info!("Step 4/5: Generating flamegraph...");
        let config = args
            .flamegraph_config
            .clone()
            .unwrap_or_else(|| FlamegraphConfig::for_mode(snapshot.mode));
        Some(generate_flamegraph(&stacks, Some(&config)).context("Failed to generate flamegraph")?)
    } else {
        info!("Step 4/5: Skipping flamegraph generation (not requested)");
        None
    };

    // Step 5: Write outputs
    info!("Step 5/5: Writing output files...");
    if let Some(path) = &args.output_json {
        write_dump(&ProfileDump::new(snapshot.clone()), path)
            .context("Failed to write profile dump")?;
        info!("✓ Dump written to: {}", path.display());
    }
    if let (Some(svg), Some(path)) = (svg_content, &args.output_svg) {
        write_svg(&svg, path).context("Failed to write flamegraph")?;
        info!("✓ Flamegraph written to: {}", path.display());
    }

    if args.print_table {
        println!();
        print_snapshot(&snapshot, &args.display);
    }
    if args.print_summary {
        println!();
        println!("{}", generate_text_summary(&stacks, args.top_paths, snapshot.mode));
    }

    info!("Profile completed in {:.2?}", start_time.elapsed());
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::read_dump;
    use tempfile::tempdir;

    fn small_args() -> ProfileArgs {
        ProfileArgs {
            workload: DemoConfig {
                iterations: 2,
                batch_size: 8,
                threads: 1,
            },
            output_json: None,
            print_table: false,
            ..ProfileArgs::default()
        }
    }

    #[test]
    fn test_profile_hides_session_scope() {
        let snapshot = execute_profile(small_args()).unwrap();

        let roots: Vec<String> = snapshot.stats.iter().map(|r| r.site.name.to_string()).collect();
        assert_eq!(roots, vec!["run".to_string()]);
        let workers: Vec<&str> = snapshot.stats[0]
            .children
            .iter()
            .map(|r| &*r.site.name)
            .collect();
        assert_eq!(workers, vec!["worker"]);
        assert!(snapshot.total_calls() > 0);
    }

    #[test]
    fn test_profile_writes_outputs() {
        let dir = tempdir().unwrap();
        let json = dir.path().join("out/profile.json");
        let svg = dir.path().join("out/flame.svg");
        let args = ProfileArgs {
            output_json: Some(json.clone()),
            output_svg: Some(svg.clone()),
            ..small_args()
        };

        let snapshot = execute_profile(args).unwrap();

        assert_eq!(read_dump(&json).unwrap().snapshot, snapshot);
        assert!(std::fs::read_to_string(&svg).unwrap().contains("<svg"));
    }
}
