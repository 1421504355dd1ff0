use crate::aggregator::{build_collapsed_stacks, merge_small_stacks};
use crate::flamegraph::{generate_flamegraph, generate_text_summary, FlamegraphConfig};
use crate::output::{read_dump, write_svg};
use crate::utils::config::{PROTOCOL_VERSION, SCHEMA_VERSION};
use anyhow::{Context, Result};
use log::info;
use std::path::PathBuf;

/// Validate a profile dump file
pub fn validate_dump_file(file_path: PathBuf) -> Result<()> {
    println!("Validating dump: {}", file_path.display());

    let dump = read_dump(&file_path)?;
    let snapshot = &dump.snapshot;

    println!("✓ Valid profile dump");
    println!("  Version: {}", dump.version);
    println!("  Generated: {}", dump.generated_at);
    println!("  Mode: {}", snapshot.mode);
    println!("  Total: {} {}", snapshot.deep_value(), snapshot.mode.unit());
    println!("  Calls: {}", snapshot.total_calls());
    println!("  Root functions: {}", snapshot.stats.len());

    Ok(())
}

/// Render a flamegraph from an existing dump
///
/// Stacks lighter than `min_weight` are folded into one `[other]` frame.
pub fn render_dump_flamegraph(
    input: PathBuf,
    output: PathBuf,
    title: Option<String>,
    min_weight: u64,
    print_summary: bool,
) -> Result<()> {
    let dump = read_dump(&input).with_context(|| format!("Failed to read {}", input.display()))?;
    let mode = dump.snapshot.mode;

    let stacks = merge_small_stacks(build_collapsed_stacks(&dump.snapshot), min_weight);
    info!("Rendering {} stacks from {}", stacks.len(), input.display());

    let mut config = FlamegraphConfig::for_mode(mode);
    if let Some(title) = title {
        config = config.with_title(title);
    }
    let svg = generate_flamegraph(&stacks, Some(&config)).context("Failed to generate flamegraph")?;
    write_svg(&svg, &output).context("Failed to write flamegraph")?;
    println!("✓ Flamegraph written to: {}", output.display());

    if print_summary {
        println!();
        println!("{}", generate_text_summary(&stacks, 10, mode));
    }
    Ok(())
}

/// Display schema information
pub fn display_schema(show_details: bool) {
    println!("callscope Profile Dump Schema");
    println!("Current Version: {}", SCHEMA_VERSION);
    println!();

    if show_details {
        println!("Schema Structure:");
        println!("  version: string          - Schema version (e.g., '1.0.0')");
        println!("  generated_at: string     - RFC 3339 timestamp");
        println!("  snapshot: object         - Collected statistics");
        println!("    mode: object           - {{kind: 'tracing'}} or {{kind: 'sampling', interval_us}}");
        println!("    wall_time_ns: number   - Wall time spent running");
        println!("    cpu_time_ns: number    - CPU time spent running");
        println!("    stats: array           - Root call sites, sorted by identity");
        println!("      site: object         - name, module?, file?, line");
        println!("      call_count: number   - Completed calls on this path");
        println!("      own_value: number    - Own nanoseconds or own samples");
        println!("      children: array      - Callees on this path");
    } else {
        println!("Use --show for detailed schema information");
    }
}

/// Display version information
pub fn display_version() {
    println!("callscope v{}", env!("CARGO_PKG_VERSION"));
    println!("Profile Schema: v{}", SCHEMA_VERSION);
    println!("Stream Protocol: v{}", PROTOCOL_VERSION);
    println!();
    println!("A call-tree profiler with tracing and sampling collectors and live streaming.");
}
