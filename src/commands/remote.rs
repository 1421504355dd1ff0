//! Serve command implementation.
//!
//! Profiles the demo workload and streams the statistics to every viewer
//! connected over TCP. After the last round the final snapshot is published,
//! viewers get a moment to pick it up, and the server shuts down.

use super::models::ServeArgs;
use super::profile::{build_profiler, run_session};
use crate::host::ShadowStack;
use crate::output::{write_dump, ProfileDump};
use crate::stats::Snapshot;
use crate::stream::{PublishLoop, Publisher, PublisherConfig, StreamServer};
use anyhow::{Context, Result};
use log::info;
use std::thread;

/// Execute the serve command
///
/// **Public** - main entry point called from main.rs
///
/// # Returns
/// The last snapshot published to viewers
pub fn execute_serve(args: ServeArgs) -> Result<Snapshot> {
    let host = ShadowStack::new();
    let mut profiler = build_profiler(&host, &args.collector);

    let publisher = Publisher::new(
        PublisherConfig::new()
            .with_interval(args.publish_interval)
            .with_reset_each_cycle(args.reset_each_cycle),
    );
    let server = StreamServer::bind(args.bind.as_str(), publisher.clone(), profiler.mode())
        .with_context(|| format!("Failed to bind {}", args.bind))?;
    println!("Serving profile on {}", server.local_addr());

    profiler.start().context("Failed to start profiler")?;
    let publish_loop = PublishLoop::spawn(profiler.recording().clone(), publisher.clone())
        .context("Failed to start publisher")?;

    for round in 1..=args.rounds {
        let checksum = run_session(&host, args.workload);
        info!("Round {}/{} done (checksum {})", round, args.rounds, checksum);
    }

    publish_loop.stop();
    profiler.stop();
    let last = profiler.recording().snapshot(args.reset_each_cycle);
    let report = publisher.publish(last.clone());
    info!(
        "Final cycle {} sent to {} viewers",
        report.seq, report.delivered
    );

    thread::sleep(args.linger);
    server.shutdown();
    publisher.close();

    if let Some(path) = &args.output_json {
        write_dump(&ProfileDump::new(last.clone()), path).context("Failed to write profile dump")?;
        info!("✓ Dump written to: {}", path.display());
    }
    Ok(last)
}
