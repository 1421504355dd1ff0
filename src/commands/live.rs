//! Live command implementation.
//!
//! Runs the demo workload in a loop while a publisher drains the statistics
//! every interval and the console prints each cycle on its own.

use super::models::LiveArgs;
use super::profile::{build_profiler, print_snapshot, run_session};
use crate::host::ShadowStack;
use crate::stream::{PublishLoop, Publisher, PublisherConfig, ServerMessage};
use anyhow::{anyhow, Context, Result};
use crossbeam_channel::RecvTimeoutError;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Execute the live command
///
/// **Public** - main entry point called from main.rs
///
/// # Returns
/// Number of cycles printed
pub fn execute_live(args: LiveArgs) -> Result<usize> {
    info!(
        "Live profiling every {:?} with the {:?} collector",
        args.publish_interval, args.collector.kind
    );

    let host = ShadowStack::new();
    let mut profiler = build_profiler(&host, &args.collector);
    profiler.start().context("Failed to start profiler")?;

    let publisher = Publisher::new(
        PublisherConfig::new()
            .with_interval(args.publish_interval)
            .with_reset_each_cycle(true),
    );
    let console = publisher.connect("console");
    let publish_loop = PublishLoop::spawn(profiler.recording().clone(), publisher.clone())
        .context("Failed to start publisher")?;

    let stop = Arc::new(AtomicBool::new(false));
    let workload = {
        let host = host.clone();
        let stop = stop.clone();
        let config = args.workload;
        thread::Builder::new()
            .name("callscope-workload".to_string())
            .spawn(move || {
                let mut rounds = 0u64;
                while !stop.load(Ordering::Relaxed) {
                    run_session(&host, config);
                    rounds += 1;
                }
                rounds
            })
            .context("Failed to spawn workload thread")?
    };

    let mut printed = 0usize;
    let outcome = loop {
        if args.cycles.is_some_and(|cycles| printed >= cycles) {
            break Ok(());
        }
        match console.recv_timeout(args.publish_interval * 4) {
            Ok(ServerMessage::Full { seq, snapshot }) => {
                printed += 1;
                println!();
                println!("=== cycle {} ===", seq);
                print_snapshot(&snapshot, &args.display);
            }
            Ok(other) => debug!("Ignoring {:?} on the console", other.seq()),
            Err(RecvTimeoutError::Timeout) => warn!("No cycle published in time"),
            Err(RecvTimeoutError::Disconnected) => {
                break Err(anyhow!("Publisher went away after {} cycles", printed))
            }
        }
    };

    stop.store(true, Ordering::Relaxed);
    match workload.join() {
        Ok(rounds) => info!("Workload ran {} rounds", rounds),
        Err(_) => warn!("Workload thread panicked"),
    }
    publish_loop.stop();
    profiler.stop();
    publisher.close();

    outcome.map(|()| printed)
}
