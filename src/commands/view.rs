//! View command implementation.
//!
//! Shows a profile either from a dump file or live from a profiling
//! server. Streamed views are reprinted every time a full snapshot or a
//! delta lands.

use super::models::ViewArgs;
use super::profile::print_snapshot;
use crate::output::{read_dump, write_dump, ProfileDump};
use crate::stats::Snapshot;
use crate::stream::{Applied, StreamClient};
use crate::utils::error::TransportError;
use anyhow::{Context, Result};
use log::{debug, info};
use std::path::Path;

/// Execute the view command
///
/// **Public** - main entry point called from main.rs
///
/// # Returns
/// The snapshot shown last, if any arrived
pub fn execute_view(args: ViewArgs) -> Result<Option<Snapshot>> {
    if Path::new(&args.target).exists() {
        let dump = read_dump(&args.target)
            .with_context(|| format!("Failed to read dump {}", args.target))?;
        println!("Dump taken {} (schema v{})", dump.generated_at, dump.version);
        print_snapshot(&dump.snapshot, &args.display);
        return Ok(Some(dump.snapshot));
    }

    info!("Connecting to {}", args.target);
    let mut client = StreamClient::connect(args.target.as_str())
        .with_context(|| format!("Failed to connect to {}", args.target))?;

    let mut shown = 0usize;
    while args.updates.map_or(true, |limit| shown < limit) {
        match client.next_update() {
            Ok(Applied::Replaced { seq }) | Ok(Applied::Merged { seq }) => {
                shown += 1;
                if let Some(snapshot) = client.view().snapshot() {
                    println!();
                    println!("=== update {} ===", seq);
                    print_snapshot(snapshot, &args.display);
                }
            }
            Ok(other) => debug!("Stream event: {:?}", other),
            Err(TransportError::Closed) => {
                info!("Server closed the stream after {} updates", shown);
                break;
            }
            Err(e) => return Err(e).context("Stream failed"),
        }
    }

    let last = client.into_view().into_snapshot();
    if let (Some(path), Some(snapshot)) = (&args.output_json, &last) {
        write_dump(&ProfileDump::new(snapshot.clone()), path)
            .context("Failed to write profile dump")?;
        info!("✓ Dump written to: {}", path.display());
    }
    Ok(last)
}
