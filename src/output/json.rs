//! JSON dump writer and reader.
//!
//! A dump is a [`ProfileDump`]: the schema version, when it was taken, and
//! one [`Snapshot`]. Loading a dump and writing it back yields the same
//! document.

use crate::stats::Snapshot;
use crate::utils::config::SCHEMA_VERSION;
use crate::utils::error::OutputError;
use chrono::Utc;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// On-disk record of one profiling session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDump {
    /// Schema version
    pub version: String,

    /// RFC 3339 timestamp of the dump
    pub generated_at: String,

    /// The statistics
    pub snapshot: Snapshot,
}

impl ProfileDump {
    /// Dump of `snapshot` stamped with the current time
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            version: SCHEMA_VERSION.to_string(),
            generated_at: Utc::now().to_rfc3339(),
            snapshot,
        }
    }
}

/// Write a dump to a JSON file
///
/// **Public** - main entry point for dump output
///
/// # Errors
/// * `OutputError::WriteFailed` - I/O error during write
/// * `OutputError::SerializationFailed` - JSON serialization error
/// * `OutputError::InvalidPath` - Path cannot be created or is invalid
pub fn write_dump(dump: &ProfileDump, output_path: impl AsRef<Path>) -> Result<(), OutputError> {
    let output_path = output_path.as_ref();

    info!("Writing dump to: {}", output_path.display());
    validate_output_path(output_path)?;
    create_parent_dirs(output_path)?;

    let file = File::create(output_path).map_err(OutputError::WriteFailed)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, dump).map_err(OutputError::SerializationFailed)?;
    writer.flush().map_err(OutputError::WriteFailed)?;

    info!(
        "Dump written successfully ({} bytes)",
        calculate_file_size(output_path)
    );
    Ok(())
}

/// Serialize a dump to a string
pub fn dump_to_string(dump: &ProfileDump) -> Result<String, OutputError> {
    serde_json::to_string_pretty(dump).map_err(OutputError::SerializationFailed)
}

/// Read a dump from a JSON file
///
/// **Public** - used by `view`, `flamegraph` and `validate`
///
/// # Errors
/// * `OutputError::WriteFailed` - File read error (reusing WriteFailed for I/O)
/// * `OutputError::SerializationFailed` - JSON parse error
/// * `OutputError::UnsupportedVersion` - dump from an incompatible schema
pub fn read_dump(input_path: impl AsRef<Path>) -> Result<ProfileDump, OutputError> {
    let input_path = input_path.as_ref();
    debug!("Reading dump from: {}", input_path.display());

    let file = File::open(input_path).map_err(OutputError::WriteFailed)?;
    let mut dump: ProfileDump =
        serde_json::from_reader(BufReader::new(file)).map_err(OutputError::SerializationFailed)?;
    check_version(&dump.version)?;

    // Lookups expect siblings sorted by call site; edited dumps may not be.
    dump.snapshot.stats = dump.snapshot.to_tree().freeze();

    debug!(
        "Dump loaded: version {}, {} mode, {} root nodes",
        dump.version,
        dump.snapshot.mode,
        dump.snapshot.stats.len()
    );
    Ok(dump)
}

/// Dumps with the same major version are readable
fn check_version(version: &str) -> Result<(), OutputError> {
    let major = |v: &str| v.split('.').next().map(str::to_string);
    if major(version).is_some() && major(version) == major(SCHEMA_VERSION) {
        Ok(())
    } else {
        Err(OutputError::UnsupportedVersion(version.to_string()))
    }
}

/// Validate that output path is writable
///
/// **Private** - internal validation
fn validate_output_path(path: &Path) -> Result<(), OutputError> {
    if path.as_os_str().is_empty() {
        return Err(OutputError::InvalidPath("Path is empty".to_string()));
    }

    if path.exists() && path.is_dir() {
        return Err(OutputError::InvalidPath(format!(
            "Path is a directory: {}",
            path.display()
        )));
    }

    Ok(())
}

pub(crate) fn create_parent_dirs(path: &Path) -> Result<(), OutputError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            debug!("Creating parent directories: {}", parent.display());
            std::fs::create_dir_all(parent).map_err(|e| {
                OutputError::InvalidPath(format!(
                    "Cannot create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }
    Ok(())
}

fn calculate_file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}
