//! Configuration and constants for the profiler, the stream and the CLI.

use std::time::Duration;

/// Current dump schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Version spoken on the remote streaming protocol
pub const PROTOCOL_VERSION: u32 = 1;

/// Default sampling interval (1ms)
pub const DEFAULT_SAMPLING_INTERVAL: Duration = Duration::from_millis(1);

/// Default publish interval for live and remote profiling
pub const DEFAULT_PUBLISH_INTERVAL: Duration = Duration::from_secs(5);

/// Default address the remote profiling server binds to
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8912";

/// Pending updates kept per viewer before the oldest is dropped
pub const VIEWER_QUEUE_CAPACITY: usize = 8;

/// Largest frame accepted on the wire (64 MiB)
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// How long a new connection may take to send its hello
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Elapsed times above this are treated as clock errors and clamped to zero
pub const MAX_REASONABLE_ELAPSED: Duration = Duration::from_secs(24 * 60 * 60);

/// How often blocking accept/read loops check for shutdown
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Number of hot paths printed by default
pub const DEFAULT_TOP_PATHS: usize = 10;
