//! CLI command implementations.
//!
//! Each command is implemented in its own module.
//! Commands orchestrate the various library components to perform user tasks.

pub mod live;
pub mod models;
pub mod profile;
pub mod remote;
pub mod utils;
pub mod view;

// Re-export main command functions
pub use live::execute_live;
pub use models::{
    CollectorArgs, CollectorKind, DisplayArgs, LiveArgs, ProfileArgs, ServeArgs, TimerKind,
    ViewArgs,
};
pub use profile::{build_profiler, execute_profile};
pub use remote::execute_serve;
pub use utils::{display_schema, display_version, render_dump_flamegraph, validate_dump_file};
pub use view::execute_view;
