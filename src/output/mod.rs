//! Output writers for dumps, flamegraphs and text listings.
//!
//! - JSON dumps (write and read back)
//! - SVG flamegraphs
//! - Text call tree tables

pub mod json;
pub mod svg;
pub mod table;

// Re-export main functions
pub use json::{dump_to_string, read_dump, write_dump, ProfileDump};
pub use svg::write_svg;
pub use table::{format_duration, render_flat, render_table};
