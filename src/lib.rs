//! callscope
//!
//! Call-tree profiling with a deterministic tracing collector, a
//! statistical sampling collector, and live streaming of the statistics
//! to local or remote viewers.
//!
//! This crate provides the core implementation for the `callscope` CLI
//! tool. A host program exposes its call stacks through the
//! [`collector::TracingSource`] and [`collector::SamplingSource`] traits
//! ([`host::ShadowStack`] is a ready-made one), and a [`profiler::Profiler`]
//! turns them into a [`stats::Snapshot`].
//!
//! ## Getting Started
//!
//! ```bash
//! cargo install callscope
//! callscope profile --table
//! ```

pub mod aggregator;
pub mod collector;
pub mod commands;
pub mod demo;
pub mod flamegraph;
pub mod frame;
pub mod host;
pub mod output;
pub mod profiler;
pub mod stats;
pub mod stream;
pub mod utils;
