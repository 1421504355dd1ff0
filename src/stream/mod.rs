//! Live streaming of statistics to viewers.
//!
//! The publisher fans snapshots out to in-process viewer queues; the server
//! bridges those queues to TCP viewers speaking the framed protocol.

pub mod client;
pub mod protocol;
pub mod publisher;
pub mod server;
pub mod view_state;

// Re-export main types
pub use client::StreamClient;
pub use protocol::{read_message, write_message, ClientMessage, ServerMessage};
pub use publisher::{PublishLoop, PublishReport, Publisher, PublisherConfig, ViewerLink};
pub use server::StreamServer;
pub use view_state::{Applied, ViewState};
