//! Viewer side of the remote streaming protocol.

use super::protocol::{read_message, write_message, ClientMessage, ServerMessage};
use super::view_state::{Applied, ViewState};
use crate::utils::config::{HANDSHAKE_TIMEOUT, PROTOCOL_VERSION};
use crate::utils::error::TransportError;
use log::{debug, info};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Connection to a profiling server
pub struct StreamClient {
    stream: TcpStream,
    view: ViewState,
}

impl StreamClient {
    /// Connect and complete the handshake
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, TransportError> {
        let mut stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;
        write_message(
            &mut stream,
            &ClientMessage::Hello {
                protocol_version: PROTOCOL_VERSION,
            },
        )?;

        let welcome = read_message::<_, ServerMessage>(&mut stream)?;
        let mut view = ViewState::new();
        match welcome {
            ServerMessage::Welcome {
                protocol_version, ..
            } if protocol_version != PROTOCOL_VERSION => {
                return Err(TransportError::Handshake(format!(
                    "server speaks protocol {}, viewer speaks {}",
                    protocol_version, PROTOCOL_VERSION
                )));
            }
            message @ ServerMessage::Welcome { .. } => {
                view.apply(message)?;
            }
            other => {
                return Err(TransportError::Handshake(format!(
                    "expected welcome, got message {:?}",
                    other.seq()
                )));
            }
        }

        stream.set_read_timeout(None)?;
        if let Some(mode) = view.mode() {
            info!("Connected to {} profiler", mode);
        }
        Ok(Self { stream, view })
    }

    /// Limit how long [`next_update`](Self::next_update) blocks
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), TransportError> {
        self.stream.set_read_timeout(timeout)?;
        Ok(())
    }

    /// Wait for the next server message and fold it into the view
    ///
    /// The first delta that does not continue the view triggers one resync
    /// request; the view catches up with the next full snapshot.
    pub fn next_update(&mut self) -> Result<Applied, TransportError> {
        let message = read_message::<_, ServerMessage>(&mut self.stream)?;
        let applied = self.view.apply(message)?;
        if let Applied::Gap {
            have,
            base,
            first: true,
        } = applied
        {
            debug!("Missed updates (have {:?}, need {}), asking for resync", have, base);
            self.request_resync()?;
        }
        Ok(applied)
    }

    /// Ask the server for a full snapshot
    pub fn request_resync(&mut self) -> Result<(), TransportError> {
        write_message(&mut self.stream, &ClientMessage::Resync)
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn into_view(self) -> ViewState {
        self.view
    }
}
