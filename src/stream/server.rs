//! TCP server streaming a live profile to remote viewers.
//!
//! One thread accepts connections. Every accepted viewer gets a writer
//! (the connection thread itself, draining the viewer's publisher queue)
//! and a reader for resync requests. A failing connection only ever takes
//! itself down.

use super::protocol::{read_message, write_message, ClientMessage, ServerMessage};
use super::publisher::{Publisher, ViewerLink};
use crate::stats::Mode;
use crate::utils::config::{HANDSHAKE_TIMEOUT, POLL_INTERVAL, PROTOCOL_VERSION};
use crate::utils::error::TransportError;
use crossbeam_channel::RecvTimeoutError;
use log::{debug, info, warn};
use std::io::ErrorKind;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Session parameters announced to every viewer
#[derive(Debug, Clone, Copy)]
struct SessionInfo {
    mode: Mode,
    publish_interval_ms: u64,
}

/// Running stream server
pub struct StreamServer {
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    acceptor: JoinHandle<()>,
}

impl StreamServer {
    /// Bind `addr` and start accepting viewers of `publisher`
    ///
    /// **Public** - entry point of remote profiling
    pub fn bind<A: ToSocketAddrs>(
        addr: A,
        publisher: Arc<Publisher>,
        mode: Mode,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let session = SessionInfo {
            mode,
            publish_interval_ms: u64::try_from(publisher.config().interval.as_millis())
                .unwrap_or(u64::MAX),
        };
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);

        let acceptor = thread::Builder::new()
            .name("callscope-accept".to_string())
            .spawn(move || accept_loop(listener, publisher, session, flag))?;

        info!("Streaming profile on {}", local_addr);
        Ok(Self {
            local_addr,
            shutdown,
            acceptor,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, close every connection and wait for the threads
    pub fn shutdown(self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if self.acceptor.join().is_err() {
            warn!("Accept thread panicked");
        }
        info!("Stream server on {} stopped", self.local_addr);
    }
}

fn accept_loop(
    listener: TcpListener,
    publisher: Arc<Publisher>,
    session: SessionInfo,
    shutdown: Arc<AtomicBool>,
) {
    let mut connections: Vec<JoinHandle<()>> = Vec::new();

    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                debug!("Connection from {}", peer);
                let publisher = Arc::clone(&publisher);
                let shutdown = Arc::clone(&shutdown);
                let spawned = thread::Builder::new()
                    .name(format!("callscope-viewer-{}", peer))
                    .spawn(move || {
                        if let Err(e) = serve_viewer(stream, peer, &publisher, session, &shutdown) {
                            warn!("Viewer {} dropped: {}", peer, e);
                        }
                    });
                match spawned {
                    Ok(handle) => connections.push(handle),
                    Err(e) => warn!("Cannot serve {}: {}", peer, e),
                }
                connections.retain(|handle| !handle.is_finished());
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                warn!("Accept failed: {}", e);
                thread::sleep(POLL_INTERVAL);
            }
        }
    }

    for handle in connections {
        let _ = handle.join();
    }
}

/// Expect a hello from a fresh connection
fn handshake(stream: &mut TcpStream) -> Result<(), TransportError> {
    stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;
    match read_message::<_, ClientMessage>(stream)? {
        ClientMessage::Hello { protocol_version } if protocol_version == PROTOCOL_VERSION => {
            stream.set_read_timeout(None)?;
            Ok(())
        }
        ClientMessage::Hello { protocol_version } => Err(TransportError::Handshake(format!(
            "viewer speaks protocol {}, server speaks {}",
            protocol_version, PROTOCOL_VERSION
        ))),
        other => Err(TransportError::Handshake(format!(
            "expected hello, got {:?}",
            other
        ))),
    }
}

fn serve_viewer(
    mut stream: TcpStream,
    peer: SocketAddr,
    publisher: &Arc<Publisher>,
    session: SessionInfo,
    shutdown: &AtomicBool,
) -> Result<(), TransportError> {
    stream.set_nonblocking(false)?;
    handshake(&mut stream)?;
    write_message(
        &mut stream,
        &ServerMessage::Welcome {
            protocol_version: PROTOCOL_VERSION,
            mode: session.mode,
            publish_interval_ms: session.publish_interval_ms,
        },
    )?;

    let link = publisher.connect(peer.to_string());
    let reader_done = Arc::new(AtomicBool::new(false));
    let reader = spawn_reader(stream.try_clone()?, link.id(), publisher, &reader_done)?;

    let result = pump_updates(&mut stream, &link, shutdown, &reader_done);

    let _ = stream.shutdown(Shutdown::Both);
    if reader.join().is_err() {
        warn!("Reader for {} panicked", peer);
    }
    debug!("Viewer {} finished", peer);
    result
}

/// Forward queued updates until the viewer, the publisher or the server goes away
fn pump_updates(
    stream: &mut TcpStream,
    link: &ViewerLink,
    shutdown: &AtomicBool,
    reader_done: &AtomicBool,
) -> Result<(), TransportError> {
    loop {
        if shutdown.load(Ordering::SeqCst) || reader_done.load(Ordering::SeqCst) {
            return Ok(());
        }
        match link.recv_timeout(POLL_INTERVAL) {
            Ok(message) => write_message(stream, &message)?,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
        }
    }
}

fn spawn_reader(
    mut stream: TcpStream,
    viewer: u64,
    publisher: &Arc<Publisher>,
    done: &Arc<AtomicBool>,
) -> Result<JoinHandle<()>, TransportError> {
    let publisher = Arc::clone(publisher);
    let done = Arc::clone(done);

    let handle = thread::Builder::new()
        .name(format!("callscope-viewer-{}-reader", viewer))
        .spawn(move || {
            loop {
                match read_message::<_, ClientMessage>(&mut stream) {
                    Ok(ClientMessage::Resync) => publisher.resync(viewer),
                    Ok(ClientMessage::Hello { .. }) => debug!("Ignoring repeated hello"),
                    Err(TransportError::Closed) => break,
                    Err(e) => {
                        debug!("Viewer {} read ended: {}", viewer, e);
                        break;
                    }
                }
            }
            done.store(true, Ordering::SeqCst);
        })?;
    Ok(handle)
}
