//! TCP transport adapter on the Ethernet interface tag.
//!
//! One OCMP frame per read: the fixed 17-byte head is read first, the
//! payload length byte tells how much follows. Replies are written back
//! to every connected peer (the demo EC has no per-peer session state,
//! matching the broadcast behavior of the hardware's management port).

use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use ocmp_bus::gossiper::{GossiperHandle, IngressError};
use ocmp_bus::transport::{Transport, TransportError};
use ocmp_common::proto::{frame, Interface, PAYLOAD_MAX};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

const FRAME_HEAD: usize = frame::HEADER_LEN + frame::MESSAGE_HEAD_LEN;

pub struct TcpTransport {
    listener: Mutex<Option<TcpListener>>,
    peers: Mutex<Vec<TcpStream>>,
}

impl TcpTransport {
    /// Bind the listening socket; the accept loop starts later, once the
    /// bus exists and an ingress handle is available.
    pub fn bind(addr: &str) -> io::Result<Arc<Self>> {
        let listener = TcpListener::bind(addr)?;
        info!("tcp transport listening on {addr}");
        Ok(Arc::new(Self {
            listener: Mutex::new(Some(listener)),
            peers: Mutex::new(Vec::new()),
        }))
    }

    /// Spawn the accept loop feeding frames into the bus.
    pub fn start(self: &Arc<Self>, handle: GossiperHandle) -> io::Result<()> {
        let listener = self.listener.lock().take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::AlreadyExists, "accept loop already started")
        })?;
        let this = Arc::clone(self);
        thread::Builder::new()
            .name("tcp-accept".to_string())
            .spawn(move || this.accept_loop(listener, handle))?;
        Ok(())
    }

    fn accept_loop(self: Arc<Self>, listener: TcpListener, handle: GossiperHandle) {
        for conn in listener.incoming() {
            match conn {
                Ok(stream) => {
                    let peer = stream
                        .peer_addr()
                        .map(|a| a.to_string())
                        .unwrap_or_else(|_| "<unknown>".to_string());
                    info!("tcp peer connected: {peer}");
                    match stream.try_clone() {
                        Ok(write_half) => self.peers.lock().push(write_half),
                        Err(e) => {
                            warn!("tcp clone for {peer} failed: {e}");
                            continue;
                        }
                    }
                    let handle = handle.clone();
                    let spawned = thread::Builder::new()
                        .name(format!("tcp-rx-{peer}"))
                        .spawn(move || read_loop(stream, handle));
                    if let Err(e) = spawned {
                        warn!("tcp reader spawn failed: {e}");
                    }
                }
                Err(e) => {
                    warn!("tcp accept failed: {e}");
                    break;
                }
            }
        }
        debug!("tcp accept loop down");
    }
}

impl Transport for TcpTransport {
    fn interface(&self) -> Interface {
        Interface::Ethernet
    }

    fn deliver(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut peers = self.peers.lock();
        if peers.is_empty() {
            return Err(TransportError::Closed);
        }
        peers.retain_mut(|stream| match stream.write_all(bytes) {
            Ok(()) => true,
            Err(e) => {
                warn!("tcp peer dropped: {e}");
                false
            }
        });
        Ok(())
    }
}

/// Read exactly one frame: fixed head, then the declared payload.
fn read_frame(stream: &mut impl Read) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; FRAME_HEAD];
    stream.read_exact(&mut buf)?;
    let payload_len = buf[1] as usize;
    if payload_len > PAYLOAD_MAX {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("declared payload {payload_len} exceeds {PAYLOAD_MAX}"),
        ));
    }
    buf.resize(FRAME_HEAD + payload_len, 0);
    stream.read_exact(&mut buf[FRAME_HEAD..])?;
    Ok(buf)
}

fn read_loop(mut stream: TcpStream, handle: GossiperHandle) {
    loop {
        let bytes = match read_frame(&mut stream) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                debug!("tcp peer closed");
                return;
            }
            Err(e) => {
                warn!("tcp read failed: {e}");
                return;
            }
        };
        match handle.on_receive(&bytes, Interface::Ethernet) {
            Ok(()) => {}
            Err(IngressError::Backpressure) => {
                warn!("router congested, frame dropped");
            }
            Err(IngressError::Closed) => {
                debug!("bus closed, tcp reader exiting");
                return;
            }
            Err(e) => warn!("frame rejected: {e}"),
        }
    }
}
