//! Dispatcher ("gossiper"): the media-dependent edge of the bus.
//!
//! Inbound: transports push raw bytes through [`GossiperHandle`], which
//! decodes the frame, stamps the ingress interface into the header and
//! forwards it to the Router. Outbound: a worker drains the reply queue
//! and demultiplexes each frame back to its transport by the header's
//! interface tag.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use ocmp_common::proto::{Frame, FrameError, Interface};
use thiserror::Error;
use tracing::{debug, warn};

use crate::router::RouterEvent;
use crate::transport::TransportMux;

/// Errors reported back to a transport's read loop.
#[derive(Debug, Error)]
pub enum IngressError {
    /// The bytes did not decode to a valid frame; it is dropped.
    #[error("frame rejected: {0}")]
    Decode(#[from] FrameError),

    /// The router queue is full; the transport may retry the same bytes.
    #[error("router queue full")]
    Backpressure,

    /// The bus is shut down.
    #[error("bus closed")]
    Closed,
}

/// Cloneable ingress handle given to every transport read loop.
#[derive(Clone)]
pub struct GossiperHandle {
    router: Sender<RouterEvent>,
}

impl GossiperHandle {
    pub(crate) fn new(router: Sender<RouterEvent>) -> Self {
        Self { router }
    }

    /// Decode `bytes` received on `interface` and forward the frame inbound.
    ///
    /// Never blocks: congestion surfaces as [`IngressError::Backpressure`]
    /// so the transport can apply its own retry policy.
    pub fn on_receive(&self, bytes: &[u8], interface: Interface) -> Result<(), IngressError> {
        let mut frame = Frame::decode(bytes)?;
        frame.header.interface = interface;
        debug!(
            "rx frame on {:?}: len {} seq {} ts {}",
            interface,
            frame.message.payload.len(),
            frame.header.seq,
            frame.header.timestamp,
        );
        self.router
            .try_send(RouterEvent::Inbound(frame))
            .map_err(|e| match e {
                TrySendError::Full(_) => IngressError::Backpressure,
                TrySendError::Disconnected(_) => IngressError::Closed,
            })
    }
}

/// Outbound worker: frames from the Router out to their transports.
pub(crate) fn outbound_loop(rx: Receiver<Frame>, transports: TransportMux) {
    while let Ok(frame) = rx.recv() {
        let interface = frame.header.interface;
        match transports.get(interface) {
            Some(transport) => {
                let bytes = frame.encode();
                if let Err(e) = transport.deliver(&bytes) {
                    warn!("tx on {interface:?} failed: {e}, frame dropped");
                }
            }
            None => warn!("no transport registered for {interface:?}, frame dropped"),
        }
    }
    debug!("gossiper outbound worker down");
}
