//! Transport boundary.
//!
//! Physical interfaces (UART, Ethernet, USB, satellite) live outside the
//! kernel; all the bus needs is a sink per interface tag that accepts raw
//! frame bytes. Inbound traffic enters through
//! [`GossiperHandle::on_receive`](crate::gossiper::GossiperHandle::on_receive),
//! driven by whatever read loop the transport owns.

use std::collections::HashMap;
use std::sync::Arc;

use ocmp_common::proto::Interface;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport cannot accept the frame right now; the caller may
    /// retry.
    #[error("transport backlog full")]
    Backpressure,

    /// The transport is gone for good.
    #[error("transport closed")]
    Closed,

    #[error("transport i/o: {0}")]
    Io(String),
}

/// Outbound sink for one physical interface.
pub trait Transport: Send + Sync {
    /// Interface tag this transport serves.
    fn interface(&self) -> Interface;

    /// Hand a fully encoded frame to the interface for transmission.
    ///
    /// Must not block for more than a bounded time; congestion is reported
    /// as [`TransportError::Backpressure`], never by stalling the bus.
    fn deliver(&self, bytes: &[u8]) -> Result<(), TransportError>;
}

/// Registered transports, keyed by interface tag.
#[derive(Default)]
pub struct TransportMux {
    slots: HashMap<Interface, Arc<dyn Transport>>,
}

impl TransportMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transport for its interface tag, replacing any previous
    /// registration.
    pub fn register(&mut self, transport: Arc<dyn Transport>) {
        let tag = transport.interface();
        if self.slots.insert(tag, transport).is_some() {
            warn!("transport for {tag:?} replaced");
        }
    }

    pub fn get(&self, interface: Interface) -> Option<&Arc<dyn Transport>> {
        self.slots.get(&interface)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
