//! Router ("big brother"): the single point every frame passes through.
//!
//! Inbound frames addressed to the kernel sentinel with the POST kind go
//! to the POST engine; everything else inbound is forwarded to the owning
//! subsystem's queue. Every outbound frame (replies, alerts, the terminal
//! POST report) is forwarded to the Dispatcher for transmission. A frame
//! whose subsystem does not exist is logged and released — no reply.

use crossbeam_channel::{Receiver, Sender};
use ocmp_common::proto::{Frame, MsgType, Subsystem};
use tracing::{debug, warn};

use crate::post::PostEvent;
use crate::registry::RegistryHandle;

/// Event processed by the router worker.
pub(crate) enum RouterEvent {
    /// A frame entering the bus (from a transport or the POST engine).
    Inbound(Frame),
    /// A frame leaving the bus (subsystem reply, alert, POST report).
    Outbound(Frame),
    /// Orderly stop.
    Shutdown,
}

pub(crate) fn router_loop(
    rx: Receiver<RouterEvent>,
    registry: RegistryHandle,
    post: Sender<PostEvent>,
    outbound: Sender<Frame>,
) {
    while let Ok(event) = rx.recv() {
        match event {
            RouterEvent::Inbound(frame) => {
                debug!(
                    "inbound frame: ss {:?} kind {:?} action {:?} seq {}",
                    frame.message.subsystem,
                    frame.message.kind,
                    frame.message.action,
                    frame.header.seq,
                );
                if frame.message.subsystem == Subsystem::Kernel {
                    if frame.message.kind == MsgType::Post {
                        if post.try_send(PostEvent::Kernel(frame)).is_err() {
                            warn!("POST engine queue unavailable, kernel frame dropped");
                        }
                    } else {
                        warn!(
                            "kernel-addressed {:?} frame has no handler, dropped",
                            frame.message.kind
                        );
                    }
                } else if let Err(e) = registry.send(frame.message.subsystem, frame) {
                    warn!("{e}");
                }
            }
            RouterEvent::Outbound(frame) => {
                if outbound.try_send(frame).is_err() {
                    warn!("dispatcher queue unavailable, outbound frame dropped");
                }
            }
            RouterEvent::Shutdown => break,
        }
    }
    debug!("router worker down");
}
