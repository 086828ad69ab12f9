//! Subsystem registry: one worker and one bounded FIFO per subsystem.
//!
//! Workers are created eagerly from the schema at startup. `send` is the
//! only way in: it never blocks the caller, fails on unknown subsystems
//! and reports queue congestion instead of stalling. Frames delivered to
//! one subsystem are dispatched in FIFO order; subsystems never block each
//! other.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use ocmp_common::proto::{Frame, Subsystem};
use ocmp_common::schema::Schema;
use ocmp_common::state::SubsystemState;
use thiserror::Error;
use tracing::{debug, error};

use crate::dispatch::{self, DispatchCtx};
use crate::BusError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("subsystem {0:?} does not exist, frame released")]
    UnknownSubsystem(Subsystem),

    #[error("subsystem {0:?} queue full, frame released")]
    QueueFull(Subsystem),

    #[error("subsystem {0:?} worker is gone, frame released")]
    Disconnected(Subsystem),
}

/// Cloneable sender side of the registry.
#[derive(Clone)]
pub struct RegistryHandle {
    senders: HashMap<Subsystem, Sender<Frame>>,
}

impl RegistryHandle {
    /// Enqueue a frame for a subsystem's worker and wake it.
    pub fn send(&self, id: Subsystem, frame: Frame) -> Result<(), SendError> {
        let tx = self
            .senders
            .get(&id)
            .ok_or(SendError::UnknownSubsystem(id))?;
        tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => SendError::QueueFull(id),
            TrySendError::Disconnected(_) => SendError::Disconnected(id),
        })
    }

    /// Whether a subsystem owns a worker in this registry.
    pub fn contains(&self, id: Subsystem) -> bool {
        self.senders.contains_key(&id)
    }

    /// Drop all senders so workers can drain and exit.
    pub(crate) fn close(&mut self) {
        self.senders.clear();
    }
}

/// Spawn one worker per schema subsystem.
///
/// Returns the sender handle plus the join handles the bus keeps for
/// shutdown.
pub(crate) fn start(
    schema: &Arc<Schema>,
    ctx: &DispatchCtx,
    queue_depth: usize,
) -> Result<(RegistryHandle, Vec<JoinHandle<()>>), BusError> {
    let mut senders = HashMap::new();
    let mut workers = Vec::new();

    for ss in schema.subsystems() {
        let (tx, rx) = bounded(queue_depth);
        senders.insert(ss.id, tx);

        let schema = Arc::clone(schema);
        let ctx = ctx.clone();
        let id = ss.id;
        let worker = thread::Builder::new()
            .name(format!("ss-{}", ss.name))
            .spawn(move || worker_loop(schema, id, ctx, rx))
            .map_err(BusError::Spawn)?;
        workers.push(worker);
    }

    Ok((RegistryHandle { senders }, workers))
}

fn worker_loop(schema: Arc<Schema>, id: Subsystem, ctx: DispatchCtx, rx: Receiver<Frame>) {
    let Some(ss) = schema.subsystem(id) else {
        error!("no schema entry for {id:?}, worker exiting");
        return;
    };

    let mut state = SubsystemState::PowerOn;
    debug!("{} worker up", ss.name);

    while let Ok(frame) = rx.recv() {
        dispatch::dispatch(&ctx, ss, &mut state, frame);
    }

    debug!("{} worker down (state {})", ss.name, state);
}
