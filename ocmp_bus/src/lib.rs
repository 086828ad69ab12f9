//! # OCMP Message Bus
//!
//! The routing and orchestration kernel of the embedded controller:
//! frames enter from transports, are routed to per-subsystem workers,
//! dispatched to driver callbacks through the static schema, and replies,
//! alerts and self-test reports flow back out. See the module docs of
//! [`gossiper`], [`router`], [`registry`], [`dispatch`], [`post`] and
//! [`alert`] for the individual stages.
//!
//! # Wiring
//!
//! ```text
//! transport → Gossiper → Router → subsystem worker → driver
//!                 ↑         ↓  ↖ POST engine (cycle sequencing)
//!                 └─────────┘
//! ```
//!
//! [`MessageBus::start`] builds the whole assembly from a validated
//! [`Schema`] and returns once every worker is up. Dropping the bus (or
//! calling [`MessageBus::shutdown`]) stops and joins all workers.

pub mod alert;
pub mod dispatch;
pub mod gossiper;
pub mod post;
pub mod registry;
pub mod router;
pub mod transport;

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::bounded;
use ocmp_common::config::EcConfig;
use ocmp_common::postdata::PostData;
use ocmp_common::proto::{Action, Frame, MsgType, Subsystem};
use ocmp_common::schema::Schema;
use thiserror::Error;
use tracing::{info, warn};

use crate::alert::AlertGenerator;
use crate::dispatch::DispatchCtx;
use crate::gossiper::GossiperHandle;
use crate::post::{PostEngine, PostLedger};
use crate::registry::RegistryHandle;
use crate::router::RouterEvent;
use crate::transport::TransportMux;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Tunables the bus takes from the EC configuration.
#[derive(Debug, Clone)]
pub struct BusOptions {
    /// Capacity of every bounded queue in the kernel.
    pub queue_depth: usize,
    /// Seed the POST cycle at startup.
    pub run_post: bool,
}

impl Default for BusOptions {
    fn default() -> Self {
        Self {
            queue_depth: 16,
            run_post: true,
        }
    }
}

impl From<&EcConfig> for BusOptions {
    fn from(config: &EcConfig) -> Self {
        Self {
            queue_depth: config.queue_depth,
            run_post: config.run_post,
        }
    }
}

/// The running bus: owns every worker thread.
pub struct MessageBus {
    router_tx: crossbeam_channel::Sender<RouterEvent>,
    registry: RegistryHandle,
    ledger: PostLedger,
    workers: Vec<JoinHandle<()>>,
}

impl MessageBus {
    /// Build and start the kernel: one worker per schema subsystem, the
    /// router, the POST engine and the dispatcher's outbound worker.
    pub fn start(
        schema: Arc<Schema>,
        transports: TransportMux,
        options: BusOptions,
    ) -> Result<Self, BusError> {
        let depth = options.queue_depth;
        let (router_tx, router_rx) = bounded(depth);
        let (outbound_tx, outbound_rx) = bounded(depth);
        let (post_tx, post_rx) = bounded(depth);

        let ledger = PostLedger::new();
        let alerts = Arc::new(AlertGenerator::new(Arc::clone(&schema), router_tx.clone()));

        let ctx = DispatchCtx {
            schema: Arc::clone(&schema),
            router: router_tx.clone(),
            post: post_tx.clone(),
            ledger: ledger.clone(),
            alerts,
        };

        let (registry, mut workers) = registry::start(&schema, &ctx, depth)?;
        drop(ctx);

        let router_worker = {
            let registry = registry.clone();
            let post_tx = post_tx.clone();
            let outbound_tx = outbound_tx.clone();
            let rx = router_rx;
            thread::Builder::new()
                .name("ocmp-router".to_string())
                .spawn(move || router::router_loop(rx, registry, post_tx, outbound_tx))
                .map_err(BusError::Spawn)?
        };
        workers.push(router_worker);
        drop(post_tx);
        drop(outbound_tx);

        let post_worker = {
            let order: Vec<Subsystem> = schema.subsystems().iter().map(|ss| ss.id).collect();
            let engine = PostEngine::new(router_tx.clone(), ledger.clone(), order);
            thread::Builder::new()
                .name("ocmp-post".to_string())
                .spawn(move || engine.run(post_rx))
                .map_err(BusError::Spawn)?
        };
        workers.push(post_worker);

        let gossiper_worker = thread::Builder::new()
            .name("ocmp-gossiper".to_string())
            .spawn(move || gossiper::outbound_loop(outbound_rx, transports))
            .map_err(BusError::Spawn)?;
        workers.push(gossiper_worker);

        info!(
            "message bus up: {} subsystem workers, queue depth {depth}",
            schema.subsystems().len()
        );

        let bus = Self {
            router_tx,
            registry,
            ledger,
            workers,
        };

        if options.run_post {
            bus.seed_post();
        }

        Ok(bus)
    }

    /// Inject the synthetic kernel-addressed frame that seeds the POST
    /// cycle.
    fn seed_post(&self) {
        match Frame::request(Subsystem::Kernel, MsgType::Post, Action::Active, 0, 0, 1) {
            Ok(frame) => {
                if self
                    .router_tx
                    .try_send(RouterEvent::Inbound(frame))
                    .is_err()
                {
                    warn!("router queue full at boot, POST not seeded");
                }
            }
            Err(e) => warn!("out of memory for POST seed frame: {e}"),
        }
    }

    /// Ingress handle for transport read loops.
    pub fn handle(&self) -> GossiperHandle {
        GossiperHandle::new(self.router_tx.clone())
    }

    /// Sender side of the subsystem registry.
    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    /// Snapshot of the accumulated POST records.
    pub fn post_results(&self) -> Vec<PostData> {
        self.ledger.snapshot()
    }

    /// Stop every worker and wait for them. Idempotent; also runs on drop.
    pub fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        info!("message bus shutting down");
        // The router drains what is queued, then stops; closing the
        // registry handle lets subsystem workers run dry and exit.
        let _ = self.router_tx.send(RouterEvent::Shutdown);
        self.registry.close();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        info!("message bus down");
    }
}

impl Drop for MessageBus {
    fn drop(&mut self) {
        self.shutdown();
    }
}
