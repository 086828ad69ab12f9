//! Power-on self-test: record ledger, schema walk and sequencing engine.
//!
//! The engine walks every subsystem exactly once per cycle. A cycle is
//! seeded by a synthetic kernel-addressed POST frame at boot; each
//! subsystem's worker runs its own device walk and acknowledges back to
//! the engine, which ANDs the result into the aggregate, advances the
//! cursor and activates the next subsystem. After the last acknowledgment
//! the terminal report goes out through the Router and the cursor returns
//! to the first subsystem.
//!
//! A subsystem that fails never aborts the cycle; it is marked faulty and
//! the cursor moves on.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use heapless::Vec as HVec;
use ocmp_common::postdata::{PostCode, PostData, POST_RECORDS};
use ocmp_common::proto::{Action, Frame, MsgType, Subsystem, PAYLOAD_MAX};
use ocmp_common::schema::{AlertData, AlertSink, Driver, SubsystemSchema};
use ocmp_common::state::SubsystemState;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::router::RouterEvent;

/// Events handled by the POST engine worker.
pub(crate) enum PostEvent {
    /// Kernel-addressed POST frame from the Router (the boot seed).
    Kernel(Frame),
    /// A subsystem worker finished its walk; payload\[0\] carries pass/fail.
    WalkDone(Frame),
    /// Host armed the self-test; start a cycle if none is running.
    Enable { subsystem: Subsystem },
}

// ─── Record ledger ──────────────────────────────────────────────────

/// Shared, bounded table of POST records.
///
/// Written by subsystem workers during their walks (the engine serializes
/// walks, so contention is nil) and read by `post get` queries and the
/// diagnostic dump.
#[derive(Clone, Default)]
pub struct PostLedger {
    inner: Arc<Mutex<LedgerInner>>,
}

#[derive(Default)]
struct LedgerInner {
    records: HVec<PostData, POST_RECORDS>,
    next_serial: u8,
    pending_reset: bool,
}

impl PostLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the start of a fresh cycle. The table is cleared lazily, when
    /// the first device of the new run is recorded.
    pub(crate) fn begin_run(&self) {
        self.inner.lock().pending_reset = true;
    }

    /// Append a record, assigning the next device serial number.
    ///
    /// Returns `None` when the table is full; the record is dropped and
    /// the caller logs, nothing else fails.
    pub(crate) fn push(&self, mut record: PostData) -> Option<u8> {
        let mut inner = self.inner.lock();
        if inner.pending_reset {
            inner.records.clear();
            inner.next_serial = 0;
            inner.pending_reset = false;
        }
        if inner.records.is_full() {
            return None;
        }
        inner.next_serial = inner.next_serial.wrapping_add(1);
        record.serial = inner.next_serial;
        let serial = record.serial;
        let _ = inner.records.push(record);
        Some(serial)
    }

    /// Records belonging to one subsystem, in probe order.
    pub fn records_for(&self, subsystem: Subsystem) -> Vec<PostData> {
        self.inner
            .lock()
            .records
            .iter()
            .filter(|rec| rec.subsystem == subsystem)
            .copied()
            .collect()
    }

    /// All records, in probe order.
    pub fn snapshot(&self) -> Vec<PostData> {
        self.inner.lock().records.iter().copied().collect()
    }
}

// ─── Device walk (runs on the subsystem worker) ─────────────────────

/// Probe and, on the boot pass, initialize every POST-enabled device of a
/// subsystem. Returns the subsystem's overall pass/fail.
pub(crate) fn run_subsystem_post(
    ss: &SubsystemSchema,
    state: &mut SubsystemState,
    ledger: &PostLedger,
    sink: &Arc<dyn AlertSink>,
) -> bool {
    if *state == SubsystemState::PowerOn {
        *state = SubsystemState::Init;
    }

    if let Some(hooks) = &ss.hooks {
        if !hooks.pre_init(*state) {
            warn!("{}: pre-init hook vetoed the walk", ss.name);
            *state = SubsystemState::Faulty;
            return false;
        }
    }

    let initializing = *state == SubsystemState::Init;
    let mut all_ok = true;

    for (comp_idx, comp) in ss.components.iter().enumerate() {
        // The alert slot order is: component driver first, then devices.
        let comp_has_driver = comp.driver.is_some();
        if let Some(driver) = comp.driver.as_deref() {
            if !comp.post_disabled {
                let origin = AlertData {
                    subsystem: ss.id,
                    component_id: comp_idx as u8,
                    device_id: 0,
                };
                all_ok &=
                    post_device(ss, comp.name, driver, origin, initializing, ledger, sink);
            }
        }
        for (dev_idx, dev) in comp.devices.iter().enumerate() {
            if dev.post_disabled {
                continue;
            }
            let origin = AlertData {
                subsystem: ss.id,
                component_id: comp_idx as u8,
                device_id: dev_idx as u8 + comp_has_driver as u8,
            };
            all_ok &= post_device(
                ss,
                dev.name,
                dev.driver.as_ref(),
                origin,
                initializing,
                ledger,
                sink,
            );
        }
    }

    if let Some(hooks) = &ss.hooks {
        if !hooks.post_init(*state) {
            warn!("{}: post-init hook declined", ss.name);
            *state = SubsystemState::Faulty;
            return false;
        }
    }

    if initializing {
        *state = if all_ok {
            SubsystemState::Config
        } else {
            SubsystemState::Faulty
        };
    } else if !all_ok {
        *state = SubsystemState::Faulty;
    }

    info!(
        "{}: modules and sensors are {}initialized (state {})",
        ss.name,
        if all_ok { "" } else { "not " },
        state,
    );
    all_ok
}

fn post_device(
    ss: &SubsystemSchema,
    name: &str,
    driver: &dyn Driver,
    origin: AlertData,
    initializing: bool,
    ledger: &PostLedger,
    sink: &Arc<dyn AlertSink>,
) -> bool {
    let mut record = PostData::missing(ss.id, 0);
    let probe = driver.probe();
    if let Some(info) = &probe.info {
        record.record_info(info);
    }
    record.status = probe.code;

    let mut ok = probe.code == PostCode::DevFound;
    debug!(
        "{}: {} ({}) {}",
        ss.name,
        name,
        driver.name(),
        if ok { "found" } else { "not found" },
    );

    if initializing && ok {
        let token = ocmp_common::schema::AlertToken::new(origin, sink.clone());
        let code = driver.init(token);
        record.status = code;
        ok = code.passed();
        debug!(
            "{}: configuration status for {} ({}) is {}",
            ss.name,
            name,
            driver.name(),
            if ok { "OK" } else { "NOT OK" },
        );
    }

    if ledger.push(record).is_none() {
        warn!("{}: POST record table full, {} not recorded", ss.name, name);
    }
    ok
}

/// Pack this subsystem's accumulated records into a `post get` reply.
/// The bitmap reports how many records fit.
pub(crate) fn fill_results(ledger: &PostLedger, frame: &mut Frame) {
    let records = ledger.records_for(frame.message.subsystem);
    let max = PAYLOAD_MAX / PostData::WIRE_SIZE;
    let fit = records.len().min(max);
    if records.len() > fit {
        warn!(
            "{:?}: {} POST records exceed one frame, {} dropped",
            frame.message.subsystem,
            records.len(),
            records.len() - fit,
        );
    }

    frame.message.payload.clear();
    for record in &records[..fit] {
        let _ = frame.message.payload.extend_from_slice(&record.pack());
    }
    frame.message.parameters = fit as u16;
}

// ─── Sequencing engine ──────────────────────────────────────────────

pub(crate) struct PostEngine {
    router: Sender<RouterEvent>,
    ledger: PostLedger,
    /// Subsystems in schema order; the cursor walks this exactly once per
    /// cycle.
    order: Vec<Subsystem>,
    cursor: usize,
    aggregate: bool,
    running: bool,
}

impl PostEngine {
    pub(crate) fn new(
        router: Sender<RouterEvent>,
        ledger: PostLedger,
        order: Vec<Subsystem>,
    ) -> Self {
        Self {
            router,
            ledger,
            order,
            cursor: 0,
            aggregate: true,
            running: false,
        }
    }

    pub(crate) fn run(mut self, rx: Receiver<PostEvent>) {
        while let Ok(event) = rx.recv() {
            self.handle(event);
        }
        debug!("POST engine down");
    }

    fn handle(&mut self, event: PostEvent) {
        match event {
            PostEvent::Kernel(frame) => {
                if frame.message.action == Action::Active {
                    self.start_cycle();
                } else {
                    debug!(
                        "kernel POST frame with action {:?} ignored",
                        frame.message.action
                    );
                }
            }
            PostEvent::Enable { subsystem } => {
                info!("POST armed by {subsystem:?}");
                if !self.running {
                    self.start_cycle();
                }
            }
            PostEvent::WalkDone(frame) => self.on_walk_done(frame),
        }
    }

    fn start_cycle(&mut self) {
        if self.running {
            debug!("POST cycle already running, kick ignored");
            return;
        }
        self.ledger.begin_run();
        self.aggregate = true;
        self.cursor = 0;
        self.running = true;
        if self.order.is_empty() {
            self.complete();
        } else {
            info!("POST cycle started over {} subsystems", self.order.len());
            self.activate(self.order[0]);
        }
    }

    /// Inject an activation frame for one subsystem into the normal
    /// inbound path.
    fn activate(&self, subsystem: Subsystem) {
        debug!("activating POST for {subsystem:?}");
        match Frame::request(subsystem, MsgType::Post, Action::Active, 0, 0, 1) {
            Ok(frame) => {
                if self
                    .router
                    .try_send(RouterEvent::Inbound(frame))
                    .is_err()
                {
                    warn!("router unavailable, POST activation for {subsystem:?} dropped");
                }
            }
            Err(e) => warn!("out of memory for POST activation: {e}"),
        }
    }

    fn on_walk_done(&mut self, frame: Frame) {
        if !self.running {
            warn!(
                "unexpected POST ack from {:?} outside a cycle",
                frame.message.subsystem
            );
            return;
        }

        let expected = self.order[self.cursor];
        if frame.message.subsystem != expected {
            warn!(
                "POST ack from {:?} while waiting on {expected:?}, ignored",
                frame.message.subsystem
            );
            return;
        }

        let passed = frame.message.payload.first().is_some_and(|&b| b == 0);
        self.aggregate &= passed;
        debug!(
            "POST status for {expected:?} is {}, aggregate {}",
            passed, self.aggregate
        );

        self.cursor += 1;
        if self.cursor == self.order.len() {
            self.complete();
        } else {
            self.activate(self.order[self.cursor]);
        }
    }

    /// Terminal report: one kernel-addressed frame through the Router.
    fn complete(&mut self) {
        self.running = false;
        self.cursor = 0;

        let records = self.ledger.snapshot();
        info!(
            "POST complete: {} device records, aggregate {}",
            records.len(),
            if self.aggregate { "PASS" } else { "FAIL" },
        );
        for record in &records {
            debug!(
                "POST result ss {:?} sno {} bus 0x{:02x} addr 0x{:02x} man 0x{:04x} dev 0x{:04x} status {:?}",
                record.subsystem,
                record.serial,
                record.bus,
                record.addr,
                record.manufacturer_id,
                record.device_id,
                record.status,
            );
        }

        match Frame::request(Subsystem::Kernel, MsgType::Post, Action::Reply, 0, 0, 1) {
            Ok(mut frame) => {
                if let Some(slot) = frame.message.payload.first_mut() {
                    *slot = if self.aggregate { 0 } else { 1 };
                }
                if self
                    .router
                    .try_send(RouterEvent::Outbound(frame))
                    .is_err()
                {
                    warn!("router unavailable, terminal POST report dropped");
                }
            }
            Err(e) => warn!("out of memory for terminal POST report: {e}"),
        }
    }
}
