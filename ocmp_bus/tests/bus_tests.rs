//! # Message Bus Integration Tests
//!
//! End-to-end flows through a running bus: encoded frames in through the
//! gossiper handle, replies captured at a mock transport. Covers FIFO
//! dispatch order, per-bit parameter absorption, command routing, the
//! full POST cycle and alert generation.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ocmp_bus::transport::{Transport, TransportError, TransportMux};
use ocmp_bus::{BusOptions, MessageBus};
use ocmp_common::postdata::{DeviceInfo, PostCode};
use ocmp_common::prelude::*;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Test transport ─────────────────────────────────────────────────

/// Captures everything delivered on one interface tag.
struct CaptureTransport {
    interface: Interface,
    frames: mpsc::Sender<Frame>,
}

impl Transport for CaptureTransport {
    fn interface(&self) -> Interface {
        self.interface
    }

    fn deliver(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let frame = Frame::decode(bytes).map_err(|e| TransportError::Io(e.to_string()))?;
        self.frames
            .send(frame)
            .map_err(|_| TransportError::Closed)
    }
}

fn capture_mux(interface: Interface) -> (TransportMux, mpsc::Receiver<Frame>) {
    let (tx, rx) = mpsc::channel();
    let mut mux = TransportMux::new();
    mux.register(Arc::new(CaptureTransport {
        interface,
        frames: tx,
    }));
    (mux, rx)
}

// ─── Test drivers ───────────────────────────────────────────────────

/// Always-present device with one readable status parameter.
struct OneParamDriver;

impl Driver for OneParamDriver {
    fn name(&self) -> &'static str {
        "one_param"
    }

    fn probe(&self) -> Probe {
        Probe::found(DeviceInfo {
            bus: 0,
            addr: 0x48,
            manufacturer_id: 0x1131,
            device_id: 0xA801,
        })
    }

    fn init(&self, _token: AlertToken) -> PostCode {
        PostCode::ConfigDone
    }

    fn status_params(&self) -> &[Parameter] {
        const PARAMS: [Parameter; 1] = [Parameter::new("temperature", ParamType::I16)];
        &PARAMS
    }

    fn get_status(&self, param_id: usize, out: &mut [u8]) -> bool {
        if param_id == 0 {
            out.copy_from_slice(&(-40i16).to_le_bytes());
            true
        } else {
            false
        }
    }
}

/// Device whose probe never answers.
struct AbsentDriver;

impl Driver for AbsentDriver {
    fn name(&self) -> &'static str {
        "absent"
    }

    fn probe(&self) -> Probe {
        Probe::missing()
    }
}

/// Records the order in which command payloads arrive.
struct OrderedCmdDriver {
    seen: Arc<Mutex<Vec<u8>>>,
    done: mpsc::Sender<()>,
}

impl Driver for OrderedCmdDriver {
    fn name(&self) -> &'static str {
        "ordered_cmd"
    }

    fn probe(&self) -> Probe {
        Probe::missing()
    }

    fn commands(&self) -> &[Command] {
        const COMMANDS: [Command; 1] = [Command::new("mark", Action::Set)];
        &COMMANDS
    }

    fn run_command(&self, _command: &Command, payload: &mut [u8]) -> bool {
        if let Some(&tag) = payload.first() {
            self.seen.lock().unwrap().push(tag);
        }
        let _ = self.done.send(());
        true
    }
}

/// Driver with alert parameters that raises on demand via its init token.
struct AlertingDriver {
    alerts: &'static [Parameter],
    token: Mutex<Option<AlertToken>>,
    ready: mpsc::Sender<()>,
}

impl Driver for AlertingDriver {
    fn name(&self) -> &'static str {
        "alerting"
    }

    fn probe(&self) -> Probe {
        Probe::found(DeviceInfo {
            bus: 1,
            addr: 0x68,
            manufacturer_id: 0x0041,
            device_id: 0x4015,
        })
    }

    fn init(&self, token: AlertToken) -> PostCode {
        *self.token.lock().unwrap() = Some(token);
        let _ = self.ready.send(());
        PostCode::ConfigDone
    }

    fn alert_params(&self) -> &[Parameter] {
        self.alerts
    }
}

impl AlertingDriver {
    fn raise(&self, alert_id: usize, payload: &[u8]) {
        let guard = self.token.lock().unwrap();
        guard
            .as_ref()
            .expect("driver was initialized")
            .raise(alert_id, payload);
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

fn quiet_options(run_post: bool) -> BusOptions {
    BusOptions {
        queue_depth: 16,
        run_post,
    }
}

fn single_driver_schema(ss: Subsystem, name: &'static str, driver: Arc<dyn Driver>) -> Schema {
    Schema::new(vec![
        SubsystemSchema::new(ss, name)
            .with_component(Component::new("comp_all").with_device(Device::new("dev", driver))),
    ])
    .expect("valid schema")
}

/// Wait for the terminal POST report (kernel-addressed reply).
fn wait_post_report(rx: &mpsc::Receiver<Frame>) -> Frame {
    loop {
        let frame = rx.recv_timeout(RECV_TIMEOUT).expect("frame before timeout");
        if frame.message.subsystem == Subsystem::Kernel && frame.message.kind == MsgType::Post {
            return frame;
        }
    }
}

// ─── Routing ────────────────────────────────────────────────────────

#[test]
fn send_to_unknown_subsystem_fails() {
    let schema = Arc::new(single_driver_schema(
        Subsystem::Power,
        "power",
        Arc::new(OneParamDriver),
    ));
    let (mux, _rx) = capture_mux(Interface::Uart);
    let bus = MessageBus::start(schema, mux, quiet_options(false)).expect("bus starts");

    let frame = Frame::request(Subsystem::Sdr, MsgType::Status, Action::Get, 1, 1, 2).unwrap();
    let err = bus.registry().send(Subsystem::Sdr, frame).unwrap_err();
    assert!(matches!(
        err,
        ocmp_bus::registry::SendError::UnknownSubsystem(Subsystem::Sdr)
    ));
    assert!(!bus.registry().contains(Subsystem::Sdr));
    assert!(bus.registry().contains(Subsystem::Power));
}

#[test]
fn status_request_round_trips_with_bit_absorption() {
    let schema = Arc::new(single_driver_schema(
        Subsystem::Power,
        "power",
        Arc::new(OneParamDriver),
    ));
    let (mux, rx) = capture_mux(Interface::Ethernet);
    let bus = MessageBus::start(schema, mux, quiet_options(false)).expect("bus starts");

    // bitmap 0b011, but only bit 0 maps to a handled parameter
    let request =
        Frame::request(Subsystem::Power, MsgType::Status, Action::Get, 1, 0b011, 4).unwrap();
    bus.handle()
        .on_receive(&request.encode(), Interface::Ethernet)
        .expect("ingress accepted");

    let reply = rx.recv_timeout(RECV_TIMEOUT).expect("reply");
    assert_eq!(reply.message.action, Action::Reply);
    assert_eq!(reply.message.parameters, 0b001);
    assert_eq!(&reply.message.payload[..2], &(-40i16).to_le_bytes());
    // reply leaves on the interface the request arrived on
    assert_eq!(reply.header.interface, Interface::Ethernet);
}

#[test]
fn fifo_order_within_one_subsystem() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (done_tx, done_rx) = mpsc::channel();
    let driver = Arc::new(OrderedCmdDriver {
        seen: seen.clone(),
        done: done_tx,
    });
    let schema = Arc::new(single_driver_schema(Subsystem::System, "system", driver));
    let (mux, _rx) = capture_mux(Interface::Uart);
    let bus = MessageBus::start(schema, mux, quiet_options(false)).expect("bus starts");

    for tag in 1..=5u8 {
        let mut frame =
            Frame::request(Subsystem::System, MsgType::Command, Action::Set, 1, 1, 1).unwrap();
        frame.message.payload[0] = tag;
        bus.registry()
            .send(Subsystem::System, frame)
            .expect("enqueue");
    }
    for _ in 0..5 {
        done_rx.recv_timeout(RECV_TIMEOUT).expect("command ran");
    }
    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4, 5]);
}

#[test]
fn malformed_ingress_is_rejected() {
    let schema = Arc::new(single_driver_schema(
        Subsystem::Power,
        "power",
        Arc::new(OneParamDriver),
    ));
    let (mux, _rx) = capture_mux(Interface::Uart);
    let bus = MessageBus::start(schema, mux, quiet_options(false)).expect("bus starts");

    let err = bus
        .handle()
        .on_receive(&[0xAA, 0x00], Interface::Uart)
        .unwrap_err();
    assert!(matches!(
        err,
        ocmp_bus::gossiper::IngressError::Decode(FrameError::TooShort { .. })
    ));
}

// ─── POST cycle ─────────────────────────────────────────────────────

#[test]
fn post_cycle_reports_pass_when_all_subsystems_pass() {
    let schema = Arc::new(
        Schema::new(vec![
            SubsystemSchema::new(Subsystem::Power, "power").with_component(
                Component::new("comp_all")
                    .with_device(Device::new("ts", Arc::new(OneParamDriver))),
            ),
            SubsystemSchema::new(Subsystem::Bms, "bms").with_component(
                Component::new("comp_all")
                    .with_device(Device::new("ts", Arc::new(OneParamDriver))),
            ),
        ])
        .expect("valid schema"),
    );
    let (mux, rx) = capture_mux(Interface::Uart);
    let bus = MessageBus::start(schema, mux, quiet_options(true)).expect("bus starts");

    let report = wait_post_report(&rx);
    assert_eq!(report.message.action, Action::Reply);
    assert_eq!(report.message.payload[0], 0, "aggregate must be PASS");

    // one record per device, serials increment across subsystems
    let records = bus.post_results();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].serial, 1);
    assert_eq!(records[1].serial, 2);
    assert!(records.iter().all(|r| r.status == PostCode::ConfigDone));
}

#[test]
fn post_cycle_reports_fail_when_any_subsystem_fails() {
    let schema = Arc::new(
        Schema::new(vec![
            SubsystemSchema::new(Subsystem::Power, "power").with_component(
                Component::new("comp_all")
                    .with_device(Device::new("ts", Arc::new(OneParamDriver))),
            ),
            SubsystemSchema::new(Subsystem::Bms, "bms").with_component(
                Component::new("comp_all")
                    .with_device(Device::new("ghost", Arc::new(AbsentDriver))),
            ),
        ])
        .expect("valid schema"),
    );
    let (mux, rx) = capture_mux(Interface::Uart);
    let bus = MessageBus::start(schema, mux, quiet_options(true)).expect("bus starts");

    let report = wait_post_report(&rx);
    assert_eq!(report.message.payload[0], 1, "aggregate must be FAIL");

    let records = bus.post_results();
    assert_eq!(records.len(), 2);
    assert!(records
        .iter()
        .any(|r| r.status == PostCode::DevMissing && r.subsystem == Subsystem::Bms));
}

#[test]
fn post_get_returns_packed_records() {
    let schema = Arc::new(single_driver_schema(
        Subsystem::Power,
        "power",
        Arc::new(OneParamDriver),
    ));
    let (mux, rx) = capture_mux(Interface::Uart);
    let bus = MessageBus::start(schema, mux, quiet_options(true)).expect("bus starts");
    wait_post_report(&rx);

    let request = Frame::request(Subsystem::Power, MsgType::Post, Action::Get, 1, 0, 0).unwrap();
    bus.handle()
        .on_receive(&request.encode(), Interface::Uart)
        .expect("ingress accepted");

    let reply = rx.recv_timeout(RECV_TIMEOUT).expect("reply");
    assert_eq!(reply.message.kind, MsgType::Post);
    assert_eq!(reply.message.action, Action::Reply);
    assert_eq!(reply.message.parameters, 1);
    assert_eq!(reply.message.payload.len(), PostData::WIRE_SIZE);
    assert_eq!(reply.message.payload[0], Subsystem::Power.to_wire());
    assert_eq!(reply.message.payload[1], 1); // serial
}

// ─── Alerts ─────────────────────────────────────────────────────────

#[test]
fn alert_bit_position_counts_preceding_devices() {
    // D0 carries 2 alert parameters, D1 carries 3; an alert with id 1
    // from D1 must set bit 2 + 1 = 3.
    const D0_ALERTS: [Parameter; 2] = [
        Parameter::new("a0", ParamType::U8),
        Parameter::new("a1", ParamType::U8),
    ];
    const D1_ALERTS: [Parameter; 3] = [
        Parameter::new("b0", ParamType::U16),
        Parameter::new("b1", ParamType::U16),
        Parameter::new("b2", ParamType::U16),
    ];

    let (ready_tx, ready_rx) = mpsc::channel();
    let (sink_tx, _sink_rx) = mpsc::channel();
    let d0 = Arc::new(AlertingDriver {
        alerts: &D0_ALERTS,
        token: Mutex::new(None),
        ready: sink_tx,
    });
    let d1 = Arc::new(AlertingDriver {
        alerts: &D1_ALERTS,
        token: Mutex::new(None),
        ready: ready_tx,
    });

    let schema = Arc::new(
        Schema::new(vec![SubsystemSchema::new(Subsystem::Power, "power")
            .with_component(
                Component::new("charger")
                    .with_device(Device::new("d0", d0))
                    .with_device(Device::new("d1", d1.clone())),
            )])
        .expect("valid schema"),
    );
    let (mux, rx) = capture_mux(Interface::Uart);
    let _bus = MessageBus::start(schema, mux, quiet_options(true)).expect("bus starts");

    // wait until POST init handed d1 its token
    ready_rx.recv_timeout(RECV_TIMEOUT).expect("d1 initialized");
    wait_post_report(&rx);

    d1.raise(1, &0x0BADu16.to_le_bytes());

    let alert = rx.recv_timeout(RECV_TIMEOUT).expect("alert frame");
    assert_eq!(alert.message.kind, MsgType::Alert);
    assert_eq!(alert.message.action, Action::Active);
    assert_eq!(alert.message.parameters, 1 << 3);
    assert_eq!(alert.message.component_id, 1); // wire ids are 1-based
    // u16 value padded to the 4-byte alignment
    assert_eq!(alert.message.payload.len(), 4);
    assert_eq!(&alert.message.payload[..2], &0x0BADu16.to_le_bytes());
}

// ─── Shutdown ───────────────────────────────────────────────────────

#[test]
fn dropping_the_bus_joins_all_workers() {
    let schema = Arc::new(single_driver_schema(
        Subsystem::Power,
        "power",
        Arc::new(OneParamDriver),
    ));
    let (mux, rx) = capture_mux(Interface::Uart);
    let bus = MessageBus::start(schema, mux, quiet_options(true)).expect("bus starts");
    wait_post_report(&rx);
    drop(bus);
    // all senders are gone; the capture channel must disconnect
    assert!(matches!(
        rx.recv_timeout(RECV_TIMEOUT),
        Err(mpsc::RecvTimeoutError::Disconnected)
    ));
}
