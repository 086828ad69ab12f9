//! Schema-driven dispatch: frame in, driver callbacks out, reply back.
//!
//! Runs on the owning subsystem's worker. Resolves the component from the
//! 1-based wire id, then demultiplexes on the message kind:
//!
//! - **Command** — resolve the target device (the component's own driver,
//!   or a child device selected by the parameter field), look the command
//!   up by its action byte, invoke it on the payload.
//! - **Config/Status** — walk the component's schema-ordered parameter
//!   list; every set bit in the request bitmap maps to a driver get/set at
//!   that parameter's fixed payload offset. A failed or unknown parameter
//!   clears its bit; the rest of the message still succeeds.
//! - **POST** — set arms the self-test, active runs this subsystem's
//!   device walk, get returns the accumulated records.
//!
//! Anything else is logged and released without a reply.

use std::sync::Arc;

use crossbeam_channel::Sender;
use ocmp_common::proto::{Action, Frame, Message, MsgType, PayloadCursor};
use ocmp_common::schema::{Component, Driver, Parameter, Schema, SubsystemSchema};
use ocmp_common::state::SubsystemState;
use tracing::{debug, warn};

use crate::alert::AlertGenerator;
use crate::post::{self, PostEvent, PostLedger};
use crate::router::RouterEvent;

/// Everything a subsystem worker needs to dispatch a frame.
#[derive(Clone)]
pub(crate) struct DispatchCtx {
    pub schema: Arc<Schema>,
    pub router: Sender<RouterEvent>,
    pub post: Sender<PostEvent>,
    pub ledger: PostLedger,
    pub alerts: Arc<AlertGenerator>,
}

impl DispatchCtx {
    fn reply(&self, mut frame: Frame) {
        frame.message.action = Action::Reply;
        if self.router.try_send(RouterEvent::Outbound(frame)).is_err() {
            warn!("router queue unavailable, reply dropped");
        }
    }
}

pub(crate) fn dispatch(
    ctx: &DispatchCtx,
    ss: &SubsystemSchema,
    state: &mut SubsystemState,
    mut frame: Frame,
) {
    match frame.message.kind {
        MsgType::Command => {
            let Some(comp) = component_of(ss, &frame.message) else {
                return;
            };
            if !handle_command(comp, &mut frame.message) {
                frame.message.parameters = 0;
            }
            ctx.reply(frame);
        }
        MsgType::Config | MsgType::Status => {
            let Some(comp) = component_of(ss, &frame.message) else {
                return;
            };
            if !handle_stat_cfg(comp, &mut frame.message) {
                frame.message.parameters = 0;
            }
            ctx.reply(frame);
        }
        MsgType::Post => handle_post(ctx, ss, state, frame),
        other => {
            debug!("{}: unhandled {other:?} frame released", ss.name);
        }
    }
}

/// Resolve the component addressed by a message; out-of-range ids are an
/// error (logged, frame released), not a fault.
fn component_of<'a>(ss: &'a SubsystemSchema, message: &Message) -> Option<&'a Component> {
    let comp = ss.component(message.component_id);
    if comp.is_none() {
        warn!(
            "{}: component {} out of bounds, frame released",
            ss.name, message.component_id
        );
    }
    comp
}

/// Command demux: device by parameter field, command by action byte.
fn handle_command(comp: &Component, message: &mut Message) -> bool {
    let driver: Option<&dyn Driver> = if message.parameters > 0 {
        comp.devices
            .get(message.parameters as usize - 1)
            .map(|dev| dev.driver.as_ref())
    } else {
        comp.driver.as_deref()
    };
    let Some(driver) = driver else {
        return false;
    };

    let Some(command) = driver
        .commands()
        .iter()
        .find(|cmd| cmd.action == message.action)
        .copied()
    else {
        return false;
    };

    driver.run_command(&command, &mut message.payload)
}

/// Status/config bitmap walk across the component driver and every child
/// device, in schema order.
fn handle_stat_cfg(comp: &Component, message: &mut Message) -> bool {
    let kind = message.kind;
    let action = message.action;
    let mut bitmap = message.parameters;
    let mut cursor = PayloadCursor::new(message.payload.len());
    let mut bit = 0usize;
    let mut handled = false;

    if let Some(driver) = comp.driver.as_deref() {
        handled |= stat_cfg_device(
            driver,
            kind,
            action,
            &mut bitmap,
            &mut message.payload,
            &mut cursor,
            &mut bit,
        );
    }
    for dev in &comp.devices {
        handled |= stat_cfg_device(
            dev.driver.as_ref(),
            kind,
            action,
            &mut bitmap,
            &mut message.payload,
            &mut cursor,
            &mut bit,
        );
    }

    // Bits past the component's parameter list map to nothing: absorb
    // them so the requester sees exactly which parameters succeeded.
    let covered = if bit >= 16 { !0 } else { (1u16 << bit) - 1 };
    message.parameters = bitmap & covered;
    handled
}

/// Walk one driver's parameter list. `bit` is the component-wide bitmap
/// position; the driver sees its own normalized parameter index. The
/// cursor advances over every parameter, selected or not, so each field
/// keeps its fixed offset.
fn stat_cfg_device(
    driver: &dyn Driver,
    kind: MsgType,
    action: Action,
    bitmap: &mut u16,
    payload: &mut [u8],
    cursor: &mut PayloadCursor,
    bit: &mut usize,
) -> bool {
    let params: &[Parameter] = match kind {
        MsgType::Config => driver.config_params(),
        MsgType::Status => driver.status_params(),
        _ => return false,
    };

    let mut handled = false;
    for (normalized, param) in params.iter().enumerate() {
        let width = param.ty.width();
        let selected = *bitmap & (1u16 << *bit) != 0;
        if selected {
            let ok = match cursor.advance(width) {
                Ok(range) => {
                    let window = &mut payload[range];
                    match (kind, action) {
                        (MsgType::Status, Action::Get) => driver.get_status(normalized, window),
                        (MsgType::Config, Action::Get) => driver.get_config(normalized, window),
                        (MsgType::Config, Action::Set) => driver.set_config(normalized, window),
                        _ => false,
                    }
                }
                Err(e) => {
                    warn!("parameter '{}' rejected: {e}", param.name);
                    false
                }
            };
            if ok {
                handled = true;
            } else {
                *bitmap &= !(1u16 << *bit);
            }
        } else {
            let _ = cursor.advance(width);
        }
        *bit += 1;
    }
    handled
}

/// POST kind demux. Unlike every other kind, a completed device walk is
/// acknowledged to the POST engine, not straight to the host.
fn handle_post(
    ctx: &DispatchCtx,
    ss: &SubsystemSchema,
    state: &mut SubsystemState,
    mut frame: Frame,
) {
    match frame.message.action {
        Action::Set => {
            if ctx
                .post
                .try_send(PostEvent::Enable {
                    subsystem: ss.id,
                })
                .is_err()
            {
                warn!("{}: POST engine unavailable for enable", ss.name);
                set_result_byte(&mut frame, false);
            } else {
                set_result_byte(&mut frame, true);
            }
            ctx.reply(frame);
        }
        Action::Active => {
            let sink: Arc<dyn ocmp_common::schema::AlertSink> = ctx.alerts.clone();
            let passed = post::run_subsystem_post(ss, state, &ctx.ledger, &sink);
            set_result_byte(&mut frame, passed);
            frame.message.action = Action::Reply;
            if ctx.post.try_send(PostEvent::WalkDone(frame)).is_err() {
                warn!("{}: POST engine unavailable for walk ack", ss.name);
            }
        }
        Action::Get => {
            post::fill_results(&ctx.ledger, &mut frame);
            ctx.reply(frame);
        }
        other => {
            warn!("{}: POST {other:?} has no handler, frame released", ss.name);
        }
    }
}

/// Write the pass/fail byte into payload[0]: 0 = ok, 1 = failed.
fn set_result_byte(frame: &mut Frame, passed: bool) {
    let byte = if passed { 0 } else { 1 };
    match frame.message.payload.first_mut() {
        Some(slot) => *slot = byte,
        None => {
            let _ = frame.message.payload.push(byte);
        }
    }
}
