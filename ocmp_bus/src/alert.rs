//! Alert generation.
//!
//! A driver that observes an asynchronous event raises it through the
//! [`AlertToken`](ocmp_common::schema::AlertToken) it received at init.
//! The generator recomputes the alert's bitmap position from the schema —
//! the alert-parameter counts of every slot preceding the raising device
//! within its component, plus the alert id — builds a single-bit alert
//! frame and hands it to the Router for transmission. Failures here are
//! logged and the alert dropped; nothing propagates.

use std::sync::Arc;

use crossbeam_channel::Sender;
use ocmp_common::proto::{Action, Frame, MsgType};
use ocmp_common::schema::{AlertData, AlertSink, Driver, Schema, PARAM_BITS};
use tracing::warn;

use crate::router::RouterEvent;

pub struct AlertGenerator {
    schema: Arc<Schema>,
    router: Sender<RouterEvent>,
}

impl AlertGenerator {
    pub(crate) fn new(schema: Arc<Schema>, router: Sender<RouterEvent>) -> Self {
        Self { schema, router }
    }

    /// Emit an alert frame for `alert_id` raised by the device `origin`
    /// points at. `payload` carries the alert's value, truncated to the
    /// declared parameter width.
    pub fn generate(&self, origin: &AlertData, alert_id: usize, payload: &[u8]) {
        let Some(ss) = self.schema.subsystem(origin.subsystem) else {
            warn!("alert from unknown subsystem {:?}, dropped", origin.subsystem);
            return;
        };
        let Some(comp) = ss.components.get(origin.component_id as usize) else {
            warn!(
                "{}: alert from unknown component {}, dropped",
                ss.name, origin.component_id
            );
            return;
        };

        // Slot order matches the status/config walk: component driver
        // first, then devices in schema order.
        let slots: Vec<&dyn Driver> = comp
            .driver
            .as_deref()
            .into_iter()
            .chain(comp.devices.iter().map(|dev| dev.driver.as_ref()))
            .collect();

        let Some(driver) = slots.get(origin.device_id as usize).copied() else {
            warn!(
                "{}: alert from unknown device slot {}, dropped",
                ss.name, origin.device_id
            );
            return;
        };
        let Some(param) = driver.alert_params().get(alert_id) else {
            warn!(
                "{}: {} has no alert parameter {}, dropped",
                ss.name,
                driver.name(),
                alert_id
            );
            return;
        };

        let preceding: usize = slots[..origin.device_id as usize]
            .iter()
            .map(|d| d.alert_params().len())
            .sum();
        let position = preceding + alert_id;
        if position >= PARAM_BITS {
            warn!(
                "{}: alert position {position} overflows the bitmap, dropped",
                ss.name
            );
            return;
        }

        let width = param.ty.width();
        // Align to a 4-byte boundary; the host decodes fixed slots.
        let padded = (width + 3) & !0x03;

        match Frame::request(
            origin.subsystem,
            MsgType::Alert,
            Action::Active,
            origin.component_id + 1,
            1u16 << position,
            padded,
        ) {
            Ok(mut frame) => {
                let copy = width.min(payload.len());
                frame.message.payload[..copy].copy_from_slice(&payload[..copy]);
                if self
                    .router
                    .try_send(RouterEvent::Outbound(frame))
                    .is_err()
                {
                    warn!("{}: router unavailable, alert dropped", ss.name);
                }
            }
            Err(e) => warn!("unable to allocate alert frame: {e}"),
        }
    }
}

impl AlertSink for AlertGenerator {
    fn raise(&self, origin: &AlertData, alert_id: usize, payload: &[u8]) {
        self.generate(origin, alert_id, payload);
    }
}
