//! Prelude module for common re-exports.
//!
//! Consumers can `use ocmp_common::prelude::*;` and get the types every
//! bus component touches without listing individual paths.

// ─── Wire protocol ──────────────────────────────────────────────────
pub use crate::proto::{
    Action, Frame, FrameError, Interface, MsgType, PayloadCursor, Subsystem, FRAME_MAX,
    PAYLOAD_MAX,
};

// ─── Schema ─────────────────────────────────────────────────────────
pub use crate::schema::{
    AlertData, AlertSink, AlertToken, Command, Component, Device, Driver, Parameter, ParamType,
    Probe, Schema, SchemaError, SubsystemHooks, SubsystemSchema,
};

// ─── States & POST ──────────────────────────────────────────────────
pub use crate::postdata::{DeviceInfo, PostCode, PostData, POST_RECORDS};
pub use crate::state::SubsystemState;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, EcConfig};
