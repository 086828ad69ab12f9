//! Static component tree and the driver capability trait.
//!
//! The schema is built once at startup and shared read-only by every
//! worker: Subsystem → Component → Device, where a device (or a component
//! itself) owns a [`Driver`]. Parameter bit positions for status/config
//! requests and for alerts are fully determined by schema declaration
//! order, so the tree is validated at construction: at most 16 parameters
//! of each kind per component, unique subsystem ids, no `Kernel` entry.

use std::sync::Arc;

use thiserror::Error;

use crate::postdata::{DeviceInfo, PostCode};
use crate::proto::{Action, Subsystem};
use crate::state::SubsystemState;

/// Width of the parameter bitmap; caps parameters per component.
pub const PARAM_BITS: usize = 16;

/// Wire type of a single parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    Bool,
    /// Fixed-width string field.
    Str(usize),
}

impl ParamType {
    /// Encoded field width in payload bytes.
    pub fn width(self) -> usize {
        match self {
            ParamType::U8 | ParamType::I8 | ParamType::Bool => 1,
            ParamType::U16 | ParamType::I16 => 2,
            ParamType::U32 | ParamType::I32 => 4,
            ParamType::U64 | ParamType::I64 => 8,
            ParamType::Str(n) => n,
        }
    }
}

/// Descriptor of one status/config/alert parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parameter {
    pub name: &'static str,
    pub ty: ParamType,
}

impl Parameter {
    pub const fn new(name: &'static str, ty: ParamType) -> Self {
        Self { name, ty }
    }
}

/// Descriptor of one named command, addressed by its action byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub name: &'static str,
    pub action: Action,
}

impl Command {
    pub const fn new(name: &'static str, action: Action) -> Self {
        Self { name, action }
    }
}

/// Origin of an asynchronous device event: schema indices, all 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertData {
    pub subsystem: Subsystem,
    pub component_id: u8,
    pub device_id: u8,
}

/// Sink the alert generator implements; drivers only see [`AlertToken`].
pub trait AlertSink: Send + Sync {
    /// Emit an alert frame for `alert_id` raised by `data`'s device.
    fn raise(&self, data: &AlertData, alert_id: usize, payload: &[u8]);
}

/// Capability handed to a driver at init time so it can raise alerts later.
///
/// Carries its own copy of the routing indices; cheap to clone and safe to
/// call from any thread.
#[derive(Clone)]
pub struct AlertToken {
    data: AlertData,
    sink: Arc<dyn AlertSink>,
}

impl AlertToken {
    pub fn new(data: AlertData, sink: Arc<dyn AlertSink>) -> Self {
        Self { data, sink }
    }

    pub fn origin(&self) -> &AlertData {
        &self.data
    }

    /// Raise alert `alert_id` (index into the driver's alert table).
    pub fn raise(&self, alert_id: usize, payload: &[u8]) {
        self.sink.raise(&self.data, alert_id, payload);
    }
}

impl core::fmt::Debug for AlertToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AlertToken").field("data", &self.data).finish()
    }
}

/// Result of probing a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    pub code: PostCode,
    /// Identification read back; `None` when the device did not answer.
    pub info: Option<DeviceInfo>,
}

impl Probe {
    pub fn found(info: DeviceInfo) -> Self {
        Self {
            code: PostCode::DevFound,
            info: Some(info),
        }
    }

    pub fn missing() -> Self {
        Self {
            code: PostCode::DevMissing,
            info: None,
        }
    }
}

/// Fixed capability set every device driver exposes.
///
/// Parameter ids passed to the get/set callbacks are *normalized*: they
/// index the driver's own parameter list, not the component-wide bitmap.
pub trait Driver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Check device presence and read identification.
    fn probe(&self) -> Probe;

    /// Initialize the device. The token lets the driver raise alerts once
    /// it is live.
    fn init(&self, token: AlertToken) -> PostCode {
        let _ = token;
        PostCode::NoConfig
    }

    fn status_params(&self) -> &[Parameter] {
        &[]
    }

    fn config_params(&self) -> &[Parameter] {
        &[]
    }

    fn alert_params(&self) -> &[Parameter] {
        &[]
    }

    fn get_status(&self, param_id: usize, out: &mut [u8]) -> bool {
        let _ = (param_id, out);
        false
    }

    fn get_config(&self, param_id: usize, out: &mut [u8]) -> bool {
        let _ = (param_id, out);
        false
    }

    fn set_config(&self, param_id: usize, data: &[u8]) -> bool {
        let _ = (param_id, data);
        false
    }

    fn commands(&self) -> &[Command] {
        &[]
    }

    fn run_command(&self, command: &Command, payload: &mut [u8]) -> bool {
        let _ = (command, payload);
        false
    }
}

/// A leaf device owning a driver.
#[derive(Clone)]
pub struct Device {
    pub name: &'static str,
    pub driver: Arc<dyn Driver>,
    /// Skip this device entirely during POST: no record, no probe, no init.
    pub post_disabled: bool,
}

impl Device {
    pub fn new(name: &'static str, driver: Arc<dyn Driver>) -> Self {
        Self {
            name,
            driver,
            post_disabled: false,
        }
    }

    pub fn post_disabled(mut self) -> Self {
        self.post_disabled = true;
        self
    }
}

/// A component: optionally a driver of its own, plus child devices.
#[derive(Clone, Default)]
pub struct Component {
    pub name: &'static str,
    pub driver: Option<Arc<dyn Driver>>,
    pub post_disabled: bool,
    pub devices: Vec<Device>,
}

impl Component {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    pub fn with_driver(mut self, driver: Arc<dyn Driver>) -> Self {
        self.driver = Some(driver);
        self
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.devices.push(device);
        self
    }

    /// Count parameters of one kind across the component driver and every
    /// child device, in schema order. This is the bitmap width a
    /// status/config request against this component addresses.
    pub fn param_count(&self, pick: fn(&dyn Driver) -> &[Parameter]) -> usize {
        let own = self.driver.as_deref().map_or(0, |d| pick(d).len());
        own + self
            .devices
            .iter()
            .map(|dev| pick(dev.driver.as_ref()).len())
            .sum::<usize>()
    }
}

/// Hooks a subsystem may run around its POST device walk.
pub trait SubsystemHooks: Send + Sync {
    /// Runs before any device is probed. Returning `false` vetoes the walk
    /// and the subsystem goes faulty.
    fn pre_init(&self, state: SubsystemState) -> bool {
        let _ = state;
        true
    }

    /// Runs after the device walk. Returning `false` forces faulty.
    fn post_init(&self, state: SubsystemState) -> bool {
        let _ = state;
        true
    }
}

/// One subsystem's subtree.
#[derive(Clone)]
pub struct SubsystemSchema {
    pub id: Subsystem,
    pub name: &'static str,
    pub components: Vec<Component>,
    pub hooks: Option<Arc<dyn SubsystemHooks>>,
}

impl SubsystemSchema {
    pub fn new(id: Subsystem, name: &'static str) -> Self {
        Self {
            id,
            name,
            components: Vec::new(),
            hooks: None,
        }
    }

    pub fn with_component(mut self, component: Component) -> Self {
        self.components.push(component);
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn SubsystemHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Component by its 1-based wire id.
    pub fn component(&self, component_id: u8) -> Option<&Component> {
        if component_id == 0 {
            return None;
        }
        self.components.get(component_id as usize - 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("duplicate subsystem {0:?} in schema")]
    DuplicateSubsystem(Subsystem),

    #[error("the kernel sentinel cannot own a schema entry")]
    KernelEntry,

    #[error("{subsystem}/{component}: {count} {kind} parameters exceed the {PARAM_BITS}-bit bitmap")]
    TooManyParams {
        subsystem: &'static str,
        component: &'static str,
        kind: &'static str,
        count: usize,
    },
}

/// The validated, immutable component tree.
pub struct Schema {
    subsystems: Vec<SubsystemSchema>,
}

impl Schema {
    pub fn new(subsystems: Vec<SubsystemSchema>) -> Result<Self, SchemaError> {
        let mut seen: Vec<Subsystem> = Vec::new();
        for ss in &subsystems {
            if ss.id == Subsystem::Kernel {
                return Err(SchemaError::KernelEntry);
            }
            if seen.contains(&ss.id) {
                return Err(SchemaError::DuplicateSubsystem(ss.id));
            }
            seen.push(ss.id);

            for comp in &ss.components {
                let picks: [(&str, fn(&dyn Driver) -> &[Parameter]); 3] = [
                    ("status", |d| d.status_params()),
                    ("config", |d| d.config_params()),
                    ("alert", |d| d.alert_params()),
                ];
                for (kind, pick) in picks {
                    let count = comp.param_count(pick);
                    if count > PARAM_BITS {
                        return Err(SchemaError::TooManyParams {
                            subsystem: ss.name,
                            component: comp.name,
                            kind,
                            count,
                        });
                    }
                }
            }
        }
        Ok(Self { subsystems })
    }

    pub fn subsystems(&self) -> &[SubsystemSchema] {
        &self.subsystems
    }

    pub fn subsystem(&self, id: Subsystem) -> Option<&SubsystemSchema> {
        self.subsystems.iter().find(|ss| ss.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullDriver {
        status: Vec<Parameter>,
    }

    impl Driver for NullDriver {
        fn name(&self) -> &'static str {
            "null"
        }

        fn probe(&self) -> Probe {
            Probe::missing()
        }

        fn status_params(&self) -> &[Parameter] {
            &self.status
        }
    }

    fn driver_with_status(n: usize) -> Arc<dyn Driver> {
        Arc::new(NullDriver {
            status: vec![Parameter::new("p", ParamType::U16); n],
        })
    }

    #[test]
    fn component_lookup_is_one_based() {
        let ss = SubsystemSchema::new(Subsystem::Power, "power")
            .with_component(Component::new("comp_all"))
            .with_component(Component::new("sensors"));
        assert!(ss.component(0).is_none());
        assert_eq!(ss.component(1).unwrap().name, "comp_all");
        assert_eq!(ss.component(2).unwrap().name, "sensors");
        assert!(ss.component(3).is_none());
    }

    #[test]
    fn param_count_spans_component_and_devices() {
        let comp = Component::new("c")
            .with_driver(driver_with_status(2))
            .with_device(Device::new("d0", driver_with_status(3)))
            .with_device(Device::new("d1", driver_with_status(4)));
        assert_eq!(comp.param_count(|d| d.status_params()), 9);
        assert_eq!(comp.param_count(|d| d.config_params()), 0);
    }

    #[test]
    fn schema_rejects_kernel_and_duplicates() {
        let err = Schema::new(vec![SubsystemSchema::new(Subsystem::Kernel, "kernel")]);
        assert_eq!(err.err(), Some(SchemaError::KernelEntry));

        let err = Schema::new(vec![
            SubsystemSchema::new(Subsystem::Power, "power"),
            SubsystemSchema::new(Subsystem::Power, "power2"),
        ]);
        assert_eq!(
            err.err(),
            Some(SchemaError::DuplicateSubsystem(Subsystem::Power))
        );
    }

    #[test]
    fn schema_rejects_oversized_bitmap() {
        let comp = Component::new("wide")
            .with_device(Device::new("d0", driver_with_status(9)))
            .with_device(Device::new("d1", driver_with_status(8)));
        let err = Schema::new(vec![
            SubsystemSchema::new(Subsystem::Bms, "bms").with_component(comp),
        ]);
        assert!(matches!(
            err.err(),
            Some(SchemaError::TooManyParams { count: 17, .. })
        ));
    }
}
