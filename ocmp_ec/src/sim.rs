//! Simulated demo drivers and the demo schema.
//!
//! Stand-ins for real device wrappers so the bus can be exercised on a
//! workstation: fixed identification registers, deterministic probes,
//! plain register files behind a lock. The schema mirrors a small slice
//! of a real controller: system echo, power-side temperature sensor and
//! battery charger, BMS temperature sensors (one POST-disabled slot).

use std::sync::Arc;

use ocmp_common::postdata::{DeviceInfo, PostCode};
use ocmp_common::prelude::*;
use parking_lot::Mutex;
use tracing::debug;

// ─── Temperature sensor ─────────────────────────────────────────────

const TEMP_STATUS: [Parameter; 1] = [Parameter::new("temperature", ParamType::I16)];
const TEMP_CONFIG: [Parameter; 2] = [
    Parameter::new("limit_low", ParamType::I16),
    Parameter::new("limit_high", ParamType::I16),
];
const TEMP_ALERTS: [Parameter; 1] = [Parameter::new("over_temperature", ParamType::I16)];

struct TempRegisters {
    temperature: i16,
    limit_low: i16,
    limit_high: i16,
    token: Option<AlertToken>,
}

/// Simulated JEDEC-style temperature sensor.
pub struct SimTempSensor {
    info: DeviceInfo,
    regs: Mutex<TempRegisters>,
}

impl SimTempSensor {
    pub fn new(bus: u8, addr: u8) -> Self {
        Self {
            info: DeviceInfo {
                bus,
                addr,
                manufacturer_id: 0x1131,
                device_id: 0xA801,
            },
            regs: Mutex::new(TempRegisters {
                temperature: 25,
                limit_low: -20,
                limit_high: 75,
                token: None,
            }),
        }
    }

    /// Push a new reading; crossing the high limit raises the
    /// over-temperature alert with the reading as payload.
    pub fn set_temperature(&self, value: i16) {
        let mut regs = self.regs.lock();
        regs.temperature = value;
        if value > regs.limit_high {
            if let Some(token) = &regs.token {
                token.raise(0, &value.to_le_bytes());
            }
        }
    }
}

impl Driver for SimTempSensor {
    fn name(&self) -> &'static str {
        "sim_ts"
    }

    fn probe(&self) -> Probe {
        Probe::found(self.info)
    }

    fn init(&self, token: AlertToken) -> PostCode {
        self.regs.lock().token = Some(token);
        PostCode::ConfigDone
    }

    fn status_params(&self) -> &[Parameter] {
        &TEMP_STATUS
    }

    fn config_params(&self) -> &[Parameter] {
        &TEMP_CONFIG
    }

    fn alert_params(&self) -> &[Parameter] {
        &TEMP_ALERTS
    }

    fn get_status(&self, param_id: usize, out: &mut [u8]) -> bool {
        match param_id {
            0 => {
                out.copy_from_slice(&self.regs.lock().temperature.to_le_bytes());
                true
            }
            _ => false,
        }
    }

    fn get_config(&self, param_id: usize, out: &mut [u8]) -> bool {
        let regs = self.regs.lock();
        let value = match param_id {
            0 => regs.limit_low,
            1 => regs.limit_high,
            _ => return false,
        };
        out.copy_from_slice(&value.to_le_bytes());
        true
    }

    fn set_config(&self, param_id: usize, data: &[u8]) -> bool {
        let Ok(bytes) = <[u8; 2]>::try_from(data) else {
            return false;
        };
        let value = i16::from_le_bytes(bytes);
        let mut regs = self.regs.lock();
        match param_id {
            0 => regs.limit_low = value,
            1 => regs.limit_high = value,
            _ => return false,
        }
        true
    }
}

// ─── Battery charger ────────────────────────────────────────────────

const CHARGER_STATUS: [Parameter; 2] = [
    Parameter::new("battery_voltage", ParamType::I16),
    Parameter::new("battery_current", ParamType::I16),
];
const CHARGER_CONFIG: [Parameter; 2] = [
    Parameter::new("icharge", ParamType::U16),
    Parameter::new("vcharge", ParamType::U16),
];
const CHARGER_ALERTS: [Parameter; 1] = [Parameter::new("battery_voltage_low", ParamType::I16)];
const CHARGER_COMMANDS: [Command; 1] = [Command::new("reset", Action::Reset)];

struct ChargerRegisters {
    icharge: u16,
    vcharge: u16,
}

/// Simulated battery charger with a reset command.
pub struct SimCharger {
    info: DeviceInfo,
    regs: Mutex<ChargerRegisters>,
}

impl SimCharger {
    pub fn new(bus: u8, addr: u8) -> Self {
        Self {
            info: DeviceInfo {
                bus,
                addr,
                manufacturer_id: 0x0041,
                device_id: 0x4015,
            },
            regs: Mutex::new(ChargerRegisters::default()),
        }
    }
}

impl Default for ChargerRegisters {
    fn default() -> Self {
        Self {
            icharge: 2000,
            vcharge: 12600,
        }
    }
}

impl Driver for SimCharger {
    fn name(&self) -> &'static str {
        "sim_charger"
    }

    fn probe(&self) -> Probe {
        Probe::found(self.info)
    }

    fn init(&self, _token: AlertToken) -> PostCode {
        PostCode::ConfigDone
    }

    fn status_params(&self) -> &[Parameter] {
        &CHARGER_STATUS
    }

    fn config_params(&self) -> &[Parameter] {
        &CHARGER_CONFIG
    }

    fn alert_params(&self) -> &[Parameter] {
        &CHARGER_ALERTS
    }

    fn get_status(&self, param_id: usize, out: &mut [u8]) -> bool {
        let value: i16 = match param_id {
            0 => 12450,
            1 => -150,
            _ => return false,
        };
        out.copy_from_slice(&value.to_le_bytes());
        true
    }

    fn get_config(&self, param_id: usize, out: &mut [u8]) -> bool {
        let regs = self.regs.lock();
        let value = match param_id {
            0 => regs.icharge,
            1 => regs.vcharge,
            _ => return false,
        };
        out.copy_from_slice(&value.to_le_bytes());
        true
    }

    fn set_config(&self, param_id: usize, data: &[u8]) -> bool {
        let Ok(bytes) = <[u8; 2]>::try_from(data) else {
            return false;
        };
        let value = u16::from_le_bytes(bytes);
        let mut regs = self.regs.lock();
        match param_id {
            0 => regs.icharge = value,
            1 => regs.vcharge = value,
            _ => return false,
        }
        true
    }

    fn commands(&self) -> &[Command] {
        &CHARGER_COMMANDS
    }

    fn run_command(&self, command: &Command, _payload: &mut [u8]) -> bool {
        match command.action {
            Action::Reset => {
                *self.regs.lock() = ChargerRegisters::default();
                debug!("charger registers reset");
                true
            }
            _ => false,
        }
    }
}

// ─── System echo ────────────────────────────────────────────────────

const ECHO_COMMANDS: [Command; 1] = [Command::new("echo", Action::Echo)];

/// The system component's echo command: reflects the payload unchanged.
pub struct EchoDriver;

impl Driver for EchoDriver {
    fn name(&self) -> &'static str {
        "sys"
    }

    fn probe(&self) -> Probe {
        Probe::found(DeviceInfo {
            bus: 0,
            addr: 0,
            manufacturer_id: 0,
            device_id: 0,
        })
    }

    fn init(&self, _token: AlertToken) -> PostCode {
        PostCode::NoConfig
    }

    fn commands(&self) -> &[Command] {
        &ECHO_COMMANDS
    }

    fn run_command(&self, command: &Command, _payload: &mut [u8]) -> bool {
        command.action == Action::Echo
    }
}

// ─── Demo schema ────────────────────────────────────────────────────

/// The component tree the demo EC boots with.
pub fn demo_schema() -> Result<Schema, SchemaError> {
    Schema::new(vec![
        SubsystemSchema::new(Subsystem::System, "system")
            .with_component(Component::new("comp_all").with_driver(Arc::new(EchoDriver))),
        SubsystemSchema::new(Subsystem::Power, "power")
            .with_component(
                Component::new("leadacid_sensor")
                    .with_device(Device::new("temp_sensor1", Arc::new(SimTempSensor::new(1, 0x48)))),
            )
            .with_component(
                Component::new("leadacid")
                    .with_device(Device::new("battery", Arc::new(SimCharger::new(1, 0x68)))),
            ),
        SubsystemSchema::new(Subsystem::Bms, "bms").with_component(
            Component::new("ec")
                .with_device(Device::new("temp_sensor1", Arc::new(SimTempSensor::new(2, 0x49))))
                .with_device(
                    Device::new("temp_sensor2", Arc::new(SimTempSensor::new(2, 0x4A)))
                        .post_disabled(),
                ),
        ),
    ])
}
