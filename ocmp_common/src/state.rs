//! Subsystem lifecycle states.
//!
//! Each subsystem worker owns exactly one [`SubsystemState`] value; nothing
//! else writes it. The POST walk drives the boot-time transitions
//! (PowerOn → Init → Config or Faulty); later transitions belong to the
//! subsystem's own handlers.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubsystemState {
    /// Fresh out of reset, nothing probed yet.
    PowerOn,
    /// POST walk in progress, devices probing/initializing.
    Init,
    /// Devices initialized, configuration applied.
    Config,
    /// Configured and idle.
    Ready,
    /// Actively serving.
    Active,
    /// A device failed probe/init or a hook declined.
    Faulty,
    /// Reset requested.
    Reset,
    /// Shutting down.
    Shutdown,
}

impl SubsystemState {
    /// States in which the subsystem answers normal traffic.
    pub fn is_operational(self) -> bool {
        matches!(
            self,
            SubsystemState::Config | SubsystemState::Ready | SubsystemState::Active
        )
    }
}

impl core::fmt::Display for SubsystemState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            SubsystemState::PowerOn => "power-on",
            SubsystemState::Init => "initializing",
            SubsystemState::Config => "configured",
            SubsystemState::Ready => "ready",
            SubsystemState::Active => "active",
            SubsystemState::Faulty => "faulty",
            SubsystemState::Reset => "reset",
            SubsystemState::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}
