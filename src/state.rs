//! Interface state axes and transition events
//!
//! systemd-networkd reports two independent state axes per link: the
//! administrative (setup) state and the operational state. Hooks are
//! keyed by the state name, so both axes share the string spelling
//! used for `<script_dir>/<state>.d` directories.

use crate::error::{LinkhookError, LinkhookResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Administrative (setup) state of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdminState {
    Pending,
    Configuring,
    Configured,
    Unmanaged,
    Failed,
    Linger,
}

impl AdminState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminState::Pending => "pending",
            AdminState::Configuring => "configuring",
            AdminState::Configured => "configured",
            AdminState::Unmanaged => "unmanaged",
            AdminState::Failed => "failed",
            AdminState::Linger => "linger",
        }
    }
}

impl FromStr for AdminState {
    type Err = LinkhookError;

    fn from_str(s: &str) -> LinkhookResult<Self> {
        match s {
            "pending" => Ok(AdminState::Pending),
            "configuring" => Ok(AdminState::Configuring),
            "configured" => Ok(AdminState::Configured),
            "unmanaged" => Ok(AdminState::Unmanaged),
            "failed" => Ok(AdminState::Failed),
            "linger" => Ok(AdminState::Linger),
            other => Err(LinkhookError::ParseError(format!(
                "unrecognized administrative state '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for AdminState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operational (link/connectivity) state of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperState {
    Off,
    NoCarrier,
    Dormant,
    Carrier,
    Degraded,
    Routable,
}

impl OperState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperState::Off => "off",
            OperState::NoCarrier => "no-carrier",
            OperState::Dormant => "dormant",
            OperState::Carrier => "carrier",
            OperState::Degraded => "degraded",
            OperState::Routable => "routable",
        }
    }

    /// Intermediate states that never trigger a hook run. The stored
    /// snapshot is still updated when a link enters one of these.
    pub fn is_ignored(&self) -> bool {
        matches!(self, OperState::Carrier | OperState::Degraded)
    }
}

impl FromStr for OperState {
    type Err = LinkhookError;

    fn from_str(s: &str) -> LinkhookResult<Self> {
        match s {
            "off" => Ok(OperState::Off),
            "no-carrier" => Ok(OperState::NoCarrier),
            "dormant" => Ok(OperState::Dormant),
            "carrier" => Ok(OperState::Carrier),
            "degraded" => Ok(OperState::Degraded),
            "routable" => Ok(OperState::Routable),
            other => Err(LinkhookError::ParseError(format!(
                "unrecognized operational state '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for OperState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which state axis a transition happened on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateAxis {
    Administrative,
    Operational,
}

impl fmt::Display for StateAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateAxis::Administrative => f.write_str("administrative"),
            StateAxis::Operational => f.write_str("operational"),
        }
    }
}

/// A raw state-change notification, resolved to an interface name.
///
/// Ephemeral: built from a bus signal (or synthesized by startup
/// reconciliation) and consumed by a single dispatch call.
#[derive(Debug, Clone)]
pub struct StateTransitionEvent {
    /// Interface name
    pub iface: String,
    /// New administrative state, if the notification carried one
    pub administrative_state: Option<AdminState>,
    /// New operational state, if the notification carried one
    pub operational_state: Option<OperState>,
    /// Run hooks even if the value did not change
    pub force: bool,
}
