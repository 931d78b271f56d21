//! DeviceProxy types

use crate::room_state::LedKind;
use serde::Serialize;

/// Verdict word understood by the device firmware for a grant
pub const DEVICE_GRANTED: &str = "permitido";

/// Verdict word understood by the device firmware for a denial
pub const DEVICE_DENIED: &str = "negado";

/// Actuator command for the remote device
///
/// Every command sets an absolute state, so sending it twice is the same as
/// sending it once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    /// `POST /led_<color>?status=on|off`
    Led { kind: LedKind, on: bool },
    /// `POST /rfid_result?resultado=<verdict>[_<name>]`
    AccessResult { granted: bool, name: Option<String> },
    /// `POST /presenca?tem_presenca=yes|no`
    Presence { present: bool },
}

impl DeviceCommand {
    /// Request path on the device
    pub fn path(&self) -> String {
        match self {
            DeviceCommand::Led { kind, .. } => format!("/led_{}", kind.device_color()),
            DeviceCommand::AccessResult { .. } => "/rfid_result".to_string(),
            DeviceCommand::Presence { .. } => "/presenca".to_string(),
        }
    }

    /// Query parameters
    pub fn query(&self) -> Vec<(&'static str, String)> {
        match self {
            DeviceCommand::Led { on, .. } => {
                vec![("status", if *on { "on" } else { "off" }.to_string())]
            }
            DeviceCommand::AccessResult { granted, name } => {
                let verdict = if *granted { DEVICE_GRANTED } else { DEVICE_DENIED };
                let value = match name {
                    Some(name) if !name.is_empty() => format!("{}_{}", verdict, name),
                    _ => verdict.to_string(),
                };
                vec![("resultado", value)]
            }
            DeviceCommand::Presence { present } => {
                vec![("tem_presenca", if *present { "yes" } else { "no" }.to_string())]
            }
        }
    }

    /// Short form for logs and audit entries
    pub fn describe(&self) -> String {
        let params: Vec<String> = self
            .query()
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        format!("{}?{}", self.path(), params.join("&"))
    }
}

/// Outcome of one command exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered,
    Failed(String),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }
}
