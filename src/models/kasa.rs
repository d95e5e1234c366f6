//! Wire types for the Kasa cloud API and the device-local `system` section.
//!
//! Cloud types use the camelCase keys of the cloud API; device types use the
//! snake_case keys the device firmware reports.

use serde::Deserializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// =====================
// Cloud envelope
// =====================

#[derive(Debug, Clone, Serialize)]
pub struct Request<'a, P: Serialize> {
    pub method: &'a str,
    pub params: P,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub error_code: i64,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginParams<'a> {
    pub app_type: &'a str,
    pub cloud_user_name: &'a str,
    pub cloud_password: &'a str,
    #[serde(rename = "terminalUUID")]
    pub terminal_uuid: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResult {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceListResult {
    #[serde(default)]
    pub device_list: Vec<DeviceListEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceListEntry {
    pub device_id: String,
    #[serde(default)]
    pub device_type: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub device_model: String,
    #[serde(default, deserialize_with = "fragments")]
    pub device_name: String,
    #[serde(default, deserialize_with = "fragments")]
    pub fw_ver: String,
    #[serde(default)]
    pub status: u8,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassthroughParams<'a> {
    pub device_id: &'a str,
    /// The device command, serialized to a JSON string.
    pub request_data: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassthroughResult {
    pub response_data: Value,
}

// =====================
// Device `system` section
// =====================

#[derive(Debug, Clone, Deserialize)]
pub struct SystemResponse<T> {
    pub system: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetSysInfo {
    pub get_sysinfo: SysInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetRelayState {
    pub set_relay_state: SectionStatus,
}

/// Status block every device section reply carries.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SectionStatus {
    #[serde(default)]
    pub err_code: i64,
    #[serde(default)]
    pub err_msg: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SysInfo {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    // Older firmware reports `type`, newer reports `mic_type`.
    #[serde(rename = "type", default)]
    pub hw_type: Option<String>,
    #[serde(default)]
    pub mic_type: Option<String>,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub model: String,
    #[serde(default, deserialize_with = "fragments")]
    pub dev_name: String,
    #[serde(default, deserialize_with = "fragments")]
    pub sw_ver: String,
    pub relay_state: u8,
    #[serde(default)]
    pub err_code: i64,
    #[serde(default)]
    pub err_msg: Option<String>,
}

impl SysInfo {
    pub fn device_type(&self) -> Option<&str> {
        self.mic_type.as_deref().or(self.hw_type.as_deref())
    }
}

/// Accept either a plain string or a sequence of string fragments and join them.
fn fragments<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Fragments {
        Whole(String),
        Parts(Vec<String>),
    }

    Ok(match Option::<Fragments>::deserialize(deserializer)? {
        None => String::new(),
        Some(Fragments::Whole(s)) => s,
        Some(Fragments::Parts(parts)) => parts.concat(),
    })
}
