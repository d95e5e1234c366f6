//! Blocking client for the TP-Link/Kasa cloud relay.
//!
//! - Every call is a POST of `{method, params}` to a single endpoint.
//! - Authenticated calls carry the token as a query parameter; `login` never does.
//! - Responses arrive as `{error_code, msg, result}`; a non-zero code becomes a
//!   [`CloudError::Remote`] classified through [`crate::error::ERROR_CODES`].
//!
//! Authentication
//! - `login` trades email/password for a token. A token persisted elsewhere can
//!   be restored with [`CloudClient::set_token`] to skip the login on startup.
//! - The client never retries on its own; see [`crate::switch`] for the relogin rule.

use log::{debug, info};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::cell::RefCell;

use crate::device::{Device, DeviceInfo};
use crate::error::CloudError;
use crate::models::kasa::*;
use crate::transport::{Transport, UreqTransport};

pub const DEFAULT_ENDPOINT: &str = "https://wap.tplinkcloud.com";
const APP_TYPE: &str = "Kasa_Android";

pub struct CloudClient {
    transport: Box<dyn Transport>,
    endpoint: String,
    username: String,
    password: String,
    token: RefCell<Option<String>>,
}

impl CloudClient {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::with_transport(username, password, DEFAULT_ENDPOINT, Box::new(UreqTransport::default()))
    }

    pub fn with_transport(
        username: impl Into<String>,
        password: impl Into<String>,
        endpoint: impl Into<String>,
        transport: Box<dyn Transport>,
    ) -> Self {
        CloudClient {
            transport,
            endpoint: endpoint.into(),
            username: username.into(),
            password: password.into(),
            token: RefCell::new(None),
        }
    }

    /// Restore a previously obtained token, builder style.
    pub fn with_token(self, token: Option<String>) -> Self {
        *self.token.borrow_mut() = token;
        self
    }

    pub fn token(&self) -> Option<String> {
        self.token.borrow().clone()
    }

    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.borrow_mut() = Some(token.into());
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Authenticate and store the returned token. Returns `self` for chaining.
    pub fn login(&self) -> Result<&Self, CloudError> {
        self.refresh_token()?;
        info!("Logged in to Kasa cloud as {}", self.username);
        Ok(self)
    }

    /// Request a fresh token with the stored credentials.
    pub fn refresh_token(&self) -> Result<(), CloudError> {
        let params = LoginParams {
            app_type: APP_TYPE,
            cloud_user_name: &self.username,
            cloud_password: &self.password,
            terminal_uuid: uuid::Uuid::new_v4().to_string(),
        };
        let result: LoginResult = self.request("login", params, false)?;
        *self.token.borrow_mut() = Some(result.token);
        Ok(())
    }

    /// Devices bound to the account, in the order the cloud lists them.
    pub fn list_devices(&self) -> Result<Vec<Device<'_>>, CloudError> {
        let result: DeviceListResult = self.request("getDeviceList", serde_json::json!({}), true)?;
        debug!("Cloud listed {} device(s)", result.device_list.len());
        Ok(result
            .device_list
            .into_iter()
            .map(|entry| Device::new(self, DeviceInfo::from_list_entry(entry)))
            .collect())
    }

    /// Send a device-local command through the cloud relay and return the
    /// device's decoded reply.
    pub fn passthrough(&self, device_id: &str, command: &Value) -> Result<Value, CloudError> {
        let params = PassthroughParams {
            device_id,
            request_data: encode_request_data(command)?,
        };
        let result: PassthroughResult = self.request("passthrough", params, true)?;
        decode_response_data(result.response_data)
    }

    fn request<P: Serialize, T: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
        authenticated: bool,
    ) -> Result<T, CloudError> {
        let token = if authenticated {
            Some(self.token().ok_or(CloudError::MissingToken)?)
        } else {
            None
        };
        let body = serde_json::to_value(Request { method, params })?;

        debug!("POST {} method={}", self.endpoint, method);
        let raw = self.transport.post(&self.endpoint, token.as_deref(), &body)?;
        let result = parse_envelope(&raw)?;
        decode(result)
    }
}

/// Decode the response envelope, returning `result` on success.
pub fn parse_envelope(raw: &str) -> Result<Value, CloudError> {
    let envelope: Envelope = serde_path_to_error::deserialize(&mut serde_json::Deserializer::from_str(raw))?;
    if envelope.error_code != 0 {
        let msg = envelope.msg.unwrap_or_else(|| String::from("Unknown error"));
        return Err(CloudError::from_remote(envelope.error_code, msg));
    }
    envelope
        .result
        .ok_or_else(|| CloudError::Json("response envelope missing result".into()))
}

pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T, CloudError> {
    Ok(serde_path_to_error::deserialize(value)?)
}

/// The relay expects `requestData` as a JSON string, not a nested object.
pub fn encode_request_data(command: &Value) -> Result<String, CloudError> {
    Ok(serde_json::to_string(command)?)
}

/// `responseData` is normally a JSON string; some relays send the object as is.
pub fn decode_response_data(data: Value) -> Result<Value, CloudError> {
    match data {
        Value::String(s) => Ok(serde_json::from_str(&s)?),
        other @ Value::Object(_) => Ok(other),
        other => Err(CloudError::Json(format!("unexpected responseData: {}", other))),
    }
}
