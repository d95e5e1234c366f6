//! A smart plug reached through the cloud relay.

use log::{debug, warn};
use serde::Serialize;
use serde_json::{Value, json};

use crate::client::{CloudClient, decode};
use crate::error::CloudError;
use crate::models::kasa::{DeviceListEntry, GetSysInfo, SetRelayState, SysInfo, SystemResponse};

/// Last known state of a device. Replaced wholesale on refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub device_id: String,
    pub device_type: String,
    pub alias: String,
    pub model: String,
    pub name: String,
    pub software_version: String,
    /// Relay state: 0 is off, anything else is on.
    pub state: u8,
}

impl DeviceInfo {
    pub fn from_list_entry(entry: DeviceListEntry) -> DeviceInfo {
        DeviceInfo {
            device_id: entry.device_id,
            device_type: entry.device_type,
            alias: entry.alias,
            model: entry.device_model,
            name: entry.device_name,
            software_version: entry.fw_ver,
            state: entry.status,
        }
    }

    pub fn from_sysinfo(sysinfo: SysInfo) -> Result<DeviceInfo, CloudError> {
        let device_type = sysinfo
            .device_type()
            .ok_or_else(|| CloudError::Json("sysinfo has neither `mic_type` nor `type`".into()))?
            .to_string();
        Ok(DeviceInfo {
            device_id: sysinfo.device_id,
            device_type,
            alias: sysinfo.alias,
            model: sysinfo.model,
            name: sysinfo.dev_name,
            software_version: sysinfo.sw_ver,
            state: sysinfo.relay_state,
        })
    }
}

pub struct Device<'a> {
    client: &'a CloudClient,
    info: DeviceInfo,
}

impl<'a> Device<'a> {
    pub fn new(client: &'a CloudClient, info: DeviceInfo) -> Self {
        Device { client, info }
    }

    pub fn client(&self) -> &'a CloudClient {
        self.client
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn device_id(&self) -> &str {
        &self.info.device_id
    }

    pub fn state(&self) -> u8 {
        self.info.state
    }

    pub fn is_on(&self) -> bool {
        self.info.state != 0
    }

    /// Pull the device's sysinfo and replace the cached snapshot.
    pub fn refresh(&mut self) -> Result<(), CloudError> {
        let reply = self.send(json!({"system": {"get_sysinfo": null}}))?;
        let resp: SystemResponse<GetSysInfo> = decode(reply)?;
        let sysinfo = resp.system.get_sysinfo;
        if sysinfo.err_code != 0 {
            return Err(CloudError::Device {
                code: sysinfo.err_code,
                message: sysinfo.err_msg.unwrap_or_else(|| String::from("get_sysinfo failed")),
            });
        }

        let mut info = DeviceInfo::from_sysinfo(sysinfo)?;
        if info.device_id != self.info.device_id {
            warn!(
                "Device {} reported id {} in sysinfo; keeping the listed id",
                self.info.device_id, info.device_id
            );
            info.device_id = self.info.device_id.clone();
        }
        self.info = info;
        Ok(())
    }

    /// Switch the relay. The cached state is updated without re-reading it.
    pub fn set_state(&mut self, on: bool) -> Result<(), CloudError> {
        let state = u8::from(on);
        let reply = self.send(json!({"system": {"set_relay_state": {"state": state}}}))?;
        let resp: SystemResponse<SetRelayState> = decode(reply)?;
        let status = resp.system.set_relay_state;
        if status.err_code != 0 {
            return Err(CloudError::Device {
                code: status.err_code,
                message: status.err_msg.unwrap_or_else(|| String::from("set_relay_state failed")),
            });
        }

        self.info.state = state;
        Ok(())
    }

    fn send(&self, command: Value) -> Result<Value, CloudError> {
        debug!("Device {} <- {}", self.info.device_id, command);
        self.client.passthrough(&self.info.device_id, &command)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::client::DEFAULT_ENDPOINT;
    use crate::error::ErrorKind;
    use crate::transport::mock::MockTransport;

    pub const DEVICE_ID: &str = "8006DEADBEEF0000000000000000000000000001";

    pub fn passthrough_reply(device_reply: Value) -> Value {
        json!({
            "error_code": 0,
            "result": {"responseData": device_reply.to_string()}
        })
    }

    pub fn sysinfo_reply(extra: Value) -> Value {
        let mut sysinfo = json!({
            "deviceId": DEVICE_ID,
            "alias": "Kitchen Plug",
            "model": "HS100(UK)",
            "dev_name": "Smart Wi-Fi Plug",
            "sw_ver": "1.5.8 Build 180815 Rel.135935",
            "relay_state": 1,
            "err_code": 0
        });
        if let (Some(base), Some(extra)) = (sysinfo.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                base.insert(k.clone(), v.clone());
            }
        }
        passthrough_reply(json!({"system": {"get_sysinfo": sysinfo}}))
    }

    pub fn relay_reply(err_code: i64) -> Value {
        passthrough_reply(json!({"system": {"set_relay_state": {"err_code": err_code}}}))
    }

    pub fn listed_info() -> DeviceInfo {
        DeviceInfo {
            device_id: DEVICE_ID.into(),
            device_type: "IOT.UNKNOWN".into(),
            alias: "Plug".into(),
            model: "HS100(UK)".into(),
            name: "Smart Wi-Fi Plug".into(),
            software_version: "1.5.0".into(),
            state: 0,
        }
    }

    fn client(mock: &MockTransport) -> CloudClient {
        CloudClient::with_transport("me@example.com", "pw", DEFAULT_ENDPOINT, Box::new(mock.clone()))
            .with_token(Some("T".into()))
    }

    #[test]
    fn refresh_replaces_snapshot() {
        let mock = MockTransport::new();
        mock.push_json(sysinfo_reply(json!({"type": "IOT.SMARTPLUGSWITCH"})));
        let cloud = client(&mock);
        let mut device = Device::new(&cloud, listed_info());

        device.refresh().unwrap();

        let info = device.info();
        assert_eq!(info.device_id, DEVICE_ID);
        assert_eq!(info.alias, "Kitchen Plug");
        assert_eq!(info.model, "HS100(UK)");
        assert_eq!(info.name, "Smart Wi-Fi Plug");
        assert_eq!(info.software_version, "1.5.8 Build 180815 Rel.135935");
        assert_eq!(info.device_type, "IOT.SMARTPLUGSWITCH");
        assert!(device.is_on());

        let req = mock.last_request();
        assert_eq!(req.params()["deviceId"], DEVICE_ID);
        let data: Value = serde_json::from_str(req.params()["requestData"].as_str().unwrap()).unwrap();
        assert_eq!(data, json!({"system": {"get_sysinfo": null}}));
    }

    #[test]
    fn refresh_reads_mic_type() {
        let mock = MockTransport::new();
        mock.push_json(sysinfo_reply(json!({"mic_type": "IOT.SMARTPLUGSWITCH"})));
        let cloud = client(&mock);
        let mut device = Device::new(&cloud, listed_info());

        device.refresh().unwrap();

        assert_eq!(device.info().device_type, "IOT.SMARTPLUGSWITCH");
    }

    #[test]
    fn refresh_joins_fragmented_fields() {
        let mock = MockTransport::new();
        mock.push_json(sysinfo_reply(json!({
            "type": "IOT.SMARTPLUGSWITCH",
            "dev_name": ["Smart ", "Plug"],
            "sw_ver": ["1.0", ".4"]
        })));
        let cloud = client(&mock);
        let mut device = Device::new(&cloud, listed_info());

        device.refresh().unwrap();

        assert_eq!(device.info().name, "Smart Plug");
        assert_eq!(device.info().software_version, "1.0.4");
    }

    #[test]
    fn refresh_keeps_device_id() {
        let mock = MockTransport::new();
        mock.push_json(sysinfo_reply(json!({"type": "IOT.SMARTPLUGSWITCH", "deviceId": "OTHER"})));
        mock.push_json(sysinfo_reply(json!({"type": "IOT.SMARTPLUGSWITCH", "relay_state": 0})));
        let cloud = client(&mock);
        let mut device = Device::new(&cloud, listed_info());

        device.refresh().unwrap();
        assert_eq!(device.device_id(), DEVICE_ID);
        device.refresh().unwrap();
        assert_eq!(device.device_id(), DEVICE_ID);
        assert_eq!(device.state(), 0);
    }

    #[test]
    fn refresh_accepts_object_response_data() {
        let mock = MockTransport::new();
        mock.push_json(json!({
            "error_code": 0,
            "result": {"responseData": {"system": {"get_sysinfo": {
                "deviceId": DEVICE_ID, "type": "IOT.SMARTPLUGSWITCH", "relay_state": 0
            }}}}
        }));
        let cloud = client(&mock);
        let mut device = Device::new(&cloud, listed_info());

        device.refresh().unwrap();

        assert_eq!(device.state(), 0);
    }

    #[test]
    fn refresh_without_type_is_error() {
        let mock = MockTransport::new();
        mock.push_json(sysinfo_reply(json!({})));
        let cloud = client(&mock);
        let mut device = Device::new(&cloud, listed_info());

        assert_eq!(device.refresh().unwrap_err().kind(), ErrorKind::CannotConnect);
        assert_eq!(device.info(), &listed_info());
    }

    #[test]
    fn set_state_updates_cache_without_reading() {
        let mock = MockTransport::new();
        mock.push_json(relay_reply(0));
        mock.push_json(relay_reply(0));
        let cloud = client(&mock);
        let mut device = Device::new(&cloud, listed_info());

        device.set_state(true).unwrap();
        assert_ne!(device.state(), 0);
        assert_eq!(mock.request_count(), 1);
        let data: Value = serde_json::from_str(mock.last_request().params()["requestData"].as_str().unwrap()).unwrap();
        assert_eq!(data, json!({"system": {"set_relay_state": {"state": 1}}}));

        device.set_state(false).unwrap();
        assert_eq!(device.state(), 0);
        assert_eq!(mock.request_count(), 2);
    }

    #[test]
    fn set_state_checks_device_error() {
        let mock = MockTransport::new();
        mock.push_json(relay_reply(-3));
        let cloud = client(&mock);
        let mut device = Device::new(&cloud, listed_info());

        let err = device.set_state(true).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::CannotConnect);
        assert_eq!(err.code(), Some(-3));
        assert_eq!(device.state(), 0);
    }

    #[test]
    fn set_state_propagates_expired_token() {
        let mock = MockTransport::new();
        mock.push_json(json!({"error_code": -20651, "msg": "Token expired"}));
        let cloud = client(&mock);
        let mut device = Device::new(&cloud, listed_info());

        assert!(device.set_state(true).unwrap_err().is_expired_token());
        assert_eq!(device.state(), 0);
    }
}
