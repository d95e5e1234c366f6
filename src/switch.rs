//! Host-facing switch entities.
//!
//! A [`CloudSwitch`] adapts a [`Device`] to the [`SwitchEntity`] contract a host
//! automation system polls and commands. It owns the only retry in the crate:
//! when a call fails with an expired token, log in once, persist the new token,
//! and retry the call once.

use log::{info, warn};

use crate::client::CloudClient;
use crate::device::Device;
use crate::error::CloudError;

pub const MANUFACTURER: &str = "TP-Link";

/// Somewhere to keep the token between runs.
pub trait TokenStore {
    fn store_token(&self, token: &str) -> Result<(), String>;
}

/// Metadata a host shows next to the entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMetadata {
    pub identifier: String,
    pub name: String,
    pub manufacturer: &'static str,
    pub model: String,
    pub sw_version: String,
}

pub trait SwitchEntity {
    fn name(&self) -> &str;

    fn unique_id(&self) -> &str;

    fn is_on(&self) -> bool;

    fn should_poll(&self) -> bool {
        true
    }

    fn device_info(&self) -> DeviceMetadata;

    fn update(&mut self) -> Result<(), CloudError>;

    fn turn_on(&mut self) -> Result<(), CloudError>;

    fn turn_off(&mut self) -> Result<(), CloudError>;
}

/// Log in again and hand the new token to the store.
pub fn renew_token(client: &CloudClient, store: &dyn TokenStore) -> Result<(), CloudError> {
    client.login()?;
    if let Some(token) = client.token() {
        // The session keeps the new token even if saving it fails.
        if let Err(e) = store.store_token(&token) {
            warn!("Could not persist renewed token: {}", e);
        }
    }
    Ok(())
}

/// List devices, renewing the token once if it has expired.
pub fn list_devices_with_relogin<'a>(
    client: &'a CloudClient,
    store: &dyn TokenStore,
) -> Result<Vec<Device<'a>>, CloudError> {
    match client.list_devices() {
        Err(e) if e.is_expired_token() => {
            info!("Token rejected while listing devices ({}); logging in again", e);
            renew_token(client, store)?;
            client.list_devices()
        }
        other => other,
    }
}

pub struct CloudSwitch<'a> {
    device: Device<'a>,
    store: &'a dyn TokenStore,
}

impl<'a> CloudSwitch<'a> {
    pub fn new(device: Device<'a>, store: &'a dyn TokenStore) -> Self {
        CloudSwitch { device, store }
    }

    pub fn device(&self) -> &Device<'a> {
        &self.device
    }

    fn with_relogin(
        &mut self,
        mut op: impl FnMut(&mut Device<'a>) -> Result<(), CloudError>,
    ) -> Result<(), CloudError> {
        match op(&mut self.device) {
            Err(e) if e.is_expired_token() => {
                info!("Token rejected for {} ({}); logging in again", self.device.info().alias, e);
                renew_token(self.device.client(), self.store)?;
                op(&mut self.device)
            }
            other => other,
        }
    }
}

impl SwitchEntity for CloudSwitch<'_> {
    fn name(&self) -> &str {
        &self.device.info().alias
    }

    fn unique_id(&self) -> &str {
        self.device.device_id()
    }

    fn is_on(&self) -> bool {
        self.device.is_on()
    }

    fn device_info(&self) -> DeviceMetadata {
        let info = self.device.info();
        DeviceMetadata {
            identifier: info.device_id.clone(),
            name: info.alias.clone(),
            manufacturer: MANUFACTURER,
            model: info.model.clone(),
            sw_version: info.software_version.clone(),
        }
    }

    fn update(&mut self) -> Result<(), CloudError> {
        self.with_relogin(|d| d.refresh())
    }

    fn turn_on(&mut self) -> Result<(), CloudError> {
        self.with_relogin(|d| d.set_state(true))
    }

    fn turn_off(&mut self) -> Result<(), CloudError> {
        self.with_relogin(|d| d.set_state(false))
    }
}
