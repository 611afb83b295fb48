//! Station-mode radio behind [`WifiLink`]

use alloc::string::String;

use esp_radio::wifi::{ClientConfig, ModeConfig, WifiController};
use log::{debug, warn};

use boat32_core::config::Credential;
use boat32_core::connectivity::{LinkError, WifiLink};

pub struct RadioLink {
    controller: WifiController<'static>,
}

impl RadioLink {
    pub fn new(controller: WifiController<'static>) -> Self {
        Self { controller }
    }
}

impl WifiLink for RadioLink {
    async fn begin(&mut self, credential: &Credential) -> Result<(), LinkError> {
        let started = matches!(self.controller.is_started(), Ok(true));
        if started {
            // Drop any half-open association before switching networks.
            if let Err(e) = self.controller.disconnect_async().await {
                debug!(target: "wifi", "Disconnect before switching: {:?}", e);
            }
        }

        let config = ModeConfig::Client(
            ClientConfig::default()
                .with_ssid(String::from(credential.ssid.as_str()))
                .with_password(String::from(credential.password.as_str())),
        );
        self.controller.set_config(&config).map_err(|e| {
            warn!(target: "wifi", "set_config failed: {:?}", e);
            LinkError::Driver
        })?;

        if !started {
            self.controller.start_async().await.map_err(|e| {
                warn!(target: "wifi", "Radio start failed: {:?}", e);
                LinkError::Driver
            })?;
        }

        self.controller.connect().map_err(|e| {
            debug!(target: "wifi", "connect rejected: {:?}", e);
            LinkError::Rejected
        })
    }

    async fn is_connected(&mut self) -> bool {
        self.controller.is_connected().unwrap_or(false)
    }
}
