//! Settings required to attach a device to an Azure IoT Hub.
//!
//! The settings are read from a TOML file:
//!
//! ```toml
//! [device]
//! id = "thermostat-01"
//!
//! [az]
//! hostname = "my-hub.azure-devices.net"
//! root_cert_path = "/etc/ssl/certs/Baltimore_CyberTrust_Root.pem"
//! sas_token = "SharedAccessSignature sr=..."
//! ```

mod device_config;
mod dto;
mod error;

pub use device_config::*;
pub use error::*;
