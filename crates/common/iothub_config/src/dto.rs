//! Crate-private plain-old data-type used for deserialization.

use camino::Utf8PathBuf;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct IotHubConfigDto {
    #[serde(default)]
    pub(crate) device: DeviceDto,

    #[serde(default)]
    pub(crate) az: AzureDto,
}

/// The [device] section
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct DeviceDto {
    /// The device id registered on the IoT Hub
    pub(crate) id: Option<String>,

    /// Set when the client is an IoT Edge module rather than a device
    pub(crate) module_id: Option<String>,
}

/// The [az] section
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct AzureDto {
    pub(crate) hostname: Option<String>,

    /// Hostname of an Edge gateway, when the device connects through one
    pub(crate) gateway_hostname: Option<String>,

    /// The path of the certificate used to trust the hub or the gateway
    pub(crate) root_cert_path: Option<Utf8PathBuf>,

    /// A SAS token generated out of band
    pub(crate) sas_token: Option<String>,
}
