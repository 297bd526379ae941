use crate::dto::IotHubConfigDto;
use crate::ConfigError;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use std::io::ErrorKind;

/// Identity and connection settings of a device
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeviceConfig {
    pub device_id: String,
    pub module_id: Option<String>,
    pub hostname: String,
    pub gateway_hostname: Option<String>,
    pub root_cert_path: Option<Utf8PathBuf>,
    pub sas_token: String,
}

impl DeviceConfig {
    pub fn from_file(path: &Utf8Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(ConfigError::ConfigFileNotFound(path.to_owned()))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let dto: IotHubConfigDto = toml::from_str(content)?;

        Ok(DeviceConfig {
            device_id: non_empty(dto.device.id).ok_or(ConfigError::MissingSetting("device.id"))?,
            module_id: non_empty(dto.device.module_id),
            hostname: non_empty(dto.az.hostname).ok_or(ConfigError::MissingSetting("az.hostname"))?,
            gateway_hostname: non_empty(dto.az.gateway_hostname),
            root_cert_path: dto.az.root_cert_path,
            sas_token: dto.az.sas_token.unwrap_or_default(),
        })
    }

    /// Read the certificate pointed by `az.root_cert_path`, if any
    pub fn read_root_cert(&self) -> Result<Option<Vec<u8>>, ConfigError> {
        let Some(path) = &self.root_cert_path else {
            return Ok(None);
        };
        std::fs::read(path)
            .map(Some)
            .map_err(|source| ConfigError::RootCertUnreadable {
                path: path.clone(),
                source,
            })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
