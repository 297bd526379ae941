use camino::Utf8PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("TOML parse error")]
    TOMLParseError(#[from] toml::de::Error),

    #[error("I/O error")]
    IOError(#[from] std::io::Error),

    #[error("Config file not found: {0}")]
    ConfigFileNotFound(Utf8PathBuf),

    #[error("The setting '{0}' is not set")]
    MissingSetting(&'static str),

    #[error("Failed to read the root certificate from {path}")]
    RootCertUnreadable {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}
