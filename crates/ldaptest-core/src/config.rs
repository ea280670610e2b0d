//! Directory endpoint configuration.
//!
//! This module decodes the JSON configuration document, applies defaults and validates every
//! field. A [`DirectoryConfig`] only exists in a validated state; there is no way to obtain a
//! partially-populated value from a source that failed validation.

use crate::dn::BindDnTemplate;
use crate::{Error, Result};
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;
use validator::Validate;

/// Default port for plain and StartTLS connections.
pub const DEFAULT_LDAP_PORT: u16 = 389;
/// Default port for `ldaps://` connections.
pub const DEFAULT_LDAPS_PORT: u16 = 636;
/// Default connect-and-bind timeout (milliseconds).
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// JSON form of the configuration, before defaults and validation.
#[derive(Debug, Clone, Deserialize, Validate)]
struct RawDirectoryConfig {
    #[validate(
        required(message = "host is required"),
        length(min = 1, message = "host cannot be empty")
    )]
    host: Option<String>,

    #[validate(range(min = 1, max = 65535, message = "port must be between 1 and 65535"))]
    port: Option<i64>,

    #[serde(rename = "bindDNTemplate")]
    bind_dn_template: Option<String>,

    #[serde(rename = "timeoutMs")]
    timeout_ms: Option<i64>,

    #[serde(rename = "useTLS", default)]
    use_tls: bool,

    #[serde(rename = "startTLS", default)]
    start_tls: bool,

    #[serde(rename = "tlsVerify", default = "default_tls_verify")]
    tls_verify: bool,

    #[serde(rename = "tlsCaCert")]
    tls_ca_cert: Option<PathBuf>,
}

const fn default_tls_verify() -> bool {
    true
}

/// Validated connection descriptor for one directory service endpoint.
///
/// Values are immutable once built; share them behind an `Arc` (see
/// [`ConfigStore`](crate::store::ConfigStore)).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryConfig {
    host: String,
    port: u16,
    bind_dn_template: BindDnTemplate,
    timeout: Duration,
    use_tls: bool,
    start_tls: bool,
    tls_verify: bool,
    tls_ca_cert: Option<PathBuf>,
}

impl DirectoryConfig {
    /// Creates a configuration with default port, timeout and TLS settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the host is empty or the template is invalid.
    pub fn new(host: impl Into<String>, bind_dn_template: &str) -> Result<Self> {
        let template = BindDnTemplate::parse(bind_dn_template)
            .map_err(|err| Error::config("bindDNTemplate", err.to_string()))?;

        let config = Self {
            host: host.into().trim().to_string(),
            port: DEFAULT_LDAP_PORT,
            bind_dn_template: template,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            use_tls: false,
            start_tls: false,
            tls_verify: default_tls_verify(),
            tls_ca_cert: None,
        };
        config.validate()?;
        Ok(config)
    }

    /// Decodes and validates a configuration from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigParse`] for malformed JSON and [`Error::Config`] naming the
    /// offending field for invalid values.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        let raw: RawDirectoryConfig = serde_json::from_slice(bytes)?;
        Self::from_raw(raw)
    }

    /// Decodes and validates a configuration from a reader.
    ///
    /// # Errors
    ///
    /// See [`DirectoryConfig::from_json_slice`]; read failures yield [`Error::Io`].
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let raw: RawDirectoryConfig = serde_json::from_reader(reader)?;
        Self::from_raw(raw)
    }

    /// Reads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read, otherwise see
    /// [`DirectoryConfig::from_json_slice`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|err| Error::Io(format!("failed to read {}: {err}", path.display())))?;
        Self::from_json_slice(&bytes)
    }

    fn from_raw(raw: RawDirectoryConfig) -> Result<Self> {
        raw.validate()?;

        let host = raw
            .host
            .map(|host| host.trim().to_string())
            .filter(|host| !host.is_empty())
            .ok_or_else(|| Error::config("host", "host cannot be empty"))?;

        let template = raw
            .bind_dn_template
            .ok_or_else(|| Error::config("bindDNTemplate", "bindDNTemplate is required"))?;
        let bind_dn_template = BindDnTemplate::parse(template)
            .map_err(|err| Error::config("bindDNTemplate", err.to_string()))?;

        let port = match raw.port {
            Some(port) => u16::try_from(port)
                .map_err(|_| Error::config("port", "port must be between 1 and 65535"))?,
            None if raw.use_tls => DEFAULT_LDAPS_PORT,
            None => DEFAULT_LDAP_PORT,
        };

        let timeout_ms = raw
            .timeout_ms
            .and_then(|ms| u64::try_from(ms).ok())
            .filter(|ms| *ms > 0)
            .unwrap_or(DEFAULT_TIMEOUT_MS);

        let config = Self {
            host,
            port,
            bind_dn_template,
            timeout: Duration::from_millis(timeout_ms),
            use_tls: raw.use_tls,
            start_tls: raw.start_tls,
            tls_verify: raw.tls_verify,
            tls_ca_cert: raw.tls_ca_cert,
        };
        config.validate()?;
        Ok(config)
    }

    /// Re-checks the structural invariants of this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::config("host", "host cannot be empty"));
        }
        if self.port == 0 {
            return Err(Error::config("port", "port must be between 1 and 65535"));
        }
        if self.timeout.is_zero() {
            return Err(Error::config("timeoutMs", "timeout must be positive"));
        }
        if self.use_tls && self.start_tls {
            return Err(Error::config(
                "startTLS",
                "startTLS cannot be combined with useTLS",
            ));
        }
        self.url()?;
        Ok(())
    }

    /// Returns the directory host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the directory port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns the bind DN template.
    #[must_use]
    pub const fn bind_dn_template(&self) -> &BindDnTemplate {
        &self.bind_dn_template
    }

    /// Returns the connect-and-bind timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns whether the connection uses `ldaps://`.
    #[must_use]
    pub const fn use_tls(&self) -> bool {
        self.use_tls
    }

    /// Returns whether a plain connection is upgraded with StartTLS.
    #[must_use]
    pub const fn start_tls(&self) -> bool {
        self.start_tls
    }

    /// Returns whether TLS certificate verification is enabled.
    #[must_use]
    pub const fn tls_verify(&self) -> bool {
        self.tls_verify
    }

    /// Optional custom CA certificate path.
    #[must_use]
    pub fn tls_ca_cert(&self) -> Option<&Path> {
        self.tls_ca_cert.as_deref()
    }

    /// Builds the LDAP URL for this endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for the `host` field if no valid URL can be formed.
    pub fn url(&self) -> Result<Url> {
        let scheme = if self.use_tls { "ldaps" } else { "ldap" };
        let host = if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };

        let url = Url::parse(&format!("{scheme}://{host}:{}", self.port))
            .map_err(|err| Error::config("host", format!("invalid host: {err}")))?;
        if url.host_str().is_none() || url.path() != "/" && !url.path().is_empty() {
            return Err(Error::config("host", "host must be a bare network address"));
        }
        Ok(url)
    }

    /// Overrides the port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Overrides the timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enables or disables `ldaps://`.
    #[must_use]
    pub const fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    /// Enables or disables StartTLS.
    #[must_use]
    pub const fn with_start_tls(mut self, start_tls: bool) -> Self {
        self.start_tls = start_tls;
        self
    }

    /// Enables or disables TLS certificate verification.
    #[must_use]
    pub const fn with_tls_verification(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Sets the custom CA certificate path for TLS verification.
    #[must_use]
    pub fn with_tls_ca_cert(mut self, path: PathBuf) -> Self {
        self.tls_ca_cert = Some(path);
        self
    }
}
