//! Connection seam between the checker and the directory protocol implementation.

use async_trait::async_trait;
use ldap3::{LdapConnAsync, LdapConnSettings};
use ldaptest_core::{DirectoryConfig, Error, Result};
use native_tls::{Certificate, TlsConnector};
use std::fs;

// LDAP result codes that mean the directory refused the presented credentials.
const RC_SUCCESS: u32 = 0;
const RC_INAPPROPRIATE_AUTHENTICATION: u32 = 48;
const RC_INVALID_CREDENTIALS: u32 = 49;

/// One open connection to a directory service.
///
/// Dropping a session releases the underlying connection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LdapSession: Send {
    /// Performs a simple bind with the given DN and password.
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()>;
    /// Sends an unbind request.
    async fn unbind(&mut self) -> Result<()>;
}

/// Opens sessions to the endpoint described by a [`DirectoryConfig`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LdapConnector: Send + Sync {
    /// Connects to the configured directory service.
    async fn connect(&self, config: &DirectoryConfig) -> Result<Box<dyn LdapSession>>;
}

/// Connector backed by `ldap3`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ldap3Connector;

impl Ldap3Connector {
    /// Creates a new connector instance.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LdapConnector for Ldap3Connector {
    async fn connect(&self, config: &DirectoryConfig) -> Result<Box<dyn LdapSession>> {
        let settings = build_ldap_settings(config)?;
        let url = config.url()?;
        let (conn, ldap) = LdapConnAsync::with_settings(settings, url.as_str())
            .await
            .map_err(|err| {
                Error::EndpointUnreachable(format!("failed to connect to {url}: {err}"))
            })?;
        ldap3::drive!(conn);
        Ok(Box::new(Ldap3Session { inner: ldap }))
    }
}

struct Ldap3Session {
    inner: ldap3::Ldap,
}

#[async_trait]
impl LdapSession for Ldap3Session {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()> {
        let result = self
            .inner
            .simple_bind(dn, password)
            .await
            .map_err(|err| Error::EndpointUnreachable(format!("bind request failed: {err}")))?;
        classify_bind_result(result.rc, &result.text)
    }

    async fn unbind(&mut self) -> Result<()> {
        self.inner
            .unbind()
            .await
            .map_err(|err| Error::EndpointUnreachable(format!("unbind failed: {err}")))
    }
}

fn build_ldap_settings(config: &DirectoryConfig) -> Result<LdapConnSettings> {
    let mut settings = LdapConnSettings::new().set_starttls(config.start_tls());

    if !config.tls_verify() {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|err| Error::Internal(format!("failed to construct TLS connector: {err}")))?;
        settings = settings.set_connector(connector).set_no_tls_verify(true);
    } else if let Some(cert_path) = config.tls_ca_cert() {
        let pem = fs::read(cert_path).map_err(|err| {
            Error::config(
                "tlsCaCert",
                format!("failed to read CA certificate {}: {err}", cert_path.display()),
            )
        })?;
        let certificate = Certificate::from_pem(&pem)
            .map_err(|err| Error::config("tlsCaCert", format!("invalid CA certificate: {err}")))?;
        let connector = TlsConnector::builder()
            .add_root_certificate(certificate)
            .build()
            .map_err(|err| {
                Error::config("tlsCaCert", format!("failed to load CA certificate: {err}"))
            })?;
        settings = settings.set_connector(connector);
    }

    Ok(settings)
}

/// Maps an LDAP bind result code onto the error taxonomy.
///
/// Only codes 48 and 49 count as rejected credentials; every other non-zero code is treated as
/// a directory-side failure.
fn classify_bind_result(rc: u32, text: &str) -> Result<()> {
    let diagnostic = if text.is_empty() {
        String::new()
    } else {
        format!(": {text}")
    };

    match rc {
        RC_SUCCESS => Ok(()),
        RC_INVALID_CREDENTIALS | RC_INAPPROPRIATE_AUTHENTICATION => Err(Error::InvalidCredentials(
            format!("directory rejected the bind (rc={rc}){diagnostic}"),
        )),
        _ => Err(Error::EndpointUnreachable(format!(
            "bind failed with result code {rc}{diagnostic}"
        ))),
    }
}
