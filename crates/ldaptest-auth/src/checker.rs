//! Credential verification by directory bind.

use crate::connector::{Ldap3Connector, LdapConnector};
use crate::outcome::AuthResult;
use ldaptest_core::{ConfigStore, DirectoryConfig, DistinguishedName, Error, Result};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One verification attempt. Lives only for the duration of a single `verify` call.
struct AuthAttempt<'a> {
    username: &'a str,
    password: SecretString,
    resolved_dn: DistinguishedName,
}

impl<'a> AuthAttempt<'a> {
    fn new(config: &DirectoryConfig, username: &'a str, password: &str) -> Result<Self> {
        // An empty password is an unauthenticated bind, which many directories answer with
        // success. Never let one reach the network.
        if username.is_empty() {
            return Err(Error::InvalidCredentials("username is empty".to_string()));
        }
        if password.is_empty() {
            return Err(Error::InvalidCredentials("password is empty".to_string()));
        }

        let resolved_dn = config
            .bind_dn_template()
            .resolve(username)
            .map_err(|err| Error::InvalidCredentials(format!("unusable username: {err}")))?;

        Ok(Self {
            username,
            password: SecretString::from(password.to_owned()),
            resolved_dn,
        })
    }
}

impl fmt::Debug for AuthAttempt<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthAttempt")
            .field("username", &self.username)
            .field("resolved_dn", &self.resolved_dn.as_str())
            .finish_non_exhaustive()
    }
}

/// Verifies username/password pairs by binding to the configured directory service.
///
/// The checker holds no per-call state, so one instance can serve any number of concurrent
/// calls. Each call opens its own connection and releases it before returning.
#[derive(Clone)]
pub struct AuthChecker {
    connector: Arc<dyn LdapConnector>,
}

impl Default for AuthChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AuthChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthChecker").finish_non_exhaustive()
    }
}

impl AuthChecker {
    /// Creates a checker that uses the `ldap3` connector.
    #[must_use]
    pub fn new() -> Self {
        Self::with_connector(Arc::new(Ldap3Connector::new()))
    }

    /// Creates a checker with a custom connector.
    #[must_use]
    pub fn with_connector(connector: Arc<dyn LdapConnector>) -> Self {
        Self { connector }
    }

    /// Verifies `username`/`password` against the directory described by `config`.
    ///
    /// Failures are returned as data; this never panics on a failed bind.
    pub async fn verify(
        &self,
        config: &DirectoryConfig,
        username: &str,
        password: &str,
    ) -> AuthResult {
        self.verify_with_cancel(config, username, password, &CancellationToken::new())
            .await
    }

    /// Like [`AuthChecker::verify`], aborting the network operation when `cancel` fires.
    pub async fn verify_with_cancel(
        &self,
        config: &DirectoryConfig,
        username: &str,
        password: &str,
        cancel: &CancellationToken,
    ) -> AuthResult {
        let started = Instant::now();
        let result = self.run(config, username, password, cancel).await;
        let result = AuthResult::new(username, result, started.elapsed());

        match result.detail() {
            None => {
                debug!(username, elapsed_ms = elapsed_ms(&result), "bind succeeded");
            }
            Some(err) if err.should_log() => {
                warn!(
                    username,
                    host = config.host(),
                    outcome = %result.outcome(),
                    error = %err,
                    "bind attempt failed"
                );
            }
            Some(err) => {
                debug!(username, outcome = %result.outcome(), error = %err, "bind failed");
            }
        }
        result
    }

    /// Verifies against the store's current snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotLoaded`] if the store has no configuration.
    pub async fn verify_current(
        &self,
        store: &ConfigStore,
        username: &str,
        password: &str,
    ) -> Result<AuthResult> {
        let config = store.current()?;
        Ok(self.verify(&config, username, password).await)
    }

    async fn run(
        &self,
        config: &DirectoryConfig,
        username: &str,
        password: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let attempt = AuthAttempt::new(config, username, password)?;
        config.validate()?;

        debug!(username, dn = attempt.resolved_dn.as_str(), "attempting directory bind");

        let deadline = Instant::now() + config.timeout();
        let bounded = Bounded {
            deadline,
            cancel,
            config,
        };

        let mut session = bounded.run(self.connector.connect(config)).await?;
        let bound = bounded
            .run(session.simple_bind(
                attempt.resolved_dn.as_str(),
                attempt.password.expose_secret(),
            ))
            .await;

        // A stuck connection is simply dropped; only answered binds get a polite unbind.
        if !matches!(bound, Err(Error::Timeout(_) | Error::Cancelled)) {
            if let Err(err) = bounded.run(session.unbind()).await {
                debug!(username, error = %err, "unbind failed");
            }
        }
        drop(session);
        bound
    }
}

/// Shared deadline and cancellation signal for the steps of one attempt.
struct Bounded<'a> {
    deadline: Instant,
    cancel: &'a CancellationToken,
    config: &'a DirectoryConfig,
}

impl Bounded<'_> {
    async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Error::Cancelled),
            result = timeout_at(self.deadline, fut) => result.map_err(|_| {
                Error::Timeout(format!(
                    "no response from {}:{} within {} ms",
                    self.config.host(),
                    self.config.port(),
                    self.config.timeout().as_millis()
                ))
            })?,
        }
    }
}

fn elapsed_ms(result: &AuthResult) -> u64 {
    u64::try_from(result.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{MockLdapConnector, MockLdapSession};
    use crate::outcome::AuthOutcome;
    use mockall::predicate::eq;
    use std::time::Duration;

    fn sample_config() -> DirectoryConfig {
        DirectoryConfig::new("ldap.example.org", "uid=%s,ou=people,dc=example,dc=org").unwrap()
    }

    fn checker(connector: MockLdapConnector) -> AuthChecker {
        AuthChecker::with_connector(Arc::new(connector))
    }

    #[tokio::test]
    async fn verify_success() {
        let mut session = MockLdapSession::new();
        session
            .expect_simple_bind()
            .with(eq("uid=alice,ou=people,dc=example,dc=org"), eq("correct-pw"))
            .times(1)
            .returning(|_, _| Ok(()));
        session.expect_unbind().times(1).returning(|| Ok(()));

        let mut connector = MockLdapConnector::new();
        connector
            .expect_connect()
            .times(1)
            .return_once(move |_| Ok(Box::new(session)));

        let result = checker(connector)
            .verify(&sample_config(), "alice", "correct-pw")
            .await;
        assert!(result.authenticated());
        assert_eq!(result.outcome(), AuthOutcome::Authenticated);
        assert_eq!(result.username(), "alice");
    }

    #[tokio::test]
    async fn verify_rejected_credentials() {
        let mut session = MockLdapSession::new();
        session.expect_simple_bind().returning(|_, _| {
            Err(Error::InvalidCredentials(
                "directory rejected the bind (rc=49)".to_string(),
            ))
        });
        session.expect_unbind().times(1).returning(|| Ok(()));

        let mut connector = MockLdapConnector::new();
        connector
            .expect_connect()
            .return_once(move |_| Ok(Box::new(session)));

        let result = checker(connector)
            .verify(&sample_config(), "alice", "wrong-pw")
            .await;
        assert!(!result.authenticated());
        assert_eq!(result.outcome(), AuthOutcome::InvalidCredentials);
        assert!(matches!(result.detail(), Some(Error::InvalidCredentials(_))));
    }

    #[tokio::test]
    async fn empty_password_never_contacts_directory() {
        let mut connector = MockLdapConnector::new();
        connector.expect_connect().never();
        let checker = checker(connector);

        let result = checker.verify(&sample_config(), "alice", "").await;
        assert_eq!(result.outcome(), AuthOutcome::InvalidCredentials);
        assert!(!result.authenticated());

        let result = checker.verify(&sample_config(), "", "secret").await;
        assert_eq!(result.outcome(), AuthOutcome::InvalidCredentials);
    }

    #[tokio::test]
    async fn invalid_config_never_contacts_directory() {
        let mut connector = MockLdapConnector::new();
        connector.expect_connect().never();

        let config = sample_config().with_port(0);
        let result = checker(connector).verify(&config, "alice", "secret").await;
        assert_eq!(result.outcome(), AuthOutcome::ConfigInvalid);
        assert_eq!(result.detail().and_then(Error::field), Some("port"));
    }

    #[tokio::test]
    async fn connect_failure_is_unreachable() {
        let mut connector = MockLdapConnector::new();
        connector.expect_connect().returning(|_| {
            Err(Error::EndpointUnreachable("connection refused".to_string()))
        });

        let result = checker(connector)
            .verify(&sample_config(), "alice", "secret")
            .await;
        assert_eq!(result.outcome(), AuthOutcome::EndpointUnreachable);
    }

    #[tokio::test]
    async fn unbind_failure_does_not_change_outcome() {
        let mut session = MockLdapSession::new();
        session.expect_simple_bind().returning(|_, _| Ok(()));
        session
            .expect_unbind()
            .returning(|| Err(Error::EndpointUnreachable("reset".to_string())));

        let mut connector = MockLdapConnector::new();
        connector
            .expect_connect()
            .return_once(move |_| Ok(Box::new(session)));

        let result = checker(connector)
            .verify(&sample_config(), "alice", "secret")
            .await;
        assert!(result.authenticated());
    }

    #[tokio::test]
    async fn username_is_escaped_into_dn() {
        let mut session = MockLdapSession::new();
        session
            .expect_simple_bind()
            .with(
                eq("uid=alice\\,ou\\=admins,ou=people,dc=example,dc=org"),
                eq("secret"),
            )
            .returning(|_, _| Ok(()));
        session.expect_unbind().returning(|| Ok(()));

        let mut connector = MockLdapConnector::new();
        connector
            .expect_connect()
            .return_once(move |_| Ok(Box::new(session)));

        let result = checker(connector)
            .verify(&sample_config(), "alice,ou=admins", "secret")
            .await;
        assert!(result.authenticated());
    }

    #[tokio::test]
    async fn verify_current_requires_loaded_store() {
        let mut connector = MockLdapConnector::new();
        connector.expect_connect().never();

        let store = ConfigStore::new();
        let err = checker(connector)
            .verify_current(&store, "alice", "secret")
            .await
            .unwrap_err();
        assert_eq!(err, Error::NotLoaded);
    }

    #[tokio::test]
    async fn pre_cancelled_token_short_circuits() {
        let mut connector = MockLdapConnector::new();
        connector.expect_connect().returning(|_| {
            Err(Error::EndpointUnreachable("should not be observed".to_string()))
        });

        let cancel = CancellationToken::new();
        cancel.cancel();
        let config = sample_config().with_timeout(Duration::from_secs(5));
        let result = checker(connector)
            .verify_with_cancel(&config, "alice", "secret", &cancel)
            .await;
        assert_eq!(result.outcome(), AuthOutcome::Cancelled);
    }

    #[test]
    fn attempt_debug_hides_password() {
        let attempt = AuthAttempt::new(&sample_config(), "alice", "hunter2").unwrap();
        let debug = format!("{attempt:?}");
        assert!(debug.contains("alice"));
        assert!(!debug.contains("hunter2"));
    }
}
