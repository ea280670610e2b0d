//! batch command - verify many credential pairs concurrently

use super::{report, CommandContext};
use anyhow::{Context, Result};
use ldaptest_auth::{AuthChecker, AuthOutcome, AuthResult, CancellationToken};
use ldaptest_core::DirectoryConfig;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// One credential pair read from the input.
pub struct Credential {
    pub line: usize,
    pub username: String,
    pub password: SecretString,
}

/// Aggregate counts for a batch run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub authenticated: usize,
    pub rejected: usize,
    pub unreachable: usize,
    pub timed_out: usize,
    pub config_invalid: usize,
    pub cancelled: usize,
}

impl Summary {
    pub fn from_results(results: &[AuthResult]) -> Self {
        let mut summary = Self {
            total: results.len(),
            ..Self::default()
        };
        for result in results {
            match result.outcome() {
                AuthOutcome::Authenticated => summary.authenticated += 1,
                AuthOutcome::InvalidCredentials => summary.rejected += 1,
                AuthOutcome::EndpointUnreachable => summary.unreachable += 1,
                AuthOutcome::Timeout => summary.timed_out += 1,
                AuthOutcome::ConfigInvalid => summary.config_invalid += 1,
                AuthOutcome::Cancelled => summary.cancelled += 1,
            }
        }
        summary
    }

    pub fn all_passed(&self) -> bool {
        self.authenticated == self.total
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total: {}, succeeded: {}, rejected: {}, unreachable: {}, timed out: {}",
            self.total, self.authenticated, self.rejected, self.unreachable, self.timed_out
        )?;
        if self.config_invalid > 0 {
            write!(f, ", config invalid: {}", self.config_invalid)?;
        }
        if self.cancelled > 0 {
            write!(f, ", cancelled: {}", self.cancelled)?;
        }
        Ok(())
    }
}

pub async fn execute(ctx: &CommandContext, input: &str, concurrency: usize) -> Result<bool> {
    let credentials = if input == "-" {
        parse_credentials(BufReader::new(io::stdin())).await?
    } else {
        let file = File::open(input)
            .await
            .with_context(|| format!("failed to open {input}"))?;
        parse_credentials(BufReader::new(file)).await?
    };
    info!(count = credentials.len(), concurrency, "starting batch");

    let results = run_batch(
        &ctx.checker,
        &ctx.config,
        credentials,
        concurrency,
        &ctx.cancel,
    )
    .await?;

    for result in &results {
        report(result);
    }
    let summary = Summary::from_results(&results);
    println!("{summary}");

    Ok(summary.all_passed())
}

/// Parses `username<whitespace>password` lines; blank lines and `#` comments are skipped.
///
/// Everything after the first run of whitespace is the password, so passwords may contain
/// spaces. A line with only a username yields an empty password, which the checker rejects.
pub async fn parse_credentials(reader: impl AsyncBufRead + Unpin) -> Result<Vec<Credential>> {
    let mut credentials = Vec::new();
    let mut lines = reader.lines();
    let mut line_no = 0;

    while let Some(line) = lines
        .next_line()
        .await
        .with_context(|| format!("failed to read input line {}", line_no + 1))?
    {
        line_no += 1;
        let line = line.trim_end_matches('\r');
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let (username, password) = trimmed
            .split_once(char::is_whitespace)
            .map_or((trimmed, ""), |(user, rest)| (user, rest.trim_start()));

        credentials.push(Credential {
            line: line_no,
            username: username.to_string(),
            password: SecretString::from(password.to_string()),
        });
    }

    Ok(credentials)
}

/// Verifies every credential with at most `concurrency` binds in flight.
///
/// Results come back in input order.
pub async fn run_batch(
    checker: &AuthChecker,
    config: &Arc<DirectoryConfig>,
    credentials: Vec<Credential>,
    concurrency: usize,
    cancel: &CancellationToken,
) -> Result<Vec<AuthResult>> {
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));

    let handles = credentials
        .into_iter()
        .map(|credential| {
            let checker = checker.clone();
            let config = Arc::clone(config);
            let cancel = cancel.clone();
            let permits = Arc::clone(&permits);
            tokio::spawn(async move {
                let _permit = permits.acquire_owned().await?;
                debug!(line = credential.line, username = %credential.username, "checking credential");
                let result = checker
                    .verify_with_cancel(
                        &config,
                        &credential.username,
                        credential.password.expose_secret(),
                        &cancel,
                    )
                    .await;
                anyhow::Ok(result)
            })
        })
        .collect::<Vec<_>>();

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.context("batch worker panicked")??);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ldaptest_auth::{LdapConnector, LdapSession};
    use ldaptest_core::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Directory {
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    struct Session {
        in_flight: Arc<AtomicUsize>,
    }

    impl Drop for Session {
        fn drop(&mut self) {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl LdapConnector for Directory {
        async fn connect(
            &self,
            _config: &DirectoryConfig,
        ) -> ldaptest_core::Result<Box<dyn LdapSession>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            Ok(Box::new(Session {
                in_flight: Arc::clone(&self.in_flight),
            }))
        }
    }

    #[async_trait]
    impl LdapSession for Session {
        async fn simple_bind(&mut self, dn: &str, password: &str) -> ldaptest_core::Result<()> {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            if dn.starts_with("uid=good,") && password == "pw" {
                Ok(())
            } else {
                Err(Error::InvalidCredentials("rejected".to_string()))
            }
        }

        async fn unbind(&mut self) -> ldaptest_core::Result<()> {
            Ok(())
        }
    }

    async fn parse(input: &str) -> Vec<(usize, String, String)> {
        parse_credentials(input.as_bytes())
            .await
            .unwrap()
            .into_iter()
            .map(|c| (c.line, c.username, c.password.expose_secret().to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_parse_credentials() {
        let parsed = parse("alice secret\n\n# comment\nbob\tpass word\r\ncarol\n").await;
        assert_eq!(
            parsed,
            vec![
                (1, "alice".to_string(), "secret".to_string()),
                (4, "bob".to_string(), "pass word".to_string()),
                (5, "carol".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_summary_display() {
        let summary = Summary::default();
        assert!(summary.all_passed());
        assert_eq!(
            summary.to_string(),
            "total: 0, succeeded: 0, rejected: 0, unreachable: 0, timed out: 0"
        );

        let summary = Summary {
            total: 4,
            authenticated: 2,
            rejected: 1,
            cancelled: 1,
            ..Summary::default()
        };
        assert!(!summary.all_passed());
        assert_eq!(
            summary.to_string(),
            "total: 4, succeeded: 2, rejected: 1, unreachable: 0, timed out: 0, cancelled: 1"
        );
    }

    #[tokio::test]
    async fn test_run_batch_preserves_order_and_bounds_concurrency() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let checker = AuthChecker::with_connector(Arc::new(Directory {
            in_flight: Arc::clone(&in_flight),
            peak: Arc::clone(&peak),
        }));
        let config = Arc::new(DirectoryConfig::new("ldap", "uid=%s,dc=example").unwrap());

        let input = (0..20)
            .map(|i| if i % 4 == 0 { "good pw".to_string() } else { format!("user{i} pw") })
            .collect::<Vec<_>>()
            .join("\n");
        let credentials = parse_credentials(input.as_bytes()).await.unwrap();

        let results = run_batch(&checker, &config, credentials, 3, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(results.len(), 20);
        for (i, result) in results.iter().enumerate() {
            let expected = if i % 4 == 0 { "good".to_string() } else { format!("user{i}") };
            assert_eq!(result.username(), expected);
        }

        let summary = Summary::from_results(&results);
        assert_eq!(summary.authenticated, 5);
        assert_eq!(summary.rejected, 15);
        assert!(!summary.all_passed());
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    }
}
