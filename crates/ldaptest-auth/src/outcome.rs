//! Classified results of a verification attempt.

use ldaptest_core::Error;
use std::fmt;
use std::time::Duration;

/// Classification of a single verification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthOutcome {
    /// The directory accepted the credentials.
    Authenticated,
    /// Credentials were empty or rejected by the directory.
    InvalidCredentials,
    /// The directory could not be reached or failed in an unexpected way.
    EndpointUnreachable,
    /// No answer within the configured timeout.
    Timeout,
    /// The configuration failed validation; no connection was attempted.
    ConfigInvalid,
    /// The caller cancelled the attempt.
    Cancelled,
}

impl AuthOutcome {
    /// Stable lowercase name of the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Authenticated => "authenticated",
            Self::InvalidCredentials => "invalid_credentials",
            Self::EndpointUnreachable => "endpoint_unreachable",
            Self::Timeout => "timeout",
            Self::ConfigInvalid => "config_invalid",
            Self::Cancelled => "cancelled",
        }
    }

    /// Maps an error to the outcome it represents.
    ///
    /// Anything not explicitly recognised counts as an unreachable endpoint; no error ever maps
    /// to [`AuthOutcome::Authenticated`].
    #[must_use]
    pub const fn from_error(err: &Error) -> Self {
        match err {
            Error::InvalidCredentials(_) => Self::InvalidCredentials,
            Error::Timeout(_) => Self::Timeout,
            Error::Cancelled => Self::Cancelled,
            Error::Config { .. } | Error::ConfigParse(_) | Error::NotLoaded => {
                Self::ConfigInvalid
            }
            Error::EndpointUnreachable(_) | Error::Io(_) | Error::Internal(_) => {
                Self::EndpointUnreachable
            }
        }
    }
}

impl fmt::Display for AuthOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured result returned by [`AuthChecker`](crate::AuthChecker).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResult {
    username: String,
    outcome: AuthOutcome,
    detail: Option<Error>,
    elapsed: Duration,
}

impl AuthResult {
    pub(crate) fn new(username: &str, result: Result<(), Error>, elapsed: Duration) -> Self {
        let (outcome, detail) = match result {
            Ok(()) => (AuthOutcome::Authenticated, None),
            Err(err) => (AuthOutcome::from_error(&err), Some(err)),
        };
        Self {
            username: username.to_string(),
            outcome,
            detail,
            elapsed,
        }
    }

    /// Username the attempt was made for.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Classified outcome.
    #[must_use]
    pub const fn outcome(&self) -> AuthOutcome {
        self.outcome
    }

    /// True only when the directory accepted the credentials.
    #[must_use]
    pub const fn authenticated(&self) -> bool {
        matches!(self.outcome, AuthOutcome::Authenticated)
    }

    /// Underlying error for every non-authenticated outcome.
    #[must_use]
    pub const fn detail(&self) -> Option<&Error> {
        self.detail.as_ref()
    }

    /// Wall-clock time spent on the attempt.
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Splits the result into the `(authenticated, error)` pair callers report on.
    #[must_use]
    pub fn into_parts(self) -> (bool, Option<Error>) {
        (self.authenticated(), self.detail)
    }
}

impl fmt::Display for AuthResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            None => write!(f, "{} auth succeeded", self.username),
            Some(err) => write!(f, "{} auth failed: {err}", self.username),
        }
    }
}
