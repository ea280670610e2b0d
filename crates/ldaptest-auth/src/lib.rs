//! Bind-based credential verification against an LDAP directory.
//!
//! [`AuthChecker`] resolves the bind DN for a username, opens a transient connection to the
//! directory described by a [`DirectoryConfig`](ldaptest_core::DirectoryConfig), attempts a
//! simple bind and classifies the result as an [`AuthOutcome`].

#![deny(missing_docs)]

mod checker;
mod connector;
mod outcome;

pub use checker::AuthChecker;
pub use connector::{Ldap3Connector, LdapConnector, LdapSession};
pub use outcome::{AuthOutcome, AuthResult};

pub use tokio_util::sync::CancellationToken;

/// Convenient result alias that reuses the core error type.
pub type Result<T> = ldaptest_core::Result<T>;
