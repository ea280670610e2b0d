//! CLI command implementations

pub mod batch;
pub mod check;
pub mod probe;

use ldaptest_auth::{AuthChecker, AuthResult, CancellationToken};
use ldaptest_core::DirectoryConfig;
use std::sync::Arc;

/// Context passed to all commands
pub struct CommandContext {
    pub checker: AuthChecker,
    pub config: Arc<DirectoryConfig>,
    pub cancel: CancellationToken,
}

/// Prints the human-readable line for one verification result.
pub fn report(result: &AuthResult) {
    println!("{result}");
}
