//! check command - verify a single credential pair

use super::{report, CommandContext};
use secrecy::{ExposeSecret, SecretString};

pub async fn execute(ctx: &CommandContext, username: &str, password: &SecretString) -> bool {
    let result = ctx
        .checker
        .verify_with_cancel(&ctx.config, username, password.expose_secret(), &ctx.cancel)
        .await;
    report(&result);
    result.authenticated()
}
