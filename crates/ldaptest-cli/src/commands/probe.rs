//! probe command - repeatedly verify one account

use super::{report, CommandContext};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::{info, warn};

pub struct ProbeOptions {
    pub interval: Duration,
    /// `None` probes until interrupted.
    pub count: Option<u64>,
}

/// Returns whether the last completed probe authenticated.
pub async fn execute(
    ctx: &CommandContext,
    username: &str,
    password: &SecretString,
    opts: &ProbeOptions,
) -> bool {
    let mut last = false;
    let mut attempts = 0u64;

    loop {
        let result = ctx
            .checker
            .verify_with_cancel(&ctx.config, username, password.expose_secret(), &ctx.cancel)
            .await;
        attempts += 1;
        report(&result);
        info!(
            attempt = attempts,
            outcome = %result.outcome(),
            elapsed_ms = u64::try_from(result.elapsed().as_millis()).unwrap_or(u64::MAX),
            "probe finished"
        );

        if ctx.cancel.is_cancelled() {
            warn!(attempts, "probe interrupted");
            break;
        }
        last = result.authenticated();

        if opts.count.is_some_and(|count| attempts >= count) {
            break;
        }

        tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => {
                warn!(attempts, "probe interrupted");
                break;
            }
            () = tokio::time::sleep(opts.interval) => {}
        }
    }

    last
}
