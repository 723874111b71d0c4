//! Session commands: status and merge-on-login.

use cartsync::{AuthState, CartSyncConfig, MergeReport};

use super::cart::print_snapshot;
use super::{Cart, CliError};

#[allow(clippy::print_stdout)]
pub fn status(cart: &Cart, json: bool) -> Result<(), CliError> {
    let state = cart.auth_state();
    if json {
        println!("{}", serde_json::to_string_pretty(state)?);
        return Ok(());
    }

    match state {
        AuthState::Guest => println!("Guest ({} items in guest cart)", cart.item_count()),
        AuthState::Authenticated { user } => {
            let who = user.email.as_deref().unwrap_or_else(|| user.id.as_str());
            println!("Signed in as {who} ({} items in cart)", cart.item_count());
        }
    }
    Ok(())
}

/// Report the merge that ran when the session was resolved, retrying failed
/// lines up to `retries` more times.
pub async fn sync(
    cart: &mut Cart,
    config: &CartSyncConfig,
    retries: u32,
    json: bool,
) -> Result<(), CliError> {
    if !config.api.has_session() {
        tracing::warn!("CARTSYNC_SESSION_TOKEN is not set; the guest cart stays on this device");
        return print_snapshot(&cart.snapshot(), json);
    }
    if !cart.auth_state().is_authenticated() {
        tracing::warn!("The backend did not accept the session token; guest cart kept");
        return print_snapshot(&cart.snapshot(), json);
    }

    match cart.last_merge() {
        Some(report) => log_merge(report),
        None => tracing::info!("No guest cart to merge"),
    }

    for attempt in 1..=retries {
        let Some(report) = cart.retry_merge().await? else {
            break;
        };
        tracing::info!(attempt, "Retried failed guest lines");
        log_merge(&report);
    }

    if let Some(report) = cart.last_merge().filter(|report| !report.is_complete()) {
        for line in report.failed_lines() {
            tracing::warn!(
                product_id = %line.product_id,
                quantity = line.quantity,
                "Guest line was not merged"
            );
        }
        for line in report.unconfirmed_lines() {
            tracing::warn!(
                product_id = %line.product_id,
                quantity = line.quantity,
                "Guest line may not have merged, check the cart below before adding it again"
            );
        }
    }
    print_snapshot(&cart.snapshot(), json)
}

fn log_merge(report: &MergeReport) {
    tracing::info!(
        merged = report.merged(),
        failed = report.failed(),
        unconfirmed = report.unconfirmed(),
        "Guest cart merge finished"
    );
}
