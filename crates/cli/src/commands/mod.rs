//! Command implementations.
//!
//! Every command opens a [`Cart`] first. With a session token configured the
//! session is resolved before the command runs, which merges any guest cart
//! left on disk into the signed-in cart.

pub mod cart;
pub mod session;

use thiserror::Error;

use cartsync::{
    CartError, CartFacade, CartSyncConfig, ConfigError, JsonFileStore, RestCartClient,
};

/// The facade as wired for the terminal: HTTP backend, JSON file guest store.
pub type Cart = CartFacade<RestCartClient, JsonFileStore>;

/// Errors that end a command.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error("Failed to render output: {0}")]
    Output(#[from] serde_json::Error),

    /// Cleanup left lines in the cart that should have been removed.
    #[error("{0} invalid line(s) could not be removed")]
    CleanupIncomplete(usize),
}

/// Build the facade from configuration and resolve the session if one is configured.
pub async fn open(config: &CartSyncConfig) -> Result<Cart, CliError> {
    let client = RestCartClient::new(&config.api)?;
    let store = JsonFileStore::new(&config.guest_cart_path);
    let mut cart = CartFacade::new(client, store, config.api.request_timeout);

    if config.api.has_session() {
        let state = cart.sync_session().await?;
        tracing::debug!(authenticated = state.is_authenticated(), "Session resolved");
    }
    Ok(cart)
}
