use crate::{
    api::{self, AppContext},
    auth::{TotpValidator, Verifier, default_whitelist},
    cli::actions::Action,
    store,
    token::TokenManager,
};
use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

/// Handle the server action
///
/// # Errors
/// Returns an error if the store cannot be connected or the server fails
/// to start.
pub async fn handle(action: Action) -> Result<()> {
    let Action::Server {
        port,
        store,
        globals,
    } = action;

    debug!("Global args: {:?}", globals);

    let store = store::connect(store).await?;

    let tokens = Arc::new(TokenManager::new(
        globals.token_secret.clone(),
        globals.token_ttl_seconds,
    ));

    let verifier = Verifier::new(
        Arc::clone(&store),
        Arc::clone(&tokens),
        Arc::new(TotpValidator),
    );

    let context = Arc::new(AppContext {
        store,
        tokens,
        verifier,
        whitelist: default_whitelist(),
    });

    api::new(port, context).await?;

    Ok(())
}
