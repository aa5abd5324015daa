//! Map validated CLI arguments to the action to run.

use crate::cli::{actions::Action, commands, globals::GlobalArgs};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches
        .get_one::<u16>(commands::ARG_PORT)
        .copied()
        .unwrap_or(8080);

    let token_secret = matches
        .get_one::<String>(commands::ARG_TOKEN_SECRET)
        .cloned()
        .context("missing required argument: --token-secret")?;

    let token_ttl_seconds = matches
        .get_one::<u64>(commands::ARG_TOKEN_TTL)
        .copied()
        .unwrap_or(3600);

    let store = commands::store::parse(matches)?;

    Ok(Action::Server {
        port,
        store,
        globals: GlobalArgs::new(SecretString::from(token_secret), token_ttl_seconds),
    })
}
