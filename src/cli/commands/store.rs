use crate::store::StoreConfig;
use anyhow::{Context, Result};
use clap::{Arg, Command, builder::PossibleValuesParser};
use secrecy::SecretString;

pub const ARG_STORE: &str = "store";
pub const ARG_MONGO_URI: &str = "mongo-uri";
pub const ARG_MONGO_DATABASE: &str = "mongo-database";
pub const ARG_PROVIDER_URL: &str = "provider-url";
pub const ARG_PROVIDER_API_KEY: &str = "provider-api-key";
pub const ARG_REDIS_URL: &str = "redis-url";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_STORE)
                .short('s')
                .long(ARG_STORE)
                .help("Credential store backend")
                .env("KUNCI_STORE")
                .default_value("memory")
                .value_parser(PossibleValuesParser::new([
                    "mongo", "provider", "redis", "memory",
                ])),
        )
        .arg(
            Arg::new(ARG_MONGO_URI)
                .long(ARG_MONGO_URI)
                .help("MongoDB connection string (mongo backend)")
                .env("KUNCI_MONGO_URI")
                .required_if_eq(ARG_STORE, "mongo"),
        )
        .arg(
            Arg::new(ARG_MONGO_DATABASE)
                .long(ARG_MONGO_DATABASE)
                .help("MongoDB database name (mongo backend)")
                .env("KUNCI_MONGO_DATABASE")
                .default_value("kunci"),
        )
        .arg(
            Arg::new(ARG_PROVIDER_URL)
                .long(ARG_PROVIDER_URL)
                .help("Managed identity provider base URL (provider backend)")
                .env("KUNCI_PROVIDER_URL")
                .required_if_eq(ARG_STORE, "provider"),
        )
        .arg(
            Arg::new(ARG_PROVIDER_API_KEY)
                .long(ARG_PROVIDER_API_KEY)
                .help("Managed identity provider API key (provider backend)")
                .env("KUNCI_PROVIDER_API_KEY")
                .required_if_eq(ARG_STORE, "provider"),
        )
        .arg(
            Arg::new(ARG_REDIS_URL)
                .long(ARG_REDIS_URL)
                .help("Redis connection URL (redis backend)")
                .env("KUNCI_REDIS_URL")
                .required_if_eq(ARG_STORE, "redis"),
        )
}

/// Map store arguments to a backend configuration.
///
/// # Errors
/// Returns an error if a backend-specific argument is missing.
pub fn parse(matches: &clap::ArgMatches) -> Result<StoreConfig> {
    let backend = matches
        .get_one::<String>(ARG_STORE)
        .cloned()
        .unwrap_or_else(|| "memory".to_string());

    match backend.as_str() {
        "mongo" => Ok(StoreConfig::Mongo {
            uri: matches
                .get_one::<String>(ARG_MONGO_URI)
                .cloned()
                .context("missing required argument: --mongo-uri")?,
            database: matches
                .get_one::<String>(ARG_MONGO_DATABASE)
                .cloned()
                .context("missing required argument: --mongo-database")?,
        }),
        "provider" => Ok(StoreConfig::Provider {
            url: matches
                .get_one::<String>(ARG_PROVIDER_URL)
                .cloned()
                .context("missing required argument: --provider-url")?,
            api_key: SecretString::from(
                matches
                    .get_one::<String>(ARG_PROVIDER_API_KEY)
                    .cloned()
                    .context("missing required argument: --provider-api-key")?,
            ),
        }),
        "redis" => Ok(StoreConfig::Redis {
            url: matches
                .get_one::<String>(ARG_REDIS_URL)
                .cloned()
                .context("missing required argument: --redis-url")?,
        }),
        _ => Ok(StoreConfig::Memory),
    }
}
