pub mod logging;
pub mod store;

use clap::{
    Arg, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

pub const ARG_PORT: &str = "port";
pub const ARG_TOKEN_SECRET: &str = "token-secret";
pub const ARG_TOKEN_TTL: &str = "token-ttl";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!(
            "{} - {}",
            env!("CARGO_PKG_VERSION"),
            crate::api::GIT_COMMIT_HASH
        )
        .into_boxed_str(),
    );

    let command = Command::new("kunci")
        .about("Credential and identity gate")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("KUNCI_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_TOKEN_SECRET)
                .long(ARG_TOKEN_SECRET)
                .help("HMAC secret used to sign and verify access tokens")
                .env("KUNCI_TOKEN_SECRET")
                .required(true),
        )
        .arg(
            Arg::new(ARG_TOKEN_TTL)
                .long(ARG_TOKEN_TTL)
                .help("Access token lifetime in seconds")
                .default_value("3600")
                .env("KUNCI_TOKEN_TTL")
                .value_parser(clap::value_parser!(u64).range(1..)),
        );

    let command = store::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "kunci");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some("Credential and identity gate".to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_check_port_and_secret() {
        let command = new();
        let matches = command.get_matches_from(vec![
            "kunci",
            "--port",
            "8080",
            "--token-secret",
            "sekret",
            "--store",
            "redis",
            "--redis-url",
            "redis://localhost:6379",
        ]);

        assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(8080));
        assert_eq!(
            matches.get_one::<String>(ARG_TOKEN_SECRET).cloned(),
            Some("sekret".to_string())
        );
        assert_eq!(
            matches.get_one::<String>(store::ARG_REDIS_URL).cloned(),
            Some("redis://localhost:6379".to_string())
        );
        assert_eq!(matches.get_one::<u64>(ARG_TOKEN_TTL).copied(), Some(3600));
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("KUNCI_PORT", Some("443")),
                ("KUNCI_TOKEN_SECRET", Some("sekret")),
                ("KUNCI_TOKEN_TTL", Some("120")),
                ("KUNCI_STORE", Some("mongo")),
                ("KUNCI_MONGO_URI", Some("mongodb://localhost:27017")),
                ("KUNCI_MONGO_DATABASE", Some("users")),
                ("KUNCI_LOG_LEVEL", Some("info")),
            ],
            || {
                let command = new();
                let matches = command.get_matches_from(vec!["kunci"]);
                assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(443));
                assert_eq!(matches.get_one::<u64>(ARG_TOKEN_TTL).copied(), Some(120));
                assert_eq!(
                    matches.get_one::<String>(store::ARG_MONGO_URI).cloned(),
                    Some("mongodb://localhost:27017".to_string())
                );
                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    Some(2)
                );
            },
        );
    }

    #[test]
    fn test_check_log_level_env() {
        // loop cover all possible value_parse
        let levels = ["error", "warn", "info", "debug", "trace"];
        for (index, &level) in levels.iter().enumerate() {
            temp_env::with_vars(
                [
                    ("KUNCI_LOG_LEVEL", Some(level)),
                    ("KUNCI_TOKEN_SECRET", Some("sekret")),
                ],
                || {
                    let command = new();
                    let matches = command.get_matches_from(vec!["kunci"]);
                    assert_eq!(
                        matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                        u8::try_from(index).ok()
                    );
                },
            );
        }
    }

    #[test]
    fn test_check_log_level_verbosity() {
        // loop cover all possible value_parse
        let levels = ["error", "warn", "info", "debug", "trace"];
        for (index, _) in levels.iter().enumerate() {
            temp_env::with_vars([("KUNCI_LOG_LEVEL", None::<String>)], || {
                let mut args = vec![
                    "kunci".to_string(),
                    "--token-secret".to_string(),
                    "sekret".to_string(),
                ];

                // Add the appropriate number of "-v" flags based on the index
                if index > 0 {
                    let v = format!("-{}", "v".repeat(index));
                    args.push(v);
                }

                let command = new();

                let matches = command.get_matches_from(args);

                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    u8::try_from(index).ok()
                );
            });
        }
    }

    #[test]
    fn test_missing_secret_fails() {
        temp_env::with_vars([("KUNCI_TOKEN_SECRET", None::<&str>)], || {
            let command = new();
            let result = command.try_get_matches_from(vec!["kunci"]);
            assert_eq!(
                result.map_err(|e| e.kind()),
                Err(clap::error::ErrorKind::MissingRequiredArgument)
            );
        });
    }

    #[test]
    fn test_store_requires_backend_args() {
        temp_env::with_vars(
            [
                ("KUNCI_MONGO_URI", None::<&str>),
                ("KUNCI_PROVIDER_URL", None::<&str>),
                ("KUNCI_PROVIDER_API_KEY", None::<&str>),
                ("KUNCI_REDIS_URL", None::<&str>),
            ],
            || {
                // mongo without --mongo-uri
                let result = new().try_get_matches_from(vec![
                    "kunci",
                    "--token-secret",
                    "sekret",
                    "--store",
                    "mongo",
                ]);
                assert_eq!(
                    result.map_err(|e| e.kind()),
                    Err(clap::error::ErrorKind::MissingRequiredArgument)
                );

                // provider without --provider-url
                let result = new().try_get_matches_from(vec![
                    "kunci",
                    "--token-secret",
                    "sekret",
                    "--store",
                    "provider",
                ]);
                assert_eq!(
                    result.map_err(|e| e.kind()),
                    Err(clap::error::ErrorKind::MissingRequiredArgument)
                );

                // redis without --redis-url
                let result = new().try_get_matches_from(vec![
                    "kunci",
                    "--token-secret",
                    "sekret",
                    "--store",
                    "redis",
                ]);
                assert_eq!(
                    result.map_err(|e| e.kind()),
                    Err(clap::error::ErrorKind::MissingRequiredArgument)
                );
            },
        );
    }

    #[test]
    fn test_invalid_store_rejected() {
        let result = new().try_get_matches_from(vec![
            "kunci",
            "--token-secret",
            "sekret",
            "--store",
            "postgres",
        ]);
        assert_eq!(
            result.map_err(|e| e.kind()),
            Err(clap::error::ErrorKind::InvalidValue)
        );
    }
}
