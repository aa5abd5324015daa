use secrecy::SecretString;

#[derive(Clone)]
pub struct GlobalArgs {
    pub token_secret: SecretString,
    pub token_ttl_seconds: u64,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(token_secret: SecretString, token_ttl_seconds: u64) -> Self {
        Self {
            token_secret,
            token_ttl_seconds,
        }
    }
}

impl std::fmt::Debug for GlobalArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalArgs")
            .field("token_secret", &"***")
            .field("token_ttl_seconds", &self.token_ttl_seconds)
            .finish()
    }
}
