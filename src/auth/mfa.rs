//! Time-based one-time-password seam.
//!
//! The TOTP algorithm itself is external; this module only asks "does this
//! code match this secret right now". The trait exists so tests can inject
//! a deterministic validator.

use totp_rs::{Algorithm, Secret, TOTP};

pub trait MfaValidator: Send + Sync {
    fn validate(&self, code: &str, secret: &str) -> bool;
}

/// RFC 6238 validation over a base32-encoded shared secret.
#[derive(Debug, Default)]
pub struct TotpValidator;

impl MfaValidator for TotpValidator {
    fn validate(&self, code: &str, secret: &str) -> bool {
        let Ok(secret_bytes) = Secret::Encoded(secret.to_string()).to_bytes() else {
            return false;
        };
        let Ok(totp) = TOTP::new(Algorithm::SHA1, 6, 1, 30, secret_bytes) else {
            return false;
        };

        totp.check_current(code).unwrap_or(false)
    }
}
