//! Route handlers and shared request validation helpers.

pub mod authenticate;
pub mod health;
pub mod login;
pub mod profile;
pub mod users;

use regex::Regex;

const MIN_PASSWORD_LENGTH: usize = 8;

/// Lightweight email sanity check used before persisting data.
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

/// Cleartext password policy applied at signup.
pub fn valid_password(password: &str) -> bool {
    password.len() >= MIN_PASSWORD_LENGTH
}
