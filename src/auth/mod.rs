//! Authentication: the login use case and the per-request gate.

pub mod gate;
pub mod mfa;
pub mod verifier;

pub use gate::{Principal, Whitelist, default_whitelist, gate};
pub use mfa::{MfaValidator, TotpValidator};
pub use verifier::{AuthError, IssuedTokens, Verifier};
