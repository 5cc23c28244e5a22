//! MySQL authentication plugins.
//!
//! Two plugins are implemented:
//! - `mysql_native_password`: SHA1-based scramble
//! - `mysql_clear_password`: the password as-is
//!
//! # mysql_native_password
//!
//! ```text
//! SHA1(password) XOR SHA1(scramble + SHA1(SHA1(password)))
//! ```

use sha1::{Digest, Sha1};

use sqlwire_core::Result;
use sqlwire_core::error::UnsupportedFeature;

use crate::protocol::unsupported;

/// Well-known authentication plugin names.
pub mod plugins {
    /// SHA1-based authentication
    pub const MYSQL_NATIVE_PASSWORD: &str = "mysql_native_password";
    /// Password sent in clear text
    pub const MYSQL_CLEAR_PASSWORD: &str = "mysql_clear_password";
}

/// An authentication plugin this client can answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPlugin {
    NativePassword,
    ClearPassword,
}

impl AuthPlugin {
    /// Look up a plugin by the name the server announced.
    ///
    /// Any plugin other than native or clear password is fatal for the
    /// connection attempt.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            plugins::MYSQL_NATIVE_PASSWORD => Ok(AuthPlugin::NativePassword),
            plugins::MYSQL_CLEAR_PASSWORD => Ok(AuthPlugin::ClearPassword),
            other => Err(unsupported(
                UnsupportedFeature::AuthPlugin,
                format!("authentication plugin '{other}' is not supported"),
            )),
        }
    }

    /// Plugin name as sent on the wire.
    pub const fn name(self) -> &'static str {
        match self {
            AuthPlugin::NativePassword => plugins::MYSQL_NATIVE_PASSWORD,
            AuthPlugin::ClearPassword => plugins::MYSQL_CLEAR_PASSWORD,
        }
    }

    /// Compute the auth token for `password` against the server scramble.
    pub fn token(self, password: &str, scramble: &[u8]) -> Vec<u8> {
        match self {
            AuthPlugin::NativePassword => mysql_native_password(password, scramble),
            AuthPlugin::ClearPassword => password.as_bytes().to_vec(),
        }
    }
}

/// Compute the mysql_native_password token.
///
/// Returns an empty token for an empty password; the server treats that as
/// "no password".
pub fn mysql_native_password(password: &str, scramble: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return vec![];
    }

    // Stage 1: SHA1(password)
    let stage1: [u8; 20] = Sha1::digest(password.as_bytes()).into();

    // Stage 2: SHA1(SHA1(password))
    let stage2: [u8; 20] = Sha1::digest(stage1).into();

    // Stage 3: SHA1(scramble + stage2)
    let mut hasher = Sha1::new();
    hasher.update(scramble);
    hasher.update(stage2);
    let stage3: [u8; 20] = hasher.finalize().into();

    stage1
        .iter()
        .zip(stage3.iter())
        .map(|(a, b)| a ^ b)
        .collect()
}
