//! Password login against the configured credentials.

use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::Config;

// ---

/// Lowercase hex SHA-256 of `password`.
pub fn hash_password(password: &str) -> String {
    format!("{:x}", Sha256::digest(password.as_bytes()))
}

/// Check a login attempt. Failures are never fatal; the user retries.
pub fn verify_login(cfg: &Config, username: &str, password: &str) -> Result<(), AppError> {
    // ---
    let hashed = hash_password(password);

    // Compare the full digests so the check does not stop at the first byte.
    let digest_ok = hashed
        .bytes()
        .zip(cfg.dashboard_password_sha256.bytes())
        .fold(hashed.len() == cfg.dashboard_password_sha256.len(), |ok, (a, b)| {
            ok & (a == b)
        });

    if username == cfg.dashboard_user && digest_ok {
        tracing::info!("Login succeeded for {}", username);
        Ok(())
    } else {
        tracing::warn!("Login failed for {:?}", username);
        Err(AppError::InvalidCredentials)
    }
}
