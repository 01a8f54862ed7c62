//! Authenticator — parses `Proxy-Authorization`, decodes Basic credentials,
//! and consults the credential store.
//!
//! Grounded on `examples/solidcitizen-multigres/src/auth.rs`'s
//! client-facing auth shape (a function that reads credentials and returns
//! allow/deny) and on
//! `examples/original_source/delpha_proxy/server.py`'s
//! `_verify_auth_header`/`_authenticate_user` for the exact parsing rules:
//! case-insensitive header search, `scheme credentials` split, base64
//! decode, split on first `:`.

use base64::Engine;

use crate::credentials::CredentialStore;
use crate::password;

#[derive(Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

/// Decide whether `raw_head` carries a valid `Proxy-Authorization: Basic`
/// header for a user known to `store`. When `auth_enabled` is false the
/// credential store is never consulted (spec §3 invariant).
pub async fn authorize(raw_head: &[u8], auth_enabled: bool, store: &CredentialStore) -> Decision {
    if !auth_enabled {
        return Decision::Allow;
    }

    let Some((username, password)) = extract_basic_credentials(raw_head) else {
        return Decision::Deny;
    };

    let Some(stored_credential) = store.lookup(&username).await else {
        return Decision::Deny;
    };

    if verify(&password, &stored_credential) {
        Decision::Allow
    } else {
        Decision::Deny
    }
}

/// Verify `password` against a 96-hex-char `stored_credential` (64-char
/// hash ‖ 32-char salt) using a constant-time comparison.
fn verify(password: &str, stored_credential: &str) -> bool {
    if stored_credential.len() != 96 {
        return false;
    }
    let (expected_hash_hex, salt_hex) = stored_credential.split_at(64);
    let Some(salt_bytes) = crate::password::decode_hex(salt_hex) else {
        return false;
    };
    let Ok(salt): Result<[u8; 16], _> = salt_bytes.try_into() else {
        return false;
    };
    let (computed_hash_hex, _) = password::hash(password, Some(salt));
    constant_time_eq(computed_hash_hex.as_bytes(), expected_hash_hex.as_bytes())
}

/// Constant-time comparison over equal-length ASCII strings. Spec §9 calls
/// this a mandatory hardening over the source's ordinary equality check, to
/// avoid a timing side-channel on password verification.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Find a `Proxy-Authorization: <scheme> <credentials>` header line
/// (case-insensitive header name and scheme), base64-decode the
/// credentials, and split on the first `:` into (username, password).
/// Any failure along this chain is absence, not an error.
fn extract_basic_credentials(raw_head: &[u8]) -> Option<(String, String)> {
    let head = std::str::from_utf8(raw_head).ok()?;

    let header_value = head.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case("Proxy-Authorization") {
            Some(value.trim())
        } else {
            None
        }
    })?;

    let (scheme, credentials) = header_value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(credentials.trim())
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}
