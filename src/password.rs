//! Password Hasher — deterministic salted key derivation for credential
//! verification and user creation.
//!
//! Fixed parameters (must match the storage format exactly for
//! cross-version compatibility with existing credential databases):
//!   - KDF: PBKDF2-HMAC-SHA256
//!   - Iterations: 100_000
//!   - Derived key length: 32 bytes (64 hex chars)
//!   - Salt length: 16 bytes (32 hex chars)
//!   - Stored credential encoding: `hash_hex ‖ salt_hex` (salt suffix)

use rand::RngCore;
use sha2::Sha256;

const ITERATIONS: u32 = 100_000;
const SALT_LEN: usize = 16;
const DK_LEN: usize = 32;

/// Derive a PBKDF2-HMAC-SHA256 hash for `password` under `salt`, generating
/// a fresh random salt if none is given. Returns `(hash_hex, salt)`.
pub fn hash(password: &str, salt: Option<[u8; SALT_LEN]>) -> (String, [u8; SALT_LEN]) {
    let salt = salt.unwrap_or_else(generate_salt);
    let mut output = [0u8; DK_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, ITERATIONS, &mut output);
    (hex::encode(output), salt)
}

/// Build the 96-hex-char stored credential: `hash_hex ‖ salt_hex`.
pub fn stored_credential(password: &str, salt: Option<[u8; SALT_LEN]>) -> String {
    let (hash_hex, salt) = hash(password, salt);
    format!("{hash_hex}{}", hex::encode(salt))
}

fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Minimal hex encode/decode so we don't pull in the `hex` crate for two
/// one-line helpers — matches the teacher's own `format!("{:x}", ...)`
/// style for MD5 hex but generalized to arbitrary byte slices.
mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        let bytes = bytes.as_ref();
        let mut out = String::with_capacity(bytes.len() * 2);
        for b in bytes {
            out.push_str(&format!("{b:02x}"));
        }
        out
    }

    pub fn decode(s: &str) -> Option<Vec<u8>> {
        if s.len() % 2 != 0 {
            return None;
        }
        let mut out = Vec::with_capacity(s.len() / 2);
        let bytes = s.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            let hi = (bytes[i] as char).to_digit(16)?;
            let lo = (bytes[i + 1] as char).to_digit(16)?;
            out.push(((hi << 4) | lo) as u8);
            i += 2;
        }
        Some(out)
    }
}

pub use hex::decode as decode_hex;
