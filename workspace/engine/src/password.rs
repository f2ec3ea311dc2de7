//! Werkzeug compatible password hashes: `pbkdf2:sha256:<iterations>$<salt>$<hash>`.

use base64::{
    Engine,
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD},
};
use hmac::Hmac;
use pbkdf2::pbkdf2;
use rand::Rng;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{DeskError, Result};

type HmacSha256 = Hmac<Sha256>;

const ITERATIONS: u32 = 260_000;
const KEY_LENGTH: usize = 32;
const SALT_LENGTH: usize = 16;

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String> {
    hash_with_iterations(password, ITERATIONS)
}

pub(crate) fn hash_with_iterations(password: &str, iterations: u32) -> Result<String> {
    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill(&mut salt);

    let mut key = [0u8; KEY_LENGTH];
    pbkdf2::<HmacSha256>(password.as_bytes(), &salt, iterations, &mut key)
        .map_err(|e| DeskError::Credential(format!("PBKDF2 failed: {e}")))?;

    Ok(format!(
        "pbkdf2:sha256:{}${}${}",
        iterations,
        URL_SAFE_NO_PAD.encode(salt),
        URL_SAFE_NO_PAD.encode(key)
    ))
}

/// Check a password against a stored hash. A hash that cannot be parsed is a
/// [`DeskError::Credential`], a mismatch is `Ok(false)`.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool> {
    let mut parts = stored_hash.splitn(3, '$');
    let (Some(header), Some(salt_str), Some(hash_str)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(DeskError::Credential("invalid hash format".to_string()));
    };

    let iterations = match header.split(':').collect::<Vec<_>>().as_slice() {
        ["pbkdf2", "sha256", iterations] => iterations
            .parse::<u32>()
            .map_err(|_| DeskError::Credential("invalid iteration count".to_string()))?,
        _ => return Err(DeskError::Credential("unsupported hash method".to_string())),
    };

    // Werkzeug itself writes the salt verbatim and the hash as hex.
    let (salt, expected) = if is_hex_digest(hash_str) {
        let expected = hex::decode(hash_str)
            .map_err(|_| DeskError::Credential("undecodable hash".to_string()))?;
        (salt_str.as_bytes().to_vec(), expected)
    } else {
        (decode_flexible(salt_str)?, decode_flexible(hash_str)?)
    };
    if expected.is_empty() {
        return Err(DeskError::Credential("empty hash".to_string()));
    }

    let mut computed = vec![0u8; expected.len()];
    pbkdf2::<HmacSha256>(password.as_bytes(), &salt, iterations, &mut computed)
        .map_err(|e| DeskError::Credential(format!("PBKDF2 failed: {e}")))?;

    Ok(computed.ct_eq(&expected).into())
}

fn is_hex_digest(input: &str) -> bool {
    input.len() == KEY_LENGTH * 2 && input.chars().all(|c| c.is_ascii_hexdigit())
}

/// Base64 in either alphabet, with or without padding, falling back to hex.
fn decode_flexible(input: &str) -> Result<Vec<u8>> {
    let padded = add_base64_padding(input);
    STANDARD
        .decode(&padded)
        .or_else(|_| URL_SAFE.decode(&padded))
        .or_else(|_| URL_SAFE_NO_PAD.decode(input))
        .or_else(|_| STANDARD_NO_PAD.decode(input))
        .or_else(|_| hex::decode(input))
        .map_err(|_| DeskError::Credential("undecodable salt or hash".to_string()))
}

fn add_base64_padding(input: &str) -> String {
    let padding_needed = (4 - (input.len() % 4)) % 4;
    format!("{}{}", input, "=".repeat(padding_needed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_with_iterations("s3cret!", 1_000).unwrap();
        assert!(hash.starts_with("pbkdf2:sha256:1000$"));
        assert!(verify_password("s3cret!", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn test_salts_differ_between_hashes() {
        let a = hash_with_iterations("same", 1_000).unwrap();
        let b = hash_with_iterations("same", 1_000).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_werkzeug_native_hash() {
        let salt = "Xq3LmPz9TbR2vWk8";
        let mut key = [0u8; KEY_LENGTH];
        pbkdf2::<HmacSha256>(b"hunter22", salt.as_bytes(), 1_000, &mut key).unwrap();
        let stored = format!("pbkdf2:sha256:1000${}${}", salt, hex::encode(key));

        assert!(verify_password("hunter22", &stored).unwrap());
        assert!(!verify_password("hunter23", &stored).unwrap());
    }

    #[test]
    fn test_verify_padded_standard_base64_hash() {
        let salt = [7u8; SALT_LENGTH];
        let mut key = [0u8; KEY_LENGTH];
        pbkdf2::<HmacSha256>(b"legacy", &salt, 1_000, &mut key).unwrap();
        let stored = format!(
            "pbkdf2:sha256:1000${}${}",
            STANDARD.encode(salt),
            STANDARD.encode(key)
        );

        assert!(verify_password("legacy", &stored).unwrap());
    }

    #[test]
    fn test_malformed_hash_is_an_error() {
        assert!(verify_password("x", "not-a-hash").is_err());
        assert!(verify_password("x", "scrypt:32768:8:1$abc$def").is_err());
        assert!(verify_password("x", "pbkdf2:sha256:many$abc$def").is_err());
    }
}
