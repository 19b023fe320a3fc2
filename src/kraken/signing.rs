//! Request signing for Kraken private endpoints.
//!
//! API-Sign = base64(HMAC-SHA512(base64decode(secret), path + SHA256(nonce + body)))
//! where body is the url-encoded form that is then posted byte-identical.

use crate::error::{Result, SyncError};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};

type HmacSha512 = Hmac<Sha512>;

/// Url-encode form fields in the given order. The same string must be
/// signed and posted, so encoding happens exactly once, here.
pub fn encode_form(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Compute the API-Sign header value for a private call.
pub fn sign_request(path: &str, nonce: &str, body: &str, api_secret: &str) -> Result<String> {
    let secret_bytes = BASE64
        .decode(api_secret)
        .map_err(|e| SyncError::Authentication(format!("API secret is not valid base64: {}", e)))?;

    let sha = Sha256::digest(format!("{}{}", nonce, body).as_bytes());

    let mut mac = HmacSha512::new_from_slice(&secret_bytes)
        .map_err(|e| SyncError::Authentication(format!("HMAC key error: {}", e)))?;
    mac.update(path.as_bytes());
    mac.update(&sha);

    Ok(BASE64.encode(mac.finalize().into_bytes()))
}
