//! Request signing for the Houndify API.
//!
//! The service authenticates each request with an HMAC-SHA256 signature
//! over a token of the form `{user_id};{request_id}{timestamp}`. The
//! client key is URL-safe base64; signatures are emitted in the same
//! alphabet with padding kept, matching what the service expects.

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

pub const HOUND_REQUEST_AUTH: &str = "Hound-Request-Authentication";
pub const HOUND_CLIENT_AUTH: &str = "Hound-Client-Authentication";
pub const HOUND_REQUEST_INFO: &str = "Hound-Request-Info";
pub const HOUND_REQUEST_INFO_LENGTH: &str = "Hound-Request-Info-Length";

/// Identity of a single request: who is asking plus a fresh request id
/// and timestamp. The same values must appear in the auth headers and
/// in the signed token or the service rejects the request.
#[derive(Debug, Clone)]
pub struct RequestAuth {
    pub user_id: String,
    pub request_id: String,
    pub timestamp: i64,
}

impl RequestAuth {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            request_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now().timestamp(),
        }
    }

    /// The string the signature is computed over.
    pub fn token(&self) -> String {
        format!("{};{}{}", self.user_id, self.request_id, self.timestamp)
    }

    pub fn request_header(&self) -> String {
        format!("{};{}", self.user_id, self.request_id)
    }

    pub fn client_header(&self, client_id: &str, signature: &str) -> String {
        format!("{client_id};{};{signature}", self.timestamp)
    }
}

/// Sign a token with the secret client key.
///
/// This is the only place the key is ever used, and the key itself
/// never appears in the output: callers get back a signature string
/// that is safe to hand to the browser.
pub fn sign_token(client_key: &str, token: &str) -> Result<String> {
    let key = decode_client_key(client_key)?;
    let mut mac = HmacSha256::new_from_slice(&key)
        .map_err(|err| Error::Config(format!("client key rejected by HMAC: {err}")))?;
    mac.update(token.as_bytes());
    Ok(URL_SAFE.encode(mac.finalize().into_bytes()))
}

/// Build the pair of auth headers the service expects on a signed
/// request, using a fresh request id and the current time.
pub fn client_auth_headers(
    client_id: &str,
    client_key: &str,
    user_id: &str,
) -> Result<[(&'static str, String); 2]> {
    let auth = RequestAuth::new(user_id);
    let signature = sign_token(client_key, &auth.token())?;
    Ok([
        (HOUND_REQUEST_AUTH, auth.request_header()),
        (HOUND_CLIENT_AUTH, auth.client_header(client_id, &signature)),
    ])
}

// Keys are issued in the URL-safe alphabet, sometimes with padding and
// sometimes without. Strip any padding before decoding so both forms work.
fn decode_client_key(client_key: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(client_key.trim().trim_end_matches('='))
        .map_err(|err| Error::Config(format!("client key is not valid base64: {err}")))
}
