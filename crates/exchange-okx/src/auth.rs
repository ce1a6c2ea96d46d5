use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// OKX timestamp format: ISO-8601 with millisecond precision and a literal `Z`.
pub fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// `base64(hmac_sha256(secret, timestamp + method + request_path + body))`,
/// per OKX's v5 signing scheme.
pub fn sign_request(secret: &str, timestamp: &str, method: &str, request_path: &str, body: &str) -> String {
    let message = format!("{timestamp}{}{request_path}{body}", method.to_uppercase());
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(message.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}
