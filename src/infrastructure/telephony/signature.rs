//! Carrier webhook signature validation (`X-Twilio-Signature`)
//!
//! signature = base64(HMAC-SHA1(auth_token, url + sorted(key + value)...))

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

pub const SIGNATURE_HEADER: &str = "x-twilio-signature";

#[derive(Clone)]
pub struct SignatureValidator {
    auth_token: String,
}

impl SignatureValidator {
    pub fn new(auth_token: impl Into<String>) -> Self {
        Self {
            auth_token: auth_token.into(),
        }
    }

    fn mac(&self, url: &str, params: &[(String, String)]) -> Option<HmacSha1> {
        let mut sorted: Vec<&(String, String)> = params.iter().collect();
        sorted.sort();

        let mut mac = HmacSha1::new_from_slice(self.auth_token.as_bytes()).ok()?;
        mac.update(url.as_bytes());
        for (key, value) in sorted {
            mac.update(key.as_bytes());
            mac.update(value.as_bytes());
        }
        Some(mac)
    }

    pub fn sign(&self, url: &str, params: &[(String, String)]) -> String {
        self.mac(url, params)
            .map(|mac| STANDARD.encode(mac.finalize().into_bytes()))
            .unwrap_or_default()
    }

    /// Constant-time check of a received signature
    pub fn verify(&self, url: &str, params: &[(String, String)], signature: &str) -> bool {
        let Ok(expected) = STANDARD.decode(signature.trim()) else {
            return false;
        };
        self.mac(url, params)
            .is_some_and(|mac| mac.verify_slice(&expected).is_ok())
    }
}
