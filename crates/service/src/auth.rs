//! Rebuild Trigger Authorization
//!
//! `/rebuild` accepts either a bearer token or a webhook signature: the
//! lowercase hex HMAC-SHA256 of the raw request body, keyed with the webhook
//! signing key, sent in `x-alchemy-signature`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the webhook body signature
pub const SIGNATURE_HEADER: &str = "x-alchemy-signature";

/// Credentials accepted on `/rebuild`. Open when neither is configured.
#[derive(Clone, Default)]
pub struct RebuildAuth {
    token: Option<String>,
    signing_key: Option<String>,
}

impl RebuildAuth {
    #[must_use]
    pub fn new(token: Option<String>, signing_key: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()),
            signing_key: signing_key.filter(|k| !k.is_empty()),
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.token.is_none() && self.signing_key.is_none()
    }

    /// Whether a request carrying these credentials may trigger a rebuild.
    #[must_use]
    pub fn authorize(&self, bearer: Option<&str>, signature: Option<&str>, body: &[u8]) -> bool {
        if self.is_open() {
            return true;
        }

        let bearer_ok = match (&self.token, bearer) {
            (Some(expected), Some(presented)) => token_matches(expected, presented),
            _ => false,
        };

        bearer_ok
            || match (&self.signing_key, signature) {
                (Some(key), Some(signature)) => signature_matches(key, body, signature),
                _ => false,
            }
    }
}

impl std::fmt::Debug for RebuildAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RebuildAuth")
            .field("token", &self.token.is_some())
            .field("signing_key", &self.signing_key.is_some())
            .finish()
    }
}

fn keyed(key: &[u8]) -> Option<HmacSha256> {
    HmacSha256::new_from_slice(key).ok()
}

/// Constant-time token comparison: both sides are MACed under the expected
/// token and the tags compared with `verify_slice`.
fn token_matches(expected: &str, presented: &str) -> bool {
    let (Some(mut reference), Some(mut candidate)) =
        (keyed(expected.as_bytes()), keyed(expected.as_bytes()))
    else {
        return false;
    };
    reference.update(expected.as_bytes());
    candidate.update(presented.as_bytes());

    candidate
        .verify_slice(&reference.finalize().into_bytes())
        .is_ok()
}

fn signature_matches(key: &str, body: &[u8], signature: &str) -> bool {
    let Ok(tag) = hex::decode(signature.trim()) else {
        return false;
    };
    let Some(mut mac) = keyed(key.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&tag).is_ok()
}

/// Hex signature of `body` under `key`, as a webhook sender computes it.
#[cfg(test)]
pub(crate) fn sign(key: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
