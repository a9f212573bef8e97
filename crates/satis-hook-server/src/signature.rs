//! Request body authentication
//!
//! GitHub signs the raw body with HMAC-SHA1 keyed by the webhook secret and
//! sends `sha1=<hex>` in `X-Hub-Signature`.

use axum::body::Body;
use futures::StreamExt;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::error::{Result, WebhookError};

type HmacSha1 = Hmac<Sha1>;

/// Prefix of the signature header value
pub const SIGNATURE_PREFIX: &str = "sha1=";

/// A fully read request body and, when a secret is configured, its HMAC
pub struct SignedBody {
    pub bytes: Vec<u8>,
    mac: Option<HmacSha1>,
}

impl SignedBody {
    /// Read `body` to the end, feeding every chunk to the HMAC as it arrives.
    /// Fails once more than `limit` bytes have arrived.
    pub async fn read(body: Body, secret: Option<&str>, limit: usize) -> Result<Self> {
        let mut mac = secret
            .map(|secret| HmacSha1::new_from_slice(secret.as_bytes()))
            .transpose()
            .map_err(|e| WebhookError::Internal(format!("HMAC init failed: {e}")))?;

        let mut bytes = Vec::new();
        let mut stream = body.into_data_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| WebhookError::ReadBody(e.to_string()))?;
            if bytes.len() + chunk.len() > limit {
                return Err(WebhookError::PayloadTooLarge { limit });
            }
            if let Some(mac) = mac.as_mut() {
                mac.update(&chunk);
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(Self { bytes, mac })
    }

    /// Check the body against a `sha1=<hex>` header value.
    ///
    /// Always passes when no secret is configured. The hex digest must be
    /// lowercase, as GitHub sends it.
    pub fn verify(self, signature: Option<&str>) -> Result<Vec<u8>> {
        let Some(mac) = self.mac else {
            return Ok(self.bytes);
        };

        let digest = signature
            .and_then(|s| s.strip_prefix(SIGNATURE_PREFIX))
            .filter(|hex| !hex.bytes().any(|b| b.is_ascii_uppercase()))
            .and_then(|hex| hex::decode(hex).ok())
            .ok_or(WebhookError::SignatureMismatch)?;

        mac.verify_slice(&digest)
            .map_err(|_| WebhookError::SignatureMismatch)?;

        Ok(self.bytes)
    }
}

/// The header value GitHub would send for `body` signed with `secret`
pub fn sign(secret: &str, body: &[u8]) -> Result<String> {
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes())
        .map_err(|e| WebhookError::Internal(format!("HMAC init failed: {e}")))?;
    mac.update(body);
    Ok(format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes())))
}
