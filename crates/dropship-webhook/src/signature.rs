//! Webhook signature handling
//!
//! Provides HMAC-SHA256 signature generation and verification. The signature
//! covers the raw request body and is sent hex-encoded in
//! `X-Webhook-Signature`.

use crate::{Result, WebhookError};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex signature
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Compute the hex HMAC-SHA256 of `payload` keyed by `secret`
pub fn sign(secret: &[u8], payload: &[u8]) -> String {
    WebhookSigner::from_bytes(secret).sign(payload)
}

/// Webhook signer for generating signatures
#[derive(Clone)]
pub struct WebhookSigner {
    secret: Vec<u8>,
}

impl WebhookSigner {
    /// Create a new signer with a secret
    pub fn new(secret: &str) -> Self {
        Self::from_bytes(secret.as_bytes())
    }

    pub fn from_bytes(secret: &[u8]) -> Self {
        Self {
            secret: secret.to_vec(),
        }
    }

    /// Generate the hex signature for a payload
    pub fn sign(&self, payload: &[u8]) -> String {
        hex::encode(compute_mac(&self.secret, payload))
    }
}

impl std::fmt::Debug for WebhookSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSigner").finish_non_exhaustive()
    }
}

/// Webhook verifier for validating signatures on the receiving side
pub struct WebhookVerifier {
    secret: Vec<u8>,
}

impl WebhookVerifier {
    /// Create a new verifier with a secret
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    /// Verify a hex signature against the raw body
    pub fn verify(&self, payload: &[u8], signature: &str) -> Result<()> {
        let provided = hex::decode(signature.trim()).map_err(|_| {
            WebhookError::InvalidRequest("Signature is not valid hex".to_string())
        })?;

        let mut mac = new_mac(&self.secret);
        mac.update(payload);
        // verify_slice compares in constant time
        mac.verify_slice(&provided)
            .map_err(|_| WebhookError::InvalidRequest("Signature mismatch".to_string()))
    }
}

fn new_mac(secret: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(secret).expect("HMAC can accept any key length")
}

fn compute_mac(secret: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = new_mac(secret);
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Generate a secure random webhook secret
pub fn generate_webhook_secret() -> String {
    use rand::Rng;
    let secret: [u8; 32] = rand::thread_rng().gen();
    format!("whsec_{}", hex::encode(secret))
}
