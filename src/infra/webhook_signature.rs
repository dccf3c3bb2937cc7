use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::webhook_verifier::WebhookSignatureVerifier,
};

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

fn compute_signature(secret: &str, timestamp: &str, body: &str) -> AppResult<String> {
    let signed_content = format!("{}.{}", timestamp, body);
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal("HMAC error".into()))?;
    mac.update(signed_content.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Build a provider-style `t=<unix>,v1=<hex>` header for `body`.
pub fn sign_webhook_payload(secret: &str, timestamp: i64, body: &str) -> AppResult<String> {
    let signature = compute_signature(secret, &timestamp.to_string(), body)?;
    Ok(format!("t={},v1={}", timestamp, signature))
}

/// HMAC-SHA256 verification of the payment provider's signature header.
pub struct HmacSignatureVerifier {
    secret: SecretString,
    tolerance_secs: i64,
}

impl HmacSignatureVerifier {
    pub fn new(secret: SecretString, tolerance_secs: i64) -> Self {
        Self {
            secret,
            tolerance_secs,
        }
    }

    fn verify_at(&self, payload: &str, signature_header: &str, now: i64) -> AppResult<()> {
        // Header: "t=timestamp,v1=signature[,v1=signature...]"
        let mut timestamp: Option<&str> = None;
        let mut signatures: Vec<&str> = Vec::new();

        for part in signature_header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => timestamp = Some(value),
                "v1" => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(AppError::BadSignature)?;
        if signatures.is_empty() {
            return Err(AppError::BadSignature);
        }

        let ts: i64 = timestamp.parse().map_err(|_| AppError::BadSignature)?;
        if (now - ts).abs() > self.tolerance_secs {
            tracing::warn!(timestamp = ts, now, "Webhook signature timestamp outside tolerance");
            return Err(AppError::BadSignature);
        }

        let expected = compute_signature(self.secret.expose_secret(), timestamp, payload)?;
        let matched = signatures
            .iter()
            .any(|sig| bool::from(sig.as_bytes().ct_eq(expected.as_bytes())));

        if matched {
            Ok(())
        } else {
            Err(AppError::BadSignature)
        }
    }
}

impl WebhookSignatureVerifier for HmacSignatureVerifier {
    fn verify(&self, payload: &str, signature_header: &str) -> AppResult<()> {
        self.verify_at(payload, signature_header, Utc::now().timestamp())
    }
}
