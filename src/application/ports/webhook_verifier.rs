use crate::app_error::AppResult;

/// Authenticates an inbound provider webhook before anything is parsed.
pub trait WebhookSignatureVerifier: Send + Sync {
    /// Fails with `BadSignature` when the header is missing, malformed, stale,
    /// or does not match `payload`.
    fn verify(&self, payload: &str, signature_header: &str) -> AppResult<()>;
}
