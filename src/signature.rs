use crate::utils::b64_decode;

use ed25519_dalek::{Signature, VerifyingKey};
use time::OffsetDateTime;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing {0} header")]
    MissingHeader(&'static str),
    #[error("malformed timestamp header")]
    BadTimestamp,
    #[error("timestamp is {age_secs}s away from now")]
    Stale { age_secs: i64 },
    #[error("malformed signature header")]
    BadSignature,
    #[error("signature does not match payload")]
    Mismatch,
    #[error("invalid public key: {0}")]
    BadPublicKey(&'static str),
}

/// Checks Telnyx webhook signatures: Ed25519 over `"{timestamp}|{raw body}"`.
#[derive(Clone, Debug)]
pub struct WebhookVerifier {
    key: VerifyingKey,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    pub fn new(key: VerifyingKey, tolerance_secs: u64) -> Self {
        Self {
            key,
            tolerance_secs: i64::try_from(tolerance_secs).unwrap_or(i64::MAX),
        }
    }

    /// Accepts the key the way the Telnyx portal shows it: base64 of the 32 raw key bytes.
    pub fn from_base64(public_key: &str, tolerance_secs: u64) -> Result<Self, SignatureError> {
        let bytes = b64_decode(public_key).map_err(|_| SignatureError::BadPublicKey("not base64"))?;
        let bytes: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| SignatureError::BadPublicKey("expected 32 bytes"))?;
        let key = VerifyingKey::from_bytes(&bytes)
            .map_err(|_| SignatureError::BadPublicKey("not a curve point"))?;
        Ok(Self::new(key, tolerance_secs))
    }

    pub fn verify(
        &self,
        signature: Option<&str>,
        timestamp: Option<&str>,
        body: &[u8],
    ) -> Result<(), SignatureError> {
        self.verify_at(signature, timestamp, body, OffsetDateTime::now_utc())
    }

    pub fn verify_at(
        &self,
        signature: Option<&str>,
        timestamp: Option<&str>,
        body: &[u8],
        now: OffsetDateTime,
    ) -> Result<(), SignatureError> {
        let signature = signature.ok_or(SignatureError::MissingHeader("telnyx-signature-ed25519"))?;
        let timestamp = timestamp.ok_or(SignatureError::MissingHeader("telnyx-timestamp"))?;

        let sent_at: i64 = timestamp
            .trim()
            .parse()
            .map_err(|_| SignatureError::BadTimestamp)?;
        let age_secs = now.unix_timestamp() - sent_at;
        if age_secs.abs() > self.tolerance_secs {
            return Err(SignatureError::Stale { age_secs });
        }

        let sig_bytes = b64_decode(signature).map_err(|_| SignatureError::BadSignature)?;
        let sig = Signature::from_slice(&sig_bytes).map_err(|_| SignatureError::BadSignature)?;

        let mut signed = Vec::with_capacity(timestamp.len() + 1 + body.len());
        signed.extend_from_slice(timestamp.trim().as_bytes());
        signed.push(b'|');
        signed.extend_from_slice(body);

        self.key
            .verify_strict(&signed, &sig)
            .map_err(|_| SignatureError::Mismatch)
    }
}
