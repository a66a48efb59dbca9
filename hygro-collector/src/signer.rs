use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use rand::TryRngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum SignError {
    #[error("nonce generation failed: {0}")]
    Nonce(String),
    #[error("invalid signing key: {0}")]
    Key(#[from] hmac::digest::InvalidLength),
}

/// Authentication material for exactly one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequestContext {
    pub nonce: Uuid,
    pub timestamp_nanos: i128,
    pub signature: String,
}

impl SignedRequestContext {
    /// Header pairs in the order the upstream API documents them.
    pub fn headers(&self, token: &str) -> [(&'static str, String); 4] {
        [
            ("Authorization", token.to_string()),
            ("sign", self.signature.clone()),
            ("nonce", self.nonce.to_string()),
            ("t", self.timestamp_nanos.to_string()),
        ]
    }
}

/// Signs a request with a fresh random nonce and the current wall-clock time.
pub fn sign(token: &str, secret: &str) -> Result<SignedRequestContext, SignError> {
    let nonce = fresh_nonce()?;
    let timestamp_nanos = jiff::Timestamp::now().as_nanosecond();
    sign_with(token, secret, nonce, timestamp_nanos)
}

/// `base64(HMAC-SHA256(secret, token || timestamp || nonce))`, no separators.
pub fn sign_with(
    token: &str,
    secret: &str,
    nonce: Uuid,
    timestamp_nanos: i128,
) -> Result<SignedRequestContext, SignError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(token.as_bytes());
    mac.update(timestamp_nanos.to_string().as_bytes());
    mac.update(nonce.to_string().as_bytes());
    let signature = STANDARD.encode(mac.finalize().into_bytes());

    Ok(SignedRequestContext {
        nonce,
        timestamp_nanos,
        signature,
    })
}

fn fresh_nonce() -> Result<Uuid, SignError> {
    let mut bytes = [0u8; 16];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| SignError::Nonce(e.to_string()))?;
    Ok(uuid::Builder::from_random_bytes(bytes).into_uuid())
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONCE: &str = "2f1e6f1a-4c3b-4d5e-8f70-9a1b2c3d4e5f";
    const TIMESTAMP: i128 = 1_700_000_000_000_000_000;

    #[test]
    fn known_signature() {
        let nonce: Uuid = NONCE.parse().unwrap();
        let ctx = sign_with("token-abc", "secret-xyz", nonce, TIMESTAMP).unwrap();
        assert_eq!(ctx.signature, "N34u611SR01de3HREMJWMlgryABHM+Ma6CbNtPdvFks=");
    }

    #[test]
    fn signing_is_deterministic() {
        let nonce: Uuid = NONCE.parse().unwrap();
        let a = sign_with("token", "secret", nonce, TIMESTAMP).unwrap();
        let b = sign_with("token", "secret", nonce, TIMESTAMP).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn fresh_calls_use_distinct_nonces() {
        let a = sign("token", "secret").unwrap();
        let b = sign("token", "secret").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.signature, b.signature);
        assert_eq!(a.nonce.get_version_num(), 4);
        assert!(!a.nonce.is_nil());
    }

    #[test]
    fn headers_carry_context() {
        let nonce: Uuid = NONCE.parse().unwrap();
        let ctx = sign_with("token", "secret", nonce, TIMESTAMP).unwrap();
        let headers = ctx.headers("token");
        assert_eq!(headers[0], ("Authorization", "token".to_string()));
        assert_eq!(headers[1].1, ctx.signature);
        assert_eq!(headers[2], ("nonce", NONCE.to_string()));
        assert_eq!(headers[3], ("t", "1700000000000000000".to_string()));
    }
}
