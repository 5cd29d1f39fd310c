//! Signed registration tokens.
//!
//! A token binds a component id to a lifetime. The claims are serialized
//! as canonical JSON (keys in sorted order) and signed with HMAC-SHA-256
//! under a process-local shared secret; the wire form is a JSON object
//! carrying the claims and the hex signature.

use std::time::Duration;

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use fabric_primitives::{ComponentId, TokenId};

use crate::{RegistryError, RegistryResult};

type HmacSha256 = Hmac<Sha256>;

/// Claims carried by a registration token.
///
/// Field order matches the canonical sorted-keys serialization; do not
/// reorder without changing the signing scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Component the token is bound to.
    pub component_id: ComponentId,
    /// Expiry as a Unix timestamp (seconds).
    pub exp: i64,
    /// Issue time as a Unix timestamp (seconds).
    pub iat: i64,
    /// Unique identifier of this token issuance.
    pub token_id: TokenId,
}

impl TokenClaims {
    /// Returns `true` when the token has expired at time `now` (seconds).
    #[must_use]
    pub const fn is_expired_at(&self, now: i64) -> bool {
        now > self.exp
    }
}

/// Wire form of a signed token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedToken {
    /// The signed claims.
    pub payload: TokenClaims,
    /// Hex-encoded HMAC-SHA-256 over the canonical claims JSON.
    pub signature: String,
}

impl SignedToken {
    /// Serializes the token to its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Serialization`] when encoding fails.
    pub fn encode(&self) -> RegistryResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses a token from its JSON wire form without verifying it.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Serialization`] when the input is not a
    /// well-formed token document.
    pub fn decode(token: &str) -> RegistryResult<Self> {
        Ok(serde_json::from_str(token)?)
    }
}

/// Mints and verifies registration tokens under a shared secret.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
    ttl: Duration,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("secret", &"<redacted>")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl TokenSigner {
    /// Creates a signer with the given shared secret and token lifetime.
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>, ttl: Duration) -> Self {
        Self {
            secret: secret.into(),
            ttl,
        }
    }

    /// Returns the configured token lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mints a fresh token bound to the given component.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Serialization`] when claim encoding fails.
    pub fn mint(&self, component_id: &ComponentId) -> RegistryResult<SignedToken> {
        let iat = Utc::now().timestamp();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let payload = TokenClaims {
            component_id: component_id.clone(),
            exp: iat.saturating_add(ttl),
            iat,
            token_id: TokenId::random(),
        };
        let signature = self.sign(&payload)?;
        Ok(SignedToken { payload, signature })
    }

    /// Verifies a token's signature and expiry, returning its claims.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Unauthenticated`] on malformed tokens,
    /// signature mismatch, or expiry.
    pub fn verify(&self, token: &str) -> RegistryResult<TokenClaims> {
        let signed = SignedToken::decode(token)
            .map_err(|_| RegistryError::unauthenticated("malformed token"))?;

        let canonical = serde_json::to_vec(&signed.payload)?;
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| RegistryError::unauthenticated("invalid signing key length"))?;
        mac.update(&canonical);

        let signature = hex::decode(&signed.signature)
            .map_err(|_| RegistryError::unauthenticated("signature is not valid hex"))?;
        mac.verify_slice(&signature)
            .map_err(|_| RegistryError::unauthenticated("signature mismatch"))?;

        if signed.payload.is_expired_at(Utc::now().timestamp()) {
            return Err(RegistryError::unauthenticated("token expired"));
        }

        Ok(signed.payload)
    }

    fn sign(&self, payload: &TokenClaims) -> RegistryResult<String> {
        let canonical = serde_json::to_vec(payload)?;
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| RegistryError::unauthenticated("invalid signing key length"))?;
        mac.update(&canonical);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> TokenSigner {
        TokenSigner::new(b"fabric-test-secret".to_vec(), Duration::from_secs(3600))
    }

    fn component() -> ComponentId {
        ComponentId::new("athena").unwrap()
    }

    #[test]
    fn mint_and_verify_round_trip() {
        let signer = signer();
        let token = signer.mint(&component()).unwrap();
        let encoded = token.encode().unwrap();

        let claims = signer.verify(&encoded).unwrap();
        assert_eq!(claims.component_id, component());
        assert_eq!(claims.token_id, token.payload.token_id);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn rejects_wrong_secret() {
        let token = signer().mint(&component()).unwrap().encode().unwrap();
        let other = TokenSigner::new(b"different-secret".to_vec(), Duration::from_secs(3600));
        let err = other.verify(&token).expect_err("wrong secret must fail");
        assert!(matches!(err, RegistryError::Unauthenticated { .. }));
    }

    #[test]
    fn rejects_tampered_claims() {
        let signer = signer();
        let mut token = signer.mint(&component()).unwrap();
        token.payload.component_id = ComponentId::new("impostor").unwrap();
        let err = signer
            .verify(&token.encode().unwrap())
            .expect_err("tampered claims must fail");
        assert!(matches!(err, RegistryError::Unauthenticated { .. }));
    }

    #[test]
    fn rejects_expired_token() {
        let signer = TokenSigner::new(b"fabric-test-secret".to_vec(), Duration::ZERO);
        let mut token = signer.mint(&component()).unwrap();
        // Force the expiry into the past and re-sign so only expiry fails.
        token.payload.exp = token.payload.iat - 10;
        token.signature = signer.sign(&token.payload).unwrap();

        let err = signer
            .verify(&token.encode().unwrap())
            .expect_err("expired token must fail");
        assert!(matches!(err, RegistryError::Unauthenticated { .. }));
    }

    #[test]
    fn rejects_garbage() {
        let err = signer().verify("not json").expect_err("garbage must fail");
        assert!(matches!(err, RegistryError::Unauthenticated { .. }));
    }
}
