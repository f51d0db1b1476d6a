//! Lightweight signed player tokens.
//!
//! Format: `base64url(json claims).base64url(hmac_sha256(json claims))`.
//! The player id an action is attributed to always comes from a verified
//! token, never from the request body.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use time::OffsetDateTime;

use crate::game::state::PlayerId;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub player: PlayerId,
    pub name: String,
    pub iat: i64,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("bad signature")]
    BadSignature,
}

#[derive(Clone)]
pub struct TokenSigner {
    key: [u8; 32],
}

impl TokenSigner {
    pub fn new(key: [u8; 32]) -> Self { Self { key } }

    pub fn issue(&self, player: PlayerId, name: &str) -> String {
        let claims = Claims { player, name: name.to_string(), iat: OffsetDateTime::now_utc().unix_timestamp() };
        // serializing a struct of plain fields cannot fail
        let payload = serde_json::to_vec(&claims).unwrap_or_default();
        let sig = self.mac().chain_update(&payload).finalize().into_bytes();
        format!("{}.{}", URL_SAFE_NO_PAD.encode(&payload), URL_SAFE_NO_PAD.encode(sig))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut parts = token.split('.');
        let (Some(p1), Some(p2), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(TokenError::Malformed);
        };
        let payload = URL_SAFE_NO_PAD.decode(p1).map_err(|_| TokenError::Malformed)?;
        let sig = URL_SAFE_NO_PAD.decode(p2).map_err(|_| TokenError::Malformed)?;
        self.mac()
            .chain_update(&payload)
            .verify_slice(&sig)
            .map_err(|_| TokenError::BadSignature)?;
        serde_json::from_slice(&payload).map_err(|_| TokenError::Malformed)
    }

    fn mac(&self) -> HmacSha256 {
        <HmacSha256 as Mac>::new_from_slice(&self.key).expect("hmac accepts keys of any length")
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn issued_tokens_verify() {
        let signer = TokenSigner::new([7u8; 32]);
        let pid = Uuid::new_v4();
        let claims = signer.verify(&signer.issue(pid, "alice")).unwrap();
        assert_eq!(claims.player, pid);
        assert_eq!(claims.name, "alice");
    }

    #[test]
    fn other_keys_are_rejected() {
        let token = TokenSigner::new([1u8; 32]).issue(Uuid::new_v4(), "mallory");
        assert_eq!(TokenSigner::new([2u8; 32]).verify(&token), Err(TokenError::BadSignature));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let signer = TokenSigner::new([3u8; 32]);
        let token = signer.issue(Uuid::new_v4(), "bob");
        let (_, sig) = token.split_once('.').unwrap();
        let forged = serde_json::to_vec(&Claims { player: Uuid::new_v4(), name: "bob".into(), iat: 0 }).unwrap();
        let forged = format!("{}.{}", URL_SAFE_NO_PAD.encode(forged), sig);
        assert_eq!(signer.verify(&forged), Err(TokenError::BadSignature));
    }

    #[test]
    fn garbage_is_malformed() {
        let signer = TokenSigner::new([4u8; 32]);
        assert_eq!(signer.verify("nodots"), Err(TokenError::Malformed));
        assert_eq!(signer.verify("a.b.c"), Err(TokenError::Malformed));
        assert_eq!(signer.verify("!!!.???"), Err(TokenError::Malformed));
    }
}
