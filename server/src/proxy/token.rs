//! Proxy token minting
//!
//! Tokens are compact JWEs using direct key agreement (`alg: dir`) and
//! `A128CBC-HS256` content encryption (RFC 7518 §5.2.3). The 32-byte key is
//! split into a 16-byte HMAC key followed by a 16-byte AES key.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::config::{MAX_TOKEN_TTL_SECS, ProxySettings};

type HmacSha256 = Hmac<Sha256>;
type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

const KEY_LEN: usize = 32;
const HALF_KEY_LEN: usize = KEY_LEN / 2;
const IV_LEN: usize = 16;
const TAG_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("proxy key must be hex encoded: {0}")]
    KeyEncoding(#[from] hex::FromHexError),

    #[error("proxy key must be 32 bytes, got {0}")]
    KeyLength(usize),

    #[error("malformed token")]
    Malformed,

    #[error("unsupported token header")]
    UnsupportedHeader,

    #[error("token authentication failed")]
    BadTag,

    #[error("token has expired")]
    Expired,

    #[error("unexpected {0} claim")]
    ClaimMismatch(&'static str),

    #[error("cryptography error: {0}")]
    Crypto(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct ProtectedHeader {
    alg: String,
    enc: String,
}

/// Claims carried by every proxy token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyClaims {
    /// Provider identity of the caller
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// Mints short-lived encrypted tokens addressed to the upstream API
pub struct ProxyTokenMinter {
    mac_key: [u8; HALF_KEY_LEN],
    enc_key: [u8; HALF_KEY_LEN],
    issuer: String,
    audience: String,
    ttl_secs: i64,
}

impl ProxyTokenMinter {
    /// Build a minter from the hex-encoded shared key
    pub fn from_hex(hex_key: &str, settings: &ProxySettings) -> Result<Self, TokenError> {
        let key = hex::decode(hex_key.trim())?;
        if key.len() != KEY_LEN {
            return Err(TokenError::KeyLength(key.len()));
        }

        let mut mac_key = [0u8; HALF_KEY_LEN];
        let mut enc_key = [0u8; HALF_KEY_LEN];
        mac_key.copy_from_slice(&key[..HALF_KEY_LEN]);
        enc_key.copy_from_slice(&key[HALF_KEY_LEN..]);

        Ok(Self {
            mac_key,
            enc_key,
            issuer: settings.issuer.clone(),
            audience: settings.audience.clone(),
            ttl_secs: settings.token_ttl_secs.clamp(1, MAX_TOKEN_TTL_SECS),
        })
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Mint a token for `subject` valid from now
    pub fn mint(&self, subject: &str) -> Result<String, TokenError> {
        self.mint_at(subject, Utc::now().timestamp())
    }

    /// Mint a token for `subject` as if issued at `now` (Unix seconds)
    pub fn mint_at(&self, subject: &str, now: i64) -> Result<String, TokenError> {
        let claims = ProxyClaims {
            sub: subject.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now,
            exp: now.saturating_add(self.ttl_secs),
        };
        let payload =
            serde_json::to_vec(&claims).map_err(|e| TokenError::Crypto(e.to_string()))?;

        let header = ProtectedHeader {
            alg: "dir".to_string(),
            enc: "A128CBC-HS256".to_string(),
        };
        let header_json =
            serde_json::to_vec(&header).map_err(|e| TokenError::Crypto(e.to_string()))?;
        let encoded_header = URL_SAFE_NO_PAD.encode(header_json);

        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let ciphertext = Aes128CbcEnc::new_from_slices(&self.enc_key, &iv)
            .map_err(|e| TokenError::Crypto(e.to_string()))?
            .encrypt_padded_vec_mut::<Pkcs7>(&payload);

        let tag = self.compute_tag(encoded_header.as_bytes(), &iv, &ciphertext)?;

        Ok(format!(
            "{}..{}.{}.{}",
            encoded_header,
            URL_SAFE_NO_PAD.encode(iv),
            URL_SAFE_NO_PAD.encode(&ciphertext),
            URL_SAFE_NO_PAD.encode(tag),
        ))
    }

    /// Decrypt and validate a token at the current time
    pub fn decrypt(&self, token: &str) -> Result<ProxyClaims, TokenError> {
        self.decrypt_at(token, Utc::now().timestamp())
    }

    /// Decrypt and validate a token as seen at `now` (Unix seconds)
    ///
    /// Tokens are rejected once `now` reaches `exp`.
    pub fn decrypt_at(&self, token: &str, now: i64) -> Result<ProxyClaims, TokenError> {
        let parts: Vec<&str> = token.split('.').collect();
        let [encoded_header, encrypted_key, iv, ciphertext, tag] = parts.as_slice() else {
            return Err(TokenError::Malformed);
        };
        if !encrypted_key.is_empty() {
            return Err(TokenError::UnsupportedHeader);
        }

        let header: ProtectedHeader = serde_json::from_slice(&decode_part(encoded_header)?)
            .map_err(|_| TokenError::Malformed)?;
        if header.alg != "dir" || header.enc != "A128CBC-HS256" {
            return Err(TokenError::UnsupportedHeader);
        }

        let iv = decode_part(iv)?;
        let ciphertext = decode_part(ciphertext)?;
        let tag = decode_part(tag)?;
        if iv.len() != IV_LEN || tag.len() != TAG_LEN {
            return Err(TokenError::Malformed);
        }

        self.tag_mac(encoded_header.as_bytes(), &iv, &ciphertext)?
            .verify_truncated_left(&tag)
            .map_err(|_| TokenError::BadTag)?;

        let payload = Aes128CbcDec::new_from_slices(&self.enc_key, &iv)
            .map_err(|e| TokenError::Crypto(e.to_string()))?
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| TokenError::BadTag)?;

        let claims: ProxyClaims =
            serde_json::from_slice(&payload).map_err(|_| TokenError::Malformed)?;

        if claims.iss != self.issuer {
            return Err(TokenError::ClaimMismatch("iss"));
        }
        if claims.aud != self.audience {
            return Err(TokenError::ClaimMismatch("aud"));
        }
        if now >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    fn compute_tag(
        &self,
        aad: &[u8],
        iv: &[u8],
        ciphertext: &[u8],
    ) -> Result<[u8; TAG_LEN], TokenError> {
        let digest = self.tag_mac(aad, iv, ciphertext)?.finalize().into_bytes();
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&digest[..TAG_LEN]);
        Ok(tag)
    }

    /// HMAC over `AAD || IV || ciphertext || AL`
    fn tag_mac(&self, aad: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<HmacSha256, TokenError> {
        let mut mac = HmacSha256::new_from_slice(&self.mac_key)
            .map_err(|e| TokenError::Crypto(e.to_string()))?;
        let aad_bits = (aad.len() as u64) * 8;
        mac.update(aad);
        mac.update(iv);
        mac.update(ciphertext);
        mac.update(&aad_bits.to_be_bytes());
        Ok(mac)
    }
}

fn decode_part(part: &str) -> Result<Vec<u8>, TokenError> {
    URL_SAFE_NO_PAD.decode(part).map_err(|_| TokenError::Malformed)
}
