//! Identifier & hashing primitives (spec §2 step 1): opaque secret minting,
//! HMAC api-key fingerprints, SHA-256 token hashing, and HKDF/AES-GCM
//! at-rest encryption for secrets the store has to keep (e.g. a configured
//! outbound webhook signing key).
//!
//! The teacher's own stack only reaches for `sha2`/`md5` (content hashing,
//! not capability tokens); `hmac`, `hkdf`, `aes-gcm`, and `rand` are pulled
//! in from the pack's security-shaped teachers (`ThirdKeyAI-Symbiont` uses
//! `aes-gcm`/`rand`; `Counselco-chronx` uses `zeroize`-style secret
//! handling) — see `DESIGN.md`.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Base62 alphabet used for the human-visible portion of api keys and
/// decision tokens (URL-safe, no padding, unambiguous-enough for the
/// reference implementation — the teacher's ecosystem favors base64/hex
/// for wire encoding, but spec §6 pins the exact api-key shape to base62).
const BASE62: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

fn random_base62(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            let idx = (rng.next_u32() as usize) % BASE62.len();
            BASE62[idx] as char
        })
        .collect()
}

/// Generate a new raw api-key secret: `sk_<tier>_<22-char-base62>`.
///
/// The raw secret is returned to the caller exactly once (at creation
/// time); only its HMAC fingerprint is ever persisted.
pub fn generate_api_key_secret(tier: &str) -> String {
    format!("sk_{tier}_{}", random_base62(22))
}

/// Compute the HMAC-SHA256 fingerprint of a raw api-key secret under the
/// server's pepper. Stored uniquely in `ApiKey::key_fingerprint`.
pub fn fingerprint_api_key(raw: &str, server_pepper: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(server_pepper).expect("hmac accepts any key length");
    mac.update(raw.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time comparison of a presented api key against a stored
/// fingerprint, per spec §6 ("verification is constant-time").
pub fn verify_api_key(raw: &str, stored_fingerprint: &str, server_pepper: &[u8]) -> bool {
    let computed = fingerprint_api_key(raw, server_pepper);
    // Compare as bytes, not as a short-circuiting string equality.
    computed.as_bytes().ct_eq(stored_fingerprint.as_bytes()).into()
}

/// A minted decision token: the raw string (handed to the notifier and
/// embedded in outbound URLs, never persisted) and the SHA-256 hash (the
/// only thing the store keeps), per spec §4.4.
pub struct MintedToken {
    pub raw: String,
    pub hash: String,
}

/// Mint a new decision token: 128 random bits, `dtok_`-prefixed, hashed
/// with SHA-256 for storage.
pub fn mint_decision_token() -> MintedToken {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    let raw = format!("dtok_{}", hex::encode(bytes));
    let hash = hash_token(&raw);
    MintedToken { raw, hash }
}

/// Hash a presented token for lookup against the stored hash. Deterministic:
/// identical raw tokens always hash identically (testable property in
/// spec §8's round-trip laws); distinct raw tokens collide only with
/// SHA-256's negligible probability.
pub fn hash_token(raw: &str) -> String {
    use sha2::Digest;
    let digest = Sha256::digest(raw.as_bytes());
    hex::encode(digest)
}

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("encryption failed")]
    Encrypt,
    #[error("decryption failed (wrong key or corrupted ciphertext)")]
    Decrypt,
}

/// AES-256-GCM envelope for at-rest secrets, keyed via HKDF-SHA256 over a
/// master secret so a single configured master key can derive independent
/// per-purpose keys (e.g. "webhook-secret", "oauth-token") without reuse.
pub struct SecretCipher {
    key: Key<Aes256Gcm>,
}

impl SecretCipher {
    pub fn derive(master_secret: &[u8], purpose: &str) -> Self {
        let hk = Hkdf::<Sha256>::new(None, master_secret);
        let mut okm = [0u8; 32];
        hk.expand(purpose.as_bytes(), &mut okm)
            .expect("32 bytes is a valid HKDF output length for SHA-256");
        Self {
            key: *Key::<Aes256Gcm>::from_slice(&okm),
        }
    }

    /// Encrypt `plaintext`, returning `nonce || ciphertext` base64-encoded.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, CryptoError> {
        let cipher = Aes256Gcm::new(&self.key);
        let mut nonce_bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CryptoError::Encrypt)?;
        let mut out = nonce_bytes.to_vec();
        out.extend_from_slice(&ciphertext);
        Ok(base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            out,
        ))
    }

    /// Decrypt a value produced by [`Self::encrypt`].
    pub fn decrypt(&self, encoded: &str) -> Result<Vec<u8>, CryptoError> {
        let raw = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded)
            .map_err(|_| CryptoError::Decrypt)?;
        if raw.len() < 12 {
            return Err(CryptoError::Decrypt);
        }
        let (nonce_bytes, ciphertext) = raw.split_at(12);
        let cipher = Aes256Gcm::new(&self.key);
        let nonce = Nonce::from_slice(nonce_bytes);
        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::Decrypt)
    }
}

/// HMAC-SHA256 signature for outbound webhook payloads, per spec §6:
/// `X-SchedLock-Signature = hex(HMAC-SHA256(secret, body))`.
pub fn sign_webhook_payload(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_verifies_against_its_own_fingerprint() {
        let pepper = b"test-pepper";
        let raw = generate_api_key_secret("write");
        assert!(raw.starts_with("sk_write_"));
        let fp = fingerprint_api_key(&raw, pepper);
        assert!(verify_api_key(&raw, &fp, pepper));
    }

    #[test]
    fn api_key_rejects_wrong_secret() {
        let pepper = b"test-pepper";
        let raw = generate_api_key_secret("write");
        let fp = fingerprint_api_key(&raw, pepper);
        assert!(!verify_api_key("sk_write_not-the-real-one", &fp, pepper));
    }

    #[test]
    fn token_hash_is_deterministic() {
        let token = mint_decision_token();
        assert_eq!(hash_token(&token.raw), token.hash);
    }

    #[test]
    fn distinct_tokens_hash_differently() {
        let a = mint_decision_token();
        let b = mint_decision_token();
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn secret_cipher_roundtrips() {
        let cipher = SecretCipher::derive(b"master-secret", "webhook-secret");
        let plaintext = b"super secret value";
        let encrypted = cipher.encrypt(plaintext).unwrap();
        let decrypted = cipher.decrypt(&encrypted).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn secret_cipher_rejects_wrong_key() {
        let cipher = SecretCipher::derive(b"master-secret", "webhook-secret");
        let wrong = SecretCipher::derive(b"different-secret", "webhook-secret");
        let encrypted = cipher.encrypt(b"value").unwrap();
        assert!(wrong.decrypt(&encrypted).is_err());
    }

    #[test]
    fn webhook_signature_is_deterministic() {
        let sig1 = sign_webhook_payload("secret", b"body");
        let sig2 = sign_webhook_payload("secret", b"body");
        assert_eq!(sig1, sig2);
    }
}
