//! Opaque transform between stored ciphertext (`enc:v1:<token>`) and
//! plaintext used at call time (spec.md §1, §2 item 3). The encryption
//! scheme itself is out of scope (spec.md §1 "credential encryption...
//! treated as a codec"); this module only owns the tag convention and the
//! transform's shape, using a reversible XOR-with-derived-keystream cipher
//! so round-tripping is exercisable without a KMS dependency.

use sha2::{Digest, Sha256};

use oms_domain::{Account, AccountCredentials};

use crate::exchange::client::ExchangeCredentials;

const TAG_PREFIX: &str = "enc:v1:";

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("credential value is not encrypted (require_encrypted=true)")]
    NotEncrypted,
    #[error("ciphertext is not valid base64url: {0}")]
    Base64(String),
}

pub struct CredentialsCodec {
    key: [u8; 32],
}

impl CredentialsCodec {
    pub fn new(master_key: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(master_key);
        Self {
            key: hasher.finalize().into(),
        }
    }

    fn keystream(&self, nonce: u64, len: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(len);
        let mut counter: u64 = 0;
        while out.len() < len {
            let mut hasher = Sha256::new();
            hasher.update(self.key);
            hasher.update(nonce.to_le_bytes());
            hasher.update(counter.to_le_bytes());
            out.extend_from_slice(&hasher.finalize());
            counter += 1;
        }
        out.truncate(len);
        out
    }

    /// Encrypts `plaintext`, tagging the result `enc:v1:<base64url-token>`
    /// (spec.md §6 "Encrypted credentials use the tag `enc:v1:<...>`").
    pub fn encrypt(&self, plaintext: &str) -> String {
        let nonce: u64 = {
            let mut hasher = Sha256::new();
            hasher.update(plaintext.as_bytes());
            hasher.update(self.key);
            let digest = hasher.finalize();
            u64::from_le_bytes(digest[..8].try_into().expect("sha256 digest is 32 bytes"))
        };
        let ks = self.keystream(nonce, plaintext.len());
        let mut body = nonce.to_le_bytes().to_vec();
        body.extend(plaintext.bytes().zip(ks).map(|(b, k)| b ^ k));
        format!("{TAG_PREFIX}{}", base64url_encode(&body))
    }

    /// Decrypts a tagged value, or returns the input unchanged when it is
    /// not tagged and `require_encrypted` is `false` (spec.md §8 round-trip
    /// law: "`decrypt_maybe` on a plaintext value fails when
    /// `require_encrypted=true` and is identity when false").
    pub fn decrypt_maybe(&self, value: &str, require_encrypted: bool) -> Result<String, CodecError> {
        match value.strip_prefix(TAG_PREFIX) {
            Some(token) => {
                let body = base64url_decode(token).map_err(CodecError::Base64)?;
                if body.len() < 8 {
                    return Err(CodecError::Base64("ciphertext too short".to_owned()));
                }
                let nonce = u64::from_le_bytes(body[..8].try_into().expect("checked length"));
                let ks = self.keystream(nonce, body.len() - 8);
                let plain: Vec<u8> = body[8..].iter().zip(ks).map(|(b, k)| b ^ k).collect();
                String::from_utf8(plain).map_err(|err| CodecError::Base64(err.to_string()))
            }
            None if require_encrypted => Err(CodecError::NotEncrypted),
            None => Ok(value.to_owned()),
        }
    }
}

/// Decrypts a stored `AccountCredentials` row (or the account's empty
/// defaults, when it has none on file) into the plaintext shape
/// `ExchangeAdapter` calls need (spec.md §4.2 "credentials decrypted before
/// use", §4.5, §4.6 — the executor and reconciler both resolve credentials
/// this way before touching the exchange).
pub fn resolve_exchange_credentials(
    account: &Account,
    stored: Option<&AccountCredentials>,
    codec: &CredentialsCodec,
) -> Result<ExchangeCredentials, CodecError> {
    let decrypt = |value: &Option<String>| -> Result<Option<String>, CodecError> {
        value.as_ref().map(|raw| codec.decrypt_maybe(raw, true)).transpose()
    };
    let (api_key, secret, passphrase) = match stored {
        Some(creds) => (decrypt(&creds.api_key)?, decrypt(&creds.secret)?, decrypt(&creds.passphrase)?),
        None => (None, None, None),
    };
    Ok(ExchangeCredentials {
        use_testnet: account.is_testnet,
        api_key,
        secret,
        passphrase,
        extra_config: account.extra_config.clone(),
    })
}

fn base64url_encode(bytes: &[u8]) -> String {
    const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";
    let mut out = String::with_capacity((bytes.len() * 4).div_ceil(3));
    for chunk in bytes.chunks(3) {
        let b0 = chunk[0] as u32;
        let b1 = *chunk.get(1).unwrap_or(&0) as u32;
        let b2 = *chunk.get(2).unwrap_or(&0) as u32;
        let triple = (b0 << 16) | (b1 << 8) | b2;
        out.push(ALPHABET[(triple >> 18 & 0x3f) as usize] as char);
        out.push(ALPHABET[(triple >> 12 & 0x3f) as usize] as char);
        if chunk.len() > 1 {
            out.push(ALPHABET[(triple >> 6 & 0x3f) as usize] as char);
        }
        if chunk.len() > 2 {
            out.push(ALPHABET[(triple & 0x3f) as usize] as char);
        }
    }
    out
}

fn base64url_decode(s: &str) -> Result<Vec<u8>, String> {
    fn value(c: u8) -> Result<u32, String> {
        match c {
            b'A'..=b'Z' => Ok((c - b'A') as u32),
            b'a'..=b'z' => Ok((c - b'a' + 26) as u32),
            b'0'..=b'9' => Ok((c - b'0' + 52) as u32),
            b'-' => Ok(62),
            b'_' => Ok(63),
            _ => Err(format!("invalid base64url byte `{c}`")),
        }
    }
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() * 3 / 4);
    for chunk in bytes.chunks(4) {
        let n = chunk.len();
        let mut values = [0u32; 4];
        for (i, byte) in chunk.iter().enumerate() {
            values[i] = value(*byte)?;
        }
        let triple = (values[0] << 18) | (values[1] << 12) | (values[2] << 6) | values[3];
        out.push((triple >> 16) as u8);
        if n > 2 {
            out.push((triple >> 8) as u8);
        }
        if n > 3 {
            out.push(triple as u8);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_is_identity() {
        let codec = CredentialsCodec::new(b"test-master-key");
        let plaintext = "super-secret-api-key";
        let ciphertext = codec.encrypt(plaintext);
        assert!(ciphertext.starts_with(TAG_PREFIX));
        assert_eq!(codec.decrypt_maybe(&ciphertext, true).unwrap(), plaintext);
    }

    #[test]
    fn plaintext_rejected_when_encryption_required() {
        let codec = CredentialsCodec::new(b"test-master-key");
        assert!(codec.decrypt_maybe("plain-value", true).is_err());
    }

    #[test]
    fn plaintext_is_identity_when_not_required() {
        let codec = CredentialsCodec::new(b"test-master-key");
        assert_eq!(codec.decrypt_maybe("plain-value", false).unwrap(), "plain-value");
    }

    #[test]
    fn different_plaintexts_produce_different_ciphertexts() {
        let codec = CredentialsCodec::new(b"test-master-key");
        assert_ne!(codec.encrypt("a"), codec.encrypt("b"));
    }

    fn sample_account() -> Account {
        Account {
            id: oms_domain::AccountId::from(1),
            exchange_id: "ccxt.binance".to_owned(),
            position_mode: oms_domain::PositionMode::Hedge,
            status: oms_domain::AccountStatus::Active,
            is_testnet: true,
            dispatcher_worker_hint: None,
            extra_config: serde_json::json!({"rateLimit": 50}),
        }
    }

    #[test]
    fn resolves_decrypted_credentials_from_stored_row() {
        let codec = CredentialsCodec::new(b"test-master-key");
        let account = sample_account();
        let stored = AccountCredentials {
            account_id: account.id,
            api_key: Some(codec.encrypt("my-api-key")),
            secret: Some(codec.encrypt("my-secret")),
            passphrase: None,
        };
        let resolved = resolve_exchange_credentials(&account, Some(&stored), &codec).unwrap();
        assert_eq!(resolved.api_key.as_deref(), Some("my-api-key"));
        assert_eq!(resolved.secret.as_deref(), Some("my-secret"));
        assert!(resolved.passphrase.is_none());
        assert!(resolved.use_testnet);
    }

    #[test]
    fn missing_credentials_row_resolves_to_empty_fields() {
        let codec = CredentialsCodec::new(b"test-master-key");
        let account = sample_account();
        let resolved = resolve_exchange_credentials(&account, None, &codec).unwrap();
        assert!(resolved.api_key.is_none());
        assert!(resolved.secret.is_none());
    }
}
