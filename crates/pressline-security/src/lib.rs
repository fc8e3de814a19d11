//! Credential decryption for channel records.
//!
//! Channel settings arrive with sensitive fields (API keys, SMTP
//! passwords, provider tokens) encrypted at rest: AES-256 over the
//! value, base64 on the wire, key derived from a deployment secret via
//! SHA-256. Backends decrypt just the fields they need before building
//! a provider call.

use aes::cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes256;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use pressline_core::error::{PresslineError, Result};
use sha2::{Digest, Sha256};

const BLOCK_SIZE: usize = 16;

/// Symmetric cipher over channel credential fields.
#[derive(Clone)]
pub struct CredentialCipher {
    key: [u8; 32],
}

impl CredentialCipher {
    /// Derive the AES-256 key from a deployment secret.
    pub fn from_secret(secret: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"pressline::credentials::");
        hasher.update(secret.as_bytes());
        let digest = hasher.finalize();

        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self { key }
    }

    /// Decrypt one base64-wrapped credential value.
    pub fn decrypt(&self, value: &str) -> Result<String> {
        let encrypted = BASE64
            .decode(value.trim())
            .map_err(|e| PresslineError::Security(format!("Base64 decode failed: {e}")))?;
        if encrypted.is_empty() || encrypted.len() % BLOCK_SIZE != 0 {
            return Err(PresslineError::Security(
                "Ciphertext is not block-aligned".into(),
            ));
        }

        let cipher = Aes256::new(GenericArray::from_slice(&self.key));
        let mut plain = Vec::with_capacity(encrypted.len());
        for chunk in encrypted.chunks(BLOCK_SIZE) {
            let mut block = GenericArray::clone_from_slice(chunk);
            cipher.decrypt_block(&mut block);
            plain.extend_from_slice(&block);
        }

        strip_pkcs7(&mut plain)?;
        String::from_utf8(plain).map_err(|e| {
            PresslineError::Security(format!("Decryption produced invalid UTF-8: {e}"))
        })
    }

    /// Encrypt a credential value. Used by provisioning tooling and the
    /// test-suites; the engine itself only ever decrypts.
    pub fn encrypt(&self, value: &str) -> String {
        let cipher = Aes256::new(GenericArray::from_slice(&self.key));

        let data = value.as_bytes();
        let pad = BLOCK_SIZE - (data.len() % BLOCK_SIZE);
        let mut padded = data.to_vec();
        padded.extend(std::iter::repeat(pad as u8).take(pad));

        let mut encrypted = Vec::with_capacity(padded.len());
        for chunk in padded.chunks(BLOCK_SIZE) {
            let mut block = GenericArray::clone_from_slice(chunk);
            cipher.encrypt_block(&mut block);
            encrypted.extend_from_slice(&block);
        }

        BASE64.encode(&encrypted)
    }

    /// Decrypt the named fields of a channel settings object, leaving
    /// everything else untouched. Missing fields are skipped.
    pub fn decrypt_fields(
        &self,
        settings: &serde_json::Value,
        fields: &[&str],
    ) -> Result<serde_json::Value> {
        let mut out = settings.clone();
        if let Some(map) = out.as_object_mut() {
            for field in fields {
                if let Some(serde_json::Value::String(value)) = map.get(*field) {
                    let plain = self.decrypt(value)?;
                    map.insert((*field).to_string(), serde_json::Value::String(plain));
                }
            }
        }
        Ok(out)
    }
}

/// Validate and remove PKCS7 padding in place.
fn strip_pkcs7(data: &mut Vec<u8>) -> Result<()> {
    let pad = *data
        .last()
        .ok_or_else(|| PresslineError::Security("Empty plaintext".into()))? as usize;
    if pad == 0 || pad > BLOCK_SIZE || pad > data.len() {
        return Err(PresslineError::Security("Invalid padding".into()));
    }
    let tail = &data[data.len() - pad..];
    if tail.iter().any(|&b| b as usize != pad) {
        return Err(PresslineError::Security("Invalid padding".into()));
    }
    data.truncate(data.len() - pad);
    Ok(())
}
