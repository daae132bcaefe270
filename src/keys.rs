//! RS256 signing key lifecycle.
//!
//! The server keeps exactly one RSA key pair. It is generated on first start,
//! persisted to the state file, and reloaded on every restart so that the
//! advertised JWK set stays stable across the server's lifetime. Only the
//! private key is persisted; the public half is recomputed on load.
//!
//! # State file
//!
//! One directive per line, same shape as the configuration file:
//!
//! ```text
//! PrivateKey <base64url PKCS#8 DER>
//! KeyId <uuid>
//! ```
//!
//! The file is written atomically (temp file + rename) with mode 0600.

use std::fs;
use std::path::{Path, PathBuf};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::EncodingKey;
use rsa::{
    pkcs8::{DecodePrivateKey, EncodePrivateKey},
    traits::PublicKeyParts,
    RsaPrivateKey, RsaPublicKey,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{Error, Result};

/// RSA key size in bits for RS256.
const RSA_KEY_SIZE: usize = 2048;

/// JWK (JSON Web Key) representation of the public key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonWebKey {
    /// Key type (always "RSA")
    pub kty: String,
    /// Public key use (always "sig")
    #[serde(rename = "use")]
    pub key_use: String,
    /// Key ID
    pub kid: String,
    /// Algorithm (RS256)
    pub alg: String,
    /// RSA modulus (base64url encoded)
    pub n: String,
    /// RSA exponent (base64url encoded)
    pub e: String,
}

/// JWKS container served at `/.well-known/jwks.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonWebKeySet {
    /// Array of public keys (always one entry here)
    pub keys: Vec<JsonWebKey>,
}

/// The server's signing key pair plus its persistence location.
pub struct KeyManager {
    kid: String,
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
    state_file: PathBuf,
}

impl KeyManager {
    /// Load the key from the state file, generating and persisting a fresh
    /// one if the file does not exist yet.
    pub fn load_or_generate(state_file: &Path) -> Result<Self> {
        if state_file.exists() {
            let manager = Self::load(state_file)?;
            debug!(kid = %manager.kid, "Loaded signing key from state file");
            return Ok(manager);
        }

        let manager = Self::generate(state_file, RSA_KEY_SIZE)?;
        manager.save()?;
        info!(kid = %manager.kid, "Generated new RS256 signing key");
        Ok(manager)
    }

    /// Generate a fresh key pair without touching disk.
    pub fn generate(state_file: &Path, bits: usize) -> Result<Self> {
        use rand::rngs::OsRng;

        let mut rng = OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, bits)
            .map_err(|e| Error::Key(format!("RSA key generation failed: {e}")))?;
        let public_key = RsaPublicKey::from(&private_key);

        Ok(Self {
            kid: uuid::Uuid::new_v4().to_string(),
            private_key,
            public_key,
            state_file: state_file.to_path_buf(),
        })
    }

    fn load(state_file: &Path) -> Result<Self> {
        let content = fs::read_to_string(state_file)?;
        let mut key_b64 = None;
        let mut kid = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((keyword, value)) = line.split_once(char::is_whitespace) else {
                continue;
            };
            let value = value.trim();
            if keyword.eq_ignore_ascii_case("PrivateKey") {
                key_b64 = Some(value.to_string());
            } else if keyword.eq_ignore_ascii_case("KeyId") {
                kid = Some(value.to_string());
            }
        }

        let key_b64 = key_b64
            .ok_or_else(|| Error::Key(format!("No PrivateKey in {}", state_file.display())))?;
        let der = URL_SAFE_NO_PAD
            .decode(key_b64)
            .map_err(|e| Error::Key(format!("Bad PrivateKey encoding: {e}")))?;
        let private_key = RsaPrivateKey::from_pkcs8_der(&der)
            .map_err(|e| Error::Key(format!("Bad PrivateKey DER: {e}")))?;
        let public_key = RsaPublicKey::from(&private_key);

        Ok(Self {
            kid: kid.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            private_key,
            public_key,
            state_file: state_file.to_path_buf(),
        })
    }

    /// Persist the private key atomically with owner-only permissions.
    pub fn save(&self) -> Result<()> {
        let der = self
            .private_key
            .to_pkcs8_der()
            .map_err(|e| Error::Key(format!("PKCS#8 encoding failed: {e}")))?;
        let content = format!(
            "PrivateKey {}\nKeyId {}\n",
            URL_SAFE_NO_PAD.encode(der.as_bytes()),
            self.kid
        );

        let tmp = self.state_file.with_extension("tmp");
        fs::write(&tmp, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&tmp, &self.state_file)?;
        Ok(())
    }

    /// Key identifier advertised in the JWK set.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Public half of the key as a JWK set.
    #[must_use]
    pub fn jwks(&self) -> JsonWebKeySet {
        let n = URL_SAFE_NO_PAD.encode(self.public_key.n().to_bytes_be());
        let e = URL_SAFE_NO_PAD.encode(self.public_key.e().to_bytes_be());

        JsonWebKeySet {
            keys: vec![JsonWebKey {
                kty: "RSA".to_string(),
                key_use: "sig".to_string(),
                kid: self.kid.clone(),
                alg: "RS256".to_string(),
                n,
                e,
            }],
        }
    }

    /// JWK set serialized for the `/.well-known/jwks.json` resource.
    pub fn jwks_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.jwks())?)
    }

    /// Encoding key for signing ID tokens (future extension).
    pub fn encoding_key(&self) -> Result<EncodingKey> {
        let pem = self
            .private_key
            .to_pkcs8_pem(rsa::pkcs8::LineEnding::LF)
            .map_err(|e| Error::Key(format!("PEM encoding failed: {e}")))?;
        EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| Error::Key(format!("Bad RSA PEM: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_state_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("authgate_keys_{name}.state"))
    }

    #[test]
    fn generate_then_reload_keeps_key_and_kid() {
        // GIVEN: a freshly generated and saved key
        let path = temp_state_path("reload");
        let _ = fs::remove_file(&path);
        let first = KeyManager::load_or_generate(&path).unwrap();

        // WHEN: the state file is loaded again
        let second = KeyManager::load_or_generate(&path).unwrap();

        // THEN: kid and public key survive the round trip
        assert_eq!(first.kid(), second.kid());
        assert_eq!(first.jwks().keys[0].n, second.jwks().keys[0].n);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn jwks_has_single_rs256_signing_key() {
        let path = temp_state_path("jwks");
        let manager = KeyManager::generate(&path, 2048).unwrap();

        let jwks = manager.jwks();
        assert_eq!(jwks.keys.len(), 1);
        let key = &jwks.keys[0];
        assert_eq!(key.kty, "RSA");
        assert_eq!(key.alg, "RS256");
        assert_eq!(key.key_use, "sig");
        assert!(!key.n.is_empty());
        // Standard RSA exponent 65537 → "AQAB"
        assert_eq!(key.e, "AQAB");
    }

    #[test]
    fn encoding_key_is_constructible() {
        let path = temp_state_path("enc");
        let manager = KeyManager::generate(&path, 2048).unwrap();
        assert!(manager.encoding_key().is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn state_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let path = temp_state_path("perms");
        let _ = fs::remove_file(&path);
        let manager = KeyManager::generate(&path, 2048).unwrap();
        manager.save().unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        let _ = fs::remove_file(&path);
    }
}
