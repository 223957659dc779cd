//! Ed25519 signing keys for advertisements.

use crate::error::{AnnounceError, AnnounceResult};
use base64::Engine;
use ed25519_dalek::{Signer as _, SigningKey, Verifier as _, VerifyingKey};
use std::fmt;
use std::path::Path;
use wharf_core::PeerId;

/// A secret (private) key for signing advertisements.
pub struct SecretKey {
    inner: SigningKey,
}

impl SecretKey {
    /// Generate a new random secret key.
    pub fn generate() -> Self {
        let mut rng = rand_core::OsRng;
        Self {
            inner: SigningKey::generate(&mut rng),
        }
    }

    /// Parse from the serialized key format: `name:base64(secret || public)`.
    pub fn from_key_string(s: &str) -> AnnounceResult<(String, Self)> {
        let (name, b64) = s.trim().split_once(':').ok_or_else(|| {
            AnnounceError::Validation("expected 'name:base64' key format".to_string())
        })?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(b64)
            .map_err(|e| AnnounceError::Validation(format!("invalid key base64: {e}")))?;

        if bytes.len() != 64 {
            return Err(AnnounceError::Validation(format!(
                "expected 64 key bytes, got {}",
                bytes.len()
            )));
        }

        let secret_bytes: [u8; 32] = bytes[..32]
            .try_into()
            .map_err(|_| AnnounceError::Validation("invalid secret key bytes".to_string()))?;

        Ok((
            name.to_string(),
            Self {
                inner: SigningKey::from_bytes(&secret_bytes),
            },
        ))
    }

    /// Encode as `name:base64(secret || public)`.
    pub fn to_key_string(&self, name: &str) -> String {
        let mut bytes = Vec::with_capacity(64);
        bytes.extend_from_slice(self.inner.as_bytes());
        bytes.extend_from_slice(self.inner.verifying_key().as_bytes());
        let b64 = base64::engine::general_purpose::STANDARD.encode(&bytes);
        format!("{name}:{b64}")
    }

    /// Get the corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            inner: self.inner.verifying_key(),
        }
    }

    /// Sign a message, returning the raw 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.inner.sign(message).to_bytes().to_vec()
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey([REDACTED])")
    }
}

/// A public key for verification.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    inner: VerifyingKey,
}

impl PublicKey {
    /// The peer id derived from this key.
    pub fn peer_id(&self) -> PeerId {
        let b64 = base64::engine::general_purpose::STANDARD_NO_PAD.encode(self.inner.as_bytes());
        PeerId::new(b64)
    }

    /// Verify a raw 64-byte signature over the message.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> AnnounceResult<()> {
        let sig_array: [u8; 64] = signature
            .try_into()
            .map_err(|_| AnnounceError::Signing("signature must be 64 bytes".to_string()))?;
        let signature = ed25519_dalek::Signature::from_bytes(&sig_array);
        self.inner
            .verify(message, &signature)
            .map_err(|_| AnnounceError::Signing("signature verification failed".to_string()))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b64 = base64::engine::general_purpose::STANDARD.encode(self.inner.as_bytes());
        write!(f, "PublicKey({}...)", &b64[..8])
    }
}

/// A named signing key pair.
pub struct Keypair {
    /// Key name (e.g. "provider-main", "bitswap").
    pub name: String,
    pub secret: SecretKey,
    pub public: PublicKey,
}

impl Keypair {
    /// Generate a new key pair with the given name.
    pub fn generate(name: impl Into<String>) -> Self {
        let secret = SecretKey::generate();
        let public = secret.public_key();
        Self {
            name: name.into(),
            secret,
            public,
        }
    }

    /// Parse from the serialized key format.
    pub fn from_key_string(s: &str) -> AnnounceResult<Self> {
        let (name, secret) = SecretKey::from_key_string(s)?;
        let public = secret.public_key();
        Ok(Self {
            name,
            secret,
            public,
        })
    }

    /// Load a key pair from a key file.
    pub fn load_from_file(path: impl AsRef<Path>) -> AnnounceResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_key_string(&contents)
    }

    /// The peer id of this key pair.
    pub fn peer_id(&self) -> PeerId {
        self.public.peer_id()
    }

    /// Encode the secret side as `name:base64(secret || public)`.
    pub fn to_key_string(&self) -> String {
        self.secret.to_key_string(&self.name)
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("name", &self.name)
            .field("public", &self.public)
            .finish()
    }
}

/// The host's identity on the retrieval network.
pub struct HostIdentity {
    /// The host's signing key.
    pub keypair: Keypair,
    /// The host's listen multiaddrs.
    pub addrs: Vec<String>,
}

impl HostIdentity {
    pub fn new(keypair: Keypair, addrs: Vec<String>) -> Self {
        Self { keypair, addrs }
    }

    /// The host's peer id.
    pub fn peer_id(&self) -> PeerId {
        self.keypair.peer_id()
    }
}
