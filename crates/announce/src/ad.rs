//! Advertisements and the extended-provider ad builder.

use crate::error::{AnnounceError, AnnounceResult};
use crate::keys::{Keypair, PublicKey};
use cid::Cid;
use cid::multihash::Multihash;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use wharf_core::PeerId;

const SHA2_256: u64 = 0x12;
const RAW_CODEC: u64 = 0x55;

/// An additional retrieval endpoint sharing the provider's catalog,
/// signed by its own key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtendedProviderInfo {
    pub peer_id: PeerId,
    pub addrs: Vec<String>,
    /// Transport metadata for this endpoint.
    pub metadata: Vec<u8>,
    /// Signature by the endpoint's key over its entry.
    pub signature: Vec<u8>,
}

impl ExtendedProviderInfo {
    fn signable_bytes(peer_id: &PeerId, addrs: &[String], metadata: &[u8]) -> AnnounceResult<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(&(peer_id, addrs, metadata), &mut buf)
            .map_err(|e| AnnounceError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Verify the entry signature against the endpoint's key.
    pub fn verify(&self, public_key: &PublicKey) -> AnnounceResult<()> {
        let bytes = Self::signable_bytes(&self.peer_id, &self.addrs, &self.metadata)?;
        public_key.verify(&bytes, &self.signature)
    }
}

/// A signed, chained record declaring that a provider serves a set of
/// multihashes under specified protocols.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Advertisement {
    /// Previous advertisement in the provider's chain.
    pub previous: Option<Cid>,
    /// The publishing provider.
    pub provider: PeerId,
    /// The provider's addresses.
    pub addrs: Vec<String>,
    /// Opaque identifier scoping this advertisement; empty for
    /// provider-level records.
    pub context_id: Vec<u8>,
    /// Encoded transport metadata.
    pub metadata: Vec<u8>,
    /// Additional retrieval endpoints sharing the catalog.
    pub extended_providers: Vec<ExtendedProviderInfo>,
    /// Signature by the provider's key.
    pub signature: Vec<u8>,
}

impl Advertisement {
    fn signable_bytes(&self) -> AnnounceResult<Vec<u8>> {
        let mut unsigned = self.clone();
        unsigned.signature = Vec::new();
        let mut buf = Vec::new();
        ciborium::into_writer(&unsigned, &mut buf)
            .map_err(|e| AnnounceError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// The advertisement's content address.
    pub fn cid(&self) -> AnnounceResult<Cid> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| AnnounceError::Serialization(e.to_string()))?;
        let digest = Sha256::digest(&buf);
        let mh = Multihash::wrap(SHA2_256, digest.as_slice())
            .map_err(|e| AnnounceError::Serialization(e.to_string()))?;
        Ok(Cid::new_v1(RAW_CODEC, mh))
    }

    /// Verify the top-level signature.
    pub fn verify(&self, public_key: &PublicKey) -> AnnounceResult<()> {
        public_key.verify(&self.signable_bytes()?, &self.signature)
    }
}

/// Builds and signs a provider-level advertisement, chaining it onto
/// the provider's advertisement list.
pub struct AdBuilder<'a> {
    provider: PeerId,
    keypair: &'a Keypair,
    addrs: Vec<String>,
    metadata: Vec<u8>,
    extended_providers: Vec<ExtendedProviderInfo>,
    last_ad: Option<Cid>,
}

impl<'a> AdBuilder<'a> {
    /// Start a builder for the host identified by `keypair`.
    pub fn new(keypair: &'a Keypair, addrs: Vec<String>) -> Self {
        Self {
            provider: keypair.peer_id(),
            keypair,
            addrs,
            metadata: Vec::new(),
            extended_providers: Vec::new(),
            last_ad: None,
        }
    }

    /// Attach generic transport metadata to the main provider.
    pub fn with_metadata(mut self, metadata: Vec<u8>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Attach an extended-provider entry, signing it with the
    /// endpoint's own key.
    pub fn with_extended_provider(
        mut self,
        peer_id: PeerId,
        addrs: Vec<String>,
        keypair: &Keypair,
        metadata: Vec<u8>,
    ) -> AnnounceResult<Self> {
        let bytes = ExtendedProviderInfo::signable_bytes(&peer_id, &addrs, &metadata)?;
        let signature = keypair.secret.sign(&bytes);
        self.extended_providers.push(ExtendedProviderInfo {
            peer_id,
            addrs,
            metadata,
            signature,
        });
        Ok(self)
    }

    /// Chain onto the provider's previous advertisement.
    pub fn with_last_ad(mut self, last_ad: Option<Cid>) -> Self {
        self.last_ad = last_ad;
        self
    }

    /// Sign the assembled advertisement with the host key.
    pub fn build_and_sign(self) -> AnnounceResult<Advertisement> {
        let mut ad = Advertisement {
            previous: self.last_ad,
            provider: self.provider,
            addrs: self.addrs,
            context_id: Vec::new(),
            metadata: self.metadata,
            extended_providers: self.extended_providers,
            signature: Vec::new(),
        };
        ad.signature = self.keypair.secret.sign(&ad.signable_bytes()?);
        Ok(ad)
    }
}
