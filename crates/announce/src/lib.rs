//! Index announcement pipeline for the wharf piece directory.
//!
//! For every active piece the provider publishes a signed advertisement
//! to the network indexer declaring which multihashes it serves and
//! under which retrieval protocols. Advertisements chain into a linked
//! list; a provider-level extended-provider record can announce
//! additional retrieval endpoints (a block-exchange peer) signed by
//! their own keys. The deal binder resolves advertisement context ids
//! back to pieces for retrieval.

pub mod ad;
pub mod binder;
pub mod error;
pub mod keys;
pub mod metadata;
pub mod ports;
pub mod wrapper;

pub use ad::{AdBuilder, Advertisement, ExtendedProviderInfo};
pub use binder::DealBinder;
pub use error::{AnnounceError, AnnounceResult};
pub use keys::{HostIdentity, Keypair, PublicKey, SecretKey};
pub use metadata::{RetrievalProtocol, TransportMetadata};
pub use ports::{MeshCreator, MultihashLister, ProviderEngine};
pub use wrapper::{AnnounceSummary, Announcer, DealAnnounceFailure};
