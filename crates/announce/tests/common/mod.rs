//! Shared fixtures and mock collaborators for announcement tests.

use async_trait::async_trait;
use cid::Cid;
use cid::multihash::Multihash;
use integer_encoding::VarInt;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tempfile::TempDir;
use uuid::Uuid;
use wharf_announce::{
    Advertisement, AnnounceError, AnnounceResult, MeshCreator, MultihashLister, ProviderEngine,
    TransportMetadata,
};
use wharf_core::{
    Checkpoint, Deal, DealsDb, LegacyDealsSource, PeerId, Record, SectorAccessor, SectorReader,
};
use wharf_kv::RocksBackend;
use wharf_lid::LocalIndexDirectory;

pub fn block_cid(data: &[u8]) -> Cid {
    let digest = Sha256::digest(data);
    Cid::new_v1(0x55, Multihash::wrap(0x12, digest.as_slice()).unwrap())
}

/// Build a CARv1 payload plus the records a scan of it must produce.
pub fn build_car(blocks: &[&[u8]]) -> (Vec<u8>, Vec<Record>) {
    let header = b"test-car-header";
    let mut car = (header.len() as u64).encode_var_vec();
    car.extend_from_slice(header);

    let mut records = Vec::new();
    for block in blocks {
        let cid = block_cid(block);
        let cid_bytes = cid.to_bytes();
        let section_len = (cid_bytes.len() + block.len()) as u64;
        car.extend(section_len.encode_var_vec());
        let data_offset = (car.len() + cid_bytes.len()) as u64;
        car.extend_from_slice(&cid_bytes);
        car.extend_from_slice(block);
        records.push(Record::new(cid, data_offset, block.len() as u64));
    }
    (car, records)
}

pub fn make_deal(piece_cid: Cid, sector_id: u64, piece_length: u64, checkpoint: Checkpoint) -> Deal {
    Deal {
        deal_uuid: Uuid::new_v4(),
        signed_proposal_cid: block_cid(format!("proposal-{piece_cid}-{sector_id}").as_bytes()),
        piece_cid,
        is_legacy: false,
        chain_deal_id: sector_id * 1000,
        sector_id,
        piece_offset: 0,
        piece_length,
        checkpoint,
        fast_retrieval: true,
        verified: false,
    }
}

pub async fn open_lid() -> (TempDir, Arc<LocalIndexDirectory>) {
    let dir = TempDir::new().unwrap();
    let kv = Arc::new(RocksBackend::open(dir.path().join("lid")).unwrap());
    let lid = Arc::new(LocalIndexDirectory::open(kv).await.unwrap());
    (dir, lid)
}

/// Provider engine double with per-context-id idempotency.
pub struct MockEngine {
    advertised: Mutex<HashSet<Vec<u8>>>,
    published: Mutex<Vec<Advertisement>>,
    failing_context: Mutex<Option<Vec<u8>>>,
    lister: Mutex<Option<Arc<dyn MultihashLister>>>,
    pub notify_calls: AtomicUsize,
    pub publish_calls: AtomicUsize,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            advertised: Mutex::new(HashSet::new()),
            published: Mutex::new(Vec::new()),
            failing_context: Mutex::new(None),
            lister: Mutex::new(None),
            notify_calls: AtomicUsize::new(0),
            publish_calls: AtomicUsize::new(0),
        })
    }

    /// Make `notify_put` fail for one context id.
    pub fn fail_context(&self, context_id: Vec<u8>) {
        *self.failing_context.lock().unwrap() = Some(context_id);
    }

    pub fn published(&self) -> Vec<Advertisement> {
        self.published.lock().unwrap().clone()
    }

    pub fn lister(&self) -> Option<Arc<dyn MultihashLister>> {
        self.lister.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderEngine for MockEngine {
    async fn notify_put(
        &self,
        _provider: Option<PeerId>,
        context_id: &[u8],
        _metadata: TransportMetadata,
    ) -> AnnounceResult<Cid> {
        self.notify_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_context.lock().unwrap().as_deref() == Some(context_id) {
            return Err(AnnounceError::Engine("gossip publish failed".to_string()));
        }
        let mut advertised = self.advertised.lock().unwrap();
        if !advertised.insert(context_id.to_vec()) {
            return Err(AnnounceError::AlreadyAdvertised);
        }
        Ok(block_cid(context_id))
    }

    async fn get_latest_adv(&self) -> AnnounceResult<Option<(Cid, Advertisement)>> {
        let published = self.published.lock().unwrap();
        match published.last() {
            Some(ad) => Ok(Some((ad.cid()?, ad.clone()))),
            None => Ok(None),
        }
    }

    async fn publish(&self, ad: Advertisement) -> AnnounceResult<Cid> {
        self.publish_calls.fetch_add(1, Ordering::SeqCst);
        let cid = ad.cid()?;
        self.published.lock().unwrap().push(ad);
        Ok(cid)
    }

    fn register_multihash_lister(&self, lister: Arc<dyn MultihashLister>) {
        *self.lister.lock().unwrap() = Some(lister);
    }
}

/// Mesh double that can be told to fail.
pub struct MockMesh {
    pub connects: AtomicUsize,
    failing: AtomicBool,
}

impl MockMesh {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connects: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl MeshCreator for MockMesh {
    async fn connect(&self) -> AnnounceResult<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(AnnounceError::Engine("mesh unreachable".to_string()));
        }
        Ok(())
    }
}

/// Deals database backed by a fixed list.
pub struct MockDealsDb {
    deals: Vec<Deal>,
}

impl MockDealsDb {
    pub fn new(deals: Vec<Deal>) -> Arc<Self> {
        Arc::new(Self { deals })
    }
}

#[async_trait]
impl DealsDb for MockDealsDb {
    async fn list_active(&self) -> wharf_core::Result<Vec<Deal>> {
        Ok(self.deals.clone())
    }

    async fn by_signed_proposal_cid(&self, proposal_cid: Cid) -> wharf_core::Result<Option<Deal>> {
        Ok(self
            .deals
            .iter()
            .find(|d| d.signed_proposal_cid == proposal_cid)
            .cloned())
    }

    async fn by_chain_deal_id(&self, chain_deal_id: u64) -> wharf_core::Result<Option<Deal>> {
        Ok(self
            .deals
            .iter()
            .find(|d| d.chain_deal_id == chain_deal_id)
            .cloned())
    }
}

/// Legacy deals source backed by a proposal-cid map.
pub struct MockLegacySource {
    pieces: HashMap<Cid, Cid>,
}

impl MockLegacySource {
    pub fn new(pieces: HashMap<Cid, Cid>) -> Arc<Self> {
        Arc::new(Self { pieces })
    }
}

#[async_trait]
impl LegacyDealsSource for MockLegacySource {
    async fn piece_by_proposal_cid(&self, proposal_cid: Cid) -> wharf_core::Result<Option<Cid>> {
        Ok(self.pieces.get(&proposal_cid).copied())
    }
}

/// In-memory sector accessor serving canned sector bytes.
pub struct MockSectorAccessor {
    sectors: HashMap<u64, Vec<u8>>,
}

impl MockSectorAccessor {
    pub fn with_sector(sector_id: u64, bytes: Vec<u8>) -> Arc<Self> {
        let mut sectors = HashMap::new();
        sectors.insert(sector_id, bytes);
        Arc::new(Self { sectors })
    }
}

#[async_trait]
impl SectorAccessor for MockSectorAccessor {
    async fn is_unsealed(&self, _sector_id: u64, _offset: u64, _size: u64) -> wharf_core::Result<bool> {
        Ok(true)
    }

    async fn unseal_sector(
        &self,
        sector_id: u64,
        offset: u64,
        size: u64,
    ) -> wharf_core::Result<SectorReader> {
        let bytes = self
            .sectors
            .get(&sector_id)
            .ok_or_else(|| wharf_core::Error::NotFound(format!("sector {sector_id}")))?;
        let start = (offset as usize).min(bytes.len());
        let end = ((offset + size) as usize).min(bytes.len());
        Ok(Box::new(std::io::Cursor::new(bytes[start..end].to_vec())))
    }
}
