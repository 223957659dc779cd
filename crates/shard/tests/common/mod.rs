//! Shared fixtures and mock collaborators for shard tests.

use async_trait::async_trait;
use cid::Cid;
use cid::multihash::Multihash;
use integer_encoding::VarInt;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tempfile::TempDir;
use uuid::Uuid;
use wharf_core::{Checkpoint, Deal, DealsDb, Record, SectorAccessor, SectorReader};
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

/// In-memory sector accessor serving canned sector bytes.
pub struct MockSectorAccessor {
    sectors: HashMap<u64, Vec<u8>>,
    unsealed: AtomicBool,
    pub unseal_calls: AtomicUsize,
}

impl MockSectorAccessor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sectors: HashMap::new(),
            unsealed: AtomicBool::new(true),
            unseal_calls: AtomicUsize::new(0),
        })
    }

    pub fn with_sector(sector_id: u64, bytes: Vec<u8>) -> Arc<Self> {
        let mut sectors = HashMap::new();
        sectors.insert(sector_id, bytes);
        Arc::new(Self {
            sectors,
            unsealed: AtomicBool::new(true),
            unseal_calls: AtomicUsize::new(0),
        })
    }

    pub fn set_unsealed(&self, unsealed: bool) {
        self.unsealed.store(unsealed, Ordering::SeqCst);
    }
}

#[async_trait]
impl SectorAccessor for MockSectorAccessor {
    async fn is_unsealed(&self, _sector_id: u64, _offset: u64, _size: u64) -> wharf_core::Result<bool> {
        Ok(self.unsealed.load(Ordering::SeqCst))
    }

    async fn unseal_sector(
        &self,
        sector_id: u64,
        offset: u64,
        size: u64,
    ) -> wharf_core::Result<SectorReader> {
        self.unseal_calls.fetch_add(1, Ordering::SeqCst);
        if !self.unsealed.load(Ordering::SeqCst) {
            return Err(wharf_core::Error::External(format!(
                "sector {sector_id} has no unsealed copy"
            )));
        }
        let bytes = self
            .sectors
            .get(&sector_id)
            .ok_or_else(|| wharf_core::Error::NotFound(format!("sector {sector_id}")))?;
        let start = (offset as usize).min(bytes.len());
        let end = ((offset + size) as usize).min(bytes.len());
        Ok(Box::new(std::io::Cursor::new(bytes[start..end].to_vec())))
    }
}

/// Deals database backed by a fixed list.
pub struct MockDealsDb {
    deals: Vec<Deal>,
    pub list_calls: AtomicUsize,
}

impl MockDealsDb {
    pub fn new(deals: Vec<Deal>) -> Arc<Self> {
        Arc::new(Self {
            deals,
            list_calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl DealsDb for MockDealsDb {
    async fn list_active(&self) -> wharf_core::Result<Vec<Deal>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
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
