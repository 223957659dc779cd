//! Local index directory store operations.

use crate::error::{LidError, LidResult};
use crate::keys;
use crate::locks::KeyedLocks;
use cid::Cid;
use cid::multihash::Multihash;
use integer_encoding::VarInt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;
use wharf_core::{
    DealInfo, FlagReason, FlaggedPiece, IndexError, MIN_CURSOR, OffsetSize, PieceInfo, Record,
};
use wharf_kv::{KvQuery, KvStore, WriteBatch};

/// Multicodec code for raw blocks; cids reconstructed from index keys
/// always use it because the key only preserves the multihash.
const RAW_CODEC: u64 = 0x55;

/// Value stored in the flagged-pieces table. The piece cid lives in the
/// key, not the value.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlaggedMetadata {
    pub created_at: OffsetDateTime,
    pub reason: FlagReason,
}

/// The local index directory over an ordered key-value store.
pub struct LocalIndexDirectory {
    kv: Arc<dyn KvStore>,
    /// Serializes cursor allocation so two registrations can never
    /// observe the same cursor.
    cursor_lock: Mutex<()>,
    /// Serializes read-modify-write cycles on inversion sets.
    mh_locks: KeyedLocks,
}

fn to_cbor<T: Serialize>(value: &T) -> LidResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| LidError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> LidResult<T> {
    ciborium::from_reader(bytes).map_err(|e| LidError::Serialization(e.to_string()))
}

fn encode_offset_size(offset_size: &OffsetSize) -> Vec<u8> {
    let mut buf = offset_size.offset.encode_var_vec();
    buf.extend(offset_size.size.encode_var_vec());
    buf
}

fn decode_offset_size(bytes: &[u8]) -> LidResult<OffsetSize> {
    let (offset, n) = u64::decode_var(bytes)
        .ok_or_else(|| LidError::CorruptIndex("truncated offset varint".to_string()))?;
    let (size, _) = u64::decode_var(&bytes[n..])
        .ok_or_else(|| LidError::CorruptIndex("truncated size varint".to_string()))?;
    Ok(OffsetSize { offset, size })
}

impl LocalIndexDirectory {
    /// Wrap a key-value store and initialize the cursor counter if the
    /// store is fresh.
    pub async fn open(kv: Arc<dyn KvStore>) -> LidResult<Self> {
        let dir = Self {
            kv,
            cursor_lock: Mutex::new(()),
            mh_locks: KeyedLocks::new(),
        };
        dir.init_cursor().await?;
        Ok(dir)
    }

    /// Initialize the next-cursor counter to [`MIN_CURSOR`]; idempotent.
    pub async fn init_cursor(&self) -> LidResult<()> {
        if self.kv.get(keys::NEXT_CURSOR_KEY).await?.is_some() {
            tracing::debug!("cursor counter already initialized");
            return Ok(());
        }
        tracing::debug!(cursor = MIN_CURSOR, "initializing cursor counter");
        self.set_next_cursor(MIN_CURSOR).await
    }

    /// Read the next free cursor and the key prefix it maps to.
    ///
    /// The counter is only advanced by [`Self::set_next_cursor`], which
    /// the caller invokes once the piece registration has committed.
    pub async fn next_cursor(&self) -> LidResult<(u64, String)> {
        let bytes = self
            .kv
            .get(keys::NEXT_CURSOR_KEY)
            .await?
            .ok_or(LidError::CursorNotInitialized)?;
        let (cursor, _) = u64::decode_var(&bytes).ok_or(LidError::CursorNotInitialized)?;
        Ok((cursor, keys::cursor_prefix(cursor)))
    }

    /// Persist the next free cursor.
    pub async fn set_next_cursor(&self, cursor: u64) -> LidResult<()> {
        self.kv
            .put(keys::NEXT_CURSOR_KEY, &cursor.encode_var_vec())
            .await?;
        Ok(())
    }

    async fn get_piece_cid_to_metadata(&self, piece_cid: &Cid) -> LidResult<Option<PieceInfo>> {
        match self.kv.get(&keys::piece_metadata_key(piece_cid)).await? {
            Some(bytes) => Ok(Some(from_cbor(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Store metadata for a piece.
    pub async fn set_piece_cid_to_metadata(
        &self,
        piece_cid: &Cid,
        metadata: &PieceInfo,
    ) -> LidResult<()> {
        self.kv
            .put(&keys::piece_metadata_key(piece_cid), &to_cbor(metadata)?)
            .await?;
        Ok(())
    }

    /// Fetch metadata for a piece.
    pub async fn get_piece_metadata(&self, piece_cid: &Cid) -> LidResult<PieceInfo> {
        self.get_piece_cid_to_metadata(piece_cid)
            .await?
            .ok_or_else(|| LidError::NotFound(format!("piece {piece_cid}")))
    }

    /// Whether the piece's index has been built. Absent pieces are
    /// simply not indexed.
    pub async fn is_indexed(&self, piece_cid: &Cid) -> LidResult<bool> {
        Ok(self
            .get_piece_cid_to_metadata(piece_cid)
            .await?
            .is_some_and(|md| md.is_indexed()))
    }

    /// When the piece's index was last built.
    pub async fn indexed_at(&self, piece_cid: &Cid) -> LidResult<Option<OffsetDateTime>> {
        Ok(self.get_piece_metadata(piece_cid).await?.indexed_at)
    }

    /// Bind a deal to a piece, creating metadata on first reference.
    ///
    /// Re-adding a deal that is already bound fails with already-exists.
    pub async fn add_deal_for_piece(&self, piece_cid: &Cid, deal: DealInfo) -> LidResult<()> {
        let mut metadata = self
            .get_piece_cid_to_metadata(piece_cid)
            .await?
            .unwrap_or_default();

        if metadata.deal(deal.deal_uuid).is_some() {
            return Err(LidError::AlreadyExists(format!(
                "deal {} for piece {piece_cid}",
                deal.deal_uuid
            )));
        }

        metadata.deals.push(deal);
        self.set_piece_cid_to_metadata(piece_cid, &metadata).await
    }

    /// Unbind a deal from a piece. Removing the last deal removes the
    /// piece's metadata and every derived entry.
    pub async fn remove_deal_for_piece(&self, piece_cid: &Cid, deal_uuid: Uuid) -> LidResult<()> {
        let mut metadata = self.get_piece_metadata(piece_cid).await?;

        if let Some(idx) = metadata.deals.iter().position(|d| d.deal_uuid == deal_uuid) {
            metadata.deals.swap_remove(idx);
        }

        if metadata.deals.is_empty() {
            return match self.remove_piece_metadata(piece_cid).await {
                // It was going away regardless.
                Err(LidError::NotFound(_)) => Ok(()),
                other => other,
            };
        }

        self.set_piece_cid_to_metadata(piece_cid, &metadata).await
    }

    /// Record an index error against a piece. Write-once: the first
    /// error wins so later transient failures cannot mask the root
    /// cause.
    pub async fn mark_index_errored(&self, piece_cid: &Cid, error: IndexError) -> LidResult<()> {
        let mut metadata = self.get_piece_metadata(piece_cid).await?;
        if metadata.error.is_some() {
            return Ok(());
        }
        metadata.error = Some(error);
        self.set_piece_cid_to_metadata(piece_cid, &metadata).await
    }

    /// The set of piece cids containing the given multihash.
    pub async fn get_piece_cids_by_multihash(&self, mh: &Multihash<64>) -> LidResult<Vec<Cid>> {
        let bytes = self
            .kv
            .get(&keys::multihash_key(mh))
            .await?
            .ok_or_else(|| LidError::NotFound(format!("multihash {}", keys::multihash_hex(mh))))?;
        from_cbor(&bytes)
    }

    /// Add the piece to each record's inversion set.
    ///
    /// Membership is idempotent: a piece already present in a set is
    /// left alone. All mutations commit in one batch, then the
    /// multihash prefix is synced.
    pub async fn set_multihashes_to_piece_cid(
        &self,
        records: &[Record],
        piece_cid: &Cid,
    ) -> LidResult<()> {
        let mh_keys: Vec<Vec<u8>> = records
            .iter()
            .map(|r| keys::multihash_key(r.cid.hash()))
            .collect();
        let _guards = self
            .mh_locks
            .lock_keys(mh_keys.iter().map(|k| k.as_slice()))
            .await;

        let mut batch = WriteBatch::new();
        for mh_key in &mh_keys {
            match self.kv.get(mh_key).await? {
                None => {
                    batch.put(mh_key.clone(), to_cbor(&vec![*piece_cid])?);
                }
                Some(bytes) => {
                    let mut pcids: Vec<Cid> = from_cbor(&bytes)?;
                    if pcids.contains(piece_cid) {
                        continue;
                    }
                    pcids.push(*piece_cid);
                    batch.put(mh_key.clone(), to_cbor(&pcids)?);
                }
            }
        }

        self.kv.write(batch).await?;
        self.kv.sync(keys::MULTIHASH_PREFIX.as_bytes()).await?;
        Ok(())
    }

    /// Write one index record under the given cursor prefix.
    pub async fn add_index_record(&self, cursor_prefix: &str, record: &Record) -> LidResult<()> {
        self.kv
            .put(
                &keys::index_record_key(cursor_prefix, record.cid.hash()),
                &encode_offset_size(&record.offset_size),
            )
            .await?;
        Ok(())
    }

    /// Look up a block's location within a piece by its multihash.
    pub async fn get_offset_size(
        &self,
        cursor_prefix: &str,
        mh: &Multihash<64>,
    ) -> LidResult<OffsetSize> {
        let bytes = self
            .kv
            .get(&keys::index_record_key(cursor_prefix, mh))
            .await?
            .ok_or_else(|| {
                LidError::NotFound(format!(
                    "record {cursor_prefix}{}",
                    keys::multihash_hex(mh)
                ))
            })?;
        decode_offset_size(&bytes)
    }

    /// All index records under a cursor, in key order.
    ///
    /// The scan is re-runnable; reconstructed cids are always
    /// `cidv1(raw, multihash)` because only the multihash survives in
    /// the key.
    pub async fn all_records(&self, cursor: u64) -> LidResult<Vec<Record>> {
        let prefix = keys::cursor_prefix(cursor);
        let pairs = self.kv.query(KvQuery::prefixed(prefix.clone())).await?;

        let mut records = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let segment = std::str::from_utf8(&pair.key[prefix.len()..])
                .map_err(|_| LidError::CorruptIndex("non-utf8 index key".to_string()))?;
            let mh = keys::multihash_from_hex(segment).ok_or_else(|| {
                LidError::CorruptIndex(format!("bad multihash segment '{segment}'"))
            })?;
            records.push(Record {
                cid: Cid::new_v1(RAW_CODEC, mh),
                offset_size: decode_offset_size(&pair.value)?,
            });
        }
        Ok(records)
    }

    /// Build or extend a piece's index in one call: allocate a cursor if
    /// needed, write the index records, then the inversion records, then
    /// stamp `indexed_at`.
    pub async fn add_index(
        &self,
        piece_cid: &Cid,
        records: &[Record],
        complete_index: bool,
    ) -> LidResult<()> {
        // Metadata (and cursor allocation) comes first; the allocation
        // and counter bump happen under one lock.
        let mut metadata = {
            let _guard = self.cursor_lock.lock().await;
            let mut metadata = self
                .get_piece_cid_to_metadata(piece_cid)
                .await?
                .unwrap_or_default();
            if metadata.cursor == 0 {
                let (cursor, _) = self.next_cursor().await?;
                metadata.cursor = cursor;
                metadata.complete_index = complete_index;
                self.set_piece_cid_to_metadata(piece_cid, &metadata).await?;
                self.set_next_cursor(cursor + 1).await?;
            }
            metadata
        };
        let cursor_prefix = keys::cursor_prefix(metadata.cursor);

        let mut batch = WriteBatch::new();
        for record in records {
            batch.put(
                keys::index_record_key(&cursor_prefix, record.cid.hash()),
                encode_offset_size(&record.offset_size),
            );
        }
        self.kv.write(batch).await?;

        self.set_multihashes_to_piece_cid(records, piece_cid).await?;

        metadata.indexed_at = Some(OffsetDateTime::now_utc());
        metadata.complete_index = complete_index;
        self.set_piece_cid_to_metadata(piece_cid, &metadata).await
    }

    /// The full index of a piece.
    pub async fn get_index(&self, piece_cid: &Cid) -> LidResult<Vec<Record>> {
        let metadata = self.get_piece_metadata(piece_cid).await?;
        self.all_records(metadata.cursor).await
    }

    /// Count index records under a cursor, scanning keys only and
    /// stopping at `limit`.
    pub async fn count_index_records(&self, cursor: u64, limit: usize) -> LidResult<usize> {
        let prefix = keys::cursor_prefix(cursor);
        let pairs = self
            .kv
            .query(KvQuery::prefixed(prefix).keys_only().limit(limit))
            .await?;
        Ok(pairs.len())
    }

    /// Remove a piece's metadata and everything derived from it,
    /// including its flagged entry. After this returns no key mentions
    /// the piece.
    ///
    /// The index and inversion entries are removed first; if that fails
    /// the metadata stays so the caller can retry with the cursor
    /// intact.
    pub async fn remove_piece_metadata(&self, piece_cid: &Cid) -> LidResult<()> {
        let metadata = self.get_piece_metadata(piece_cid).await?;
        self.remove_indexes(metadata.cursor, piece_cid).await?;
        self.kv.delete(&keys::piece_metadata_key(piece_cid)).await?;
        self.delete_piece_cid_to_flagged(piece_cid).await?;
        Ok(())
    }

    /// Remove every index record under the cursor, dropping the piece
    /// from each record's inversion set (and the set itself when it
    /// empties). All mutations commit in one batch.
    pub async fn remove_indexes(&self, cursor: u64, piece_cid: &Cid) -> LidResult<()> {
        let prefix = keys::cursor_prefix(cursor);
        let pairs = self
            .kv
            .query(KvQuery::prefixed(prefix.clone()).keys_only())
            .await?;

        let mut entries = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let segment = std::str::from_utf8(&pair.key[prefix.len()..])
                .map_err(|_| LidError::CorruptIndex("non-utf8 index key".to_string()))?;
            let mh = keys::multihash_from_hex(segment).ok_or_else(|| {
                LidError::CorruptIndex(format!("bad multihash segment '{segment}'"))
            })?;
            entries.push((pair.key, keys::multihash_key(&mh)));
        }

        let _guards = self
            .mh_locks
            .lock_keys(entries.iter().map(|(_, mh_key)| mh_key.as_slice()))
            .await;

        let mut batch = WriteBatch::new();
        for (record_key, mh_key) in &entries {
            if let Some(bytes) = self.kv.get(mh_key).await? {
                let mut pcids: Vec<Cid> = from_cbor(&bytes)?;
                if let Some(idx) = pcids.iter().position(|c| c == piece_cid) {
                    pcids.swap_remove(idx);
                    if pcids.is_empty() {
                        batch.delete(mh_key.clone());
                    } else {
                        batch.put(mh_key.clone(), to_cbor(&pcids)?);
                    }
                }
            }
            batch.delete(record_key.clone());
        }

        self.kv.write(batch).await?;
        Ok(())
    }

    /// All known piece cids, in key order.
    pub async fn list_pieces(&self) -> LidResult<Vec<Cid>> {
        let pairs = self
            .kv
            .query(KvQuery::prefixed(keys::PIECE_METADATA_PREFIX).keys_only())
            .await?;
        pairs
            .iter()
            .map(|pair| {
                keys::piece_cid_from_key(&pair.key, keys::PIECE_METADATA_PREFIX)
                    .ok_or_else(|| LidError::CorruptIndex("bad piece metadata key".to_string()))
            })
            .collect()
    }

    /// One page of known piece cids, in key order. Returns up to `limit`
    /// entries starting at `offset`.
    pub(crate) async fn pieces_page(&self, offset: usize, limit: usize) -> LidResult<Vec<Cid>> {
        let pairs = self
            .kv
            .query(
                KvQuery::prefixed(keys::PIECE_METADATA_PREFIX)
                    .keys_only()
                    .offset(offset)
                    .limit(limit),
            )
            .await?;
        pairs
            .iter()
            .map(|pair| {
                keys::piece_cid_from_key(&pair.key, keys::PIECE_METADATA_PREFIX)
                    .ok_or_else(|| LidError::CorruptIndex("bad piece metadata key".to_string()))
            })
            .collect()
    }

    /// Flag a piece as problematic.
    pub async fn set_piece_cid_to_flagged(
        &self,
        piece_cid: &Cid,
        metadata: FlaggedMetadata,
    ) -> LidResult<()> {
        self.kv
            .put(&keys::flagged_key(piece_cid), &to_cbor(&metadata)?)
            .await?;
        Ok(())
    }

    /// Fetch a piece's flag, if any.
    pub async fn get_piece_cid_to_flagged(
        &self,
        piece_cid: &Cid,
    ) -> LidResult<Option<FlaggedMetadata>> {
        match self.kv.get(&keys::flagged_key(piece_cid)).await? {
            Some(bytes) => Ok(Some(from_cbor(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Clear a piece's flag. Clearing an absent flag is not an error.
    pub async fn delete_piece_cid_to_flagged(&self, piece_cid: &Cid) -> LidResult<()> {
        self.kv.delete(&keys::flagged_key(piece_cid)).await?;
        Ok(())
    }

    /// All flagged pieces, in key order.
    pub async fn list_flagged_pieces(&self) -> LidResult<Vec<FlaggedPiece>> {
        let pairs = self
            .kv
            .query(KvQuery::prefixed(keys::FLAGGED_PREFIX))
            .await?;

        let mut flagged = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let piece_cid = keys::piece_cid_from_key(&pair.key, keys::FLAGGED_PREFIX)
                .ok_or_else(|| LidError::CorruptIndex("bad flagged piece key".to_string()))?;
            let metadata: FlaggedMetadata = from_cbor(&pair.value)?;
            flagged.push(FlaggedPiece {
                piece_cid,
                created_at: metadata.created_at,
                reason: metadata.reason,
            });
        }
        Ok(flagged)
    }

    /// Number of flagged pieces.
    pub async fn flagged_pieces_count(&self) -> LidResult<usize> {
        let pairs = self
            .kv
            .query(KvQuery::prefixed(keys::FLAGGED_PREFIX).keys_only())
            .await?;
        Ok(pairs.len())
    }
}
