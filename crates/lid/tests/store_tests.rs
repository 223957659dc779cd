// Integration tests for the local index directory over the RocksDB backend.

use cid::Cid;
use cid::multihash::Multihash;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use time::OffsetDateTime;
use uuid::Uuid;
use wharf_core::{DealInfo, FlagReason, IndexError, OffsetSize, PieceInfo, Record};
use wharf_kv::RocksBackend;
use wharf_lid::{FlaggedMetadata, LidError, LocalIndexDirectory, PieceCheckTracker};

const SHA2_256: u64 = 0x12;
const RAW: u64 = 0x55;

fn block_cid(data: &[u8]) -> Cid {
    let digest = Sha256::digest(data);
    let mh = Multihash::wrap(SHA2_256, digest.as_slice()).unwrap();
    Cid::new_v1(RAW, mh)
}

fn dummy_deal() -> DealInfo {
    DealInfo {
        deal_uuid: Uuid::new_v4(),
        is_legacy: false,
        chain_deal_id: 1337,
        sector_id: 42,
        piece_offset: 0,
        piece_length: 2048,
        car_length: 1970,
    }
}

async fn open_dir() -> (TempDir, LocalIndexDirectory) {
    let dir = TempDir::new().unwrap();
    let kv = Arc::new(RocksBackend::open(dir.path().join("lid")).unwrap());
    let lid = LocalIndexDirectory::open(kv).await.unwrap();
    (dir, lid)
}

#[tokio::test]
async fn test_fresh_store_single_deal() {
    let (_dir, lid) = open_dir().await;

    let (cursor, prefix) = lid.next_cursor().await.unwrap();
    assert_eq!(cursor, 100);
    assert_eq!(prefix, "100/");

    let piece = block_cid(b"piece-p");
    let c1 = block_cid(b"block-1");

    let mut metadata = PieceInfo::new();
    metadata.cursor = cursor;
    lid.set_piece_cid_to_metadata(&piece, &metadata).await.unwrap();
    lid.set_next_cursor(cursor + 1).await.unwrap();

    let record = Record::new(c1, 0, 256);
    lid.add_index_record(&prefix, &record).await.unwrap();
    lid.set_multihashes_to_piece_cid(std::slice::from_ref(&record), &piece)
        .await
        .unwrap();

    let offset_size = lid.get_offset_size(&prefix, c1.hash()).await.unwrap();
    assert_eq!(offset_size, OffsetSize::new(0, 256));
    assert_eq!(
        lid.get_piece_cids_by_multihash(c1.hash()).await.unwrap(),
        vec![piece]
    );

    let (next, next_prefix) = lid.next_cursor().await.unwrap();
    assert_eq!(next, 101);
    assert_eq!(next_prefix, "101/");
}

#[tokio::test]
async fn test_cursor_survives_set_and_is_idempotently_initialized() {
    let (_dir, lid) = open_dir().await;

    // init_cursor ran in open(); running it again must not reset
    lid.set_next_cursor(250).await.unwrap();
    lid.init_cursor().await.unwrap();
    let (cursor, prefix) = lid.next_cursor().await.unwrap();
    assert_eq!(cursor, 250);
    assert_eq!(prefix, "250/");
}

#[tokio::test]
async fn test_shared_multihash_across_pieces() {
    let (_dir, lid) = open_dir().await;

    let p = block_cid(b"piece-p");
    let q = block_cid(b"piece-q");
    let shared = Record::new(block_cid(b"shared-block"), 0, 256);
    let only_p = Record::new(block_cid(b"only-in-p"), 256, 128);

    lid.add_index(&p, &[shared.clone(), only_p.clone()], true)
        .await
        .unwrap();
    lid.add_index(&q, std::slice::from_ref(&shared), true)
        .await
        .unwrap();

    let mut pieces = lid
        .get_piece_cids_by_multihash(shared.cid.hash())
        .await
        .unwrap();
    pieces.sort();
    let mut expected = vec![p, q];
    expected.sort();
    assert_eq!(pieces, expected);

    // p got cursor 100, q got 101
    assert_eq!(lid.get_piece_metadata(&p).await.unwrap().cursor, 100);
    assert_eq!(lid.get_piece_metadata(&q).await.unwrap().cursor, 101);

    // removing p leaves q's index and inversion entries intact
    lid.remove_piece_metadata(&p).await.unwrap();

    assert_eq!(
        lid.get_piece_cids_by_multihash(shared.cid.hash())
            .await
            .unwrap(),
        vec![q]
    );
    assert!(matches!(
        lid.get_offset_size("100/", shared.cid.hash()).await,
        Err(LidError::NotFound(_))
    ));
    assert_eq!(
        lid.get_offset_size("101/", shared.cid.hash()).await.unwrap(),
        OffsetSize::new(0, 256)
    );

    // no key mentions p anymore
    assert!(matches!(
        lid.get_piece_metadata(&p).await,
        Err(LidError::NotFound(_))
    ));
    assert!(matches!(
        lid.get_piece_cids_by_multihash(only_p.cid.hash()).await,
        Err(LidError::NotFound(_))
    ));
    assert_eq!(lid.list_pieces().await.unwrap(), vec![q]);
}

#[tokio::test]
async fn test_add_index_roundtrip() {
    let (_dir, lid) = open_dir().await;

    let piece = block_cid(b"piece");
    let records = vec![
        Record::new(block_cid(b"a"), 0, 100),
        Record::new(block_cid(b"b"), 100, 200),
        Record::new(block_cid(b"c"), 300, 300),
    ];

    assert!(!lid.is_indexed(&piece).await.unwrap());
    lid.add_index(&piece, &records, true).await.unwrap();
    assert!(lid.is_indexed(&piece).await.unwrap());
    assert!(lid.indexed_at(&piece).await.unwrap().is_some());

    let mut read_back = lid.get_index(&piece).await.unwrap();
    read_back.sort_by_key(|r| r.offset_size.offset);
    assert_eq!(read_back, records);

    for record in &records {
        let offset_size = lid
            .get_offset_size("100/", record.cid.hash())
            .await
            .unwrap();
        assert_eq!(offset_size, record.offset_size);
    }
}

#[tokio::test]
async fn test_empty_piece_is_legal() {
    let (_dir, lid) = open_dir().await;

    let piece = block_cid(b"empty-piece");
    lid.add_index(&piece, &[], true).await.unwrap();

    assert!(lid.is_indexed(&piece).await.unwrap());
    assert_eq!(lid.get_index(&piece).await.unwrap(), Vec::new());
    assert_eq!(lid.get_piece_metadata(&piece).await.unwrap().cursor, 100);
}

#[tokio::test]
async fn test_mark_index_errored_first_error_wins() {
    let (_dir, lid) = open_dir().await;

    let piece = block_cid(b"piece");
    lid.add_index(&piece, &[], false).await.unwrap();

    lid.mark_index_errored(
        &piece,
        IndexError {
            message: "root cause".to_string(),
            kind: "corrupt_index".to_string(),
        },
    )
    .await
    .unwrap();
    lid.mark_index_errored(
        &piece,
        IndexError {
            message: "transient".to_string(),
            kind: "timeout".to_string(),
        },
    )
    .await
    .unwrap();

    let error = lid.get_piece_metadata(&piece).await.unwrap().error.unwrap();
    assert_eq!(error.message, "root cause");
    assert_eq!(error.kind, "corrupt_index");
}

#[tokio::test]
async fn test_add_deal_for_piece_rejects_duplicates() {
    let (_dir, lid) = open_dir().await;

    let piece = block_cid(b"piece");
    let deal = dummy_deal();

    lid.add_deal_for_piece(&piece, deal.clone()).await.unwrap();
    assert!(matches!(
        lid.add_deal_for_piece(&piece, deal.clone()).await,
        Err(LidError::AlreadyExists(_))
    ));

    let second = DealInfo {
        deal_uuid: Uuid::new_v4(),
        ..deal.clone()
    };
    lid.add_deal_for_piece(&piece, second.clone()).await.unwrap();
    assert_eq!(lid.get_piece_metadata(&piece).await.unwrap().deals.len(), 2);

    // removing the last deal removes the metadata entirely
    lid.remove_deal_for_piece(&piece, deal.deal_uuid).await.unwrap();
    lid.remove_deal_for_piece(&piece, second.deal_uuid)
        .await
        .unwrap();
    assert!(matches!(
        lid.get_piece_metadata(&piece).await,
        Err(LidError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_set_multihashes_is_idempotent() {
    let (_dir, lid) = open_dir().await;

    let piece = block_cid(b"piece");
    let record = Record::new(block_cid(b"block"), 0, 64);

    lid.set_multihashes_to_piece_cid(std::slice::from_ref(&record), &piece)
        .await
        .unwrap();
    lid.set_multihashes_to_piece_cid(std::slice::from_ref(&record), &piece)
        .await
        .unwrap();

    assert_eq!(
        lid.get_piece_cids_by_multihash(record.cid.hash())
            .await
            .unwrap(),
        vec![piece]
    );
}

#[tokio::test]
async fn test_flagged_pieces_lifecycle() {
    let (_dir, lid) = open_dir().await;

    let p = block_cid(b"piece-p");
    let q = block_cid(b"piece-q");

    assert_eq!(lid.flagged_pieces_count().await.unwrap(), 0);

    lid.set_piece_cid_to_flagged(
        &p,
        FlaggedMetadata {
            created_at: OffsetDateTime::now_utc(),
            reason: FlagReason::Unseal,
        },
    )
    .await
    .unwrap();
    lid.set_piece_cid_to_flagged(
        &q,
        FlaggedMetadata {
            created_at: OffsetDateTime::now_utc(),
            reason: FlagReason::Index,
        },
    )
    .await
    .unwrap();

    assert_eq!(lid.flagged_pieces_count().await.unwrap(), 2);
    let flagged = lid.list_flagged_pieces().await.unwrap();
    assert_eq!(flagged.len(), 2);
    assert!(flagged.iter().any(|f| f.piece_cid == p && f.reason == FlagReason::Unseal));

    assert!(
        lid.get_piece_cid_to_flagged(&p).await.unwrap().is_some()
    );
    lid.delete_piece_cid_to_flagged(&p).await.unwrap();
    assert!(lid.get_piece_cid_to_flagged(&p).await.unwrap().is_none());
    assert_eq!(lid.flagged_pieces_count().await.unwrap(), 1);

    // clearing an absent flag is fine
    lid.delete_piece_cid_to_flagged(&p).await.unwrap();
}

#[tokio::test]
async fn test_remove_piece_metadata_clears_flag() {
    let (_dir, lid) = open_dir().await;

    let piece = block_cid(b"flagged-piece");
    let record = Record::new(block_cid(b"block"), 0, 64);
    lid.add_index(&piece, std::slice::from_ref(&record), true)
        .await
        .unwrap();
    lid.set_piece_cid_to_flagged(
        &piece,
        FlaggedMetadata {
            created_at: OffsetDateTime::now_utc(),
            reason: FlagReason::Unseal,
        },
    )
    .await
    .unwrap();

    lid.remove_piece_metadata(&piece).await.unwrap();

    // no key mentions the piece anymore, the flag included
    assert!(lid.get_piece_cid_to_flagged(&piece).await.unwrap().is_none());
    assert_eq!(lid.flagged_pieces_count().await.unwrap(), 0);
    assert!(matches!(
        lid.get_piece_metadata(&piece).await,
        Err(LidError::NotFound(_))
    ));
    assert!(matches!(
        lid.get_piece_cids_by_multihash(record.cid.hash()).await,
        Err(LidError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_unknown_multihash_is_not_found() {
    let (_dir, lid) = open_dir().await;
    let unknown = block_cid(b"never-indexed");
    assert!(matches!(
        lid.get_piece_cids_by_multihash(unknown.hash()).await,
        Err(LidError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_tracker_rotation_respects_check_period() {
    let (_dir, lid) = open_dir().await;

    let mut pieces = Vec::new();
    for i in 0..5u8 {
        let piece = block_cid(&[b'p', i]);
        lid.add_index(&piece, &[], true).await.unwrap();
        pieces.push(piece);
    }

    let period = Duration::from_millis(10);
    let mut tracker = PieceCheckTracker::new(period, 1024);

    let first = tracker
        .next_pieces_to_check(&lid, Instant::now())
        .await
        .unwrap();
    assert_eq!(first.len(), 5);
    for piece in &pieces {
        assert!(first.contains(piece));
    }

    // within the period nothing is due again
    let second = tracker
        .next_pieces_to_check(&lid, Instant::now())
        .await
        .unwrap();
    assert!(second.is_empty());

    tokio::time::sleep(2 * period).await;
    let third = tracker
        .next_pieces_to_check(&lid, Instant::now())
        .await
        .unwrap();
    assert_eq!(third.len(), 5);
}

#[tokio::test]
async fn test_concurrent_add_index_allocates_distinct_cursors() {
    let (_dir, lid) = open_dir().await;
    let lid = Arc::new(lid);

    let mut handles = Vec::new();
    for i in 0..8u8 {
        let lid = lid.clone();
        handles.push(tokio::spawn(async move {
            let piece = block_cid(&[b'c', i]);
            let record = Record::new(block_cid(&[b'b', i]), 0, 16);
            lid.add_index(&piece, std::slice::from_ref(&record), true)
                .await
                .unwrap();
            lid.get_piece_metadata(&piece).await.unwrap().cursor
        }));
    }

    let mut cursors = Vec::new();
    for handle in handles {
        cursors.push(handle.await.unwrap());
    }
    cursors.sort();
    cursors.dedup();
    assert_eq!(cursors.len(), 8, "cursors must never be shared");

    let (next, _) = lid.next_cursor().await.unwrap();
    assert_eq!(next, 108);
}
