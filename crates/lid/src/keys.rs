//! Key layout of the local index directory.
//!
//! All entries share one ordered keyspace, disambiguated by a leading
//! varint-encoded prefix byte. This layout is a compatibility contract:
//! it must stay byte-for-byte stable so new builds coexist with data
//! written by older ones.
//!
//! - `\x00`: the next-cursor counter (single key)
//! - `\x01/<pieceCid>`: piece metadata
//! - `\x02<multihashHex>`: multihash to piece cids inversion set
//! - `\x03/<pieceCid>`: flagged piece metadata
//! - `<cursorDecimal>/<multihashHex>`: per-piece index records
//!
//! Cursors start at 100, so decimal cursor prefixes (`"100/"`, ...)
//! never collide with the low system prefixes.

use cid::Cid;
use cid::multihash::Multihash;

/// Key holding the next cursor to allocate.
pub const NEXT_CURSOR_KEY: &[u8] = b"\x00";

/// Prefix of the piece-metadata table.
pub const PIECE_METADATA_PREFIX: &str = "\u{1}/";

/// Prefix of the multihash inversion table.
pub const MULTIHASH_PREFIX: &str = "\u{2}";

/// Prefix of the flagged-pieces table.
pub const FLAGGED_PREFIX: &str = "\u{3}/";

/// Hex encoding of a multihash as used in key segments.
pub fn multihash_hex(mh: &Multihash<64>) -> String {
    hex::encode(mh.to_bytes())
}

/// Parse the hex multihash segment of a key.
pub fn multihash_from_hex(segment: &str) -> Option<Multihash<64>> {
    let bytes = hex::decode(segment).ok()?;
    Multihash::from_bytes(&bytes).ok()
}

/// Key of a piece's metadata entry.
pub fn piece_metadata_key(piece_cid: &Cid) -> Vec<u8> {
    format!("{PIECE_METADATA_PREFIX}{piece_cid}").into_bytes()
}

/// Key of a multihash's inversion set.
pub fn multihash_key(mh: &Multihash<64>) -> Vec<u8> {
    format!("{MULTIHASH_PREFIX}{}", multihash_hex(mh)).into_bytes()
}

/// Key of a piece's flagged entry.
pub fn flagged_key(piece_cid: &Cid) -> Vec<u8> {
    format!("{FLAGGED_PREFIX}{piece_cid}").into_bytes()
}

/// The key namespace under which a piece's index records live.
pub fn cursor_prefix(cursor: u64) -> String {
    format!("{cursor}/")
}

/// Key of one index record.
pub fn index_record_key(cursor_prefix: &str, mh: &Multihash<64>) -> Vec<u8> {
    format!("{cursor_prefix}{}", multihash_hex(mh)).into_bytes()
}

/// Recover the piece cid from a metadata or flagged key.
pub fn piece_cid_from_key(key: &[u8], prefix: &str) -> Option<Cid> {
    let rest = key.strip_prefix(prefix.as_bytes())?;
    let s = std::str::from_utf8(rest).ok()?;
    s.parse().ok()
}
