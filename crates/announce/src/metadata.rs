//! Retrieval-protocol metadata descriptors.
//!
//! Advertisement metadata is a sequence of protocol entries, each a
//! varint protocol tag followed by a CBOR payload. Tags reuse the
//! registered transport codes so indexers can dispatch without
//! decoding the payload.

use crate::error::{AnnounceError, AnnounceResult};
use cid::Cid;
use integer_encoding::VarInt;
use serde::{Deserialize, Serialize};

/// Transport tag for block-exchange retrieval.
const BLOCK_EXCHANGE_TAG: u64 = 0x0900;

/// Transport tag for sealed-piece retrieval over data transfer.
const PIECE_TRANSFER_TAG: u64 = 0x0910;

/// Payload of a piece-transfer metadata entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct PieceTransferPayload {
    piece_cid: Cid,
    fast_retrieval: bool,
    verified_deal: bool,
}

/// One retrieval protocol a provider serves a piece under.
#[derive(Clone, Debug, PartialEq)]
pub enum RetrievalProtocol {
    /// Sealed-piece retrieval over the data-transfer protocol.
    PieceTransfer {
        piece_cid: Cid,
        fast_retrieval: bool,
        verified_deal: bool,
    },
    /// Block exchange; carries no parameters.
    BlockExchange,
}

impl RetrievalProtocol {
    fn tag(&self) -> u64 {
        match self {
            RetrievalProtocol::PieceTransfer { .. } => PIECE_TRANSFER_TAG,
            RetrievalProtocol::BlockExchange => BLOCK_EXCHANGE_TAG,
        }
    }
}

/// The metadata attached to an advertisement: the protocols under which
/// the advertised multihashes are retrievable.
#[derive(Clone, Debug, PartialEq)]
pub struct TransportMetadata {
    protocols: Vec<RetrievalProtocol>,
}

impl TransportMetadata {
    /// Descriptor over the given protocols. Entries are encoded in
    /// ascending tag order.
    pub fn new(mut protocols: Vec<RetrievalProtocol>) -> Self {
        protocols.sort_by_key(|p| p.tag());
        Self { protocols }
    }

    pub fn protocols(&self) -> &[RetrievalProtocol] {
        &self.protocols
    }

    /// Binary encoding: `varint(tag) || cbor(payload)` per entry.
    pub fn encode(&self) -> AnnounceResult<Vec<u8>> {
        let mut buf = Vec::new();
        for protocol in &self.protocols {
            buf.extend(protocol.tag().encode_var_vec());
            match protocol {
                RetrievalProtocol::PieceTransfer {
                    piece_cid,
                    fast_retrieval,
                    verified_deal,
                } => {
                    let payload = PieceTransferPayload {
                        piece_cid: *piece_cid,
                        fast_retrieval: *fast_retrieval,
                        verified_deal: *verified_deal,
                    };
                    ciborium::into_writer(&payload, &mut buf)
                        .map_err(|e| AnnounceError::Serialization(e.to_string()))?;
                }
                RetrievalProtocol::BlockExchange => {}
            }
        }
        Ok(buf)
    }

    /// Decode a metadata blob back into protocol entries.
    pub fn decode(mut bytes: &[u8]) -> AnnounceResult<Self> {
        let mut protocols = Vec::new();
        while !bytes.is_empty() {
            let (tag, n) = u64::decode_var(bytes).ok_or_else(|| {
                AnnounceError::Serialization("truncated protocol tag".to_string())
            })?;
            bytes = &bytes[n..];
            match tag {
                BLOCK_EXCHANGE_TAG => protocols.push(RetrievalProtocol::BlockExchange),
                PIECE_TRANSFER_TAG => {
                    let mut cursor = std::io::Cursor::new(bytes);
                    let payload: PieceTransferPayload = ciborium::from_reader(&mut cursor)
                        .map_err(|e| AnnounceError::Serialization(e.to_string()))?;
                    bytes = &bytes[cursor.position() as usize..];
                    protocols.push(RetrievalProtocol::PieceTransfer {
                        piece_cid: payload.piece_cid,
                        fast_retrieval: payload.fast_retrieval,
                        verified_deal: payload.verified_deal,
                    });
                }
                other => {
                    return Err(AnnounceError::Serialization(format!(
                        "unknown protocol tag {other:#x}"
                    )));
                }
            }
        }
        Ok(Self { protocols })
    }
}
