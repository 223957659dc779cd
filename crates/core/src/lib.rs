//! Core domain types and shared logic for the wharf piece directory.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Piece metadata, index records, and flagged-piece state
//! - Deal records and the deal checkpoint lifecycle
//! - Peer identity
//! - Configuration
//! - Collaborator ports (deals database, sector accessor)

pub mod config;
pub mod deal;
pub mod error;
pub mod identity;
pub mod piece;
pub mod ports;

pub use config::AppConfig;
pub use deal::{Checkpoint, Deal, DealInfo};
pub use error::{Error, Result};
pub use identity::PeerId;
pub use piece::{FlagReason, FlaggedPiece, IndexError, OffsetSize, PieceInfo, Record};
pub use ports::{DealsDb, LegacyDealsSource, SectorAccessor, SectorReader};

/// First cursor handed out to a piece; values below are reserved for
/// system key prefixes.
pub const MIN_CURSOR: u64 = 100;

/// Piece metadata schema version written into new records.
pub const PIECE_INFO_VERSION: &str = "1";
