//! Rotating piece-check tracker for the doctor.

use crate::error::LidResult;
use crate::store::LocalIndexDirectory;
use cid::Cid;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Slow-rolling scan position over the piece-metadata table.
///
/// Owns the ring offset and the per-piece last-check timestamps as plain
/// instance state. The tracker is meant to be driven by a single loop;
/// sharing one instance across tasks requires external synchronization.
pub struct PieceCheckTracker {
    /// Next scan position within the piece table.
    offset: usize,
    /// Last time each piece (by cid string) was handed out for checking.
    checked: HashMap<String, Instant>,
    /// Minimum interval between re-checks of the same piece.
    check_period: Duration,
    /// Maximum number of pieces scanned per call.
    batch_size: usize,
}

impl PieceCheckTracker {
    /// Create a tracker with the given re-check interval and batch size.
    pub fn new(check_period: Duration, batch_size: usize) -> Self {
        Self {
            offset: 0,
            checked: HashMap::new(),
            check_period,
            // A batch of one can never observe the end of the table.
            batch_size: batch_size.max(2),
        }
    }

    /// The next batch of pieces due for a health check.
    ///
    /// Scans up to `batch_size` pieces from the current offset and
    /// returns those whose last check is older than the check period.
    /// When the scan reaches the end of the table the offset wraps, so
    /// repeated calls cycle through every piece without ever returning
    /// one twice within the period.
    pub async fn next_pieces_to_check(
        &mut self,
        store: &LocalIndexDirectory,
        now: Instant,
    ) -> LidResult<Vec<Cid>> {
        let page = store.pieces_page(self.offset, self.batch_size).await?;
        let seen = page.len();

        let mut due = Vec::new();
        for piece_cid in page {
            let key = piece_cid.to_string();
            if let Some(last) = self.checked.get(&key) {
                let already_checked = *last > now - self.check_period;
                if already_checked {
                    continue;
                }
            }
            self.checked.insert(key, now);
            due.push(piece_cid);
        }
        self.offset += seen;

        // Fewer keys than the batch limit means the scan hit the end of
        // the table; wrap so the next call starts over.
        if seen < self.batch_size - 1 {
            self.offset = 0;
        }

        tracing::debug!(due = due.len(), offset = self.offset, "next pieces to check");
        Ok(due)
    }
}
