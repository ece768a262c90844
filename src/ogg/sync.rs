// Page synchronizer
//
// Accumulates raw bytes in any chunking and hands out verified pages.
// Decisions about a candidate page are only taken once all of its bytes are
// buffered, so the sequence of pages produced does not depend on how the
// input was split.

use tracing::trace;

use crate::ogg::page::{Page, PageError};
use crate::ogg::OGG_SIGNATURE;

/// Outcome of one `next_page` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncResult {
    /// A complete, checksum-valid page
    Ready(Page),
    /// Not enough bytes buffered; submit more
    NeedMoreData,
    /// `skipped` bytes of unsynced or damaged data were discarded
    Corrupt { skipped: usize },
}

/// Accumulation buffer that turns a byte stream into Ogg pages
#[derive(Debug, Default)]
pub struct PageSynchronizer {
    buffer: Vec<u8>,
    // Start of unconsumed data in `buffer`
    start: usize,
    total_submitted: u64,
    total_skipped: u64,
}

impl PageSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of raw bytes
    pub fn submit(&mut self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }
        self.compact();
        self.buffer.extend_from_slice(chunk);
        self.total_submitted += chunk.len() as u64;
    }

    /// Try to extract the next page from the buffered bytes
    pub fn next_page(&mut self) -> SyncResult {
        let data = &self.buffer[self.start..];
        if data.is_empty() {
            return SyncResult::NeedMoreData;
        }

        match Page::parse(data) {
            Ok((page, used)) => {
                self.start += used;
                SyncResult::Ready(page)
            }
            Err(PageError::Incomplete { .. }) => SyncResult::NeedMoreData,
            Err(err) => {
                // Drop at least the first byte, then everything up to the next
                // place a capture pattern could begin.
                let skipped = resync_offset(data);
                trace!("dropping {} bytes: {}", skipped, err);
                self.start += skipped;
                self.total_skipped += skipped as u64;
                SyncResult::Corrupt { skipped }
            }
        }
    }

    /// Bytes buffered but not yet consumed
    pub fn buffered(&self) -> usize {
        self.buffer.len() - self.start
    }

    /// Total bytes ever submitted
    pub fn total_submitted(&self) -> u64 {
        self.total_submitted
    }

    /// Total bytes discarded as corrupt or unsynced
    pub fn total_skipped(&self) -> u64 {
        self.total_skipped
    }

    fn compact(&mut self) {
        if self.start == 0 {
            return;
        }
        if self.start == self.buffer.len() {
            self.buffer.clear();
        } else {
            self.buffer.drain(..self.start);
        }
        self.start = 0;
    }
}

/// Distance from the start of `data` to the next possible capture pattern.
///
/// Position 0 is never a candidate. A trailing partial "OggS" prefix counts
/// as a candidate so it can be completed by later input.
fn resync_offset(data: &[u8]) -> usize {
    (1..data.len())
        .find(|&pos| {
            let rest = &data[pos..];
            let prefix = rest.len().min(OGG_SIGNATURE.len());
            rest[..prefix] == OGG_SIGNATURE[..prefix]
        })
        .unwrap_or(data.len())
}
