use std::sync::Arc;

use crate::types::{Block, BlockId};

/// A read-only view of a session after an operation.
///
/// - `committed` is append-only between divergences; if nothing was promoted it is the very same
///   allocation as in the previous snapshot (see [`Snapshot::same_committed`]).
/// - `buffer` holds at most one block, which may still change on every write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub committed: Arc<[Block]>,
    pub buffer: Option<Block>,
    pub version: u64,
    /// Byte offset where the next incremental parse begins.
    pub cursor: usize,
    pub done: bool,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            committed: Arc::from(Vec::new()),
            buffer: None,
            version: 0,
            cursor: 0,
            done: false,
        }
    }
}

impl Snapshot {
    pub fn committed_blocks(&self) -> &[Block] {
        &self.committed
    }

    pub fn buffer_blocks(&self) -> &[Block] {
        self.buffer.as_slice()
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.committed.iter().chain(self.buffer.iter())
    }

    pub fn find(&self, id: BlockId) -> Option<&Block> {
        self.blocks().find(|b| b.id == id)
    }

    /// `true` if both snapshots share the same committed allocation.
    ///
    /// Renderers can skip re-rendering committed content when this holds.
    pub fn same_committed(&self, other: &Snapshot) -> bool {
        Arc::ptr_eq(&self.committed, &other.committed)
    }

    /// Blocks committed after `earlier`, or `None` if `earlier`'s committed blocks are not a
    /// prefix of this snapshot's (the text diverged or the session was reset in between).
    pub fn newly_committed_since(&self, earlier: &Snapshot) -> Option<&[Block]> {
        if self.same_committed(earlier) {
            return Some(&[]);
        }
        let seen = earlier.committed.len();
        if seen > self.committed.len() || self.committed[..seen] != earlier.committed[..] {
            return None;
        }
        Some(&self.committed[seen..])
    }
}
