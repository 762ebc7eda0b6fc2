use dashmap::DashMap;

/// Process-wide read-only hints keyed by atomic-block id.
///
/// A block starts read-only; the first write attempted by any thread running
/// it flips the marker to read-write, permanently. Readers may observe a
/// stale `false` for a moment, which costs them at most one spurious abort
/// before the retry picks up the flipped marker.
pub(crate) struct ReadWriteHints {
    markers: DashMap<usize, bool>,
}

impl ReadWriteHints {
    pub(crate) fn new() -> Self {
        Self {
            markers: DashMap::new(),
        }
    }

    /// Whether the block is known to write. Unknown blocks report `false`.
    pub(crate) fn get(&self, block_id: usize) -> bool {
        self.markers.get(&block_id).map(|m| *m).unwrap_or(false)
    }

    /// Mark the block as read-write. Idempotent.
    pub(crate) fn mark_read_write(&self, block_id: usize) {
        self.markers.insert(block_id, true);
    }
}
