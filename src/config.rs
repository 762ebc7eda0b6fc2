/// Runtime configuration, fixed at engine construction.
#[derive(Debug, Clone, Copy)]
pub struct StmConfig {
    /// Number of versioned lock slots. Must be a power of two; the location
    /// hash is reduced to a slot index by bitmask.
    pub lock_table_size: usize,
    /// Enable the per-block read-only hint optimization. Blocks that have
    /// never written skip read-set maintenance until a write proves the hint
    /// wrong.
    pub read_only_hints: bool,
    /// Treat any locked slot observed by a read as a conflict, including
    /// slots this transaction owns itself.
    pub read_locked: bool,
}

impl StmConfig {
    pub const DEFAULT_LOCK_TABLE_SIZE: usize = 1 << 20;

    pub const fn new() -> Self {
        Self {
            lock_table_size: Self::DEFAULT_LOCK_TABLE_SIZE,
            read_only_hints: false,
            read_locked: false,
        }
    }
}

impl Default for StmConfig {
    fn default() -> Self {
        Self::new()
    }
}
