//! Word-based software transactional memory with 64-bit version locks.
//!
//! # Architecture
//!
//! This STM follows the lazy snapshot algorithm (LSA): every transaction
//! reads within a validated window of a global commit clock and enlarges
//! that window on demand instead of aborting on the first newer version.
//!
//! - **Reads**: optimistic. A read checks the location's versioned lock,
//!   loads the word, and rechecks the lock; a version beyond the window
//!   triggers snapshot extension (revalidate, then raise the bound).
//! - **Writes**: eager locking, lazy values. The writer takes exclusive
//!   ownership of the location's lock slot at write time but buffers the
//!   value until commit, so an abort only has to restore lock words.
//! - **Commit**: one atomic clock increment orders all writing commits;
//!   values are published before each slot is released with the new version,
//!   so no reader can observe a half-committed write set.
//! - **Read-only hints**: atomic blocks that have never written run a
//!   cheaper path that skips read-set bookkeeping until a write proves the
//!   hint wrong.
//!
//! All shared state lives in an explicitly constructed [`Stm`] engine so
//! each test or embedder owns its runtime.
//!
//! # Example
//!
//! ```
//! use lsa_stm::Stm;
//!
//! let stm = Stm::new();
//! let counter = stm.object(1);
//!
//! stm.atomically(0, |tx| {
//!     let n: u64 = tx.read(&counter, 0)?;
//!     tx.write(&counter, n + 1, 0)
//! });
//!
//! assert_eq!(counter.load::<u64>(0), 1);
//! ```

mod access;
mod clock;
mod config;
mod error;
mod field;
mod hints;
mod lock_table;
mod transaction;

pub use config::StmConfig;
pub use error::StmError;
pub use field::{TObject, Word, WordKind};
pub use transaction::{Transaction, TxState};

use std::sync::atomic::{AtomicU64, Ordering};

use clock::GlobalClock;
use hints::ReadWriteHints;
use lock_table::LockTable;

/// The STM engine: global clock, versioned lock table and read-only hints.
pub struct Stm {
    pub(crate) clock: GlobalClock,
    pub(crate) locks: LockTable,
    pub(crate) hints: ReadWriteHints,
    pub(crate) config: StmConfig,
    thread_ids: AtomicU64,
}

impl Stm {
    /// Create an engine with the default configuration.
    pub fn new() -> Self {
        Self::with_config(StmConfig::default())
    }

    /// Create an engine with an explicit configuration.
    ///
    /// Panics if the configured lock table size is not a power of two.
    pub fn with_config(config: StmConfig) -> Self {
        Self {
            clock: GlobalClock::new(),
            locks: LockTable::new(config.lock_table_size),
            hints: ReadWriteHints::new(),
            thread_ids: AtomicU64::new(0),
            config,
        }
    }

    /// Unique identifier among this engine's transaction handles.
    pub(crate) fn next_thread_id(&self) -> u64 {
        self.thread_ids.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Current value of the global commit clock.
    pub fn clock(&self) -> u64 {
        self.clock.current()
    }

    /// Hand out a transaction handle bound to this engine. One per thread;
    /// reuse it across attempts.
    pub fn transaction(&self) -> Transaction<'_> {
        Transaction::new(self)
    }

    /// Convenience constructor for a transactional object.
    pub fn object(&self, fields: usize) -> TObject {
        TObject::new(fields)
    }

    /// Execute a closure atomically, retrying until it commits.
    ///
    /// Any abort signal rolls the attempt back and reruns the closure; a
    /// failed commit-time validation does the same. Avoid side effects in
    /// the closure, it may run many times.
    ///
    /// # Example
    ///
    /// ```
    /// use lsa_stm::Stm;
    ///
    /// let stm = Stm::new();
    /// let pair = stm.object(2);
    ///
    /// let before = stm.atomically(0, |tx| {
    ///     let a: u64 = tx.read(&pair, 0)?;
    ///     let b: u64 = tx.read(&pair, 1)?;
    ///     tx.write(&pair, a + 1, 0)?;
    ///     tx.write(&pair, b + 1, 1)?;
    ///     Ok(a + b)
    /// });
    /// assert_eq!(before, 0);
    /// ```
    pub fn atomically<F, T>(&self, block_id: usize, mut f: F) -> T
    where
        F: FnMut(&mut Transaction) -> Result<T, StmError>,
    {
        let mut tx = self.transaction();
        loop {
            tx.begin(block_id);
            match f(&mut tx) {
                Ok(value) => {
                    if tx.commit() {
                        return value;
                    }
                    // Validation failed; commit already rolled back.
                }
                Err(err) => {
                    tracing::trace!(?err, "transaction aborted, retrying");
                    tx.rollback();
                }
            }
            std::thread::yield_now();
        }
    }
}

impl Default for Stm {
    fn default() -> Self {
        Self::new()
    }
}
