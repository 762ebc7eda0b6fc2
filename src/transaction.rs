//! The per-thread transaction state machine.
//!
//! A transaction speculates over a snapshot window `[start_time, end_time]`
//! of the global clock. Reads validate against versioned locks with a
//! load-value-reload sandwich and may extend the window over newer versions;
//! writes acquire slot ownership eagerly and buffer values until commit.
//! Commit draws a new clock value, revalidates the read set if anything
//! committed in between, publishes buffered values and releases each slot
//! with the new version. Any conflict aborts immediately and the caller
//! retries.

use std::collections::HashMap;
use std::sync::atomic::Ordering;

use tracing::{debug, trace};

use crate::access::{ReadAccess, WriteAccess};
use crate::error::StmError;
use crate::field::{TObject, Word, WordKind};
use crate::lock_table::is_owned;
use crate::Stm;

const READ_SET_CAPACITY: usize = 1024;
const WRITE_SET_CAPACITY: usize = 32;

/// Lifecycle of a transaction handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Idle,
    Active,
    Committed,
    Aborted,
}

/// A transaction bound to one [`Stm`] engine.
///
/// One handle per thread; a handle runs one attempt at a time and is reused
/// across retries via [`begin`](Transaction::begin). Objects touched by an
/// attempt must outlive it: buffered writes hold pointers into their word
/// storage until commit or rollback.
pub struct Transaction<'a> {
    stm: &'a Stm,
    /// Thread identity used in lock words. Assigned once per handle.
    id: u64,
    state: TxState,
    block_id: usize,
    /// Whether this attempt maintains a read set. False only when the
    /// read-only hint subsystem claims the block has never written.
    read_write_hint: bool,
    /// Scratch carried from `before_read_access` to `add_read_access`.
    read_slot: usize,
    read_lock: u64,
    start_time: u64,
    end_time: u64,
    read_set: Vec<ReadAccess>,
    write_set: HashMap<usize, WriteAccess>,
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        // A handle dropped mid-attempt (a panicking closure, usually) must
        // not leave slots locked forever.
        if self.state == TxState::Active {
            self.rollback();
        }
    }
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(stm: &'a Stm) -> Self {
        Self {
            stm,
            id: stm.next_thread_id(),
            state: TxState::Idle,
            block_id: 0,
            read_write_hint: true,
            read_slot: 0,
            read_lock: 0,
            start_time: 0,
            end_time: 0,
            read_set: Vec::with_capacity(READ_SET_CAPACITY),
            write_set: HashMap::with_capacity(WRITE_SET_CAPACITY),
        }
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    /// Start an attempt: clear both sets and snapshot the clock.
    pub fn begin(&mut self, block_id: usize) {
        debug_assert_ne!(self.state, TxState::Active, "begin while active");
        self.read_set.clear();
        self.write_set.clear();
        self.start_time = self.stm.clock.current();
        self.end_time = self.start_time;
        self.block_id = block_id;
        self.read_write_hint = if self.stm.config.read_only_hints {
            self.stm.hints.get(block_id)
        } else {
            true
        };
        self.state = TxState::Active;
        trace!(
            id = self.id,
            block_id,
            start_time = self.start_time,
            "begin transaction"
        );
    }

    /// First half of a read: hash the location and check its lock.
    ///
    /// The observed word is stashed for the paired
    /// [`add_read_access`](Transaction::add_read_access); the caller loads
    /// the field itself in between.
    pub fn before_read_access(&mut self, obj: &TObject, offset: u64) -> Result<(), StmError> {
        self.read_slot = self.stm.locks.slot(obj.base(), offset);
        let lock = self.stm.locks.check_lock(self.read_slot, self.id)?;
        if self.stm.config.read_locked && is_owned(lock) {
            return Err(StmError::LockedByOther);
        }
        self.read_lock = lock;
        Ok(())
    }

    /// Second half of a read. Returns the caller's program-visible `value`
    /// when the sandwich check proved it consistent, or the corrected value
    /// when the field had to be re-read or was pending in the write set.
    pub fn add_read_access<T: Word>(
        &mut self,
        obj: &TObject,
        value: T,
        offset: u64,
    ) -> Result<T, StmError> {
        match self.add_read_word(obj, offset)? {
            Some(word) => Ok(T::from_word(word)),
            None => Ok(value),
        }
    }

    /// Transactional read: both halves of the access protocol in one call.
    pub fn read<T: Word>(&mut self, obj: &TObject, offset: u64) -> Result<T, StmError> {
        self.before_read_access(obj, offset)?;
        let seen = obj.word(offset).load(Ordering::Acquire);
        match self.add_read_word(obj, offset)? {
            Some(word) => Ok(T::from_word(word)),
            None => Ok(T::from_word(seen)),
        }
    }

    /// Core of the read protocol. `None` means the caller's own observation
    /// stands; `Some` carries the value that replaces it.
    fn add_read_word(&mut self, obj: &TObject, offset: u64) -> Result<Option<u64>, StmError> {
        let base = obj.base();
        loop {
            if is_owned(self.read_lock) {
                // We already own the slot; serve our own pending write.
                let head = self
                    .write_set
                    .get(&self.read_slot)
                    .expect("owned slot without a write set entry");
                if let Some(write) = head.find(base, offset) {
                    return Ok(Some(write.pending));
                }
                // Not written by us. No read set entry is needed: holding
                // the slot until commit validates the observation implicitly.
                return Ok(None);
            }

            let mut value = None;
            while self.read_lock <= self.end_time {
                // Reload the lock word to close the sandwich.
                let lock = self.stm.locks.check_lock(self.read_slot, self.id)?;
                if lock != self.read_lock {
                    self.read_lock = lock;
                    value = Some(obj.word(offset).load(Ordering::Acquire));
                    continue;
                }
                // Observation is consistent within the snapshot.
                if self.read_write_hint {
                    self.read_set.push(ReadAccess {
                        base,
                        offset,
                        slot: self.read_slot,
                        lock,
                    });
                }
                return Ok(value);
            }

            // Version beyond the window: extension is the only way forward,
            // and is impossible on the read-only path (nothing to revalidate).
            if !(self.read_write_hint && self.extend()) {
                return Err(StmError::ExtendFailure);
            }
        }
    }

    /// Transactional write: buffer `value` for the location, acquiring the
    /// slot's lock on first touch.
    pub fn add_write_access<T: Word>(
        &mut self,
        obj: &TObject,
        value: T,
        offset: u64,
    ) -> Result<(), StmError> {
        self.add_write_word(obj, offset, value.into_word(), T::KIND)
    }

    /// Alias for [`add_write_access`](Transaction::add_write_access).
    pub fn write<T: Word>(&mut self, obj: &TObject, value: T, offset: u64) -> Result<(), StmError> {
        self.add_write_word(obj, offset, value.into_word(), T::KIND)
    }

    fn add_write_word(
        &mut self,
        obj: &TObject,
        offset: u64,
        pending: u64,
        kind: WordKind,
    ) -> Result<(), StmError> {
        if !self.read_write_hint {
            // Prove the hint wrong before aborting so the retry takes the
            // full read-write path.
            self.stm.hints.mark_read_write(self.block_id);
            debug!(id = self.id, block_id = self.block_id, "read-only hint failed");
            return Err(StmError::ReadOnlyHintFailure);
        }

        let base = obj.base();
        let slot = self.stm.locks.slot(base, offset);
        let prev = self.stm.locks.try_lock(slot, self.id)?;
        let access = WriteAccess::new(base, offset, obj.word(offset), kind, pending, prev);

        if is_owned(prev) {
            // Re-entry on a slot we already hold: coalesce into the chain.
            self.write_set
                .get_mut(&slot)
                .expect("owned slot without a write set entry")
                .coalesce(access);
            return Ok(());
        }

        if prev > self.end_time {
            // The location was committed past our snapshot. Fatal only if we
            // already read it; otherwise commit-time validation will demand
            // the extension.
            if self.read_set.iter().any(|r| r.matches(base, offset)) {
                self.stm.locks.set_and_release(slot, prev);
                return Err(StmError::WriteAfterReadFailure);
            }
        }

        self.write_set.insert(slot, access);
        Ok(())
    }

    /// Revalidate every recorded read against the lock table.
    fn validate(&self) -> bool {
        for read in &self.read_set {
            match self.stm.locks.check_lock(read.slot, self.id) {
                Ok(lock) => {
                    // A slot we own ourselves is a later write of ours and
                    // stays valid; a free slot must still carry the version
                    // we read under.
                    if !is_owned(lock) && lock != read.lock {
                        return false;
                    }
                }
                Err(_) => return false,
            }
        }
        true
    }

    /// Try to move `end_time` up to the current clock.
    fn extend(&mut self) -> bool {
        let now = self.stm.clock.current();
        if self.validate() {
            self.end_time = now;
            return true;
        }
        false
    }

    /// Commit the attempt. Read-only transactions succeed without touching
    /// the clock; writing transactions draw a new version, revalidate if any
    /// other commit interleaved, then publish and release slot by slot.
    ///
    /// Returns `false` after rolling back when validation fails.
    pub fn commit(&mut self) -> bool {
        if self.write_set.is_empty() {
            self.read_set.clear();
            self.state = TxState::Committed;
            trace!(id = self.id, "read-only commit");
            return true;
        }

        let new_clock = self.stm.clock.increment_and_get();
        // A clock that moved by exactly one means no other commit landed in
        // our window, so the read set cannot have been invalidated.
        if new_clock != self.start_time + 1 && !self.validate() {
            debug!(id = self.id, new_clock, "commit validation failed");
            self.rollback();
            return false;
        }

        for (slot, head) in &self.write_set {
            debug_assert!(!is_owned(head.prev_lock));
            let mut write = Some(head);
            while let Some(w) = write {
                w.write_back();
                write = w.next.as_deref();
            }
            // Release once per slot, after the whole chain is in memory.
            self.stm.locks.set_and_release(*slot, new_clock);
        }

        self.write_set.clear();
        self.read_set.clear();
        self.state = TxState::Committed;
        trace!(id = self.id, new_clock, "commit");
        true
    }

    /// Abort the attempt: restore every owned slot to the word it carried
    /// before this transaction locked it, and discard both sets.
    pub fn rollback(&mut self) {
        for (slot, head) in &self.write_set {
            debug_assert!(!is_owned(head.prev_lock));
            self.stm.locks.set_and_release(*slot, head.prev_lock);
        }
        self.write_set.clear();
        self.read_set.clear();
        self.state = TxState::Aborted;
        trace!(id = self.id, "rollback");
    }
}
