use core::fmt;

/// Abort signals raised by transactional reads and writes.
///
/// Every variant is non-fatal: the transaction releases whatever it holds and
/// the caller retries from `begin`. Commit-time validation failure is reported
/// through [`Transaction::commit`](crate::Transaction::commit) returning
/// `false` rather than through this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StmError {
    /// A read or write observed a slot owned by another thread.
    LockedByOther,
    /// A read saw a version beyond the snapshot window and the snapshot could
    /// not be extended over it.
    ExtendFailure,
    /// A write hit a location this transaction already read, after another
    /// thread committed a newer version of it.
    WriteAfterReadFailure,
    /// The first write in a transaction that started on the read-only path.
    /// The block's hint has been flipped; the retry takes the full path.
    ReadOnlyHintFailure,
}

impl fmt::Display for StmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StmError::LockedByOther => {
                write!(f, "slot is locked by another thread")
            }
            StmError::ExtendFailure => {
                write!(f, "failed to extend snapshot over a newer version")
            }
            StmError::WriteAfterReadFailure => {
                write!(f, "write to a location read under an older version")
            }
            StmError::ReadOnlyHintFailure => {
                write!(f, "write attempted on the read-only path")
            }
        }
    }
}

impl std::error::Error for StmError {}
