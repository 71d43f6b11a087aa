//! Store adapter contract
//!
//! The ledger treats its key-value store as an external transactional primitive.
//! Everything it needs is captured by [`KeyValueStore`]:
//!
//! - point reads of records (`get`, `exists`)
//! - reads of append-only sequences (`sequence_len`, `read_sequence_range`, `read_sequence`)
//! - an atomic unit: [`KeyValueStore::begin`] hands out a [`StoreTransaction`] whose
//!   `get_for_update` locks the key it reads, and whose `commit` applies an ordered
//!   batch of [`BatchOp`]s entirely or not at all
//!
//! # Key layout
//!
//! Keys are namespaced per wallet so two wallets never contend:
//!
//! - `wallet:{id}` - wallet record
//! - `wallet:{id}:tx` - transaction sequence
//!
//! # Adapters
//!
//! - [`RocksStore`] - RocksDB `TransactionDB`, pessimistic row locks
//! - [`MemoryStore`] - in-process map behind one mutex (tests, embedding)

use crate::Result;
use std::ops::Range;

mod memory;
mod rocks;

pub use memory::MemoryStore;
pub use rocks::RocksStore;

/// Per-wallet key names
pub mod keys {
    use uuid::Uuid;

    /// Key of the wallet record
    pub fn wallet(wallet_id: &Uuid) -> String {
        format!("wallet:{}", wallet_id)
    }

    /// Key of the wallet's transaction sequence
    pub fn history(wallet_id: &Uuid) -> String {
        format!("wallet:{}:tx", wallet_id)
    }
}

/// One write inside an atomic batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Set a record, replacing any previous value
    Put {
        /// Record key
        key: String,
        /// Encoded record
        value: Vec<u8>,
    },

    /// Append an entry to the end of a sequence (creating it if needed)
    Append {
        /// Sequence key
        key: String,
        /// Encoded entry
        entry: Vec<u8>,
    },

    /// Remove a key: the record and the sequence of that name, if any
    Delete {
        /// Record or sequence key
        key: String,
    },
}

/// Part of a sequence returned by a read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceWindow {
    /// Every entry
    All,
    /// Positions counted back from the newest (0 = newest), both inclusive
    FromEnd {
        /// Oldest position of the window
        start_from_end: u64,
        /// Newest position of the window
        end_from_end: u64,
    },
}

impl SequenceWindow {
    /// Insertion-order index range this window covers over `len` entries
    pub(crate) fn range(&self, len: u64) -> Range<u64> {
        match *self {
            SequenceWindow::All => 0..len,
            SequenceWindow::FromEnd {
                start_from_end,
                end_from_end,
            } => window_from_end(len, start_from_end, end_from_end),
        }
    }
}

/// A record and part of a sequence observed at the same point in time
pub type ConsistentRead = (Option<Vec<u8>>, Vec<Vec<u8>>);

/// An open atomic unit against the store
///
/// Dropping a transaction without committing rolls it back.
pub trait StoreTransaction {
    /// Read a record and hold its lock until commit or rollback
    fn get_for_update(&mut self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Apply `ops` in order as one indivisible write
    fn commit(self: Box<Self>, ops: Vec<BatchOp>) -> Result<()>;
}

/// Key-value store capability consumed by the ledger
pub trait KeyValueStore: Send + Sync {
    /// Adapter name, for logs
    fn name(&self) -> &'static str;

    /// Read a record
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Whether a record exists
    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Number of entries in a sequence (0 when absent)
    fn sequence_len(&self, key: &str) -> Result<u64>;

    /// Whether a sequence has any entries
    fn sequence_exists(&self, key: &str) -> Result<bool> {
        Ok(self.sequence_len(key)? > 0)
    }

    /// Entries between two positions counted back from the newest (0 = newest),
    /// both inclusive, returned oldest first and clamped to what exists
    fn read_sequence_range(
        &self,
        key: &str,
        start_from_end: u64,
        end_from_end: u64,
    ) -> Result<Vec<Vec<u8>>>;

    /// Every entry of a sequence, oldest first
    fn read_sequence(&self, key: &str) -> Result<Vec<Vec<u8>>>;

    /// Read a record and a window of a sequence from one point in time
    ///
    /// No batch committed in between can be half visible: both parts come from
    /// the same snapshot.
    fn read_consistent(
        &self,
        record_key: &str,
        sequence_key: &str,
        window: SequenceWindow,
    ) -> Result<ConsistentRead>;

    /// Open an atomic unit
    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>>;
}

/// Insertion-order index range covered by a from-the-end window over `len` entries
pub(crate) fn window_from_end(len: u64, start_from_end: u64, end_from_end: u64) -> Range<u64> {
    if len == 0 || end_from_end > start_from_end || end_from_end >= len {
        return 0..0;
    }
    let first = len - 1 - start_from_end.min(len - 1);
    let last_exclusive = len - end_from_end;
    first..last_exclusive
}
