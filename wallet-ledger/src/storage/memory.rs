//! In-memory store adapter
//!
//! Every transaction holds the store-wide mutex from `begin` until commit or
//! drop, so batches are trivially serializable. Lock waits are bounded; a
//! timeout surfaces as `StoreUnavailable` like a RocksDB lock timeout would.

use super::{
    window_from_end, BatchOp, ConsistentRead, KeyValueStore, SequenceWindow, StoreTransaction,
};
use crate::error::{Error, Result};
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::time::Duration;

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
struct MemoryState {
    records: HashMap<String, Vec<u8>>,
    sequences: HashMap<String, Vec<Vec<u8>>>,
}

impl MemoryState {
    fn apply(&mut self, op: BatchOp) {
        match op {
            BatchOp::Put { key, value } => {
                self.records.insert(key, value);
            }
            BatchOp::Append { key, entry } => {
                self.sequences.entry(key).or_default().push(entry);
            }
            BatchOp::Delete { key } => {
                self.records.remove(&key);
                self.sequences.remove(&key);
            }
        }
    }
}

/// Store adapter keeping everything in process memory
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    lock_timeout: Duration,
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Empty store with a custom lock wait bound
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            lock_timeout,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state.try_lock_for(self.lock_timeout).ok_or_else(|| {
            Error::StoreUnavailable(format!(
                "memory store lock not acquired within {:?}",
                self.lock_timeout
            ))
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.lock()?.records.get(key).cloned())
    }

    fn sequence_len(&self, key: &str) -> Result<u64> {
        Ok(self
            .lock()?
            .sequences
            .get(key)
            .map_or(0, |entries| entries.len() as u64))
    }

    fn read_sequence_range(
        &self,
        key: &str,
        start_from_end: u64,
        end_from_end: u64,
    ) -> Result<Vec<Vec<u8>>> {
        let state = self.lock()?;
        let Some(entries) = state.sequences.get(key) else {
            return Ok(Vec::new());
        };
        let range = window_from_end(entries.len() as u64, start_from_end, end_from_end);
        Ok(entries[range.start as usize..range.end as usize].to_vec())
    }

    fn read_sequence(&self, key: &str) -> Result<Vec<Vec<u8>>> {
        Ok(self.lock()?.sequences.get(key).cloned().unwrap_or_default())
    }

    fn read_consistent(
        &self,
        record_key: &str,
        sequence_key: &str,
        window: SequenceWindow,
    ) -> Result<ConsistentRead> {
        let state = self.lock()?;
        let record = state.records.get(record_key).cloned();
        let entries = match state.sequences.get(sequence_key) {
            Some(entries) => {
                let range = window.range(entries.len() as u64);
                entries[range.start as usize..range.end as usize].to_vec()
            }
            None => Vec::new(),
        };
        Ok((record, entries))
    }

    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>> {
        Ok(Box::new(MemoryTransaction { state: self.lock()? }))
    }
}

struct MemoryTransaction<'a> {
    state: MutexGuard<'a, MemoryState>,
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn get_for_update(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.state.records.get(key).cloned())
    }

    fn commit(mut self: Box<Self>, ops: Vec<BatchOp>) -> Result<()> {
        for op in ops {
            self.state.apply(op);
        }
        Ok(())
    }
}
