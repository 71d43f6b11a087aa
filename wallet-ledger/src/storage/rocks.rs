//! RocksDB store adapter
//!
//! # Column Families
//!
//! - `records` - Wallet records (key: `wallet:{id}`)
//! - `sequences` - Transaction sequences. The sequence key holds the entry count
//!   (u64, big-endian); entry `i` lives at `{key}#{i as u64 big-endian}`
//!
//! Atomicity comes from a pessimistic `TransactionDB`: `get_for_update` takes an
//! exclusive row lock held until commit, so read-modify-write sequences on one
//! wallet serialize inside RocksDB. Lock waits are bounded by `lock_timeout_ms`.

use super::{BatchOp, ConsistentRead, KeyValueStore, SequenceWindow, StoreTransaction};
use crate::{
    error::{Error, Result},
    LedgerConfig,
};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Options, SingleThreaded, SnapshotWithThreadMode,
    Transaction, TransactionDB, TransactionDBOptions, TransactionOptions, WriteOptions,
};
use std::sync::Arc;

/// Column family names
const CF_RECORDS: &str = "records";
const CF_SEQUENCES: &str = "sequences";

/// Separator between a sequence key and an entry index
const ENTRY_SEPARATOR: u8 = b'#';

type Db = TransactionDB<SingleThreaded>;
type Snapshot<'a> = SnapshotWithThreadMode<'a, Db>;

/// Store adapter backed by RocksDB
pub struct RocksStore {
    db: Arc<Db>,
}

impl RocksStore {
    /// Open or create database
    pub fn open(config: &LedgerConfig) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        // Database options
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let mut txn_db_opts = TransactionDBOptions::default();
        txn_db_opts.set_txn_lock_timeout(config.rocksdb.lock_timeout_ms);
        txn_db_opts.set_default_lock_timeout(config.rocksdb.lock_timeout_ms);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_RECORDS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_SEQUENCES, Self::cf_options_sequences()),
        ];

        let db = Db::open_cf_descriptors(&db_opts, &txn_db_opts, path, cf_descriptors)?;

        tracing::info!(
            path = ?path,
            lock_timeout_ms = config.rocksdb.lock_timeout_ms,
            "Opened RocksDB wallet store"
        );

        Ok(Self { db: Arc::new(db) })
    }

    // Column family options

    fn cf_options_records() -> Options {
        let mut opts = Options::default();
        // Records are read on every operation, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_options_sequences() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    // Helper: get column family handle

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::StoreUnavailable(format!("Column family {} not found", name)))
    }

    // Sequence key helpers

    fn entry_key(key: &str, index: u64) -> Vec<u8> {
        let mut entry = Vec::with_capacity(key.len() + 9);
        entry.extend_from_slice(key.as_bytes());
        entry.push(ENTRY_SEPARATOR);
        entry.extend_from_slice(&index.to_be_bytes());
        entry
    }

    fn decode_len(raw: Option<Vec<u8>>) -> Result<u64> {
        match raw {
            None => Ok(0),
            Some(bytes) => {
                let arr: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    Error::StoreUnavailable(format!(
                        "Corrupt sequence length ({} bytes)",
                        bytes.len()
                    ))
                })?;
                Ok(u64::from_be_bytes(arr))
            }
        }
    }

    /// Length and entries of a sequence, both read from `snapshot`
    fn read_window(
        &self,
        snapshot: &Snapshot<'_>,
        key: &str,
        window: SequenceWindow,
    ) -> Result<Vec<Vec<u8>>> {
        let cf = self.cf_handle(CF_SEQUENCES)?;
        let len = Self::decode_len(snapshot.get_cf(cf, key.as_bytes())?)?;
        let range = window.range(len);

        let mut entries = Vec::with_capacity((range.end - range.start) as usize);
        for index in range {
            let value = snapshot
                .get_cf(cf, Self::entry_key(key, index))?
                .ok_or_else(|| {
                    Error::StoreUnavailable(format!("Sequence {} is missing entry {}", key, index))
                })?;
            entries.push(value);
        }
        Ok(entries)
    }

    /// Close database (graceful shutdown)
    pub fn close(self) -> Result<()> {
        drop(self.db);
        tracing::info!("RocksDB closed gracefully");
        Ok(())
    }
}

impl KeyValueStore for RocksStore {
    fn name(&self) -> &'static str {
        "rocksdb"
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let cf = self.cf_handle(CF_RECORDS)?;
        Ok(self.db.get_cf(cf, key.as_bytes())?)
    }

    fn sequence_len(&self, key: &str) -> Result<u64> {
        let cf = self.cf_handle(CF_SEQUENCES)?;
        Self::decode_len(self.db.get_cf(cf, key.as_bytes())?)
    }

    fn read_sequence_range(
        &self,
        key: &str,
        start_from_end: u64,
        end_from_end: u64,
    ) -> Result<Vec<Vec<u8>>> {
        let window = SequenceWindow::FromEnd {
            start_from_end,
            end_from_end,
        };
        self.read_window(&self.db.snapshot(), key, window)
    }

    fn read_sequence(&self, key: &str) -> Result<Vec<Vec<u8>>> {
        self.read_window(&self.db.snapshot(), key, SequenceWindow::All)
    }

    fn read_consistent(
        &self,
        record_key: &str,
        sequence_key: &str,
        window: SequenceWindow,
    ) -> Result<ConsistentRead> {
        let snapshot = self.db.snapshot();
        let record = snapshot.get_cf(self.cf_handle(CF_RECORDS)?, record_key.as_bytes())?;
        let entries = self.read_window(&snapshot, sequence_key, window)?;
        Ok((record, entries))
    }

    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>> {
        let write_opts = WriteOptions::default();
        let txn_opts = TransactionOptions::default();
        let txn = self.db.transaction_opt(&write_opts, &txn_opts);
        Ok(Box::new(RocksTransaction { store: self, txn }))
    }
}

/// Pessimistic RocksDB transaction
struct RocksTransaction<'a> {
    store: &'a RocksStore,
    txn: Transaction<'a, Db>,
}

impl RocksTransaction<'_> {
    fn locked_len(&self, cf: &ColumnFamily, key: &str) -> Result<u64> {
        RocksStore::decode_len(self.txn.get_for_update_cf(cf, key.as_bytes(), true)?)
    }
}

impl StoreTransaction for RocksTransaction<'_> {
    fn get_for_update(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        let cf = self.store.cf_handle(CF_RECORDS)?;
        Ok(self.txn.get_for_update_cf(cf, key.as_bytes(), true)?)
    }

    fn commit(self: Box<Self>, ops: Vec<BatchOp>) -> Result<()> {
        let store = self.store;
        let cf_records = store.cf_handle(CF_RECORDS)?;
        let cf_sequences = store.cf_handle(CF_SEQUENCES)?;

        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    self.txn.put_cf(cf_records, key.as_bytes(), value)?;
                }
                BatchOp::Append { key, entry } => {
                    let len = self.locked_len(cf_sequences, &key)?;
                    self.txn
                        .put_cf(cf_sequences, RocksStore::entry_key(&key, len), entry)?;
                    self.txn
                        .put_cf(cf_sequences, key.as_bytes(), (len + 1).to_be_bytes())?;
                }
                BatchOp::Delete { key } => {
                    self.txn.delete_cf(cf_records, key.as_bytes())?;
                    let len = self.locked_len(cf_sequences, &key)?;
                    for index in 0..len {
                        self.txn
                            .delete_cf(cf_sequences, RocksStore::entry_key(&key, index))?;
                    }
                    self.txn.delete_cf(cf_sequences, key.as_bytes())?;
                }
            }
        }

        // Atomic commit; on any error above the transaction is dropped and rolled back
        let RocksTransaction { txn, .. } = *self;
        txn.commit()?;
        Ok(())
    }
}
