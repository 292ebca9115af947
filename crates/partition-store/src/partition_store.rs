// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Arc;
#[cfg(any(test, feature = "test-util"))]
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::{BufMut, Bytes, BytesMut};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, ErrorKind, IteratorMode, Options, WriteBatch,
    WriteOptions, DB,
};
use strum::IntoEnumIterator;
use tracing::{debug, trace};

use tokenflow_storage_api::{Result, Storage, StorageError, Transaction};
use tokenflow_types::identifiers::PartitionId;
use tokenflow_types::storage::{StorageCodec, StorageDecode, StorageEncode};

use crate::keys::KeyKind;

/// Transactional key-value state of a single partition, stored in RocksDB.
///
/// Every [`KeyKind`] owns a column family. Keys keep their key kind prefix so that the column
/// family of a key can be derived from the key alone. Clones share the same database.
#[derive(Clone)]
pub struct PartitionStore {
    partition_id: PartitionId,
    path: PathBuf,
    db: Arc<DB>,
    #[cfg(any(test, feature = "test-util"))]
    failing_commits: Arc<AtomicUsize>,
}

impl fmt::Debug for PartitionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionStore")
            .field("partition_id", &self.partition_id)
            .field("path", &self.path)
            .finish()
    }
}

impl PartitionStore {
    /// Opens the store in `path`, creating the database and its column families if missing.
    pub fn open(path: impl Into<PathBuf>, partition_id: PartitionId) -> Result<Self> {
        let path = path.into();

        let mut db_options = Options::default();
        db_options.create_if_missing(true);
        db_options.create_missing_column_families(true);

        let column_families = KeyKind::iter()
            .map(|kind| ColumnFamilyDescriptor::new(kind.cf_name(), Options::default()));
        let db = DB::open_cf_descriptors(&db_options, &path, column_families)
            .map_err(storage_error)?;

        debug!(%partition_id, path = %path.display(), "Opened partition store");
        Ok(Self {
            partition_id,
            path,
            db: Arc::new(db),
            #[cfg(any(test, feature = "test-util"))]
            failing_commits: Arc::default(),
        })
    }

    #[inline]
    pub fn partition_id(&self) -> PartitionId {
        self.partition_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_empty(&self) -> Result<bool> {
        for kind in KeyKind::iter() {
            let cf = self.cf_for_kind(kind)?;
            if let Some(entry) = self.db.iterator_cf(cf, IteratorMode::Start).next() {
                entry.map_err(storage_error)?;
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Serializes every key and value of all tables, table by table in key order. Two stores
    /// holding the same state produce identical dumps.
    pub fn dump(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        for kind in KeyKind::iter() {
            let cf = self.cf_for_kind(kind)?;
            for entry in self.db.iterator_cf(cf, IteratorMode::Start) {
                let (key, value) = entry.map_err(storage_error)?;
                buf.put_u32(key.len() as u32);
                buf.put_slice(&key);
                buf.put_u32(value.len() as u32);
                buf.put_slice(&value);
            }
        }
        Ok(buf.freeze())
    }

    /// Lets the next `count` commits fail with a transient error without applying their writes.
    #[cfg(any(test, feature = "test-util"))]
    pub fn fail_next_commits(&self, count: usize) {
        self.failing_commits.store(count, Ordering::Relaxed);
    }

    #[cfg(any(test, feature = "test-util"))]
    fn take_injected_failure(&self) -> bool {
        self.failing_commits
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
    }

    #[cfg(not(any(test, feature = "test-util")))]
    fn take_injected_failure(&self) -> bool {
        false
    }

    fn cf_for_kind(&self, kind: KeyKind) -> Result<&ColumnFamily> {
        self.db.cf_handle(kind.cf_name()).ok_or_else(|| {
            StorageError::Generic(anyhow::anyhow!(
                "missing column family '{}'",
                kind.cf_name()
            ))
        })
    }

    fn cf_for_key(&self, key: &[u8]) -> Result<&ColumnFamily> {
        let kind = KeyKind::deserialize(&mut &key[..])?;
        self.cf_for_kind(kind)
    }

    fn write(&self, writes: BTreeMap<Bytes, Option<Bytes>>) -> Result<()> {
        let mut batch = WriteBatch::default();
        for (key, value) in &writes {
            let cf = self.cf_for_key(key)?;
            match value {
                Some(value) => batch.put_cf(cf, key, value),
                None => batch.delete_cf(cf, key),
            }
        }

        // the journal entries this state was derived from may be compacted once it is durable
        let mut write_options = WriteOptions::default();
        write_options.set_sync(true);
        self.db
            .write_opt(batch, &write_options)
            .map_err(storage_error)
    }
}

fn storage_error(err: rocksdb::Error) -> StorageError {
    match err.kind() {
        ErrorKind::Busy | ErrorKind::TryAgain | ErrorKind::TimedOut | ErrorKind::Incomplete => {
            StorageError::Transient(err.into())
        }
        _ => StorageError::Generic(err.into()),
    }
}

impl Storage for PartitionStore {
    type TransactionType<'a> = PartitionStoreTransaction<'a>;

    fn transaction(&mut self) -> Self::TransactionType<'_> {
        PartitionStoreTransaction {
            store: self,
            writes: BTreeMap::new(),
        }
    }
}

/// Read access shared by the store and its transactions. Table implementations are written
/// against this trait so that the read-only tables work on both.
pub(crate) trait StorageAccess {
    fn get_raw(&self, key: &[u8]) -> Result<Option<Bytes>>;

    /// All entries whose key starts with `prefix`, in key order.
    fn scan_prefix_raw(&self, prefix: &[u8]) -> Result<Vec<(Bytes, Bytes)>>;

    fn get_value<T: StorageDecode>(&self, key: &[u8]) -> Result<Option<T>> {
        self.get_raw(key)?.map(decode_value).transpose()
    }

    fn scan_prefix<T: StorageDecode>(&self, prefix: &[u8]) -> Result<Vec<(Bytes, T)>> {
        self.scan_prefix_raw(prefix)?
            .into_iter()
            .map(|(key, value)| Ok((key, decode_value(value)?)))
            .collect()
    }
}

pub(crate) trait StorageWrite: StorageAccess {
    fn put_raw(&mut self, key: Bytes, value: Bytes);

    fn delete_raw(&mut self, key: Bytes);

    fn put_value<T: StorageEncode>(&mut self, key: Bytes, value: T) -> Result<()> {
        let mut buf = BytesMut::new();
        let value = StorageCodec::encode_and_split(value, &mut buf)
            .map_err(|err| StorageError::Conversion(err.into()))?;
        self.put_raw(key, value);
        Ok(())
    }
}

fn decode_value<T: StorageDecode>(mut value: Bytes) -> Result<T> {
    StorageCodec::decode(&mut value).map_err(|err| StorageError::Conversion(err.into()))
}

impl StorageAccess for PartitionStore {
    fn get_raw(&self, key: &[u8]) -> Result<Option<Bytes>> {
        let cf = self.cf_for_key(key)?;
        Ok(self
            .db
            .get_pinned_cf(cf, key)
            .map_err(storage_error)?
            .map(|value| Bytes::copy_from_slice(&value)))
    }

    fn scan_prefix_raw(&self, prefix: &[u8]) -> Result<Vec<(Bytes, Bytes)>> {
        let cf = self.cf_for_key(prefix)?;
        let mut entries = Vec::new();
        for entry in self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward))
        {
            let (key, value) = entry.map_err(storage_error)?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((Bytes::from(key), Bytes::from(value)));
        }
        Ok(entries)
    }
}

/// Buffers all writes until [`Transaction::commit`] applies them as one RocksDB write batch.
/// Reads see the committed state overlaid with the transaction's own writes.
pub struct PartitionStoreTransaction<'a> {
    store: &'a PartitionStore,
    /// `None` marks a deleted key.
    writes: BTreeMap<Bytes, Option<Bytes>>,
}

impl PartitionStoreTransaction<'_> {
    #[inline]
    pub fn partition_id(&self) -> PartitionId {
        self.store.partition_id
    }
}

impl StorageAccess for PartitionStoreTransaction<'_> {
    fn get_raw(&self, key: &[u8]) -> Result<Option<Bytes>> {
        match self.writes.get(key) {
            Some(written) => Ok(written.clone()),
            None => self.store.get_raw(key),
        }
    }

    fn scan_prefix_raw(&self, prefix: &[u8]) -> Result<Vec<(Bytes, Bytes)>> {
        let mut merged: BTreeMap<Bytes, Bytes> =
            self.store.scan_prefix_raw(prefix)?.into_iter().collect();
        let written = self
            .writes
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix));
        for (key, value) in written {
            match value {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }
}

impl StorageWrite for PartitionStoreTransaction<'_> {
    fn put_raw(&mut self, key: Bytes, value: Bytes) {
        self.writes.insert(key, Some(value));
    }

    fn delete_raw(&mut self, key: Bytes) {
        self.writes.insert(key, None);
    }
}

impl Transaction for PartitionStoreTransaction<'_> {
    async fn commit(self) -> Result<()> {
        if self.store.take_injected_failure() {
            return Err(StorageError::Transient(anyhow::anyhow!(
                "injected commit failure"
            )));
        }
        if self.writes.is_empty() {
            return Ok(());
        }
        trace!(
            partition_id = %self.store.partition_id,
            writes = self.writes.len(),
            "Committing partition store transaction"
        );
        self.store.write(self.writes)
    }
}
