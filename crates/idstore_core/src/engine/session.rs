//! Engine sessions: buffered writes over committed state.

use crate::engine::pool::Lease;
use crate::engine::table::{PendingWrite, ReadSet, Row, TableStore, WriteSet};
use crate::types::{EngineId, Key};
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// The engine-specific resource of a transaction.
///
/// A session sees committed state merged with its own buffered writes and
/// records every committed value it observed. Nothing reaches the tables
/// until the owning engine commits the session; rolling back is dropping
/// the buffer.
///
/// For the relational engine the session also holds a connection lease,
/// returned to the pool when the session is dropped.
#[derive(Debug)]
pub struct Session {
    engine: EngineId,
    store: Arc<TableStore>,
    writes: WriteSet,
    pending_names: HashMap<(String, String), Key>,
    reads: ReadSet,
    _lease: Option<Lease>,
}

impl Session {
    pub(crate) fn new(engine: EngineId, store: Arc<TableStore>, lease: Option<Lease>) -> Self {
        Self {
            engine,
            store,
            writes: WriteSet::new(),
            pending_names: HashMap::new(),
            reads: ReadSet::default(),
            _lease: lease,
        }
    }

    /// Returns the engine this session belongs to.
    #[must_use]
    pub fn engine_id(&self) -> EngineId {
        self.engine
    }

    /// Returns true if the session buffers uncommitted writes.
    #[must_use]
    pub fn has_writes(&self) -> bool {
        !self.writes.is_empty()
    }

    /// Number of buffered row writes.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.len()
    }

    /// Discards buffered writes and observations.
    pub fn clear(&mut self) {
        self.writes.clear();
        self.pending_names.clear();
        self.reads.clear();
    }

    pub(crate) fn take(&mut self) -> (ReadSet, WriteSet) {
        self.pending_names.clear();
        (
            std::mem::take(&mut self.reads),
            std::mem::take(&mut self.writes),
        )
    }

    pub(crate) fn allocate_key(&self, table: &str) -> Key {
        self.store.allocate_key(table)
    }

    /// Looks up one row.
    pub fn get(&mut self, table: &str, key: Key) -> Option<Row> {
        if let Some(write) = self.writes.get(&(table.to_string(), key)) {
            return match write {
                PendingWrite::Insert { name, payload } | PendingWrite::Replace { name, payload } => {
                    Some(Row {
                        key,
                        name: name.clone(),
                        payload: payload.clone(),
                    })
                }
                PendingWrite::Remove => None,
            };
        }

        let (row, version) = self.store.get(table, key);
        self.reads
            .rows
            .entry((table.to_string(), key))
            .or_insert(version);
        row
    }

    /// Resolves a name to its key.
    pub fn key_for_name(&mut self, table: &str, name: &str) -> Option<Key> {
        let lookup = (table.to_string(), name.to_string());
        if let Some(key) = self.pending_names.get(&lookup) {
            return Some(*key);
        }

        let committed = self.store.key_for_name(table, name);
        self.reads.names.entry(lookup).or_insert(committed);

        // A pending write on the committed owner means it was renamed away
        // or removed inside this session.
        let key = committed?;
        if self.writes.contains_key(&(table.to_string(), key)) {
            None
        } else {
            Some(key)
        }
    }

    /// Returns every row of `table` in ascending key order.
    pub fn scan(&mut self, table: &str) -> Vec<Row> {
        let (committed, generation) = self.store.scan(table);
        self.reads
            .scans
            .entry(table.to_string())
            .or_insert(generation);

        let mut rows: BTreeMap<Key, Row> = committed.into_iter().map(|r| (r.key, r)).collect();
        for ((t, key), write) in &self.writes {
            if t != table {
                continue;
            }
            match write {
                PendingWrite::Insert { name, payload } | PendingWrite::Replace { name, payload } => {
                    rows.insert(
                        *key,
                        Row {
                            key: *key,
                            name: name.clone(),
                            payload: payload.clone(),
                        },
                    );
                }
                PendingWrite::Remove => {
                    rows.remove(key);
                }
            }
        }
        rows.into_values().collect()
    }

    /// Buffers a row for a key that is currently absent.
    pub fn insert(&mut self, table: &str, key: Key, name: Option<String>, payload: Bytes) {
        let slot = (table.to_string(), key);
        let write = match self.writes.get(&slot) {
            Some(PendingWrite::Remove) => PendingWrite::Replace { name, payload },
            _ => PendingWrite::Insert { name, payload },
        };
        self.buffer(slot, Some(write));
    }

    /// Buffers a replacement for a key that currently exists.
    pub fn replace(&mut self, table: &str, key: Key, name: Option<String>, payload: Bytes) {
        let slot = (table.to_string(), key);
        let write = match self.writes.get(&slot) {
            Some(PendingWrite::Insert { .. }) => PendingWrite::Insert { name, payload },
            _ => PendingWrite::Replace { name, payload },
        };
        self.buffer(slot, Some(write));
    }

    /// Buffers removal of a key that currently exists.
    pub fn remove(&mut self, table: &str, key: Key) {
        let slot = (table.to_string(), key);
        let write = match self.writes.get(&slot) {
            Some(PendingWrite::Insert { .. }) => None,
            _ => Some(PendingWrite::Remove),
        };
        self.buffer(slot, write);
    }

    /// Stores or drops the pending write of `slot`, keeping the pending
    /// name index in step.
    fn buffer(&mut self, slot: (String, Key), write: Option<PendingWrite>) {
        let (table, key) = &slot;
        if let Some(old) = self.writes.get(&slot).and_then(pending_name) {
            let indexed = (table.clone(), old.to_string());
            if self.pending_names.get(&indexed) == Some(key) {
                self.pending_names.remove(&indexed);
            }
        }
        match write {
            Some(write) => {
                if let Some(new) = pending_name(&write) {
                    self.pending_names.insert((table.clone(), new.to_string()), *key);
                }
                self.writes.insert(slot, write);
            }
            None => {
                self.writes.remove(&slot);
            }
        }
    }

    /// Writes a row whether or not the key exists.
    pub fn upsert(&mut self, table: &str, key: Key, name: Option<String>, payload: Bytes) {
        if self.get(table, key).is_some() {
            self.replace(table, key, name, payload);
        } else {
            self.insert(table, key, name, payload);
        }
    }

    /// Removes a row if it exists. Returns whether it did.
    pub fn remove_if_present(&mut self, table: &str, key: Key) -> bool {
        if self.get(table, key).is_some() {
            self.remove(table, key);
            true
        } else {
            false
        }
    }
}

fn pending_name(write: &PendingWrite) -> Option<&str> {
    match write {
        PendingWrite::Insert { name, .. } | PendingWrite::Replace { name, .. } => name.as_deref(),
        PendingWrite::Remove => None,
    }
}
