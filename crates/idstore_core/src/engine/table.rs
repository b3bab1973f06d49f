//! Versioned table storage shared by both engines.

use crate::error::{StoreError, StoreResult};
use crate::types::{Key, SequenceNumber};
use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

/// Storage-neutral form of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    /// Surrogate key.
    pub key: Key,
    /// Unique name, for named entities.
    pub name: Option<String>,
    /// Encoded entity.
    pub payload: Bytes,
}

/// Kind of a committed change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationKind {
    /// A new key was written.
    Create,
    /// An existing key was replaced.
    Update,
    /// A key was removed.
    Delete,
}

/// One committed change to one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    /// Table identity.
    pub table: String,
    /// Row key.
    pub key: Key,
    /// Change kind.
    pub kind: MutationKind,
    /// Row name after the change (before it, for deletes).
    pub name: Option<String>,
    /// Row payload after the change; `None` for deletes.
    pub payload: Option<Bytes>,
}

/// A buffered write of a session.
#[derive(Debug, Clone)]
pub(crate) enum PendingWrite {
    Insert { name: Option<String>, payload: Bytes },
    Replace { name: Option<String>, payload: Bytes },
    Remove,
}

pub(crate) type WriteSet = BTreeMap<(String, Key), PendingWrite>;

/// What a session observed in committed state.
///
/// Row versions are 0 for absent rows; committed versions start at 1.
#[derive(Debug, Default)]
pub(crate) struct ReadSet {
    pub(crate) rows: HashMap<(String, Key), u64>,
    pub(crate) names: HashMap<(String, String), Option<Key>>,
    pub(crate) scans: HashMap<String, u64>,
}

impl ReadSet {
    pub(crate) fn clear(&mut self) {
        self.rows.clear();
        self.names.clear();
        self.scans.clear();
    }
}

/// Serialized image of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct TableSnapshot {
    pub(crate) name: String,
    pub(crate) last_key: Key,
    pub(crate) rows: Vec<Row>,
}

#[derive(Debug, Clone)]
struct StoredRow {
    name: Option<String>,
    payload: Bytes,
    version: u64,
}

impl StoredRow {
    fn to_row(&self, key: Key) -> Row {
        Row {
            key,
            name: self.name.clone(),
            payload: self.payload.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<Key, StoredRow>,
    names: HashMap<String, Key>,
    last_key: Key,
    generation: u64,
}

impl Table {
    fn unlink_name(&mut self, key: Key) {
        if let Some(old) = self.rows.get(&key) {
            if let Some(old_name) = &old.name {
                if self.names.get(old_name) == Some(&key) {
                    self.names.remove(old_name);
                }
            }
        }
    }

    fn put(&mut self, key: Key, name: Option<String>, payload: Bytes, version: u64) {
        self.unlink_name(key);
        if let Some(name) = &name {
            self.names.insert(name.clone(), key);
        }
        self.rows.insert(
            key,
            StoredRow {
                name,
                payload,
                version,
            },
        );
        self.last_key = self.last_key.max(key);
        self.generation += 1;
    }

    fn remove(&mut self, key: Key) {
        self.unlink_name(key);
        if self.rows.remove(&key).is_some() {
            self.generation += 1;
        }
    }
}

/// Committed tables of one engine.
///
/// Reads take a shared lock and return copies; commits validate the
/// committing session's observations and apply its writes under the
/// exclusive lock, so every commit is atomic and totally ordered.
#[derive(Debug, Default)]
pub struct TableStore {
    tables: RwLock<HashMap<String, Table>>,
    sequence: AtomicU64,
}

impl TableStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the sequence of the last commit.
    #[must_use]
    pub fn last_sequence(&self) -> SequenceNumber {
        SequenceNumber::new(self.sequence.load(Ordering::Acquire))
    }

    /// Returns the names of all known tables, sorted.
    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of committed rows in `table`.
    #[must_use]
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, |t| t.rows.len())
    }

    /// Hands out the next key of `table`. Keys are never handed out twice.
    pub(crate) fn allocate_key(&self, table: &str) -> Key {
        let mut tables = self.tables.write();
        let t = tables.entry(table.to_string()).or_default();
        t.last_key += 1;
        t.last_key
    }

    pub(crate) fn get(&self, table: &str, key: Key) -> (Option<Row>, u64) {
        let tables = self.tables.read();
        match tables.get(table).and_then(|t| t.rows.get(&key)) {
            Some(stored) => (Some(stored.to_row(key)), stored.version),
            None => (None, 0),
        }
    }

    pub(crate) fn key_for_name(&self, table: &str, name: &str) -> Option<Key> {
        self.tables
            .read()
            .get(table)
            .and_then(|t| t.names.get(name))
            .copied()
    }

    pub(crate) fn scan(&self, table: &str) -> (Vec<Row>, u64) {
        let tables = self.tables.read();
        match tables.get(table) {
            Some(t) => (
                t.rows.iter().map(|(k, r)| r.to_row(*k)).collect(),
                t.generation,
            ),
            None => (Vec::new(), 0),
        }
    }

    /// Validates `reads` and applies `writes` as one commit.
    ///
    /// `before_apply` runs after validation and may veto the commit (the
    /// journal write); `after_apply` observes the applied commit. Both run
    /// under the exclusive lock, so they see commits in sequence order.
    /// Returns `None` when there is nothing to write.
    pub(crate) fn commit<B, A>(
        &self,
        reads: &ReadSet,
        writes: &WriteSet,
        before_apply: B,
        after_apply: A,
    ) -> StoreResult<Option<(SequenceNumber, Vec<Mutation>)>>
    where
        B: FnOnce(SequenceNumber, &[Mutation]) -> StoreResult<()>,
        A: FnOnce(SequenceNumber, &[Mutation]),
    {
        if writes.is_empty() {
            return Ok(None);
        }

        let mut tables = self.tables.write();
        validate(&tables, reads, writes)?;

        let mutations: Vec<Mutation> = writes
            .iter()
            .map(|((table, key), write)| to_mutation(&tables, table, *key, write))
            .collect();

        let sequence = self.last_sequence().next();
        before_apply(sequence, &mutations)?;

        for mutation in &mutations {
            apply(&mut tables, mutation, sequence.as_u64());
        }
        self.sequence.store(sequence.as_u64(), Ordering::Release);

        after_apply(sequence, &mutations);
        Ok(Some((sequence, mutations)))
    }

    /// Re-applies a journaled commit without validation.
    pub(crate) fn replay(&self, sequence: SequenceNumber, mutations: &[Mutation]) {
        let mut tables = self.tables.write();
        for mutation in mutations {
            apply(&mut tables, mutation, sequence.as_u64());
        }
        self.sequence.fetch_max(sequence.as_u64(), Ordering::AcqRel);
    }

    /// Inserts rows directly, outside any transaction.
    ///
    /// The key counter of `table` moves to at least `last_key`, so keys
    /// retired elsewhere stay retired here.
    pub(crate) fn load(&self, table: &str, rows: Vec<Row>, last_key: Key) {
        let mut tables = self.tables.write();
        let version = self.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        let t = tables.entry(table.to_string()).or_default();
        for row in rows {
            t.put(row.key, row.name, row.payload, version);
        }
        t.last_key = t.last_key.max(last_key);
    }

    /// Runs `f` over a consistent image of every table.
    ///
    /// Commits are blocked until `f` returns.
    pub(crate) fn with_snapshot<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(SequenceNumber, Vec<TableSnapshot>) -> StoreResult<T>,
    {
        let tables = self.tables.read();
        let mut snapshot: Vec<TableSnapshot> = tables
            .iter()
            .map(|(name, t)| TableSnapshot {
                name: name.clone(),
                last_key: t.last_key,
                rows: t.rows.iter().map(|(k, r)| r.to_row(*k)).collect(),
            })
            .collect();
        snapshot.sort_by(|a, b| a.name.cmp(&b.name));
        f(self.last_sequence(), snapshot)
    }

    /// Replaces all state with a snapshot.
    pub(crate) fn restore(&self, sequence: SequenceNumber, snapshot: Vec<TableSnapshot>) {
        let mut tables = self.tables.write();
        tables.clear();
        let version = sequence.as_u64().max(1);
        for image in snapshot {
            let t = tables.entry(image.name).or_default();
            for row in image.rows {
                t.put(row.key, row.name, row.payload, version);
            }
            t.last_key = t.last_key.max(image.last_key);
        }
        self.sequence.store(version, Ordering::Release);
    }
}

fn validate(tables: &HashMap<String, Table>, reads: &ReadSet, writes: &WriteSet) -> StoreResult<()> {
    for ((table, key), seen) in &reads.rows {
        let current = tables
            .get(table)
            .and_then(|t| t.rows.get(key))
            .map_or(0, |r| r.version);
        if current != *seen {
            return Err(StoreError::transient(format!(
                "{table} row {key} changed since it was read"
            )));
        }
    }

    for ((table, name), seen) in &reads.names {
        let current = tables.get(table).and_then(|t| t.names.get(name)).copied();
        if current != *seen {
            return Err(StoreError::transient(format!(
                "{table} name '{name}' changed since it was read"
            )));
        }
    }

    for (table, seen) in &reads.scans {
        let current = tables.get(table).map_or(0, |t| t.generation);
        if current != *seen {
            return Err(StoreError::transient(format!(
                "{table} changed since it was scanned"
            )));
        }
    }

    for ((table, key), write) in writes {
        if matches!(write, PendingWrite::Insert { .. })
            && tables.get(table).is_some_and(|t| t.rows.contains_key(key))
        {
            return Err(StoreError::transient(format!(
                "{table} row {key} was created concurrently"
            )));
        }
    }

    Ok(())
}

fn to_mutation(tables: &HashMap<String, Table>, table: &str, key: Key, write: &PendingWrite) -> Mutation {
    let (kind, name, payload) = match write {
        PendingWrite::Insert { name, payload } => {
            (MutationKind::Create, name.clone(), Some(payload.clone()))
        }
        PendingWrite::Replace { name, payload } => {
            (MutationKind::Update, name.clone(), Some(payload.clone()))
        }
        PendingWrite::Remove => {
            let name = tables
                .get(table)
                .and_then(|t| t.rows.get(&key))
                .and_then(|r| r.name.clone());
            (MutationKind::Delete, name, None)
        }
    };
    Mutation {
        table: table.to_string(),
        key,
        kind,
        name,
        payload,
    }
}

fn apply(tables: &mut HashMap<String, Table>, mutation: &Mutation, version: u64) {
    let table = tables.entry(mutation.table.clone()).or_default();
    match mutation.kind {
        MutationKind::Create | MutationKind::Update => table.put(
            mutation.key,
            mutation.name.clone(),
            mutation.payload.clone().unwrap_or_default(),
            version,
        ),
        MutationKind::Delete => table.remove(mutation.key),
    }
}
