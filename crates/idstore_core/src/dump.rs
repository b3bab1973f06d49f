//! JSON import/export of whole tables.
//!
//! A dump is a self-describing JSON document:
//!
//! ```json
//! {
//!   "version": 1,
//!   "tables": [
//!     { "name": "group", "rows": [ { "key": 1, "name": "/", "payload": "omF2..." } ] }
//!   ]
//! }
//! ```
//!
//! Payloads are the stored entity envelopes, base64 encoded, so a dump can
//! be imported without knowing the entity types. Keys are preserved.

use crate::engine::Row;
use crate::error::{StoreError, StoreResult};
use crate::transaction::Transaction;
use crate::types::Key;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::io::{Read, Write};

/// Current dump format version.
pub const DUMP_VERSION: u32 = 1;

/// Contents of a set of tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dump {
    /// Format version.
    pub version: u32,
    /// Dumped tables.
    pub tables: Vec<TableDump>,
}

/// Contents of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDump {
    /// Table name.
    pub name: String,
    /// Rows in ascending key order.
    pub rows: Vec<DumpRow>,
}

/// One dumped row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpRow {
    /// Row key.
    pub key: Key,
    /// Unique name, for named entities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Encoded entity.
    #[serde(serialize_with = "encode_payload", deserialize_with = "decode_payload")]
    pub payload: Bytes,
}

fn encode_payload<S: Serializer>(payload: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(payload))
}

fn decode_payload<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
    let text = String::deserialize(deserializer)?;
    STANDARD
        .decode(text.as_bytes())
        .map(Bytes::from)
        .map_err(serde::de::Error::custom)
}

impl From<Row> for DumpRow {
    fn from(row: Row) -> Self {
        Self {
            key: row.key,
            name: row.name,
            payload: row.payload,
        }
    }
}

impl Dump {
    /// Captures `tables` as seen by the transaction.
    pub fn capture(tx: &mut Transaction, tables: &[String]) -> Self {
        let session = tx.session_mut();
        let tables = tables
            .iter()
            .map(|name| TableDump {
                name: name.clone(),
                rows: session.scan(name).into_iter().map(DumpRow::from).collect(),
            })
            .collect();
        Self {
            version: DUMP_VERSION,
            tables,
        }
    }

    /// Replaces the contents of every dumped table with the dumped rows.
    ///
    /// Tables not in the dump are left alone.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Dump`] if a table repeats a key or a name.
    pub fn apply(&self, tx: &mut Transaction) -> StoreResult<()> {
        for table in &self.tables {
            table.check_unique()?;
        }

        let session = tx.session_mut();
        for table in &self.tables {
            for row in session.scan(&table.name) {
                session.remove(&table.name, row.key);
            }
            for row in &table.rows {
                session.insert(&table.name, row.key, row.name.clone(), row.payload.clone());
            }
        }
        Ok(())
    }

    /// Total number of rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.tables.iter().map(|t| t.rows.len()).sum()
    }

    /// Writes the dump as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Dump`] if writing fails.
    pub fn write_to<W: Write>(&self, writer: W) -> StoreResult<()> {
        serde_json::to_writer_pretty(writer, self).map_err(|e| StoreError::dump(e.to_string()))
    }

    /// Reads a JSON dump.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Dump`] for malformed input or an unknown
    /// version.
    pub fn read_from<R: Read>(reader: R) -> StoreResult<Self> {
        let dump: Self =
            serde_json::from_reader(reader).map_err(|e| StoreError::dump(e.to_string()))?;
        if dump.version != DUMP_VERSION {
            return Err(StoreError::dump(format!(
                "unsupported dump version {} (expected {DUMP_VERSION})",
                dump.version
            )));
        }
        Ok(dump)
    }
}

impl TableDump {
    fn check_unique(&self) -> StoreResult<()> {
        let mut keys = BTreeSet::new();
        let mut names = BTreeSet::new();
        for row in &self.rows {
            if !keys.insert(row.key) {
                return Err(StoreError::dump(format!(
                    "table '{}' repeats key {}",
                    self.name, row.key
                )));
            }
            if let Some(name) = &row.name {
                if !names.insert(name.as_str()) {
                    return Err(StoreError::dump(format!(
                        "table '{}' repeats name '{name}'",
                        self.name
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{MemoryEngine, StorageEngine};
    use crate::transaction::{EngineRunner, TransactionalRunner};
    use std::sync::Arc;

    fn row(key: Key, name: &str, payload: &'static [u8]) -> DumpRow {
        DumpRow {
            key,
            name: Some(name.to_string()),
            payload: Bytes::from_static(payload),
        }
    }

    fn sample() -> Dump {
        Dump {
            version: DUMP_VERSION,
            tables: vec![TableDump {
                name: "group".into(),
                rows: vec![row(3, "/", b"\x01\x02"), row(9, "/staff", b"\xff")],
            }],
        }
    }

    #[test]
    fn payload_is_base64_in_json() {
        let mut out = Vec::new();
        sample().write_to(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("\"AQI=\""));
        assert!(text.contains("\"/staff\""));

        let back = Dump::read_from(text.as_bytes()).unwrap();
        assert_eq!(back, sample());
        assert_eq!(back.row_count(), 2);
    }

    #[test]
    fn unknown_version_is_rejected() {
        let json = r#"{"version": 7, "tables": []}"#;
        let err = Dump::read_from(json.as_bytes()).unwrap_err();
        assert!(matches!(err, StoreError::Dump { .. }));
    }

    #[test]
    fn apply_replaces_table_contents() {
        let engine: Arc<dyn StorageEngine> = Arc::new(MemoryEngine::new());
        let runner = EngineRunner::new(Arc::clone(&engine));
        runner
            .run_in_transaction(|tx| {
                let s = tx.session_mut();
                s.insert("group", 1, Some("old".into()), Bytes::from_static(b"x"));
                s.insert("other", 1, None, Bytes::from_static(b"y"));
                Ok(())
            })
            .unwrap();

        runner.run_in_transaction(|tx| sample().apply(tx)).unwrap();

        let tables = vec!["group".to_string(), "other".to_string()];
        let dump = runner
            .run_in_transaction_ret(|tx| Ok(Dump::capture(tx, &tables)))
            .unwrap();
        let keys: Vec<Key> = dump.tables[0].rows.iter().map(|r| r.key).collect();
        assert_eq!(keys, vec![3, 9]);
        assert_eq!(dump.tables[1].rows.len(), 1);
        assert_eq!(engine.tables().key_for_name("group", "old"), None);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let engine: Arc<dyn StorageEngine> = Arc::new(MemoryEngine::new());
        let runner = EngineRunner::new(engine);
        let dump = Dump {
            version: DUMP_VERSION,
            tables: vec![TableDump {
                name: "group".into(),
                rows: vec![row(1, "/", b"a"), row(2, "/", b"b")],
            }],
        };
        let err = runner.run_in_transaction(|tx| dump.apply(tx)).unwrap_err();
        assert!(matches!(err, StoreError::Dump { .. }));
    }
}
