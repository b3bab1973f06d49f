//! Name-addressed DAO implementation.

use super::basic::BasicDao;
use super::{BasicCrudDao, NamedCrudDao};
use crate::config::StorageLimits;
use crate::engine::StorageEngine;
use crate::error::{StoreError, StoreResult};
use crate::transaction::Transaction;
use crate::types::{EngineKind, Key};
use idstore_codec::NamedEntity;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::warn;

fn name_of<T: NamedEntity>(entity: &T) -> Option<String> {
    Some(entity.name().to_string())
}

/// DAO for entities with unique names.
///
/// Names are indexed by the engine; lookups by name never scan.
pub struct NamedDao<T: NamedEntity> {
    basic: BasicDao<T>,
}

impl<T: NamedEntity> Clone for NamedDao<T> {
    fn clone(&self) -> Self {
        Self {
            basic: self.basic.clone(),
        }
    }
}

impl<T: NamedEntity> fmt::Debug for NamedDao<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedDao").field("basic", &self.basic).finish()
    }
}

impl<T: NamedEntity> NamedDao<T> {
    /// Creates a DAO bound to `engine`.
    #[must_use]
    pub fn new(engine: &dyn StorageEngine, limits: StorageLimits) -> Self {
        Self {
            basic: BasicDao::with_names(engine, limits, name_of::<T>),
        }
    }

    /// Table the DAO reads and writes.
    #[must_use]
    pub fn table(&self) -> &'static str {
        T::ENTITY_TYPE
    }

    /// Kind of the engine the DAO is bound to.
    #[must_use]
    pub fn engine_kind(&self) -> EngineKind {
        self.basic.engine_kind()
    }

    fn key_of(&self, tx: &mut Transaction, name: &str) -> StoreResult<Key> {
        self.basic
            .session(tx)?
            .key_for_name(T::ENTITY_TYPE, name)
            .ok_or_else(|| StoreError::not_found(T::ENTITY_TYPE, name))
    }
}

impl<T: NamedEntity> BasicCrudDao<T> for NamedDao<T> {
    fn create(&self, tx: &mut Transaction, entity: &T) -> StoreResult<Key> {
        self.basic.create(tx, entity)
    }

    fn create_with_key(&self, tx: &mut Transaction, key: Key, entity: &T) -> StoreResult<()> {
        self.basic.create_with_key(tx, key, entity)
    }

    fn get_by_key(&self, tx: &mut Transaction, key: Key) -> StoreResult<T> {
        self.basic.get_by_key(tx, key)
    }

    fn update_by_key(&self, tx: &mut Transaction, key: Key, entity: &T) -> StoreResult<()> {
        self.basic.update_by_key(tx, key, entity)
    }

    fn delete_by_key(&self, tx: &mut Transaction, key: Key) -> StoreResult<()> {
        self.basic.delete_by_key(tx, key)
    }

    fn get_all(&self, tx: &mut Transaction) -> StoreResult<Vec<T>> {
        self.basic.get_all(tx)
    }

    fn get_all_with_keys(&self, tx: &mut Transaction) -> StoreResult<Vec<(Key, T)>> {
        self.basic.get_all_with_keys(tx)
    }

    fn delete_all(&self, tx: &mut Transaction) -> StoreResult<()> {
        self.basic.delete_all(tx)
    }
}

impl<T: NamedEntity> NamedCrudDao<T> for NamedDao<T> {
    fn get(&self, tx: &mut Transaction, name: &str) -> StoreResult<T> {
        let key = self.key_of(tx, name)?;
        let session = self.basic.session(tx)?;
        self.basic.load(session, key)
    }

    fn update(&self, tx: &mut Transaction, entity: &T) -> StoreResult<()> {
        let key = self.key_of(tx, entity.name())?;
        let session = self.basic.session(tx)?;
        self.basic.replace(session, key, entity)
    }

    fn delete(&self, tx: &mut Transaction, name: &str) -> StoreResult<()> {
        let key = self.key_of(tx, name)?;
        let session = self.basic.session(tx)?;
        BasicDao::<T>::remove(session, key)
    }

    fn exists(&self, tx: &mut Transaction, name: &str) -> bool {
        match self.basic.session(tx) {
            Ok(session) => session.key_for_name(T::ENTITY_TYPE, name).is_some(),
            Err(err) => {
                warn!(table = T::ENTITY_TYPE, error = %err, "existence check on foreign transaction");
                false
            }
        }
    }

    fn get_as_map(&self, tx: &mut Transaction) -> StoreResult<BTreeMap<String, T>> {
        Ok(self
            .basic
            .get_all(tx)?
            .into_iter()
            .map(|entity| (entity.name().to_string(), entity))
            .collect())
    }

    fn get_key_for_name(&self, tx: &mut Transaction, name: &str) -> StoreResult<Key> {
        self.key_of(tx, name)
    }

    fn get_all_names(&self, tx: &mut Transaction) -> StoreResult<BTreeSet<String>> {
        let session = self.basic.session(tx)?;
        Ok(session
            .scan(T::ENTITY_TYPE)
            .into_iter()
            .filter_map(|row| row.name)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEngine;
    use crate::error::ErrorKind;
    use crate::transaction::{EngineRunner, TransactionalRunner};
    use idstore_codec::EntityCodec;
    use serde::{Deserialize, Serialize};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Realm {
        name: String,
        timeout: u32,
    }

    impl EntityCodec for Realm {
        const ENTITY_TYPE: &'static str = "realm";
    }

    impl NamedEntity for Realm {
        fn name(&self) -> &str {
            &self.name
        }
    }

    fn realm(name: &str, timeout: u32) -> Realm {
        Realm {
            name: name.to_string(),
            timeout,
        }
    }

    fn setup() -> (EngineRunner, NamedDao<Realm>) {
        let engine: Arc<dyn StorageEngine> = Arc::new(MemoryEngine::new());
        let dao = NamedDao::new(engine.as_ref(), StorageLimits::default());
        (EngineRunner::new(engine), dao)
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let (runner, dao) = setup();
        runner
            .run_in_transaction(|tx| dao.create(tx, &realm("main", 1)).map(|_| ()))
            .unwrap();
        let err = runner
            .run_in_transaction(|tx| dao.create(tx, &realm("main", 2)).map(|_| ()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn update_by_name_keeps_key() {
        let (runner, dao) = setup();
        let key = runner
            .run_in_transaction_ret(|tx| dao.create(tx, &realm("main", 1)))
            .unwrap();
        runner
            .run_in_transaction(|tx| dao.update(tx, &realm("main", 30)))
            .unwrap();
        runner
            .run_in_transaction(|tx| {
                assert_eq!(dao.get(tx, "main")?.timeout, 30);
                assert_eq!(dao.get_key_for_name(tx, "main")?, key);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn rename_by_key() {
        let (runner, dao) = setup();
        let (a, _) = runner
            .run_in_transaction_ret(|tx| {
                Ok((dao.create(tx, &realm("a", 1))?, dao.create(tx, &realm("b", 1))?))
            })
            .unwrap();

        let err = runner
            .run_in_transaction(|tx| dao.update_by_key(tx, a, &realm("b", 2)))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        runner
            .run_in_transaction(|tx| dao.update_by_key(tx, a, &realm("c", 2)))
            .unwrap();
        runner
            .run_in_transaction(|tx| {
                assert!(!dao.exists(tx, "a"));
                assert!(dao.exists(tx, "c"));
                assert_eq!(dao.get_key_for_name(tx, "c")?, a);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn names_and_map() {
        let (runner, dao) = setup();
        runner
            .run_in_transaction(|tx| {
                dao.create(tx, &realm("z", 1))?;
                dao.create(tx, &realm("y", 2))?;
                Ok(())
            })
            .unwrap();
        runner
            .run_in_transaction(|tx| {
                let names: Vec<String> = dao.get_all_names(tx)?.into_iter().collect();
                assert_eq!(names, vec!["y".to_string(), "z".to_string()]);
                let map = dao.get_as_map(tx)?;
                assert_eq!(map["y"].timeout, 2);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn delete_by_name() {
        let (runner, dao) = setup();
        runner
            .run_in_transaction(|tx| dao.create(tx, &realm("gone", 1)).map(|_| ()))
            .unwrap();
        runner.run_in_transaction(|tx| dao.delete(tx, "gone")).unwrap();
        let err = runner
            .run_in_transaction(|tx| dao.delete(tx, "gone"))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn exists_on_foreign_transaction_is_false() {
        let (runner, dao) = setup();
        runner
            .run_in_transaction(|tx| dao.create(tx, &realm("main", 1)).map(|_| ()))
            .unwrap();
        let other: Arc<dyn StorageEngine> = Arc::new(MemoryEngine::new());
        EngineRunner::new(other)
            .run_in_transaction(|tx| {
                assert!(!dao.exists(tx, "main"));
                Ok(())
            })
            .unwrap();
    }
}
