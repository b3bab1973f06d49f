//! Keyed DAO implementation.

use super::BasicCrudDao;
use crate::config::StorageLimits;
use crate::engine::{Session, StorageEngine};
use crate::error::{StoreError, StoreResult};
use crate::transaction::Transaction;
use crate::types::{EngineId, EngineKind, Key};
use bytes::Bytes;
use idstore_codec::EntityCodec;
use std::fmt;
use std::marker::PhantomData;

/// DAO over the table of `T` in one engine.
pub struct BasicDao<T> {
    engine: EngineId,
    kind: EngineKind,
    limits: StorageLimits,
    name_of: fn(&T) -> Option<String>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for BasicDao<T> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine,
            kind: self.kind,
            limits: self.limits,
            name_of: self.name_of,
            _entity: PhantomData,
        }
    }
}

impl<T: EntityCodec> fmt::Debug for BasicDao<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicDao")
            .field("table", &T::ENTITY_TYPE)
            .field("engine", &self.engine)
            .field("kind", &self.kind)
            .finish()
    }
}

fn unnamed<T>(_: &T) -> Option<String> {
    None
}

impl<T: EntityCodec> BasicDao<T> {
    /// Creates a DAO for entities without names.
    #[must_use]
    pub fn new(engine: &dyn StorageEngine, limits: StorageLimits) -> Self {
        Self::with_names(engine, limits, unnamed::<T>)
    }

    pub(crate) fn with_names(
        engine: &dyn StorageEngine,
        limits: StorageLimits,
        name_of: fn(&T) -> Option<String>,
    ) -> Self {
        Self {
            engine: engine.id(),
            kind: engine.kind(),
            limits,
            name_of,
            _entity: PhantomData,
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
        self.kind
    }

    pub(crate) fn session<'t>(&self, tx: &'t mut Transaction) -> StoreResult<&'t mut Session> {
        if tx.engine_id() != self.engine {
            return Err(StoreError::WrongEngine {
                expected: self.kind,
                found: tx.engine_kind(),
            });
        }
        Ok(tx.session_mut())
    }

    fn encode(&self, entity: &T) -> StoreResult<Bytes> {
        let payload = entity.encode()?;
        if payload.len() > self.limits.max_record_size {
            return Err(StoreError::SizeLimitExceeded {
                entity_type: T::ENTITY_TYPE.to_string(),
                size: payload.len(),
                limit: self.limits.max_record_size,
            });
        }
        Ok(payload)
    }

    fn claim_name(session: &mut Session, name: Option<&str>, owner: Option<Key>) -> StoreResult<()> {
        if let Some(name) = name {
            match session.key_for_name(T::ENTITY_TYPE, name) {
                Some(existing) if Some(existing) != owner => {
                    return Err(StoreError::already_exists(T::ENTITY_TYPE, name));
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub(crate) fn load(&self, session: &mut Session, key: Key) -> StoreResult<T> {
        let row = session
            .get(T::ENTITY_TYPE, key)
            .ok_or_else(|| StoreError::not_found(T::ENTITY_TYPE, key))?;
        Ok(T::decode(&row.payload)?)
    }

    pub(crate) fn replace(
        &self,
        session: &mut Session,
        key: Key,
        entity: &T,
    ) -> StoreResult<()> {
        let payload = self.encode(entity)?;
        let name = (self.name_of)(entity);
        if session.get(T::ENTITY_TYPE, key).is_none() {
            return Err(StoreError::not_found(T::ENTITY_TYPE, key));
        }
        Self::claim_name(session, name.as_deref(), Some(key))?;
        session.replace(T::ENTITY_TYPE, key, name, payload);
        Ok(())
    }

    pub(crate) fn remove(session: &mut Session, key: Key) -> StoreResult<()> {
        if !session.remove_if_present(T::ENTITY_TYPE, key) {
            return Err(StoreError::not_found(T::ENTITY_TYPE, key));
        }
        Ok(())
    }
}

impl<T: EntityCodec> BasicCrudDao<T> for BasicDao<T> {
    fn create(&self, tx: &mut Transaction, entity: &T) -> StoreResult<Key> {
        let payload = self.encode(entity)?;
        let name = (self.name_of)(entity);
        let session = self.session(tx)?;
        Self::claim_name(session, name.as_deref(), None)?;
        let key = session.allocate_key(T::ENTITY_TYPE);
        session.insert(T::ENTITY_TYPE, key, name, payload);
        Ok(key)
    }

    fn create_with_key(&self, tx: &mut Transaction, key: Key, entity: &T) -> StoreResult<()> {
        let payload = self.encode(entity)?;
        let name = (self.name_of)(entity);
        let session = self.session(tx)?;
        if session.get(T::ENTITY_TYPE, key).is_some() {
            return Err(StoreError::already_exists(T::ENTITY_TYPE, key));
        }
        Self::claim_name(session, name.as_deref(), None)?;
        session.insert(T::ENTITY_TYPE, key, name, payload);
        Ok(())
    }

    fn get_by_key(&self, tx: &mut Transaction, key: Key) -> StoreResult<T> {
        let session = self.session(tx)?;
        self.load(session, key)
    }

    fn update_by_key(&self, tx: &mut Transaction, key: Key, entity: &T) -> StoreResult<()> {
        let session = self.session(tx)?;
        self.replace(session, key, entity)
    }

    fn delete_by_key(&self, tx: &mut Transaction, key: Key) -> StoreResult<()> {
        let session = self.session(tx)?;
        Self::remove(session, key)
    }

    fn get_all(&self, tx: &mut Transaction) -> StoreResult<Vec<T>> {
        Ok(self
            .get_all_with_keys(tx)?
            .into_iter()
            .map(|(_, entity)| entity)
            .collect())
    }

    fn get_all_with_keys(&self, tx: &mut Transaction) -> StoreResult<Vec<(Key, T)>> {
        let session = self.session(tx)?;
        session
            .scan(T::ENTITY_TYPE)
            .into_iter()
            .map(|row| -> StoreResult<(Key, T)> { Ok((row.key, T::decode(&row.payload)?)) })
            .collect()
    }

    fn delete_all(&self, tx: &mut Transaction) -> StoreResult<()> {
        let session = self.session(tx)?;
        for row in session.scan(T::ENTITY_TYPE) {
            session.remove(T::ENTITY_TYPE, row.key);
        }
        Ok(())
    }
}
