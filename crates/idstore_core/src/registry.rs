//! Per-store DAO cache.

use crate::config::StorageLimits;
use crate::dao::{BasicDao, NamedDao};
use crate::engine::StorageEngine;
use crate::types::EngineKind;
use idstore_codec::{EntityCodec, NamedEntity};
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

type Slot = Arc<dyn Any + Send + Sync>;

/// Hands out one DAO instance per entity type per engine.
#[derive(Debug, Default)]
pub(crate) struct DaoRegistry {
    slots: Mutex<HashMap<(TypeId, EngineKind), Slot>>,
}

impl DaoRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn basic<T>(
        &self,
        engine: &dyn StorageEngine,
        limits: StorageLimits,
    ) -> Arc<BasicDao<T>>
    where
        T: EntityCodec + 'static,
    {
        self.get_or_insert(engine.kind(), || BasicDao::<T>::new(engine, limits))
    }

    pub(crate) fn named<T>(
        &self,
        engine: &dyn StorageEngine,
        limits: StorageLimits,
    ) -> Arc<NamedDao<T>>
    where
        T: NamedEntity + 'static,
    {
        self.get_or_insert(engine.kind(), || NamedDao::<T>::new(engine, limits))
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.lock().len()
    }

    fn get_or_insert<D, F>(&self, kind: EngineKind, make: F) -> Arc<D>
    where
        D: Any + Send + Sync,
        F: FnOnce() -> D,
    {
        let key = (TypeId::of::<D>(), kind);
        let mut slots = self.slots.lock();
        if let Some(dao) = slots
            .get(&key)
            .and_then(|slot| Arc::clone(slot).downcast::<D>().ok())
        {
            return dao;
        }
        let dao = Arc::new(make());
        slots.insert(key, Arc::clone(&dao) as Slot);
        dao
    }
}
