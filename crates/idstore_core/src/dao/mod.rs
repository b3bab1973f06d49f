//! Generic CRUD access to stored entities.
//!
//! A DAO is bound to one engine and one table (the entity's
//! [`EntityCodec::ENTITY_TYPE`]). Every method takes the active
//! [`Transaction`], so a DAO cannot be used outside a unit of work; using
//! it with a transaction of another engine fails with
//! [`crate::StoreError::WrongEngine`].
//!
//! Errors are classified by [`crate::ErrorKind`]: absent targets are
//! `NotFound`, duplicate keys or names are `AlreadyExists`.

mod basic;
mod named;

pub use basic::BasicDao;
pub use named::NamedDao;

use crate::error::StoreResult;
use crate::transaction::Transaction;
use crate::types::Key;
use idstore_codec::{EntityCodec, NamedEntity};
use std::collections::{BTreeMap, BTreeSet};

/// Keyed CRUD operations.
pub trait BasicCrudDao<T: EntityCodec> {
    /// Stores a new entity and returns its freshly allocated key.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if a named entity's name is taken;
    /// `SizeLimitExceeded` if the encoded entity is too large.
    fn create(&self, tx: &mut Transaction, entity: &T) -> StoreResult<Key>;

    /// Stores a new entity under a caller-chosen key.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if the key (or name) is taken.
    fn create_with_key(&self, tx: &mut Transaction, key: Key, entity: &T) -> StoreResult<()>;

    /// Loads the entity stored under `key`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the key is absent.
    fn get_by_key(&self, tx: &mut Transaction, key: Key) -> StoreResult<T>;

    /// Replaces the entity stored under `key`. The key is preserved.
    ///
    /// # Errors
    ///
    /// `NotFound` if the key is absent; `AlreadyExists` if a named entity
    /// is renamed onto another entity's name.
    fn update_by_key(&self, tx: &mut Transaction, key: Key, entity: &T) -> StoreResult<()>;

    /// Removes the entity stored under `key`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the key is absent.
    fn delete_by_key(&self, tx: &mut Transaction, key: Key) -> StoreResult<()>;

    /// Loads every entity in ascending key order.
    ///
    /// # Errors
    ///
    /// Fails if a stored payload cannot be decoded.
    fn get_all(&self, tx: &mut Transaction) -> StoreResult<Vec<T>>;

    /// Loads every entity with its key, in ascending key order.
    ///
    /// # Errors
    ///
    /// Fails if a stored payload cannot be decoded.
    fn get_all_with_keys(&self, tx: &mut Transaction) -> StoreResult<Vec<(Key, T)>>;

    /// Removes every entity of the table.
    ///
    /// # Errors
    ///
    /// `WrongEngine` if the transaction belongs to another engine.
    fn delete_all(&self, tx: &mut Transaction) -> StoreResult<()>;
}

/// Name-based operations for entities with unique names.
pub trait NamedCrudDao<T: NamedEntity>: BasicCrudDao<T> {
    /// Loads the entity called `name`.
    ///
    /// # Errors
    ///
    /// `NotFound` if no entity has that name.
    fn get(&self, tx: &mut Transaction, name: &str) -> StoreResult<T>;

    /// Replaces the entity with the same name as `entity`.
    ///
    /// # Errors
    ///
    /// `NotFound` if no entity has that name.
    fn update(&self, tx: &mut Transaction, entity: &T) -> StoreResult<()>;

    /// Removes the entity called `name`.
    ///
    /// # Errors
    ///
    /// `NotFound` if no entity has that name.
    fn delete(&self, tx: &mut Transaction, name: &str) -> StoreResult<()>;

    /// Returns whether an entity called `name` exists.
    fn exists(&self, tx: &mut Transaction, name: &str) -> bool;

    /// Loads every entity keyed by name.
    ///
    /// # Errors
    ///
    /// Fails if a stored payload cannot be decoded.
    fn get_as_map(&self, tx: &mut Transaction) -> StoreResult<BTreeMap<String, T>>;

    /// Resolves a name to its key.
    ///
    /// # Errors
    ///
    /// `NotFound` if no entity has that name.
    fn get_key_for_name(&self, tx: &mut Transaction, name: &str) -> StoreResult<Key>;

    /// Returns every stored name.
    ///
    /// # Errors
    ///
    /// `WrongEngine` if the transaction belongs to another engine.
    fn get_all_names(&self, tx: &mut Transaction) -> StoreResult<BTreeSet<String>>;
}
