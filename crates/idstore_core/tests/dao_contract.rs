//! DAO behavior shared by every engine mode.

use idstore_core::{
    BasicCrudDao, EngineMode, ErrorKind, NamedCrudDao, StorageLimits, StoreError,
    TransactionalRunner,
};
use idstore_testkit::prelude::*;
use proptest::prelude::*;
use std::collections::BTreeMap;

#[test]
fn attribute_type_lifecycle() {
    for_each_mode(|mode, store| {
        let attrs = store.named_dao::<AttributeType>();
        let runner = store.runner();

        let key = runner
            .run_in_transaction_ret(|tx| attrs.create(tx, &AttributeType::new("attr1", 8)))
            .unwrap();

        runner
            .run_in_transaction(|tx| {
                attrs.update(
                    tx,
                    &AttributeType::new("attr1", 2).with_description("changed"),
                )
            })
            .unwrap();

        runner
            .run_in_transaction(|tx| {
                let found = attrs.get(tx, "attr1")?;
                assert_eq!(found.flags, 2, "{mode}");
                assert_eq!(found.description, "changed");
                assert_eq!(attrs.get_key_for_name(tx, "attr1")?, key);
                Ok(())
            })
            .unwrap();

        runner.run_in_transaction(|tx| attrs.delete(tx, "attr1")).unwrap();
        let err = runner
            .run_in_transaction_ret(|tx| attrs.get(tx, "attr1"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let again = runner
            .run_in_transaction_ret(|tx| attrs.create(tx, &AttributeType::new("attr1", 8)))
            .unwrap();
        assert_ne!(again, key, "{mode}: keys are never reused");
    });
}

#[test]
fn names_are_unique_in_every_mode() {
    for_each_mode(|mode, store| {
        let groups = store.named_dao::<Group>();
        let runner = store.runner();
        runner
            .run_in_transaction(|tx| groups.create(tx, &Group::new("/staff")).map(|_| ()))
            .unwrap();
        let err = runner
            .run_in_transaction(|tx| groups.create(tx, &Group::new("/staff")).map(|_| ()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists, "{mode}");

        let count = runner
            .run_in_transaction_ret(|tx| Ok(groups.get_all(tx)?.len()))
            .unwrap();
        assert_eq!(count, 1);
    });
}

#[test]
fn keyed_entities_round_trip() {
    for_each_mode(|_, store| {
        let infos = store.dao::<EntityInformation>();
        let runner = store.runner();

        let keys = runner
            .run_in_transaction_ret(|tx| {
                let a = infos.create(tx, &EntityInformation::new("valid"))?;
                let b = infos.create(tx, &EntityInformation::new("disabled"))?;
                Ok(vec![a, b])
            })
            .unwrap();

        let all = runner
            .run_in_transaction_ret(|tx| infos.get_all_with_keys(tx))
            .unwrap();
        let listed: Vec<_> = all.iter().map(|(k, _)| *k).collect();
        assert_eq!(listed, keys);
        assert_eq!(all[1].1.state, "disabled");
    });
}

#[test]
fn absent_targets_fail_with_not_found() {
    for_each_mode(|mode, store| {
        let attrs = store.named_dao::<AttributeType>();
        let err = store
            .runner()
            .run_in_transaction(|tx| attrs.update(tx, &AttributeType::new("ghost", 0)))
            .unwrap_err();
        assert!(err.is_not_found(), "{mode}: {err}");

        let err = store
            .runner()
            .run_in_transaction(|tx| attrs.delete_by_key(tx, 404))
            .unwrap_err();
        assert!(err.is_not_found(), "{mode}: {err}");
    });
}

#[test]
fn exists_reflects_deletes() {
    let store = TestStore::memory();
    let groups = store.named_dao::<Group>();
    let runner = store.runner();
    runner
        .run_in_transaction(|tx| {
            groups.create(tx, &Group::new("/a"))?;
            assert!(groups.exists(tx, "/a"));
            groups.delete(tx, "/a")?;
            assert!(!groups.exists(tx, "/a"));
            Ok(())
        })
        .unwrap();
}

#[test]
fn record_size_limit() {
    let store = TestStore::relational();
    let blobs = store.dao::<Blob>();
    let runner = store.runner();

    runner
        .run_in_transaction(|tx| {
            blobs.create(tx, &Blob { data: vec![7; 250_000] }).map(|_| ())
        })
        .unwrap();

    let err = runner
        .run_in_transaction(|tx| {
            blobs.create(tx, &Blob { data: vec![7; 256_001] }).map(|_| ())
        })
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::SizeLimitExceeded { limit: 256_000, .. }
    ));
}

#[test]
fn custom_size_limit_applies_to_store_daos() {
    let store = TestStore::with_config(
        base_config(EngineMode::InMemory).limits(StorageLimits::default().max_record_size(128)),
    );
    let blobs = store.dao::<Blob>();
    let err = store
        .runner()
        .run_in_transaction(|tx| blobs.create(tx, &Blob { data: vec![0; 200] }).map(|_| ()))
        .unwrap_err();
    assert!(matches!(err, StoreError::SizeLimitExceeded { limit: 128, .. }));
}

#[test]
fn registry_returns_cached_daos() {
    let store = TestStore::hybrid();
    let a = store.named_dao::<Group>();
    let b = store.named_dao::<Group>();
    assert!(std::sync::Arc::ptr_eq(&a, &b));

    let relational = store
        .named_dao_on::<Group>(idstore_core::EngineKind::Relational)
        .unwrap();
    assert_eq!(relational.engine_kind(), idstore_core::EngineKind::Relational);

    // A DAO of one engine rejects transactions of the other.
    let err = store
        .runner()
        .run_in_transaction(|tx| relational.get_all(tx).map(|_| ()))
        .unwrap_err();
    assert!(matches!(err, StoreError::WrongEngine { .. }));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn named_dao_matches_model(ops in dao_ops_strategy(40)) {
        let store = TestStore::memory();
        let attrs = store.named_dao::<AttributeType>();
        let runner = store.runner();
        let mut model: BTreeMap<String, u32> = BTreeMap::new();

        for op in ops {
            match op {
                DaoOp::Create(attr) => {
                    let result = runner.run_in_transaction(|tx| attrs.create(tx, &attr).map(|_| ()));
                    if model.contains_key(&attr.name) {
                        prop_assert_eq!(result.unwrap_err().kind(), ErrorKind::AlreadyExists);
                    } else {
                        prop_assert!(result.is_ok());
                        model.insert(attr.name.clone(), attr.flags);
                    }
                }
                DaoOp::Update(attr) => {
                    let result = runner.run_in_transaction(|tx| attrs.update(tx, &attr));
                    if model.contains_key(&attr.name) {
                        prop_assert!(result.is_ok());
                        model.insert(attr.name.clone(), attr.flags);
                    } else {
                        prop_assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound);
                    }
                }
                DaoOp::Delete(name) => {
                    let result = runner.run_in_transaction(|tx| attrs.delete(tx, &name));
                    if model.remove(&name).is_some() {
                        prop_assert!(result.is_ok());
                    } else {
                        prop_assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound);
                    }
                }
            }
        }

        let stored: BTreeMap<String, u32> = runner
            .run_in_transaction_ret(|tx| attrs.get_as_map(tx))
            .unwrap()
            .into_iter()
            .map(|(name, attr)| (name, attr.flags))
            .collect();
        prop_assert_eq!(stored, model);
    }
}
