//! Hybrid mode: write-behind flushing and warm start.

use idstore_core::{
    BasicCrudDao, EngineKind, EngineMode, FlushConfig, NamedCrudDao, RelationalConfig,
    RetryPolicy, StorageEngine, Store, StoreError, TransactionalRunner,
};
use idstore_testkit::prelude::*;
use std::collections::BTreeMap;
use std::thread;
use std::time::{Duration, Instant};

fn relational_groups(store: &Store) -> BTreeMap<String, (i64, String)> {
    let groups = store.named_dao_on::<Group>(EngineKind::Relational).unwrap();
    store
        .runner_on(EngineKind::Relational)
        .unwrap()
        .run_in_transaction_ret(|tx| {
            let mut out = BTreeMap::new();
            for (key, group) in groups.get_all_with_keys(tx)? {
                out.insert(group.path.clone(), (key, group.description));
            }
            Ok(out)
        })
        .unwrap()
}

fn memory_groups(store: &Store) -> BTreeMap<String, (i64, String)> {
    let groups = store.named_dao::<Group>();
    store
        .runner()
        .run_in_transaction_ret(|tx| {
            let mut out = BTreeMap::new();
            for (key, group) in groups.get_all_with_keys(tx)? {
                out.insert(group.path.clone(), (key, group.description));
            }
            Ok(out)
        })
        .unwrap()
}

#[test]
fn relational_catches_up_after_drain() {
    let store = TestStore::hybrid();
    let groups = store.named_dao::<Group>();
    let runner = store.runner();

    for i in 0..50 {
        runner
            .run_in_transaction(|tx| groups.create(tx, &Group::new(format!("/g{i}"))).map(|_| ()))
            .unwrap();
    }
    runner
        .run_in_transaction(|tx| {
            let mut g = groups.get(tx, "/g7")?;
            g.description = "seven".into();
            groups.update(tx, &g)?;
            groups.delete(tx, "/g8")
        })
        .unwrap();

    store.sync().unwrap();
    let persisted = relational_groups(&store);
    assert_eq!(persisted.len(), 49);
    assert_eq!(persisted["/g7"].1, "seven");
    assert!(!persisted.contains_key("/g8"));
    assert_eq!(persisted, memory_groups(&store));

    let stats = store.flush_stats().unwrap();
    assert_eq!(stats.enqueued, 52);
    assert_eq!(stats.applied, 52);
    assert_eq!(stats.failed, 0);
}

#[test]
fn rolled_back_work_is_never_flushed() {
    let store = TestStore::hybrid();
    let groups = store.named_dao::<Group>();
    let _ = store.runner().run_in_transaction(|tx| {
        groups.create(tx, &Group::new("/temp"))?;
        Err(StoreError::aborted("no"))
    });
    store.sync().unwrap();
    assert_eq!(store.flush_stats().unwrap().enqueued, 0);
    assert!(relational_groups(&store).is_empty());
}

#[test]
fn concurrent_writers_converge() {
    let store = TestStore::hybrid();
    let groups = store.named_dao::<Group>();

    thread::scope(|scope| {
        for t in 0..4 {
            let store = &store;
            let groups = &groups;
            scope.spawn(move || {
                let runner = store.runner();
                for i in 0..25 {
                    runner
                        .run_in_transaction(|tx| {
                            groups.create(tx, &Group::new(format!("/t{t}/g{i}"))).map(|_| ())
                        })
                        .unwrap();
                }
            });
        }
    });

    store.sync().unwrap();
    let persisted = relational_groups(&store);
    assert_eq!(persisted.len(), 100);
    assert_eq!(persisted, memory_groups(&store));
}

#[test]
fn close_flushes_and_stops() {
    let store = TestStore::hybrid();
    let groups = store.named_dao::<Group>();
    let runner = store.runner();
    runner
        .run_in_transaction(|tx| groups.create(tx, &Group::new("/a")).map(|_| ()))
        .unwrap();

    let stats = store.close().unwrap();
    assert_eq!(stats.applied, 1);
    assert!(!store.flush_sink().unwrap().is_running());
    assert_eq!(relational_groups(&store).len(), 1);

    // In-memory work keeps going but is no longer replicated.
    runner
        .run_in_transaction(|tx| groups.create(tx, &Group::new("/b")).map(|_| ()))
        .unwrap();
    assert_eq!(memory_groups(&store).len(), 2);
    assert_eq!(relational_groups(&store).len(), 1);
}

#[test]
fn warm_start_loads_relational_rows() {
    let store = TestStore::hybrid_file();
    let groups = store.named_dao::<Group>();
    let keys: Vec<i64> = store
        .runner()
        .run_in_transaction_ret(|tx| {
            Ok(vec![
                groups.create(tx, &Group::new("/a"))?,
                groups.create(tx, &Group::new("/b"))?,
            ])
        })
        .unwrap();
    drop(groups);

    let store = store.reopen();
    let groups = store.named_dao::<Group>();
    let runner = store.runner();
    let (a, next) = runner
        .run_in_transaction_ret(|tx| {
            let a = groups.get_key_for_name(tx, "/a")?;
            let next = groups.create(tx, &Group::new("/c"))?;
            Ok((a, next))
        })
        .unwrap();
    assert_eq!(a, keys[0]);
    assert!(next > keys[1], "keys continue above loaded rows");

    // Loading does not re-enqueue rows.
    store.sync().unwrap();
    assert_eq!(store.flush_stats().unwrap().enqueued, 1);
    assert_eq!(relational_groups(&store).len(), 3);
}

#[test]
fn deleted_keys_stay_retired_after_restart() {
    let store = TestStore::hybrid_file();
    let groups = store.named_dao::<Group>();
    let (a, b) = store
        .runner()
        .run_in_transaction_ret(|tx| {
            let a = groups.create(tx, &Group::new("/a"))?;
            let b = groups.create(tx, &Group::new("/b"))?;
            Ok((a, b))
        })
        .unwrap();
    store
        .runner()
        .run_in_transaction(|tx| groups.delete(tx, "/b"))
        .unwrap();
    drop(groups);

    let store = store.reopen();
    let groups = store.named_dao::<Group>();
    let c = store
        .runner()
        .run_in_transaction_ret(|tx| groups.create(tx, &Group::new("/c")))
        .unwrap();
    assert!(c > b, "key {c} reused; /a={a} /b={b}");

    store.sync().unwrap();
    let persisted = relational_groups(&store);
    assert_eq!(persisted["/c"].0, c);
    assert!(!persisted.contains_key("/b"));
}

#[test]
fn blocked_relational_engine_delays_but_never_loses_records() {
    let config = base_config(EngineMode::Hybrid)
        .relational(
            RelationalConfig::new()
                .max_connections(1)
                .acquire_timeout(Duration::from_millis(5)),
        )
        .flush(
            FlushConfig::default()
                .flush_interval(Duration::from_millis(5))
                .retry(RetryPolicy::new(2)),
        );
    let store = TestStore::with_config(config);
    let held = store
        .relational()
        .unwrap()
        .open_session()
        .unwrap();

    let groups = store.named_dao::<Group>();
    store
        .runner()
        .run_in_transaction(|tx| groups.create(tx, &Group::new("/held")).map(|_| ()))
        .unwrap();

    let sink = store.flush_sink().unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while sink.stats().requeued == 0 {
        assert!(Instant::now() < deadline, "flush batch never retried");
        thread::sleep(Duration::from_millis(1));
    }
    drop(held);

    let stats = store.close().unwrap();
    assert_eq!(stats.applied, 1);
    assert_eq!(stats.failed, 0);
    assert!(relational_groups(&store).contains_key("/held"));
}
