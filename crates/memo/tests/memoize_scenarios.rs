//! End-to-end behavior of the memoization policy
//!
//! These tests drive the public adapters against real backends and check the
//! contracts callers rely on: hits skip the computation, slow results are
//! stored, fast ones are not unless forced, and memo failures never reach
//! the caller.

use memokit::memo::{self, StoreOutcome};
use memokit::store::{Backend, Location, RemoteBackend};
use memokit::{
    MemoConfig, MemoContext, MemoOptions, Probe, eval, eval_always, eval_with_key,
    eval_with_options, fingerprint_call, memoize, memoize_with_options, Kwargs,
};
use memokit_remote::{ObjectStore, RemoteError, RemoteUri};
use std::cell::Cell;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn local_context(temp: &TempDir) -> MemoContext {
    init_tracing();
    MemoContext::new(MemoConfig {
        base_path: temp.path().display().to_string(),
        ..MemoConfig::default()
    })
    .expect("context")
}

#[derive(Default)]
struct MemoryStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl ObjectStore for MemoryStore {
    fn get(&self, uri: &RemoteUri) -> memokit_remote::Result<Option<Vec<u8>>> {
        Ok(self.objects.lock().unwrap().get(&uri.to_string()).cloned())
    }

    fn put(&self, uri: &RemoteUri, bytes: Vec<u8>) -> memokit_remote::Result<()> {
        self.objects.lock().unwrap().insert(uri.to_string(), bytes);
        Ok(())
    }
}

/// A store whose every request fails with a server error
struct BrokenStore;

impl ObjectStore for BrokenStore {
    fn get(&self, uri: &RemoteUri) -> memokit_remote::Result<Option<Vec<u8>>> {
        Err(RemoteError::Status {
            status: 500,
            url: uri.to_string(),
        })
    }

    fn put(&self, uri: &RemoteUri, _bytes: Vec<u8>) -> memokit_remote::Result<()> {
        Err(RemoteError::Status {
            status: 500,
            url: uri.to_string(),
        })
    }
}

fn remote_context(store: Arc<dyn ObjectStore>) -> MemoContext {
    init_tracing();
    let base = "xet://alice/proj_cache/main";
    let backend = Backend::Remote(RemoteBackend::new(
        RemoteUri::parse(base, "xet").unwrap(),
        store,
    ));
    MemoContext::with_backend(
        MemoConfig {
            base_path: base.to_string(),
            ..MemoConfig::default()
        },
        backend,
    )
    .expect("context")
}

#[test]
fn slow_function_runs_once_across_two_calls() {
    let temp = TempDir::new().unwrap();
    let ctx = local_context(&temp);
    // Scaled down from seconds so the suite stays fast
    ctx.set_runtime_threshold(0.05).unwrap();

    let runs = Cell::new(0);
    let slow = memoize(&ctx, |x: u64| {
        runs.set(runs.get() + 1);
        std::thread::sleep(Duration::from_millis(120));
        x * 2
    });

    let first = slow.call_traced(10).unwrap();
    assert!(!first.is_cached());
    assert!(first.store_outcome().unwrap().is_stored());
    assert_eq!(first.into_value(), 20);

    let second = slow.call_traced(10).unwrap();
    assert!(second.is_cached());
    assert_eq!(second.into_value(), 20);

    assert_eq!(runs.get(), 1, "function body must run exactly once");
}

#[test]
fn memo_persists_across_contexts() {
    let temp = TempDir::new().unwrap();
    let first = local_context(&temp);
    assert_eq!(eval_always(&first, None, |x: u64| x + 1, 41).unwrap(), 42);

    // A fresh context over the same directory, as a new process would have
    let second = local_context(&temp);
    let ran = Cell::new(false);
    let value = eval(
        &second,
        |x: u64| {
            ran.set(true);
            x + 1
        },
        41,
    )
    .unwrap();
    assert_eq!(value, 42);
    assert!(!ran.get());
}

#[test]
fn forced_fast_function_is_stored_and_hit() {
    let temp = TempDir::new().unwrap();
    let ctx = local_context(&temp);

    let runs = Cell::new(0);
    let fast = memoize_with_options(&ctx, MemoOptions::new().always(true)).wrap(|x: i64| {
        runs.set(runs.get() + 1);
        x + 1
    });

    assert_eq!(fast.call(1).unwrap(), 2);
    let location = Location::new(fingerprint_call(None, &1_i64, &Kwargs::new()).unwrap(), None).unwrap();
    assert!(location.under(temp.path()).is_file(), "memo file should exist");

    assert_eq!(fast.call(1).unwrap(), 2);
    assert_eq!(runs.get(), 1);
}

#[test]
fn fast_function_is_not_stored_without_force() {
    let temp = TempDir::new().unwrap();
    let ctx = local_context(&temp);
    let outcome = eval_with_options(&ctx, &MemoOptions::new(), |x: i64| x + 1, 1).unwrap();
    assert_eq!(outcome.store_outcome(), Some(&StoreOutcome::Skipped));
    assert_eq!(std::fs::read_dir(temp.path()).map(Iterator::count).unwrap_or(0), 0);
}

#[test]
fn zero_threshold_stores_any_measurable_call() {
    let temp = TempDir::new().unwrap();
    let ctx = local_context(&temp);
    ctx.set_runtime_threshold(0.0).unwrap();
    let outcome = eval_with_options(
        &ctx,
        &MemoOptions::new(),
        |x: i64| {
            std::thread::sleep(Duration::from_millis(2));
            x
        },
        7,
    )
    .unwrap();
    assert!(outcome.store_outcome().unwrap().is_stored());
}

#[test]
fn threshold_is_read_after_the_computation() {
    let temp = TempDir::new().unwrap();
    let ctx = local_context(&temp);
    let inner = ctx.clone();
    let outcome = eval_with_options(
        &ctx,
        &MemoOptions::new(),
        move |x: i64| {
            inner.set_runtime_threshold(0.0).unwrap();
            std::thread::sleep(Duration::from_millis(2));
            x
        },
        3,
    )
    .unwrap();
    assert!(outcome.store_outcome().unwrap().is_stored());
}

#[test]
fn failing_backend_still_returns_fresh_value() {
    let ctx = remote_context(Arc::new(BrokenStore));
    let runs = Cell::new(0);
    let f = memoize_with_options(&ctx, MemoOptions::new().always(true)).wrap(|x: i32| {
        runs.set(runs.get() + 1);
        x * 10
    });

    let outcome = f.call_traced(4).unwrap();
    match &outcome {
        memokit::Outcome::Computed {
            probe_failure,
            store,
            ..
        } => {
            assert!(probe_failure.is_some(), "probe failure should be reported");
            assert!(matches!(store, StoreOutcome::Failed(_)));
        }
        memokit::Outcome::Cached { .. } => panic!("nothing can be cached"),
    }
    assert_eq!(outcome.into_value(), 40);
    assert_eq!(f.call(4).unwrap(), 40);
    assert_eq!(runs.get(), 2);
}

#[test]
fn unreadable_local_base_still_returns_fresh_value() {
    let temp = TempDir::new().unwrap();
    let blocker = temp.path().join("not-a-dir");
    std::fs::write(&blocker, b"plain file").unwrap();
    init_tracing();
    let ctx = MemoContext::new(MemoConfig {
        base_path: blocker.display().to_string(),
        ..MemoConfig::default()
    })
    .unwrap();

    assert_eq!(eval_always(&ctx, Some("k"), |s: String| s.len(), "abc".to_string()).unwrap(), 3);
}

#[test]
fn remote_backend_round_trip() {
    let store = Arc::new(MemoryStore::default());
    let ctx = remote_context(store.clone());

    let runs = Cell::new(0);
    let f = memoize_with_options(&ctx, MemoOptions::new().key("exp").always(true)).wrap(
        |words: Vec<String>| {
            runs.set(runs.get() + 1);
            words.join(" ")
        },
    );
    let args = vec!["hello".to_string(), "world".to_string()];
    assert_eq!(f.call(args.clone()).unwrap(), "hello world");
    assert_eq!(f.call(args).unwrap(), "hello world");
    assert_eq!(runs.get(), 1);

    let keys: Vec<String> = store.objects.lock().unwrap().keys().cloned().collect();
    assert_eq!(keys.len(), 1);
    assert!(keys[0].starts_with("xet://alice/proj_cache/main/exp/"));
    assert!(keys[0].ends_with(".pickle"));
}

#[test]
fn grouping_keys_are_isolated() {
    let temp = TempDir::new().unwrap();
    let ctx = local_context(&temp);

    assert_eq!(eval_always(&ctx, Some("keyA"), |x: i32| x * 2, 5).unwrap(), 10);

    let ran = Cell::new(0);
    let count = |x: i32| {
        ran.set(ran.get() + 1);
        x * 2
    };
    assert_eq!(eval_with_key(&ctx, "keyB", count, 5).unwrap(), 10);
    assert_eq!(eval(&ctx, count, 5).unwrap(), 10);
    assert_eq!(ran.get(), 2, "neither another key nor no key may see keyA's entry");

    assert_eq!(eval_with_key(&ctx, "keyA", count, 5).unwrap(), 10);
    assert_eq!(ran.get(), 2, "same key must hit");
}

#[test]
fn store_then_probe_round_trip_on_both_backends() {
    let temp = TempDir::new().unwrap();
    let local = local_context(&temp);
    let remote = remote_context(Arc::new(MemoryStore::default()));

    let mut record = memokit::MemoRecord::new();
    record
        .insert_value("model", &serde_json::json!({"weights": [0.1, 0.2], "bias": -1}))
        .unwrap();
    record.insert_value("accuracy", &0.93).unwrap();
    record.insert_value("loss", &f64::INFINITY).unwrap();

    for ctx in [&local, &remote] {
        let backend = ctx.backend();
        for key in [None, Some("grp")] {
            let location =
                Location::new(memokit::fingerprint::fingerprint(&("rt", key)).unwrap(), key)
                    .unwrap();
            memo::store(backend.as_ref(), &location, &record, None).unwrap();
            assert_eq!(memo::probe(backend.as_ref(), &location), Probe::Hit(record.clone()));
        }
    }
}

#[test]
fn repeated_miss_then_store_writes_equivalent_records() {
    let first_dir = TempDir::new().unwrap();
    let second_dir = TempDir::new().unwrap();
    let deterministic = |n: u32| (0..n).map(|i| i * i).collect::<Vec<_>>();

    let mut records = Vec::new();
    for dir in [&first_dir, &second_dir] {
        let ctx = local_context(dir);
        eval_always(&ctx, Some("squares"), deterministic, 6).unwrap();
        let location = Location::new(
            fingerprint_call(None, &6_u32, &Kwargs::new()).unwrap(),
            Some("squares"),
        )
        .unwrap();
        records.push(memo::probe(ctx.backend().as_ref(), &location).into_record().unwrap());
    }
    assert_eq!(records[0], records[1]);
}

#[test]
fn corrupt_memo_is_recomputed_and_replaced() {
    let temp = TempDir::new().unwrap();
    let ctx = local_context(&temp);
    let location = Location::new(fingerprint_call(None, &9_i32, &Kwargs::new()).unwrap(), None).unwrap();
    std::fs::write(location.under(temp.path()), b"garbage").unwrap();

    let outcome = eval_with_options(&ctx, &MemoOptions::new().always(true), |x: i32| x + 1, 9).unwrap();
    assert!(!outcome.is_cached());
    assert_eq!(outcome.into_value(), 10);

    // The rewrite replaced the corrupt file
    let hit = eval_with_options(&ctx, &MemoOptions::new(), |x: i32| x - 1, 9).unwrap();
    assert!(hit.is_cached());
    assert_eq!(hit.into_value(), 10);
}

#[test]
fn stored_value_of_wrong_type_is_a_miss() {
    let temp = TempDir::new().unwrap();
    let ctx = local_context(&temp);
    eval_always(&ctx, None, |_: i32| "text".to_string(), 1).unwrap();
    let outcome = eval_with_options(&ctx, &MemoOptions::new(), |x: i32| x, 1).unwrap();
    assert!(!outcome.is_cached());
    assert_eq!(outcome.into_value(), 1);
}
