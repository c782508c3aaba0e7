//! Integration Tests for the Group API
//!
//! Exercises deduplication, caching and clearing through the public surface.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use flightcache::{CancellationToken, EvictCallback, Group, GroupError, Outcome};
use tokio::sync::{oneshot, Notify};
use tokio_test::{assert_pending, assert_ready};

type SharedError = Arc<anyhow::Error>;

// == Helper Functions ==

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "flightcache=debug".into()),
            )
            .with_test_writer()
            .init();
    });
}

fn test_group(capacity: usize) -> Arc<Group<String, i64, SharedError>> {
    init_tracing();
    Arc::new(Group::new(capacity, None, Duration::ZERO))
}

// == Scenario ==

#[tokio::test]
async fn test_cache_bypass_clear_and_error_sequence() {
    let group = test_group(1);
    let ctx = CancellationToken::new();
    let key = "testKey".to_string();

    // First call runs the producer
    let outcome = group
        .call(&ctx, key.clone(), true, |_| async { Ok(1) })
        .await
        .unwrap();
    assert_eq!(outcome.value, 1);

    // Served from the cache
    let called = Arc::new(AtomicBool::new(false));
    let flag = called.clone();
    let outcome = group
        .call(&ctx, key.clone(), true, move |_| async move {
            flag.store(true, Ordering::SeqCst);
            Ok(1)
        })
        .await
        .unwrap();
    assert_eq!(outcome.value, 1);
    assert!(!called.load(Ordering::SeqCst));

    // Cache bypassed
    let flag = called.clone();
    let outcome = group
        .call(&ctx, key.clone(), false, move |_| async move {
            flag.store(true, Ordering::SeqCst);
            Ok(1)
        })
        .await
        .unwrap();
    assert_eq!(outcome.value, 1);
    assert!(called.load(Ordering::SeqCst));

    // Cleared cache runs the producer again
    group.clear().await;
    called.store(false, Ordering::SeqCst);
    let flag = called.clone();
    let outcome = group
        .call(&ctx, key.clone(), true, move |_| async move {
            flag.store(true, Ordering::SeqCst);
            Ok(1)
        })
        .await
        .unwrap();
    assert_eq!(outcome.value, 1);
    assert!(called.load(Ordering::SeqCst));

    // Producer errors come back untouched
    let failure: SharedError = Arc::new(anyhow::anyhow!("error"));
    let returned = failure.clone();
    let err = group
        .call(&ctx, key, false, move |_| async move { Err(returned) })
        .await
        .unwrap_err();
    match err {
        GroupError::Producer(err) => assert!(Arc::ptr_eq(&err, &failure)),
        other => panic!("unexpected error: {other:?}"),
    }
}

// == Deduplication ==

#[tokio::test(start_paused = true)]
async fn test_concurrent_tasks_share_one_execution() {
    const CALLERS: usize = 16;

    let group = test_group(0);
    let runs = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..CALLERS {
        let group = group.clone();
        let runs = runs.clone();
        handles.push(tokio::spawn(async move {
            let ctx = CancellationToken::new();
            group
                .call(&ctx, "report".to_string(), false, move |_| async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    // The paused clock only advances once every caller is parked
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok(99)
                })
                .await
        }));
    }

    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome, Outcome { value: 99, shared: true });
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(group.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_joiner_does_not_affect_others() {
    let group = test_group(10);
    let (started_tx, started_rx) = oneshot::channel();
    let release = Arc::new(Notify::new());

    let leader = {
        let group = group.clone();
        let release = release.clone();
        tokio::spawn(async move {
            let ctx = CancellationToken::new();
            group
                .call(&ctx, "k".to_string(), true, move |run| async move {
                    let _ = started_tx.send(());
                    release.notified().await;
                    assert!(!run.is_cancelled());
                    Ok(7)
                })
                .await
        })
    };
    started_rx.await.unwrap();

    let joiner_ctx = CancellationToken::new();
    let joiner = {
        let group = group.clone();
        let ctx = joiner_ctx.clone();
        tokio::spawn(async move {
            group
                .call(&ctx, "k".to_string(), true, |_| async { Ok(0) })
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    joiner_ctx.cancel();

    assert!(matches!(joiner.await.unwrap(), Err(GroupError::Cancelled)));
    release.notify_one();
    assert_eq!(leader.await.unwrap().unwrap().value, 7);

    // The leader's result was cached despite the joiner leaving
    let cached = group
        .call(&CancellationToken::new(), "k".to_string(), true, |_| async {
            Ok(0)
        })
        .await
        .unwrap();
    assert_eq!(cached, Outcome { value: 7, shared: true });
}

// == Clear ==

#[tokio::test]
async fn test_clear_waits_for_in_flight_calls() {
    let group = test_group(10);
    let (started_tx, started_rx) = oneshot::channel();
    let (release_tx, release_rx) = oneshot::channel::<()>();

    let in_flight = {
        let group = group.clone();
        tokio::spawn(async move {
            let ctx = CancellationToken::new();
            group
                .call(&ctx, "k".to_string(), true, move |_| async move {
                    let _ = started_tx.send(());
                    let _ = release_rx.await;
                    Ok(1)
                })
                .await
        })
    };
    started_rx.await.unwrap();

    let mut clear = tokio_test::task::spawn(group.clear());
    assert_pending!(clear.poll());

    release_tx.send(()).unwrap();
    assert_eq!(in_flight.await.unwrap().unwrap().value, 1);
    assert!(clear.is_woken());
    assert_ready!(clear.poll());

    // The result cached by the call that finished before the swap is gone
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let outcome = group
        .call(&CancellationToken::new(), "k".to_string(), true, move |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(2)
        })
        .await
        .unwrap();
    assert_eq!(outcome.value, 2);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_clear_does_not_fire_eviction_callback() {
    init_tracing();
    let evicted = Arc::new(AtomicUsize::new(0));
    let counter = evicted.clone();
    let on_evict: EvictCallback<String, i64> = Arc::new(move |_: String, _: i64| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let group: Group<String, i64, SharedError> = Group::new(1, Some(on_evict), Duration::ZERO);
    let ctx = CancellationToken::new();

    group
        .call(&ctx, "a".to_string(), true, |_| async { Ok(1) })
        .await
        .unwrap();
    group
        .call(&ctx, "b".to_string(), true, |_| async { Ok(2) })
        .await
        .unwrap();
    assert_eq!(evicted.load(Ordering::SeqCst), 1);

    group.clear().await;
    assert_eq!(evicted.load(Ordering::SeqCst), 1);
    assert!(group.is_empty().await);
}
