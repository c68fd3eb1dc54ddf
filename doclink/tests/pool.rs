mod common;

use std::time::Duration;

use common::{client, client_with, fast_config, seed_numbers, settle};
use doclink::{CancellationToken, bson::doc, prelude::*};
use pretty_assertions::assert_eq;

#[tokio::test]
async fn acquire_times_out_when_pool_is_exhausted() {
    let (client, _) = client_with(fast_config().pool_max_size(1).build().unwrap());
    let manager = client.manager().clone();

    let held = manager.acquire(Duration::from_secs(1)).await.unwrap();
    assert_eq!(manager.status().in_use, 1);

    let err = manager
        .acquire(Duration::from_millis(50))
        .await
        .unwrap_err();
    match err {
        ClientError::PoolExhausted { waited_ms } => assert!(waited_ms >= 40),
        other => panic!("expected PoolExhausted, got {other:?}"),
    }

    // Operations wait the configured acquire timeout too.
    let numbers = client.database("pool").collection("numbers");
    assert!(matches!(
        numbers.count(&Filter::match_all()).await,
        Err(ClientError::PoolExhausted { .. })
    ));

    manager.release(held);
    assert_eq!(manager.status().idle, 1);
    assert_eq!(numbers.count(&Filter::match_all()).await.unwrap(), 0);
}

#[tokio::test]
async fn waiting_acquire_succeeds_once_the_session_is_released() {
    let (client, transport) = client_with(fast_config().pool_max_size(1).build().unwrap());
    let manager = client.manager().clone();
    let held = manager.acquire(Duration::from_secs(1)).await.unwrap();

    let waiting = manager.clone();
    let waiter = tokio::spawn(async move { waiting.acquire(Duration::from_secs(1)).await });
    settle().await;
    assert!(!waiter.is_finished());

    manager.release(held);
    let session = waiter.await.unwrap().unwrap();

    assert!(session.is_healthy());
    assert_eq!(manager.status().in_use, 1);
    assert_eq!(transport.sessions_opened(), 1);
}

#[tokio::test(start_paused = true)]
async fn abandoned_sends_discard_the_session() {
    let (client, transport) = client();
    let manager = client.manager().clone();
    let mut session = manager.acquire(Duration::from_secs(1)).await.unwrap();

    transport.set_latency(Duration::from_secs(5));
    let sent = tokio::time::timeout(
        Duration::from_millis(10),
        session.send("admin", doc! { "ping": 1 }),
    )
    .await;
    assert!(sent.is_err());
    assert!(!session.is_healthy());

    manager.release(session);
    settle().await;
    assert_eq!(transport.sessions_closed(), 1);
    assert_eq!(manager.status().idle, 0);
}

#[tokio::test]
async fn released_handles_are_reused() {
    let (client, transport) = client();

    for _ in 0..5 {
        client.ping().await.unwrap();
    }

    assert_eq!(transport.sessions_opened(), 1);
    assert_eq!(
        client.pool_status(),
        PoolStatus {
            max: 10,
            idle: 1,
            in_use: 0,
            generation: 0,
        }
    );
}

#[tokio::test]
async fn failed_sessions_are_discarded() {
    let (client, transport) = client_with(fast_config().max_read_retries(0).build().unwrap());
    let numbers = client.database("pool").collection("numbers");
    client.ping().await.unwrap();

    transport.fail_next_commands(1);
    assert!(matches!(
        numbers.count(&Filter::match_all()).await,
        Err(ClientError::ConnectionUnavailable(_))
    ));
    settle().await;

    assert_eq!(transport.sessions_closed(), 1);
    assert_eq!(client.pool_status().idle, 0);

    assert_eq!(numbers.count(&Filter::match_all()).await.unwrap(), 0);
    assert_eq!(transport.sessions_opened(), 2);
}

#[tokio::test]
async fn connect_failures_are_retried_with_backoff() {
    let (client, transport) = client_with(fast_config().build().unwrap());

    transport.fail_next_opens(3);
    let err = client.ping().await.unwrap_err();
    assert!(matches!(err, ClientError::ConnectionUnavailable(_)));
    assert_eq!(err.kind(), ErrorKind::ConnectionUnavailable);
    assert_eq!(transport.sessions_opened(), 0);
    assert_eq!(client.pool_status().in_use, 0);

    transport.fail_next_opens(2);
    client.ping().await.unwrap();
    assert_eq!(transport.sessions_opened(), 1);
}

#[tokio::test]
async fn reads_are_retried_on_a_new_session() {
    let (client, transport) = client();
    let numbers = client.database("pool").collection("numbers");
    seed_numbers(&numbers, 1..=3).await;

    transport.fail_next_commands(1);
    assert_eq!(numbers.count(&Filter::match_all()).await.unwrap(), 3);
    assert_eq!(transport.sessions_opened(), 2);
}

#[tokio::test]
async fn writes_are_not_retried_unless_enabled() {
    let (client, transport) = client();
    let numbers = client.database("pool").collection("numbers");

    transport.fail_next_commands(1);
    let err = numbers
        .insert_one(doc! { "_id": 1, "number": 1 })
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::ConnectionUnavailable(_)));
    assert!(transport.server().documents("pool", "numbers").await.is_empty());

    let config = ClientConfig::builder().retry_writes(true).build().unwrap();
    let (client, transport) = client_with(config);
    let numbers = client.database("pool").collection("numbers");

    transport.fail_next_commands(1);
    let result = numbers
        .insert_one(doc! { "_id": 1, "number": 1 })
        .await
        .unwrap();
    assert_eq!(result.inserted_count(), 1);
    assert_eq!(transport.server().documents("pool", "numbers").await.len(), 1);
}

#[tokio::test]
async fn reset_settings_applies_to_new_sessions_only() {
    let (client, transport) = client();
    let manager = client.manager().clone();
    client.ping().await.unwrap();
    let mut leased = manager.acquire(Duration::from_secs(1)).await.unwrap();
    client.ping().await.unwrap();
    assert_eq!(transport.sessions_opened(), 2);

    let generation = client
        .reset_settings(ClientConfig::builder().address("replica:27018").build().unwrap())
        .await
        .unwrap();
    assert_eq!(generation, 1);
    // the idle handle of the old generation is closed right away
    assert_eq!(transport.sessions_closed(), 1);

    // the leased session keeps working under its original settings
    leased.send("admin", doc! { "ping": 1 }).await.unwrap();
    assert_eq!(leased.generation(), 0);
    manager.release(leased);
    settle().await;
    assert_eq!(transport.sessions_closed(), 2);

    client.ping().await.unwrap();
    assert_eq!(
        transport.opened_addresses(),
        vec!["localhost:27017", "localhost:27017", "replica:27018"]
    );
    assert_eq!(client.pool_status().generation, 1);
    assert_eq!(client.config().address, "replica:27018");
}

#[tokio::test]
async fn acquire_honours_cancellation() {
    let (client, _) = client_with(fast_config().pool_max_size(1).build().unwrap());
    let manager = client.manager().clone();

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    assert!(matches!(
        manager
            .acquire_with_cancel(Duration::from_secs(5), &cancelled)
            .await,
        Err(ClientError::Cancelled)
    ));

    let _held = manager.acquire(Duration::from_secs(1)).await.unwrap();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });
    assert!(matches!(
        manager
            .acquire_with_cancel(Duration::from_secs(5), &cancel)
            .await,
        Err(ClientError::Cancelled)
    ));
    assert_eq!(manager.status().in_use, 1);
}

#[tokio::test]
async fn warm_up_opens_the_minimum_pool() {
    let config = ClientConfig::builder().pool_min_size(3).build().unwrap();
    let (client, transport) = client_with(config);

    assert_eq!(client.warm_up().await.unwrap(), 3);
    assert_eq!(client.warm_up().await.unwrap(), 0);
    assert_eq!(transport.sessions_opened(), 3);
    assert_eq!(client.pool_status().idle, 3);
}

#[tokio::test]
async fn shutdown_closes_idle_handles_and_refuses_work() {
    let config = ClientConfig::builder().pool_min_size(2).build().unwrap();
    let (client, transport) = client_with(config);
    client.warm_up().await.unwrap();

    client.shutdown().await;

    assert!(client.manager().is_shut_down());
    assert_eq!(transport.sessions_closed(), 2);
    assert!(matches!(
        client.ping().await,
        Err(ClientError::ConnectionUnavailable(_))
    ));
}

#[test]
fn invalid_pool_bounds_are_rejected() {
    let err = ClientConfig::builder()
        .pool_min_size(5)
        .pool_max_size(2)
        .build()
        .unwrap_err();

    assert!(matches!(err, ClientError::InvalidConfig(_)));
}
