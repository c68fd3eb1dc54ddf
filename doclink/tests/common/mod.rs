#![allow(dead_code)]

use doclink::{
    bson::{Document, doc},
    memory::MemoryTransport,
    prelude::*,
};
use tracing_subscriber::EnvFilter;

/// Installs a test subscriber once; filter with `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A client over a fresh in-process server, plus a handle to its transport.
pub fn client() -> (Client<MemoryTransport>, MemoryTransport) {
    client_with(ClientConfig::default())
}

pub fn client_with(config: ClientConfig) -> (Client<MemoryTransport>, MemoryTransport) {
    init_tracing();
    let transport = MemoryTransport::new();
    let client = Client::new(transport.clone(), config).expect("valid config");

    (client, transport)
}

/// A config with short timeouts and backoff so failure paths finish quickly.
pub fn fast_config() -> ClientConfigBuilder {
    ClientConfig::builder()
        .acquire_timeout_ms(200)
        .connect_timeout_ms(200)
        .operation_timeout_ms(1_000)
        .connect_retries(2, 1, 5)
}

/// Inserts one document per number in `numbers`, with the number as both `_id` and
/// `number`.
pub async fn seed_numbers(
    collection: &Collection<MemoryTransport>,
    numbers: impl IntoIterator<Item = i32>,
) {
    let documents: Vec<Document> = numbers
        .into_iter()
        .map(|n| doc! { "_id": n, "number": n })
        .collect();
    collection
        .insert_many(documents, InsertManyOptions::default())
        .await
        .expect("seed insert");
}

pub fn numbers_of(documents: &[Document]) -> Vec<i32> {
    documents
        .iter()
        .map(|document| document.get_i32("number").expect("number field"))
        .collect()
}

/// Lets spawned session-close tasks run.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
