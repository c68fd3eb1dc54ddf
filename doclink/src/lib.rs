//! Main doclink crate providing a unified interface to a document store.
//!
//! This crate is the primary entry point for users of doclink. It re-exports the client core
//! and the available transports.
//!
//! # Features
//!
//! - **Typed expressions** - Immutable filter, update and projection builders validated
//!   before anything reaches the network
//! - **Pooled sessions** - Bounded, health-checked session pool with timeouts, retries and
//!   cancellation
//! - **Lazy cursors** - Batched result sequences with explicit close and stream conversion
//! - **Multiple transports** - An in-process server for tests and a MongoDB transport
//!
//! # Quick Start
//!
//! ```ignore
//! use doclink::{prelude::*, bson::doc, memory::MemoryTransport};
//!
//! #[tokio::main]
//! async fn main() -> ClientResult<()> {
//!     let client = Client::connect(MemoryTransport::builder(), ClientConfig::default()).await?;
//!     let numbers = client.database("demo").collection("numbers");
//!
//!     numbers
//!         .insert_many(
//!             (0..=10).map(|n| doc! { "number": n }).collect(),
//!             InsertManyOptions::default(),
//!         )
//!         .await?;
//!
//!     let updated = numbers
//!         .update_many(
//!             &Filter::lte("number", 5),
//!             &Update::set("small", true),
//!             UpdateOptions::default(),
//!         )
//!         .await?;
//!     println!("modified {} documents", updated.modified_count());
//!
//!     let mut cursor = numbers
//!         .find(&Filter::eq("small", true), FindOptions::default())
//!         .await?;
//!     while let Some(document) = cursor.next().await? {
//!         println!("{document}");
//!     }
//!
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Cancellation
//!
//! Every suspending cursor and pool operation has a `*_with_cancel` form taking a
//! [`CancellationToken`]. Cancelling resolves the operation with
//! [`ClientError::Cancelled`](error::ClientError::Cancelled) and never leaks a pool slot.
//!
//! # Transports
//!
//! - [`memory`] - In-process server for development and testing
//! - [`mongodb`] - MongoDB driver transport (requires `mongodb` feature)

pub mod prelude;

pub use doclink_core::{
    client, collection, command, config, cursor, database, document, error, filter, options,
    pool, projection, result, transport, update,
};

// Re-export BSON types for convenience
pub use bson;
pub use tokio_util::sync::CancellationToken;

/// In-process server and transport.
pub mod memory {
    pub use doclink_memory::{MemoryHandle, MemoryServer, MemoryTransport, MemoryTransportBuilder};
}

/// MongoDB transport.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use doclink_mongodb::{MongoTransport, MongoTransportBuilder};
}
