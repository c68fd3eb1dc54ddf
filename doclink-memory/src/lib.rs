//! In-process document server and transport for doclink.
//!
//! This crate provides a [`MemoryServer`] that answers the command vocabulary of the client
//! core entirely in memory, and a [`MemoryTransport`] that connects a client to it. It is
//! ideal for development, testing and examples.
//!
//! # Features
//!
//! - **Full command set** - Insert, find with server-side cursors, update, delete,
//!   find-and-modify, count and namespace commands
//! - **Atomic writes** - Every write command runs under an async-aware write lock
//! - **Wire fidelity** - Commands and replies are BSON-encoded on every hop
//! - **Fault injection** - Refused connects, broken handles and latency for tests
//!
//! # Quick Start
//!
//! ```ignore
//! use bson::doc;
//! use doclink_core::{client::Client, config::ClientConfig, filter::Filter};
//! use doclink_memory::MemoryTransport;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::connect(MemoryTransport::builder(), ClientConfig::default()).await?;
//!     let numbers = client.database("demo").collection("numbers");
//!
//!     numbers.insert_one(doc! { "number": 1 }).await?;
//!     assert_eq!(numbers.count(&Filter::match_all()).await?, 1);
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as doclink_memory;

mod apply;
mod evaluator;
pub mod server;
pub mod transport;

pub use server::MemoryServer;
pub use transport::{MemoryHandle, MemoryTransport, MemoryTransportBuilder};
