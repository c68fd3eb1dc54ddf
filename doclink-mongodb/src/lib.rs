//! MongoDB transport for doclink.
//!
//! This crate provides a [`Transport`](doclink_core::transport::Transport) implementation
//! that sends the client core's command documents to a MongoDB deployment through the
//! official async driver. Pooling, retries, cursors and error mapping stay in the core; each
//! handle wraps a driver client pinned to a single connection.
//!
//! To use this transport, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! doclink = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use doclink::{client::Client, config::ClientConfig, mongodb::MongoTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::parse("mongodb://localhost:27017/?maxPoolSize=4")?;
//!     let client = Client::connect(MongoTransport::builder(), config).await?;
//!     client.ping().await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as doclink_mongodb;

pub mod transport;

pub use transport::{MongoTransport, MongoTransportBuilder};
