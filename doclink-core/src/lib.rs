//! A small document-store client core that is independent of any particular driver.
//!
//! This crate is the core of the doclink project and provides:
//!
//! - **Documents** ([`document`]) - BSON codec and serde model conversion
//! - **Expressions** ([`filter`], [`update`], [`projection`]) - Immutable, validated query,
//!   update and projection builders
//! - **Configuration** ([`config`]) - Pool, timeout and retry settings, connection strings
//! - **Transport abstraction** ([`transport`]) - The seam a command transport plugs into
//! - **Connection management** ([`pool`]) - Bounded session pool with health and generations
//! - **Handles** ([`client`], [`database`], [`collection`]) - CRUD over leased sessions
//! - **Cursors** ([`cursor`]) - Lazy, batched, cancellable result sequences
//! - **Results and errors** ([`result`], [`error`])
//!
//! # Example
//!
//! ```ignore
//! use doclink_core::{client::Client, config::ClientConfig, filter::Filter, options::FindOptions};
//!
//! let client = Client::new(transport, ClientConfig::default())?;
//! let numbers = client.database("demo").collection("numbers");
//!
//! let mut cursor = numbers.find(&Filter::lte("number", 5), FindOptions::default()).await?;
//! while let Some(document) = cursor.next().await? {
//!     println!("{document}");
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as doclink_core;

pub mod client;
pub mod collection;
pub mod command;
pub mod config;
pub mod cursor;
pub mod database;
pub mod document;
pub mod error;
pub mod filter;
mod instrument;
pub mod options;
pub mod pool;
pub mod projection;
pub mod result;
pub mod transport;
pub mod update;
