//! Convenient re-exports of commonly used types from doclink.
//!
//! ```ignore
//! use doclink::prelude::*;
//! ```
//!
//! This provides access to:
//! - Client, database and collection handles
//! - Filter, update and projection builders
//! - Operation options and results
//! - Configuration and the transport traits
//! - Error types

pub use doclink_core::{
    client::Client,
    collection::{Collection, TypedCollection},
    config::{ClientConfig, ClientConfigBuilder, Credential, WriteConcern},
    cursor::{Cursor, CursorState},
    database::Database,
    document::DocumentExt,
    error::{ClientError, ClientResult, ErrorKind},
    filter::{FieldOp, Filter, FilterVisitor},
    options::{
        FindOneAndUpdateOptions, FindOptions, InsertManyOptions, Limit, ReturnDocument,
        UpdateOptions,
    },
    pool::{ConnectionManager, PoolStatus, Session},
    projection::Projection,
    result::{BulkWriteError, InsertOutcome, WriteResult},
    transport::{Transport, TransportBuilder, TransportError},
    update::{Update, UpdateBuilder, UpdateOp},
};
