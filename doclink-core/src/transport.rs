//! Transport abstraction for the client core.
//!
//! The core never frames bytes or speaks to sockets itself. It hands command documents to a
//! [`Transport`] and reads reply documents back, allowing the same pool, cursor and collection
//! logic to run over an in-process server, a driver, or anything else that speaks the command
//! vocabulary.
//!
//! # Traits
//!
//! - [`Transport`]: opens raw handles and sends commands over them
//! - [`TransportBuilder`]: factory trait for creating transport instances
//!
//! # Examples
//!
//! ```ignore
//! use doclink_core::transport::Transport;
//! use bson::doc;
//!
//! let mut handle = transport.open_session(&config).await?;
//! let reply = transport
//!     .send_command(&mut handle, "admin", doc! { "ping": 1 })
//!     .await?;
//! transport.close_session(handle).await;
//! ```

use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use bson::Document;
use thiserror::Error;

use crate::{config::ClientConfig, error::ClientResult};

/// Failure of the raw transport. Any of these leaves the handle unusable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The underlying connection failed.
    #[error("I/O error: {0}")]
    Io(String),
    /// The command or connect attempt did not complete in time.
    #[error("timed out after {0}ms")]
    Timeout(u64),
    /// The handle was closed by the peer.
    #[error("connection closed")]
    Closed,
}

/// Abstract interface for command transports.
///
/// # Thread Safety
///
/// Implementations are shared by every session of a pool and must support concurrent calls
/// from multiple tasks. A single handle is only ever used by one task at a time, which the
/// `&mut` receiver of [`Transport::send_command`] enforces.
///
/// # Replies
///
/// A reply is returned as-is, including server-side failures (`ok: 0` with `code` and
/// `errmsg`). Only failures of the handle itself are reported as [`TransportError`].
#[async_trait]
pub trait Transport: Send + Sync + Debug + 'static {
    /// A raw connection handle.
    type Handle: Send + 'static;

    /// Opens a new raw handle using the connection parameters in `config`.
    ///
    /// # Arguments
    ///
    /// * `config` - The settings generation the handle belongs to
    ///
    /// # Returns
    ///
    /// Returns the handle, or a [`TransportError`] if no connection could be established.
    async fn open_session(&self, config: &ClientConfig) -> Result<Self::Handle, TransportError>;

    /// Sends one command over a handle and waits for its reply.
    ///
    /// # Arguments
    ///
    /// * `handle` - The handle to send on
    /// * `database` - The database the command runs against
    /// * `command` - The command document; its first key names the command
    ///
    /// # Returns
    ///
    /// Returns the reply document, or a [`TransportError`] if the handle failed.
    async fn send_command(
        &self,
        handle: &mut Self::Handle,
        database: &str,
        command: Document,
    ) -> Result<Document, TransportError>;

    /// Closes a handle. Closing never fails from the caller's point of view.
    async fn close_session(&self, handle: Self::Handle);
}

#[async_trait]
impl<T> Transport for Arc<T>
where
    T: Transport,
{
    type Handle = T::Handle;

    async fn open_session(&self, config: &ClientConfig) -> Result<Self::Handle, TransportError> {
        (**self).open_session(config).await
    }

    async fn send_command(
        &self,
        handle: &mut Self::Handle,
        database: &str,
        command: Document,
    ) -> Result<Document, TransportError> {
        (**self).send_command(handle, database, command).await
    }

    async fn close_session(&self, handle: Self::Handle) {
        (**self).close_session(handle).await
    }
}

#[async_trait]
pub trait TransportBuilder {
    type Transport: Transport;

    async fn build(self) -> ClientResult<Self::Transport>;
}
