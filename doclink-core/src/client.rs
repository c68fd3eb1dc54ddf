//! Client entry point.
//!
//! A [`Client`] owns the [`ConnectionManager`] for one server address. Database and
//! collection handles obtained from it share that manager and are cheap to clone.
//!
//! # Example
//!
//! ```ignore
//! use doclink_core::{client::Client, config::ClientConfig};
//!
//! let config = ClientConfig::parse("doclink://localhost:27017/?maxPoolSize=4")?;
//! let client = Client::new(transport, config)?;
//! let names = client.list_database_names().await?;
//! ```

use std::sync::Arc;

use bson::{Bson, Document};

use crate::{
    command,
    config::ClientConfig,
    database::Database,
    error::ClientResult,
    instrument::instrument,
    pool::{ConnectionManager, PoolStatus},
    transport::{Transport, TransportBuilder},
};

const ADMIN_DATABASE: &str = "admin";

/// A client bound to one transport and one connection manager.
pub struct Client<T: Transport> {
    manager: Arc<ConnectionManager<T>>,
}

impl<T: Transport> Clone for Client<T> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
        }
    }
}

impl<T: Transport> std::fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("manager", &self.manager)
            .finish()
    }
}

impl<T: Transport> Client<T> {
    /// Creates a client. No connection is made until the first operation.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidConfig`](crate::error::ClientError::InvalidConfig) if
    /// the config does not validate.
    pub fn new(transport: T, config: ClientConfig) -> ClientResult<Self> {
        Ok(Self {
            manager: ConnectionManager::new(transport, config)?,
        })
    }

    /// Builds the transport, then creates a client over it.
    pub async fn connect<B>(builder: B, config: ClientConfig) -> ClientResult<Self>
    where
        B: TransportBuilder<Transport = T>,
    {
        let transport = builder.build().await?;

        Self::new(transport, config)
    }

    /// Gets a handle to a database.
    pub fn database(&self, name: &str) -> Database<T> {
        Database::new(name.to_string(), self.manager.clone())
    }

    /// The connection manager shared by every handle of this client.
    pub fn manager(&self) -> &Arc<ConnectionManager<T>> {
        &self.manager
    }

    pub fn config(&self) -> Arc<ClientConfig> {
        self.manager.config()
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.manager.status()
    }

    /// Round-trips a `ping` to check the server is reachable.
    pub async fn ping(&self) -> ClientResult<()> {
        instrument("ping", ADMIN_DATABASE, async {
            let reply = self
                .manager
                .execute(ADMIN_DATABASE, &command::ping(), 0)
                .await?;
            command::check_reply(reply)?;

            Ok(())
        })
        .await
    }

    /// Lists the descriptor document (`name`, `sizeOnDisk`, `empty`) of every database.
    pub async fn list_databases(&self) -> ClientResult<Vec<Document>> {
        instrument("list_databases", ADMIN_DATABASE, async {
            self.databases(false).await
        })
        .await
    }

    /// Lists the name of every database.
    pub async fn list_database_names(&self) -> ClientResult<Vec<String>> {
        instrument("list_database_names", ADMIN_DATABASE, async {
            Ok(self
                .databases(true)
                .await?
                .iter()
                .filter_map(|database| database.get_str("name").ok())
                .map(str::to_string)
                .collect())
        })
        .await
    }

    /// Swaps the connection settings for sessions opened from now on.
    ///
    /// Handles already created keep working with their original settings; sessions leased
    /// under the previous settings are discarded when released. Returns the new settings
    /// generation.
    pub async fn reset_settings(&self, config: ClientConfig) -> ClientResult<u64> {
        self.manager.reset_settings(config).await
    }

    /// Opens `pool_min_size` idle sessions ahead of time.
    pub async fn warm_up(&self) -> ClientResult<usize> {
        self.manager.warm_up().await
    }

    /// Closes idle sessions and refuses further operations.
    pub async fn shutdown(&self) {
        self.manager.shutdown().await
    }

    async fn databases(&self, name_only: bool) -> ClientResult<Vec<Document>> {
        let reply = self
            .manager
            .execute(
                ADMIN_DATABASE,
                &command::list_databases(name_only),
                self.manager.config().max_read_retries,
            )
            .await?;
        let reply = command::check_reply(reply)?;

        Ok(reply
            .get_array("databases")
            .map(|databases| {
                databases
                    .iter()
                    .filter_map(Bson::as_document)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
