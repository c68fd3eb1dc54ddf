//! A [`Transport`] that talks to a [`MemoryServer`] in the same process.
//!
//! Commands and replies are encoded to BSON bytes and decoded again on every hop, so the
//! documents that reach the server are exactly what a remote transport would put on the wire.
//! Faults (refused connects, broken handles, latency) can be injected for tests.

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bson::Document;
use parking_lot::Mutex;
use tracing::debug;

use doclink_core::{
    config::ClientConfig,
    document,
    error::ClientResult,
    transport::{Transport, TransportBuilder, TransportError},
};

use crate::server::MemoryServer;

/// How many command names [`MemoryTransport::command_log`] keeps.
pub const COMMAND_LOG_CAPACITY: usize = 1024;

/// A raw handle to the in-process server.
#[derive(Debug)]
pub struct MemoryHandle {
    id: u64,
    address: String,
    broken: bool,
}

impl MemoryHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The address the handle was opened for.
    pub fn address(&self) -> &str {
        &self.address
    }
}

#[derive(Debug, Default)]
struct Faults {
    failing_opens: usize,
    failing_commands: usize,
    latency: Duration,
}

#[derive(Debug, Default)]
struct Stats {
    next_handle: AtomicU64,
    commands_sent: AtomicUsize,
    sessions_opened: AtomicUsize,
    sessions_closed: AtomicUsize,
    command_log: Mutex<VecDeque<String>>,
    opened_addresses: Mutex<Vec<String>>,
}

/// Transport over a [`MemoryServer`].
///
/// Clones share the server, the injected faults and the counters.
#[derive(Clone, Debug, Default)]
pub struct MemoryTransport {
    server: MemoryServer,
    faults: Arc<Mutex<Faults>>,
    stats: Arc<Stats>,
}

impl MemoryTransport {
    /// Creates a transport over a fresh, empty server.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport over an existing server.
    pub fn with_server(server: MemoryServer) -> Self {
        Self {
            server,
            ..Self::default()
        }
    }

    pub fn builder() -> MemoryTransportBuilder {
        MemoryTransportBuilder::default()
    }

    pub fn server(&self) -> &MemoryServer {
        &self.server
    }

    /// Makes the next `count` connect attempts fail.
    pub fn fail_next_opens(&self, count: usize) {
        self.faults.lock().failing_opens = count;
    }

    /// Makes the next `count` commands fail before reaching the server, breaking the handle
    /// they were sent on.
    pub fn fail_next_commands(&self, count: usize) {
        self.faults.lock().failing_commands = count;
    }

    /// Delays every command by `latency` before it reaches the server.
    pub fn set_latency(&self, latency: Duration) {
        self.faults.lock().latency = latency;
    }

    /// Commands handed to the transport, including ones that failed.
    pub fn commands_sent(&self) -> usize {
        self.stats.commands_sent.load(Ordering::SeqCst)
    }

    pub fn sessions_opened(&self) -> usize {
        self.stats.sessions_opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> usize {
        self.stats.sessions_closed.load(Ordering::SeqCst)
    }

    /// The names of the most recent commands handed to the transport, oldest first.
    ///
    /// At most [`COMMAND_LOG_CAPACITY`] names are kept.
    pub fn command_log(&self) -> Vec<String> {
        self.stats.command_log.lock().iter().cloned().collect()
    }

    /// The address of every successfully opened handle, in order.
    pub fn opened_addresses(&self) -> Vec<String> {
        self.stats.opened_addresses.lock().clone()
    }

    fn take_fault(counter: &mut usize) -> bool {
        if *counter == 0 {
            return false;
        }

        *counter -= 1;
        true
    }
}

fn wire_round_trip(document: &Document) -> Result<Document, TransportError> {
    document::encode(document)
        .and_then(|bytes| document::decode(&bytes))
        .map_err(|err| TransportError::Io(err.to_string()))
}

#[async_trait]
impl Transport for MemoryTransport {
    type Handle = MemoryHandle;

    async fn open_session(&self, config: &ClientConfig) -> Result<MemoryHandle, TransportError> {
        if Self::take_fault(&mut self.faults.lock().failing_opens) {
            debug!(address = %config.address, "refusing injected connect failure");
            return Err(TransportError::Io(format!(
                "connection to {} refused",
                config.address
            )));
        }

        let id = self.stats.next_handle.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.sessions_opened.fetch_add(1, Ordering::SeqCst);
        self.stats
            .opened_addresses
            .lock()
            .push(config.address.clone());

        Ok(MemoryHandle {
            id,
            address: config.address.clone(),
            broken: false,
        })
    }

    async fn send_command(
        &self,
        handle: &mut MemoryHandle,
        database: &str,
        command: Document,
    ) -> Result<Document, TransportError> {
        if handle.broken {
            return Err(TransportError::Closed);
        }

        self.stats.commands_sent.fetch_add(1, Ordering::SeqCst);
        {
            let mut log = self.stats.command_log.lock();
            if log.len() == COMMAND_LOG_CAPACITY {
                log.pop_front();
            }
            log.push_back(command.keys().next().cloned().unwrap_or_default());
        }

        let (fail, latency) = {
            let mut faults = self.faults.lock();
            (Self::take_fault(&mut faults.failing_commands), faults.latency)
        };
        if fail {
            handle.broken = true;
            return Err(TransportError::Io("connection reset by peer".to_string()));
        }
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let command = wire_round_trip(&command)?;
        let reply = self.server.handle(database, command).await;

        wire_round_trip(&reply)
    }

    async fn close_session(&self, handle: MemoryHandle) {
        debug!(handle = handle.id, "closing memory session");
        self.stats.sessions_closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Builder for [`MemoryTransport`] instances.
///
/// # Example
///
/// ```ignore
/// use doclink_core::{client::Client, config::ClientConfig};
/// use doclink_memory::MemoryTransport;
///
/// let client = Client::connect(MemoryTransport::builder(), ClientConfig::default()).await?;
/// ```
#[derive(Default)]
pub struct MemoryTransportBuilder {
    server: Option<MemoryServer>,
}

impl MemoryTransportBuilder {
    /// Shares an existing server instead of starting an empty one.
    pub fn server(mut self, server: MemoryServer) -> Self {
        self.server = Some(server);
        self
    }
}

#[async_trait]
impl TransportBuilder for MemoryTransportBuilder {
    type Transport = MemoryTransport;

    async fn build(self) -> ClientResult<Self::Transport> {
        Ok(match self.server {
            Some(server) => MemoryTransport::with_server(server),
            None => MemoryTransport::new(),
        })
    }
}
