//! Connection manager and leased sessions.
//!
//! The [`ConnectionManager`] is the only shared mutable resource of a client. Capacity is a
//! semaphore sized to `pool_max_size`; every leased [`Session`] holds one permit and returns
//! its raw handle to the idle list when dropped. Handles that failed or belong to an older
//! settings generation are closed instead of being reused.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use bson::Document;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    config::ClientConfig,
    error::{ClientError, ClientResult},
    transport::{Transport, TransportError},
};

struct Settings {
    config: Arc<ClientConfig>,
    generation: u64,
}

struct IdleHandle<H> {
    handle: H,
    generation: u64,
}

/// A point-in-time view of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Maximum number of concurrently leased sessions.
    pub max: usize,
    /// Open handles waiting to be leased.
    pub idle: usize,
    /// Sessions currently leased.
    pub in_use: usize,
    /// The current settings generation.
    pub generation: u64,
}

/// A bounded pool of sessions to one server address.
pub struct ConnectionManager<T: Transport> {
    transport: T,
    settings: RwLock<Settings>,
    capacity: Arc<Semaphore>,
    max_size: usize,
    idle: Mutex<Vec<IdleHandle<T::Handle>>>,
    in_use: AtomicUsize,
    closed: AtomicBool,
}

impl<T: Transport> std::fmt::Debug for ConnectionManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("transport", &self.transport)
            .field("status", &self.status())
            .finish()
    }
}

impl<T: Transport> ConnectionManager<T> {
    /// Creates a manager. No handle is opened until the first acquire (or
    /// [`warm_up`](Self::warm_up)).
    pub fn new(transport: T, config: ClientConfig) -> ClientResult<Arc<Self>> {
        config.validate()?;
        let max_size = config.pool_max_size;

        Ok(Arc::new(Self {
            transport,
            settings: RwLock::new(Settings {
                config: Arc::new(config),
                generation: 0,
            }),
            capacity: Arc::new(Semaphore::new(max_size)),
            max_size,
            idle: Mutex::new(Vec::new()),
            in_use: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }))
    }

    /// The transport shared by every session.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The settings new sessions are opened with.
    pub fn config(&self) -> Arc<ClientConfig> {
        self.settings.read().config.clone()
    }

    /// The current settings generation.
    pub fn generation(&self) -> u64 {
        self.settings.read().generation
    }

    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            max: self.max_size,
            idle: self.idle.lock().len(),
            in_use: self.in_use.load(Ordering::Acquire),
            generation: self.generation(),
        }
    }

    /// Leases a session, waiting at most `timeout` for pool capacity.
    ///
    /// # Errors
    ///
    /// - [`ClientError::PoolExhausted`] if no capacity frees up within `timeout`
    /// - [`ClientError::ConnectionUnavailable`] if a new handle cannot be opened within the
    ///   connect retry budget, or the manager has been shut down
    pub async fn acquire(self: &Arc<Self>, timeout: Duration) -> ClientResult<Session<T>> {
        self.acquire_with_cancel(timeout, &CancellationToken::new())
            .await
    }

    /// Leases a session like [`acquire`](Self::acquire), giving up with
    /// [`ClientError::Cancelled`] as soon as `cancel` fires.
    ///
    /// A handle whose connect attempt is interrupted is never handed out.
    pub async fn acquire_with_cancel(
        self: &Arc<Self>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> ClientResult<Session<T>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(shut_down());
        }

        let started = Instant::now();
        let wait = tokio::time::timeout(timeout, self.capacity.clone().acquire_owned());
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            permit = wait => match permit {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => return Err(shut_down()),
                Err(_) => {
                    let waited_ms = started.elapsed().as_millis() as u64;
                    tracing::debug!(waited_ms, "pool capacity wait timed out");
                    return Err(ClientError::PoolExhausted { waited_ms });
                }
            },
        };

        let (config, generation) = {
            let settings = self.settings.read();
            (settings.config.clone(), settings.generation)
        };

        let handle = match self.take_idle(generation).await {
            Some(handle) => handle,
            None => self.open_with_retry(&config, cancel).await?,
        };

        self.in_use.fetch_add(1, Ordering::AcqRel);
        let session = Session {
            id: Uuid::new_v4(),
            handle: Some(handle),
            generation,
            healthy: true,
            operation_timeout: config.operation_timeout(),
            manager: self.clone(),
            _permit: permit,
        };
        tracing::trace!(session = %session.id, generation, "session leased");

        Ok(session)
    }

    /// Returns a session to the pool. Equivalent to dropping it.
    pub fn release(&self, session: Session<T>) {
        drop(session);
    }

    /// Swaps the connection settings used for sessions opened from now on.
    ///
    /// Leased sessions keep working under their original settings and are discarded when
    /// released. Idle handles of the previous generation are closed immediately. The pool
    /// capacity is fixed at construction; a changed `pool_max_size` is ignored.
    ///
    /// Returns the new generation.
    pub async fn reset_settings(&self, config: ClientConfig) -> ClientResult<u64> {
        config.validate()?;
        if config.pool_max_size != self.max_size {
            tracing::warn!(
                current = self.max_size,
                requested = config.pool_max_size,
                "pool capacity cannot change after construction; keeping current size",
            );
        }

        let generation = {
            let mut settings = self.settings.write();
            settings.config = Arc::new(config);
            settings.generation += 1;
            settings.generation
        };

        let stale: Vec<IdleHandle<T::Handle>> = {
            let mut idle = self.idle.lock();
            let (stale, current): (Vec<_>, Vec<_>) = idle
                .drain(..)
                .partition(|entry| entry.generation != generation);
            *idle = current;
            stale
        };
        for entry in stale {
            self.transport.close_session(entry.handle).await;
        }
        tracing::debug!(generation, "connection settings reset");

        Ok(generation)
    }

    /// Opens idle handles until `pool_min_size` are available.
    ///
    /// Returns the number of handles opened.
    pub async fn warm_up(&self) -> ClientResult<usize> {
        let (config, generation) = {
            let settings = self.settings.read();
            (settings.config.clone(), settings.generation)
        };
        let missing = config
            .pool_min_size
            .saturating_sub(self.idle.lock().len());

        let cancel = CancellationToken::new();
        for _ in 0..missing {
            let handle = self.open_with_retry(&config, &cancel).await?;
            self.idle.lock().push(IdleHandle { handle, generation });
        }
        tracing::debug!(opened = missing, "pool warmed up");

        Ok(missing)
    }

    /// Closes every idle handle and refuses further acquires.
    ///
    /// Leased sessions are closed as they are released.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        self.capacity.close();

        let idle: Vec<IdleHandle<T::Handle>> = self.idle.lock().drain(..).collect();
        let count = idle.len();
        for entry in idle {
            self.transport.close_session(entry.handle).await;
        }
        tracing::debug!(closed = count, "connection manager shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Sends a command on a freshly leased session, retrying transport failures up to
    /// `retries` times on new sessions.
    ///
    /// The session is handed back alongside the raw reply so cursors can keep it.
    pub(crate) async fn execute_with_session(
        self: &Arc<Self>,
        database: &str,
        command: &Document,
        retries: u32,
        cancel: &CancellationToken,
    ) -> ClientResult<(Session<T>, Document)> {
        let acquire_timeout = self.config().acquire_timeout();
        let mut attempt = 0;
        loop {
            let mut session = self
                .acquire_with_cancel(acquire_timeout, cancel)
                .await?;

            match session.send_with_cancel(database, command.clone(), cancel).await {
                Ok(reply) => return Ok((session, reply)),
                Err(SendError::Cancelled) => return Err(ClientError::Cancelled),
                Err(SendError::Transport(err)) if attempt < retries => {
                    attempt += 1;
                    tracing::debug!(
                        attempt,
                        retries,
                        error = %err,
                        "retrying command on a new session",
                    );
                }
                Err(SendError::Transport(err)) => {
                    return Err(ClientError::ConnectionUnavailable(err.to_string()));
                }
            }
        }
    }

    /// Like [`execute_with_session`](Self::execute_with_session), releasing the session
    /// before returning the reply.
    pub(crate) async fn execute(
        self: &Arc<Self>,
        database: &str,
        command: &Document,
        retries: u32,
    ) -> ClientResult<Document> {
        let (session, reply) = self
            .execute_with_session(database, command, retries, &CancellationToken::new())
            .await?;
        drop(session);

        Ok(reply)
    }

    async fn take_idle(&self, generation: u64) -> Option<T::Handle> {
        let (found, stale) = {
            let mut idle = self.idle.lock();
            let mut stale = Vec::new();
            let mut found = None;
            while let Some(entry) = idle.pop() {
                if entry.generation == generation {
                    found = Some(entry.handle);
                    break;
                }
                stale.push(entry.handle);
            }
            (found, stale)
        };
        for handle in stale {
            self.transport.close_session(handle).await;
        }

        found
    }

    async fn open_with_retry(
        &self,
        config: &ClientConfig,
        cancel: &CancellationToken,
    ) -> ClientResult<T::Handle> {
        let mut attempt = 0;
        loop {
            let open = tokio::time::timeout(
                config.connect_timeout(),
                self.transport.open_session(config),
            );
            let opened = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                opened = open => {
                    opened.unwrap_or(Err(TransportError::Timeout(config.connect_timeout_ms)))
                }
            };

            let err = match opened {
                Ok(handle) => {
                    tracing::debug!(address = %config.address, attempt, "opened transport handle");
                    return Ok(handle);
                }
                Err(err) => err,
            };

            if attempt >= config.max_connect_retries {
                tracing::warn!(
                    address = %config.address,
                    attempts = attempt + 1,
                    error = %err,
                    "giving up connecting",
                );
                return Err(ClientError::ConnectionUnavailable(format!(
                    "could not connect to {} after {} attempts: {err}",
                    config.address,
                    attempt + 1
                )));
            }

            let backoff = config.backoff(attempt);
            tracing::debug!(
                address = %config.address,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "connect failed, backing off",
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                _ = tokio::time::sleep(backoff) => {}
            }
            attempt += 1;
        }
    }

    fn check_in(self: &Arc<Self>, handle: T::Handle, generation: u64, healthy: bool) {
        let reusable = healthy
            && !self.closed.load(Ordering::Acquire)
            && generation == self.generation();
        if reusable {
            let mut idle = self.idle.lock();
            if idle.len() < self.max_size {
                idle.push(IdleHandle { handle, generation });
                return;
            }
        }

        tracing::debug!(generation, healthy, "discarding transport handle");
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let manager = self.clone();
                runtime.spawn(async move {
                    manager.transport.close_session(handle).await;
                });
            }
            Err(_) => drop(handle),
        }
    }
}

fn shut_down() -> ClientError {
    ClientError::ConnectionUnavailable("connection manager is shut down".to_string())
}

pub(crate) enum SendError {
    Transport(TransportError),
    Cancelled,
}

/// One leased raw transport handle.
///
/// A session is exclusively owned by the operation (or cursor) that acquired it and goes
/// back to its pool when dropped.
pub struct Session<T: Transport> {
    id: Uuid,
    handle: Option<T::Handle>,
    generation: u64,
    healthy: bool,
    operation_timeout: Duration,
    manager: Arc<ConnectionManager<T>>,
    _permit: OwnedSemaphorePermit,
}

impl<T: Transport> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("generation", &self.generation)
            .field("healthy", &self.healthy)
            .finish()
    }
}

impl<T: Transport> Session<T> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The settings generation this session was opened under.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// `false` once a command on this session failed at the transport level or was abandoned
    /// before its reply arrived.
    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    /// Sends a command and returns the raw reply.
    ///
    /// A transport failure marks the session unhealthy and is reported as
    /// [`ClientError::ConnectionUnavailable`].
    pub async fn send(&mut self, database: &str, command: Document) -> ClientResult<Document> {
        self.send_with_cancel(database, command, &CancellationToken::new())
            .await
            .map_err(|err| match err {
                SendError::Transport(err) => ClientError::ConnectionUnavailable(err.to_string()),
                SendError::Cancelled => ClientError::Cancelled,
            })
    }

    pub(crate) async fn send_with_cancel(
        &mut self,
        database: &str,
        command: Document,
        cancel: &CancellationToken,
    ) -> Result<Document, SendError> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(SendError::Transport(TransportError::Closed));
        };

        // Unhealthy until the reply arrives, so a dropped or cancelled send never returns the
        // handle to the idle list with a reply still in flight.
        let was_healthy = std::mem::replace(&mut self.healthy, false);
        let timeout_ms = self.operation_timeout.as_millis() as u64;
        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SendError::Cancelled),
            sent = tokio::time::timeout(
                self.operation_timeout,
                self.manager.transport.send_command(handle, database, command),
            ) => sent.unwrap_or(Err(TransportError::Timeout(timeout_ms))),
        };

        match sent {
            Ok(reply) => {
                self.healthy = was_healthy;
                Ok(reply)
            }
            Err(err) => {
                tracing::debug!(
                    session = %self.id,
                    error = %err,
                    "transport failure, session marked unhealthy",
                );
                Err(SendError::Transport(err))
            }
        }
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        self.manager.in_use.fetch_sub(1, Ordering::AcqRel);
        if let Some(handle) = self.handle.take() {
            self.manager
                .check_in(handle, self.generation, self.healthy);
        }
        tracing::trace!(session = %self.id, "session released");
    }
}
