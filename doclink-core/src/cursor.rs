//! Lazy, forward-only batched result cursor.
//!
//! A cursor starts [`CursorState::Pending`]: the `find` command is built but nothing has
//! been sent. The first pull leases a session, sends the command and buffers the first
//! batch. Later pulls drain the buffer and issue `getMore` on the same session whenever it
//! runs dry while the server cursor is still live.
//!
//! ```text
//! Pending --pull--> Fetching --> Open --buffer empty, id != 0--> Fetching --> Open
//!                                  \--buffer empty, id == 0--> Exhausted
//! any state --close()--> Closed
//! ```

use std::{collections::VecDeque, sync::Arc};

use bson::Document;
use futures::Stream;
use tokio_util::sync::CancellationToken;

use crate::{
    command::{self, CursorReply},
    error::{ClientError, ClientResult},
    pool::{ConnectionManager, SendError, Session},
    transport::Transport,
};

/// Lifecycle state of a [`Cursor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Command built, nothing sent.
    Pending,
    /// A `find` or `getMore` is in flight.
    Fetching,
    /// Documents are buffered or the server cursor is still live.
    Open,
    /// Every result has been returned. Pulls keep returning `None`.
    Exhausted,
    /// Closed by the caller or by a failed fetch. Pulls fail with `CursorClosed`.
    Closed,
}

/// A lazy sequence of query results.
///
/// # Example
///
/// ```ignore
/// let mut cursor = collection.find(Filter::lte("number", 5), FindOptions::default()).await?;
/// while let Some(document) = cursor.next().await? {
///     println!("{document}");
/// }
/// ```
pub struct Cursor<T: Transport> {
    manager: Arc<ConnectionManager<T>>,
    database: String,
    collection: String,
    find: Option<Document>,
    session: Option<Session<T>>,
    buffer: VecDeque<Document>,
    cursor_id: i64,
    batch_size: u32,
    remaining: Option<u64>,
    read_retries: u32,
    state: CursorState,
}

impl<T: Transport> std::fmt::Debug for Cursor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("namespace", &self.namespace())
            .field("state", &self.state)
            .field("cursor_id", &self.cursor_id)
            .field("buffered", &self.buffer.len())
            .finish()
    }
}

impl<T: Transport> Cursor<T> {
    pub(crate) fn new(
        manager: Arc<ConnectionManager<T>>,
        database: String,
        collection: String,
        find: Document,
        batch_size: u32,
        limit: Option<u64>,
        read_retries: u32,
    ) -> Self {
        Self {
            manager,
            database,
            collection,
            find: Some(find),
            session: None,
            buffer: VecDeque::new(),
            cursor_id: 0,
            batch_size,
            remaining: limit,
            read_retries,
            state: CursorState::Pending,
        }
    }

    pub fn state(&self) -> CursorState {
        self.settled_state()
    }

    /// Number of documents fetched but not yet returned.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// The live server cursor id, `None` before the first fetch and after exhaustion.
    pub fn server_cursor_id(&self) -> Option<i64> {
        (self.cursor_id != 0).then_some(self.cursor_id)
    }

    pub fn namespace(&self) -> String {
        format!("{}.{}", self.database, self.collection)
    }

    /// Returns the next document, `None` once the results are exhausted.
    ///
    /// # Errors
    ///
    /// - [`ClientError::CursorClosed`] if the cursor has been closed
    /// - any error of the underlying `find`/`getMore`; the cursor is closed afterwards
    pub async fn next(&mut self) -> ClientResult<Option<Document>> {
        self.next_with_cancel(&CancellationToken::new()).await
    }

    /// Like [`next`](Self::next), giving up with [`ClientError::Cancelled`] when `cancel`
    /// fires during a fetch.
    ///
    /// A cancelled fetch leaves the cursor usable: an open cursor stays `Open` with its
    /// buffer intact and a pending one stays `Pending`.
    /// Dropping the returned future mid-fetch, for example through `tokio::time::timeout`,
    /// has the same effect. The next `getMore` then goes out on a fresh session.
    pub async fn next_with_cancel(
        &mut self,
        cancel: &CancellationToken,
    ) -> ClientResult<Option<Document>> {
        loop {
            self.state = self.settled_state();
            match self.state {
                CursorState::Closed => return Err(ClientError::CursorClosed),
                CursorState::Exhausted => return Ok(None),
                _ => {}
            }

            if self.remaining == Some(0) {
                self.kill_server_cursor().await;
                self.exhaust();
                return Ok(None);
            }

            if let Some(document) = self.buffer.pop_front() {
                if let Some(remaining) = self.remaining.as_mut() {
                    *remaining -= 1;
                }
                return Ok(Some(document));
            }

            if self.find.is_some() {
                self.fetch_first(cancel).await?;
            } else if self.cursor_id == 0 {
                self.exhaust();
                return Ok(None);
            } else {
                self.fetch_more(cancel).await?;
            }
        }
    }

    /// Drains the cursor into a vector.
    pub async fn try_collect(mut self) -> ClientResult<Vec<Document>> {
        let mut documents = Vec::with_capacity(self.buffer.len());
        while let Some(document) = self.next().await? {
            documents.push(document);
        }

        Ok(documents)
    }

    /// Converts the cursor into a stream of documents.
    pub fn into_stream(self) -> impl Stream<Item = ClientResult<Document>> + Send {
        futures::stream::try_unfold(self, |mut cursor| async move {
            Ok(cursor
                .next()
                .await?
                .map(|document| (document, cursor)))
        })
    }

    /// Closes the cursor, killing a live server cursor and releasing the session.
    ///
    /// Closing is idempotent. Every later pull fails with [`ClientError::CursorClosed`].
    pub async fn close(&mut self) {
        self.kill_server_cursor().await;
        self.buffer.clear();
        self.find = None;
        if self.state != CursorState::Closed {
            tracing::debug!(namespace = %self.namespace(), "cursor closed");
        }
        self.state = CursorState::Closed;
    }

    async fn fetch_first(&mut self, cancel: &CancellationToken) -> ClientResult<()> {
        let Some(find) = self.find.as_ref() else {
            self.state = CursorState::Closed;
            return Err(ClientError::CursorClosed);
        };

        self.state = CursorState::Fetching;
        let sent = self
            .manager
            .execute_with_session(&self.database, find, self.read_retries, cancel)
            .await;
        let (session, reply) = match sent {
            Ok(sent) => sent,
            Err(ClientError::Cancelled) => {
                self.state = CursorState::Pending;
                return Err(ClientError::Cancelled);
            }
            Err(err) => return Err(self.fail(err)),
        };

        self.find = None;
        self.session = Some(session);
        self.absorb(reply)
    }

    async fn fetch_more(&mut self, cancel: &CancellationToken) -> ClientResult<()> {
        let batch_size = match self.remaining {
            Some(remaining) => remaining.min(u64::from(self.batch_size)) as u32,
            None => self.batch_size,
        };
        let get_more = command::get_more(&self.collection, self.cursor_id, batch_size);

        self.state = CursorState::Fetching;
        // A session whose last send was abandoned may still receive that reply.
        if !self.session.as_ref().is_some_and(Session::is_healthy) {
            self.session = None;
            let acquire_timeout = self.manager.config().acquire_timeout();
            match self
                .manager
                .acquire_with_cancel(acquire_timeout, cancel)
                .await
            {
                Ok(session) => self.session = Some(session),
                Err(ClientError::Cancelled) => {
                    self.state = CursorState::Open;
                    return Err(ClientError::Cancelled);
                }
                Err(err) => return Err(self.fail(err)),
            }
        }
        let Some(session) = self.session.as_mut() else {
            self.state = CursorState::Closed;
            return Err(ClientError::CursorClosed);
        };

        tracing::trace!(cursor_id = self.cursor_id, batch_size, "fetching next batch");
        let sent = session
            .send_with_cancel(&self.database, get_more, cancel)
            .await;
        match sent {
            Ok(reply) => self.absorb(reply),
            Err(SendError::Cancelled) => {
                self.state = CursorState::Open;
                Err(ClientError::Cancelled)
            }
            Err(SendError::Transport(err)) => {
                Err(self.fail(ClientError::ConnectionUnavailable(err.to_string())))
            }
        }
    }

    fn absorb(&mut self, reply: Document) -> ClientResult<()> {
        let parsed = command::check_reply(reply).and_then(|reply| CursorReply::parse(&reply));
        let cursor = match parsed {
            Ok(cursor) => cursor,
            Err(err) => return Err(self.fail(err)),
        };

        self.buffer.extend(cursor.batch);
        self.cursor_id = cursor.id;
        self.state = CursorState::Open;
        if self.cursor_id == 0 {
            // nothing left on the server; the session can go back right away
            self.session = None;
        }
        tracing::trace!(
            cursor_id = self.cursor_id,
            buffered = self.buffer.len(),
            "batch received",
        );

        Ok(())
    }

    fn exhaust(&mut self) {
        self.session = None;
        self.buffer.clear();
        self.state = CursorState::Exhausted;
        tracing::debug!(namespace = %self.namespace(), "cursor exhausted");
    }

    fn fail(&mut self, err: ClientError) -> ClientError {
        tracing::debug!(
            namespace = %self.namespace(),
            error = %err,
            "cursor fetch failed, closing",
        );
        self.session = None;
        self.buffer.clear();
        self.find = None;
        self.cursor_id = 0;
        self.state = CursorState::Closed;
        err
    }

    /// The externally visible state. A fetch whose future was dropped leaves `Fetching`
    /// behind; the cursor is then still `Pending` or `Open`.
    fn settled_state(&self) -> CursorState {
        match self.state {
            CursorState::Fetching if self.find.is_some() => CursorState::Pending,
            CursorState::Fetching => CursorState::Open,
            state => state,
        }
    }

    async fn kill_server_cursor(&mut self) {
        let cursor_id = std::mem::take(&mut self.cursor_id);
        let session = self.session.take();
        if cursor_id == 0 {
            return;
        }

        kill_cursor(
            self.manager.clone(),
            session,
            &self.database,
            &self.collection,
            cursor_id,
        )
        .await;
    }
}

/// Sends `killCursors`, on a fresh session when `session` is missing or unhealthy.
async fn kill_cursor<T: Transport>(
    manager: Arc<ConnectionManager<T>>,
    session: Option<Session<T>>,
    database: &str,
    collection: &str,
    cursor_id: i64,
) {
    let session = match session.filter(Session::is_healthy) {
        Some(session) => Ok(session),
        None => {
            let acquire_timeout = manager.config().acquire_timeout();
            manager.acquire(acquire_timeout).await
        }
    };
    let kill = command::kill_cursors(collection, &[cursor_id]);
    let killed = match session {
        Ok(mut session) => session.send(database, kill).await.map(drop),
        Err(err) => Err(err),
    };
    if let Err(err) = killed {
        tracing::debug!(cursor_id, error = %err, "failed to kill server cursor");
    }
}

impl<T: Transport> Drop for Cursor<T> {
    fn drop(&mut self) {
        if self.cursor_id == 0 {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let manager = self.manager.clone();
        let session = self.session.take();
        let database = self.database.clone();
        let collection = self.collection.clone();
        let cursor_id = self.cursor_id;
        runtime.spawn(async move {
            kill_cursor(manager, session, &database, &collection, cursor_id).await;
        });
    }
}
