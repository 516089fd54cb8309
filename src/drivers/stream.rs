//! Streaming result channel.
//!
//! A [`ResultSet`] moves a cursor onto a dedicated producer thread and hands
//! rows to the consumer one at a time. The producer only reads a row once
//! the consumer has asked for one, so at most one row is ever in flight.
//!
//! Three bounded channels link the two sides:
//!
//! - **demand**: consumer to producer, one message per requested row
//! - **rows**: producer to consumer, the requested row
//! - **stop**: consumer to producer, cooperative cancellation
//!
//! When the producer finishes (rows exhausted, stop requested, or the
//! consumer gone) it abandons any unread rows, closes the cursor and hands
//! the cursor back through its join handle.
//!
//! # Example
//!
//! ```ignore
//! use futures::StreamExt;
//!
//! let statement = conn.prepare("SELECT name FROM users")?;
//! if let Some(rows) = conn.stream(statement, &[])? {
//!     let names: Vec<_> = smol::block_on(rows.into_stream().collect());
//! }
//! ```

use std::thread::{self, JoinHandle};

use async_channel::{Receiver, Sender};
use futures::stream::{self, BoxStream};

use crate::error::{Error, Result};
use crate::traits::{ResultCursor, Row};

/// Lifecycle of a [`ResultSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Created, producer not started yet
    Idle,
    /// Producer thread running
    Running,
    /// Producer finished and joined; no more rows
    Stopped,
}

/// Consumer ends of the three channels.
struct Link {
    demand: Sender<()>,
    rows: Receiver<Row>,
    stop: Sender<()>,
}

/// What the producer hands back when it exits.
struct Teardown<C> {
    cursor: C,
    outcome: Result<()>,
}

enum Event {
    Demand,
    Stop,
}

/// Rows of one execution, produced on a background thread.
///
/// Rows are pulled with [`next_row`](Self::next_row), by iterating, or as a
/// [`Stream`](futures::Stream) via [`into_stream`](Self::into_stream). A row
/// whose fetch failed carries the error (see [`Row::error`]).
///
/// Dropping a running result set stops the producer and waits for it.
pub struct ResultSet<C: ResultCursor + Send + 'static> {
    state: StreamState,
    cursor: Option<C>,
    link: Option<Link>,
    producer: Option<JoinHandle<Teardown<C>>>,
    failure: Option<Error>,
}

impl<C: ResultCursor + Send + 'static> std::fmt::Debug for ResultSet<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSet")
            .field("state", &self.state)
            .field("producer", &self.producer.is_some())
            .finish()
    }
}

impl<C: ResultCursor + Send + 'static> ResultSet<C> {
    /// Wrap a cursor. The producer starts on the first request for a row.
    pub fn new(cursor: C) -> Self {
        Self {
            state: StreamState::Idle,
            cursor: Some(cursor),
            link: None,
            producer: None,
            failure: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Receive the next row, or `None` once the producer has finished.
    pub async fn next_row(&mut self) -> Option<Row> {
        match self.state {
            StreamState::Stopped => return None,
            StreamState::Idle => {
                if let Err(row) = self.start() {
                    return Some(row);
                }
            }
            StreamState::Running => {}
        }

        let link = self.link.as_ref()?;
        if link.demand.send(()).await.is_err() {
            self.finish_quietly();
            return None;
        }

        match link.rows.recv().await {
            Ok(row) => Some(row),
            Err(_) => {
                self.finish_quietly();
                None
            }
        }
    }

    /// Ask the producer to stop and wait for it to finish.
    ///
    /// Unread rows are abandoned and the cursor's statement is cleared.
    /// Calling `stop` again is harmless.
    pub fn stop(&mut self) -> Result<()> {
        match self.state {
            StreamState::Idle => {
                self.state = StreamState::Stopped;
                match self.cursor.as_mut() {
                    Some(cursor) => {
                        let discarded = cursor.discard();
                        let closed = cursor.close();
                        discarded.and(closed)
                    }
                    None => Ok(()),
                }
            }
            StreamState::Running => {
                if let Some(link) = self.link.take() {
                    // A full stop channel means a stop is already pending.
                    let _ = link.stop.try_send(());
                }
                self.finish()
            }
            StreamState::Stopped => match self.failure.take() {
                Some(e) => Err(e),
                None => Ok(()),
            },
        }
    }

    /// Stop the producer and take back the closed cursor.
    pub fn close(mut self) -> Result<C> {
        self.stop()?;
        self.cursor
            .take()
            .ok_or_else(|| Error::driver("ResultSet: cursor was lost with its producer thread"))
    }

    /// Turn the result set into an async stream of rows.
    pub fn into_stream(self) -> BoxStream<'static, Row> {
        Box::pin(stream::unfold(self, |mut rows| async move {
            let row = rows.next_row().await?;
            Some((row, rows))
        }))
    }

    fn start(&mut self) -> Result<(), Row> {
        let Some(cursor) = self.cursor.take() else {
            self.state = StreamState::Stopped;
            return Err(Row::failed(Error::driver("ResultSet: no cursor to stream")));
        };

        let (demand_tx, demand_rx) = async_channel::bounded(1);
        let (rows_tx, rows_rx) = async_channel::bounded(1);
        let (stop_tx, stop_rx) = async_channel::bounded(1);

        let spawned = thread::Builder::new()
            .name("sqlite3-result-set".to_string())
            .spawn(move || smol::block_on(produce(cursor, demand_rx, rows_tx, stop_rx)));

        match spawned {
            Ok(handle) => {
                tracing::debug!("ResultSet: producer started");
                self.producer = Some(handle);
                self.link = Some(Link {
                    demand: demand_tx,
                    rows: rows_rx,
                    stop: stop_tx,
                });
                self.state = StreamState::Running;
                Ok(())
            }
            Err(e) => {
                self.state = StreamState::Stopped;
                Err(Row::failed(Error::driver(format!(
                    "ResultSet: failed to start producer: {}",
                    e
                ))))
            }
        }
    }

    /// Drop the consumer ends and join the producer.
    fn finish(&mut self) -> Result<()> {
        self.link = None;
        self.state = StreamState::Stopped;

        let Some(handle) = self.producer.take() else {
            return Ok(());
        };
        match handle.join() {
            Ok(Teardown { cursor, outcome }) => {
                tracing::debug!("ResultSet: producer finished");
                self.cursor = Some(cursor);
                outcome
            }
            Err(_) => Err(Error::driver("ResultSet: producer thread panicked")),
        }
    }

    /// [`finish`](Self::finish), keeping any error for the next `stop`.
    fn finish_quietly(&mut self) {
        if let Err(e) = self.finish() {
            self.failure = Some(e);
        }
    }
}

impl<C: ResultCursor + Send + 'static> Iterator for ResultSet<C> {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        smol::block_on(self.next_row())
    }
}

impl<C: ResultCursor + Send + 'static> Drop for ResultSet<C> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!("Ignoring error while dropping result set: {}", e);
        }
    }
}

async fn produce<C: ResultCursor>(
    mut cursor: C,
    demand: Receiver<()>,
    rows: Sender<Row>,
    stop: Receiver<()>,
) -> Teardown<C> {
    let mut stopped = false;

    while cursor.has_more() {
        // Stop is polled first so it wins over a pending demand.
        let event = smol::future::or(
            async {
                let _ = stop.recv().await;
                Event::Stop
            },
            async {
                match demand.recv().await {
                    Ok(()) => Event::Demand,
                    Err(_) => Event::Stop,
                }
            },
        )
        .await;

        if let Event::Stop = event {
            stopped = true;
            break;
        }

        let row = cursor.fetch_one().unwrap_or_else(Row::failed);
        if rows.send(row).await.is_err() {
            stopped = true;
            break;
        }
    }

    let mut outcome = Ok(());
    if stopped && cursor.has_more() {
        tracing::debug!("ResultSet: stopped with rows remaining");
        outcome = cursor.discard();
    }
    if let Err(e) = cursor.close() {
        match outcome {
            Ok(()) => outcome = Err(e),
            Err(_) => tracing::warn!("Ignoring secondary error while closing cursor: {}", e),
        }
    }

    Teardown { cursor, outcome }
}
