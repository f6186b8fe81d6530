//! Bounded connection pool for corpus store handles.
//!
//! A `tokio::sync::Semaphore` with `max` permits bounds how many handles are
//! checked out at once; idle handles wait on a stack for reuse. Acquisition
//! waits up to the configured timeout and then fails with
//! [`RetrievalError::PoolExhausted`], which callers may retry.
//!
//! Handles are returned by dropping the [`PooledConnection`] guard, so every
//! exit path of a request releases its connection. A handle that hit a
//! transient failure should be [`discard`](PooledConnection::discard)ed so
//! the next request opens a fresh one.

use async_trait::async_trait;
use serde::Serialize;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use compliance_harness_core::error::{RetrievalError, StoreError};
use compliance_harness_core::store::memory::InMemoryCorpus;
use compliance_harness_core::store::CorpusStore;

use crate::config::PoolConfig;

/// Opens store handles for a [`ConnectionPool`].
#[async_trait]
pub trait ConnectionManager: Send + Sync + 'static {
    type Connection: CorpusStore + 'static;

    async fn connect(&self) -> Result<Self::Connection, StoreError>;
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub in_use: usize,
    pub peak_in_use: usize,
    pub idle: usize,
    pub max: usize,
}

pub struct ConnectionPool<M: ConnectionManager> {
    manager: M,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<M::Connection>>,
    min: usize,
    max: usize,
    acquire_timeout: Duration,
    in_use: AtomicUsize,
    peak_in_use: AtomicUsize,
    closed: AtomicBool,
}

impl<M: ConnectionManager> ConnectionPool<M> {
    pub fn new(manager: M, config: &PoolConfig) -> Arc<Self> {
        Arc::new(Self {
            manager,
            permits: Arc::new(Semaphore::new(config.max)),
            idle: Mutex::new(Vec::with_capacity(config.max)),
            min: config.min,
            max: config.max,
            acquire_timeout: config.acquire_timeout(),
            in_use: AtomicUsize::new(0),
            peak_in_use: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// Pre-open `min` connections.
    pub async fn init(&self) -> Result<(), StoreError> {
        let missing = self.min.saturating_sub(self.idle_count());
        for _ in 0..missing {
            let conn = self.manager.connect().await?;
            self.idle().push(conn);
        }
        debug!(opened = missing, min = self.min, max = self.max, "connection pool ready");
        Ok(())
    }

    /// Refuse new acquisitions and drop idle connections. Checked-out
    /// connections are dropped when their guards are.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.permits.close();
        self.idle().clear();
        debug!("connection pool shut down");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Check out a connection, waiting up to the acquire timeout.
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledConnection<M>, RetrievalError> {
        if self.is_closed() {
            return Err(RetrievalError::PoolClosed);
        }

        let permit = match tokio::time::timeout(
            self.acquire_timeout,
            Arc::clone(&self.permits).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(RetrievalError::PoolClosed),
            Err(_) => {
                warn!(
                    waited_ms = self.acquire_timeout.as_millis() as u64,
                    max = self.max,
                    "connection pool exhausted"
                );
                return Err(RetrievalError::PoolExhausted {
                    waited: self.acquire_timeout,
                });
            }
        };

        let reused = self.idle().pop();
        let conn = match reused {
            Some(conn) => conn,
            // The permit is dropped on error, freeing the slot.
            None => self.manager.connect().await?,
        };

        let now = self.in_use.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_use.fetch_max(now, Ordering::SeqCst);

        Ok(PooledConnection {
            pool: Arc::clone(self),
            conn: Some(conn),
            _permit: permit,
            discard: false,
        })
    }

    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::SeqCst)
    }

    pub fn peak_in_use(&self) -> usize {
        self.peak_in_use.load(Ordering::SeqCst)
    }

    pub fn idle_count(&self) -> usize {
        self.idle().len()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            in_use: self.in_use(),
            peak_in_use: self.peak_in_use(),
            idle: self.idle_count(),
            max: self.max,
        }
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }

    fn release(&self, conn: Option<M::Connection>, discard: bool) {
        self.in_use.fetch_sub(1, Ordering::SeqCst);
        let Some(conn) = conn else { return };
        if discard || self.is_closed() {
            return;
        }
        self.idle().push(conn);
    }

    /// The idle stack. A panic elsewhere while holding the lock cannot
    /// leave the `Vec` half-updated, so a poisoned lock is recovered.
    fn idle(&self) -> MutexGuard<'_, Vec<M::Connection>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A checked-out connection. Returned to the pool on drop.
pub struct PooledConnection<M: ConnectionManager> {
    pool: Arc<ConnectionPool<M>>,
    conn: Option<M::Connection>,
    _permit: OwnedSemaphorePermit,
    discard: bool,
}

impl<M: ConnectionManager> PooledConnection<M> {
    /// Close this connection instead of returning it to the pool.
    pub fn discard(&mut self) {
        self.discard = true;
    }
}

impl<M: ConnectionManager> Deref for PooledConnection<M> {
    type Target = M::Connection;

    fn deref(&self) -> &Self::Target {
        // Only taken in Drop.
        self.conn.as_ref().unwrap_or_else(|| unreachable!("connection taken before drop"))
    }
}

impl<M: ConnectionManager> DerefMut for PooledConnection<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().unwrap_or_else(|| unreachable!("connection taken before drop"))
    }
}

impl<M: ConnectionManager> Drop for PooledConnection<M> {
    fn drop(&mut self) {
        self.pool.release(self.conn.take(), self.discard);
    }
}

/// Hands out clones of one shared [`InMemoryCorpus`].
pub struct MemoryManager {
    corpus: InMemoryCorpus,
    opened: AtomicUsize,
}

impl MemoryManager {
    pub fn new(corpus: InMemoryCorpus) -> Self {
        Self {
            corpus,
            opened: AtomicUsize::new(0),
        }
    }

    /// Connections opened so far.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionManager for MemoryManager {
    type Connection = InMemoryCorpus;

    async fn connect(&self) -> Result<Self::Connection, StoreError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(self.corpus.clone())
    }
}
