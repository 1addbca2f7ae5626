//! Bounded, lifetime-aware connection pool.
//!
//! The pool owns every physical connection it creates. Capacity per node is
//! modeled with a semaphore whose permits travel with checked-out handles;
//! the idle list and its timestamps are the only other mutable shared state
//! and live under a single mutex held only for metadata updates, never
//! across network I/O.
//!
//! A handle checked out through [`ConnectionPool::acquire`] must come back
//! through [`ConnectionPool::release`], success or failure. Dropping a
//! handle without releasing it (cancellation, an abandoned cursor) destroys
//! the connection instead of recycling it, since its server-side state is
//! indeterminate; the freed permit lets a replacement be created lazily on
//! the next acquire.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, Credential, PoolConfig, Timeouts};
use crate::error::{ClientError, ClientResult};
use crate::topology::NodeAddress;
use crate::transport::Transport;

/// Transient connect failures are retried this many times in total before
/// surfacing.
const CONNECT_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(50);

/// One checked-out physical connection.
///
/// Ownership is transferred to the caller for the duration of one operation;
/// the permit inside accounts for the handle against the per-node capacity
/// until it is released or dropped.
#[derive(Debug)]
pub struct ConnectionHandle<C> {
    conn: C,
    node: NodeAddress,
    created_at: Instant,
    permit: OwnedSemaphorePermit,
    poisoned: bool,
}

impl<C> ConnectionHandle<C> {
    /// The underlying physical connection.
    pub fn connection(&mut self) -> &mut C {
        &mut self.conn
    }

    /// The node this handle is connected to.
    pub fn node(&self) -> &NodeAddress {
        &self.node
    }

    /// Marks the connection as unsafe to reuse. Release destroys poisoned
    /// handles instead of recycling them.
    pub fn poison(&mut self) {
        self.poisoned = true;
    }
}

#[derive(Debug)]
struct IdleConn<C> {
    conn: C,
    created_at: Instant,
    last_used: Instant,
}

#[derive(Debug)]
struct NodeSlots<C> {
    idle: Vec<IdleConn<C>>,
    capacity: Arc<Semaphore>,
}

impl<C> NodeSlots<C> {
    fn new(max_size: usize) -> Self {
        Self { idle: Vec::new(), capacity: Arc::new(Semaphore::new(max_size)) }
    }
}

/// Pool of live connections to the nodes of one replica set.
///
/// Constructed once by the process entry point and shared by reference with
/// every component that needs it.
#[derive(Debug)]
pub struct ConnectionPool<T: Transport> {
    transport: Arc<T>,
    credential: Option<Credential>,
    config: PoolConfig,
    timeouts: Timeouts,
    nodes: Mutex<HashMap<NodeAddress, NodeSlots<T::Conn>>>,
    closed: AtomicBool,
}

impl<T: Transport> ConnectionPool<T> {
    pub fn new(transport: Arc<T>, config: &ClientConfig) -> Self {
        Self {
            transport,
            credential: config.credential.clone(),
            config: config.pool.clone(),
            timeouts: config.timeouts,
            nodes: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// Checks out a connection to `node`.
    ///
    /// Waits up to the connect timeout for capacity or an idle handle,
    /// failing with [`ClientError::PoolExhausted`] when the pool stays full.
    /// With capacity granted, a fresh idle handle is reused if one exists;
    /// otherwise a new connection is opened and authenticated, retrying
    /// transient failures with backoff within a connect-timeout bound.
    pub async fn acquire(&self, node: &NodeAddress) -> ClientResult<ConnectionHandle<T::Conn>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::PoolClosed);
        }

        let capacity = {
            let mut nodes = self.nodes.lock();
            nodes
                .entry(node.clone())
                .or_insert_with(|| NodeSlots::new(self.config.max_size))
                .capacity
                .clone()
        };

        let permit = match timeout(self.timeouts.connect, capacity.acquire_owned()).await {
            Err(_) => return Err(ClientError::PoolExhausted(node.to_string())),
            Ok(Err(_)) => return Err(ClientError::PoolClosed),
            Ok(Ok(permit)) => permit,
        };
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::PoolClosed);
        }

        if let Some(idle) = self.checkout_idle(node) {
            debug!(%node, "reusing idle connection");
            return Ok(ConnectionHandle {
                conn: idle.conn,
                node: node.clone(),
                created_at: idle.created_at,
                permit,
                poisoned: false,
            });
        }

        let conn = timeout(self.timeouts.connect, self.connect_with_retry(node))
            .await
            .map_err(|_| ClientError::ConnectTimeout(node.to_string()))??;
        Ok(ConnectionHandle {
            conn,
            node: node.clone(),
            created_at: Instant::now(),
            permit,
            poisoned: false,
        })
    }

    /// Returns a handle to the idle set.
    ///
    /// Handles past their maximum lifetime, poisoned handles, and handles
    /// released after close are destroyed instead; the live count drops and
    /// a replacement is created lazily on the next acquire.
    pub fn release(&self, handle: ConnectionHandle<T::Conn>) {
        let ConnectionHandle { conn, node, created_at, permit, poisoned } = handle;

        if poisoned
            || self.closed.load(Ordering::SeqCst)
            || created_at.elapsed() >= self.config.max_lifetime
        {
            debug!(%node, poisoned, "destroying released connection");
            drop(conn);
            drop(permit);
            return;
        }

        {
            let mut nodes = self.nodes.lock();
            match nodes.get_mut(&node) {
                Some(slots) => {
                    slots.idle.push(IdleConn { conn, created_at, last_used: Instant::now() });
                }
                // Entry vanished under a concurrent close; the connection
                // just drops.
                None => {}
            }
        }
        // Freed only after the idle entry is visible, so a waiter that wins
        // this permit is guaranteed to find the recycled connection.
        drop(permit);
    }

    /// Evicts stale idle connections from every node.
    ///
    /// Lifetime expiry evicts unconditionally; idleness evicts only while
    /// the node's live count stays above `min_size`.
    pub fn sweep(&self) {
        let mut discarded = Vec::new();
        {
            let mut nodes = self.nodes.lock();
            for (node, slots) in nodes.iter_mut() {
                let before = slots.idle.len();
                let mut index = 0;
                while index < slots.idle.len() {
                    if slots.idle[index].created_at.elapsed() >= self.config.max_lifetime {
                        discarded.push(slots.idle.swap_remove(index));
                    } else {
                        index += 1;
                    }
                }

                let checked_out =
                    self.config.max_size - slots.capacity.available_permits().min(self.config.max_size);
                let mut live = checked_out + slots.idle.len();
                let mut index = 0;
                while index < slots.idle.len() && live > self.config.min_size {
                    if slots.idle[index].last_used.elapsed() >= self.config.max_idle_time {
                        discarded.push(slots.idle.swap_remove(index));
                        live -= 1;
                    } else {
                        index += 1;
                    }
                }

                if slots.idle.len() < before {
                    debug!(%node, evicted = before - slots.idle.len(), "swept idle connections");
                }
            }
        }
        // Connections close outside the metadata lock.
        drop(discarded);
    }

    /// Sweeps on a fixed interval until the pool is closed. Intended to be
    /// spawned by the process entry point.
    pub async fn run_sweeper(&self, every: Duration) {
        while !self.closed.load(Ordering::SeqCst) {
            sleep(every).await;
            self.sweep();
        }
    }

    /// Drains and destroys every idle connection and fails all pending and
    /// future acquires with [`ClientError::PoolClosed`]. Handles still
    /// checked out are destroyed on release.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut discarded = Vec::new();
        {
            let mut nodes = self.nodes.lock();
            for slots in nodes.values_mut() {
                slots.capacity.close();
                discarded.append(&mut slots.idle);
            }
        }
        drop(discarded);
        info!("connection pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Idle connections currently pooled for `node`.
    pub fn idle_count(&self, node: &NodeAddress) -> usize {
        self.nodes.lock().get(node).map_or(0, |slots| slots.idle.len())
    }

    /// Live connections (idle plus checked out) currently held for `node`.
    pub fn live_count(&self, node: &NodeAddress) -> usize {
        self.nodes.lock().get(node).map_or(0, |slots| {
            let checked_out =
                self.config.max_size - slots.capacity.available_permits().min(self.config.max_size);
            checked_out + slots.idle.len()
        })
    }

    fn checkout_idle(&self, node: &NodeAddress) -> Option<IdleConn<T::Conn>> {
        let mut discarded = Vec::new();
        let reusable = {
            let mut nodes = self.nodes.lock();
            let slots = nodes.get_mut(node)?;
            let mut reusable = None;
            while let Some(idle) = slots.idle.pop() {
                if idle.created_at.elapsed() >= self.config.max_lifetime
                    || idle.last_used.elapsed() >= self.config.max_idle_time
                {
                    discarded.push(idle);
                    continue;
                }
                reusable = Some(idle);
                break;
            }
            reusable
        };
        if !discarded.is_empty() {
            debug!(%node, count = discarded.len(), "discarded stale idle connections");
            drop(discarded);
        }
        reusable
    }

    async fn connect_with_retry(&self, node: &NodeAddress) -> ClientResult<T::Conn> {
        let mut backoff = INITIAL_BACKOFF;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .transport
                .open(node, self.credential.as_ref(), &self.timeouts)
                .await
            {
                Ok(conn) => {
                    debug!(%node, attempt, "opened connection");
                    return Ok(conn);
                }
                Err(err) if err.is_transient() && attempt < CONNECT_ATTEMPTS => {
                    warn!(%node, attempt, %err, "transient connect failure, backing off");
                    sleep(backoff).await;
                    backoff *= 2;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
