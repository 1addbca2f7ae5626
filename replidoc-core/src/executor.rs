//! Operation execution: routing, pooled checkout, and cursor iteration.
//!
//! The executor glues the other modules together. Every operation follows
//! the same shape: pick a node for the operation kind, check a connection
//! out of the pool, run the compiled wire operation under the read timeout,
//! and return the connection on every path. A connection that saw an error
//! is poisoned before release so the pool destroys it.

use bson::Document;
use futures::Stream;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::{ClientConfig, ReadPreference, Timeouts};
use crate::error::{ClientError, ClientResult};
use crate::pool::{ConnectionHandle, ConnectionPool};
use crate::query::Query;
use crate::routing::select_node;
use crate::topology::{NodeAddress, NodeRole, RoleMap, Topology};
use crate::transport::{PhysicalConnection, Transport};
use crate::update::UpdateExpr;
use crate::wire::{self, WireOp, WireReply};
use crate::filter::FilterExpr;

/// Discovered roles are reused for this long before asking the cluster
/// again.
const ROLE_CACHE_TTL: Duration = Duration::from_secs(10);

/// Documents requested per cursor batch.
const DEFAULT_BATCH_SIZE: u32 = 100;

/// Matched and modified counts reported by an update.
///
/// `modified` counts documents whose bytes actually changed; a set to an
/// already-present value matches without modifying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
}

#[derive(Debug)]
struct CachedRoles {
    map: RoleMap,
    refreshed_at: Instant,
}

/// Executes queries and updates against the replica set through a shared
/// connection pool.
#[derive(Debug)]
pub struct QueryExecutor<T: Transport> {
    pool: Arc<ConnectionPool<T>>,
    topology: Topology,
    read_preference: ReadPreference,
    timeouts: Timeouts,
    roles: Mutex<Option<CachedRoles>>,
}

impl<T: Transport> QueryExecutor<T> {
    pub fn new(pool: Arc<ConnectionPool<T>>, config: &ClientConfig) -> Self {
        Self {
            pool,
            topology: config.topology.clone(),
            read_preference: config.read_preference,
            timeouts: config.timeouts,
            roles: Mutex::new(None),
        }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool<T>> {
        &self.pool
    }

    /// Runs a query and returns a lazy cursor over the matching documents.
    ///
    /// The cursor owns its connection until it is exhausted or dropped;
    /// documents already yielded stay valid if the stream later fails.
    pub async fn find(
        &self,
        collection: &str,
        query: &Query,
    ) -> ClientResult<DocumentCursor<T>> {
        let filter = wire::compile_optional_filter(query.filter.as_ref())?;
        let sort = wire::compile_sort(&query.sort);
        let op = wire::find_op(collection, filter, sort, &query.page, DEFAULT_BATCH_SIZE);

        let node = self.read_node().await?;
        debug!(%node, collection, "routing find");
        let mut handle = self.pool.acquire(&node).await?;
        match self.round_trip(&mut handle, op).await {
            Ok(WireReply::Cursor { batch, cursor_id }) => Ok(DocumentCursor::new(
                Arc::clone(&self.pool),
                handle,
                collection,
                batch,
                cursor_id,
                self.timeouts.read,
            )),
            Ok(_) => {
                handle.poison();
                self.pool.release(handle);
                Err(ClientError::Transport("unexpected reply to find".into()))
            }
            Err(err) => {
                handle.poison();
                self.pool.release(handle);
                Err(err)
            }
        }
    }

    /// Applies an update expression to every document matching the filter.
    /// `None` matches every document in the collection.
    pub async fn update_many(
        &self,
        collection: &str,
        filter: Option<&FilterExpr>,
        update: &UpdateExpr,
    ) -> ClientResult<UpdateOutcome> {
        let op = WireOp::UpdateMany {
            collection: collection.to_string(),
            filter: wire::compile_optional_filter(filter)?,
            update: wire::compile_update(update)?,
        };
        match self.execute_write(op).await? {
            WireReply::Update { matched, modified } => Ok(UpdateOutcome { matched, modified }),
            _ => Err(ClientError::Transport("unexpected reply to update".into())),
        }
    }

    /// Deletes every document matching the filter and returns the count.
    pub async fn delete_many(
        &self,
        collection: &str,
        filter: Option<&FilterExpr>,
    ) -> ClientResult<u64> {
        let op = WireOp::DeleteMany {
            collection: collection.to_string(),
            filter: wire::compile_optional_filter(filter)?,
        };
        match self.execute_write(op).await? {
            WireReply::Delete { deleted } => Ok(deleted),
            _ => Err(ClientError::Transport("unexpected reply to delete".into())),
        }
    }

    /// Inserts one document, generating its id when absent, and returns the
    /// id under which it was stored.
    pub async fn insert(
        &self,
        collection: &str,
        mut document: Document,
    ) -> ClientResult<bson::Uuid> {
        let id = match document.get("_id") {
            Some(bson::Bson::Binary(binary)) => bson::Uuid::from_bytes(
                <[u8; 16]>::try_from(binary.bytes.as_slice()).map_err(|_| {
                    ClientError::Serialization("_id is not a 16-byte uuid".into())
                })?,
            ),
            Some(other) => {
                return Err(ClientError::Serialization(format!(
                    "_id must be a uuid, got {other}"
                )));
            }
            None => {
                let id = bson::Uuid::new();
                document.insert("_id", id);
                id
            }
        };
        let op = WireOp::Insert { collection: collection.to_string(), document };
        match self.execute_write(op).await? {
            WireReply::Insert { id: stored } if stored == id => Ok(id),
            WireReply::Insert { id: stored } => Ok(stored),
            _ => Err(ClientError::Transport("unexpected reply to insert".into())),
        }
    }

    /// Counts documents matching the filter without materializing them.
    pub async fn count_documents(
        &self,
        collection: &str,
        filter: Option<&FilterExpr>,
    ) -> ClientResult<u64> {
        let op = WireOp::Count {
            collection: collection.to_string(),
            filter: wire::compile_optional_filter(filter)?,
        };
        let node = self.read_node().await?;
        match self.execute_on(&node, op).await? {
            WireReply::Count(count) => Ok(count),
            _ => Err(ClientError::Transport("unexpected reply to count".into())),
        }
    }

    /// Lists the collection names known to the store.
    pub async fn list_collections(&self) -> ClientResult<Vec<String>> {
        let node = self.read_node().await?;
        match self.execute_on(&node, WireOp::ListCollections).await? {
            WireReply::Collections(names) => Ok(names),
            _ => Err(ClientError::Transport("unexpected reply to listCollections".into())),
        }
    }

    async fn execute_write(&self, op: WireOp) -> ClientResult<WireReply> {
        let node = self.write_node().await?;
        self.execute_on(&node, op).await
    }

    async fn execute_on(&self, node: &NodeAddress, op: WireOp) -> ClientResult<WireReply> {
        let mut handle = self.pool.acquire(node).await?;
        match self.round_trip(&mut handle, op).await {
            Ok(reply) => {
                self.pool.release(handle);
                Ok(reply)
            }
            Err(err) => {
                warn!(%node, %err, "operation failed, destroying connection");
                handle.poison();
                self.pool.release(handle);
                Err(err)
            }
        }
    }

    async fn round_trip(
        &self,
        handle: &mut ConnectionHandle<T::Conn>,
        op: WireOp,
    ) -> ClientResult<WireReply> {
        match timeout(self.timeouts.read, handle.connection().send(op)).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Transport(format!(
                "read timed out after {:?}",
                self.timeouts.read
            ))),
        }
    }

    /// Reads route per the configured preference; writes always go to the
    /// primary.
    async fn read_node(&self) -> ClientResult<NodeAddress> {
        let roles = self.roles().await?;
        Ok(select_node(&self.topology, self.read_preference, &roles)?.clone())
    }

    async fn write_node(&self) -> ClientResult<NodeAddress> {
        let roles = self.roles().await?;
        self.topology
            .iter()
            .find(|node| roles.get(node) == Some(&NodeRole::Primary))
            .cloned()
            .ok_or(ClientError::NoPrimaryAvailable)
    }

    async fn roles(&self) -> ClientResult<RoleMap> {
        if let Some(cached) = self.roles.lock().as_ref() {
            if cached.refreshed_at.elapsed() < ROLE_CACHE_TTL {
                return Ok(cached.map.clone());
            }
        }
        let map = self.pool.transport().discover_roles(&self.topology).await?;
        debug!(nodes = map.len(), "refreshed replica-set roles");
        *self.roles.lock() = Some(CachedRoles { map: map.clone(), refreshed_at: Instant::now() });
        Ok(map)
    }
}

/// Lazy, finite, non-restartable cursor over the documents of one query.
///
/// Batches beyond the first are fetched on demand over the same connection
/// the query started on. Dropping a cursor before exhaustion destroys that
/// connection, since the server-side cursor state is abandoned with it.
#[derive(Debug)]
pub struct DocumentCursor<T: Transport> {
    pool: Arc<ConnectionPool<T>>,
    collection: String,
    batch: VecDeque<Document>,
    cursor_id: Option<i64>,
    handle: Option<ConnectionHandle<T::Conn>>,
    read_timeout: Duration,
}

impl<T: Transport> DocumentCursor<T> {
    fn new(
        pool: Arc<ConnectionPool<T>>,
        handle: ConnectionHandle<T::Conn>,
        collection: &str,
        batch: Vec<Document>,
        cursor_id: Option<i64>,
        read_timeout: Duration,
    ) -> Self {
        let mut cursor = Self {
            pool,
            collection: collection.to_string(),
            batch: batch.into(),
            cursor_id,
            handle: Some(handle),
            read_timeout,
        };
        if cursor.batch.is_empty() && cursor.cursor_id.is_none() {
            cursor.finish();
        }
        cursor
    }

    /// Yields the next document, fetching further batches as needed.
    ///
    /// Returns `None` once exhausted. A failed fetch yields
    /// [`ClientError::StreamInterrupted`] exactly once and ends the cursor;
    /// documents yielded before the failure remain valid.
    pub async fn next(&mut self) -> Option<ClientResult<Document>> {
        loop {
            if let Some(document) = self.batch.pop_front() {
                if self.batch.is_empty() && self.cursor_id.is_none() {
                    self.finish();
                }
                return Some(Ok(document));
            }
            let cursor_id = self.cursor_id?;
            let handle = self.handle.as_mut()?;

            let op = WireOp::GetMore {
                collection: self.collection.clone(),
                cursor_id,
                batch_size: DEFAULT_BATCH_SIZE,
            };
            match timeout(self.read_timeout, handle.connection().send(op)).await {
                Ok(Ok(WireReply::Cursor { batch, cursor_id })) => {
                    self.cursor_id = cursor_id;
                    self.batch.extend(batch);
                    if self.batch.is_empty() && self.cursor_id.is_none() {
                        self.finish();
                        return None;
                    }
                }
                Ok(Ok(_)) => {
                    return Some(Err(self.interrupt("unexpected reply to getMore".into())));
                }
                Ok(Err(err)) => {
                    return Some(Err(self.interrupt(err.to_string())));
                }
                Err(_) => {
                    return Some(Err(self.interrupt(format!(
                        "batch fetch timed out after {:?}",
                        self.read_timeout
                    ))));
                }
            }
        }
    }

    /// Drains the remaining documents into a vector.
    pub async fn try_collect(mut self) -> ClientResult<Vec<Document>> {
        let mut documents = Vec::new();
        while let Some(item) = self.next().await {
            documents.push(item?);
        }
        Ok(documents)
    }

    /// Adapts the cursor into a [`Stream`] of documents.
    pub fn into_stream(self) -> impl Stream<Item = ClientResult<Document>> {
        futures::stream::unfold(self, |mut cursor| async move {
            cursor.next().await.map(|item| (item, cursor))
        })
    }

    // Exhausted cleanly: the connection goes back to the pool.
    fn finish(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.pool.release(handle);
        }
        self.cursor_id = None;
    }

    // Mid-stream failure: the connection is destroyed, the cursor ends.
    fn interrupt(&mut self, reason: String) -> ClientError {
        warn!(collection = %self.collection, %reason, "cursor interrupted");
        if let Some(mut handle) = self.handle.take() {
            handle.poison();
            self.pool.release(handle);
        }
        self.cursor_id = None;
        self.batch.clear();
        ClientError::StreamInterrupted(reason)
    }
}
