//! In-memory replica set speaking the wire-operation protocol.
//!
//! A [`MemoryCluster`] plays the whole cluster at once: it hands out
//! connections for any configured node, answers role discovery, and stores
//! documents in shared maps behind an async-aware read-write lock. Every
//! connection interprets the same compiled wire documents a real store
//! would receive, so queries and updates exercise the full compile path.
//!
//! Fault injection (`fail_next_connects`, `fail_next_get_mores`) exists for
//! exercising retry and stream-interruption behavior.

use async_trait::async_trait;
use bson::{Bson, Document, Uuid};
use mea::rwlock::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};
use tracing::debug;

use replidoc_core::config::{Credential, Timeouts};
use replidoc_core::error::{ClientError, ClientResult};
use replidoc_core::topology::{NodeAddress, NodeRole, RoleMap, Topology};
use replidoc_core::transport::{PhysicalConnection, Transport};
use replidoc_core::wire::{WireOp, WireReply};

use crate::apply::apply_update;
use crate::evaluator::{matches, order_by};

type CollectionMap = Vec<Document>;
type StoreMap = HashMap<String, CollectionMap>;

#[derive(Debug)]
struct ClusterShared {
    /// Configured nodes in declaration order, which doubles as topology
    /// order for routing.
    nodes: Vec<(NodeAddress, NodeRole)>,
    credential: Option<Credential>,
    batch_cap: Option<u32>,
    data: RwLock<StoreMap>,
    connect_attempts: AtomicU64,
    fail_connects: AtomicU32,
    fail_get_mores: AtomicU32,
    next_cursor_id: AtomicI64,
}

/// Thread-safe in-memory stand-in for a replica set.
///
/// Cloning is cheap; clones share the same underlying data.
#[derive(Debug, Clone)]
pub struct MemoryCluster {
    shared: Arc<ClusterShared>,
}

impl MemoryCluster {
    pub fn builder() -> MemoryClusterBuilder {
        MemoryClusterBuilder::default()
    }

    /// The configured nodes as a seed topology, in declaration order.
    pub fn topology(&self) -> Topology {
        Topology::new(self.shared.nodes.iter().map(|(node, _)| node.clone()))
    }

    /// Loads documents directly into a collection, bypassing the wire
    /// protocol. Documents without an `_id` get one generated.
    pub async fn seed(&self, collection: &str, documents: impl IntoIterator<Item = Document>) {
        let mut data = self.shared.data.write().await;
        let entry = data.entry(collection.to_string()).or_default();
        for mut document in documents {
            if !document.contains_key("_id") {
                document.insert("_id", Uuid::new());
            }
            entry.push(document);
        }
    }

    /// Snapshot of a collection's documents in storage order.
    pub async fn documents(&self, collection: &str) -> Vec<Document> {
        self.shared
            .data
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Total connection attempts seen, including failed and rejected ones.
    pub fn connect_attempts(&self) -> u64 {
        self.shared.connect_attempts.load(Ordering::SeqCst)
    }

    /// Makes the next `count` connection attempts fail with a transient
    /// transport error.
    pub fn fail_next_connects(&self, count: u32) {
        self.shared.fail_connects.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` batch fetches fail with a transport error.
    pub fn fail_next_get_mores(&self, count: u32) {
        self.shared.fail_get_mores.store(count, Ordering::SeqCst);
    }

    fn role_of(&self, node: &NodeAddress) -> Option<NodeRole> {
        self.shared
            .nodes
            .iter()
            .find(|(candidate, _)| candidate == node)
            .map(|(_, role)| *role)
    }
}

#[async_trait]
impl Transport for MemoryCluster {
    type Conn = MemoryConnection;

    async fn open(
        &self,
        node: &NodeAddress,
        credential: Option<&Credential>,
        _timeouts: &Timeouts,
    ) -> ClientResult<MemoryConnection> {
        self.shared.connect_attempts.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.shared.fail_connects) {
            return Err(ClientError::Transport(format!("injected connect failure to {node}")));
        }
        let role = self
            .role_of(node)
            .ok_or_else(|| ClientError::Transport(format!("unknown node {node}")))?;
        if let Some(expected) = &self.shared.credential {
            match credential {
                Some(given) if given == expected => {}
                _ => {
                    return Err(ClientError::AuthenticationFailed(format!(
                        "handshake rejected by {node}"
                    )));
                }
            }
        }
        debug!(%node, "opened in-memory connection");
        Ok(MemoryConnection {
            shared: Arc::clone(&self.shared),
            node: node.clone(),
            role,
            cursors: HashMap::new(),
        })
    }

    async fn discover_roles(&self, topology: &Topology) -> ClientResult<RoleMap> {
        Ok(topology
            .iter()
            .filter_map(|node| self.role_of(node).map(|role| (node.clone(), role)))
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct MemoryClusterBuilder {
    nodes: Vec<(NodeAddress, NodeRole)>,
    credential: Option<Credential>,
    batch_cap: Option<u32>,
}

impl MemoryClusterBuilder {
    /// Adds the node that accepts writes.
    pub fn primary(mut self, node: NodeAddress) -> Self {
        self.nodes.push((node, NodeRole::Primary));
        self
    }

    /// Adds a read-only node.
    pub fn secondary(mut self, node: NodeAddress) -> Self {
        self.nodes.push((node, NodeRole::Secondary));
        self
    }

    /// Requires this credential on every connection handshake.
    pub fn credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Caps cursor batches at `size` documents regardless of what the
    /// client requests.
    pub fn batch_size(mut self, size: u32) -> Self {
        self.batch_cap = Some(size.max(1));
        self
    }

    pub fn build(self) -> MemoryCluster {
        MemoryCluster {
            shared: Arc::new(ClusterShared {
                nodes: self.nodes,
                credential: self.credential,
                batch_cap: self.batch_cap,
                data: RwLock::new(StoreMap::new()),
                connect_attempts: AtomicU64::new(0),
                fail_connects: AtomicU32::new(0),
                fail_get_mores: AtomicU32::new(0),
                next_cursor_id: AtomicI64::new(0),
            }),
        }
    }
}

/// One live connection to one node of the cluster.
///
/// Cursor state is held per connection, like a server session: a cursor
/// opened over one connection can only be continued over that connection,
/// and dropping the connection abandons it.
#[derive(Debug)]
pub struct MemoryConnection {
    shared: Arc<ClusterShared>,
    node: NodeAddress,
    role: NodeRole,
    cursors: HashMap<i64, Vec<Document>>,
}

impl MemoryConnection {
    fn effective_batch(&self, requested: u32) -> usize {
        let capped = match self.shared.batch_cap {
            Some(cap) => requested.min(cap),
            None => requested,
        };
        capped.max(1) as usize
    }

    fn require_primary(&self, op: &str) -> ClientResult<()> {
        if self.role != NodeRole::Primary {
            return Err(ClientError::Transport(format!(
                "{op} rejected, {} is not the primary",
                self.node
            )));
        }
        Ok(())
    }

    fn open_cursor(&mut self, mut selected: Vec<Document>, batch_size: u32) -> WireReply {
        let batch_len = self.effective_batch(batch_size);
        if selected.len() <= batch_len {
            return WireReply::Cursor { batch: selected, cursor_id: None };
        }
        let rest = selected.split_off(batch_len);
        let cursor_id = self.shared.next_cursor_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.cursors.insert(cursor_id, rest);
        WireReply::Cursor { batch: selected, cursor_id: Some(cursor_id) }
    }

    async fn find(
        &mut self,
        collection: &str,
        filter: &Document,
        sort: &Document,
        skip: u64,
        limit: Option<u64>,
        batch_size: u32,
    ) -> ClientResult<WireReply> {
        let mut selected = Vec::new();
        {
            let data = self.shared.data.read().await;
            if let Some(documents) = data.get(collection) {
                for document in documents {
                    if matches(filter, document)? {
                        selected.push(document.clone());
                    }
                }
            }
        }
        if !sort.is_empty() {
            selected.sort_by(|a, b| order_by(sort, a, b));
        }
        let paged = selected.into_iter().skip(skip as usize);
        let paged: Vec<Document> = match limit {
            Some(limit) => paged.take(limit as usize).collect(),
            None => paged.collect(),
        };
        Ok(self.open_cursor(paged, batch_size))
    }

    fn get_more(&mut self, cursor_id: i64, batch_size: u32) -> ClientResult<WireReply> {
        if take_one(&self.shared.fail_get_mores) {
            return Err(ClientError::Transport(format!(
                "injected batch-fetch failure on cursor {cursor_id}"
            )));
        }
        let effective = self.effective_batch(batch_size);
        let remaining = self.cursors.get_mut(&cursor_id).ok_or_else(|| {
            ClientError::Transport(format!("unknown cursor {cursor_id}"))
        })?;
        let batch_len = effective.min(remaining.len());
        let batch: Vec<Document> = remaining.drain(..batch_len).collect();
        if self.cursors.get(&cursor_id).is_some_and(Vec::is_empty) {
            self.cursors.remove(&cursor_id);
            Ok(WireReply::Cursor { batch, cursor_id: None })
        } else {
            Ok(WireReply::Cursor { batch, cursor_id: Some(cursor_id) })
        }
    }

    async fn update_many(
        &mut self,
        collection: &str,
        filter: &Document,
        update: &Document,
    ) -> ClientResult<WireReply> {
        self.require_primary("update")?;
        let mut data = self.shared.data.write().await;
        let mut matched = 0;
        let mut modified = 0;
        if let Some(documents) = data.get_mut(collection) {
            for document in documents.iter_mut() {
                if !matches(filter, document)? {
                    continue;
                }
                matched += 1;
                if let Some(updated) = apply_update(document, update)? {
                    *document = updated;
                    modified += 1;
                }
            }
        }
        Ok(WireReply::Update { matched, modified })
    }

    async fn delete_many(&mut self, collection: &str, filter: &Document) -> ClientResult<WireReply> {
        self.require_primary("delete")?;
        let mut data = self.shared.data.write().await;
        let mut deleted = 0;
        if let Some(documents) = data.get_mut(collection) {
            let mut kept = Vec::with_capacity(documents.len());
            for document in documents.drain(..) {
                if matches(filter, &document)? {
                    deleted += 1;
                } else {
                    kept.push(document);
                }
            }
            *documents = kept;
        }
        Ok(WireReply::Delete { deleted })
    }

    async fn insert(&mut self, collection: &str, document: Document) -> ClientResult<WireReply> {
        self.require_primary("insert")?;
        let id = match document.get("_id") {
            Some(Bson::Binary(binary)) => <[u8; 16]>::try_from(binary.bytes.as_slice())
                .map(Uuid::from_bytes)
                .map_err(|_| ClientError::Serialization("_id is not a 16-byte uuid".into()))?,
            _ => return Err(ClientError::Serialization("insert requires a uuid _id".into())),
        };
        let mut data = self.shared.data.write().await;
        let entry = data.entry(collection.to_string()).or_default();
        if entry
            .iter()
            .any(|existing| existing.get("_id") == document.get("_id"))
        {
            return Err(ClientError::Transport(format!("duplicate _id {id} in {collection}")));
        }
        entry.push(document);
        Ok(WireReply::Insert { id })
    }

    async fn count(&self, collection: &str, filter: &Document) -> ClientResult<WireReply> {
        let data = self.shared.data.read().await;
        let mut count = 0;
        if let Some(documents) = data.get(collection) {
            for document in documents {
                if matches(filter, document)? {
                    count += 1;
                }
            }
        }
        Ok(WireReply::Count(count))
    }

    async fn list_collections(&self) -> WireReply {
        let data = self.shared.data.read().await;
        let mut names: Vec<String> = data.keys().cloned().collect();
        names.sort();
        WireReply::Collections(names)
    }
}

#[async_trait]
impl PhysicalConnection for MemoryConnection {
    async fn send(&mut self, op: WireOp) -> ClientResult<WireReply> {
        match op {
            WireOp::Find { collection, filter, sort, skip, limit, batch_size } => {
                self.find(&collection, &filter, &sort, skip, limit, batch_size).await
            }
            WireOp::GetMore { cursor_id, batch_size, .. } => self.get_more(cursor_id, batch_size),
            WireOp::UpdateMany { collection, filter, update } => {
                self.update_many(&collection, &filter, &update).await
            }
            WireOp::DeleteMany { collection, filter } => {
                self.delete_many(&collection, &filter).await
            }
            WireOp::Insert { collection, document } => self.insert(&collection, document).await,
            WireOp::Count { collection, filter } => self.count(&collection, &filter).await,
            WireOp::ListCollections => Ok(self.list_collections().await),
        }
    }
}

// Consumes one unit from a fault-injection counter.
fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}
