//! # redb-backed Knowledge Store
//!
//! A disk-backed node/edge store using the redb embedded database, which
//! provides:
//! - ACID write transactions (a crashed batch leaves the prior state)
//! - Crash safety (copy-on-write B-trees)
//! - MVCC: readers never block on the single writer
//!
//! ## Tables
//!
//! | Table | Key | Value |
//! |-------|-----|-------|
//! | `nodes` | id | postcard `Node` (no embedding) |
//! | `embeddings` | id | packed little-endian `f32` |
//! | `edges` | `(source, target, kind)` | postcard `EdgeAttributes` |
//! | `edges_reverse` | `(target, source, kind)` | `()` |
//! | `metadata` | key | `u64` |
//!
//! The `(source, target, kind)` key makes edge upserts idempotent by
//! construction. Vectors live in their own table so a similarity scan
//! streams packed bytes without decoding node records.

use crate::primitives::{NORM_TOLERANCE, SCHEMA_VERSION};
use crate::types::{Edge, EdgeAttributes, EdgeKind, Node, NodeKind};
use crate::vector::{Embedding, PackedVector};
use crate::WeftError;
use redb::{
    Database, DatabaseError, ReadOnlyDatabase, ReadTransaction, ReadableDatabase, ReadableTable,
    ReadableTableMetadata, TableDefinition, WriteTransaction,
};
use serde::Serialize;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Table for nodes: id -> serialized Node bytes
const NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("nodes");

/// Table for embeddings: id -> packed f32 bytes
const EMBEDDINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("embeddings");

/// Table for edges: (source, target, kind) -> serialized EdgeAttributes
const EDGES: TableDefinition<(&str, &str, &str), &[u8]> = TableDefinition::new("edges");

/// Reverse index for incoming-edge lookups: (target, source, kind) -> ()
const EDGES_REVERSE: TableDefinition<(&str, &str, &str), ()> =
    TableDefinition::new("edges_reverse");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const SCHEMA_KEY: &str = "schema_version";

/// Pause between attempts while another handle holds the file.
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(50);

fn storage_err(e: impl std::fmt::Display) -> WeftError {
    WeftError::Storage(e.to_string())
}

// =============================================================================
// RESULT TYPES
// =============================================================================

/// A similarity search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
}

/// Store size counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub nodes: u64,
    pub edges: u64,
    pub vectors: u64,
    pub file_bytes: u64,
}

// =============================================================================
// STORE
// =============================================================================

enum Backend {
    Writable(Database),
    ReadOnly(ReadOnlyDatabase),
}

/// The durable knowledge store.
///
/// One writable handle per file; a second open waits up to the lock timeout
/// and then fails. Readers share the handle (`&Store`) and run concurrently
/// with an open [`WriteBatch`].
pub struct Store {
    backend: Backend,
    path: PathBuf,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("read_only", &self.is_read_only())
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Open or create a store, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Fatal errors only: the file cannot be opened within `lock_timeout`, or
    /// it was written with another schema version.
    pub fn open(path: impl AsRef<Path>, lock_timeout: Duration) -> Result<Self, WeftError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| WeftError::Io(e.to_string()))?;
        }
        let db = wait_for_lock(lock_timeout, || Database::create(path))?;

        // Initialize tables and stamp or verify the schema version
        let write_txn = db.begin_write().map_err(storage_err)?;
        {
            write_txn.open_table(NODES).map_err(storage_err)?;
            write_txn.open_table(EMBEDDINGS).map_err(storage_err)?;
            write_txn.open_table(EDGES).map_err(storage_err)?;
            write_txn.open_table(EDGES_REVERSE).map_err(storage_err)?;
            let mut meta = write_txn.open_table(METADATA).map_err(storage_err)?;
            let found = meta
                .get(SCHEMA_KEY)
                .map_err(storage_err)?
                .map(|v| v.value());
            match found {
                None => {
                    meta.insert(SCHEMA_KEY, SCHEMA_VERSION).map_err(storage_err)?;
                }
                Some(found) if found != SCHEMA_VERSION => {
                    return Err(WeftError::SchemaMismatch {
                        found,
                        expected: SCHEMA_VERSION,
                    });
                }
                Some(_) => {}
            }
        }
        write_txn.commit().map_err(storage_err)?;

        tracing::debug!(path = %path.display(), "store opened");
        Ok(Self {
            backend: Backend::Writable(db),
            path: path.to_path_buf(),
        })
    }

    /// Open an existing store for diagnostics. Never takes the write lock.
    pub fn open_read_only(path: impl AsRef<Path>, lock_timeout: Duration) -> Result<Self, WeftError> {
        let path = path.as_ref();
        let db = wait_for_lock(lock_timeout, || ReadOnlyDatabase::open(path))?;
        let store = Self {
            backend: Backend::ReadOnly(db),
            path: path.to_path_buf(),
        };

        let read_txn = store.begin_read()?;
        let meta = read_txn.open_table(METADATA).map_err(storage_err)?;
        let found = meta
            .get(SCHEMA_KEY)
            .map_err(storage_err)?
            .map(|v| v.value())
            .unwrap_or(0);
        if found != SCHEMA_VERSION {
            return Err(WeftError::SchemaMismatch {
                found,
                expected: SCHEMA_VERSION,
            });
        }
        drop(meta);
        drop(read_txn);
        Ok(store)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        matches!(self.backend, Backend::ReadOnly(_))
    }

    fn begin_read(&self) -> Result<ReadTransaction, WeftError> {
        match &self.backend {
            Backend::Writable(db) => db.begin_read(),
            Backend::ReadOnly(db) => db.begin_read(),
        }
        .map_err(storage_err)
    }

    /// Start a write transaction. Nothing is visible to readers until
    /// [`WriteBatch::commit`]; dropping the batch discards it.
    pub fn begin_batch(&self) -> Result<WriteBatch, WeftError> {
        match &self.backend {
            Backend::Writable(db) => Ok(WriteBatch {
                txn: db.begin_write().map_err(storage_err)?,
            }),
            Backend::ReadOnly(_) => Err(WeftError::ReadOnly),
        }
    }

    /// Insert or replace a node in its own transaction.
    pub fn upsert_node(&self, node: &Node) -> Result<(), WeftError> {
        let mut batch = self.begin_batch()?;
        batch.upsert_node(node)?;
        batch.commit()
    }

    /// Insert or overwrite an edge in its own transaction.
    ///
    /// Returns `true` if the `(source, target, kind)` triple was new.
    pub fn upsert_edge(&self, edge: &Edge) -> Result<bool, WeftError> {
        let mut batch = self.begin_batch()?;
        let created = batch.upsert_edge(edge)?;
        batch.commit()?;
        Ok(created)
    }

    /// Look up a node (with its embedding) by id.
    pub fn get_node(&self, id: &str) -> Result<Option<Node>, WeftError> {
        let read_txn = self.begin_read()?;
        let nodes = read_txn.open_table(NODES).map_err(storage_err)?;
        let vectors = read_txn.open_table(EMBEDDINGS).map_err(storage_err)?;
        load_node(&nodes, &vectors, id)
    }

    /// Look up only the stored vector of a node.
    pub fn get_embedding(&self, id: &str) -> Result<Option<Embedding>, WeftError> {
        let read_txn = self.begin_read()?;
        let vectors = read_txn.open_table(EMBEDDINGS).map_err(storage_err)?;
        match vectors.get(id).map_err(storage_err)? {
            Some(data) => decode_embedding(data.value()).map(Some),
            None => Ok(None),
        }
    }

    /// All nodes with their embeddings, in id order.
    pub fn nodes(&self) -> Result<Vec<Node>, WeftError> {
        let read_txn = self.begin_read()?;
        let nodes_table = read_txn.open_table(NODES).map_err(storage_err)?;
        let vectors = read_txn.open_table(EMBEDDINGS).map_err(storage_err)?;

        let mut nodes = Vec::new();
        for entry in nodes_table.iter().map_err(storage_err)? {
            let (_, value) = entry.map_err(storage_err)?;
            let mut node = decode_node(value.value())?;
            if let Some(data) = vectors.get(node.id.as_str()).map_err(storage_err)? {
                node.embedding = Some(decode_embedding(data.value())?);
            }
            nodes.push(node);
        }
        Ok(nodes)
    }

    /// Nodes of one type, in id order.
    pub fn nodes_by_type(&self, kind: &NodeKind) -> Result<Vec<Node>, WeftError> {
        Ok(self
            .nodes()?
            .into_iter()
            .filter(|n| &n.kind == kind)
            .collect())
    }

    /// Outgoing edges of a node, ordered by (target, kind).
    pub fn edges_from(&self, id: &str) -> Result<Vec<Edge>, WeftError> {
        let read_txn = self.begin_read()?;
        let edges_table = read_txn.open_table(EDGES).map_err(storage_err)?;

        outgoing(&edges_table, id)
    }

    /// Incoming edges of a node, ordered by (source, kind).
    pub fn edges_to(&self, id: &str) -> Result<Vec<Edge>, WeftError> {
        let read_txn = self.begin_read()?;
        let reverse = read_txn.open_table(EDGES_REVERSE).map_err(storage_err)?;
        let edges_table = read_txn.open_table(EDGES).map_err(storage_err)?;

        let mut edges = Vec::new();
        for entry in reverse.range((id, "", "")..).map_err(storage_err)? {
            let (key, _) = entry.map_err(storage_err)?;
            let (target, source, kind) = key.value();
            if target != id {
                break;
            }
            if let Some(value) = edges_table.get((source, target, kind)).map_err(storage_err)? {
                edges.push(Edge::from_parts(source, target, kind, decode_attrs(value.value())?));
            }
        }
        Ok(edges)
    }

    /// All edges in key order.
    pub fn edges(&self) -> Result<Vec<Edge>, WeftError> {
        let read_txn = self.begin_read()?;
        let edges_table = read_txn.open_table(EDGES).map_err(storage_err)?;

        let mut edges = Vec::new();
        for entry in edges_table.iter().map_err(storage_err)? {
            let (key, value) = entry.map_err(storage_err)?;
            let (source, target, kind) = key.value();
            edges.push(Edge::from_parts(source, target, kind, decode_attrs(value.value())?));
        }
        Ok(edges)
    }

    /// Exact top-`k` search by dot product over every stored vector.
    ///
    /// Streams the embedding table: only vectors entering the top-`k` are
    /// copied out. Vectors of another dimension or with a corrupt length are
    /// skipped. Ties are broken by ascending id.
    pub fn find_similar_by_vector(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, WeftError> {
        if k == 0 || query.is_empty() {
            return Ok(Vec::new());
        }
        let read_txn = self.begin_read()?;
        let vectors = read_txn.open_table(EMBEDDINGS).map_err(storage_err)?;

        let mut heap: BinaryHeap<Reverse<Ranked>> = BinaryHeap::with_capacity(k + 1);
        for entry in vectors.iter().map_err(storage_err)? {
            let (key, value) = entry.map_err(storage_err)?;
            let packed = match PackedVector::from_bytes(value.value()) {
                Ok(packed) => packed,
                Err(e) => {
                    tracing::warn!(id = key.value(), error = %e, "skipping corrupt vector");
                    continue;
                }
            };
            let Some(score) = packed.dot(query).filter(|s| s.is_finite()) else {
                continue;
            };
            if heap.len() == k {
                if let Some(Reverse(min)) = heap.peek() {
                    if score <= min.score {
                        continue;
                    }
                }
            }
            heap.push(Reverse(Ranked {
                score,
                id: key.value().to_string(),
            }));
            if heap.len() > k {
                heap.pop();
            }
        }

        let mut ranked: Vec<Ranked> = heap.into_iter().map(|Reverse(r)| r).collect();
        ranked.sort_by(|a, b| b.cmp(a));
        Ok(ranked
            .into_iter()
            .map(|r| SearchHit {
                id: r.id,
                score: r.score,
            })
            .collect())
    }

    /// Remove a node, its vector and every incident edge.
    ///
    /// Returns `false` if the node did not exist.
    pub fn prune_node(&self, id: &str) -> Result<bool, WeftError> {
        let batch = self.begin_batch()?;
        let existed = {
            let mut nodes = batch.txn.open_table(NODES).map_err(storage_err)?;
            let mut vectors = batch.txn.open_table(EMBEDDINGS).map_err(storage_err)?;
            let mut edges = batch.txn.open_table(EDGES).map_err(storage_err)?;
            let mut reverse = batch.txn.open_table(EDGES_REVERSE).map_err(storage_err)?;

            let existed = nodes.remove(id).map_err(storage_err)?.is_some();
            vectors.remove(id).map_err(storage_err)?;

            let mut outgoing = Vec::new();
            for entry in edges.range((id, "", "")..).map_err(storage_err)? {
                let (key, _) = entry.map_err(storage_err)?;
                let (source, target, kind) = key.value();
                if source != id {
                    break;
                }
                outgoing.push((target.to_string(), kind.to_string()));
            }
            let mut incoming = Vec::new();
            for entry in reverse.range((id, "", "")..).map_err(storage_err)? {
                let (key, _) = entry.map_err(storage_err)?;
                let (target, source, kind) = key.value();
                if target != id {
                    break;
                }
                incoming.push((source.to_string(), kind.to_string()));
            }

            for (target, kind) in &outgoing {
                edges.remove((id, target.as_str(), kind.as_str())).map_err(storage_err)?;
                reverse.remove((target.as_str(), id, kind.as_str())).map_err(storage_err)?;
            }
            for (source, kind) in &incoming {
                edges.remove((source.as_str(), id, kind.as_str())).map_err(storage_err)?;
                reverse.remove((id, source.as_str(), kind.as_str())).map_err(storage_err)?;
            }
            tracing::debug!(id, outgoing = outgoing.len(), incoming = incoming.len(), "pruned node");
            existed
        };
        batch.commit()?;
        Ok(existed)
    }

    /// Row counts and on-disk size.
    pub fn stats(&self) -> Result<StoreStats, WeftError> {
        let read_txn = self.begin_read()?;
        let nodes = read_txn.open_table(NODES).map_err(storage_err)?;
        let edges = read_txn.open_table(EDGES).map_err(storage_err)?;
        let vectors = read_txn.open_table(EMBEDDINGS).map_err(storage_err)?;
        let file_bytes = std::fs::metadata(&self.path)
            .map(|m| m.len())
            .map_err(|e| WeftError::Io(e.to_string()))?;

        Ok(StoreStats {
            nodes: nodes.len().map_err(storage_err)?,
            edges: edges.len().map_err(storage_err)?,
            vectors: vectors.len().map_err(storage_err)?,
            file_bytes,
        })
    }

    /// Compact the store file after bulk writes.
    ///
    /// Returns whether any space was reclaimed. Fails while read transactions
    /// are still open on this handle.
    pub fn checkpoint(&mut self) -> Result<bool, WeftError> {
        match &mut self.backend {
            Backend::Writable(db) => db.compact().map_err(storage_err),
            Backend::ReadOnly(_) => Err(WeftError::ReadOnly),
        }
    }
}

fn wait_for_lock<T>(
    timeout: Duration,
    mut open: impl FnMut() -> Result<T, DatabaseError>,
) -> Result<T, WeftError> {
    let started = Instant::now();
    loop {
        match open() {
            Ok(db) => return Ok(db),
            Err(DatabaseError::DatabaseAlreadyOpen) if started.elapsed() < timeout => {
                std::thread::sleep(LOCK_RETRY_INTERVAL);
            }
            Err(e) => return Err(storage_err(e)),
        }
    }
}

// =============================================================================
// WRITE BATCH
// =============================================================================

/// A write transaction over the store.
pub struct WriteBatch {
    txn: WriteTransaction,
}

impl std::fmt::Debug for WriteBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteBatch").finish_non_exhaustive()
    }
}

impl WriteBatch {
    /// Insert or replace a node. A node without an embedding clears any
    /// previously stored vector.
    pub fn upsert_node(&mut self, node: &Node) -> Result<(), WeftError> {
        let vector = match &node.embedding {
            Some(embedding) => {
                let norm = embedding.norm();
                if (norm - 1.0).abs() > NORM_TOLERANCE {
                    return Err(WeftError::InvalidVector(format!(
                        "node {} has norm {norm:.6}",
                        node.id
                    )));
                }
                Some(embedding.to_bytes())
            }
            None => None,
        };
        let node_bytes =
            postcard::to_allocvec(node).map_err(|e| WeftError::Serialization(e.to_string()))?;

        let mut nodes = self.txn.open_table(NODES).map_err(storage_err)?;
        let mut vectors = self.txn.open_table(EMBEDDINGS).map_err(storage_err)?;
        nodes
            .insert(node.id.as_str(), node_bytes.as_slice())
            .map_err(storage_err)?;
        match vector {
            Some(bytes) => {
                vectors
                    .insert(node.id.as_str(), bytes.as_slice())
                    .map_err(storage_err)?;
            }
            None => {
                vectors.remove(node.id.as_str()).map_err(storage_err)?;
            }
        }
        Ok(())
    }

    /// Insert or overwrite an edge.
    ///
    /// Returns `true` if the triple was new. An edge whose endpoints do not
    /// both exist is skipped and reported as `false`.
    pub fn upsert_edge(&mut self, edge: &Edge) -> Result<bool, WeftError> {
        {
            let nodes = self.txn.open_table(NODES).map_err(storage_err)?;
            let source_exists = nodes.get(edge.source.as_str()).map_err(storage_err)?.is_some();
            let target_exists = nodes.get(edge.target.as_str()).map_err(storage_err)?.is_some();
            if !source_exists || !target_exists {
                tracing::debug!(source = %edge.source, target = %edge.target, "skipping dangling edge");
                return Ok(false);
            }
        }

        let attrs = postcard::to_allocvec(&edge.attributes())
            .map_err(|e| WeftError::Serialization(e.to_string()))?;
        let kind = edge.kind.as_str();

        let mut edges = self.txn.open_table(EDGES).map_err(storage_err)?;
        let mut reverse = self.txn.open_table(EDGES_REVERSE).map_err(storage_err)?;
        let created = edges
            .insert((edge.source.as_str(), edge.target.as_str(), kind), attrs.as_slice())
            .map_err(storage_err)?
            .is_none();
        reverse
            .insert((edge.target.as_str(), edge.source.as_str(), kind), ())
            .map_err(storage_err)?;
        Ok(created)
    }

    /// Read a node as seen by this transaction (including uncommitted writes).
    pub fn get_node(&self, id: &str) -> Result<Option<Node>, WeftError> {
        let nodes = self.txn.open_table(NODES).map_err(storage_err)?;
        let vectors = self.txn.open_table(EMBEDDINGS).map_err(storage_err)?;
        load_node(&nodes, &vectors, id)
    }

    /// Outgoing edges of a node as seen by this transaction.
    pub fn edges_from(&self, id: &str) -> Result<Vec<Edge>, WeftError> {
        let edges = self.txn.open_table(EDGES).map_err(storage_err)?;
        outgoing(&edges, id)
    }

    /// Delete one edge and its reverse entry. Returns `false` if it did not
    /// exist.
    pub fn remove_edge(
        &mut self,
        source: &str,
        target: &str,
        kind: &EdgeKind,
    ) -> Result<bool, WeftError> {
        let kind = kind.as_str();
        let mut edges = self.txn.open_table(EDGES).map_err(storage_err)?;
        let mut reverse = self.txn.open_table(EDGES_REVERSE).map_err(storage_err)?;
        let existed = edges
            .remove((source, target, kind))
            .map_err(storage_err)?
            .is_some();
        reverse.remove((target, source, kind)).map_err(storage_err)?;
        Ok(existed)
    }

    /// Commit every write of the batch atomically.
    pub fn commit(self) -> Result<(), WeftError> {
        self.txn.commit().map_err(storage_err)
    }
}

// =============================================================================
// DECODING
// =============================================================================

fn load_node<N, V>(nodes: &N, vectors: &V, id: &str) -> Result<Option<Node>, WeftError>
where
    N: ReadableTable<&'static str, &'static [u8]>,
    V: ReadableTable<&'static str, &'static [u8]>,
{
    let Some(data) = nodes.get(id).map_err(storage_err)? else {
        return Ok(None);
    };
    let mut node = decode_node(data.value())?;
    if let Some(bytes) = vectors.get(id).map_err(storage_err)? {
        node.embedding = Some(decode_embedding(bytes.value())?);
    }
    Ok(Some(node))
}

fn outgoing<T>(edges: &T, id: &str) -> Result<Vec<Edge>, WeftError>
where
    T: ReadableTable<(&'static str, &'static str, &'static str), &'static [u8]>,
{
    let mut found = Vec::new();
    for entry in edges.range((id, "", "")..).map_err(storage_err)? {
        let (key, value) = entry.map_err(storage_err)?;
        let (source, target, kind) = key.value();
        if source != id {
            break;
        }
        found.push(Edge::from_parts(source, target, kind, decode_attrs(value.value())?));
    }
    Ok(found)
}

fn decode_node(bytes: &[u8]) -> Result<Node, WeftError> {
    postcard::from_bytes(bytes).map_err(|e| WeftError::Deserialization(e.to_string()))
}

fn decode_attrs(bytes: &[u8]) -> Result<EdgeAttributes, WeftError> {
    postcard::from_bytes(bytes).map_err(|e| WeftError::Deserialization(e.to_string()))
}

fn decode_embedding(bytes: &[u8]) -> Result<Embedding, WeftError> {
    PackedVector::from_bytes(bytes)?.to_embedding()
}

/// Heap entry: ordered by score, then by reversed id so smaller ids win ties.
#[derive(Debug, PartialEq)]
struct Ranked {
    score: f32,
    id: String,
}

impl Eq for Ranked {}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// =============================================================================
// TESTS
// =============================================================================
