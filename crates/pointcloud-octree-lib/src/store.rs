//! Tile store: two ordered `sled` trees keyed by tile id
//!
//! The `nodes` tree holds node entries (metadata), the `node_data` tree holds the
//! encoded points. Both use the raw quadrant path as key. sled orders keys
//! lexicographically with shorter keys first, so a range scan starting at an id
//! visits the id itself and then all of its descendants contiguously.

use crate::tile_id::TileId;
use crate::{OctreeError, Result};
use sled::transaction::{TransactionError, TransactionResult};
use sled::{IVec, Transactional, Tree};
use std::path::Path;

const NODES_TREE: &str = "nodes";
const NODE_DATA_TREE: &str = "node_data";

/// The two tables of the store
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Table {
    /// Node entries (sector, count, average, format)
    Nodes,
    /// Encoded point payloads
    NodeData,
}

/// A pair of entries to be written for one tile
#[derive(Clone, Debug)]
pub struct TileWrite {
    pub id: TileId,
    pub node_entry: Vec<u8>,
    pub node_data_entry: Vec<u8>,
}

/// Handle to the persistent tables
///
/// Cloning is cheap and yields a handle to the same database.
#[derive(Clone, Debug)]
pub struct TileStore {
    db: sled::Db,
    nodes: Tree,
    node_data: Tree,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl TileStore {
    /// Open (or create) a store at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Store backed by a temporary directory, removed on drop
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    pub fn from_db(db: sled::Db) -> Result<Self> {
        let nodes = db.open_tree(NODES_TREE)?;
        let node_data = db.open_tree(NODE_DATA_TREE)?;
        Ok(Self {
            db,
            nodes,
            node_data,
        })
    }

    fn tree(&self, table: Table) -> &Tree {
        match table {
            Table::Nodes => &self.nodes,
            Table::NodeData => &self.node_data,
        }
    }

    /// Point lookup
    pub fn get(&self, table: Table, id: &TileId) -> Result<Option<IVec>> {
        Ok(self.tree(table).get(id.as_bytes())?)
    }

    /// Ordered scan over all entries whose key is `>= id`
    ///
    /// The iterator owns its start key and only borrows the store.
    pub fn range_from<'a>(
        &'a self,
        table: Table,
        id: &TileId,
    ) -> impl Iterator<Item = Result<(TileId, IVec)>> + use<'a> {
        self.tree(table)
            .range(id.as_bytes().to_vec()..)
            .map(|entry| {
                let (key, value) = entry?;
                Ok((TileId::try_from(&key[..])?, value))
            })
    }

    /// Ordered scan over every entry of a table
    pub fn scan(&self, table: Table) -> impl Iterator<Item = Result<(TileId, IVec)>> + use<'_> {
        self.range_from(table, &TileId::root())
    }

    /// Both entries of a tile read in one transaction, so they always belong to
    /// the same write
    pub fn get_pair(&self, id: &TileId) -> Result<(Option<IVec>, Option<IVec>)> {
        let result: TransactionResult<(Option<IVec>, Option<IVec>)> =
            (&self.nodes, &self.node_data).transaction(|(nodes, node_data)| {
                Ok((nodes.get(id.as_bytes())?, node_data.get(id.as_bytes())?))
            });
        result.map_err(from_transaction_error)
    }

    /// Ids of all persisted nodes strictly below `id`, in key order
    pub fn descendants(&self, id: &TileId) -> Result<Vec<TileId>> {
        let mut result = Vec::new();
        for entry in self.range_from(Table::Nodes, id) {
            let (key, _) = entry?;
            if !id.is_ancestor_or_self_of(&key) {
                break;
            }
            if key != *id {
                result.push(key);
            }
        }
        Ok(result)
    }

    /// Write both entries of a tile in one transaction
    pub fn put_pair(&self, node_entry: &[u8], node_data_entry: &[u8], id: &TileId) -> Result<()> {
        let result: TransactionResult<()> =
            (&self.nodes, &self.node_data).transaction(|(nodes, node_data)| {
                nodes.insert(id.as_bytes(), node_entry)?;
                node_data.insert(id.as_bytes(), node_data_entry)?;
                Ok(())
            });
        result.map_err(from_transaction_error)
    }

    /// Write several tiles in one transaction; either all become visible or none
    pub fn put_pairs(&self, writes: &[TileWrite]) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }
        let result: TransactionResult<()> =
            (&self.nodes, &self.node_data).transaction(|(nodes, node_data)| {
                for write in writes {
                    nodes.insert(write.id.as_bytes(), write.node_entry.as_slice())?;
                    node_data.insert(write.id.as_bytes(), write.node_data_entry.as_slice())?;
                }
                Ok(())
            });
        result.map_err(from_transaction_error)
    }

    /// Number of persisted nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Flush dirty pages to disk, returning the number of bytes flushed
    pub fn flush(&self) -> Result<usize> {
        Ok(self.db.flush()?)
    }

    /// Approximate on-disk size in bytes
    pub fn size_on_disk(&self) -> Result<u64> {
        Ok(self.db.size_on_disk()?)
    }
}

fn from_transaction_error(error: TransactionError<()>) -> OctreeError {
    match error {
        TransactionError::Abort(()) => OctreeError::Transaction("transaction aborted".to_string()),
        TransactionError::Storage(error) => OctreeError::Storage(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> TileId {
        s.parse().unwrap()
    }

    #[test]
    fn test_get_missing_returns_none() {
        let store = TileStore::temporary().unwrap();
        assert!(store.get(Table::Nodes, &id("01")).unwrap().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_put_pair_writes_both_tables() {
        let store = TileStore::temporary().unwrap();
        store.put_pair(b"meta", b"data", &id("012")).unwrap();

        assert_eq!(
            store.get(Table::Nodes, &id("012")).unwrap().as_deref(),
            Some(&b"meta"[..])
        );
        assert_eq!(
            store.get(Table::NodeData, &id("012")).unwrap().as_deref(),
            Some(&b"data"[..])
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_pair_reads_both_tables() {
        let store = TileStore::temporary().unwrap();
        store.put_pair(b"meta", b"data", &id("21")).unwrap();

        let (node, data) = store.get_pair(&id("21")).unwrap();
        assert_eq!(node.as_deref(), Some(&b"meta"[..]));
        assert_eq!(data.as_deref(), Some(&b"data"[..]));

        let (node, data) = store.get_pair(&id("22")).unwrap();
        assert!(node.is_none() && data.is_none());
    }

    #[test]
    fn test_scan_outlives_start_key() {
        let store = TileStore::temporary().unwrap();
        store.put_pair(b"m", b"d", &id("1")).unwrap();
        let entries = {
            let start = id("0");
            store.range_from(Table::NodeData, &start)
        };
        assert_eq!(entries.count(), 1);
        assert_eq!(store.scan(Table::Nodes).count(), 1);
    }

    #[test]
    fn test_put_pair_overwrites() {
        let store = TileStore::temporary().unwrap();
        store.put_pair(b"old", b"old", &id("3")).unwrap();
        store.put_pair(b"new", b"new", &id("3")).unwrap();
        assert_eq!(
            store.get(Table::Nodes, &id("3")).unwrap().as_deref(),
            Some(&b"new"[..])
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_root_key_is_empty() {
        let store = TileStore::temporary().unwrap();
        store.put_pair(b"root", b"", &TileId::root()).unwrap();
        assert!(store.get(Table::Nodes, &TileId::root()).unwrap().is_some());
        let keys: Vec<TileId> = store
            .scan(Table::Nodes)
            .map(|entry| entry.unwrap().0)
            .collect();
        assert_eq!(keys, vec![TileId::root()]);
    }

    #[test]
    fn test_range_from_is_ordered() {
        let store = TileStore::temporary().unwrap();
        for key in ["2", "01", "0", "013", "3", "1"] {
            store.put_pair(b"m", b"d", &id(key)).unwrap();
        }
        let keys: Vec<String> = store
            .range_from(Table::Nodes, &id("01"))
            .map(|entry| entry.unwrap().0.to_string())
            .collect();
        assert_eq!(keys, vec!["01", "013", "1", "2", "3"]);
    }

    #[test]
    fn test_descendants() {
        let store = TileStore::temporary().unwrap();
        for key in ["0", "01", "013", "0132", "02", "1", "10"] {
            store.put_pair(b"m", b"d", &id(key)).unwrap();
        }
        let found: Vec<String> = store
            .descendants(&id("01"))
            .unwrap()
            .iter()
            .map(|d| d.to_string())
            .collect();
        assert_eq!(found, vec!["013", "0132"]);
        assert!(store.descendants(&id("2")).unwrap().is_empty());
        assert_eq!(store.descendants(&TileId::root()).unwrap().len(), 7);
    }

    #[test]
    fn test_put_pairs_is_atomic_batch() {
        let store = TileStore::temporary().unwrap();
        let writes = vec![
            TileWrite {
                id: id("0"),
                node_entry: b"a".to_vec(),
                node_data_entry: b"b".to_vec(),
            },
            TileWrite {
                id: id("00"),
                node_entry: b"c".to_vec(),
                node_data_entry: b"d".to_vec(),
            },
        ];
        store.put_pairs(&writes).unwrap();
        assert_eq!(store.len(), 2);
        store.put_pairs(&[]).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_reopen_preserves_entries() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = TileStore::open(dir.path()).unwrap();
            store.put_pair(b"m", b"d", &id("123")).unwrap();
            store.flush().unwrap();
        }
        let store = TileStore::open(dir.path()).unwrap();
        assert!(store.get(Table::Nodes, &id("123")).unwrap().is_some());
    }
}
