//! `StateStore` backed by redb: one table per entity namespace plus two
//! system tables for the cursor and the revert log.

use redb::{Database, ReadableDatabase as _, ReadableTable as _, TableDefinition};
use std::path::Path;
use tracing::{debug, info};

use tempo_core::{
    BlockNumber, ChainPoint, EntityValue, Namespace, RevertBlock, StateError, StateSchema,
    StateStore, StateWriter,
};

const CURSOR: TableDefinition<&str, &[u8]> = TableDefinition::new("_cursor");
const REVERT_LOG: TableDefinition<u64, &[u8]> = TableDefinition::new("_revert_log");

const CURSOR_KEY: &str = "cursor";

fn ns_table(ns: Namespace) -> TableDefinition<'static, &'static [u8], &'static [u8]> {
    TableDefinition::new(ns)
}

fn internal(err: impl std::fmt::Display) -> StateError {
    StateError::internal(err)
}

pub struct RedbStore {
    db: Database,
    schema: StateSchema,
}

impl RedbStore {
    pub fn open(path: impl AsRef<Path>, schema: StateSchema) -> Result<Self, StateError> {
        let db = Database::create(path.as_ref()).map_err(internal)?;

        info!(path = %path.as_ref().display(), "entity store opened");

        Self::bootstrap(db, schema)
    }

    pub fn in_memory(schema: StateSchema) -> Result<Self, StateError> {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .map_err(internal)?;

        Self::bootstrap(db, schema)
    }

    /// Provision every table up front so reads never hit a missing table.
    fn bootstrap(db: Database, schema: StateSchema) -> Result<Self, StateError> {
        let wx = db.begin_write().map_err(internal)?;

        for ns in schema.namespaces() {
            wx.open_table(ns_table(ns)).map_err(internal)?;
            debug!(ns, "table ready");
        }

        wx.open_table(CURSOR).map_err(internal)?;
        wx.open_table(REVERT_LOG).map_err(internal)?;

        wx.commit().map_err(internal)?;

        Ok(Self { db, schema })
    }

    pub fn schema(&self) -> &StateSchema {
        &self.schema
    }

    fn check_ns(&self, ns: Namespace) -> Result<(), StateError> {
        match self.schema.resolve(ns) {
            Some(_) => Ok(()),
            None => Err(StateError::NamespaceNotFound(ns.to_string())),
        }
    }
}

impl StateStore for RedbStore {
    type Writer<'a> = RedbWriter;

    fn read_cursor(&self) -> Result<Option<ChainPoint>, StateError> {
        let rx = self.db.begin_read().map_err(internal)?;
        let table = rx.open_table(CURSOR).map_err(internal)?;

        let raw = table.get(CURSOR_KEY).map_err(internal)?;

        match raw {
            Some(guard) => {
                let point = bincode::deserialize(guard.value()).map_err(internal)?;
                Ok(Some(point))
            }
            None => Ok(None),
        }
    }

    fn read_entity(&self, ns: Namespace, key: &[u8]) -> Result<Option<EntityValue>, StateError> {
        self.check_ns(ns)?;

        let rx = self.db.begin_read().map_err(internal)?;
        let table = rx.open_table(ns_table(ns)).map_err(internal)?;

        let raw = table.get(key).map_err(internal)?;

        Ok(raw.map(|guard| guard.value().to_vec()))
    }

    fn read_revert_block(&self, block: BlockNumber) -> Result<Option<RevertBlock>, StateError> {
        let rx = self.db.begin_read().map_err(internal)?;
        let table = rx.open_table(REVERT_LOG).map_err(internal)?;

        let raw = table.get(block).map_err(internal)?;

        match raw {
            Some(guard) => Ok(Some(RevertBlock::decode(guard.value())?)),
            None => Ok(None),
        }
    }

    fn start_writer(&self) -> Result<Self::Writer<'_>, StateError> {
        let wx = self.db.begin_write().map_err(internal)?;
        Ok(RedbWriter { wx })
    }
}

/// One redb write transaction; everything staged becomes durable on `commit`,
/// dropping the writer aborts it.
pub struct RedbWriter {
    wx: redb::WriteTransaction,
}

impl StateWriter for RedbWriter {
    fn set_cursor(&mut self, point: Option<ChainPoint>) -> Result<(), StateError> {
        let mut table = self.wx.open_table(CURSOR).map_err(internal)?;

        match point {
            Some(point) => {
                let raw = bincode::serialize(&point).map_err(internal)?;
                table.insert(CURSOR_KEY, raw.as_slice()).map_err(internal)?;
            }
            None => {
                table.remove(CURSOR_KEY).map_err(internal)?;
            }
        }

        Ok(())
    }

    fn write_entity(&mut self, ns: Namespace, key: &[u8], value: &[u8]) -> Result<(), StateError> {
        let mut table = self.wx.open_table(ns_table(ns)).map_err(internal)?;
        table.insert(key, value).map_err(internal)?;

        Ok(())
    }

    fn delete_entity(&mut self, ns: Namespace, key: &[u8]) -> Result<(), StateError> {
        let mut table = self.wx.open_table(ns_table(ns)).map_err(internal)?;
        table.remove(key).map_err(internal)?;

        Ok(())
    }

    fn write_revert_block(&mut self, block: &RevertBlock) -> Result<(), StateError> {
        let mut table = self.wx.open_table(REVERT_LOG).map_err(internal)?;
        let raw = block.encode()?;

        table
            .insert(block.block_number, raw.as_slice())
            .map_err(internal)?;

        Ok(())
    }

    fn delete_revert_block(&mut self, block: BlockNumber) -> Result<(), StateError> {
        let mut table = self.wx.open_table(REVERT_LOG).map_err(internal)?;
        table.remove(block).map_err(internal)?;

        Ok(())
    }

    fn prune_revert_log(&mut self, below: BlockNumber) -> Result<(), StateError> {
        let mut table = self.wx.open_table(REVERT_LOG).map_err(internal)?;

        let stale: Vec<u64> = table
            .range(..=below)
            .map_err(internal)?
            .map(|entry| entry.map(|(key, _)| key.value()))
            .collect::<Result<_, _>>()
            .map_err(internal)?;

        for block in stale {
            table.remove(block).map_err(internal)?;
        }

        Ok(())
    }

    fn commit(self) -> Result<(), StateError> {
        self.wx.commit().map_err(internal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde::{Deserialize, Serialize};
    use tempo_core::{revert_to, Entity, History, Revision, StateSchema};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        label: String,
    }

    impl Entity for Item {
        const NS: Namespace = "items";
    }

    fn schema() -> StateSchema {
        StateSchema::new(vec!["items"])
    }

    fn revision(block: BlockNumber, label: &str) -> Revision<Item> {
        let at = Utc.timestamp_opt(1_700_000_000 + block as i64, 0).unwrap();

        Revision {
            block_number: block,
            block_hash: format!("0x{block:02x}"),
            tx_hash: format!("0xt{block:02x}"),
            created_at: at,
            updated_at: at,
            is_delete: false,
            payload: Some(Item {
                label: label.into(),
            }),
        }
    }

    fn point(number: BlockNumber) -> ChainPoint {
        ChainPoint {
            number,
            hash: format!("0x{number:02x}"),
        }
    }

    /// Applies one block touching `items/k`: appends a revision, records the
    /// revert snapshot and advances the cursor.
    fn apply_block(store: &RedbStore, block: BlockNumber, label: &str) {
        let prev_point = store.read_cursor().unwrap();

        let mut history = store.read_history::<Item>(b"k").unwrap();
        let prior_versions = history.len();
        history.push(revision(block, label));

        let mut writer = store.start_writer().unwrap();
        writer
            .write_entity("items", b"k", &history.encode().unwrap())
            .unwrap();
        writer
            .write_revert_block(&RevertBlock {
                block_number: block,
                block_hash: format!("0x{block:02x}"),
                prev_point,
                entries: vec![tempo_core::RevertEntry {
                    ns: "items".into(),
                    key: b"k".to_vec(),
                    prior_versions,
                }],
            })
            .unwrap();
        writer.set_cursor(Some(point(block))).unwrap();
        writer.commit().unwrap();
    }

    #[test]
    fn entities_round_trip() {
        let store = RedbStore::in_memory(schema()).unwrap();

        apply_block(&store, 1, "one");

        let history = store.read_history::<Item>(b"k").unwrap();
        assert_eq!(history.live().unwrap().label, "one");
        assert_eq!(store.read_cursor().unwrap(), Some(point(1)));
    }

    #[test]
    fn dropped_writer_discards_the_block() {
        let store = RedbStore::in_memory(schema()).unwrap();

        {
            let mut writer = store.start_writer().unwrap();
            writer.write_entity("items", b"k", b"half-done").unwrap();
        }

        assert!(store.read_entity("items", b"k").unwrap().is_none());
    }

    #[test]
    fn unknown_namespace_is_an_error() {
        let store = RedbStore::in_memory(schema()).unwrap();

        let res = store.read_entity("ghosts", b"k");
        assert!(matches!(res, Err(StateError::NamespaceNotFound(_))));
    }

    #[test]
    fn revert_unwinds_to_the_target_block() {
        let store = RedbStore::in_memory(schema()).unwrap();

        apply_block(&store, 1, "one");
        apply_block(&store, 2, "two");
        apply_block(&store, 3, "three");

        let unwound = revert_to(&store, &schema(), 1).unwrap();
        assert_eq!(unwound, 2);

        let history = store.read_history::<Item>(b"k").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history.live().unwrap().label, "one");

        assert_eq!(store.read_cursor().unwrap(), Some(point(1)));
        assert!(store.read_revert_block(2).unwrap().is_none());
        assert!(store.read_revert_block(3).unwrap().is_none());
        assert!(store.read_revert_block(1).unwrap().is_some());
    }

    #[test]
    fn revert_past_the_first_block_clears_the_cursor() {
        let store = RedbStore::in_memory(schema()).unwrap();

        apply_block(&store, 1, "one");

        let unwound = revert_to(&store, &schema(), 0).unwrap();
        assert_eq!(unwound, 1);

        assert!(store.read_cursor().unwrap().is_none());
        assert!(store.read_entity("items", b"k").unwrap().is_none());
    }

    #[test]
    fn missing_snapshot_is_fatal() {
        let store = RedbStore::in_memory(schema()).unwrap();

        apply_block(&store, 1, "one");
        apply_block(&store, 2, "two");

        let mut writer = store.start_writer().unwrap();
        writer.delete_revert_block(2).unwrap();
        writer.commit().unwrap();

        let res = revert_to(&store, &schema(), 0);
        assert!(matches!(
            res,
            Err(tempo_core::RevertError::MissingSnapshot(2))
        ));
    }
}
