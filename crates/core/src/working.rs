use itertools::Itertools as _;
use std::collections::HashMap;

use crate::{
    Entity, EntityKey, EntityValue, History, Namespace, RawHistory, RevertEntry, Revision,
    StateError, StateStore,
};

struct Slot {
    prior_versions: usize,
    raw: RawHistory,
    dirty: bool,
}

/// In-memory view of every history a block touches.
///
/// Keys are loaded from the store on first access and buffered from then on,
/// so later actions in the same block observe earlier ones before anything is
/// committed. The version count at first load is what goes into the block's
/// revert snapshot.
pub struct WorkingSet<'a, S: StateStore> {
    store: &'a S,
    slots: HashMap<(Namespace, EntityKey), Slot>,
}

impl<'a, S: StateStore> WorkingSet<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            slots: HashMap::new(),
        }
    }

    fn slot(&mut self, ns: Namespace, key: &[u8]) -> Result<&mut Slot, StateError> {
        let slot_key = (ns, key.to_vec());

        if !self.slots.contains_key(&slot_key) {
            let raw = match self.store.read_entity(ns, key)? {
                Some(bytes) => RawHistory::decode(&bytes)?,
                None => RawHistory(Vec::new()),
            };

            self.slots.insert(
                slot_key.clone(),
                Slot {
                    prior_versions: raw.len(),
                    raw,
                    dirty: false,
                },
            );
        }

        Ok(self.slots.get_mut(&slot_key).unwrap())
    }

    /// The full typed history for a key, reflecting any writes already staged
    /// in this block.
    pub fn history<T: Entity>(&mut self, key: &[u8]) -> Result<History<T>, StateError> {
        let slot = self.slot(T::NS, key)?;
        History::from_raw(&slot.raw)
    }

    /// The current non-deleted payload for a key, if any.
    pub fn live<T: Entity>(&mut self, key: &[u8]) -> Result<Option<T>, StateError> {
        Ok(self.history::<T>(key)?.live().cloned())
    }

    /// Append a new revision, staging the write for commit.
    pub fn push<T: Entity>(&mut self, key: &[u8], revision: Revision<T>) -> Result<(), StateError> {
        let bytes = bincode::serialize(&revision).map_err(StateError::internal)?;

        let slot = self.slot(T::NS, key)?;
        slot.raw.0.push(bytes);
        slot.dirty = true;

        Ok(())
    }

    /// Collapse into the block's entity writes and revert entries. Untouched
    /// slots (read but never written) produce neither.
    pub fn into_commit(self) -> Result<BlockCommit, StateError> {
        let mut writes = Vec::new();
        let mut revert = Vec::new();

        let dirty = self
            .slots
            .into_iter()
            .filter(|(_, slot)| slot.dirty)
            .sorted_by(|a, b| a.0.cmp(&b.0));

        for ((ns, key), slot) in dirty {
            writes.push((ns, key.clone(), slot.raw.encode()?));

            revert.push(RevertEntry {
                ns: ns.to_string(),
                key,
                prior_versions: slot.prior_versions,
            });
        }

        Ok(BlockCommit { writes, revert })
    }
}

/// The durable output of one block: history writes plus the matching revert
/// snapshot entries, both sorted by namespace and key.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockCommit {
    pub writes: Vec<(Namespace, EntityKey, EntityValue)>,
    pub revert: Vec<RevertEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BlockNumber, ChainPoint, RevertBlock, StateWriter};
    use chrono::{TimeZone, Utc};
    use serde::{Deserialize, Serialize};
    use std::cell::RefCell;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        value: u32,
    }

    impl Entity for Counter {
        const NS: Namespace = "counters";
    }

    #[derive(Default)]
    struct FakeStore {
        entities: RefCell<HashMap<(Namespace, EntityKey), EntityValue>>,
    }

    struct FakeWriter<'a> {
        store: &'a FakeStore,
    }

    impl StateStore for FakeStore {
        type Writer<'a> = FakeWriter<'a>;

        fn read_cursor(&self) -> Result<Option<ChainPoint>, StateError> {
            Ok(None)
        }

        fn read_entity(
            &self,
            ns: Namespace,
            key: &[u8],
        ) -> Result<Option<EntityValue>, StateError> {
            Ok(self.entities.borrow().get(&(ns, key.to_vec())).cloned())
        }

        fn read_revert_block(&self, _block: BlockNumber) -> Result<Option<RevertBlock>, StateError> {
            Ok(None)
        }

        fn start_writer(&self) -> Result<Self::Writer<'_>, StateError> {
            Ok(FakeWriter { store: self })
        }
    }

    impl StateWriter for FakeWriter<'_> {
        fn set_cursor(&mut self, _point: Option<ChainPoint>) -> Result<(), StateError> {
            Ok(())
        }

        fn write_entity(
            &mut self,
            ns: Namespace,
            key: &[u8],
            value: &[u8],
        ) -> Result<(), StateError> {
            self.store
                .entities
                .borrow_mut()
                .insert((ns, key.to_vec()), value.to_vec());

            Ok(())
        }

        fn delete_entity(&mut self, ns: Namespace, key: &[u8]) -> Result<(), StateError> {
            self.store.entities.borrow_mut().remove(&(ns, key.to_vec()));
            Ok(())
        }

        fn write_revert_block(&mut self, _block: &RevertBlock) -> Result<(), StateError> {
            Ok(())
        }

        fn delete_revert_block(&mut self, _block: BlockNumber) -> Result<(), StateError> {
            Ok(())
        }

        fn prune_revert_log(&mut self, _below: BlockNumber) -> Result<(), StateError> {
            Ok(())
        }

        fn commit(self) -> Result<(), StateError> {
            Ok(())
        }
    }

    fn rev(value: u32) -> Revision<Counter> {
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

        Revision {
            block_number: 1,
            block_hash: "0x01".into(),
            tx_hash: "0xaa".into(),
            created_at: at,
            updated_at: at,
            is_delete: false,
            payload: Some(Counter { value }),
        }
    }

    #[test]
    fn staged_writes_are_visible_within_the_block() {
        let store = FakeStore::default();
        let mut ws = WorkingSet::new(&store);

        assert!(ws.live::<Counter>(b"a").unwrap().is_none());

        ws.push(b"a", rev(1)).unwrap();
        assert_eq!(ws.live::<Counter>(b"a").unwrap(), Some(Counter { value: 1 }));

        // nothing durable until commit
        assert!(store.read_entity("counters", b"a").unwrap().is_none());
    }

    #[test]
    fn commit_records_prior_version_counts() {
        let store = FakeStore::default();

        let mut ws = WorkingSet::new(&store);
        ws.push(b"a", rev(1)).unwrap();
        let commit = ws.into_commit().unwrap();

        assert_eq!(commit.revert.len(), 1);
        assert_eq!(commit.revert[0].prior_versions, 0);

        let mut writer = store.start_writer().unwrap();
        for (ns, key, value) in &commit.writes {
            writer.write_entity(ns, key, value).unwrap();
        }
        writer.commit().unwrap();

        // a later block sees one prior version
        let mut ws = WorkingSet::new(&store);
        ws.push(b"a", rev(2)).unwrap();
        let commit = ws.into_commit().unwrap();

        assert_eq!(commit.revert[0].prior_versions, 1);
        assert_eq!(
            History::<Counter>::decode(&commit.writes[0].2).unwrap().len(),
            2
        );
    }

    #[test]
    fn read_only_slots_produce_no_output() {
        let store = FakeStore::default();

        let mut ws = WorkingSet::new(&store);
        let _ = ws.live::<Counter>(b"a").unwrap();
        let commit = ws.into_commit().unwrap();

        assert!(commit.writes.is_empty());
        assert!(commit.revert.is_empty());
    }
}
