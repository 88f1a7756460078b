//! In-memory fakes for the store and side-effect boundaries, plus fixture
//! builders for blocks and action events. Everything here is test support;
//! unwraps are fine.

use chrono::{TimeZone, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use tempo_core::{
    ActionEvent, ActionKind, BlockEnvelope, BlockNumber, BlockSource, ChainPoint, ChallengeBus,
    ChallengeDispatch, Entity, EntityId, EntityKey, EntityValue, History, Namespace, PullEvent,
    RefreshCache, RevertBlock, Revision, SideEffectError, SourceError, StateError, StateStore,
    StateWriter, TxReceipt, UserId, Wallet, WalletChain, WalletVerifier,
};

#[derive(Default)]
struct Inner {
    entities: HashMap<(Namespace, EntityKey), EntityValue>,
    cursor: Option<ChainPoint>,
    revert: BTreeMap<BlockNumber, RevertBlock>,
}

/// A `StateStore` held entirely in memory. Writers buffer their operations
/// and apply them on commit, so a dropped writer leaves no trace, matching
/// the durable store's transaction semantics.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count of revert-log rows currently held.
    pub fn revert_rows(&self) -> usize {
        self.inner.lock().unwrap().revert.len()
    }
}

enum Op {
    Put(Namespace, EntityKey, EntityValue),
    Del(Namespace, EntityKey),
    Cursor(Option<ChainPoint>),
    PutRevert(RevertBlock),
    DelRevert(BlockNumber),
    PruneRevert(BlockNumber),
}

pub struct MemoryWriter<'a> {
    store: &'a MemoryStore,
    ops: Vec<Op>,
}

impl StateStore for MemoryStore {
    type Writer<'a> = MemoryWriter<'a>;

    fn read_cursor(&self) -> Result<Option<ChainPoint>, StateError> {
        Ok(self.inner.lock().unwrap().cursor.clone())
    }

    fn read_entity(&self, ns: Namespace, key: &[u8]) -> Result<Option<EntityValue>, StateError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .entities
            .get(&(ns, key.to_vec()))
            .cloned())
    }

    fn read_revert_block(&self, block: BlockNumber) -> Result<Option<RevertBlock>, StateError> {
        Ok(self.inner.lock().unwrap().revert.get(&block).cloned())
    }

    fn start_writer(&self) -> Result<Self::Writer<'_>, StateError> {
        Ok(MemoryWriter {
            store: self,
            ops: Vec::new(),
        })
    }
}

impl StateWriter for MemoryWriter<'_> {
    fn set_cursor(&mut self, point: Option<ChainPoint>) -> Result<(), StateError> {
        self.ops.push(Op::Cursor(point));
        Ok(())
    }

    fn write_entity(&mut self, ns: Namespace, key: &[u8], value: &[u8]) -> Result<(), StateError> {
        self.ops.push(Op::Put(ns, key.to_vec(), value.to_vec()));
        Ok(())
    }

    fn delete_entity(&mut self, ns: Namespace, key: &[u8]) -> Result<(), StateError> {
        self.ops.push(Op::Del(ns, key.to_vec()));
        Ok(())
    }

    fn write_revert_block(&mut self, block: &RevertBlock) -> Result<(), StateError> {
        self.ops.push(Op::PutRevert(block.clone()));
        Ok(())
    }

    fn delete_revert_block(&mut self, block: BlockNumber) -> Result<(), StateError> {
        self.ops.push(Op::DelRevert(block));
        Ok(())
    }

    fn prune_revert_log(&mut self, below: BlockNumber) -> Result<(), StateError> {
        self.ops.push(Op::PruneRevert(below));
        Ok(())
    }

    fn commit(self) -> Result<(), StateError> {
        let mut inner = self.store.inner.lock().unwrap();

        for op in self.ops {
            match op {
                Op::Put(ns, key, value) => {
                    inner.entities.insert((ns, key), value);
                }
                Op::Del(ns, key) => {
                    inner.entities.remove(&(ns, key));
                }
                Op::Cursor(point) => inner.cursor = point,
                Op::PutRevert(block) => {
                    inner.revert.insert(block.block_number, block);
                }
                Op::DelRevert(block) => {
                    inner.revert.remove(&block);
                }
                Op::PruneRevert(below) => {
                    inner.revert = inner.revert.split_off(&(below + 1));
                }
            }
        }

        Ok(())
    }
}

/// Write a single-revision history for `payload` directly into the store,
/// bypassing the action pipeline. Seeded revisions sit at block 1.
pub fn seed_entity<T: Entity>(store: &MemoryStore, key: &[u8], payload: T) {
    let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

    let mut history = History::new();
    history.push(Revision {
        block_number: 1,
        block_hash: "0xseed".into(),
        tx_hash: "0xseed".into(),
        created_at: at,
        updated_at: at,
        is_delete: false,
        payload: Some(payload),
    });

    let mut writer = store.start_writer().unwrap();
    writer
        .write_entity(T::NS, key, &history.encode().unwrap())
        .unwrap();
    writer.commit().unwrap();
}

/// Challenge bus that remembers every dispatch.
#[derive(Default)]
pub struct RecordingBus {
    events: Mutex<Vec<ChallengeDispatch>>,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatched(&self) -> Vec<ChallengeDispatch> {
        self.events.lock().unwrap().clone()
    }
}

impl ChallengeBus for RecordingBus {
    fn dispatch(&self, event: &ChallengeDispatch) -> Result<(), SideEffectError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Refresh cache that remembers every enqueued user id.
#[derive(Default)]
pub struct RecordingCache {
    refreshes: Mutex<Vec<UserId>>,
}

impl RecordingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refreshed(&self) -> Vec<UserId> {
        self.refreshes.lock().unwrap().clone()
    }
}

impl RefreshCache for RecordingCache {
    fn enqueue_refresh(&self, user_id: UserId) -> Result<(), SideEffectError> {
        self.refreshes.lock().unwrap().push(user_id);
        Ok(())
    }
}

/// Wallet verifier with a fixed verdict.
pub struct StaticVerifier {
    accept: bool,
}

impl StaticVerifier {
    pub fn accepting() -> Self {
        Self { accept: true }
    }

    pub fn rejecting() -> Self {
        Self { accept: false }
    }
}

impl WalletVerifier for StaticVerifier {
    fn verify(&self, _chain: WalletChain, _user_id: UserId, _wallet: &str, _sig: &str) -> bool {
        self.accept
    }
}

pub fn action(
    entity_kind: tempo_core::EntityKind,
    action: ActionKind,
    entity_id: EntityId,
    user_id: UserId,
    metadata: impl Into<String>,
    signer: &str,
) -> ActionEvent {
    ActionEvent {
        entity_kind,
        entity_id,
        user_id,
        action,
        metadata: metadata.into(),
        signer: Wallet::new(signer),
    }
}

pub fn tx(hash: &str, actions: Vec<ActionEvent>) -> TxReceipt {
    TxReceipt {
        tx_hash: hash.into(),
        actions,
    }
}

/// Block source that replays a fixed script of pull events, then runs dry.
pub struct ScriptedSource {
    events: VecDeque<PullEvent>,
}

impl ScriptedSource {
    pub fn new(events: Vec<PullEvent>) -> Self {
        Self {
            events: events.into(),
        }
    }
}

impl BlockSource for ScriptedSource {
    fn pull_next(&mut self) -> Result<Option<PullEvent>, SourceError> {
        Ok(self.events.pop_front())
    }
}

/// Block with a derived hash and timestamp, so fixtures only pick numbers.
pub fn block(number: BlockNumber, txs: Vec<TxReceipt>) -> BlockEnvelope {
    BlockEnvelope {
        number,
        hash: format!("0xb{number:08x}"),
        timestamp: 1_700_000_000 + number as i64,
        txs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_writer_leaves_no_trace() {
        let store = MemoryStore::new();

        {
            let mut writer = store.start_writer().unwrap();
            writer.write_entity("users", b"k", b"v").unwrap();
            // dropped without commit
        }

        assert!(store.read_entity("users", b"k").unwrap().is_none());
    }

    #[test]
    fn prune_drops_rows_at_or_below() {
        let store = MemoryStore::new();

        let mut writer = store.start_writer().unwrap();
        for number in 1..=5 {
            writer
                .write_revert_block(&RevertBlock {
                    block_number: number,
                    block_hash: format!("0x{number:02x}"),
                    prev_point: None,
                    entries: Vec::new(),
                })
                .unwrap();
        }
        writer.commit().unwrap();

        let mut writer = store.start_writer().unwrap();
        writer.prune_revert_log(3).unwrap();
        writer.commit().unwrap();

        assert_eq!(store.revert_rows(), 2);
        assert!(store.read_revert_block(3).unwrap().is_none());
        assert!(store.read_revert_block(4).unwrap().is_some());
    }
}
