use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    BlockHash, BlockNumber, ChainPoint, EntityKey, RawHistory, StateError, StateSchema, StateStore,
    StateWriter,
};

/// Undo data for one key touched by a block: how many versions its history had
/// before the block ran. Reverting truncates the chain back to that count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevertEntry {
    pub ns: String,
    pub key: EntityKey,
    pub prior_versions: usize,
}

/// Per-block undo record, written in the same transaction as the block's
/// entity writes. Every processed block gets one, even when no key changed,
/// so a hole in the log is detectable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevertBlock {
    pub block_number: BlockNumber,
    pub block_hash: BlockHash,

    /// Cursor value before this block; `None` for the first block ever applied
    pub prev_point: Option<ChainPoint>,

    pub entries: Vec<RevertEntry>,
}

impl RevertBlock {
    pub fn encode(&self) -> Result<Vec<u8>, StateError> {
        bincode::serialize(self).map_err(StateError::internal)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StateError> {
        bincode::deserialize(bytes).map_err(StateError::internal)
    }
}

#[derive(Debug, Error)]
pub enum RevertError {
    #[error("no revert snapshot for block {0}, rollback target is beyond the horizon")]
    MissingSnapshot(BlockNumber),

    #[error("rollback target {target} is ahead of the cursor {cursor}")]
    TargetAhead {
        target: BlockNumber,
        cursor: BlockNumber,
    },

    #[error("unknown namespace {0} in revert snapshot")]
    UnknownNamespace(String),

    #[error(transparent)]
    State(#[from] StateError),
}

/// Undo every block above `target`, newest first, leaving the store exactly as
/// it was after `target` committed. Returns the number of blocks unwound.
pub fn revert_to<S: StateStore>(
    store: &S,
    schema: &StateSchema,
    target: BlockNumber,
) -> Result<usize, RevertError> {
    let cursor = match store.read_cursor()? {
        Some(point) => point,
        None => return Ok(0),
    };

    if cursor.number < target {
        return Err(RevertError::TargetAhead {
            target,
            cursor: cursor.number,
        });
    }

    if cursor.number == target {
        return Ok(0);
    }

    let mut unwound = 0;

    for block in (target + 1..=cursor.number).rev() {
        let snapshot = store
            .read_revert_block(block)?
            .ok_or(RevertError::MissingSnapshot(block))?;

        revert_one(store, schema, &snapshot)?;

        debug!(block, entries = snapshot.entries.len(), "block unwound");
        unwound += 1;
    }

    info!(target, unwound, "rollback complete");

    Ok(unwound)
}

fn revert_one<S: StateStore>(
    store: &S,
    schema: &StateSchema,
    snapshot: &RevertBlock,
) -> Result<(), RevertError> {
    let mut writer = store.start_writer()?;

    for entry in &snapshot.entries {
        let ns = schema
            .resolve(&entry.ns)
            .ok_or_else(|| RevertError::UnknownNamespace(entry.ns.clone()))?;

        let raw = store.read_entity(ns, &entry.key)?;

        let mut history = match raw {
            Some(bytes) => RawHistory::decode(&bytes)?,
            None => RawHistory(Vec::new()),
        };

        history.truncate(entry.prior_versions);

        if history.is_empty() {
            writer.delete_entity(ns, &entry.key)?;
        } else {
            writer.write_entity(ns, &entry.key, &history.encode()?)?;
        }
    }

    writer.delete_revert_block(snapshot.block_number)?;

    writer.set_cursor(snapshot.prev_point.clone())?;
    writer.commit()?;

    Ok(())
}
