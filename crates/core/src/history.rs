use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{BlockHash, BlockNumber, StateError, TxHash};

/// One version of an entity, pinned to the block and transaction that produced
/// it. The payload is `None` for tombstone revisions written by deletes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision<T> {
    pub block_number: BlockNumber,
    pub block_hash: BlockHash,
    pub tx_hash: TxHash,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_delete: bool,
    pub payload: Option<T>,
}

/// The full version chain of one business key, oldest first.
///
/// The last revision is the current one; there is no flag to keep consistent.
/// Rolling back a block is a truncation of the tail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct History<T> {
    revisions: Vec<Revision<T>>,
}

impl<T> Default for History<T> {
    fn default() -> Self {
        Self {
            revisions: Vec::new(),
        }
    }
}

impl<T> History<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    pub fn revisions(&self) -> &[Revision<T>] {
        &self.revisions
    }

    /// The current revision, deleted or not.
    pub fn current(&self) -> Option<&Revision<T>> {
        self.revisions.last()
    }

    /// The current payload, unless the key is absent or tombstoned.
    pub fn live(&self) -> Option<&T> {
        match self.current() {
            Some(rev) if !rev.is_delete => rev.payload.as_ref(),
            _ => None,
        }
    }

    /// Whether the current revision is a tombstone.
    pub fn is_deleted(&self) -> bool {
        self.current().map(|rev| rev.is_delete).unwrap_or(false)
    }

    /// Creation timestamp carried forward from the first revision.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.revisions.first().map(|rev| rev.created_at)
    }

    pub fn push(&mut self, revision: Revision<T>) {
        self.revisions.push(revision);
    }

    /// Drop revisions beyond `keep`, undoing everything a block appended.
    pub fn truncate(&mut self, keep: usize) {
        self.revisions.truncate(keep);
    }
}

impl<T> History<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn encode(&self) -> Result<Vec<u8>, StateError> {
        let raw = self
            .revisions
            .iter()
            .map(|rev| bincode::serialize(rev).map_err(StateError::internal))
            .collect::<Result<Vec<_>, _>>()?;

        RawHistory(raw).encode()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StateError> {
        Self::from_raw(&RawHistory::decode(bytes)?)
    }

    pub fn from_raw(raw: &RawHistory) -> Result<Self, StateError> {
        let revisions = raw
            .0
            .iter()
            .map(|rev| bincode::deserialize(rev).map_err(StateError::internal))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { revisions })
    }
}

/// A history with each revision kept as its encoded bytes. The revert path
/// truncates version chains without knowing their payload type, so the stored
/// form has to expose revision boundaries untyped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawHistory(pub Vec<Vec<u8>>);

impl RawHistory {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn truncate(&mut self, keep: usize) {
        self.0.truncate(keep);
    }

    pub fn encode(&self) -> Result<Vec<u8>, StateError> {
        bincode::serialize(&self.0).map_err(StateError::internal)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StateError> {
        bincode::deserialize::<Vec<Vec<u8>>>(bytes)
            .map(Self)
            .map_err(StateError::internal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn rev(block: BlockNumber, is_delete: bool, payload: Option<u32>) -> Revision<u32> {
        let at = Utc.timestamp_opt(1_700_000_000 + block as i64, 0).unwrap();

        Revision {
            block_number: block,
            block_hash: format!("0x{block:02x}"),
            tx_hash: format!("0xt{block:02x}"),
            created_at: at,
            updated_at: at,
            is_delete,
            payload,
        }
    }

    #[test]
    fn live_skips_tombstones() {
        let mut history = History::new();
        assert!(history.live().is_none());

        history.push(rev(1, false, Some(7)));
        assert_eq!(history.live(), Some(&7));

        history.push(rev(2, true, Some(7)));
        assert!(history.live().is_none());
        assert!(history.is_deleted());
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn truncate_restores_prior_current() {
        let mut history = History::new();
        history.push(rev(1, false, Some(1)));
        history.push(rev(2, false, Some(2)));
        history.push(rev(3, false, Some(3)));

        history.truncate(1);

        assert_eq!(history.len(), 1);
        assert_eq!(history.live(), Some(&1));
    }

    #[test]
    fn roundtrips_through_bincode() {
        let mut history = History::new();
        history.push(rev(1, false, Some(42)));
        history.push(rev(5, true, None));

        let bytes = history.encode().unwrap();
        let back = History::<u32>::decode(&bytes).unwrap();

        assert_eq!(history, back);
    }

    #[test]
    fn raw_truncation_preserves_typed_decode() {
        let mut history = History::new();
        history.push(rev(1, false, Some(1)));
        history.push(rev(2, false, Some(2)));

        let mut raw = RawHistory::decode(&history.encode().unwrap()).unwrap();
        assert_eq!(raw.len(), 2);

        raw.truncate(1);
        let back = History::<u32>::decode(&raw.encode().unwrap()).unwrap();

        assert_eq!(back.len(), 1);
        assert_eq!(back.live(), Some(&1));
    }
}
