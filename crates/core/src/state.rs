use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::{BlockNumber, ChainPoint, History, RevertBlock};

/// A logical table name. Namespaces are static; the full set is declared up
/// front so stores can create every table during bootstrap.
pub type Namespace = &'static str;

pub type EntityKey = Vec<u8>;
pub type EntityValue = Vec<u8>;

/// The set of namespaces a store has to provision.
#[derive(Debug, Clone, Default)]
pub struct StateSchema {
    namespaces: Vec<Namespace>,
}

impl StateSchema {
    pub fn new(namespaces: Vec<Namespace>) -> Self {
        Self { namespaces }
    }

    pub fn namespaces(&self) -> &[Namespace] {
        &self.namespaces
    }

    /// Map an owned namespace string (eg. out of a deserialized revert entry)
    /// back onto its static declaration.
    pub fn resolve(&self, name: &str) -> Option<Namespace> {
        self.namespaces.iter().copied().find(|ns| *ns == name)
    }
}

/// A typed record stored under a fixed namespace as a version history.
pub trait Entity: Serialize + DeserializeOwned + Clone {
    const NS: Namespace;
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("namespace {0} not found")]
    NamespaceNotFound(String),

    #[error("internal store error: {0}")]
    Internal(String),
}

impl StateError {
    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Durable entity store. One writer at a time; readers see the last committed
/// block only.
pub trait StateStore {
    type Writer<'a>: StateWriter
    where
        Self: 'a;

    fn read_cursor(&self) -> Result<Option<ChainPoint>, StateError>;

    fn read_entity(&self, ns: Namespace, key: &[u8]) -> Result<Option<EntityValue>, StateError>;

    fn read_revert_block(&self, block: BlockNumber) -> Result<Option<RevertBlock>, StateError>;

    fn start_writer(&self) -> Result<Self::Writer<'_>, StateError>;

    fn read_history<T: Entity>(&self, key: &[u8]) -> Result<History<T>, StateError> {
        match self.read_entity(T::NS, key)? {
            Some(raw) => History::decode(&raw),
            None => Ok(History::new()),
        }
    }
}

/// One block's worth of writes. Everything staged here becomes visible
/// atomically on `commit`; dropping the writer discards the block.
pub trait StateWriter: Sized {
    /// `None` puts the store back into its never-synced state.
    fn set_cursor(&mut self, point: Option<ChainPoint>) -> Result<(), StateError>;

    fn write_entity(&mut self, ns: Namespace, key: &[u8], value: &[u8]) -> Result<(), StateError>;

    fn delete_entity(&mut self, ns: Namespace, key: &[u8]) -> Result<(), StateError>;

    fn write_revert_block(&mut self, block: &RevertBlock) -> Result<(), StateError>;

    fn delete_revert_block(&mut self, block: BlockNumber) -> Result<(), StateError>;

    /// Drop revert rows at or below `below`, bounding the rollback horizon.
    fn prune_revert_log(&mut self, below: BlockNumber) -> Result<(), StateError>;

    fn commit(self) -> Result<(), StateError>;
}
