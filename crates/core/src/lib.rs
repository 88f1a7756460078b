use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use thiserror::Error;

mod history;
mod revert;
mod state;
mod working;

pub use history::*;
pub use revert::*;
pub use state::*;
pub use working::*;

/// The height of a block in the entity manager chain
pub type BlockNumber = u64;

/// Hex-encoded block hash as emitted by the chain log
pub type BlockHash = String;

/// Hex-encoded transaction hash
pub type TxHash = String;

pub type UserId = u64;
pub type EntityId = u64;

/// A lowercased chain wallet address.
///
/// The chain log is case-insensitive about addresses; every comparison in the
/// indexer happens on the lowercased form, so we normalize at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Wallet(String);

// manual impl so deserialized addresses (feed events, config) normalize too
impl<'de> Deserialize<'de> for Wallet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Wallet::new)
    }
}

impl Wallet {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Wallet {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    User,
    Track,
    Playlist,
    AssociatedWallet,
    Follow,
    Repost,
    Save,
    Subscription,
    Grant,
    DeveloperApp,
    Comment,
    Notification,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Track => "Track",
            Self::Playlist => "Playlist",
            Self::AssociatedWallet => "AssociatedWallet",
            Self::Follow => "Follow",
            Self::Repost => "Repost",
            Self::Save => "Save",
            Self::Subscription => "Subscription",
            Self::Grant => "Grant",
            Self::DeveloperApp => "DeveloperApp",
            Self::Comment => "Comment",
            Self::Notification => "Notification",
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    Create,
    Update,
    Delete,
    Verify,
    View,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Delete => "Delete",
            Self::Verify => "Verify",
            Self::View => "View",
        }
    }
}

impl Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One decoded entity-manager action event from the chain log.
///
/// Field names mirror the on-chain event arguments (`_entityId`, `_entityType`,
/// `_userId`, `_action`, `_metadata`, `_signer`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEvent {
    pub entity_kind: EntityKind,
    pub entity_id: EntityId,
    pub user_id: UserId,
    pub action: ActionKind,

    /// Raw metadata argument; decoded per entity type by the indexer
    pub metadata: String,

    pub signer: Wallet,
}

/// A transaction receipt with its emitted action events, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub actions: Vec<ActionEvent>,
}

/// A block of entity-manager transactions, ordered by transaction index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockEnvelope {
    pub number: BlockNumber,
    pub hash: BlockHash,

    /// Unix seconds
    pub timestamp: i64,

    pub txs: Vec<TxReceipt>,
}

impl BlockEnvelope {
    pub fn point(&self) -> ChainPoint {
        ChainPoint {
            number: self.number,
            hash: self.hash.clone(),
        }
    }

    pub fn datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.timestamp, 0).single().unwrap_or_default()
    }
}

/// The store cursor: last durably applied block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainPoint {
    pub number: BlockNumber,
    pub hash: BlockHash,
}

impl PartialOrd for ChainPoint {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ChainPoint {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match self.number.cmp(&other.number) {
            std::cmp::Ordering::Equal => self.hash.cmp(&other.hash),
            x => x,
        }
    }
}

#[derive(Debug, Clone)]
pub enum PullEvent {
    /// A new block to apply on top of the current cursor
    Apply(BlockEnvelope),

    /// The chain forked; undo everything above this block number
    Rollback(BlockNumber),
}

/// Upstream chain feed, already filtered down to entity-manager transactions.
pub trait BlockSource {
    fn pull_next(&mut self) -> Result<Option<PullEvent>, SourceError>;
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("chain client error: {0}")]
    Client(String),

    #[error("block decoding error: {0}")]
    Decoding(String),
}

/// Why a single action was skipped.
///
/// None of these abort the block; the orchestrator logs the rejection and moves
/// on to the next action. Idempotent no-ops get their own variant so replays of
/// already-applied state stay silent at the log level.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("malformed metadata: {0}")]
    Schema(String),

    #[error("signer not authorized: {0}")]
    Unauthorized(String),

    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: EntityKind, key: String },

    #[error("{kind} {key} does not exist")]
    NotFound { kind: EntityKind, key: String },

    #[error("{kind} id {id} is below the chain id offset {offset}")]
    IdBelowOffset {
        kind: EntityKind,
        id: EntityId,
        offset: EntityId,
    },

    #[error("{field} exceeds the {limit} character limit")]
    FieldTooLong { field: &'static str, limit: usize },

    #[error("invalid field: {0}")]
    InvalidField(String),

    #[error("self-referential action: {0}")]
    SelfReferential(String),

    #[error("invalid wallet signature for user {user_id}")]
    InvalidSignature { user_id: UserId },

    #[error("signer does not match the configured verifier address")]
    NotVerifier,

    #[error("entity already at block {have}, action from block {got} is stale")]
    StaleBlock { have: BlockNumber, got: BlockNumber },

    #[error("unsupported action {action} for entity type {kind}")]
    UnsupportedAction { kind: EntityKind, action: ActionKind },

    #[error("no-op: {0}")]
    Noop(String),
}

impl Rejection {
    /// No-ops are expected under at-least-once redelivery; everything else is
    /// worth a warning.
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::Noop(_) | Self::StaleBlock { .. })
    }
}

/// A challenge event name understood by the reward subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeEvent {
    ProfileUpdate,
    MobileInstall,
    ReferralSignup,
    ReferredSignup,
    ConnectVerified,
    TrackUpload,
    Follow,
    Repost,
    Favorite,
}

impl ChallengeEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProfileUpdate => "profile_update",
            Self::MobileInstall => "mobile_install",
            Self::ReferralSignup => "referral_signup",
            Self::ReferredSignup => "referred_signup",
            Self::ConnectVerified => "connect_verified",
            Self::TrackUpload => "track_upload",
            Self::Follow => "follow",
            Self::Repost => "repost",
            Self::Favorite => "favorite",
        }
    }
}

impl Display for ChallengeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeDispatch {
    pub event: ChallengeEvent,
    pub block_number: BlockNumber,
    pub block_timestamp: DateTime<Utc>,
    pub user_id: UserId,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// Side effects queued during block processing and flushed only after the
/// block's write transaction commits.
#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    Challenge(ChallengeDispatch),
    BalanceRefresh { user_id: UserId },
}

#[derive(Debug, Error)]
pub enum SideEffectError {
    #[error("challenge bus error: {0}")]
    Bus(String),

    #[error("refresh cache error: {0}")]
    Cache(String),
}

/// Outbound boundary to the reward/challenge subsystem.
///
/// Consumers must be idempotent: after a crash between commit and flush the
/// same dispatch may be delivered again.
pub trait ChallengeBus {
    fn dispatch(&self, event: &ChallengeDispatch) -> Result<(), SideEffectError>;
}

/// Outbound boundary to the balance-caching subsystem (immediate refresh set).
pub trait RefreshCache {
    fn enqueue_refresh(&self, user_id: UserId) -> Result<(), SideEffectError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletChain {
    Eth,
    Sol,
}

impl Display for WalletChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Eth => write!(f, "eth"),
            Self::Sol => write!(f, "sol"),
        }
    }
}

/// Verifies a chain signature over `(user_id, wallet)` for associated-wallet
/// additions. Production wiring recovers the signer through the respective
/// chain client; tests use a static fake.
pub trait WalletVerifier {
    fn verify(&self, chain: WalletChain, user_id: UserId, wallet: &str, signature: &str) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wallet_normalizes_case() {
        let a = Wallet::new("0xAbCdEf");
        let b = Wallet::new("0xabcdef");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "0xabcdef");
    }

    #[test]
    fn chainpoint_orders_by_number_first() {
        let a = ChainPoint {
            number: 10,
            hash: "0xff".into(),
        };
        let b = ChainPoint {
            number: 11,
            hash: "0x00".into(),
        };
        assert!(a < b);
    }

    #[test]
    fn noop_rejections_are_flagged() {
        assert!(Rejection::Noop("already deleted".into()).is_noop());
        assert!(Rejection::StaleBlock { have: 5, got: 4 }.is_noop());
        assert!(!Rejection::NotVerifier.is_noop());
    }
}
