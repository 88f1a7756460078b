use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempo_core::{Entity, EntityId, EntityKey, Namespace, StateSchema, UserId, Wallet, WalletChain};

pub const USERS_NS: Namespace = "users";
pub const USER_EVENTS_NS: Namespace = "user_events";
pub const HANDLES_NS: Namespace = "handles";
pub const WALLETS_NS: Namespace = "wallets";
pub const TRACKS_NS: Namespace = "tracks";
pub const PLAYLISTS_NS: Namespace = "playlists";
pub const ASSOC_WALLETS_NS: Namespace = "assoc_wallets";
pub const FOLLOWS_NS: Namespace = "follows";
pub const REPOSTS_NS: Namespace = "reposts";
pub const SAVES_NS: Namespace = "saves";
pub const SUBSCRIPTIONS_NS: Namespace = "subscriptions";
pub const GRANTS_NS: Namespace = "grants";
pub const APPS_NS: Namespace = "apps";
pub const COMMENTS_NS: Namespace = "comments";
pub const NOTIF_SEEN_NS: Namespace = "notif_seen";

/// Every entity namespace the store has to provision.
pub fn build_schema() -> StateSchema {
    StateSchema::new(vec![
        USERS_NS,
        USER_EVENTS_NS,
        HANDLES_NS,
        WALLETS_NS,
        TRACKS_NS,
        PLAYLISTS_NS,
        ASSOC_WALLETS_NS,
        FOLLOWS_NS,
        REPOSTS_NS,
        SAVES_NS,
        SUBSCRIPTIONS_NS,
        GRANTS_NS,
        APPS_NS,
        COMMENTS_NS,
        NOTIF_SEEN_NS,
    ])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: UserId,
    pub wallet: Wallet,
    pub handle: String,
    pub name: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub profile_picture_cid: Option<String>,
    pub cover_photo_cid: Option<String>,
    pub artist_pick_track_id: Option<EntityId>,
    pub is_verified: bool,
    pub metadata_cid: Option<String>,
}

impl Entity for UserRecord {
    const NS: Namespace = USERS_NS;
}

/// One-per-user flags that outlive profile edits: who referred the account in
/// and whether it ever signed up from mobile. Kept out of `UserRecord` so a
/// profile update never rewrites them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEventRecord {
    pub user_id: UserId,
    pub referrer: Option<UserId>,
    pub is_mobile_user: bool,
}

impl Entity for UserEventRecord {
    const NS: Namespace = USER_EVENTS_NS;
}

/// Uniqueness claim on a lowercased handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandleClaim {
    pub user_id: UserId,
}

impl Entity for HandleClaim {
    const NS: Namespace = HANDLES_NS;
}

/// Uniqueness claim on a signup wallet. Also blocks developer apps from
/// registering at an address a user already owns, and vice versa.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletClaim {
    pub user_id: UserId,
}

impl Entity for WalletClaim {
    const NS: Namespace = WALLETS_NS;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub track_id: EntityId,
    pub owner_id: UserId,
    pub title: String,
    pub genre: Option<String>,
    pub mood: Option<String>,
    pub description: Option<String>,
    pub cover_art_cid: Option<String>,
    pub duration: Option<u64>,
    pub stem_of: Option<EntityId>,
    pub remix_of: Vec<EntityId>,
    pub metadata_cid: Option<String>,
}

impl Entity for TrackRecord {
    const NS: Namespace = TRACKS_NS;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistRecord {
    pub playlist_id: EntityId,
    pub owner_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub is_album: bool,
    pub track_ids: Vec<EntityId>,
    pub cover_art_cid: Option<String>,
    pub metadata_cid: Option<String>,
}

impl Entity for PlaylistRecord {
    const NS: Namespace = PLAYLISTS_NS;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociatedWalletRecord {
    pub user_id: UserId,
    pub chain: WalletChain,
    pub wallet: String,
}

impl Entity for AssociatedWalletRecord {
    const NS: Namespace = ASSOC_WALLETS_NS;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowRecord {
    pub follower_id: UserId,
    pub followee_id: UserId,
}

impl Entity for FollowRecord {
    const NS: Namespace = FOLLOWS_NS;
}

/// What a repost, save or comment points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Track,
    Playlist,
}

impl TargetKind {
    fn tag(&self) -> u8 {
        match self {
            Self::Track => 0,
            Self::Playlist => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepostRecord {
    pub user_id: UserId,
    pub target_kind: TargetKind,
    pub target_id: EntityId,
}

impl Entity for RepostRecord {
    const NS: Namespace = REPOSTS_NS;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveRecord {
    pub user_id: UserId,
    pub target_kind: TargetKind,
    pub target_id: EntityId,
}

impl Entity for SaveRecord {
    const NS: Namespace = SAVES_NS;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub subscriber_id: UserId,
    pub user_id: UserId,
}

impl Entity for SubscriptionRecord {
    const NS: Namespace = SUBSCRIPTIONS_NS;
}

/// Delegation from a user to a developer app's wallet. Revoking appends a
/// tombstone revision; a revoked grant stops authorizing immediately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantRecord {
    pub user_id: UserId,
    pub grantee_address: Wallet,
    pub is_approved: bool,
}

impl Entity for GrantRecord {
    const NS: Namespace = GRANTS_NS;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeveloperAppRecord {
    pub address: Wallet,
    pub owner_user_id: UserId,
    pub name: String,
    pub description: Option<String>,
}

impl Entity for DeveloperAppRecord {
    const NS: Namespace = APPS_NS;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub comment_id: EntityId,
    pub user_id: UserId,
    pub target_kind: TargetKind,
    pub target_id: EntityId,
    pub body: String,
    pub parent_comment_id: Option<EntityId>,
}

impl Entity for CommentRecord {
    const NS: Namespace = COMMENTS_NS;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationSeenRecord {
    pub user_id: UserId,
    pub last_seen_at: DateTime<Utc>,
}

impl Entity for NotificationSeenRecord {
    const NS: Namespace = NOTIF_SEEN_NS;
}

// Key encodings. Numeric ids are big-endian u64 so range scans stay ordered;
// composite keys put the fixed-width parts first and the variable-length
// wallet or handle last.

pub fn user_key(id: UserId) -> EntityKey {
    id.to_be_bytes().to_vec()
}

pub fn handle_key(handle: &str) -> EntityKey {
    handle.to_lowercase().into_bytes()
}

pub fn wallet_key(wallet: &Wallet) -> EntityKey {
    wallet.as_str().as_bytes().to_vec()
}

pub fn track_key(id: EntityId) -> EntityKey {
    id.to_be_bytes().to_vec()
}

pub fn playlist_key(id: EntityId) -> EntityKey {
    id.to_be_bytes().to_vec()
}

pub fn assoc_wallet_key(user_id: UserId, chain: WalletChain, wallet: &str) -> EntityKey {
    let mut key = user_id.to_be_bytes().to_vec();
    key.push(match chain {
        WalletChain::Eth => 0,
        WalletChain::Sol => 1,
    });
    key.extend_from_slice(wallet.to_lowercase().as_bytes());
    key
}

pub fn follow_key(follower_id: UserId, followee_id: UserId) -> EntityKey {
    let mut key = follower_id.to_be_bytes().to_vec();
    key.extend_from_slice(&followee_id.to_be_bytes());
    key
}

pub fn repost_key(user_id: UserId, kind: TargetKind, target_id: EntityId) -> EntityKey {
    let mut key = user_id.to_be_bytes().to_vec();
    key.push(kind.tag());
    key.extend_from_slice(&target_id.to_be_bytes());
    key
}

pub fn save_key(user_id: UserId, kind: TargetKind, target_id: EntityId) -> EntityKey {
    repost_key(user_id, kind, target_id)
}

pub fn subscription_key(subscriber_id: UserId, user_id: UserId) -> EntityKey {
    follow_key(subscriber_id, user_id)
}

pub fn grant_key(user_id: UserId, grantee: &Wallet) -> EntityKey {
    let mut key = user_id.to_be_bytes().to_vec();
    key.extend_from_slice(grantee.as_str().as_bytes());
    key
}

pub fn app_key(address: &Wallet) -> EntityKey {
    address.as_str().as_bytes().to_vec()
}

pub fn comment_key(id: EntityId) -> EntityKey {
    id.to_be_bytes().to_vec()
}

pub fn notif_seen_key(user_id: UserId) -> EntityKey {
    user_id.to_be_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_keys_sort_by_id() {
        assert!(user_key(2) < user_key(10));
        assert!(track_key(999) < track_key(1_000));
    }

    #[test]
    fn handle_keys_are_case_insensitive() {
        assert_eq!(handle_key("DJRob"), handle_key("djrob"));
    }

    #[test]
    fn assoc_wallet_keys_separate_chains() {
        let eth = assoc_wallet_key(1, WalletChain::Eth, "0xAB");
        let sol = assoc_wallet_key(1, WalletChain::Sol, "0xAB");
        assert_ne!(eth, sol);
        assert_eq!(eth, assoc_wallet_key(1, WalletChain::Eth, "0xab"));
    }

    #[test]
    fn schema_declares_every_namespace() {
        let schema = build_schema();
        assert_eq!(schema.namespaces().len(), 15);
        assert!(schema.resolve("grants").is_some());
        assert!(schema.resolve("nope").is_none());
    }
}
