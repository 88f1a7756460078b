use serde::de::DeserializeOwned;
use serde::Deserialize;
use tempo_core::{EntityId, Rejection, UserId, WalletChain};

use crate::model::TargetKind;

/// The `_metadata` event argument: `{"cid": ..., "data": {...}}`. Unknown keys
/// anywhere in the payload reject the action; the allow-list per entity type
/// is exactly the fields its struct declares.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope<T> {
    #[serde(default)]
    pub cid: Option<String>,

    pub data: T,
}

pub(crate) fn decode<T: DeserializeOwned>(raw: &str) -> Result<Envelope<T>, Rejection> {
    serde_json::from_str(raw).map_err(|err| Rejection::Schema(err.to_string()))
}

/// User profile payload, shared by Create and Update. Everything is optional
/// at the schema level; Create-only requirements (handle) are enforced by the
/// handler.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct UserMeta {
    pub handle: Option<String>,
    pub name: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub profile_picture: Option<String>,
    pub cover_photo: Option<String>,
    pub artist_pick_track_id: Option<EntityId>,
    pub events: Option<UserEventsMeta>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct UserEventsMeta {
    pub referrer: Option<UserId>,
    pub is_mobile_user: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TrackMeta {
    pub title: Option<String>,
    pub genre: Option<String>,
    pub mood: Option<String>,
    pub description: Option<String>,
    pub cover_art: Option<String>,
    pub duration: Option<u64>,
    pub stem_of: Option<EntityId>,
    pub remix_of: Vec<EntityId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PlaylistMeta {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_album: Option<bool>,
    pub track_ids: Option<Vec<EntityId>>,
    pub cover_art: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssociatedWalletMeta {
    pub wallet: String,
    pub chain: WalletChain,
    pub signature: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssociatedWalletDeleteMeta {
    pub wallet: String,
    pub chain: WalletChain,
}

/// Repost and Save events carry the target id in `_entityId`; the metadata
/// only says whether it is a track or a playlist.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SocialTargetMeta {
    pub kind: TargetKind,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrantMeta {
    pub grantee_address: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppCreateMeta {
    pub address: String,
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppDeleteMeta {
    pub address: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommentCreateMeta {
    pub body: String,
    pub target_kind: TargetKind,
    pub target_id: EntityId,

    #[serde(default)]
    pub parent_comment_id: Option<EntityId>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommentUpdateMeta {
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_partial_user_payload() {
        let raw = r#"{"cid": "Qm123", "data": {"handle": "djrob", "bio": "hi"}}"#;
        let env: Envelope<UserMeta> = decode(raw).unwrap();

        assert_eq!(env.cid.as_deref(), Some("Qm123"));
        assert_eq!(env.data.handle.as_deref(), Some("djrob"));
        assert!(env.data.name.is_none());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let raw = r#"{"data": {"handle": "djrob", "admin": true}}"#;
        let res = decode::<UserMeta>(raw);

        assert!(matches!(res, Err(Rejection::Schema(_))));
    }

    #[test]
    fn malformed_json_is_a_schema_rejection() {
        let res = decode::<TrackMeta>("{not json");
        assert!(matches!(res, Err(Rejection::Schema(_))));
    }

    #[test]
    fn wallet_meta_requires_signature() {
        let raw = r#"{"data": {"wallet": "0xAB", "chain": "eth"}}"#;
        assert!(decode::<AssociatedWalletMeta>(raw).is_err());

        let raw = r#"{"data": {"wallet": "0xAB", "chain": "sol", "signature": "sig"}}"#;
        let env = decode::<AssociatedWalletMeta>(raw).unwrap();
        assert_eq!(env.data.chain, WalletChain::Sol);
    }
}
