use serde_json::json;
use tempo_core::{
    ActionEvent, ChallengeEvent, EntityId, EntityKind, Rejection, SideEffect, StateStore, UserId,
    WorkingSet,
};

use crate::auth::resolve_signer;
use crate::metadata::{decode, UserEventsMeta, UserMeta};
use crate::model::{
    handle_key, track_key, user_key, wallet_key, DeveloperAppRecord, HandleClaim, TrackRecord,
    UserEventRecord, UserRecord, WalletClaim,
};
use crate::process::{append, queue_challenge, ActionError, BlockMeta};
use crate::IndexerContext;

const HANDLE_LIMIT: usize = 30;

fn valid_handle(handle: &str) -> bool {
    !handle.is_empty()
        && handle.len() <= HANDLE_LIMIT
        && handle
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn check_bio(ctx: &IndexerContext, bio: Option<&String>) -> Result<(), ActionError> {
    match bio {
        Some(bio) if bio.chars().count() > ctx.config.user_bio_limit => {
            Err(Rejection::FieldTooLong {
                field: "bio",
                limit: ctx.config.user_bio_limit,
            }
            .into())
        }
        _ => Ok(()),
    }
}

/// An artist pick must point at a live track the user owns.
fn check_artist_pick<S: StateStore>(
    ws: &mut WorkingSet<S>,
    user_id: UserId,
    track_id: EntityId,
) -> Result<(), ActionError> {
    match ws.live::<TrackRecord>(&track_key(track_id))? {
        Some(track) if track.owner_id == user_id => Ok(()),
        Some(_) => Err(Rejection::InvalidField(format!(
            "artist pick track {track_id} is not owned by user {user_id}"
        ))
        .into()),
        None => Err(Rejection::InvalidField(format!(
            "artist pick track {track_id} does not exist"
        ))
        .into()),
    }
}

pub(crate) fn create<S: StateStore>(
    ctx: &IndexerContext,
    ws: &mut WorkingSet<S>,
    blk: &BlockMeta,
    effects: &mut Vec<SideEffect>,
    event: &ActionEvent,
) -> Result<(), ActionError> {
    let env = decode::<UserMeta>(&event.metadata)?;
    let meta = env.data;
    let user_id = event.user_id;

    if user_id < ctx.config.user_id_offset {
        return Err(Rejection::IdBelowOffset {
            kind: EntityKind::User,
            id: user_id,
            offset: ctx.config.user_id_offset,
        }
        .into());
    }

    if !ws.history::<UserRecord>(&user_key(user_id))?.is_empty() {
        return Err(Rejection::AlreadyExists {
            kind: EntityKind::User,
            key: user_id.to_string(),
        }
        .into());
    }

    let handle = meta
        .handle
        .ok_or_else(|| Rejection::Schema("handle is required on user create".into()))?;

    if !valid_handle(&handle) {
        return Err(Rejection::InvalidField(format!("invalid handle {handle:?}")).into());
    }

    if ws.live::<HandleClaim>(&handle_key(&handle))?.is_some() {
        return Err(Rejection::AlreadyExists {
            kind: EntityKind::User,
            key: handle.to_lowercase(),
        }
        .into());
    }

    if ws.live::<WalletClaim>(&wallet_key(&event.signer))?.is_some() {
        return Err(Rejection::AlreadyExists {
            kind: EntityKind::User,
            key: event.signer.to_string(),
        }
        .into());
    }

    // a signup wallet cannot double as an app's on-chain address
    if ws
        .live::<DeveloperAppRecord>(&crate::model::app_key(&event.signer))?
        .is_some()
    {
        return Err(Rejection::InvalidField(format!(
            "wallet {} is registered to a developer app",
            event.signer
        ))
        .into());
    }

    check_bio(ctx, meta.bio.as_ref())?;

    if let Some(track_id) = meta.artist_pick_track_id {
        check_artist_pick(ws, user_id, track_id)?;
    }

    let record = UserRecord {
        user_id,
        wallet: event.signer.clone(),
        handle: handle.clone(),
        name: meta.name,
        bio: meta.bio,
        location: meta.location,
        profile_picture_cid: meta.profile_picture,
        cover_photo_cid: meta.cover_photo,
        artist_pick_track_id: meta.artist_pick_track_id,
        is_verified: false,
        metadata_cid: env.cid,
    };

    append(ws, &user_key(user_id), blk, false, Some(record))?;
    append(
        ws,
        &handle_key(&handle),
        blk,
        false,
        Some(HandleClaim { user_id }),
    )?;
    append(
        ws,
        &wallet_key(&event.signer),
        blk,
        false,
        Some(WalletClaim { user_id }),
    )?;

    if let Some(events) = meta.events {
        apply_user_events(ws, blk, effects, user_id, &events)?;
    }

    Ok(())
}

pub(crate) fn update<S: StateStore>(
    ctx: &IndexerContext,
    ws: &mut WorkingSet<S>,
    blk: &BlockMeta,
    effects: &mut Vec<SideEffect>,
    event: &ActionEvent,
) -> Result<(), ActionError> {
    let env = decode::<UserMeta>(&event.metadata)?;
    let meta = env.data;
    let user_id = event.user_id;

    let current = resolve_signer(ws, user_id, &event.signer)?;

    if let Some(handle) = &meta.handle {
        if handle.to_lowercase() != current.handle.to_lowercase() {
            return Err(Rejection::InvalidField("handle is immutable".into()).into());
        }
    }

    check_bio(ctx, meta.bio.as_ref())?;

    if let Some(track_id) = meta.artist_pick_track_id {
        check_artist_pick(ws, user_id, track_id)?;
    }

    let first_bio = current.bio.is_none() && meta.bio.is_some();

    // partial update: absent fields carry forward
    let record = UserRecord {
        user_id: current.user_id,
        wallet: current.wallet,
        handle: current.handle,
        name: meta.name.or(current.name),
        bio: meta.bio.or(current.bio),
        location: meta.location.or(current.location),
        profile_picture_cid: meta.profile_picture.or(current.profile_picture_cid),
        cover_photo_cid: meta.cover_photo.or(current.cover_photo_cid),
        artist_pick_track_id: meta.artist_pick_track_id.or(current.artist_pick_track_id),
        is_verified: current.is_verified,
        metadata_cid: env.cid.or(current.metadata_cid),
    };

    append(ws, &user_key(user_id), blk, false, Some(record))?;

    if first_bio {
        queue_challenge(effects, blk, ChallengeEvent::ProfileUpdate, user_id, None);
    }

    if let Some(events) = meta.events {
        apply_user_events(ws, blk, effects, user_id, &events)?;
    }

    Ok(())
}

pub(crate) fn verify<S: StateStore>(
    ctx: &IndexerContext,
    ws: &mut WorkingSet<S>,
    blk: &BlockMeta,
    effects: &mut Vec<SideEffect>,
    event: &ActionEvent,
) -> Result<(), ActionError> {
    if event.signer != ctx.config.verifier_wallet {
        return Err(Rejection::NotVerifier.into());
    }

    let user_id = event.user_id;

    let current = ws
        .live::<UserRecord>(&user_key(user_id))?
        .ok_or(Rejection::NotFound {
            kind: EntityKind::User,
            key: user_id.to_string(),
        })?;

    if current.is_verified {
        return Err(Rejection::Noop(format!("user {user_id} is already verified")).into());
    }

    let record = UserRecord {
        is_verified: true,
        ..current
    };

    append(ws, &user_key(user_id), blk, false, Some(record))?;
    queue_challenge(effects, blk, ChallengeEvent::ConnectVerified, user_id, None);

    Ok(())
}

/// Fold referral and mobile-install flags into the user's event record,
/// dispatching each associated challenge only on the first transition.
fn apply_user_events<S: StateStore>(
    ws: &mut WorkingSet<S>,
    blk: &BlockMeta,
    effects: &mut Vec<SideEffect>,
    user_id: UserId,
    meta: &UserEventsMeta,
) -> Result<(), ActionError> {
    let prior = ws.live::<UserEventRecord>(&user_key(user_id))?;

    let mut record = prior.clone().unwrap_or(UserEventRecord {
        user_id,
        referrer: None,
        is_mobile_user: false,
    });

    let mut changed = false;

    if let Some(referrer) = meta.referrer {
        // self-referral is silently dropped, never dispatched
        if referrer != user_id && record.referrer.is_none() {
            let exists = ws.live::<UserRecord>(&user_key(referrer))?.is_some();

            if exists {
                record.referrer = Some(referrer);
                changed = true;

                queue_challenge(
                    effects,
                    blk,
                    ChallengeEvent::ReferralSignup,
                    referrer,
                    Some(json!({ "referred_user_id": user_id })),
                );
                queue_challenge(effects, blk, ChallengeEvent::ReferredSignup, user_id, None);
            }
        }
    }

    if meta.is_mobile_user == Some(true) && !record.is_mobile_user {
        record.is_mobile_user = true;
        changed = true;

        queue_challenge(effects, blk, ChallengeEvent::MobileInstall, user_id, None);
    }

    if changed {
        append(ws, &user_key(user_id), blk, false, Some(record))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_bounded_and_restricted() {
        assert!(valid_handle("dj_rob.99"));
        assert!(valid_handle("A"));
        assert!(!valid_handle(""));
        assert!(!valid_handle("has space"));
        assert!(!valid_handle("emoji🎵"));
        assert!(!valid_handle(&"x".repeat(31)));
    }
}
