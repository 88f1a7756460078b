use tempo_core::{
    ActionEvent, ChallengeEvent, EntityId, EntityKind, Rejection, SideEffect, StateStore,
    WorkingSet,
};

use crate::auth::resolve_signer;
use crate::metadata::{decode, SocialTargetMeta};
use crate::model::{
    follow_key, playlist_key, repost_key, save_key, subscription_key, track_key, user_key,
    FollowRecord, PlaylistRecord, RepostRecord, SaveRecord, SubscriptionRecord, TargetKind,
    TrackRecord, UserRecord,
};
use crate::process::{append, queue_challenge, ActionError, BlockMeta};
use crate::IndexerContext;

fn check_target_user<S: StateStore>(
    ws: &mut WorkingSet<S>,
    target: EntityId,
) -> Result<(), ActionError> {
    if ws.live::<UserRecord>(&user_key(target))?.is_none() {
        return Err(Rejection::NotFound {
            kind: EntityKind::User,
            key: target.to_string(),
        }
        .into());
    }

    Ok(())
}

fn check_target_content<S: StateStore>(
    ws: &mut WorkingSet<S>,
    kind: TargetKind,
    target: EntityId,
) -> Result<(), ActionError> {
    let live = match kind {
        TargetKind::Track => ws.live::<TrackRecord>(&track_key(target))?.is_some(),
        TargetKind::Playlist => ws.live::<PlaylistRecord>(&playlist_key(target))?.is_some(),
    };

    if !live {
        let kind = match kind {
            TargetKind::Track => EntityKind::Track,
            TargetKind::Playlist => EntityKind::Playlist,
        };

        return Err(Rejection::NotFound {
            kind,
            key: target.to_string(),
        }
        .into());
    }

    Ok(())
}

pub(crate) fn follow<S: StateStore>(
    _ctx: &IndexerContext,
    ws: &mut WorkingSet<S>,
    blk: &BlockMeta,
    effects: &mut Vec<SideEffect>,
    event: &ActionEvent,
) -> Result<(), ActionError> {
    let actor = resolve_signer(ws, event.user_id, &event.signer)?;
    let followee = event.entity_id;

    if followee == actor.user_id {
        return Err(Rejection::SelfReferential("user cannot follow themselves".into()).into());
    }

    check_target_user(ws, followee)?;

    let key = follow_key(actor.user_id, followee);

    if ws.live::<FollowRecord>(&key)?.is_some() {
        return Err(Rejection::Noop(format!(
            "user {} already follows {followee}",
            actor.user_id
        ))
        .into());
    }

    append(
        ws,
        &key,
        blk,
        false,
        Some(FollowRecord {
            follower_id: actor.user_id,
            followee_id: followee,
        }),
    )?;

    queue_challenge(effects, blk, ChallengeEvent::Follow, actor.user_id, None);

    Ok(())
}

pub(crate) fn unfollow<S: StateStore>(
    _ctx: &IndexerContext,
    ws: &mut WorkingSet<S>,
    blk: &BlockMeta,
    event: &ActionEvent,
) -> Result<(), ActionError> {
    let actor = resolve_signer(ws, event.user_id, &event.signer)?;
    let followee = event.entity_id;
    let key = follow_key(actor.user_id, followee);

    let current = ws.live::<FollowRecord>(&key)?.ok_or_else(|| {
        Rejection::Noop(format!("user {} does not follow {followee}", actor.user_id))
    })?;

    append(ws, &key, blk, true, Some(current))?;

    Ok(())
}

pub(crate) fn subscribe<S: StateStore>(
    _ctx: &IndexerContext,
    ws: &mut WorkingSet<S>,
    blk: &BlockMeta,
    event: &ActionEvent,
) -> Result<(), ActionError> {
    let actor = resolve_signer(ws, event.user_id, &event.signer)?;
    let target = event.entity_id;

    if target == actor.user_id {
        return Err(
            Rejection::SelfReferential("user cannot subscribe to themselves".into()).into(),
        );
    }

    check_target_user(ws, target)?;

    let key = subscription_key(actor.user_id, target);

    if ws.live::<SubscriptionRecord>(&key)?.is_some() {
        return Err(Rejection::Noop(format!(
            "user {} is already subscribed to {target}",
            actor.user_id
        ))
        .into());
    }

    append(
        ws,
        &key,
        blk,
        false,
        Some(SubscriptionRecord {
            subscriber_id: actor.user_id,
            user_id: target,
        }),
    )?;

    Ok(())
}

pub(crate) fn unsubscribe<S: StateStore>(
    _ctx: &IndexerContext,
    ws: &mut WorkingSet<S>,
    blk: &BlockMeta,
    event: &ActionEvent,
) -> Result<(), ActionError> {
    let actor = resolve_signer(ws, event.user_id, &event.signer)?;
    let target = event.entity_id;
    let key = subscription_key(actor.user_id, target);

    let current = ws.live::<SubscriptionRecord>(&key)?.ok_or_else(|| {
        Rejection::Noop(format!(
            "user {} is not subscribed to {target}",
            actor.user_id
        ))
    })?;

    append(ws, &key, blk, true, Some(current))?;

    Ok(())
}

pub(crate) fn repost<S: StateStore>(
    _ctx: &IndexerContext,
    ws: &mut WorkingSet<S>,
    blk: &BlockMeta,
    effects: &mut Vec<SideEffect>,
    event: &ActionEvent,
) -> Result<(), ActionError> {
    let env = decode::<SocialTargetMeta>(&event.metadata)?;
    let kind = env.data.kind;

    let actor = resolve_signer(ws, event.user_id, &event.signer)?;
    let target = event.entity_id;

    check_target_content(ws, kind, target)?;

    let key = repost_key(actor.user_id, kind, target);

    if ws.live::<RepostRecord>(&key)?.is_some() {
        return Err(Rejection::Noop(format!(
            "user {} already reposted {kind:?} {target}",
            actor.user_id
        ))
        .into());
    }

    append(
        ws,
        &key,
        blk,
        false,
        Some(RepostRecord {
            user_id: actor.user_id,
            target_kind: kind,
            target_id: target,
        }),
    )?;

    queue_challenge(effects, blk, ChallengeEvent::Repost, actor.user_id, None);

    Ok(())
}

pub(crate) fn unrepost<S: StateStore>(
    _ctx: &IndexerContext,
    ws: &mut WorkingSet<S>,
    blk: &BlockMeta,
    event: &ActionEvent,
) -> Result<(), ActionError> {
    let env = decode::<SocialTargetMeta>(&event.metadata)?;
    let kind = env.data.kind;

    let actor = resolve_signer(ws, event.user_id, &event.signer)?;
    let target = event.entity_id;
    let key = repost_key(actor.user_id, kind, target);

    let current = ws.live::<RepostRecord>(&key)?.ok_or_else(|| {
        Rejection::Noop(format!(
            "user {} has not reposted {kind:?} {target}",
            actor.user_id
        ))
    })?;

    append(ws, &key, blk, true, Some(current))?;

    Ok(())
}

pub(crate) fn save<S: StateStore>(
    _ctx: &IndexerContext,
    ws: &mut WorkingSet<S>,
    blk: &BlockMeta,
    effects: &mut Vec<SideEffect>,
    event: &ActionEvent,
) -> Result<(), ActionError> {
    let env = decode::<SocialTargetMeta>(&event.metadata)?;
    let kind = env.data.kind;

    let actor = resolve_signer(ws, event.user_id, &event.signer)?;
    let target = event.entity_id;

    check_target_content(ws, kind, target)?;

    let key = save_key(actor.user_id, kind, target);

    if ws.live::<SaveRecord>(&key)?.is_some() {
        return Err(Rejection::Noop(format!(
            "user {} already saved {kind:?} {target}",
            actor.user_id
        ))
        .into());
    }

    append(
        ws,
        &key,
        blk,
        false,
        Some(SaveRecord {
            user_id: actor.user_id,
            target_kind: kind,
            target_id: target,
        }),
    )?;

    queue_challenge(effects, blk, ChallengeEvent::Favorite, actor.user_id, None);

    Ok(())
}

pub(crate) fn unsave<S: StateStore>(
    _ctx: &IndexerContext,
    ws: &mut WorkingSet<S>,
    blk: &BlockMeta,
    event: &ActionEvent,
) -> Result<(), ActionError> {
    let env = decode::<SocialTargetMeta>(&event.metadata)?;
    let kind = env.data.kind;

    let actor = resolve_signer(ws, event.user_id, &event.signer)?;
    let target = event.entity_id;
    let key = save_key(actor.user_id, kind, target);

    let current = ws.live::<SaveRecord>(&key)?.ok_or_else(|| {
        Rejection::Noop(format!(
            "user {} has not saved {kind:?} {target}",
            actor.user_id
        ))
    })?;

    append(ws, &key, blk, true, Some(current))?;

    Ok(())
}
