use tempo_core::{ActionEvent, EntityId, EntityKind, Rejection, StateStore, WorkingSet};

use crate::auth::resolve_signer;
use crate::metadata::{decode, CommentCreateMeta, CommentUpdateMeta};
use crate::model::{
    comment_key, playlist_key, track_key, CommentRecord, PlaylistRecord, TargetKind, TrackRecord,
};
use crate::process::{append, ActionError, BlockMeta};
use crate::IndexerContext;

fn check_target<S: StateStore>(
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

pub(crate) fn create<S: StateStore>(
    _ctx: &IndexerContext,
    ws: &mut WorkingSet<S>,
    blk: &BlockMeta,
    event: &ActionEvent,
) -> Result<(), ActionError> {
    let env = decode::<CommentCreateMeta>(&event.metadata)?;
    let meta = env.data;
    let comment_id = event.entity_id;

    if !ws.history::<CommentRecord>(&comment_key(comment_id))?.is_empty() {
        return Err(Rejection::AlreadyExists {
            kind: EntityKind::Comment,
            key: comment_id.to_string(),
        }
        .into());
    }

    let actor = resolve_signer(ws, event.user_id, &event.signer)?;

    check_target(ws, meta.target_kind, meta.target_id)?;

    if let Some(parent) = meta.parent_comment_id {
        if ws.live::<CommentRecord>(&comment_key(parent))?.is_none() {
            return Err(Rejection::NotFound {
                kind: EntityKind::Comment,
                key: parent.to_string(),
            }
            .into());
        }
    }

    append(
        ws,
        &comment_key(comment_id),
        blk,
        false,
        Some(CommentRecord {
            comment_id,
            user_id: actor.user_id,
            target_kind: meta.target_kind,
            target_id: meta.target_id,
            body: meta.body,
            parent_comment_id: meta.parent_comment_id,
        }),
    )?;

    Ok(())
}

pub(crate) fn update<S: StateStore>(
    _ctx: &IndexerContext,
    ws: &mut WorkingSet<S>,
    blk: &BlockMeta,
    event: &ActionEvent,
) -> Result<(), ActionError> {
    let env = decode::<CommentUpdateMeta>(&event.metadata)?;
    let comment_id = event.entity_id;

    let current = author_owned(ws, event, comment_id)?;

    append(
        ws,
        &comment_key(comment_id),
        blk,
        false,
        Some(CommentRecord {
            body: env.data.body,
            ..current
        }),
    )?;

    Ok(())
}

/// Tombstones the comment; replies survive and are filtered at read time.
pub(crate) fn delete<S: StateStore>(
    _ctx: &IndexerContext,
    ws: &mut WorkingSet<S>,
    blk: &BlockMeta,
    event: &ActionEvent,
) -> Result<(), ActionError> {
    let comment_id = event.entity_id;
    let current = author_owned(ws, event, comment_id)?;

    append(ws, &comment_key(comment_id), blk, true, Some(current))?;

    Ok(())
}

fn author_owned<S: StateStore>(
    ws: &mut WorkingSet<S>,
    event: &ActionEvent,
    comment_id: EntityId,
) -> Result<CommentRecord, ActionError> {
    let current = ws
        .live::<CommentRecord>(&comment_key(comment_id))?
        .ok_or(Rejection::NotFound {
            kind: EntityKind::Comment,
            key: comment_id.to_string(),
        })?;

    let actor = resolve_signer(ws, event.user_id, &event.signer)?;

    if current.user_id != actor.user_id {
        return Err(Rejection::Unauthorized(format!(
            "user {} did not author comment {comment_id}",
            actor.user_id
        ))
        .into());
    }

    Ok(current)
}
