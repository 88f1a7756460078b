use tempo_core::{ActionEvent, EntityId, EntityKind, Rejection, StateStore, WorkingSet};

use crate::auth::resolve_signer;
use crate::metadata::{decode, PlaylistMeta};
use crate::model::{playlist_key, track_key, PlaylistRecord, TrackRecord};
use crate::process::{append, ActionError, BlockMeta};
use crate::IndexerContext;

fn check_description(ctx: &IndexerContext, description: Option<&String>) -> Result<(), ActionError> {
    match description {
        Some(text) if text.chars().count() > ctx.config.description_limit => {
            Err(Rejection::FieldTooLong {
                field: "description",
                limit: ctx.config.description_limit,
            }
            .into())
        }
        _ => Ok(()),
    }
}

/// Every contained track must currently exist and not be deleted, and the
/// list is capped.
fn check_tracks<S: StateStore>(
    ctx: &IndexerContext,
    ws: &mut WorkingSet<S>,
    track_ids: &[EntityId],
) -> Result<(), ActionError> {
    if track_ids.len() > ctx.config.playlist_track_limit {
        return Err(Rejection::FieldTooLong {
            field: "track_ids",
            limit: ctx.config.playlist_track_limit,
        }
        .into());
    }

    for track_id in track_ids {
        if ws.live::<TrackRecord>(&track_key(*track_id))?.is_none() {
            return Err(Rejection::NotFound {
                kind: EntityKind::Track,
                key: track_id.to_string(),
            }
            .into());
        }
    }

    Ok(())
}

pub(crate) fn create<S: StateStore>(
    ctx: &IndexerContext,
    ws: &mut WorkingSet<S>,
    blk: &BlockMeta,
    event: &ActionEvent,
) -> Result<(), ActionError> {
    let env = decode::<PlaylistMeta>(&event.metadata)?;
    let meta = env.data;
    let playlist_id = event.entity_id;

    if playlist_id < ctx.config.playlist_id_offset {
        return Err(Rejection::IdBelowOffset {
            kind: EntityKind::Playlist,
            id: playlist_id,
            offset: ctx.config.playlist_id_offset,
        }
        .into());
    }

    if !ws
        .history::<PlaylistRecord>(&playlist_key(playlist_id))?
        .is_empty()
    {
        return Err(Rejection::AlreadyExists {
            kind: EntityKind::Playlist,
            key: playlist_id.to_string(),
        }
        .into());
    }

    let owner = resolve_signer(ws, event.user_id, &event.signer)?;

    let name = meta
        .name
        .ok_or_else(|| Rejection::Schema("name is required on playlist create".into()))?;

    let track_ids = meta.track_ids.unwrap_or_default();

    check_description(ctx, meta.description.as_ref())?;
    check_tracks(ctx, ws, &track_ids)?;

    let record = PlaylistRecord {
        playlist_id,
        owner_id: owner.user_id,
        name,
        description: meta.description,
        is_album: meta.is_album.unwrap_or(false),
        track_ids,
        cover_art_cid: meta.cover_art,
        metadata_cid: env.cid,
    };

    append(ws, &playlist_key(playlist_id), blk, false, Some(record))?;

    Ok(())
}

pub(crate) fn update<S: StateStore>(
    ctx: &IndexerContext,
    ws: &mut WorkingSet<S>,
    blk: &BlockMeta,
    event: &ActionEvent,
) -> Result<(), ActionError> {
    let env = decode::<PlaylistMeta>(&event.metadata)?;
    let meta = env.data;
    let playlist_id = event.entity_id;

    let current = current_owned(ws, event, playlist_id)?;

    check_description(ctx, meta.description.as_ref())?;

    if let Some(track_ids) = &meta.track_ids {
        check_tracks(ctx, ws, track_ids)?;
    }

    let record = PlaylistRecord {
        playlist_id: current.playlist_id,
        owner_id: current.owner_id,
        name: meta.name.unwrap_or(current.name),
        description: meta.description.or(current.description),
        is_album: meta.is_album.unwrap_or(current.is_album),
        track_ids: meta.track_ids.unwrap_or(current.track_ids),
        cover_art_cid: meta.cover_art.or(current.cover_art_cid),
        metadata_cid: env.cid.or(current.metadata_cid),
    };

    append(ws, &playlist_key(playlist_id), blk, false, Some(record))?;

    Ok(())
}

/// Tombstones the playlist only; contained tracks keep living on their own.
pub(crate) fn delete<S: StateStore>(
    _ctx: &IndexerContext,
    ws: &mut WorkingSet<S>,
    blk: &BlockMeta,
    event: &ActionEvent,
) -> Result<(), ActionError> {
    let playlist_id = event.entity_id;
    let current = current_owned(ws, event, playlist_id)?;

    append(ws, &playlist_key(playlist_id), blk, true, Some(current))?;

    Ok(())
}

fn current_owned<S: StateStore>(
    ws: &mut WorkingSet<S>,
    event: &ActionEvent,
    playlist_id: EntityId,
) -> Result<PlaylistRecord, ActionError> {
    let current = ws
        .live::<PlaylistRecord>(&playlist_key(playlist_id))?
        .ok_or(Rejection::NotFound {
            kind: EntityKind::Playlist,
            key: playlist_id.to_string(),
        })?;

    let actor = resolve_signer(ws, event.user_id, &event.signer)?;

    if current.owner_id != actor.user_id {
        return Err(Rejection::Unauthorized(format!(
            "user {} does not own playlist {playlist_id}",
            actor.user_id
        ))
        .into());
    }

    Ok(current)
}
