use tempo_core::{
    ActionEvent, ChallengeEvent, EntityId, EntityKind, Rejection, SideEffect, StateStore,
    WorkingSet,
};

use crate::auth::resolve_signer;
use crate::metadata::{decode, TrackMeta};
use crate::model::{track_key, TrackRecord};
use crate::process::{append, queue_challenge, ActionError, BlockMeta};
use crate::IndexerContext;

const GENRES: &[&str] = &[
    "Acoustic",
    "Alternative",
    "Ambient",
    "Blues",
    "Classical",
    "Country",
    "Dancehall",
    "Deep House",
    "Disco",
    "Drum & Bass",
    "Dubstep",
    "Electronic",
    "Experimental",
    "Folk",
    "Funk",
    "Hip-Hop/Rap",
    "House",
    "Jazz",
    "Latin",
    "Lo-Fi",
    "Metal",
    "Podcast",
    "Pop",
    "Punk",
    "R&B/Soul",
    "Reggae",
    "Rock",
    "Soundtrack",
    "Techno",
    "Trance",
    "Trap",
    "World",
];

fn check_genre(genre: Option<&String>) -> Result<(), ActionError> {
    match genre {
        Some(genre) if !GENRES.contains(&genre.as_str()) => {
            Err(Rejection::InvalidField(format!("unknown genre {genre:?}")).into())
        }
        _ => Ok(()),
    }
}

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

/// Stem parents and remix parents must currently exist and not be deleted.
fn check_parents<S: StateStore>(
    ws: &mut WorkingSet<S>,
    stem_of: Option<EntityId>,
    remix_of: &[EntityId],
) -> Result<(), ActionError> {
    for parent in stem_of.iter().chain(remix_of) {
        if ws.live::<TrackRecord>(&track_key(*parent))?.is_none() {
            return Err(Rejection::NotFound {
                kind: EntityKind::Track,
                key: parent.to_string(),
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
    effects: &mut Vec<SideEffect>,
    event: &ActionEvent,
) -> Result<(), ActionError> {
    let env = decode::<TrackMeta>(&event.metadata)?;
    let meta = env.data;
    let track_id = event.entity_id;

    if track_id < ctx.config.track_id_offset {
        return Err(Rejection::IdBelowOffset {
            kind: EntityKind::Track,
            id: track_id,
            offset: ctx.config.track_id_offset,
        }
        .into());
    }

    if !ws.history::<TrackRecord>(&track_key(track_id))?.is_empty() {
        return Err(Rejection::AlreadyExists {
            kind: EntityKind::Track,
            key: track_id.to_string(),
        }
        .into());
    }

    let owner = resolve_signer(ws, event.user_id, &event.signer)?;

    let title = meta
        .title
        .ok_or_else(|| Rejection::Schema("title is required on track create".into()))?;

    check_genre(meta.genre.as_ref())?;
    check_description(ctx, meta.description.as_ref())?;
    check_parents(ws, meta.stem_of, &meta.remix_of)?;

    let record = TrackRecord {
        track_id,
        owner_id: owner.user_id,
        title,
        genre: meta.genre,
        mood: meta.mood,
        description: meta.description,
        cover_art_cid: meta.cover_art,
        duration: meta.duration,
        stem_of: meta.stem_of,
        remix_of: meta.remix_of,
        metadata_cid: env.cid,
    };

    append(ws, &track_key(track_id), blk, false, Some(record))?;
    queue_challenge(effects, blk, ChallengeEvent::TrackUpload, owner.user_id, None);

    Ok(())
}

pub(crate) fn update<S: StateStore>(
    ctx: &IndexerContext,
    ws: &mut WorkingSet<S>,
    blk: &BlockMeta,
    event: &ActionEvent,
) -> Result<(), ActionError> {
    let env = decode::<TrackMeta>(&event.metadata)?;
    let meta = env.data;
    let track_id = event.entity_id;

    let current = current_owned(ws, event, track_id)?;

    check_genre(meta.genre.as_ref())?;
    check_description(ctx, meta.description.as_ref())?;
    check_parents(ws, meta.stem_of, &meta.remix_of)?;

    let record = TrackRecord {
        track_id: current.track_id,
        owner_id: current.owner_id,
        title: meta.title.unwrap_or(current.title),
        genre: meta.genre.or(current.genre),
        mood: meta.mood.or(current.mood),
        description: meta.description.or(current.description),
        cover_art_cid: meta.cover_art.or(current.cover_art_cid),
        duration: meta.duration.or(current.duration),
        stem_of: meta.stem_of.or(current.stem_of),
        remix_of: if meta.remix_of.is_empty() {
            current.remix_of
        } else {
            meta.remix_of
        },
        metadata_cid: env.cid.or(current.metadata_cid),
    };

    append(ws, &track_key(track_id), blk, false, Some(record))?;

    Ok(())
}

/// Appends a tombstone revision. Stems and playlist memberships are not
/// cascaded; readers filter them out.
pub(crate) fn delete<S: StateStore>(
    _ctx: &IndexerContext,
    ws: &mut WorkingSet<S>,
    blk: &BlockMeta,
    event: &ActionEvent,
) -> Result<(), ActionError> {
    let track_id = event.entity_id;
    let current = current_owned(ws, event, track_id)?;

    append(ws, &track_key(track_id), blk, true, Some(current))?;

    Ok(())
}

fn current_owned<S: StateStore>(
    ws: &mut WorkingSet<S>,
    event: &ActionEvent,
    track_id: EntityId,
) -> Result<TrackRecord, ActionError> {
    let current = ws
        .live::<TrackRecord>(&track_key(track_id))?
        .ok_or(Rejection::NotFound {
            kind: EntityKind::Track,
            key: track_id.to_string(),
        })?;

    let actor = resolve_signer(ws, event.user_id, &event.signer)?;

    if current.owner_id != actor.user_id {
        return Err(Rejection::Unauthorized(format!(
            "user {} does not own track {track_id}",
            actor.user_id
        ))
        .into());
    }

    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genre_allowlist_is_enforced() {
        assert!(check_genre(Some(&"Techno".to_string())).is_ok());
        assert!(check_genre(None).is_ok());
        assert!(check_genre(Some(&"Polka".to_string())).is_err());
    }
}
