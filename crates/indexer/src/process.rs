use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use tempo_core::{
    ActionKind, BlockEnvelope, BlockHash, BlockNumber, ChallengeDispatch, ChallengeEvent, Entity,
    EntityKind, RevertBlock, Revision, SideEffect, StateError, StateStore, StateWriter, TxHash,
    UserId, WorkingSet,
};

use crate::entities;
use crate::IndexerContext;

/// Fatal block-level failures. Per-action problems never surface here; they
/// are logged and skipped inside the block.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("state error: {0}")]
    State(#[from] StateError),
}

/// What one processed block produced: the count of applied (non-skipped)
/// actions and the side effects that were flushed after commit.
#[derive(Debug)]
pub struct BlockOutcome {
    pub changes: usize,
    pub side_effects: Vec<SideEffect>,
}

#[derive(Debug)]
pub(crate) enum ActionError {
    Reject(tempo_core::Rejection),
    State(StateError),
}

impl From<tempo_core::Rejection> for ActionError {
    fn from(value: tempo_core::Rejection) -> Self {
        Self::Reject(value)
    }
}

impl From<StateError> for ActionError {
    fn from(value: StateError) -> Self {
        Self::State(value)
    }
}

/// Block-scoped context handed to every handler.
pub(crate) struct BlockMeta {
    pub number: BlockNumber,
    pub hash: BlockHash,
    pub tx_hash: TxHash,
    pub at: DateTime<Utc>,
}

/// Append the next revision for a key, carrying `created_at` forward from the
/// first revision and rejecting actions that arrive below the entity's current
/// block (replay safety; same-block sequences are fine).
pub(crate) fn append<S: StateStore, T: Entity>(
    ws: &mut WorkingSet<S>,
    key: &[u8],
    blk: &BlockMeta,
    is_delete: bool,
    payload: Option<T>,
) -> Result<(), ActionError> {
    let history = ws.history::<T>(key)?;

    if let Some(current) = history.current() {
        if current.block_number > blk.number {
            return Err(tempo_core::Rejection::StaleBlock {
                have: current.block_number,
                got: blk.number,
            }
            .into());
        }
    }

    let created_at = history.created_at().unwrap_or(blk.at);

    ws.push(
        key,
        Revision {
            block_number: blk.number,
            block_hash: blk.hash.clone(),
            tx_hash: blk.tx_hash.clone(),
            created_at,
            updated_at: blk.at,
            is_delete,
            payload,
        },
    )?;

    Ok(())
}

pub(crate) fn queue_challenge(
    effects: &mut Vec<SideEffect>,
    blk: &BlockMeta,
    event: ChallengeEvent,
    user_id: UserId,
    extra: Option<serde_json::Value>,
) {
    effects.push(SideEffect::Challenge(ChallengeDispatch {
        event,
        block_number: blk.number,
        block_timestamp: blk.at,
        user_id,
        extra,
    }));
}

/// Apply one block of entity-manager transactions.
///
/// Actions run in emission order against a working set seeded from the store,
/// so later actions in the block observe earlier ones. Everything the block
/// changed commits in one write transaction together with its revert snapshot
/// and the new cursor; side effects flush only after that commit succeeds.
pub fn entity_manager_update<S: StateStore>(
    ctx: &IndexerContext,
    store: &S,
    block: &BlockEnvelope,
) -> Result<BlockOutcome, ChainError> {
    let prev_point = store.read_cursor()?;

    if let Some(point) = &prev_point {
        if point.number >= block.number {
            warn!(
                cursor = point.number,
                block = block.number,
                "block at or below cursor, skipping"
            );

            return Ok(BlockOutcome {
                changes: 0,
                side_effects: Vec::new(),
            });
        }
    }

    let mut ws = WorkingSet::new(store);
    let mut effects = Vec::new();
    let mut changes = 0;
    let at = block.datetime();

    for tx in &block.txs {
        for event in &tx.actions {
            let blk = BlockMeta {
                number: block.number,
                hash: block.hash.clone(),
                tx_hash: tx.tx_hash.clone(),
                at,
            };

            match dispatch(ctx, &mut ws, &blk, &mut effects, event) {
                Ok(()) => {
                    changes += 1;

                    debug!(
                        kind = %event.entity_kind,
                        action = %event.action,
                        id = event.entity_id,
                        "action applied"
                    );
                }
                Err(ActionError::Reject(rejection)) if rejection.is_noop() => {
                    debug!(%rejection, "action skipped");
                }
                Err(ActionError::Reject(rejection)) => {
                    warn!(
                        %rejection,
                        kind = %event.entity_kind,
                        action = %event.action,
                        id = event.entity_id,
                        tx = %tx.tx_hash,
                        "action rejected"
                    );
                }
                Err(ActionError::State(err)) => return Err(err.into()),
            }
        }
    }

    let commit = ws.into_commit()?;

    let revert = RevertBlock {
        block_number: block.number,
        block_hash: block.hash.clone(),
        prev_point,
        entries: commit.revert,
    };

    let mut writer = store.start_writer()?;

    for (ns, key, value) in &commit.writes {
        writer.write_entity(ns, key, value)?;
    }

    writer.write_revert_block(&revert)?;
    writer.set_cursor(Some(block.point()))?;
    writer.commit()?;

    // the block is durable; crash from here on means redelivery, which the
    // challenge and cache consumers tolerate
    for effect in &effects {
        let delivered = match effect {
            SideEffect::Challenge(dispatch) => ctx.bus.dispatch(dispatch),
            SideEffect::BalanceRefresh { user_id } => ctx.cache.enqueue_refresh(*user_id),
        };

        if let Err(err) = delivered {
            warn!(%err, "side effect delivery failed");
        }
    }

    info!(
        block = block.number,
        changes,
        effects = effects.len(),
        "block applied"
    );

    Ok(BlockOutcome {
        changes,
        side_effects: effects,
    })
}

fn dispatch<S: StateStore>(
    ctx: &IndexerContext,
    ws: &mut WorkingSet<S>,
    blk: &BlockMeta,
    effects: &mut Vec<SideEffect>,
    event: &tempo_core::ActionEvent,
) -> Result<(), ActionError> {
    use ActionKind as A;
    use EntityKind as E;

    match (event.entity_kind, event.action) {
        (E::User, A::Create) => entities::users::create(ctx, ws, blk, effects, event),
        (E::User, A::Update) => entities::users::update(ctx, ws, blk, effects, event),
        (E::User, A::Verify) => entities::users::verify(ctx, ws, blk, effects, event),

        (E::Track, A::Create) => entities::tracks::create(ctx, ws, blk, effects, event),
        (E::Track, A::Update) => entities::tracks::update(ctx, ws, blk, event),
        (E::Track, A::Delete) => entities::tracks::delete(ctx, ws, blk, event),

        (E::Playlist, A::Create) => entities::playlists::create(ctx, ws, blk, event),
        (E::Playlist, A::Update) => entities::playlists::update(ctx, ws, blk, event),
        (E::Playlist, A::Delete) => entities::playlists::delete(ctx, ws, blk, event),

        (E::AssociatedWallet, A::Create) => entities::wallets::create(ctx, ws, blk, effects, event),
        (E::AssociatedWallet, A::Delete) => entities::wallets::delete(ctx, ws, blk, effects, event),

        (E::Follow, A::Create) => entities::social::follow(ctx, ws, blk, effects, event),
        (E::Follow, A::Delete) => entities::social::unfollow(ctx, ws, blk, event),
        (E::Subscription, A::Create) => entities::social::subscribe(ctx, ws, blk, event),
        (E::Subscription, A::Delete) => entities::social::unsubscribe(ctx, ws, blk, event),
        (E::Repost, A::Create) => entities::social::repost(ctx, ws, blk, effects, event),
        (E::Repost, A::Delete) => entities::social::unrepost(ctx, ws, blk, event),
        (E::Save, A::Create) => entities::social::save(ctx, ws, blk, effects, event),
        (E::Save, A::Delete) => entities::social::unsave(ctx, ws, blk, event),

        (E::Grant, A::Create) => entities::grants::create(ctx, ws, blk, event),
        (E::Grant, A::Update) => entities::grants::approve(ctx, ws, blk, event),
        (E::Grant, A::Delete) => entities::grants::revoke(ctx, ws, blk, event),

        (E::DeveloperApp, A::Create) => entities::apps::create(ctx, ws, blk, event),
        (E::DeveloperApp, A::Delete) => entities::apps::delete(ctx, ws, blk, event),

        (E::Comment, A::Create) => entities::comments::create(ctx, ws, blk, event),
        (E::Comment, A::Update) => entities::comments::update(ctx, ws, blk, event),
        (E::Comment, A::Delete) => entities::comments::delete(ctx, ws, blk, event),

        (E::Notification, A::View) => entities::notifications::view(ctx, ws, blk, event),

        (kind, action) => Err(tempo_core::Rejection::UnsupportedAction { kind, action }.into()),
    }
}
