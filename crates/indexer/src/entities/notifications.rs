use tempo_core::{ActionEvent, StateStore, WorkingSet};

use crate::auth::resolve_signer;
use crate::model::{notif_seen_key, NotificationSeenRecord};
use crate::process::{append, ActionError, BlockMeta};
use crate::IndexerContext;

/// Marks the user's notifications as seen as of the block timestamp.
pub(crate) fn view<S: StateStore>(
    _ctx: &IndexerContext,
    ws: &mut WorkingSet<S>,
    blk: &BlockMeta,
    event: &ActionEvent,
) -> Result<(), ActionError> {
    let actor = resolve_signer(ws, event.user_id, &event.signer)?;

    append(
        ws,
        &notif_seen_key(actor.user_id),
        blk,
        false,
        Some(NotificationSeenRecord {
            user_id: actor.user_id,
            last_seen_at: blk.at,
        }),
    )?;

    Ok(())
}
