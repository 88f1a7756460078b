use tempo_core::{ActionEvent, EntityKind, Rejection, StateStore, Wallet, WorkingSet};

use crate::auth::resolve_signer;
use crate::metadata::{decode, AppCreateMeta, AppDeleteMeta};
use crate::model::{app_key, wallet_key, DeveloperAppRecord, WalletClaim};
use crate::process::{append, ActionError, BlockMeta};
use crate::IndexerContext;

pub(crate) fn create<S: StateStore>(
    _ctx: &IndexerContext,
    ws: &mut WorkingSet<S>,
    blk: &BlockMeta,
    event: &ActionEvent,
) -> Result<(), ActionError> {
    let env = decode::<AppCreateMeta>(&event.metadata)?;
    let meta = env.data;
    let address = Wallet::new(&meta.address);

    let owner = resolve_signer(ws, event.user_id, &event.signer)?;

    if !ws
        .history::<DeveloperAppRecord>(&app_key(&address))?
        .is_empty()
    {
        return Err(Rejection::AlreadyExists {
            kind: EntityKind::DeveloperApp,
            key: address.to_string(),
        }
        .into());
    }

    // an app address may not collide with any user's signup wallet
    if ws.live::<WalletClaim>(&wallet_key(&address))?.is_some() {
        return Err(Rejection::InvalidField(format!(
            "address {address} belongs to a user wallet"
        ))
        .into());
    }

    append(
        ws,
        &app_key(&address),
        blk,
        false,
        Some(DeveloperAppRecord {
            address,
            owner_user_id: owner.user_id,
            name: meta.name,
            description: meta.description,
        }),
    )?;

    Ok(())
}

/// Unregisters an app. Grants pointing at the address stop authorizing on
/// their own because the auth walk requires a live app.
pub(crate) fn delete<S: StateStore>(
    _ctx: &IndexerContext,
    ws: &mut WorkingSet<S>,
    blk: &BlockMeta,
    event: &ActionEvent,
) -> Result<(), ActionError> {
    let env = decode::<AppDeleteMeta>(&event.metadata)?;
    let address = Wallet::new(&env.data.address);

    let actor = resolve_signer(ws, event.user_id, &event.signer)?;

    let current = ws
        .live::<DeveloperAppRecord>(&app_key(&address))?
        .ok_or_else(|| Rejection::Noop(format!("no developer app at {address}")))?;

    if current.owner_user_id != actor.user_id {
        return Err(Rejection::Unauthorized(format!(
            "user {} does not own the app at {address}",
            actor.user_id
        ))
        .into());
    }

    append(ws, &app_key(&address), blk, true, Some(current))?;

    Ok(())
}
