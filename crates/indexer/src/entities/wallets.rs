use tempo_core::{ActionEvent, Rejection, SideEffect, StateStore, WorkingSet};

use crate::auth::resolve_signer;
use crate::metadata::{decode, AssociatedWalletDeleteMeta, AssociatedWalletMeta};
use crate::model::{assoc_wallet_key, AssociatedWalletRecord};
use crate::process::{append, ActionError, BlockMeta};
use crate::IndexerContext;

/// Associates an external wallet with the user after checking the wallet's
/// own signature over `(user_id, wallet)`. A bad signature rejects the whole
/// action: no row, no refresh signal.
pub(crate) fn create<S: StateStore>(
    ctx: &IndexerContext,
    ws: &mut WorkingSet<S>,
    blk: &BlockMeta,
    effects: &mut Vec<SideEffect>,
    event: &ActionEvent,
) -> Result<(), ActionError> {
    let env = decode::<AssociatedWalletMeta>(&event.metadata)?;
    let meta = env.data;
    let user_id = event.user_id;

    resolve_signer(ws, user_id, &event.signer)?;

    if !ctx
        .verifier
        .verify(meta.chain, user_id, &meta.wallet, &meta.signature)
    {
        return Err(Rejection::InvalidSignature { user_id }.into());
    }

    let wallet = meta.wallet.to_lowercase();
    let key = assoc_wallet_key(user_id, meta.chain, &wallet);

    if ws.live::<AssociatedWalletRecord>(&key)?.is_some() {
        return Err(Rejection::Noop(format!(
            "wallet {wallet} is already associated with user {user_id}"
        ))
        .into());
    }

    let record = AssociatedWalletRecord {
        user_id,
        chain: meta.chain,
        wallet,
    };

    append(ws, &key, blk, false, Some(record))?;
    effects.push(SideEffect::BalanceRefresh { user_id });

    Ok(())
}

/// Dissociates a wallet. Removing one that was never added is a no-op with
/// zero signals.
pub(crate) fn delete<S: StateStore>(
    _ctx: &IndexerContext,
    ws: &mut WorkingSet<S>,
    blk: &BlockMeta,
    effects: &mut Vec<SideEffect>,
    event: &ActionEvent,
) -> Result<(), ActionError> {
    let env = decode::<AssociatedWalletDeleteMeta>(&event.metadata)?;
    let meta = env.data;
    let user_id = event.user_id;

    resolve_signer(ws, user_id, &event.signer)?;

    let wallet = meta.wallet.to_lowercase();
    let key = assoc_wallet_key(user_id, meta.chain, &wallet);

    let current = ws
        .live::<AssociatedWalletRecord>(&key)?
        .ok_or_else(|| {
            Rejection::Noop(format!(
                "wallet {wallet} is not associated with user {user_id}"
            ))
        })?;

    append(ws, &key, blk, true, Some(current))?;
    effects.push(SideEffect::BalanceRefresh { user_id });

    Ok(())
}
