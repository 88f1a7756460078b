use tempo_core::{ActionEvent, EntityKind, Rejection, StateStore, Wallet, WorkingSet};

use crate::metadata::{decode, GrantMeta};
use crate::model::{app_key, grant_key, user_key, DeveloperAppRecord, GrantRecord, UserRecord};
use crate::process::{append, ActionError, BlockMeta};
use crate::IndexerContext;

fn grantor<S: StateStore>(
    ws: &mut WorkingSet<S>,
    event: &ActionEvent,
) -> Result<UserRecord, ActionError> {
    ws.live::<UserRecord>(&user_key(event.user_id))?
        .ok_or_else(|| {
            Rejection::NotFound {
                kind: EntityKind::User,
                key: event.user_id.to_string(),
            }
            .into()
        })
}

/// Creates a delegation from `_userId` to a developer app.
///
/// Signed by the grantor's wallet the grant is approved immediately; signed by
/// the app itself it sits pending until the grantor approves it.
pub(crate) fn create<S: StateStore>(
    _ctx: &IndexerContext,
    ws: &mut WorkingSet<S>,
    blk: &BlockMeta,
    event: &ActionEvent,
) -> Result<(), ActionError> {
    let env = decode::<GrantMeta>(&event.metadata)?;
    let grantee = Wallet::new(&env.data.grantee_address);

    let user = grantor(ws, event)?;

    if grantee == user.wallet {
        return Err(
            Rejection::SelfReferential("user cannot grant access to themselves".into()).into(),
        );
    }

    if ws.live::<DeveloperAppRecord>(&app_key(&grantee))?.is_none() {
        return Err(Rejection::NotFound {
            kind: EntityKind::DeveloperApp,
            key: grantee.to_string(),
        }
        .into());
    }

    let is_approved = if event.signer == user.wallet {
        true
    } else if event.signer == grantee {
        false
    } else {
        return Err(Rejection::Unauthorized(format!(
            "{} may not create a grant from user {} to {grantee}",
            event.signer, user.user_id
        ))
        .into());
    };

    let key = grant_key(user.user_id, &grantee);

    if ws.live::<GrantRecord>(&key)?.is_some() {
        return Err(Rejection::Noop(format!(
            "grant from user {} to {grantee} already exists",
            user.user_id
        ))
        .into());
    }

    append(
        ws,
        &key,
        blk,
        false,
        Some(GrantRecord {
            user_id: user.user_id,
            grantee_address: grantee,
            is_approved,
        }),
    )?;

    Ok(())
}

/// Approves a pending grant. Only the grantor's own wallet may approve.
pub(crate) fn approve<S: StateStore>(
    _ctx: &IndexerContext,
    ws: &mut WorkingSet<S>,
    blk: &BlockMeta,
    event: &ActionEvent,
) -> Result<(), ActionError> {
    let env = decode::<GrantMeta>(&event.metadata)?;
    let grantee = Wallet::new(&env.data.grantee_address);

    let user = grantor(ws, event)?;

    if event.signer != user.wallet {
        return Err(Rejection::Unauthorized(format!(
            "only user {} may approve this grant",
            user.user_id
        ))
        .into());
    }

    let key = grant_key(user.user_id, &grantee);

    let current = ws.live::<GrantRecord>(&key)?.ok_or(Rejection::NotFound {
        kind: EntityKind::Grant,
        key: grantee.to_string(),
    })?;

    if current.is_approved {
        return Err(Rejection::Noop("grant is already approved".into()).into());
    }

    append(
        ws,
        &key,
        blk,
        false,
        Some(GrantRecord {
            is_approved: true,
            ..current
        }),
    )?;

    Ok(())
}

/// Revokes a grant. The grantor revokes, or the grantee rejects; either way
/// the delegation stops authorizing as of this block.
pub(crate) fn revoke<S: StateStore>(
    _ctx: &IndexerContext,
    ws: &mut WorkingSet<S>,
    blk: &BlockMeta,
    event: &ActionEvent,
) -> Result<(), ActionError> {
    let env = decode::<GrantMeta>(&event.metadata)?;
    let grantee = Wallet::new(&env.data.grantee_address);

    let user = grantor(ws, event)?;

    if event.signer != user.wallet && event.signer != grantee {
        return Err(Rejection::Unauthorized(format!(
            "{} may not revoke the grant from user {} to {grantee}",
            event.signer, user.user_id
        ))
        .into());
    }

    let key = grant_key(user.user_id, &grantee);

    let current = ws.live::<GrantRecord>(&key)?.ok_or_else(|| {
        Rejection::Noop(format!(
            "no grant from user {} to {grantee}",
            user.user_id
        ))
    })?;

    append(ws, &key, blk, true, Some(current))?;

    Ok(())
}
