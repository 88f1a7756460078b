use tempo_core::{Rejection, StateStore, UserId, Wallet, WorkingSet};

use crate::model::{app_key, grant_key, user_key, DeveloperAppRecord, GrantRecord, UserRecord};
use crate::process::ActionError;

/// Resolve whether `signer` may act for `user_id` and return the user's
/// current record.
///
/// The signer qualifies either as the user's own wallet or through the
/// delegation chain: an approved, non-revoked grant from the user to a
/// developer app that is still registered at the signer address.
pub(crate) fn resolve_signer<S: StateStore>(
    ws: &mut WorkingSet<S>,
    user_id: UserId,
    signer: &Wallet,
) -> Result<UserRecord, ActionError> {
    let user = ws
        .live::<UserRecord>(&user_key(user_id))?
        .ok_or(Rejection::NotFound {
            kind: tempo_core::EntityKind::User,
            key: user_id.to_string(),
        })?;

    if user.wallet == *signer {
        return Ok(user);
    }

    let grant = ws.live::<GrantRecord>(&grant_key(user_id, signer))?;

    if let Some(grant) = grant {
        if grant.is_approved {
            let app = ws.live::<DeveloperAppRecord>(&app_key(signer))?;

            if app.is_some() {
                return Ok(user);
            }
        }
    }

    Err(Rejection::Unauthorized(format!(
        "{signer} is neither the wallet of user {user_id} nor an approved grantee"
    ))
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempo_testing::{seed_entity, MemoryStore};

    fn user(id: UserId, wallet: &str) -> UserRecord {
        UserRecord {
            user_id: id,
            wallet: Wallet::new(wallet),
            handle: format!("user{id}"),
            name: None,
            bio: None,
            location: None,
            profile_picture_cid: None,
            cover_photo_cid: None,
            artist_pick_track_id: None,
            is_verified: false,
            metadata_cid: None,
        }
    }

    fn unauthorized(res: Result<UserRecord, ActionError>) -> bool {
        matches!(
            res,
            Err(ActionError::Reject(Rejection::Unauthorized(_)))
        )
    }

    #[test]
    fn owner_wallet_is_authorized() {
        let store = MemoryStore::new();
        seed_entity(&store, &user_key(3_000_001), user(3_000_001, "0xAA"));

        let mut ws = WorkingSet::new(&store);
        let resolved = resolve_signer(&mut ws, 3_000_001, &Wallet::new("0xaa")).unwrap();

        assert_eq!(resolved.user_id, 3_000_001);
    }

    #[test]
    fn unknown_wallet_is_rejected() {
        let store = MemoryStore::new();
        seed_entity(&store, &user_key(3_000_001), user(3_000_001, "0xAA"));

        let mut ws = WorkingSet::new(&store);
        assert!(unauthorized(resolve_signer(
            &mut ws,
            3_000_001,
            &Wallet::new("0xBB")
        )));
    }

    #[test]
    fn approved_grant_to_live_app_is_authorized() {
        let store = MemoryStore::new();
        let app_wallet = Wallet::new("0xapp");

        seed_entity(&store, &user_key(3_000_001), user(3_000_001, "0xAA"));
        seed_entity(
            &store,
            &app_key(&app_wallet),
            DeveloperAppRecord {
                address: app_wallet.clone(),
                owner_user_id: 3_000_002,
                name: "tuner".into(),
                description: None,
            },
        );
        seed_entity(
            &store,
            &grant_key(3_000_001, &app_wallet),
            GrantRecord {
                user_id: 3_000_001,
                grantee_address: app_wallet.clone(),
                is_approved: true,
            },
        );

        let mut ws = WorkingSet::new(&store);
        assert!(resolve_signer(&mut ws, 3_000_001, &app_wallet).is_ok());
    }

    #[test]
    fn unapproved_grant_is_rejected() {
        let store = MemoryStore::new();
        let app_wallet = Wallet::new("0xapp");

        seed_entity(&store, &user_key(3_000_001), user(3_000_001, "0xAA"));
        seed_entity(
            &store,
            &app_key(&app_wallet),
            DeveloperAppRecord {
                address: app_wallet.clone(),
                owner_user_id: 3_000_002,
                name: "tuner".into(),
                description: None,
            },
        );
        seed_entity(
            &store,
            &grant_key(3_000_001, &app_wallet),
            GrantRecord {
                user_id: 3_000_001,
                grantee_address: app_wallet.clone(),
                is_approved: false,
            },
        );

        let mut ws = WorkingSet::new(&store);
        assert!(unauthorized(resolve_signer(&mut ws, 3_000_001, &app_wallet)));
    }

    #[test]
    fn grant_without_registered_app_is_rejected() {
        let store = MemoryStore::new();
        let app_wallet = Wallet::new("0xapp");

        seed_entity(&store, &user_key(3_000_001), user(3_000_001, "0xAA"));
        seed_entity(
            &store,
            &grant_key(3_000_001, &app_wallet),
            GrantRecord {
                user_id: 3_000_001,
                grantee_address: app_wallet.clone(),
                is_approved: true,
            },
        );

        let mut ws = WorkingSet::new(&store);
        assert!(unauthorized(resolve_signer(&mut ws, 3_000_001, &app_wallet)));
    }
}
