use serde::Deserialize;
use tempo_core::{ChallengeBus, RefreshCache, Wallet, WalletVerifier};

mod auth;
mod entities;
mod metadata;
mod model;
mod process;

pub use model::*;
pub use process::*;

/// Business-rule knobs for the action pipeline. Defaults match the on-chain
/// deployment; a config file can override any of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Chain-assigned user ids start here; Create below it is rejected
    pub user_id_offset: u64,

    pub track_id_offset: u64,
    pub playlist_id_offset: u64,

    pub user_bio_limit: usize,
    pub description_limit: usize,
    pub playlist_track_limit: usize,

    /// The only wallet allowed to sign Verify actions
    pub verifier_wallet: Wallet,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            user_id_offset: 3_000_000,
            track_id_offset: 2_000_000,
            playlist_id_offset: 400_000,
            user_bio_limit: 250,
            description_limit: 1000,
            playlist_track_limit: 5000,
            verifier_wallet: Wallet::new("0x0000000000000000000000000000000000000000"),
        }
    }
}

/// Injected collaborators for block processing. Handlers never reach for
/// process-wide state; everything they touch comes through here or the store.
pub struct IndexerContext<'a> {
    pub config: &'a IndexerConfig,
    pub bus: &'a dyn ChallengeBus,
    pub cache: &'a dyn RefreshCache,
    pub verifier: &'a dyn WalletVerifier,
}
