//! Forward sync loop with the Normal/Reverting state machine: apply blocks as
//! they arrive, unwind through the revert log when the relay reports a fork.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use tempo_core::{
    revert_to, BlockNumber, BlockSource, PullEvent, RevertError, SourceError, StateError,
    StateSchema, StateStore, StateWriter as _,
};
use tempo_indexer::{entity_manager_update, ChainError, IndexerContext};

#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Revert(#[from] RevertError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    State(#[from] StateError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriverState {
    Normal,
    Reverting,
}

/// What one driver step did.
#[derive(Debug)]
pub enum StepReport {
    Applied { block: BlockNumber, changes: usize },
    Reverted { target: BlockNumber, unwound: usize },
}

pub struct SyncDriver<'a, S: StateStore, B: BlockSource> {
    ctx: IndexerContext<'a>,
    store: &'a S,
    schema: &'a StateSchema,
    source: B,
    retention: u64,
    state: DriverState,
}

impl<'a, S: StateStore, B: BlockSource> SyncDriver<'a, S, B> {
    pub fn new(
        ctx: IndexerContext<'a>,
        store: &'a S,
        schema: &'a StateSchema,
        source: B,
        retention: u64,
    ) -> Self {
        Self {
            ctx,
            store,
            schema,
            source,
            retention,
            state: DriverState::Normal,
        }
    }

    /// Pull and handle the next event. `Ok(None)` means the source ran dry.
    pub fn step(&mut self) -> Result<Option<StepReport>, DriverError> {
        let event = match self.source.pull_next()? {
            Some(event) => event,
            None => return Ok(None),
        };

        match event {
            PullEvent::Apply(block) => {
                let outcome = entity_manager_update(&self.ctx, self.store, &block)?;

                self.prune(block.number)?;

                Ok(Some(StepReport::Applied {
                    block: block.number,
                    changes: outcome.changes,
                }))
            }
            PullEvent::Rollback(target) => {
                self.state = DriverState::Reverting;
                warn!(target, "chain fork reported, reverting");

                let unwound = revert_to(self.store, self.schema, target)?;

                self.state = DriverState::Normal;
                info!(target, unwound, "back to normal sync");

                Ok(Some(StepReport::Reverted { target, unwound }))
            }
        }
    }

    /// Drop revert snapshots that fell out of the rollback horizon.
    fn prune(&self, tip: BlockNumber) -> Result<(), DriverError> {
        if self.retention == 0 || tip <= self.retention {
            return Ok(());
        }

        let below = tip - self.retention;

        let mut writer = self.store.start_writer()?;
        writer.prune_revert_log(below)?;
        writer.commit()?;

        debug!(below, "revert log pruned");

        Ok(())
    }

    /// Run until `stop` is raised, sleeping `poll` whenever the source has
    /// nothing new.
    pub fn run_until(&mut self, stop: &AtomicBool, poll: Duration) -> Result<(), DriverError> {
        debug_assert_eq!(self.state, DriverState::Normal);

        while !stop.load(Ordering::Relaxed) {
            if self.step()?.is_none() {
                std::thread::sleep(poll);
            }
        }

        info!("sync driver stopped");

        Ok(())
    }
}
