use serde_json::json;

use tempo::sync::{StepReport, SyncDriver};
use tempo::Config;
use tempo_core::{ChainPoint, PullEvent, RevertError, StateStore};
use tempo_indexer::{build_schema, user_key, IndexerConfig, IndexerContext, UserRecord};
use tempo_testing::{
    action, block, tx, MemoryStore, RecordingBus, RecordingCache, ScriptedSource, StaticVerifier,
};

use tempo_core::ActionKind::{Create, Update};
use tempo_core::EntityKind::User;

const W1: &str = "0xw1";
const U1: u64 = 3_000_000;

fn meta(data: serde_json::Value) -> String {
    json!({ "data": data }).to_string()
}

struct Bed {
    config: IndexerConfig,
    bus: RecordingBus,
    cache: RecordingCache,
    verifier: StaticVerifier,
}

impl Bed {
    fn new() -> Self {
        Self {
            config: IndexerConfig::default(),
            bus: RecordingBus::new(),
            cache: RecordingCache::new(),
            verifier: StaticVerifier::accepting(),
        }
    }

    fn ctx(&self) -> IndexerContext<'_> {
        IndexerContext {
            config: &self.config,
            bus: &self.bus,
            cache: &self.cache,
            verifier: &self.verifier,
        }
    }
}

#[test]
fn rollback_restores_state_and_cursor() {
    let bed = Bed::new();
    let store = MemoryStore::new();
    let schema = build_schema();

    let source = ScriptedSource::new(vec![
        PullEvent::Apply(block(
            1,
            vec![tx(
                "0xt1",
                vec![action(
                    User,
                    Create,
                    U1,
                    U1,
                    meta(json!({"handle": "djrob", "name": "Rob"})),
                    W1,
                )],
            )],
        )),
        PullEvent::Apply(block(
            2,
            vec![tx(
                "0xt2",
                vec![action(User, Update, U1, U1, meta(json!({"name": "Robert"})), W1)],
            )],
        )),
        PullEvent::Rollback(1),
    ]);

    let mut driver = SyncDriver::new(bed.ctx(), &store, &schema, source, 1_000);

    assert!(matches!(
        driver.step().unwrap(),
        Some(StepReport::Applied { block: 1, changes: 1 })
    ));
    assert!(matches!(
        driver.step().unwrap(),
        Some(StepReport::Applied { block: 2, changes: 1 })
    ));

    let user = store.read_history::<UserRecord>(&user_key(U1)).unwrap();
    assert_eq!(user.live().unwrap().name.as_deref(), Some("Robert"));

    assert!(matches!(
        driver.step().unwrap(),
        Some(StepReport::Reverted { target: 1, unwound: 1 })
    ));

    let user = store.read_history::<UserRecord>(&user_key(U1)).unwrap();
    assert_eq!(user.live().unwrap().name.as_deref(), Some("Rob"));
    assert_eq!(user.len(), 1);

    assert_eq!(
        store.read_cursor().unwrap(),
        Some(ChainPoint {
            number: 1,
            hash: "0xb00000001".into(),
        })
    );

    // source is dry now
    assert!(driver.step().unwrap().is_none());
}

#[test]
fn empty_blocks_still_advance_the_cursor_and_revert_log() {
    let bed = Bed::new();
    let store = MemoryStore::new();
    let schema = build_schema();

    let source = ScriptedSource::new(vec![
        PullEvent::Apply(block(1, vec![])),
        PullEvent::Apply(block(2, vec![])),
        PullEvent::Rollback(0),
    ]);

    let mut driver = SyncDriver::new(bed.ctx(), &store, &schema, source, 1_000);

    driver.step().unwrap();
    driver.step().unwrap();

    assert_eq!(store.revert_rows(), 2);

    assert!(matches!(
        driver.step().unwrap(),
        Some(StepReport::Reverted { target: 0, unwound: 2 })
    ));

    assert!(store.read_cursor().unwrap().is_none());
    assert_eq!(store.revert_rows(), 0);
}

#[test]
fn retention_bounds_the_rollback_horizon() {
    let bed = Bed::new();
    let store = MemoryStore::new();
    let schema = build_schema();

    let events = (1..=5)
        .map(|number| PullEvent::Apply(block(number, vec![])))
        .collect();

    let mut driver = SyncDriver::new(bed.ctx(), &store, &schema, ScriptedSource::new(events), 2);

    while driver.step().unwrap().is_some() {}

    // only the snapshots for blocks 4 and 5 survive
    assert_eq!(store.revert_rows(), 2);

    let mut driver = SyncDriver::new(
        bed.ctx(),
        &store,
        &schema,
        ScriptedSource::new(vec![PullEvent::Rollback(1)]),
        2,
    );

    let res = driver.step();
    assert!(matches!(
        res,
        Err(tempo::sync::DriverError::Revert(
            RevertError::MissingSnapshot(3)
        ))
    ));
}

#[test]
fn config_parses_with_defaults() {
    let raw = r#"
        [store]
        path = "/var/lib/tempo/state.redb"

        [indexer]
        user_bio_limit = 100

        [sync]
        feed = "/var/lib/tempo/feed.jsonl"
        retention = 50
    "#;

    let config: Config = toml::from_str(raw).unwrap();

    assert_eq!(config.indexer.user_bio_limit, 100);
    assert_eq!(config.indexer.user_id_offset, 3_000_000);
    assert_eq!(config.sync.retention, 50);
    assert_eq!(config.sync.poll_interval_ms, 500);
    assert!(config.redis.is_none());
}
