//! Redis delivery for the two post-commit side-effect channels: the challenge
//! event queue (RPUSH of JSON payloads) and the immediate balance-refresh set
//! (SADD of user ids).

use redis::Commands as _;
use std::sync::Mutex;
use tracing::debug;

use tempo_core::{ChallengeBus, ChallengeDispatch, RefreshCache, SideEffectError, UserId};

pub const DEFAULT_CHALLENGE_QUEUE: &str = "tempo:challenges";
pub const DEFAULT_REFRESH_SET: &str = "tempo:refresh:immediate";

fn bus_err(err: impl std::fmt::Display) -> SideEffectError {
    SideEffectError::Bus(err.to_string())
}

fn cache_err(err: impl std::fmt::Display) -> SideEffectError {
    SideEffectError::Cache(err.to_string())
}

/// Pushes challenge dispatches onto a Redis list consumed by the reward
/// subsystem. Delivery is at-least-once; the consumer dedupes.
pub struct RedisChallengeBus {
    conn: Mutex<redis::Connection>,
    queue_key: String,
}

impl RedisChallengeBus {
    pub fn open(url: &str, queue_key: Option<String>) -> Result<Self, SideEffectError> {
        let client = redis::Client::open(url).map_err(bus_err)?;
        let conn = client.get_connection().map_err(bus_err)?;

        Ok(Self {
            conn: Mutex::new(conn),
            queue_key: queue_key.unwrap_or_else(|| DEFAULT_CHALLENGE_QUEUE.to_string()),
        })
    }
}

impl ChallengeBus for RedisChallengeBus {
    fn dispatch(&self, event: &ChallengeDispatch) -> Result<(), SideEffectError> {
        let payload = serde_json::to_string(event).map_err(bus_err)?;

        let mut conn = self.conn.lock().map_err(bus_err)?;
        let () = conn.rpush(&self.queue_key, payload).map_err(bus_err)?;

        debug!(event = %event.event, user = event.user_id, "challenge dispatched");

        Ok(())
    }
}

/// Marks users whose token balances need an immediate refresh.
pub struct RedisRefreshCache {
    conn: Mutex<redis::Connection>,
    set_key: String,
}

impl RedisRefreshCache {
    pub fn open(url: &str, set_key: Option<String>) -> Result<Self, SideEffectError> {
        let client = redis::Client::open(url).map_err(cache_err)?;
        let conn = client.get_connection().map_err(cache_err)?;

        Ok(Self {
            conn: Mutex::new(conn),
            set_key: set_key.unwrap_or_else(|| DEFAULT_REFRESH_SET.to_string()),
        })
    }
}

impl RefreshCache for RedisRefreshCache {
    fn enqueue_refresh(&self, user_id: UserId) -> Result<(), SideEffectError> {
        let mut conn = self.conn.lock().map_err(cache_err)?;
        let () = conn.sadd(&self.set_key, user_id).map_err(cache_err)?;

        debug!(user = user_id, "balance refresh enqueued");

        Ok(())
    }
}
