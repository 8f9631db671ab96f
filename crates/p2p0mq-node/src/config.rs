use std::time::Duration;

/// Tunables for one node. Defaults match the reference values
/// documented for the original implementation; every field can be
/// overridden individually, and [`NodeConfig::from_env`] applies
/// `P2P0MQ_*` environment overrides on top of [`NodeConfig::default`]
/// the way `hooteconf::HootConfig` layers file and environment
/// sources on top of compiled defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub heart_beat_interval: Duration,
    pub heart_beat_slow_down: Duration,
    pub heart_beat_max_interval: Duration,
    pub unresponsive_threshold: Duration,
    pub no_connection_threshold: Duration,
    pub unresponsive_reconnect_wait: Duration,
    pub ask_around_interval: Duration,
    pub sync_db_interval: Duration,
    pub process_limit_per_loop: usize,
    pub stabilize_timeout: Duration,
    pub default_time_to_live: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            heart_beat_interval: Duration::from_secs(5),
            heart_beat_slow_down: Duration::from_secs(5),
            heart_beat_max_interval: Duration::from_secs(60),
            unresponsive_threshold: Duration::from_secs(15),
            no_connection_threshold: Duration::from_secs(60),
            unresponsive_reconnect_wait: Duration::from_secs(30),
            ask_around_interval: Duration::from_secs(30),
            sync_db_interval: Duration::from_secs(30),
            process_limit_per_loop: 100,
            stabilize_timeout: Duration::from_secs(10),
            default_time_to_live: Duration::from_secs(60),
        }
    }
}

impl NodeConfig {
    /// Applies `P2P0MQ_*` environment overrides (all values are
    /// seconds, parsed as `u64`, except `PROCESS_LIMIT_PER_LOOP` which
    /// is a plain count) on top of `self`. Unset or unparsable
    /// variables are left untouched rather than erroring — this is a
    /// developer convenience knob, not a config-loading boundary, so
    /// it never fails startup.
    pub fn from_env(mut self) -> Self {
        macro_rules! secs_override {
            ($field:ident, $var:literal) => {
                if let Ok(raw) = std::env::var($var) {
                    if let Ok(secs) = raw.parse::<u64>() {
                        self.$field = Duration::from_secs(secs);
                    }
                }
            };
        }
        secs_override!(heart_beat_interval, "P2P0MQ_HEART_BEAT_INTERVAL");
        secs_override!(heart_beat_slow_down, "P2P0MQ_HEART_BEAT_SLOW_DOWN");
        secs_override!(heart_beat_max_interval, "P2P0MQ_HEART_BEAT_MAX_INTERVAL");
        secs_override!(unresponsive_threshold, "P2P0MQ_UNRESPONSIVE_THRESHOLD");
        secs_override!(no_connection_threshold, "P2P0MQ_NO_CONNECTION_THRESHOLD");
        secs_override!(
            unresponsive_reconnect_wait,
            "P2P0MQ_UNRESPONSIVE_RECONNECT_WAIT"
        );
        secs_override!(ask_around_interval, "P2P0MQ_ASK_AROUND_INTERVAL");
        secs_override!(sync_db_interval, "P2P0MQ_SYNC_DB_INTERVAL");
        secs_override!(stabilize_timeout, "P2P0MQ_STABILIZE_TIMEOUT");
        secs_override!(default_time_to_live, "P2P0MQ_DEFAULT_TIME_TO_LIVE");

        if let Ok(raw) = std::env::var("P2P0MQ_PROCESS_LIMIT_PER_LOOP") {
            if let Ok(limit) = raw.parse::<usize>() {
                self.process_limit_per_loop = limit;
            }
        }
        self
    }
}
