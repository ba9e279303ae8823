use std::time::Duration;

/// Coordinator configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP/WebSocket server binds to.
    pub port: u16,
    /// How often the reaper sweeps lobbies and games.
    pub reaper_interval: Duration,
    /// Games idle and lobbies older than this are evicted by the reaper.
    pub inactive_timeout: Duration,
    /// Capacity of each connection's outbound message queue.
    pub outbound_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3001,
            reaper_interval: Duration::from_secs(60),
            inactive_timeout: Duration::from_secs(5 * 60),
            outbound_buffer: 256,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Every variable is optional; missing, unparseable or zero values fall
    /// back to the defaults (a zero timeout is allowed).
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parsed = |name: &str| -> Option<u64> {
            lookup(name).and_then(|v| v.trim().parse().ok())
        };
        let defaults = Self::default();
        Self {
            port: lookup("PORT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.port),
            reaper_interval: parsed("REAPER_INTERVAL_SECS")
                .filter(|n| *n > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.reaper_interval),
            inactive_timeout: parsed("INACTIVE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.inactive_timeout),
            outbound_buffer: parsed("OUTBOUND_BUFFER")
                .and_then(|n| usize::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.outbound_buffer),
        }
    }
}
