//! Runtime settings for connections, catalog caching and storage polling

use std::time::Duration;

/// Connect timeout for long-lived processes
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(120);
/// Connect timeout for serverless / edge deployments
pub const SERVERLESS_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Idle window before a connection disconnects itself
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);
/// Capability catalog cache lifetime
pub const DEFAULT_CAPABILITY_TTL: Duration = Duration::from_secs(30);
/// Poll interval for database-style storage
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
/// Quiet window between a storage change and the registry reload
pub const DEFAULT_RELOAD_DEBOUNCE: Duration = Duration::from_secs(1);

/// Tunables shared by the connection manager and the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSettings {
    /// Upper bound for one connect attempt (transport handshake + tool listing)
    pub connect_timeout: Duration,
    /// Idle auto-disconnect window; `None` disables it
    pub idle_timeout: Option<Duration>,
    /// Capability catalog TTL
    pub capability_ttl: Duration,
    /// Storage poll interval
    pub poll_interval: Duration,
    /// Storage reload debounce
    pub reload_debounce: Duration,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
            capability_ttl: DEFAULT_CAPABILITY_TTL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            reload_debounce: DEFAULT_RELOAD_DEBOUNCE,
        }
    }
}

impl RuntimeSettings {
    /// Settings for serverless / edge deployments (shorter connect timeout)
    pub fn serverless() -> Self {
        Self {
            connect_timeout: SERVERLESS_CONNECT_TIMEOUT,
            ..Self::default()
        }
    }

    /// Read settings from the environment
    ///
    /// - `CONDUCTOR_SERVERLESS`: `1`/`true` selects the serverless connect timeout
    /// - `CONDUCTOR_CONNECT_TIMEOUT_MS`: explicit connect timeout
    /// - `CONDUCTOR_IDLE_TIMEOUT_SECS`: idle window, `0` disables
    /// - `CONDUCTOR_CAPABILITY_TTL_SECS`: catalog TTL
    /// - `CONDUCTOR_POLL_INTERVAL_SECS`: storage poll interval
    /// - `CONDUCTOR_RELOAD_DEBOUNCE_MS`: storage reload debounce
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let serverless = lookup("CONDUCTOR_SERVERLESS")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let mut settings = if serverless { Self::serverless() } else { Self::default() };

        let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        if let Some(ms) = number("CONDUCTOR_CONNECT_TIMEOUT_MS") {
            settings.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = number("CONDUCTOR_IDLE_TIMEOUT_SECS") {
            settings.idle_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(secs) = number("CONDUCTOR_CAPABILITY_TTL_SECS") {
            settings.capability_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = number("CONDUCTOR_POLL_INTERVAL_SECS") {
            settings.poll_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(ms) = number("CONDUCTOR_RELOAD_DEBOUNCE_MS") {
            settings.reload_debounce = Duration::from_millis(ms);
        }
        settings
    }

    /// Set the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set (or disable) the idle auto-disconnect window
    pub fn with_idle_timeout(mut self, idle: Option<Duration>) -> Self {
        self.idle_timeout = idle;
        self
    }

    /// Set the capability catalog TTL
    pub fn with_capability_ttl(mut self, ttl: Duration) -> Self {
        self.capability_ttl = ttl;
        self
    }

    /// Set the storage poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the storage reload debounce
    pub fn with_reload_debounce(mut self, debounce: Duration) -> Self {
        self.reload_debounce = debounce;
        self
    }
}
