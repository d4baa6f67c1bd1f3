//! Polling configuration storage for database-backed deployments
//!
//! Several application instances may share one table of server configs.
//! Each instance polls the backend; when the snapshot differs from the last
//! one it saw, a debounced refresh is sent to the change listener.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::logging::{Logger, NoOpLogger};
use crate::timer::DebounceTimer;
use crate::types::ServerConfig;
use crate::{log_debug, log_info, log_warn};
use super::settings::{RuntimeSettings, DEFAULT_POLL_INTERVAL, DEFAULT_RELOAD_DEBOUNCE};
use super::traits::{ConfigChangeListener, ConfigError, ConfigResult, ConfigStorage, ServerConfigMap};

/// Row-level access to wherever the configs live (e.g. a SQL table)
#[async_trait]
pub trait ConfigBackend: Send + Sync {
    /// Fetch every row
    async fn fetch_all(&self) -> ConfigResult<ServerConfigMap>;

    /// Insert or update a row
    async fn upsert(&self, name: &str, config: &ServerConfig) -> ConfigResult<()>;

    /// Remove a row, returning whether it existed
    async fn remove(&self, name: &str) -> ConfigResult<bool>;
}

/// In-memory backend; `set_external` simulates writes by another instance
#[derive(Debug, Default)]
pub struct MemoryConfigBackend {
    rows: RwLock<ServerConfigMap>,
}

impl MemoryConfigBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a row without going through any storage
    pub fn set_external(&self, name: &str, config: ServerConfig) {
        self.rows.write().insert(name.to_string(), config);
    }

    /// Remove a row without going through any storage
    pub fn remove_external(&self, name: &str) {
        self.rows.write().remove(name);
    }
}

#[async_trait]
impl ConfigBackend for MemoryConfigBackend {
    async fn fetch_all(&self) -> ConfigResult<ServerConfigMap> {
        Ok(self.rows.read().clone())
    }

    async fn upsert(&self, name: &str, config: &ServerConfig) -> ConfigResult<()> {
        self.rows.write().insert(name.to_string(), config.clone());
        Ok(())
    }

    async fn remove(&self, name: &str) -> ConfigResult<bool> {
        Ok(self.rows.write().remove(name).is_some())
    }
}

/// Storage that polls a `ConfigBackend`
pub struct PollingConfigStorage {
    backend: Arc<dyn ConfigBackend>,
    interval: Duration,
    last_seen: Arc<Mutex<Option<ServerConfigMap>>>,
    refresh: Arc<DebounceTimer>,
    poller: Mutex<Option<JoinHandle<()>>>,
    logger: Arc<dyn Logger>,
}

impl PollingConfigStorage {
    /// Create a polling storage with default interval and debounce
    pub fn new(backend: Arc<dyn ConfigBackend>) -> Self {
        Self {
            backend,
            interval: DEFAULT_POLL_INTERVAL,
            last_seen: Arc::new(Mutex::new(None)),
            refresh: Arc::new(DebounceTimer::new(DEFAULT_RELOAD_DEBOUNCE)),
            poller: Mutex::new(None),
            logger: Arc::new(NoOpLogger),
        }
    }

    /// Apply poll interval and refresh debounce from runtime settings
    pub fn with_settings(self, settings: &RuntimeSettings) -> Self {
        self.with_interval(settings.poll_interval)
            .with_debounce(settings.reload_debounce)
    }

    /// Set the poll interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the refresh debounce
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.refresh = Arc::new(DebounceTimer::new(debounce));
        self
    }

    /// Set the logger
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Check whether the poll loop is running
    pub fn is_polling(&self) -> bool {
        self.poller.lock().is_some()
    }

    fn remember(&self, snapshot: ServerConfigMap) {
        *self.last_seen.lock() = Some(snapshot);
    }

    fn spawn_poller(&self, listener: Weak<dyn ConfigChangeListener>) -> JoinHandle<()> {
        let backend = Arc::clone(&self.backend);
        let last_seen = Arc::clone(&self.last_seen);
        let refresh = Arc::clone(&self.refresh);
        let logger = Arc::clone(&self.logger);
        let interval = self.interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately; init already took a snapshot
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if listener.strong_count() == 0 {
                    log_debug!(logger, "[PollingConfigStorage] Listener gone, stopping poll loop");
                    break;
                }

                let snapshot = match backend.fetch_all().await {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        log_warn!(logger, "[PollingConfigStorage] Poll failed: {}", e);
                        continue;
                    }
                };

                let changed = {
                    let mut seen = last_seen.lock();
                    let changed = seen.as_ref() != Some(&snapshot);
                    *seen = Some(snapshot);
                    changed
                };
                if !changed {
                    continue;
                }

                log_info!(logger, "[PollingConfigStorage] Stored configs changed, scheduling refresh");
                let listener = listener.clone();
                refresh.arm(move || async move {
                    if let Some(listener) = listener.upgrade() {
                        listener.on_config_changed().await;
                    }
                });
            }
        })
    }
}

impl Drop for PollingConfigStorage {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.lock().take() {
            poller.abort();
        }
    }
}

#[async_trait]
impl ConfigStorage for PollingConfigStorage {
    async fn init(&self, listener: Weak<dyn ConfigChangeListener>) -> ConfigResult<()> {
        if self.is_polling() {
            return Ok(());
        }
        let snapshot = self.backend.fetch_all().await?;
        self.remember(snapshot);
        let poller = self.spawn_poller(listener);
        *self.poller.lock() = Some(poller);
        Ok(())
    }

    async fn load_all(&self) -> ConfigResult<ServerConfigMap> {
        let snapshot = self.backend.fetch_all().await?;
        self.remember(snapshot.clone());
        Ok(snapshot)
    }

    async fn save(&self, name: &str, config: &ServerConfig) -> ConfigResult<()> {
        self.backend.upsert(name, config).await?;
        // Our own writes are already applied in-process; don't echo them back
        if let Some(seen) = self.last_seen.lock().as_mut() {
            seen.insert(name.to_string(), config.clone());
        }
        Ok(())
    }

    async fn delete(&self, name: &str) -> ConfigResult<()> {
        if !self.backend.remove(name).await? {
            return Err(ConfigError::NotFound(name.to_string()));
        }
        if let Some(seen) = self.last_seen.lock().as_mut() {
            seen.remove(name);
        }
        Ok(())
    }

    async fn has(&self, name: &str) -> ConfigResult<bool> {
        Ok(self.backend.fetch_all().await?.contains_key(name))
    }
}

impl std::fmt::Debug for PollingConfigStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let known: Option<BTreeMap<String, &'static str>> = self.last_seen.lock().as_ref().map(|m| {
            m.iter()
                .map(|(name, config)| (name.clone(), config.transport()))
                .collect()
        });
        f.debug_struct("PollingConfigStorage")
            .field("interval", &self.interval)
            .field("polling", &self.is_polling())
            .field("known", &known)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingListener {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ConfigChangeListener for CountingListener {
        async fn on_config_changed(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn storage(backend: &Arc<MemoryConfigBackend>) -> PollingConfigStorage {
        let settings = RuntimeSettings::default()
            .with_poll_interval(Duration::from_secs(10))
            .with_reload_debounce(Duration::from_secs(2));
        PollingConfigStorage::new(Arc::clone(backend) as Arc<dyn ConfigBackend>).with_settings(&settings)
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_change_triggers_one_debounced_refresh() {
        let backend = Arc::new(MemoryConfigBackend::new());
        let storage = storage(&backend);
        let listener = Arc::new(CountingListener::default());
        storage
            .init(Arc::downgrade(&listener) as Weak<dyn ConfigChangeListener>)
            .await
            .unwrap();

        // Nothing changed: polls stay quiet
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(listener.calls.load(Ordering::SeqCst), 0);

        // Another instance adds a server
        backend.set_external("ads", ServerConfig::remote("https://ads.example.com/mcp"));
        tokio::time::sleep(Duration::from_secs(10)).await;
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(listener.calls.load(Ordering::SeqCst), 1);

        // Snapshot is stable again
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(listener.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_own_writes_are_not_echoed() {
        let backend = Arc::new(MemoryConfigBackend::new());
        let storage = storage(&backend);
        let listener = Arc::new(CountingListener::default());
        storage
            .init(Arc::downgrade(&listener) as Weak<dyn ConfigChangeListener>)
            .await
            .unwrap();

        storage.save("local", &ServerConfig::local("echo-tool")).await.unwrap();
        assert!(storage.has("local").await.unwrap());

        tokio::time::sleep(Duration::from_secs(40)).await;
        assert_eq!(listener.calls.load(Ordering::SeqCst), 0);

        storage.delete("local").await.unwrap();
        assert!(matches!(
            storage.delete("local").await,
            Err(ConfigError::NotFound(_))
        ));
    }
}
