//! File-based server configuration storage (YAML or JSON)
//!
//! Default location is `~/.config/conductor/servers.yaml`. External edits to
//! the file are picked up by a watcher and, after a short quiet window,
//! reported to the change listener.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::logging::{Logger, NoOpLogger};
use crate::timer::DebounceTimer;
use crate::types::ServerConfig;
use crate::{log_info, log_warn};
use super::settings::{RuntimeSettings, DEFAULT_RELOAD_DEBOUNCE};
use super::traits::{ConfigChangeListener, ConfigError, ConfigResult, ConfigStorage, ServerConfigMap};

/// Server file structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ServerFile {
    /// Configured servers by name
    #[serde(default, alias = "mcpServers")]
    pub servers: ServerConfigMap,
}

/// On-disk encoding, picked from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Yaml,
    Json,
}

impl FileFormat {
    /// `.json` files are JSON, everything else YAML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => FileFormat::Json,
            _ => FileFormat::Yaml,
        }
    }

    fn parse(&self, content: &str) -> ConfigResult<ServerFile> {
        if content.trim().is_empty() {
            return Ok(ServerFile::default());
        }
        Ok(match self {
            FileFormat::Yaml => serde_yaml::from_str(content)?,
            FileFormat::Json => serde_json::from_str(content)?,
        })
    }

    fn render(&self, file: &ServerFile) -> ConfigResult<String> {
        Ok(match self {
            FileFormat::Yaml => serde_yaml::to_string(file)?,
            FileFormat::Json => serde_json::to_string_pretty(file)?,
        })
    }
}

/// File-based configuration storage
///
/// # Example
///
/// ```no_run
/// use conductor_core::config::FileConfigStorage;
///
/// // User-level file
/// let storage = FileConfigStorage::user();
///
/// // Explicit path (JSON chosen by extension)
/// let storage = FileConfigStorage::new("/etc/conductor/servers.json");
/// ```
pub struct FileConfigStorage {
    path: PathBuf,
    format: FileFormat,
    cache: Arc<RwLock<Option<ServerFile>>>,
    reload: Arc<DebounceTimer>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    logger: Arc<dyn Logger>,
}

impl FileConfigStorage {
    /// Create a storage for a specific path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            format: FileFormat::from_path(&path),
            path,
            cache: Arc::new(RwLock::new(None)),
            reload: Arc::new(DebounceTimer::new(DEFAULT_RELOAD_DEBOUNCE)),
            watcher: Mutex::new(None),
            logger: Arc::new(NoOpLogger),
        }
    }

    /// Create the user-level storage (~/.config/conductor/servers.yaml)
    pub fn user() -> Self {
        Self::new(Self::default_path())
    }

    /// Default user-level file path
    pub fn default_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".config"));
        config_dir.join("conductor").join("servers.yaml")
    }

    /// Set the logger
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Apply the reload debounce from runtime settings
    pub fn with_settings(self, settings: &RuntimeSettings) -> Self {
        self.with_reload_debounce(settings.reload_debounce)
    }

    /// Set the quiet window between a file event and the reload notification
    pub fn with_reload_debounce(mut self, debounce: Duration) -> Self {
        self.reload = Arc::new(DebounceTimer::new(debounce));
        self
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the file exists
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Check whether the watcher is running
    pub fn is_watching(&self) -> bool {
        self.watcher.lock().is_some()
    }

    fn load(&self) -> ConfigResult<ServerFile> {
        if !self.path.exists() {
            return Ok(ServerFile::default());
        }
        let content = fs::read_to_string(&self.path)?;
        self.format.parse(&content)
    }

    fn write(&self, file: &ServerFile) -> ConfigResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, self.format.render(file)?)?;
        *self.cache.write() = Some(file.clone());
        Ok(())
    }

    /// Get cached or load from disk
    fn current(&self) -> ConfigResult<ServerFile> {
        if let Some(file) = self.cache.read().as_ref() {
            return Ok(file.clone());
        }
        let file = self.load()?;
        *self.cache.write() = Some(file.clone());
        Ok(file)
    }

    /// Reload from disk, dropping the cache
    pub fn reload(&self) -> ConfigResult<ServerFile> {
        let file = self.load()?;
        *self.cache.write() = Some(file.clone());
        Ok(file)
    }

    fn start_watching(&self, listener: Weak<dyn ConfigChangeListener>) -> ConfigResult<RecommendedWatcher> {
        let handle = tokio::runtime::Handle::current();
        let cache = Arc::clone(&self.cache);
        let reload = Arc::clone(&self.reload);
        let logger = Arc::clone(&self.logger);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    log_warn!(logger, "[FileConfigStorage] Watch error: {}", e);
                    return;
                }
            };
            if !matches!(
                event.kind,
                EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
            ) {
                return;
            }

            *cache.write() = None;
            let listener = listener.clone();
            let logger = Arc::clone(&logger);
            let _runtime = handle.enter();
            reload.arm(move || async move {
                if let Some(listener) = listener.upgrade() {
                    log_info!(logger, "[FileConfigStorage] Config file changed, reloading");
                    listener.on_config_changed().await;
                }
            });
        })?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;
        Ok(watcher)
    }
}

impl std::fmt::Debug for FileConfigStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileConfigStorage")
            .field("path", &self.path)
            .field("format", &self.format)
            .field("exists", &self.exists())
            .field("watching", &self.is_watching())
            .finish()
    }
}

#[async_trait]
impl ConfigStorage for FileConfigStorage {
    async fn init(&self, listener: Weak<dyn ConfigChangeListener>) -> ConfigResult<()> {
        if self.is_watching() {
            return Ok(());
        }
        // The watcher needs an existing file to attach to
        if !self.exists() {
            self.write(&ServerFile::default())?;
        }
        let watcher = self.start_watching(listener)?;
        *self.watcher.lock() = Some(watcher);
        log_info!(self.logger, "[FileConfigStorage] Watching {}", self.path.display());
        Ok(())
    }

    async fn load_all(&self) -> ConfigResult<ServerConfigMap> {
        Ok(self.current()?.servers)
    }

    async fn save(&self, name: &str, config: &ServerConfig) -> ConfigResult<()> {
        let mut file = self.current()?;
        file.servers.insert(name.to_string(), config.clone());
        self.write(&file)
    }

    async fn delete(&self, name: &str) -> ConfigResult<()> {
        let mut file = self.current()?;
        if file.servers.remove(name).is_none() {
            return Err(ConfigError::NotFound(name.to_string()));
        }
        self.write(&file)
    }

    async fn has(&self, name: &str) -> ConfigResult<bool> {
        Ok(self.current()?.servers.contains_key(name))
    }
}
