// (C) Coralbits SL 2025
// This file is part of PDF Generator and is licensed under the
// GNU Affero General Public License v3.0.
// A commercial license on request is also available;
// contact info@coralbits.com for details.

use std::sync::Arc;
use std::time::Duration;
use std::{fs::File, io::BufReader};
use tokio::sync::{RwLock, RwLockReadGuard};

use notify::{RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{error, info, warn};

use crate::browser::{Viewport, WaitUntil};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub navigation: NavigationConfig,
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn listen(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct BrowserConfig {
    /// Chromium binary; autodetected when unset
    pub chrome_path: Option<String>,
    pub headless: bool,
    pub launch_timeout_secs: u64,
    /// Applied to every page operation that has no tighter bound of its own
    pub default_timeout_secs: u64,
    pub viewport: Viewport,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: true,
            launch_timeout_secs: 60,
            default_timeout_secs: 120,
            viewport: Viewport::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct NavigationConfig {
    pub attempts: u32,
    pub attempt_timeout_secs: u64,
    pub retry_delay_ms: u64,
    pub wait_until: WaitUntil,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            attempt_timeout_secs: 60,
            retry_delay_ms: 2000,
            wait_until: WaitUntil::NetworkIdle,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ContentConfig {
    pub map_selector: String,
    pub map_wait_secs: u64,
    pub map_settle_ms: u64,
    pub settle_ms: u64,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            map_selector: "#map".to_string(),
            map_wait_secs: 10,
            map_settle_ms: 5000,
            settle_ms: 2000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct FilterConfig {
    pub enabled: bool,
    pub allowed_domains: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allowed_domains: vec![
                "maps.googleapis.com".to_string(),
                "maps.gstatic.com".to_string(),
                "tile.openstreetmap.org".to_string(),
                "api.mapbox.com".to_string(),
                "basemaps.cartocdn.com".to_string(),
            ],
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ExportConfig {
    pub timeout_secs: u64,
    pub scale: f64,
    pub margin_inches: f64,
    pub paper_width_inches: f64,
    pub paper_height_inches: f64,
    pub print_background: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        // A4
        Self {
            timeout_secs: 30,
            scale: 0.85,
            margin_inches: 0.4,
            paper_width_inches: 8.27,
            paper_height_inches: 11.69,
            print_background: true,
        }
    }
}

impl BrowserConfig {
    pub fn launch_timeout(&self) -> Duration {
        Duration::from_secs(self.launch_timeout_secs)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

impl NavigationConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl ContentConfig {
    pub fn map_wait(&self) -> Duration {
        Duration::from_secs(self.map_wait_secs)
    }

    pub fn map_settle(&self) -> Duration {
        Duration::from_millis(self.map_settle_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl Config {
    pub fn read(path: &str) -> anyhow::Result<Self> {
        Self::parse(path)?.postprocess()
    }

    /// Reads the file as written, without overrides or checks
    pub fn parse(path: &str) -> anyhow::Result<Self> {
        let file = File::open(path)
            .map_err(|e| anyhow::anyhow!("Failed to open config file {}: {}", path, e))?;
        let reader = BufReader::new(file);
        serde_yaml::from_reader(reader)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file {}: {}", path, e))
    }

    /// Applies environment overrides and sanity checks
    pub fn postprocess(mut self) -> anyhow::Result<Self> {
        if let Ok(port) = std::env::var("PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid PORT environment value {}: {}", port, e))?;
        }
        if let Some(chrome_path) = self.browser.chrome_path.as_mut() {
            if chrome_path.starts_with("$HOME") {
                let home = std::env::var("HOME")
                    .map_err(|_| anyhow::anyhow!("chrome_path uses $HOME but HOME is not set"))?;
                *chrome_path = chrome_path.replace("$HOME", &home);
            }
        }
        let page_timeout = self.browser.default_timeout_secs.clamp(60, 120);
        if page_timeout != self.browser.default_timeout_secs {
            warn!(
                "browser.default_timeout_secs {} out of range, using {}",
                self.browser.default_timeout_secs, page_timeout
            );
            self.browser.default_timeout_secs = page_timeout;
        }
        if self.navigation.attempts == 0 {
            warn!("navigation.attempts is 0, using 1");
            self.navigation.attempts = 1;
        }
        if self.export.scale <= 0.0 {
            return Err(anyhow::anyhow!(
                "export.scale must be positive, got {}",
                self.export.scale
            ));
        }
        Ok(self)
    }

    pub fn empty() -> Self {
        Self {
            debug: false,
            server: ServerConfig::default(),
            browser: BrowserConfig::default(),
            navigation: NavigationConfig::default(),
            content: ContentConfig::default(),
            filter: FilterConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::empty()
    }
}

#[derive(Clone)]
pub struct ConfigManager {
    config: Arc<RwLock<Config>>,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self::with_config(Config::empty())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
        }
    }

    pub async fn load_config(&self, path: &str) -> anyhow::Result<()> {
        let config = Config::read(path)?;
        let mut write_lock = self.config.write().await;
        *write_lock = config;
        Ok(())
    }

    pub async fn set_config(&self, config: Config) {
        let mut write_lock = self.config.write().await;
        *write_lock = config;
    }

    pub async fn get_config(&self) -> RwLockReadGuard<'_, Config> {
        self.config.read().await
    }

    /// A copy of the current config; requests keep it for their whole lifetime
    pub async fn snapshot(&self) -> Config {
        self.config.read().await.clone()
    }

    /// Re-reads the file, keeping the current config if it can not be parsed
    pub async fn reload(&self, path: &str) -> bool {
        Self::reload_config_static(&self.config, path).await
    }

    /// Start watching the config file for changes and automatically reload it
    pub async fn watch_config(&self, path: &str) -> anyhow::Result<()> {
        let config_path = Path::new(path).to_path_buf();
        let config = self.config.clone();
        let path_string = path.to_string();

        let (tx, mut rx) = tokio::sync::mpsc::channel(100);
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    let _ = tx.blocking_send(event);
                }
                Err(e) => {
                    error!("Error receiving event: {}", e);
                }
            })?;
        watcher.watch(&config_path, RecursiveMode::NonRecursive)?;
        info!("Started watching config_file={}", path_string);

        tokio::spawn(async move {
            // the watcher stops when dropped, so it lives in the task
            let _watcher = watcher;
            while let Some(event) = rx.recv().await {
                if let notify::EventKind::Access(notify::event::AccessKind::Close(
                    notify::event::AccessMode::Write,
                )) = event.kind
                {
                    info!("Write close event detected, reloading config...");
                    Self::reload_config_static(&config, &path_string).await;
                }
            }
            warn!("Config watcher for {} stopped", path_string);
        });

        Ok(())
    }

    async fn reload_config_static(config: &Arc<RwLock<Config>>, path: &str) -> bool {
        info!("Reloading config from {}", path);
        let new_config = match Config::read(path) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to reload config: {}", e);
                return false;
            }
        };
        let mut write_lock = config.write().await;
        *write_lock = new_config;
        info!("Config reloaded successfully from {}", path);
        true
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

// Global config manager instance
pub static CONFIG_MANAGER: once_cell::sync::Lazy<ConfigManager> =
    once_cell::sync::Lazy::new(ConfigManager::new);
