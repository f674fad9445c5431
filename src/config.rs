// Configuration module for reelcast
// Handles XDG-compliant directory paths and TOML configuration file

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::services::ad_plan::PlanConfig;
use crate::services::carousel::{DEFAULT_BANNER_INTERVAL, DEFAULT_VIDEO_INTERVAL};
use crate::services::media_probe::DEFAULT_PROBE_TIMEOUT;
use crate::services::sequencer::DEFAULT_SEQUENCE_INTERVAL;
use crate::services::showcase::ShowcaseTimings;
use crate::services::view_tracking::DEFAULT_VIEW_THRESHOLD_SECS;

const APP_NAME: &str = "reelcast";
const CONFIG_FILENAME: &str = "config.toml";

/// TOML configuration file structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Server configuration
    pub server: ServerConfig,

    /// Directory paths (overrides XDG defaults)
    pub paths: PathsConfig,

    /// Ad insertion and rotation
    pub ads: AdsConfig,

    /// Player / view tracking
    pub player: PlayerConfig,

    /// Comments and voice messages
    pub chat: ChatConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server port (default: 8080)
    pub port: u16,

    /// Bind address (default: 0.0.0.0)
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_address: "0.0.0.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Override data directory (database location)
    pub data_dir: Option<PathBuf>,

    /// Override config directory
    pub config_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdsConfig {
    /// 1-based feed positions after which an ad banner is inserted
    pub positions: Vec<usize>,

    /// Ads carried by each inserted banner (default: 3)
    pub ads_per_banner: usize,

    /// Maximum ads fetched per request (default: 5)
    pub pool_limit: i64,

    /// Banner carousel period in milliseconds (default: 5000)
    pub banner_interval_ms: u64,

    /// Video ad carousel period in milliseconds (default: 8000)
    pub video_interval_ms: u64,

    /// Video/banner alternation period in milliseconds (default: 30000)
    pub sequence_interval_ms: u64,

    /// Probe video ad URLs before mounting a showcase (default: true)
    pub probe_videos: bool,

    /// Readiness probe wait before assuming the video is fine (default: 5000)
    pub probe_timeout_ms: u64,
}

impl Default for AdsConfig {
    fn default() -> Self {
        let plan = PlanConfig::default();
        Self {
            positions: plan.positions.into_iter().collect(),
            ads_per_banner: plan.ads_per_banner,
            pool_limit: 5,
            banner_interval_ms: DEFAULT_BANNER_INTERVAL.as_millis() as u64,
            video_interval_ms: DEFAULT_VIDEO_INTERVAL.as_millis() as u64,
            sequence_interval_ms: DEFAULT_SEQUENCE_INTERVAL.as_millis() as u64,
            probe_videos: true,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT.as_millis() as u64,
        }
    }
}

impl AdsConfig {
    pub fn plan_config(&self) -> PlanConfig {
        PlanConfig::new(self.positions.iter().copied(), self.ads_per_banner)
    }

    pub fn showcase_timings(&self) -> ShowcaseTimings {
        ShowcaseTimings {
            video_interval: Duration::from_millis(self.video_interval_ms.max(1)),
            banner_interval: Duration::from_millis(self.banner_interval_ms.max(1)),
            sequence_interval: Duration::from_millis(self.sequence_interval_ms.max(1)),
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Seconds of playback that must be exceeded before a view counts (default: 30)
    pub view_threshold_seconds: f64,

    /// Minutes without activity before a mounted session is reaped (default: 60)
    /// Applies to player sessions, ad showcases and voice recordings
    pub session_idle_minutes: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            view_threshold_seconds: DEFAULT_VIEW_THRESHOLD_SECS,
            session_idle_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Maximum comment length in characters (default: 1000)
    pub max_comment_length: usize,

    /// Maximum username length in characters (default: 50)
    pub max_username_length: usize,

    /// Comments returned per request (default: 50)
    pub comments_page_size: i64,

    /// Maximum size of a voice message in bytes (default: 5 MiB)
    pub max_voice_bytes: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_comment_length: 1000,
            max_username_length: 50,
            comments_page_size: 50,
            max_voice_bytes: 5 * 1024 * 1024,
        }
    }
}

/// Application paths following XDG Base Directory Specification on Unix
/// On other platforms, falls back to the current directory or platform-specific locations
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for configuration files (config.toml)
    /// XDG: $XDG_CONFIG_HOME/reelcast or ~/.config/reelcast
    pub config_dir: PathBuf,

    /// Directory for persistent data (database)
    /// XDG: $XDG_DATA_HOME/reelcast or ~/.local/share/reelcast
    pub data_dir: PathBuf,
}

impl AppPaths {
    /// Create application paths using XDG directories (or fallbacks)
    ///
    /// Priority order:
    /// 1. Environment variables (REELCAST_CONFIG_DIR, REELCAST_DATA_DIR)
    /// 2. Config file overrides
    /// 3. XDG / platform directories
    /// 4. Current directory fallback
    pub fn new(config_overrides: &PathsConfig) -> Self {
        Self {
            config_dir: Self::resolve(
                "REELCAST_CONFIG_DIR",
                &config_overrides.config_dir,
                dirs::config_dir(),
            ),
            data_dir: Self::resolve(
                "REELCAST_DATA_DIR",
                &config_overrides.data_dir,
                dirs::data_dir(),
            ),
        }
    }

    /// Create application paths using current directory (portable mode)
    pub fn current_dir() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            config_dir: cwd.clone(),
            data_dir: cwd,
        }
    }

    fn resolve(
        env_var: &str,
        config_override: &Option<PathBuf>,
        platform: Option<PathBuf>,
    ) -> PathBuf {
        if let Ok(path) = std::env::var(env_var) {
            return PathBuf::from(path);
        }

        if let Some(ref path) = config_override {
            return path.clone();
        }

        if let Some(dir) = platform {
            return dir.join(APP_NAME);
        }

        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }

    /// Get the database file path
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("reelcast.db")
    }

    /// Get the database URL for SQLite
    pub fn database_url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.database_path().display())
    }

    /// Ensure all directories exist
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.config_dir).await?;
        tokio::fs::create_dir_all(&self.data_dir).await?;
        Ok(())
    }

    /// Log the configured paths
    pub fn log_paths(&self) {
        tracing::info!("Configuration directory: {}", self.config_dir.display());
        tracing::info!("Data directory: {}", self.data_dir.display());
        tracing::debug!("Database path: {}", self.database_path().display());
    }
}

/// Application configuration - combines TOML file with environment overrides
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Application paths
    pub paths: AppPaths,

    /// Server port
    pub port: u16,

    /// Bind address
    pub bind_address: String,

    pub ads: AdsConfig,

    pub player: PlayerConfig,

    pub chat: ChatConfig,
}

impl AppConfig {
    /// Load configuration from TOML file and environment
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. TOML config file
    /// 3. Default values
    pub fn load() -> Self {
        let portable_mode = env_flag("REELCAST_PORTABLE").unwrap_or(false);

        if portable_mode {
            tracing::info!("Running in portable mode (using current directory)");
            let config_file = Self::load_config_file(&AppPaths::current_dir().config_dir);
            let mut config = Self::from_file(config_file);
            config.paths = AppPaths::current_dir();
            return config;
        }

        let config_dir = Self::find_config_dir();
        let config_file = Self::load_config_file(&config_dir);
        Self::from_file(config_file)
    }

    /// Find the config directory (for locating config.toml)
    fn find_config_dir() -> PathBuf {
        if let Ok(path) = std::env::var("REELCAST_CONFIG_DIR") {
            return PathBuf::from(path);
        }

        if let Some(dir) = dirs::config_dir() {
            return dir.join(APP_NAME);
        }

        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }

    /// Load and parse the TOML config file
    fn load_config_file(config_dir: &std::path::Path) -> ConfigFile {
        let config_path = config_dir.join(CONFIG_FILENAME);

        if !config_path.exists() {
            tracing::debug!(
                "No config file found at {}, using defaults",
                config_path.display()
            );
            return ConfigFile::default();
        }

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded configuration from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse config file {}: {}. Using defaults.",
                        config_path.display(),
                        e
                    );
                    ConfigFile::default()
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to read config file {}: {}. Using defaults.",
                    config_path.display(),
                    e
                );
                ConfigFile::default()
            }
        }
    }

    /// Build configuration from config file with environment overrides
    pub fn from_file(config_file: ConfigFile) -> Self {
        let paths = AppPaths::new(&config_file.paths);

        // Port: env > config > default
        let port = std::env::var("REELCAST_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(config_file.server.port);

        // Bind address: env > config > default
        let bind_address = std::env::var("REELCAST_BIND_ADDRESS")
            .unwrap_or_else(|_| config_file.server.bind_address.clone());

        let mut ads = config_file.ads;
        if let Some(probe) = env_flag("REELCAST_PROBE_VIDEOS") {
            ads.probe_videos = probe;
        }

        Self {
            paths,
            port,
            bind_address,
            ads,
            player: config_file.player,
            chat: config_file.chat,
        }
    }

    /// Get the database URL, with override from DATABASE_URL env var
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| self.paths.database_url())
    }

    pub fn session_idle(&self) -> Duration {
        Duration::from_secs(self.player.session_idle_minutes * 60)
    }

    /// Log configuration status
    pub fn log_config(&self) {
        self.paths.log_paths();
        tracing::info!("Server listening on {}:{}", self.bind_address, self.port);
        tracing::info!(
            "Ad banners after positions {:?}, {} ads each, pool limit {}",
            self.ads.positions,
            self.ads.ads_per_banner,
            self.ads.pool_limit
        );
        tracing::debug!(
            "Carousel periods: banner={}ms, video={}ms, sequence={}ms",
            self.ads.banner_interval_ms,
            self.ads.video_interval_ms,
            self.ads.sequence_interval_ms
        );

        if self.ads.probe_videos {
            tracing::info!(
                "Video ad probing: ENABLED (timeout {}ms)",
                self.ads.probe_timeout_ms
            );
        } else {
            tracing::debug!("Video ad probing: disabled");
        }

        tracing::debug!(
            "Views count after {}s of playback",
            self.player.view_threshold_seconds
        );
    }
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_dir_paths() {
        let paths = AppPaths::current_dir();
        assert_eq!(paths.config_dir, paths.data_dir);
        assert!(paths.database_path().ends_with("reelcast.db"));
    }

    #[test]
    fn test_database_url_format() {
        let paths = AppPaths::current_dir();
        let url = paths.database_url();
        assert!(url.starts_with("sqlite:"));
        assert!(url.ends_with("?mode=rwc"));
    }

    #[test]
    fn test_default_config_file() {
        let config = ConfigFile::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.ads.positions, vec![3, 8]);
        assert_eq!(config.ads.ads_per_banner, 3);
        assert_eq!(config.ads.sequence_interval_ms, 30_000);
        assert_eq!(config.player.view_threshold_seconds, 30.0);
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_str = r#"
[server]
port = 9000
bind_address = "127.0.0.1"

[ads]
positions = [2, 5, 9]
ads_per_banner = 2
banner_interval_ms = 6000

[player]
view_threshold_seconds = 45

[paths]
data_dir = "/custom/data"
"#;
        let config: ConfigFile = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert_eq!(config.ads.positions, vec![2, 5, 9]);
        assert_eq!(config.ads.ads_per_banner, 2);
        assert_eq!(config.ads.banner_interval_ms, 6000);
        // Unspecified keys keep their defaults
        assert_eq!(config.ads.video_interval_ms, 8000);
        assert_eq!(config.player.view_threshold_seconds, 45.0);
        assert_eq!(config.paths.data_dir, Some(PathBuf::from("/custom/data")));
    }

    #[test]
    fn test_plan_config_from_ads() {
        let ads = AdsConfig {
            positions: vec![8, 3, 3],
            ads_per_banner: 0,
            ..Default::default()
        };
        let plan = ads.plan_config();
        assert_eq!(plan.positions.into_iter().collect::<Vec<_>>(), vec![3, 8]);
        assert_eq!(plan.ads_per_banner, 1);
    }
}
