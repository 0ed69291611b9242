use crate::application::connection_manager::ReconnectPolicy;
use crate::application::settings_repository::ClientSettings;
use crate::domain::dashboard::SnapshotOptions;
use crate::domain::history::clamp_capacity;
use crate::domain::statistics::StatisticsScope;
use crate::domain::units::UnitPolicy;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_SERVER_URL: &str = "wss://periyar-scale-server.onrender.com/ws";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpSettings,
    pub feed: FeedSettings,
    pub history: HistorySettings,
    pub storage: StorageSettings,
    pub log: LogSettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpSettings {
    pub bind_addr: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FeedSettings {
    pub default_url: String,
    pub auto_connect: bool,
    pub auto_reconnect: bool,
    pub reconnect_delay_secs: u64,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            default_url: DEFAULT_SERVER_URL.to_string(),
            auto_connect: false,
            auto_reconnect: true,
            reconnect_delay_secs: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HistorySettings {
    pub default_capacity: i64,
    pub unit_policy: UnitPolicy,
    pub statistics_scope: StatisticsScope,
    pub table_rows: usize,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            default_capacity: 100,
            unit_policy: UnitPolicy::Kilograms,
            statistics_scope: StatisticsScope::Window,
            table_rows: 20,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageSettings {
    pub settings_path: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            settings_path: "data/client-settings.toml".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LogSettings {
    pub activity_entries: usize,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            activity_entries: 50,
        }
    }
}

impl AppConfig {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            enabled: self.feed.auto_reconnect,
            delay: Duration::from_secs(self.feed.reconnect_delay_secs.max(1)),
        }
    }

    pub fn default_client_settings(&self) -> ClientSettings {
        ClientSettings {
            server_url: self.feed.default_url.clone(),
            max_data_points: clamp_capacity(self.history.default_capacity),
        }
    }

    pub fn snapshot_options(&self) -> SnapshotOptions {
        SnapshotOptions {
            unit_policy: self.history.unit_policy,
            scope: self.history.statistics_scope,
            table_rows: self.history.table_rows,
        }
    }
}

/// Load `config/dashboard.toml` (optional) with `SCALE__SECTION__KEY`
/// environment overrides
pub fn load_app_config() -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/dashboard").required(false))
        .add_source(
            config::Environment::with_prefix("SCALE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}
