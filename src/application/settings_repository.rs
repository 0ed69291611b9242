// Repository trait for persisted client settings
use crate::domain::history::clamp_capacity;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;

/// Raw key/value form of the persisted settings. Values are strings and are
/// only interpreted by [`ClientSettings::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct StoredSettings {
    #[serde(rename = "wsServer", default, skip_serializing_if = "Option::is_none")]
    pub ws_server: Option<String>,
    #[serde(
        rename = "maxDataPointsLimit",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub max_data_points_limit: Option<String>,
}

/// Settings in effect for the running client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub server_url: String,
    pub max_data_points: NonZeroUsize,
}

impl ClientSettings {
    /// Interpret stored values, falling back to the defaults for anything
    /// absent or invalid
    pub fn resolve(stored: &StoredSettings, defaults: &ClientSettings) -> Self {
        let server_url = stored
            .ws_server
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| defaults.server_url.clone());

        let max_data_points = stored
            .max_data_points_limit
            .as_deref()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .map(clamp_capacity)
            .unwrap_or(defaults.max_data_points);

        Self {
            server_url,
            max_data_points,
        }
    }

    pub fn to_stored(&self) -> StoredSettings {
        StoredSettings {
            ws_server: Some(self.server_url.clone()),
            max_data_points_limit: Some(self.max_data_points.to_string()),
        }
    }
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// Load the stored settings; a missing store yields empty settings
    async fn load(&self) -> anyhow::Result<StoredSettings>;

    /// Persist the settings, replacing what was stored
    async fn save(&self, settings: &StoredSettings) -> anyhow::Result<()>;
}
