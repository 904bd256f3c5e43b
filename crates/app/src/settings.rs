use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use natter_sync::{DEFAULT_POLL_INTERVAL, DEFAULT_SAMPLE_SIZE, PollerConfig};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000";
pub const DEFAULT_SOCKET_URL: &str = "ws://localhost:5000/socket";
pub const DEFAULT_CLASSIFIER_URL: &str = "http://localhost:8000/getTopic";
pub const SETTINGS_DIRECTORY_NAME: &str = "natter";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const SESSION_FILE_NAME: &str = "session.json";
pub const ENV_PREFIX: &str = "NATTER_";
pub const SETTINGS_PATH_ENV: &str = "NATTER_SETTINGS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollerSettings {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            sample_size: default_sample_size(),
        }
    }
}

impl PollerSettings {
    pub fn to_poller_config(&self) -> PollerConfig {
        PollerConfig::new(Duration::from_millis(self.interval_ms), self.sample_size)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_socket_url")]
    pub socket_url: String,
    #[serde(default = "default_classifier_url")]
    pub classifier_url: String,
    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,
    #[serde(default)]
    pub poller: PollerSettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            socket_url: default_socket_url(),
            classifier_url: default_classifier_url(),
            session_file: default_session_file(),
            poller: PollerSettings::default(),
        }
    }
}

impl AppSettings {
    pub fn normalized(mut self) -> Self {
        self.api_base_url = non_blank_or(&self.api_base_url, default_api_base_url);
        self.socket_url = non_blank_or(&self.socket_url, default_socket_url);
        self.classifier_url = non_blank_or(&self.classifier_url, default_classifier_url);
        if self.session_file.as_os_str().is_empty() {
            self.session_file = default_session_file();
        }
        if self.poller.interval_ms == 0 {
            self.poller.interval_ms = default_interval_ms();
        }
        if self.poller.sample_size == 0 {
            self.poller.sample_size = default_sample_size();
        }
        self
    }
}

/// Settings layered from defaults, the JSON file and `NATTER_*` variables.
pub struct SettingsStore {
    settings: ArcSwap<AppSettings>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".natter"))
    }

    /// `NATTER_SETTINGS` wins over the platform config directory.
    pub fn default_config_path() -> PathBuf {
        std::env::var_os(SETTINGS_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| Self::default_config_dir().join(SETTINGS_FILE_NAME))
    }

    pub fn new(config_path: PathBuf) -> Self {
        if !config_path.exists() {
            tracing::info!(path = ?config_path, "settings file not found; writing defaults");
            if let Err(error) = persist(&config_path, &AppSettings::default()) {
                tracing::warn!(error = %error, "failed to write default settings");
            }
        }

        let settings = load_from_disk(&config_path);
        Self {
            settings: ArcSwap::from_pointee(settings),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<AppSettings> {
        self.settings.load_full()
    }

    /// Re-reads every layer and swaps the result in.
    pub fn reload(&self) -> Arc<AppSettings> {
        let settings = Arc::new(load_from_disk(&self.config_path));
        self.settings.store(Arc::clone(&settings));
        tracing::info!(path = ?self.config_path, "settings reloaded");
        settings
    }
}

fn load_from_disk(path: &Path) -> AppSettings {
    let mut figment = Figment::from(Serialized::defaults(AppSettings::default()));
    if path.exists() {
        figment = figment.merge(Json::file(path));
    }
    figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

    match figment.extract::<AppSettings>() {
        Ok(settings) => settings.normalized(),
        Err(error) => {
            tracing::warn!(path = ?path, error = %error, "failed to parse settings; using defaults");
            AppSettings::default()
        }
    }
}

fn persist(path: &Path, settings: &AppSettings) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context(CreateDirSnafu {
            stage: "create-settings-directory",
            path: parent.to_path_buf(),
        })?;
    }

    let content = serde_json::to_string_pretty(settings).context(SerializeConfigSnafu {
        stage: "serialize-settings-json",
    })?;

    let temp_path = path.with_extension("json.tmp");
    std::fs::write(&temp_path, content).context(WriteFileSnafu {
        stage: "write-temporary-settings-file",
        path: temp_path.clone(),
    })?;

    std::fs::rename(&temp_path, path).context(RenameTempFileSnafu {
        stage: "rename-temporary-settings-file",
        from: temp_path,
        to: path.to_path_buf(),
    })?;

    tracing::info!(path = ?path, "saved settings");
    Ok(())
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

fn non_blank_or(value: &str, fallback: fn() -> String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback()
    } else {
        trimmed.to_string()
    }
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_socket_url() -> String {
    DEFAULT_SOCKET_URL.to_string()
}

fn default_classifier_url() -> String {
    DEFAULT_CLASSIFIER_URL.to_string()
}

fn default_session_file() -> PathBuf {
    SettingsStore::default_config_dir().join(SESSION_FILE_NAME)
}

fn default_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

fn default_sample_size() -> usize {
    DEFAULT_SAMPLE_SIZE
}
