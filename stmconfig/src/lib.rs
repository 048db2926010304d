//! # Streamus Configuration Module
//!
//! This module provides configuration management for Streamus, including:
//! - Loading configuration from YAML files
//! - Merging with embedded default configuration
//! - Environment variable overrides
//! - Type-safe getters and setters for configuration values
//!
//! There is no global instance: a [`Config`] is built once at start-up and
//! handed down to the components that need it.
//!
//! ## Usage
//!
//! ```no_run
//! use stmconfig::Config;
//!
//! let config = Config::load_config("")?;
//!
//! // Access configuration values
//! let server = config.server_url();
//! let quiet = config.get_title_debounce_ms()?;
//!
//! // Update configuration values
//! config.set_show_tooltips(false)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{anyhow, Result};
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::{Mutex, MutexGuard, PoisonError},
};
use tracing::info;
use uuid::Uuid;

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("streamus.yaml");

const ENV_CONFIG_DIR: &str = "STREAMUS_CONFIG";
const ENV_PREFIX: &str = "STREAMUS_CONFIG__";

/// Server used when `server.local_debug` is set
pub const LOCAL_DEBUG_SERVER_URL: &str = "http://localhost:61975/";
/// Production server
pub const DEFAULT_SERVER_URL: &str = "http://streamus.apphb.com/";

// Default values for configuration
const DEFAULT_TITLE_DEBOUNCE_MS: u64 = 2000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_REQUEST_MAX_RETRIES: u64 = 2;
const DEFAULT_SHOW_TOOLTIPS: bool = true;
const DEFAULT_REMIND_CLEAR_STREAM: bool = true;
const DEFAULT_REMIND_DELETE_PLAYLIST: bool = true;
const DEFAULT_SHOW_TIME_REMAINING: bool = false;
const DEFAULT_LOCAL_DEBUG: bool = false;
const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";

/// Macro to generate getter/setter for u64 values with default
macro_rules! impl_u64_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<u64> {
            match self.get_value($path) {
                Ok(Value::Number(n)) => Ok(n.as_u64().unwrap_or($default)),
                Ok(Value::String(s)) => Ok(s.trim().parse().unwrap_or($default)),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: u64) -> Result<()> {
            self.set_value($path, Value::Number(Number::from(value)))
        }
    };
}

/// Macro to generate getter/setter for bool values with default
macro_rules! impl_bool_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> bool {
            match self.get_value($path) {
                Ok(Value::Bool(b)) => b,
                _ => $default,
            }
        }

        pub fn $setter(&self, value: bool) -> Result<()> {
            self.set_value($path, Value::Bool(value))
        }
    };
}

/// Playback quality requested from the video provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestedQuality {
    #[default]
    Default,
    Small,
    Medium,
    Large,
    Hd720,
    Hd1080,
    Highres,
}

impl SuggestedQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestedQuality::Default => "default",
            SuggestedQuality::Small => "small",
            SuggestedQuality::Medium => "medium",
            SuggestedQuality::Large => "large",
            SuggestedQuality::Hd720 => "hd720",
            SuggestedQuality::Hd1080 => "hd1080",
            SuggestedQuality::Highres => "highres",
        }
    }
}

impl fmt::Display for SuggestedQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SuggestedQuality {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(SuggestedQuality::Default),
            "small" => Ok(SuggestedQuality::Small),
            "medium" => Ok(SuggestedQuality::Medium),
            "large" => Ok(SuggestedQuality::Large),
            "hd720" => Ok(SuggestedQuality::Hd720),
            "hd1080" => Ok(SuggestedQuality::Hd1080),
            "highres" => Ok(SuggestedQuality::Highres),
            other => Err(anyhow!("Unknown quality '{}'", other)),
        }
    }
}

/// Configuration manager for Streamus
///
/// This structure manages the application configuration, including:
/// - Loading configuration from YAML files
/// - Merging with default configuration
/// - Handling environment variable overrides
/// - Providing typed getters/setters for configuration values
///
/// Every value has a documented fallback, so a missing or malformed entry
/// never prevents start-up.
#[derive(Debug)]
pub struct Config {
    config_dir: Option<PathBuf>,
    path: Option<PathBuf>,
    data: Mutex<Value>,
}

// Implémentation manuelle de Clone
impl Clone for Config {
    fn clone(&self) -> Self {
        let data = self.data().clone();
        Self {
            config_dir: self.config_dir.clone(),
            path: self.path.clone(),
            data: Mutex::new(data),
        }
    }
}

impl Config {
    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> PathBuf {
        // 1. Try provided directory
        if !directory.is_empty() {
            return PathBuf::from(directory);
        }

        // 2. Try environment variable
        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return PathBuf::from(env_path);
        }

        // 3. Try current directory
        if Path::new(".streamus").exists() {
            return PathBuf::from(".streamus");
        }

        // 4. Try home directory
        if let Some(home) = home_dir() {
            let home_config = home.join(".streamus");
            if home_config.exists() {
                return home_config;
            }
        }

        // Default fallback
        PathBuf::from(".streamus")
    }

    /// Validates and prepares a config directory
    fn validate_config_dir(path: &Path) -> Result<()> {
        // Create if doesn't exist
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        // Verify it's a directory
        if !path.is_dir() {
            return Err(anyhow!("{} is not a directory", path.display()));
        }

        // Test write permission
        let test_file = path.join(".write_test");
        fs::write(&test_file, b"test")?;
        fs::remove_file(&test_file)?;

        Ok(())
    }

    /// Determines and validates the configuration directory
    ///
    /// The directory is searched in the following order:
    /// 1. The provided `directory` parameter if not empty
    /// 2. The `STREAMUS_CONFIG` environment variable
    /// 3. `.streamus` in the current directory
    /// 4. `.streamus` in the user's home directory
    ///
    /// The directory is created if it doesn't exist, and validated for write permission.
    pub fn config_dir(directory: &str) -> Result<PathBuf> {
        let dir_path = Self::find_config_dir(directory);
        Self::validate_config_dir(&dir_path)?;
        Ok(dir_path)
    }

    /// Loads the configuration from the specified directory
    ///
    /// This method:
    /// 1. Determines the configuration directory
    /// 2. Loads the default embedded configuration
    /// 3. Merges it with the external config.yaml file if present
    /// 4. Applies environment variable overrides
    /// 5. Saves the merged configuration
    ///
    /// # Arguments
    ///
    /// * `directory` - The directory containing the config.yaml file, or empty to use defaults
    pub fn load_config(directory: &str) -> Result<Self> {
        // Obtenir le répertoire de configuration
        let config_dir = Self::config_dir(directory)?;
        info!(config_dir = %config_dir.display(), "Using config directory");

        let path = config_dir.join("config.yaml");

        // Charger la configuration par défaut
        let mut config_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        // Essayer de charger le fichier de configuration
        match fs::read(&path) {
            Ok(data) => {
                info!(config_file = %path.display(), "Loaded config file");
                let external_value: Value = serde_yaml::from_slice(&data)?;
                merge_yaml(&mut config_value, &Self::lower_keys_value(external_value));
            }
            Err(_) => {
                info!(
                    config_file = %path.display(),
                    "Config file not found, using default embedded config"
                );
            }
        }

        let mut config_value = Self::lower_keys_value(config_value);

        // Appliquer les overrides depuis les variables d'environnement
        Self::apply_env_overrides(&mut config_value, env::vars());

        let config = Config {
            config_dir: Some(config_dir),
            path: Some(path),
            data: Mutex::new(config_value),
        };

        config.save()?;
        Ok(config)
    }

    /// Builds a configuration from the embedded defaults only
    ///
    /// Nothing is read from or written to disk, and environment variables
    /// are ignored.
    pub fn in_memory() -> Result<Self> {
        let value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;
        Ok(Config {
            config_dir: None,
            path: None,
            data: Mutex::new(Self::lower_keys_value(value)),
        })
    }

    /// Directory the configuration was loaded from, if any
    pub fn directory(&self) -> Option<&Path> {
        self.config_dir.as_deref()
    }

    fn data(&self) -> MutexGuard<'_, Value> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Saves the current configuration to the config.yaml file
    ///
    /// In-memory configurations are never written.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let yaml = serde_yaml::to_string(&*self.data())?;
        fs::write(path, yaml)?;
        Ok(())
    }

    /// Sets a configuration value at the specified path and saves it
    ///
    /// # Arguments
    ///
    /// * `path` - Array of keys representing the path (e.g., `&["user", "show_tooltips"]`)
    /// * `value` - The YAML value to set
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        {
            let mut data = self.data();
            Self::set_value_internal(&mut data, path, value)?;
        }
        self.save()
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        if path.is_empty() {
            *data = value;
            return Ok(());
        }
        if let Value::Mapping(map) = data {
            let key_value = Value::String(path[0].to_lowercase());
            if path.len() == 1 {
                map.insert(key_value, value);
            } else {
                let entry = map
                    .entry(key_value)
                    .or_insert(Value::Mapping(Mapping::new()));
                Self::set_value_internal(entry, &path[1..], value)?;
            }
            Ok(())
        } else {
            Err(anyhow!("Current node is not a map"))
        }
    }

    /// Gets a configuration value at the specified path
    ///
    /// Returns an error if the path doesn't exist.
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.data();
        Self::get_value_internal(&data, path)
    }

    fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
        let mut current = data;
        for (i, key) in path.iter().enumerate() {
            if let Value::Mapping(map) = current {
                match map.get(&Value::String(key.to_lowercase())) {
                    Some(next) => current = next,
                    None => return Err(anyhow!("Path {} does not exist", path[..=i].join("."))),
                }
            } else {
                return Err(anyhow!("Path {} is not a mapping", path[..i].join(".")));
            }
        }
        Ok(current.clone())
    }

    fn apply_env_overrides<I>(config: &mut Value, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                let key_path = stripped.split("__").collect::<Vec<_>>();
                let yaml_value = Self::convert_env_value(&value);
                if let Err(e) = Self::set_value_internal(config, &key_path, yaml_value) {
                    tracing::warn!(variable = %key, "Ignoring config override: {}", e);
                }
            }
        }
    }

    fn convert_env_value(value: &str) -> Value {
        serde_yaml::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()))
    }

    fn lower_keys_value(value: Value) -> Value {
        match value {
            Value::Mapping(map) => {
                let mut new_map = Mapping::new();
                for (k, v) in map {
                    let new_key = match k {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    new_map.insert(new_key, Self::lower_keys_value(v));
                }
                Value::Mapping(new_map)
            }
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            _ => value,
        }
    }

    fn get_string(&self, path: &[&str]) -> Option<String> {
        match self.get_value(path) {
            Ok(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    impl_bool_config!(
        get_local_debug,
        set_local_debug,
        &["server", "local_debug"],
        DEFAULT_LOCAL_DEBUG
    );

    /// Base URL of the remote store, always ending with `/`
    ///
    /// An explicit `server.url` wins; otherwise the local debug server or
    /// the production server is used depending on `server.local_debug`.
    pub fn server_url(&self) -> String {
        let url = match self.get_string(&["server", "url"]) {
            Some(url) if !url.trim().is_empty() => url.trim().to_string(),
            _ if self.get_local_debug() => LOCAL_DEBUG_SERVER_URL.to_string(),
            _ => DEFAULT_SERVER_URL.to_string(),
        };

        if url.ends_with('/') {
            url
        } else {
            format!("{}/", url)
        }
    }

    pub fn set_server_url(&self, url: String) -> Result<()> {
        self.set_value(&["server", "url"], Value::String(url))
    }

    impl_u64_config!(
        get_request_timeout_secs,
        set_request_timeout_secs,
        &["server", "request_timeout_secs"],
        DEFAULT_REQUEST_TIMEOUT_SECS
    );

    impl_u64_config!(
        get_request_max_retries,
        set_request_max_retries,
        &["server", "request_max_retries"],
        DEFAULT_REQUEST_MAX_RETRIES
    );

    impl_u64_config!(
        get_title_debounce_ms,
        set_title_debounce_ms,
        &["sync", "title_debounce_ms"],
        DEFAULT_TITLE_DEBOUNCE_MS
    );

    /// Gets the suggested playback quality, `default` when unset or unknown
    pub fn suggested_quality(&self) -> SuggestedQuality {
        match self.get_string(&["user", "suggested_quality"]) {
            Some(s) => s.parse().unwrap_or_else(|e| {
                tracing::warn!("{}, using default quality", e);
                SuggestedQuality::Default
            }),
            None => SuggestedQuality::Default,
        }
    }

    pub fn set_suggested_quality(&self, quality: SuggestedQuality) -> Result<()> {
        self.set_value(
            &["user", "suggested_quality"],
            Value::String(quality.as_str().to_string()),
        )
    }

    /// Gets the user identifier
    ///
    /// Empty values and the all-zero UUID both mean "no user yet".
    pub fn user_id(&self) -> Option<Uuid> {
        let raw = self.get_string(&["user", "id"])?;
        match Uuid::parse_str(raw.trim()) {
            Ok(id) if !id.is_nil() => Some(id),
            Ok(_) => None,
            Err(e) => {
                if !raw.trim().is_empty() {
                    tracing::warn!(user_id = %raw, "Invalid user id in configuration: {}", e);
                }
                None
            }
        }
    }

    pub fn set_user_id(&self, user_id: Option<Uuid>) -> Result<()> {
        let value = user_id.map(|id| id.to_string()).unwrap_or_default();
        self.set_value(&["user", "id"], Value::String(value))
    }

    impl_bool_config!(
        get_show_tooltips,
        set_show_tooltips,
        &["user", "show_tooltips"],
        DEFAULT_SHOW_TOOLTIPS
    );

    impl_bool_config!(
        get_remind_clear_stream,
        set_remind_clear_stream,
        &["user", "remind_clear_stream"],
        DEFAULT_REMIND_CLEAR_STREAM
    );

    impl_bool_config!(
        get_remind_delete_playlist,
        set_remind_delete_playlist,
        &["user", "remind_delete_playlist"],
        DEFAULT_REMIND_DELETE_PLAYLIST
    );

    impl_bool_config!(
        get_show_time_remaining,
        set_show_time_remaining,
        &["user", "show_time_remaining"],
        DEFAULT_SHOW_TIME_REMAINING
    );

    /// Last search typed by the user, empty by default
    pub fn search_query(&self) -> String {
        self.get_string(&["user", "search_query"]).unwrap_or_default()
    }

    pub fn set_search_query(&self, query: String) -> Result<()> {
        self.set_value(&["user", "search_query"], Value::String(query))
    }

    /// Récupère le niveau de log minimum depuis la configuration
    pub fn get_log_min_level(&self) -> String {
        self.get_string(&["host", "logger", "min_level"])
            .unwrap_or_else(|| DEFAULT_LOG_MIN_LEVEL.to_string())
    }

    /// Définit le niveau de log minimum dans la configuration
    pub fn set_log_min_level(&self, level: String) -> Result<()> {
        self.set_value(&["host", "logger", "min_level"], Value::String(level))
    }
}

/// Merges external YAML configuration into default configuration
///
/// This function recursively merges two YAML value trees:
/// - For mappings (objects), it merges keys from external into default
/// - For scalars and sequences, external values replace default values
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(), // pour les scalaires ou séquences, on remplace
    }
}
