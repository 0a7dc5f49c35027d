// src/config.rs
use lazy_static::lazy_static;
use log::{info, warn};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::aggregator::DEFAULT_MAX_CONCURRENT_PROBES;
use crate::discord::{DEFAULT_API_BASE, DEFAULT_REQUEST_TIMEOUT};
use crate::models::server::{Category, EndpointDescriptor};
use crate::presenter::{Branding, DEFAULT_TITLE};

const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 30;
const DEFAULT_PROBE_TIMEOUT_MS: u64 = 2000;
const DEFAULT_THUMBNAIL_URL: &str =
    "https://upload.wikimedia.org/wikipedia/commons/thumb/d/d9/Flag_of_Norway.svg/320px-Flag_of_Norway.svg.png";

/// Searched in order when `CONFIG_PATH` is not set.
pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["/data/config.json", "config.json"];

const DEFAULT_CATEGORY_ORDER: [&str; 3] = ["Drift", "Touge", "Track"];

const DEFAULT_SERVERS: [(&str, u16, &str); 10] = [
    ("ABSA Drift#1 | Rotating Maps | BDC 4.0", 8081, "Drift"),
    ("ABSA Drift#2 | Rotating Maps | Gravy Garage", 8082, "Drift"),
    ("ABSA Drift#3 | Rotating Maps | SWARM 3.2", 8083, "Drift"),
    ("ABSA Drift#4 | Rotating Maps | SWARM 3.2", 8084, "Drift"),
    ("ABSA Drift#8 | Rotating Maps | SWARM 3.2 Touge", 8088, "Drift"),
    ("ABSA Race#6 | Touge FAST Lap", 8086, "Touge"),
    ("ABSA Race#5 | Nordschleife Tourist FAST Lap", 8085, "Track"),
    ("ABSA GoKart#7 | Rotating Maps |", 8087, "Track"),
    ("ABSA SRP#9 | SRP Traffic|", 8089, "Track"),
    ("ABSA SRP#10 | SRP Traffic|", 8090, "Track"),
];

lazy_static! {
    static ref DEFAULT_CATEGORY_EMOJIS: HashMap<&'static str, &'static str> =
        HashMap::from([("Drift", "🟣"), ("Touge", "🟠"), ("Track", "🔵")]);
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),
    #[error("invalid {field}: {reason}")]
    Invalid { field: String, reason: String },
    #[error("failed to read config from {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config from {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.into(),
        reason: reason.into(),
    }
}

/// Optional JSON server list. Every key may be omitted.
#[derive(Debug, Default, Deserialize)]
pub struct ServerFile {
    #[serde(default)]
    pub server_ip: Option<String>,
    #[serde(default)]
    pub update_interval: Option<u64>,
    #[serde(default)]
    pub category_order: Option<Vec<Category>>,
    #[serde(default)]
    pub category_emojis: Option<HashMap<Category, String>>,
    #[serde(default)]
    pub servers: Option<Vec<ServerEntry>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerEntry {
    pub name: String,
    #[serde(default)]
    pub ip: Option<String>,
    pub port: u32,
    pub category: Category,
}

#[derive(Clone)]
pub struct Config {
    pub discord_token: String,
    pub channel_id: u64,
    pub server_ip: String,
    pub discord_api_base: String,
    pub discord_timeout_secs: u64,

    // Cycle tuning
    pub update_interval_secs: u64,
    pub probe_timeout_ms: u64,
    pub max_concurrent_probes: usize,
    pub cleanup_on_start: bool,

    // Presentation
    pub title: String,
    pub branding: Branding,
    pub compact_layout: bool,
    pub category_order: Vec<Category>,
    pub category_emojis: HashMap<Category, String>,

    pub servers: Vec<Arc<EndpointDescriptor>>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("channel_id", &self.channel_id)
            .field("server_ip", &self.server_ip)
            .field("discord_api_base", &self.discord_api_base)
            .field("discord_timeout_secs", &self.discord_timeout_secs)
            .field("update_interval_secs", &self.update_interval_secs)
            .field("probe_timeout_ms", &self.probe_timeout_ms)
            .field("max_concurrent_probes", &self.max_concurrent_probes)
            .field("cleanup_on_start", &self.cleanup_on_start)
            .field("title", &self.title)
            .field("compact_layout", &self.compact_layout)
            .field("category_order", &self.category_order)
            .field("servers", &self.servers.len())
            .finish()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed<T: FromStr>(value: Option<String>, key: &str) -> Option<T> {
    let raw = non_empty(value)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring unparseable {}={:?}", key, raw);
            None
        }
    }
}

fn parse_bool(value: Option<String>, key: &str, default: bool) -> bool {
    match non_empty(value).map(|v| v.to_ascii_lowercase()).as_deref() {
        None => default,
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        Some(other) => {
            warn!("Ignoring unparseable {}={:?}", key, other);
            default
        }
    }
}

/// Unset means "use the default"; set but empty means "disabled".
fn optional_url(value: Option<String>, default: String) -> Option<String> {
    match value {
        None => Some(default),
        Some(v) => non_empty(Some(v)),
    }
}

fn read_server_file(path: &Path) -> Result<ServerFile, ConfigError> {
    let data = std::fs::read(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&data).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// An explicit path must load. Default paths are tried in order and skipped
/// when unreadable, but a file that exists and fails to parse is an error.
fn load_server_file(
    explicit: Option<String>,
    default_paths: &[PathBuf],
) -> Result<Option<ServerFile>, ConfigError> {
    if let Some(path) = non_empty(explicit) {
        let path = PathBuf::from(path);
        let file = read_server_file(&path)?;
        info!("Loaded server list from {}", path.display());
        return Ok(Some(file));
    }

    for path in default_paths {
        match read_server_file(path) {
            Ok(file) => {
                info!("Loaded server list from {}", path.display());
                return Ok(Some(file));
            }
            Err(ConfigError::Read { .. }) => continue,
            Err(e) => return Err(e),
        }
    }

    info!("No server list file found, using built-in servers");
    Ok(None)
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let default_paths: Vec<PathBuf> = DEFAULT_CONFIG_PATHS.iter().map(PathBuf::from).collect();
        Self::from_source(|key| env::var(key).ok(), &default_paths)
    }

    /// Builds the configuration from a variable lookup and the server list
    /// file search path.
    pub fn from_source<F>(var: F, default_paths: &[PathBuf]) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let discord_token =
            non_empty(var("DISCORD_TOKEN")).ok_or(ConfigError::Missing("DISCORD_TOKEN"))?;

        let channel_raw = non_empty(var("CHANNEL_ID")).ok_or(ConfigError::Missing("CHANNEL_ID"))?;
        let channel_id = channel_raw
            .parse::<u64>()
            .ok()
            .filter(|id| *id > 0)
            .ok_or_else(|| invalid("CHANNEL_ID", format!("{:?} is not a channel id", channel_raw)))?;

        let file = load_server_file(var("CONFIG_PATH"), default_paths)?.unwrap_or_default();

        let server_ip = non_empty(var("SERVER_IP"))
            .or_else(|| non_empty(file.server_ip.clone()))
            .ok_or(ConfigError::Missing("SERVER_IP"))?;

        let update_interval_secs = parsed(var("UPDATE_INTERVAL_SECS"), "UPDATE_INTERVAL_SECS")
            .or(file.update_interval)
            .unwrap_or(DEFAULT_UPDATE_INTERVAL_SECS);

        let probe_timeout_ms = parsed(var("PROBE_TIMEOUT_MS"), "PROBE_TIMEOUT_MS")
            .unwrap_or(DEFAULT_PROBE_TIMEOUT_MS);

        let max_concurrent_probes = parsed(var("MAX_CONCURRENT_PROBES"), "MAX_CONCURRENT_PROBES")
            .unwrap_or(DEFAULT_MAX_CONCURRENT_PROBES);

        let discord_api_base =
            non_empty(var("DISCORD_API_BASE")).unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        let discord_timeout_secs = parsed(var("DISCORD_TIMEOUT_SECS"), "DISCORD_TIMEOUT_SECS")
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT.as_secs());

        let branding = Branding {
            thumbnail_url: optional_url(var("THUMBNAIL_URL"), DEFAULT_THUMBNAIL_URL.to_string()),
            image_url: optional_url(
                var("IMAGE_URL"),
                format!("http://{}/images/logo.png", server_ip),
            ),
        };

        let category_order = file.category_order.clone().unwrap_or_else(|| {
            DEFAULT_CATEGORY_ORDER.iter().map(|c| Category::from(*c)).collect()
        });

        let category_emojis = file.category_emojis.clone().unwrap_or_else(|| {
            DEFAULT_CATEGORY_EMOJIS
                .iter()
                .map(|(category, emoji)| (Category::from(*category), emoji.to_string()))
                .collect()
        });

        let entries = file.servers.clone().unwrap_or_else(|| {
            DEFAULT_SERVERS
                .iter()
                .map(|(name, port, category)| ServerEntry {
                    name: name.to_string(),
                    ip: None,
                    port: u32::from(*port),
                    category: Category::from(*category),
                })
                .collect()
        });

        let config = Self {
            discord_token,
            channel_id,
            discord_api_base,
            discord_timeout_secs,
            update_interval_secs,
            probe_timeout_ms,
            max_concurrent_probes,
            cleanup_on_start: parse_bool(var("CLEANUP_ON_START"), "CLEANUP_ON_START", true),
            title: non_empty(var("STATUS_TITLE")).unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            branding,
            compact_layout: parse_bool(var("COMPACT_LAYOUT"), "COMPACT_LAYOUT", false),
            servers: build_descriptors(&entries, &server_ip, &category_order)?,
            server_ip,
            category_order,
            category_emojis,
        };

        config.validate()?;
        info!(
            "Configuration validated: {} servers across {} categories",
            config.servers.len(),
            config.category_order.len()
        );
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.update_interval_secs < 1 {
            return Err(invalid("update interval", "must be at least 1 second"));
        }
        if self.probe_timeout_ms < 1 {
            return Err(invalid("probe timeout", "must be at least 1 millisecond"));
        }
        if self.discord_timeout_secs < 1 {
            return Err(invalid("DISCORD_TIMEOUT_SECS", "must be at least 1 second"));
        }
        if self.max_concurrent_probes < 1 {
            return Err(invalid("MAX_CONCURRENT_PROBES", "must be at least 1"));
        }
        if self.category_order.is_empty() {
            return Err(invalid("category_order", "cannot be empty"));
        }

        let mut seen = HashSet::new();
        for category in &self.category_order {
            if category.as_str().trim().is_empty() {
                return Err(invalid("category_order", "contains an empty category"));
            }
            if !seen.insert(category) {
                return Err(invalid(
                    "category_order",
                    format!("category '{}' is listed twice", category),
                ));
            }
            if !self.category_emojis.contains_key(category) {
                warn!("Category '{}' has no emoji, using the fallback", category);
            }
        }

        Ok(())
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn discord_timeout(&self) -> Duration {
        Duration::from_secs(self.discord_timeout_secs)
    }
}

fn build_descriptors(
    entries: &[ServerEntry],
    server_ip: &str,
    category_order: &[Category],
) -> Result<Vec<Arc<EndpointDescriptor>>, ConfigError> {
    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let name = entry.name.trim();
            if name.is_empty() {
                return Err(invalid(format!("server at index {}", i), "empty name"));
            }

            let port = u16::try_from(entry.port)
                .ok()
                .filter(|p| *p > 0)
                .ok_or_else(|| {
                    invalid(
                        format!("server '{}'", name),
                        format!("port {} outside 1-65535", entry.port),
                    )
                })?;

            if !category_order.contains(&entry.category) {
                return Err(invalid(
                    format!("server '{}'", name),
                    format!(
                        "category '{}' is not defined in category_order",
                        entry.category
                    ),
                ));
            }

            let address = non_empty(entry.ip.clone()).unwrap_or_else(|| server_ip.to_string());

            Ok(Arc::new(EndpointDescriptor {
                name: name.to_string(),
                address,
                port,
                category: entry.category.clone(),
            }))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![
            ("DISCORD_TOKEN", "token-abc"),
            ("CHANNEL_ID", "123456789012345678"),
            ("SERVER_IP", "203.0.113.7"),
        ]
    }

    fn temp_config(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "absa-status-{}-{}.json",
            name,
            std::process::id()
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn defaults_match_builtin_servers() {
        let config = Config::from_source(vars(&required()), &[]).unwrap();

        assert_eq!(config.channel_id, 123456789012345678);
        assert_eq!(config.update_interval(), Duration::from_secs(30));
        assert_eq!(config.probe_timeout(), Duration::from_secs(2));
        assert_eq!(config.discord_timeout(), Duration::from_secs(20));
        assert_eq!(config.servers.len(), 10);
        assert!(config.servers.iter().all(|s| s.address == "203.0.113.7"));
        assert_eq!(config.servers[5].name, "ABSA Race#6 | Touge FAST Lap");
        assert_eq!(config.servers[5].port, 8086);
        assert_eq!(
            config.category_order,
            vec![Category::from("Drift"), Category::from("Touge"), Category::from("Track")]
        );
        assert_eq!(config.category_emojis[&Category::from("Track")], "🔵");
        assert_eq!(
            config.branding.image_url.as_deref(),
            Some("http://203.0.113.7/images/logo.png")
        );
        assert_eq!(config.title, DEFAULT_TITLE);
        assert!(config.cleanup_on_start);
        assert!(!config.compact_layout);
    }

    #[test]
    fn missing_required_values_are_fatal() {
        for key in ["DISCORD_TOKEN", "CHANNEL_ID", "SERVER_IP"] {
            let pairs: Vec<_> = required().into_iter().filter(|(k, _)| *k != key).collect();
            let err = Config::from_source(vars(&pairs), &[]).unwrap_err();
            assert!(matches!(err, ConfigError::Missing(k) if k == key), "{key}: {err}");
        }
    }

    #[test]
    fn bad_channel_id_is_rejected() {
        let mut pairs = required();
        pairs[1] = ("CHANNEL_ID", "general");
        let err = Config::from_source(vars(&pairs), &[]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn optional_values_override_defaults() {
        let mut pairs = required();
        pairs.extend([
            ("UPDATE_INTERVAL_SECS", "60"),
            ("PROBE_TIMEOUT_MS", "750"),
            ("MAX_CONCURRENT_PROBES", "4"),
            ("DISCORD_TIMEOUT_SECS", "5"),
            ("CLEANUP_ON_START", "false"),
            ("COMPACT_LAYOUT", "yes"),
            ("THUMBNAIL_URL", ""),
            ("STATUS_TITLE", "Test Servers"),
        ]);
        let config = Config::from_source(vars(&pairs), &[]).unwrap();

        assert_eq!(config.update_interval_secs, 60);
        assert_eq!(config.probe_timeout(), Duration::from_millis(750));
        assert_eq!(config.max_concurrent_probes, 4);
        assert_eq!(config.discord_timeout(), Duration::from_secs(5));
        assert!(!config.cleanup_on_start);
        assert!(config.compact_layout);
        assert_eq!(config.branding.thumbnail_url, None);
        assert_eq!(config.title, "Test Servers");
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut pairs = required();
        pairs.push(("UPDATE_INTERVAL_SECS", "0"));
        assert!(Config::from_source(vars(&pairs), &[]).is_err());
    }

    #[test]
    fn zero_discord_timeout_is_rejected() {
        let mut pairs = required();
        pairs.push(("DISCORD_TIMEOUT_SECS", "0"));
        let err = Config::from_source(vars(&pairs), &[]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field, .. } if field == "DISCORD_TIMEOUT_SECS"));
    }

    #[test]
    fn server_file_supplies_servers_and_categories() {
        let path = temp_config(
            "file",
            r#"{
                "server_ip": "198.51.100.2",
                "update_interval": 45,
                "category_order": ["Race", "Drift"],
                "category_emojis": {"Race": "🏁"},
                "servers": [
                    {"name": "Drift A", "port": 9001, "category": "Drift"},
                    {"name": "Race A", "port": 9002, "category": "Race", "ip": "10.1.1.1"}
                ]
            }"#,
        );
        let pairs = [
            ("DISCORD_TOKEN", "token-abc"),
            ("CHANNEL_ID", "42"),
            ("CONFIG_PATH", path.to_str().unwrap()),
        ];
        let config = Config::from_source(vars(&pairs), &[]).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.server_ip, "198.51.100.2");
        assert_eq!(config.update_interval_secs, 45);
        assert_eq!(config.servers.len(), 2);
        assert_eq!(config.servers[0].address, "198.51.100.2");
        assert_eq!(config.servers[1].address, "10.1.1.1");
        assert_eq!(config.category_order[0].as_str(), "Race");
        assert!(!config.category_emojis.contains_key(&Category::from("Drift")));
    }

    #[test]
    fn default_paths_are_searched_in_order() {
        let path = temp_config(
            "search",
            r#"{"servers": [{"name": "Only", "port": 8081, "category": "Drift"}]}"#,
        );
        let missing = std::env::temp_dir().join("absa-status-does-not-exist.json");
        let config =
            Config::from_source(vars(&required()), &[missing, path.clone()]).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.servers.len(), 1);
        assert_eq!(config.servers[0].name, "Only");
    }

    #[test]
    fn unreadable_explicit_path_is_fatal() {
        let mut pairs = required();
        pairs.push(("CONFIG_PATH", "/nonexistent/absa/config.json"));
        let err = Config::from_source(vars(&pairs), &[]).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn malformed_file_is_fatal() {
        let path = temp_config("malformed", "{ not json");
        let mut pairs: Vec<(&str, &str)> = required();
        pairs.push(("CONFIG_PATH", path.to_str().unwrap()));
        let err = Config::from_source(vars(&pairs), &[]).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn invalid_servers_are_rejected() {
        let cases = [
            r#"{"servers": [{"name": "", "port": 8081, "category": "Drift"}]}"#,
            r#"{"servers": [{"name": "A", "port": 0, "category": "Drift"}]}"#,
            r#"{"servers": [{"name": "A", "port": 70000, "category": "Drift"}]}"#,
            r#"{"servers": [{"name": "A", "port": 8081, "category": "Rally"}]}"#,
            r#"{"category_order": [], "servers": []}"#,
            r#"{"category_order": ["Drift", "Drift"], "servers": []}"#,
        ];
        for (i, contents) in cases.iter().enumerate() {
            let path = temp_config(&format!("invalid-{}", i), contents);
            let mut pairs: Vec<(&str, &str)> = required();
            pairs.push(("CONFIG_PATH", path.to_str().unwrap()));
            let result = Config::from_source(vars(&pairs), &[]);
            std::fs::remove_file(&path).ok();
            assert!(
                matches!(result, Err(ConfigError::Invalid { .. })),
                "case {i} should be invalid"
            );
        }
    }

    #[test]
    fn debug_output_redacts_token() {
        let config = Config::from_source(vars(&required()), &[]).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("token-abc"));
        assert!(debug.contains("[REDACTED]"));
    }
}
