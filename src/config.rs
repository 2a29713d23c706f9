// src/config.rs
use governor::Quota;
use ipnetwork::IpNetwork;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::charset::Charset;
use crate::models::server::{AddressError, ServerAddress, ServerConfig};

pub const DEFAULT_CACHING_DELAY: i64 = 10;
pub const DEFAULT_TIMEOUT_DELAY: i64 = 3;
pub const DEFAULT_CONNECT_TIMEOUT: i64 = 3;
pub const DEFAULT_LOCK_TIMEOUT: i64 = 10;
pub const DEFAULT_BACKGROUND_OPACITY: u8 = 50;
pub const DEFAULT_BACKGROUND_BLUR_RADIUS: u8 = 5;
pub const MAX_BLUR_RADIUS: u8 = 10;
pub const DEFAULT_CHARSET: &str = "Windows-1252";
pub const DEFAULT_ABOUT_PAGE_URI: &str = "/about";
pub const DEFAULT_ABOUT_PAGE_TITLE: &str = "About";

/// Stock opacity for levelshots that are brighter or busier than the rest.
const DEFAULT_OPACITY_PER_MAP: [(&str, u8); 22] = [
    ("mp/ctf2", 40),
    ("mp/ctf5", 40),
    ("mp/duel6", 40),
    ("mp/duel9", 40),
    ("mp/ffa5", 40),
    ("mp/siege_desert", 40),
    ("mp/siege_hoth", 40),
    ("mp/siege_korriban", 30),
    ("academy3", 30),
    ("academy4", 30),
    ("hoth2", 40),
    ("kor2", 40),
    ("t1_sour", 40),
    ("t1_surprise", 40),
    ("t2_dpred", 40),
    ("t2_trip", 40),
    ("t2_wedge", 40),
    ("t3_hevil", 40),
    ("taspir2", 40),
    ("vjun2", 40),
    ("yavin1", 40),
    ("yavin1b", 40),
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read the config file \"{path}\": {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("\"{field}\" {reason}")]
    InvalidField { field: String, reason: String },
    #[error("\"servers\" must contain at least 1 server")]
    NoServers,
    #[error("servers[{index}].address: {source}")]
    InvalidAddress { index: usize, source: AddressError },
    #[error("servers[{index}].charset: unsupported charset \"{charset}\"")]
    UnsupportedCharset { index: usize, charset: String },
    #[error("URI \"{0}\" is used more than once")]
    DuplicateUri(String),
}

impl ConfigError {
    fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Config file layout, before validation.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub caching_delay: Option<i64>,
    pub timeout_delay: Option<i64>,
    pub connect_timeout: Option<i64>,
    pub lock_timeout: Option<i64>,
    pub root_url: Option<String>,
    pub enable_landing_page: Option<bool>,
    pub landing_page_uri: Option<String>,
    pub enable_about_page: Option<bool>,
    pub about_page_uri: Option<String>,
    pub about_page_title: Option<String>,
    pub canonical_url: Option<String>,
    pub cache_dir: Option<PathBuf>,
    pub public_dir: Option<PathBuf>,
    pub default_background_opacity: Option<i64>,
    pub default_background_blur_radius: Option<i64>,
    pub background_opacity: Option<HashMap<String, i64>>,
    pub background_blur_radius: Option<HashMap<String, i64>>,
    pub rate_limit_period_secs: Option<u64>,
    pub rate_limit_burst: Option<u32>,
    pub trusted_proxies: Option<Vec<String>>,
    #[serde(default)]
    pub servers: Vec<RawServer>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawServer {
    pub uri: Option<String>,
    pub address: Option<String>,
    pub name: Option<String>,
    pub subtitle: Option<String>,
    pub charset: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Zero disables caching
    pub caching_delay: Duration,
    pub timeout_delay: Duration,
    pub connect_timeout: Duration,
    /// Always longer than `connect_timeout + timeout_delay`, so a waiter
    /// outlives the query it waits for
    pub lock_timeout: Duration,
    /// Asset URL prefix, without trailing slash
    pub root_url: String,
    pub landing_page_enabled: bool,
    pub landing_page_uri: String,
    pub about_page_enabled: bool,
    pub about_page_uri: String,
    pub about_page_title: String,
    /// Site root for OpenGraph tags, without trailing slash. `None` disables them.
    pub canonical_url: Option<String>,
    pub cache_dir: PathBuf,
    pub public_dir: PathBuf,
    pub default_background_opacity: u8,
    pub default_background_blur_radius: u8,
    pub background_opacity: HashMap<String, u8>,
    pub background_blur_radius: HashMap<String, u8>,
    /// `None` disables rate limiting
    pub rate_limit: Option<Quota>,
    /// Peers allowed to set `X-Forwarded-For`
    pub trusted_proxies: Vec<IpNetwork>,
    pub servers: Vec<ServerConfig>,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(json)?;
        Self::try_from(raw)
    }

    /// Opacity percentage for a levelshot ("default" for the default image).
    pub fn background_opacity(&self, map_name: &str) -> u8 {
        self.background_opacity
            .get(map_name)
            .copied()
            .unwrap_or(self.default_background_opacity)
    }

    pub fn background_blur_radius(&self, map_name: &str) -> u8 {
        self.background_blur_radius
            .get(map_name)
            .copied()
            .unwrap_or(self.default_background_blur_radius)
    }

    pub fn levelshots_dir(&self) -> PathBuf {
        self.public_dir.join("levelshots")
    }

    pub fn caching_enabled(&self) -> bool {
        !self.caching_delay.is_zero()
    }

    pub fn server_by_uri(&self, uri: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|server| server.uri == uri)
    }
}

impl TryFrom<RawConfig> for Config {
    type Error = ConfigError;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        let caching_delay = seconds("caching_delay", raw.caching_delay, DEFAULT_CACHING_DELAY, 0)?;
        let timeout_delay = seconds("timeout_delay", raw.timeout_delay, DEFAULT_TIMEOUT_DELAY, 1)?;
        let connect_timeout =
            seconds("connect_timeout", raw.connect_timeout, DEFAULT_CONNECT_TIMEOUT, 1)?;
        let query_budget = connect_timeout + timeout_delay;
        let lock_timeout = match raw.lock_timeout {
            None => Duration::from_secs(DEFAULT_LOCK_TIMEOUT as u64).max(query_budget + Duration::from_secs(1)),
            Some(secs) if secs > 0 && Duration::from_secs(secs as u64) > query_budget => {
                Duration::from_secs(secs as u64)
            }
            Some(secs) => {
                return Err(ConfigError::invalid(
                    "lock_timeout",
                    format!(
                        "must be greater than connect_timeout + timeout_delay ({}s, got {secs})",
                        query_budget.as_secs()
                    ),
                ))
            }
        };

        let default_background_opacity = bounded(
            "default_background_opacity",
            raw.default_background_opacity,
            DEFAULT_BACKGROUND_OPACITY,
            100,
        )?;
        let default_background_blur_radius = bounded(
            "default_background_blur_radius",
            raw.default_background_blur_radius,
            DEFAULT_BACKGROUND_BLUR_RADIUS,
            MAX_BLUR_RADIUS,
        )?;

        let background_opacity = match raw.background_opacity {
            Some(table) => bounded_table("background_opacity", table, 100)?,
            None => DEFAULT_OPACITY_PER_MAP
                .iter()
                .map(|(map, opacity)| (map.to_string(), *opacity))
                .collect(),
        };
        let background_blur_radius = match raw.background_blur_radius {
            Some(table) => bounded_table("background_blur_radius", table, MAX_BLUR_RADIUS)?,
            None => HashMap::new(),
        };

        if raw.servers.is_empty() {
            return Err(ConfigError::NoServers);
        }
        let server_count = raw.servers.len();
        let servers = raw
            .servers
            .into_iter()
            .enumerate()
            .map(|(index, server)| build_server(index, server, server_count))
            .collect::<Result<Vec<_>, _>>()?;

        let landing_page_enabled = raw.enable_landing_page.unwrap_or(server_count > 1);
        let landing_page_uri = raw.landing_page_uri.unwrap_or_else(|| "/".to_string());
        if !landing_page_uri.starts_with('/') {
            return Err(ConfigError::invalid("landing_page_uri", "must start with \"/\""));
        }

        let about_page_enabled = raw.enable_about_page.unwrap_or(false);
        let about_page_uri = raw
            .about_page_uri
            .unwrap_or_else(|| DEFAULT_ABOUT_PAGE_URI.to_string());
        if !about_page_uri.starts_with('/') {
            return Err(ConfigError::invalid("about_page_uri", "must start with \"/\""));
        }

        let canonical_url = match raw.canonical_url {
            None => None,
            Some(url) if url.starts_with("https://") || url.starts_with("http://") => {
                Some(url.trim_end_matches('/').to_string())
            }
            Some(_) => {
                return Err(ConfigError::invalid(
                    "canonical_url",
                    "must start with \"http://\" or \"https://\"",
                ))
            }
        };

        let trusted_proxies = raw
            .trusted_proxies
            .unwrap_or_default()
            .iter()
            .enumerate()
            .map(|(index, proxy)| {
                proxy.trim().parse::<IpNetwork>().map_err(|e| {
                    ConfigError::invalid(format!("trusted_proxies[{index}]"), format!("{e} (got \"{proxy}\")"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen = HashSet::new();
        let landing = landing_page_enabled.then_some(landing_page_uri.as_str());
        let about = about_page_enabled.then_some(about_page_uri.as_str());
        for uri in servers.iter().map(|s| s.uri.as_str()).chain(landing).chain(about) {
            if !seen.insert(uri) {
                return Err(ConfigError::DuplicateUri(uri.to_string()));
            }
        }

        let rate_limit_burst = raw.rate_limit_burst.unwrap_or(30);
        let rate_limit = match NonZeroU32::new(rate_limit_burst) {
            None => None,
            Some(burst) => {
                let period = Duration::from_secs(raw.rate_limit_period_secs.unwrap_or(1));
                let quota = Quota::with_period(period)
                    .ok_or_else(|| ConfigError::invalid("rate_limit_period_secs", "must be >= 1"))?;
                Some(quota.allow_burst(burst))
            }
        };

        Ok(Self {
            caching_delay,
            timeout_delay,
            connect_timeout,
            lock_timeout,
            root_url: raw.root_url.unwrap_or_default().trim_end_matches('/').to_string(),
            landing_page_enabled,
            landing_page_uri,
            about_page_enabled,
            about_page_uri,
            about_page_title: raw
                .about_page_title
                .unwrap_or_else(|| DEFAULT_ABOUT_PAGE_TITLE.to_string()),
            canonical_url,
            cache_dir: raw.cache_dir.unwrap_or_else(|| PathBuf::from("var/cache")),
            public_dir: raw.public_dir.unwrap_or_else(|| PathBuf::from("public")),
            default_background_opacity,
            default_background_blur_radius,
            background_opacity,
            background_blur_radius,
            rate_limit,
            trusted_proxies,
            servers,
        })
    }
}

fn seconds(field: &str, value: Option<i64>, default: i64, min: i64) -> Result<Duration, ConfigError> {
    let value = value.unwrap_or(default);
    if value < min {
        return Err(ConfigError::invalid(field, format!("must be >= {min} (got {value})")));
    }
    Ok(Duration::from_secs(value as u64))
}

fn bounded(field: &str, value: Option<i64>, default: u8, max: u8) -> Result<u8, ConfigError> {
    let value = value.unwrap_or(default as i64);
    if !(0..=max as i64).contains(&value) {
        return Err(ConfigError::invalid(field, format!("must be within [0-{max}] (got {value})")));
    }
    Ok(value as u8)
}

fn bounded_table(
    field: &str,
    table: HashMap<String, i64>,
    max: u8,
) -> Result<HashMap<String, u8>, ConfigError> {
    table
        .into_iter()
        .map(|(map, value)| {
            let value = bounded(&format!("{field}.{map}"), Some(value), 0, max)?;
            Ok((map.to_lowercase(), value))
        })
        .collect()
}

fn build_server(index: usize, raw: RawServer, server_count: usize) -> Result<ServerConfig, ConfigError> {
    let uri = match raw.uri {
        Some(uri) => uri,
        None if server_count > 1 => {
            return Err(ConfigError::invalid(
                format!("servers[{index}].uri"),
                "is required when multiple servers are configured",
            ))
        }
        None => "/".to_string(),
    };
    if !uri.starts_with('/') {
        return Err(ConfigError::invalid(format!("servers[{index}].uri"), "must start with \"/\""));
    }

    let address: ServerAddress = raw
        .address
        .ok_or_else(|| ConfigError::invalid(format!("servers[{index}].address"), "is required"))?
        .parse()
        .map_err(|source| ConfigError::InvalidAddress { index, source })?;

    let charset_label = raw.charset.unwrap_or_else(|| DEFAULT_CHARSET.to_string());
    let charset = Charset::for_label(&charset_label).ok_or(ConfigError::UnsupportedCharset {
        index,
        charset: charset_label,
    })?;

    Ok(ServerConfig {
        uri,
        name: raw.name.unwrap_or_else(|| address.as_str().to_string()),
        subtitle: raw.subtitle.map(|s| s.trim().to_string()).unwrap_or_default(),
        address,
        charset,
    })
}
