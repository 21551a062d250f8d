use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_BIND_HOST, DEFAULT_PORT};
use crate::error::{BridgeError, Result};

/// Resolves the listen port from the raw `-jsbridge` argument.
///
/// Parsing follows the host's permissive integer parse: leading whitespace and
/// a `+` sign are skipped and the leading digit run is used, so `"4444abc"`
/// yields 4444. Anything that does not produce a usable port falls back to
/// [`DEFAULT_PORT`].
pub fn resolve_port(raw: Option<&str>) -> u16 {
    let Some(raw) = raw else {
        return DEFAULT_PORT;
    };

    let trimmed = raw.trim_start();
    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let digits_end = unsigned
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(unsigned.len());

    match unsigned[..digits_end].parse::<u16>() {
        Ok(port) if port > 0 => port,
        _ => DEFAULT_PORT,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServerConfig {
    pub port: u16,
    pub default_port: u16,
}

impl ServerConfig {
    pub fn from_raw(raw: Option<&str>) -> Self {
        Self {
            port: resolve_port(raw),
            default_port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportPolicy {
    /// Preferred transport first, fallback on construction failure.
    #[default]
    Auto,
    /// Skip the preferred transport entirely.
    FallbackOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct BridgeConfig {
    pub host: IpAddr,
    /// Raw port argument; resolved lazily through [`resolve_port`].
    /// TOML may carry it as an integer or a string.
    #[serde(deserialize_with = "deserialize_raw_port")]
    pub port: Option<String>,
    pub log_file: Option<PathBuf>,
    pub transport: TransportPolicy,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPort {
    Int(i64),
    Str(String),
}

fn deserialize_raw_port<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<RawPort>::deserialize(deserializer)?.map(|raw| match raw {
        RawPort::Int(n) => n.to_string(),
        RawPort::Str(s) => s,
    }))
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_BIND_HOST
                .parse()
                .unwrap_or(IpAddr::from([127, 0, 0, 1])),
            port: None,
            log_file: None,
            transport: TransportPolicy::Auto,
        }
    }
}

impl BridgeConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BridgeError::Config {
            message: format!("Failed to read {}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::from_raw(self.port.as_deref())
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.server_config().port)
    }
}
