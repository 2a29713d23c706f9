// src/models/server.rs
use std::fmt;
use std::net::{IpAddr, Ipv6Addr};
use std::str::FromStr;
use thiserror::Error;

use crate::charset::Charset;

pub const DEFAULT_PORT: u16 = 29070;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,
    #[error("invalid port in \"{0}\"")]
    InvalidPort(String),
    #[error("\"{0}\" is neither an IP address nor a host name")]
    InvalidHost(String),
}

/// Game server address as written in the configuration (`host`, `host:port`,
/// `[v6]:port` or a bare IPv6 literal). The raw text is kept because it names
/// the server in logs and derives the cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    raw: String,
    host: String,
    port: u16,
}

impl ServerAddress {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Filesystem-safe token: lowercase, every character outside `[a-z0-9]`
    /// replaced by `-`.
    pub fn cache_key(&self) -> String {
        self.raw
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '-' })
            .collect()
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for ServerAddress {
    type Err = AddressError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AddressError::Empty);
        }

        let (host, port) = if let Some(rest) = trimmed.strip_prefix('[') {
            let (host, after) = rest
                .split_once(']')
                .ok_or_else(|| AddressError::InvalidHost(trimmed.to_string()))?;
            if host.parse::<Ipv6Addr>().is_err() {
                return Err(AddressError::InvalidHost(trimmed.to_string()));
            }
            let port = match after {
                "" => DEFAULT_PORT,
                _ => match after.strip_prefix(':') {
                    Some(port) => parse_port(port, trimmed)?,
                    None => return Err(AddressError::InvalidPort(trimmed.to_string())),
                },
            };
            (host.to_string(), port)
        } else if trimmed.parse::<Ipv6Addr>().is_ok() {
            (trimmed.to_string(), DEFAULT_PORT)
        } else {
            match trimmed.split_once(':') {
                Some((host, port)) => (host.to_string(), parse_port(port, trimmed)?),
                None => (trimmed.to_string(), DEFAULT_PORT),
            }
        };

        if host.parse::<IpAddr>().is_err() && !is_hostname(&host) {
            return Err(AddressError::InvalidHost(trimmed.to_string()));
        }

        Ok(Self {
            raw: trimmed.to_string(),
            host,
            port,
        })
    }
}

fn parse_port(port: &str, raw: &str) -> Result<u16, AddressError> {
    if port.is_empty() || port.len() > 5 || !port.chars().all(|c| c.is_ascii_digit()) {
        return Err(AddressError::InvalidPort(raw.to_string()));
    }
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(AddressError::InvalidPort(raw.to_string())),
        Ok(port) => Ok(port),
    }
}

fn is_hostname(host: &str) -> bool {
    if host.is_empty() || host.len() > 253 {
        return false;
    }
    host.trim_end_matches('.').split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

/// One configured game server. Immutable once the configuration is loaded.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub uri: String,
    pub address: ServerAddress,
    /// Display name, may contain color codes
    pub name: String,
    pub subtitle: String,
    pub charset: Charset,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port_is_appended() {
        let address: ServerAddress = "192.0.2.1".parse().unwrap();
        assert_eq!(address.host(), "192.0.2.1");
        assert_eq!(address.port(), DEFAULT_PORT);
        assert_eq!(address.as_str(), "192.0.2.1");
    }

    #[test]
    fn explicit_port_is_kept() {
        let address: ServerAddress = "jka.example.com:29071".parse().unwrap();
        assert_eq!(address.host(), "jka.example.com");
        assert_eq!(address.port(), 29071);
    }

    #[test]
    fn ipv6_forms() {
        let bare: ServerAddress = "2001:db8::1".parse().unwrap();
        assert_eq!(bare.host(), "2001:db8::1");
        assert_eq!(bare.port(), DEFAULT_PORT);

        let bracketed: ServerAddress = "[2001:db8::1]:29075".parse().unwrap();
        assert_eq!(bracketed.host(), "2001:db8::1");
        assert_eq!(bracketed.port(), 29075);
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!("".parse::<ServerAddress>(), Err(AddressError::Empty));
        assert!(matches!(
            "example.com:abc".parse::<ServerAddress>(),
            Err(AddressError::InvalidPort(_))
        ));
        assert!(matches!(
            "example.com:70000".parse::<ServerAddress>(),
            Err(AddressError::InvalidPort(_))
        ));
        assert!(matches!(
            "bad host!".parse::<ServerAddress>(),
            Err(AddressError::InvalidHost(_))
        ));
        assert!(matches!(
            "[not-v6]:29070".parse::<ServerAddress>(),
            Err(AddressError::InvalidHost(_))
        ));
    }

    #[test]
    fn cache_key_is_filesystem_safe() {
        let address: ServerAddress = "JKA.Example.com:29071".parse().unwrap();
        assert_eq!(address.cache_key(), "jka-example-com-29071");

        let address: ServerAddress = "192.0.2.1".parse().unwrap();
        assert_eq!(address.cache_key(), "192-0-2-1");
    }
}
