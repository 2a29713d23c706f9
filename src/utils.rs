// src/utils.rs
use actix_web::{HttpRequest, HttpResponse, ResponseError};
use ipnetwork::IpNetwork;
use log::debug;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

#[derive(Debug)]
pub enum RequestError {
    MissingPeerIP,
    InvalidIPFormat(String),
    RateLimitExceeded,
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingPeerIP => write!(f, "Failed to extract client IP"),
            Self::InvalidIPFormat(ip) => write!(f, "Invalid client IP format: {}", ip),
            Self::RateLimitExceeded => write!(f, "Rate limit exceeded"),
        }
    }
}

impl ResponseError for RequestError {
    fn error_response(&self) -> HttpResponse {
        match self {
            Self::RateLimitExceeded => HttpResponse::TooManyRequests().body(self.to_string()),
            _ => HttpResponse::BadRequest().body(self.to_string()),
        }
    }
}

fn is_trusted(ip: IpAddr, trusted_proxies: &[IpNetwork]) -> bool {
    trusted_proxies.iter().any(|network| network.contains(ip))
}

/// Client address used as the rate limiting key. The TCP peer is the client
/// unless it is a trusted proxy. Then `X-Forwarded-For` is read right to left
/// and the first hop that is not itself a trusted proxy is the client.
pub fn extract_client_ip(req: &HttpRequest, trusted_proxies: &[IpNetwork]) -> Result<IpAddr, RequestError> {
    let peer = match req.peer_addr() {
        Some(addr) => addr.ip(),
        None => return Err(RequestError::MissingPeerIP),
    };
    if !is_trusted(peer, trusted_proxies) {
        return Ok(peer);
    }

    let Some(forwarded_for) = req.headers().get("X-Forwarded-For") else {
        return Ok(peer);
    };
    let Ok(forwarded_for) = forwarded_for.to_str() else {
        debug!("Unreadable X-Forwarded-For header from proxy {}", peer);
        return Err(RequestError::InvalidIPFormat(String::from_utf8_lossy(forwarded_for.as_bytes()).into_owned()));
    };

    for hop in forwarded_for.rsplit(',').map(str::trim).filter(|hop| !hop.is_empty()) {
        let ip = match hop.parse::<IpAddr>() {
            Ok(ip) => ip,
            Err(_) => match hop.parse::<SocketAddr>() {
                Ok(addr) => addr.ip(),
                Err(_) => {
                    debug!("Unparseable X-Forwarded-For hop {:?} from proxy {}", hop, peer);
                    return Err(RequestError::InvalidIPFormat(hop.to_string()));
                }
            },
        };
        if !is_trusted(ip, trusted_proxies) {
            return Ok(ip);
        }
    }

    Ok(peer)
}
