// src/handlers/status.rs
use actix_web::{web, HttpRequest, HttpResponse};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{clock::DefaultClock, RateLimiter};
use log::{debug, error};
use std::net::IpAddr;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::Config;
use crate::storage::cache::StatusCache;
use crate::templates::Templates;
use crate::utils::{extract_client_ip, RequestError};

pub type ClientRateLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

const HTML: &str = "text/html; charset=utf-8";

/// Front controller: every path is routed here and matched exactly against
/// the landing page, the about page and the configured server URIs.
pub async fn dispatch(
    req: HttpRequest,
    config: web::Data<Config>,
    cache: web::Data<StatusCache>,
    templates: web::Data<Templates>,
    rate_limiter: Option<web::Data<ClientRateLimiter>>,
) -> Result<HttpResponse, RequestError> {
    if let Some(rate_limiter) = rate_limiter {
        let client_ip = extract_client_ip(&req, &config.trusted_proxies)?;
        if rate_limiter.check_key(&client_ip).is_err() {
            error!("Rate limit exceeded for ip: {}", client_ip);
            return Err(RequestError::RateLimitExceeded);
        }
    }

    let path = req.path();

    if config.landing_page_enabled && path == config.landing_page_uri {
        return Ok(HttpResponse::Ok().content_type(HTML).body(templates.landing_page()));
    }

    if config.about_page_enabled && path == config.about_page_uri {
        return Ok(HttpResponse::Ok().content_type(HTML).body(templates.about_page()));
    }

    if let Some(server) = config.server_by_uri(path) {
        let html = cache.get_status_html(server).await;
        return Ok(HttpResponse::Ok().content_type(HTML).body(html));
    }

    debug!("No page for {:?}", path);
    Ok(HttpResponse::NotFound().content_type(HTML).body(templates.not_found_page()))
}

/// Drops limiter entries that have fully replenished, so clients seen once
/// do not stay in memory forever.
pub async fn prune_rate_limiter(rate_limiter: web::Data<ClientRateLimiter>, every: Duration) {
    let mut timer = interval(every);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick fires immediately.
    timer.tick().await;

    loop {
        timer.tick().await;
        rate_limiter.retain_recent();
        rate_limiter.shrink_to_fit();
        debug!("Rate limiter tracks {} client(s)", rate_limiter.len());
    }
}
