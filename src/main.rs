// src/main.rs
use actix_web::{web, App, HttpServer};
use env_logger::{Env, Target};
use jka_server_status::config::Config;
use jka_server_status::handlers::status::{dispatch, prune_rate_limiter, ClientRateLimiter};
use jka_server_status::storage::cache::StatusCache;
use jka_server_status::templates::Templates;
use log::{error, info};
use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const RATE_LIMITER_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

fn init_logger() -> io::Result<()> {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    if let Ok(path) = std::env::var("LOG_FILE") {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        builder.target(Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    init_logger()?;

    let config_path = PathBuf::from(std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.json".to_string()));
    let config = match Config::from_file(&config_path) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("Invalid configuration in \"{}\": {}", config_path.display(), e);
            return Err(io::Error::new(io::ErrorKind::InvalidData, e));
        }
    };

    if config.caching_enabled() {
        if let Err(e) = std::fs::create_dir_all(&config.cache_dir) {
            error!("Could not create the cache directory \"{}\": {}", config.cache_dir.display(), e);
        }
    }

    let bind_address = std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let bind = format!("{}:{}", bind_address, port);

    let config_data = web::Data::from(config.clone());
    let cache = web::Data::new(StatusCache::new(config.clone()));
    let templates = web::Data::new(Templates::new(config.clone()));
    let rate_limiter = config
        .rate_limit
        .map(|quota| web::Data::new(ClientRateLimiter::keyed(quota)));
    if let Some(rate_limiter) = &rate_limiter {
        actix_web::rt::spawn(prune_rate_limiter(rate_limiter.clone(), RATE_LIMITER_PRUNE_INTERVAL));
    }

    info!(
        "Serving {} server(s) on {} (cache: {:?})",
        config.servers.len(),
        bind,
        config.caching_delay
    );
    HttpServer::new(move || {
        let mut app = App::new()
            .app_data(config_data.clone())
            .app_data(cache.clone())
            .app_data(templates.clone());
        if let Some(rate_limiter) = &rate_limiter {
            app = app.app_data(rate_limiter.clone());
        }
        app.default_service(web::to(dispatch))
    })
    .bind(&bind)?
    .run()
    .await
}
