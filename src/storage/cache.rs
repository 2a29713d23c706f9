// src/storage/cache.rs
use dashmap::DashMap;
use log::{error, info};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::timeout;

use crate::config::Config;
use crate::models::server::ServerConfig;
use crate::query::assembler::StatusAssembler;
use crate::query::client::StatusClient;
use crate::storage::lock::{FileLock, LockError};
use crate::templates::Templates;

/// `now < modified + ttl`, so a file exactly `ttl` old is already stale.
pub fn is_fresh(modified: SystemTime, ttl: Duration, now: SystemTime) -> bool {
    modified
        .checked_add(ttl)
        .is_some_and(|expires_at| now < expires_at)
}

/// Held for one query+render+write cycle. Either layer may be missing when
/// it could not be acquired. Fields drop in order, so the file lock is
/// released before the next local waiter wakes up.
struct RegenerationGuard {
    _file: Option<FileLock>,
    _local: Option<OwnedMutexGuard<()>>,
}

/// File cache of rendered status pages, one `<key>.html` per server.
pub struct StatusCache {
    config: Arc<Config>,
    client: StatusClient,
    assembler: StatusAssembler,
    templates: Templates,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl StatusCache {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            client: StatusClient::new(config.connect_timeout, config.timeout_delay),
            assembler: StatusAssembler::new(config.clone()),
            templates: Templates::new(config.clone()),
            locks: DashMap::new(),
            config,
        }
    }

    pub fn cache_path(&self, server: &ServerConfig) -> PathBuf {
        self.config
            .cache_dir
            .join(format!("{}.html", server.address.cache_key()))
    }

    fn lock_path(&self, server: &ServerConfig) -> PathBuf {
        self.config
            .cache_dir
            .join(format!("{}.html.lock", server.address.cache_key()))
    }

    /// Returns the status page of `server`, from the cache when it is fresh.
    /// Never fails: cache problems are logged and handled as misses.
    pub async fn get_status_html(&self, server: &ServerConfig) -> String {
        if !self.config.caching_enabled() {
            return self.render(server).await;
        }

        let cache_path = self.cache_path(server);
        if let Some(html) = self.read_fresh(server, &cache_path).await {
            return html;
        }

        let _guard = self.lock(server).await;

        // Another request may have refreshed the page while we waited.
        if let Some(html) = self.read_fresh(server, &cache_path).await {
            return html;
        }

        let html = self.render(server).await;
        if let Err(e) = write_atomically(&cache_path, &html).await {
            error!(
                "{} - Could not cache the HTML to \"{}\": {}",
                server.address,
                cache_path.display(),
                e
            );
        }
        html
    }

    async fn render(&self, server: &ServerConfig) -> String {
        let response = self.client.query(&server.address).await;
        let snapshot = self.assembler.assemble(server, response);
        info!("{} - Generating HTML - Status: {}", server.address, snapshot.status);
        self.templates.status_page(&server.uri, &snapshot)
    }

    async fn lock(&self, server: &ServerConfig) -> RegenerationGuard {
        let lock_timeout = self.config.lock_timeout;
        let started = tokio::time::Instant::now();

        let mutex = self
            .locks
            .entry(server.address.cache_key())
            .or_default()
            .clone();
        let local = match timeout(lock_timeout, mutex.lock_owned()).await {
            Ok(guard) => Some(guard),
            Err(_) => {
                error!(
                    "{} - Timed out after {:?} waiting for another request to refresh the cache",
                    server.address, lock_timeout
                );
                None
            }
        };

        let remaining = lock_timeout.saturating_sub(started.elapsed());
        let file = match FileLock::acquire(&self.lock_path(server), remaining).await {
            Ok(lock) => Some(lock),
            Err(e @ LockError::Open { .. }) => {
                error!("{} - Could not open the cache lock file: {}", server.address, e);
                None
            }
            Err(e) => {
                error!("{} - Could not lock the cache: {}", server.address, e);
                None
            }
        };

        RegenerationGuard {
            _file: file,
            _local: local,
        }
    }

    async fn read_fresh(&self, server: &ServerConfig, path: &Path) -> Option<String> {
        let metadata = match fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                error!("{} - Could not read the cached version: {}", server.address, e);
                return None;
            }
        };

        if !metadata.is_file() {
            error!(
                "{} - The cached version is not a regular file: \"{}\"",
                server.address,
                path.display()
            );
            return None;
        }

        let modified = match metadata.modified() {
            Ok(modified) => modified,
            Err(e) => {
                error!("{} - Could not read the cache modification time: {}", server.address, e);
                return None;
            }
        };
        if !is_fresh(modified, self.config.caching_delay, SystemTime::now()) {
            return None;
        }

        match fs::read_to_string(path).await {
            Ok(html) => {
                info!("{} - from cache", server.address);
                Some(html)
            }
            Err(e) => {
                error!("{} - Could not read the cached version: {}", server.address, e);
                None
            }
        }
    }
}

/// Readers never take the lock, so they must not see a half-written page.
async fn write_atomically(path: &Path, contents: &str) -> io::Result<()> {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".tmp");
    let partial = PathBuf::from(partial);

    fs::write(&partial, contents).await?;
    fs::rename(&partial, path).await
}
