//! KV store file watcher for hot reload.

use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::GatewayConfig;
use crate::kvstore::KvStore;

/// A watcher that reloads the gateway definitions when the backing file changes.
pub struct ConfigWatcher {
    store: Arc<dyn KvStore>,
    update_tx: mpsc::UnboundedSender<GatewayConfig>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for validated configuration updates.
    pub fn new(store: Arc<dyn KvStore>) -> (Self, mpsc::UnboundedReceiver<GatewayConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (Self { store, update_tx }, update_rx)
    }

    /// Start watching the store's backing file in a background thread.
    ///
    /// Returns `Ok(None)` when the store has no local file to watch.
    pub fn run(self) -> Result<Option<RecommendedWatcher>, notify::Error> {
        let Some(path) = self.store.backing_file().map(|p| p.to_path_buf()) else {
            tracing::info!("KV store has no backing file, reload disabled");
            return Ok(None);
        };
        let tx = self.update_tx.clone();
        let store = self.store.clone();
        let file_name = path.file_name().map(|n| n.to_os_string());

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let touches_file = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if touches_file && (event.kind.is_modify() || event.kind.is_create()) {
                        tracing::info!("Definitions changed, reloading...");
                        match load_config(store.as_ref()) {
                            Ok(new_config) => {
                                let _ = tx.send(new_config);
                            }
                            Err(e) => {
                                tracing::error!(
                                    "Failed to reload definitions: {}. Keeping current configuration.",
                                    e
                                );
                            }
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        // Watch the directory: the store replaces the file by rename on write.
        let watch_target = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| path.clone());
        watcher.watch(&watch_target, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?path, "Config watcher started");
        Ok(Some(watcher))
    }
}
