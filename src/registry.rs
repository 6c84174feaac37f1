//! Process-wide client registry.
//!
//! The first call to [`get_or_create`] builds the client; every later call
//! returns that same instance and ignores its configuration.

use crate::client::ProxiedClient;
use crate::config::ClientConfig;

use log::debug;
use std::sync::{Arc, OnceLock};
use tokio::sync::Notify;

static CLIENT: OnceLock<Arc<ProxiedClient>> = OnceLock::new();
static REGISTERED: Notify = Notify::const_new();

/// Return the process-wide client, creating it from `config` on first use.
pub fn get_or_create(config: ClientConfig) -> Arc<ProxiedClient> {
    let mut created = false;
    let client = CLIENT.get_or_init(|| {
        created = true;
        ProxiedClient::new(config)
    });

    if created {
        REGISTERED.notify_waiters();
    } else {
        debug!("Proxied client already exists, ignoring new configuration");
    }

    Arc::clone(client)
}

/// The process-wide client, if it has been created.
pub fn try_instance() -> Option<Arc<ProxiedClient>> {
    CLIENT.get().cloned()
}

/// Wait until the process-wide client has been created.
pub async fn instance() -> Arc<ProxiedClient> {
    loop {
        let registered = REGISTERED.notified();
        tokio::pin!(registered);
        // Register interest before checking so a concurrent creation is not missed.
        registered.as_mut().enable();

        if let Some(client) = try_instance() {
            return client;
        }
        registered.await;
    }
}
