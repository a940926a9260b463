pub mod config;
pub mod directory;
pub mod error;
pub mod gateway;
pub mod routes;

use std::sync::Arc;

use config::Config;
use directory::{GroupDirectory, GroupDirectoryClient, IdentityDirectory, IdentityDirectoryClient};
use gateway::hub::Hub;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub hub: Arc<Hub>,
}

impl AppState {
    /// Wire the directory backends into a fresh hub.
    pub fn new(
        config: Config,
        identities: Arc<dyn IdentityDirectory>,
        groups: Arc<dyn GroupDirectory>,
    ) -> Self {
        let timeout = config.directory_timeout;
        let hub = Hub::new(
            IdentityDirectoryClient::new(identities, timeout),
            GroupDirectoryClient::new(groups, timeout),
        );
        Self {
            config: Arc::new(config),
            hub: Arc::new(hub),
        }
    }
}
