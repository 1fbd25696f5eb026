pub mod types;
pub mod error;
pub mod config;
pub mod users;
pub mod recipients;
pub mod push;
pub mod oauth;
pub mod fcm;
pub mod dispatch;
pub mod responses;
pub mod notifications;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

use config::Config;
use dispatch::Dispatcher;
use push::PushGateway;
use recipients::Resolver;
use std::sync::Arc;
use users::UserStore;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn UserStore>,
    pub resolver: Resolver,
    pub dispatcher: Dispatcher,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn UserStore>,
        gateway: Arc<dyn PushGateway>,
    ) -> Arc<Self> {
        let timeout = config.downstream_timeout;
        Arc::new(Self {
            resolver: Resolver::new(Arc::clone(&store), timeout),
            dispatcher: Dispatcher::new(gateway, timeout),
            store,
            config,
        })
    }
}
