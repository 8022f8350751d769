use std::sync::Arc;

use deadpool_redis::Pool;

use crate::auth::{AuthResolver, AuthService, JwtAuthResolver};
use crate::config::Config;
use crate::store::Stores;
use crate::ws::{EventDispatcher, SessionRegistry};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: Arc<AuthService>,
    pub auth_resolver: Arc<dyn AuthResolver>,
    pub stores: Stores,
    pub registry: Arc<SessionRegistry>,
    pub dispatcher: Arc<EventDispatcher>,
    /// Present only with the Redis backend
    pub redis_pool: Option<Pool>,
}

impl AppState {
    pub fn new(config: Config, stores: Stores, redis_pool: Option<Pool>) -> Self {
        let auth = Arc::new(AuthService::new(&config));
        let auth_resolver = Arc::new(JwtAuthResolver::new(auth.clone(), stores.users.clone()));
        let registry = Arc::new(SessionRegistry::new());
        let dispatcher = Arc::new(EventDispatcher::new(
            registry.clone(),
            &stores,
            config.send_timeout(),
        ));

        Self {
            config: Arc::new(config),
            auth,
            auth_resolver,
            stores,
            registry,
            dispatcher,
            redis_pool,
        }
    }
}
