use std::sync::Arc;

use depot_store::OrderLifecycleService;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<OrderLifecycleService>,
    pub auth: AuthConfig,
}
