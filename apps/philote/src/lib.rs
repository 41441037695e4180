pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod routes;

use std::sync::Arc;

use auth::tokens::TokenVerifier;
use config::Config;
use gateway::Hive;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub hive: Hive,
    pub tokens: Arc<TokenVerifier>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, hive: Hive) -> Self {
        Self {
            hive,
            tokens: Arc::new(TokenVerifier::new(&config.jwt_secret)),
            config: Arc::new(config),
        }
    }
}
