//! Application state shared across handlers.

use crate::auth::{AuthService, TokenKeys};
use crate::catalog::CatalogService;
use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::uploads::UploadStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<Config>,
    /// Database connection.
    pub db: Database,
    /// Authentication service.
    pub auth: Arc<AuthService>,
    /// Catalog and reading progress.
    pub catalog: Arc<CatalogService>,
}

impl AppState {
    /// Wire services around an open database.
    ///
    /// Creates the upload directories if they are missing.
    pub fn new(config: Config, db: Database) -> Result<Self> {
        let uploads = UploadStore::new(&config.uploads);
        uploads.ensure_dirs()?;

        let keys = TokenKeys::new(&config.auth.jwt_secret, config.auth.token_days);
        let auth = AuthService::new(db.clone(), keys, config.auth.registration_enabled());
        let catalog = CatalogService::new(db.clone(), uploads, &config.catalog);

        Ok(Self {
            config: Arc::new(config),
            db,
            auth: Arc::new(auth),
            catalog: Arc::new(catalog),
        })
    }
}
