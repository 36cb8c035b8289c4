pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;

use std::time::Duration;

use crate::app::media::UploadOptions;
use crate::config::AppConfig;
use crate::infra::{db::Db, storage::ObjectStorage};

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub storage: ObjectStorage,
    pub upload_options: UploadOptions,
    pub token_ttl_hours: u64,
    pub relationship_lookup_timeout: Duration,
}

impl AppState {
    pub fn new(config: &AppConfig, db: Db, storage: ObjectStorage) -> Self {
        Self {
            db,
            storage,
            upload_options: UploadOptions::from_config(config),
            token_ttl_hours: config.token_ttl_hours,
            relationship_lookup_timeout: Duration::from_millis(
                config.relationship_lookup_timeout_ms,
            ),
        }
    }
}
