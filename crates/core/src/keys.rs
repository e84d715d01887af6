//! API key model and the lookup seam used by the usage endpoints.

use crate::config::Config;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    #[default]
    Active,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ApiKey {
    pub id: i64,
    pub key: String,
    /// Human-readable label, used only for logging.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: KeyStatus,
    /// Multiplier applied to nominal cost to get the billed (actual) cost.
    #[serde(default = "default_rate_multiplier")]
    pub rate_multiplier: f64,
}

fn default_rate_multiplier() -> f64 {
    1.0
}

impl ApiKey {
    pub fn is_active(&self) -> bool {
        self.status == KeyStatus::Active
    }
}

#[derive(Debug, thiserror::Error)]
pub enum KeyLookupError {
    #[error("api key not found")]
    NotFound,

    #[error("key store error: {0}")]
    Backend(String),
}

/// Read-only access to the key registry.
#[async_trait]
pub trait KeyLookup: Send + Sync {
    async fn get_by_key(&self, key: &str) -> Result<ApiKey, KeyLookupError>;

    async fn get_by_id(&self, id: i64) -> Result<ApiKey, KeyLookupError>;
}

/// Key registry backed by the `api-keys` section of the live config.
/// Reads go through `ArcSwap`, so reloaded keys are visible immediately.
pub struct ConfigKeyStore {
    config: Arc<ArcSwap<Config>>,
}

impl ConfigKeyStore {
    pub fn new(config: Arc<ArcSwap<Config>>) -> Self {
        Self { config }
    }

    pub fn len(&self) -> usize {
        self.config.load().api_keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyLookup for ConfigKeyStore {
    async fn get_by_key(&self, key: &str) -> Result<ApiKey, KeyLookupError> {
        self.config
            .load()
            .api_keys
            .iter()
            .find(|k| k.key == key)
            .cloned()
            .ok_or(KeyLookupError::NotFound)
    }

    async fn get_by_id(&self, id: i64) -> Result<ApiKey, KeyLookupError> {
        self.config
            .load()
            .api_keys
            .iter()
            .find(|k| k.id == id)
            .cloned()
            .ok_or(KeyLookupError::NotFound)
    }
}
