use crate::cost::ModelPrice;
use crate::keys::ApiKey;
use arc_swap::ArcSwap;
use chrono_tz::Tz;
use notify::{RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use sha2::Digest;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

// ─── Config ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    // Server
    pub host: String,
    pub port: u16,
    pub tls: TlsConfig,
    pub shutdown_timeout: u64,

    // Tokens accepted by the internal ingestion endpoint
    pub admin_tokens: Vec<String>,
    #[serde(skip)]
    pub admin_tokens_set: HashSet<String>,

    // Logging
    pub logging_to_file: bool,
    pub log_dir: Option<String>,

    // IANA zone used when a request names no timezone or an unknown one
    pub timezone: String,

    // Request body size limit (MB) for ingestion
    pub body_limit_mb: usize,

    pub usage: UsageConfig,

    // Key registry
    pub api_keys: Vec<ApiKey>,

    // Price overrides (USD per 1M tokens)
    pub model_prices: HashMap<String, ModelPrice>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8320,
            tls: TlsConfig::default(),
            shutdown_timeout: 5,
            admin_tokens: Vec::new(),
            admin_tokens_set: HashSet::new(),
            logging_to_file: false,
            log_dir: None,
            timezone: "UTC".to_string(),
            body_limit_mb: 1,
            usage: UsageConfig::default(),
            api_keys: Vec::new(),
            model_prices: HashMap::new(),
        }
    }
}

impl Config {
    /// Load config from a YAML file, sanitize, and validate.
    pub fn load(path: &str) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse, sanitize, and validate config from YAML text.
    pub fn from_yaml(contents: &str) -> Result<Self, anyhow::Error> {
        let mut config: Config = serde_yaml_ng::from_str(contents)?;
        config.sanitize();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.tls.enable {
            anyhow::ensure!(self.tls.cert.is_some(), "TLS enabled but cert path missing");
            anyhow::ensure!(self.tls.key.is_some(), "TLS enabled but key path missing");
        }
        anyhow::ensure!(
            self.timezone.parse::<Tz>().is_ok(),
            "unknown timezone '{}'",
            self.timezone
        );
        anyhow::ensure!(self.usage.capacity > 0, "usage.capacity must be positive");
        for key in &self.api_keys {
            anyhow::ensure!(
                key.rate_multiplier >= 0.0,
                "api key {} has a negative rate-multiplier",
                key.id
            );
        }
        for (model, price) in &self.model_prices {
            let rates = [
                Some(price.input),
                Some(price.output),
                price.cache_write,
                price.cache_read,
            ];
            anyhow::ensure!(
                rates.into_iter().flatten().all(|r| r.is_finite() && r >= 0.0),
                "model-prices.{model} has a negative or non-finite rate"
            );
        }
        Ok(())
    }

    /// Sanitize and normalize configuration.
    pub fn sanitize(&mut self) {
        self.timezone = self.timezone.trim().to_string();
        if self.timezone.is_empty() {
            self.timezone = "UTC".to_string();
        }

        sanitize_keys(&mut self.api_keys);

        self.admin_tokens.retain(|t| !t.is_empty());
        self.admin_tokens_set = self.admin_tokens.iter().cloned().collect();
    }

    /// The zone used when a request does not name a valid one.
    pub fn default_zone(&self) -> Tz {
        self.timezone.parse().unwrap_or(Tz::UTC)
    }
}

/// Remove keys with an empty value and drop duplicates by key string or id.
fn sanitize_keys(keys: &mut Vec<ApiKey>) {
    keys.retain(|k| !k.key.trim().is_empty());

    let mut seen_keys = HashSet::new();
    let mut seen_ids = HashSet::new();
    keys.retain(|k| {
        let fresh = !seen_keys.contains(&k.key) && !seen_ids.contains(&k.id);
        if fresh {
            seen_keys.insert(k.key.clone());
            seen_ids.insert(k.id);
        } else {
            tracing::warn!(id = k.id, "Dropping duplicate api key entry");
        }
        fresh
    });
}

// ─── Sub-configs ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct TlsConfig {
    pub enable: bool,
    pub cert: Option<String>,
    pub key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct UsageConfig {
    /// Maximum number of usage records kept in memory.
    pub capacity: usize,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self { capacity: 100_000 }
    }
}

// ─── Config Watcher ────────────────────────────────────────────────────────

pub struct ConfigWatcher {
    _watcher: notify::RecommendedWatcher,
}

impl ConfigWatcher {
    /// Watch a config file. On changes (debounced 150ms, SHA256 dedup),
    /// reload the config and atomically swap it in via ArcSwap.
    pub fn start(
        path: String,
        config: Arc<ArcSwap<Config>>,
        on_reload: impl Fn(&Config) + Send + Sync + 'static,
    ) -> Result<Self, anyhow::Error> {
        let (tx, mut rx) = tokio::sync::mpsc::channel::<()>(16);

        let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, _>| {
            if let Ok(event) = res
                && (event.kind.is_modify() || event.kind.is_create())
            {
                let _ = tx.blocking_send(());
            }
        })?;
        watcher.watch(Path::new(&path), RecursiveMode::NonRecursive)?;

        tokio::spawn(async move {
            let mut last_hash: Option<[u8; 32]> = None;
            let mut debounce: Option<tokio::time::Instant> = None;

            loop {
                tokio::select! {
                    Some(()) = rx.recv() => {
                        debounce = Some(tokio::time::Instant::now() + Duration::from_millis(150));
                    }
                    _ = async {
                        match debounce {
                            Some(deadline) => tokio::time::sleep_until(deadline).await,
                            None => std::future::pending::<()>().await,
                        }
                    } => {
                        debounce = None;
                        let contents = match std::fs::read(&path) {
                            Ok(contents) => contents,
                            Err(e) => {
                                tracing::error!(path = %path, "Config file read failed: {e}");
                                continue;
                            }
                        };
                        let hash: [u8; 32] = sha2::Sha256::digest(&contents).into();
                        if last_hash.as_ref() == Some(&hash) {
                            continue;
                        }
                        last_hash = Some(hash);

                        match Config::load(&path) {
                            Ok(new_cfg) => {
                                on_reload(&new_cfg);
                                config.store(Arc::new(new_cfg));
                            }
                            Err(e) => tracing::error!(path = %path, "Config reload failed: {e}"),
                        }
                    }
                }
            }
        });

        Ok(Self { _watcher: watcher })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyStatus;

    fn key(id: i64, value: &str) -> ApiKey {
        ApiKey {
            id,
            key: value.to_string(),
            name: None,
            status: KeyStatus::Active,
            rate_multiplier: 1.0,
        }
    }

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 8320);
        assert!(!cfg.tls.enable);
        assert_eq!(cfg.timezone, "UTC");
        assert_eq!(cfg.default_zone(), Tz::UTC);
        assert_eq!(cfg.usage.capacity, 100_000);
        assert!(cfg.api_keys.is_empty());
    }

    #[test]
    fn test_sanitize_keys() {
        let mut keys = vec![
            key(1, "sk-one"),
            key(2, "   "),
            key(3, "sk-one"), // duplicate key string
            key(1, "sk-other"), // duplicate id
            key(4, "sk-four"),
        ];
        sanitize_keys(&mut keys);
        let ids: Vec<i64> = keys.iter().map(|k| k.id).collect();
        assert_eq!(ids, vec![1, 4]);
    }

    #[test]
    fn test_yaml_deserialization() {
        let yaml = r#"
host: "127.0.0.1"
port: 9000
timezone: "Asia/Shanghai"
admin-tokens:
  - "admin-secret"
usage:
  capacity: 50
api-keys:
  - id: 7
    key: "sk-live"
    name: "primary"
    rate-multiplier: 1.5
  - id: 8
    key: "sk-off"
    status: inactive
model-prices:
  my-model:
    input: 1.0
    output: 2.0
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9000);
        assert_eq!(config.default_zone(), chrono_tz::Asia::Shanghai);
        assert!(config.admin_tokens_set.contains("admin-secret"));
        assert_eq!(config.usage.capacity, 50);
        assert_eq!(config.api_keys.len(), 2);
        assert!(config.api_keys[0].is_active());
        assert!((config.api_keys[0].rate_multiplier - 1.5).abs() < f64::EPSILON);
        assert!(!config.api_keys[1].is_active());
        assert!(config.model_prices.contains_key("my-model"));
    }

    #[test]
    fn test_unknown_timezone_rejected() {
        let err = Config::from_yaml("timezone: \"Mars/Olympus\"\n").unwrap_err();
        assert!(err.to_string().contains("Mars/Olympus"));
    }

    #[test]
    fn test_blank_timezone_defaults_to_utc() {
        let config = Config::from_yaml("timezone: \"\"\n").unwrap();
        assert_eq!(config.timezone, "UTC");
    }

    #[test]
    fn test_tls_requires_paths() {
        assert!(Config::from_yaml("tls:\n  enable: true\n").is_err());
    }

    #[test]
    fn test_negative_model_price_rejected() {
        let err = Config::from_yaml("model-prices:\n  cheap:\n    input: -1.0\n    output: 2.0\n")
            .unwrap_err();
        assert!(err.to_string().contains("cheap"));

        let yaml = "model-prices:\n  cheap:\n    input: 1.0\n    output: 2.0\n    cache-read: -0.5\n";
        assert!(Config::from_yaml(yaml).is_err());

        let yaml = "model-prices:\n  cheap:\n    input: 0.0\n    output: 2.0\n";
        assert!(Config::from_yaml(yaml).is_ok());
    }

    #[test]
    fn test_example_config_is_valid() {
        let config = Config::from_yaml(include_str!("../../../config.example.yaml")).unwrap();
        assert_eq!(config.api_keys.len(), 2);
        assert_eq!(config.admin_tokens, vec!["change-me"]);
        assert!(config.model_prices.contains_key("my-finetune"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "port: 9100\n").unwrap();
        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.port, 9100);
    }
}
