//! Server configuration.
//!
//! Loaded from an optional TOML file, then overridden by environment
//! variables (a `.env` file is honored). Missing keys fall back to defaults.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{env, path::Path, str::FromStr, time::Duration};

use crate::{
    ledger::names::BASE_L2_RESOLVER,
    middleware::RateLimitConfig,
    models::Address,
    stats::ScanSettings,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Prometheus scrape port; unset disables the exporter.
    pub metrics_port: Option<u16>,
    pub rpc_url: String,
    pub contract_address: String,
    pub deployment_block: Option<u64>,
    pub recent_window_blocks: u64,
    pub max_log_block_span: u64,
    pub upstream_timeout_ms: u64,
    /// Empty string disables name lookup.
    pub basename_resolver: String,
    pub admin_secret: Option<String>,
    pub admin_cooldown_secs: u64,
    pub notifications_db_path: String,
    pub webhook_workers: usize,
    pub webhook_queue_size: usize,
    pub app_url: String,
    pub rate_limit: RateLimitSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub max_requests: u32,
    pub window_secs: u64,
    pub burst: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window_secs: 60,
            burst: 20,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            metrics_port: None,
            rpc_url: "https://mainnet.base.org".to_string(),
            contract_address: String::new(),
            deployment_block: None,
            recent_window_blocks: 100_000,
            max_log_block_span: 10_000,
            upstream_timeout_ms: 10_000,
            basename_resolver: BASE_L2_RESOLVER.to_string(),
            admin_secret: None,
            admin_cooldown_secs: 300,
            notifications_db_path: "seersleague_notifications.db".to_string(),
            webhook_workers: 2,
            webhook_queue_size: 256,
            app_url: "https://seersleague.xyz".to_string(),
            rate_limit: RateLimitSettings::default(),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string())
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse::<T>().ok())
}

impl ServerConfig {
    /// TOML file (if any) overlaid with environment variables, then validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                Self::from_toml_str(&contents)?
            }
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with environment variables only.
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("invalid TOML config")
    }

    pub fn apply_env(&mut self) {
        if let Some(port) = env_parse("PORT") {
            self.port = port;
        }
        if let Some(port) = env_parse("METRICS_PORT") {
            self.metrics_port = Some(port);
        }
        if let Some(url) = env_string("BASE_RPC_URL").filter(|v| !v.is_empty()) {
            self.rpc_url = url;
        }
        if let Some(addr) = env_string("SEERS_CONTRACT_ADDRESS") {
            self.contract_address = addr;
        }
        if let Some(block) = env_parse("SEERS_DEPLOYMENT_BLOCK") {
            self.deployment_block = Some(block);
        }
        if let Some(v) = env_parse("RECENT_WINDOW_BLOCKS") {
            self.recent_window_blocks = v;
        }
        if let Some(v) = env_parse("MAX_LOG_BLOCK_SPAN") {
            self.max_log_block_span = v;
        }
        if let Some(v) = env_parse("UPSTREAM_TIMEOUT_MS") {
            self.upstream_timeout_ms = v;
        }
        if let Some(v) = env_string("BASENAME_RESOLVER_ADDRESS") {
            self.basename_resolver = v;
        }
        if let Some(secret) = env_string("ADMIN_SECRET").filter(|v| !v.is_empty()) {
            self.admin_secret = Some(secret);
        }
        if let Some(v) = env_parse("ADMIN_COOLDOWN_SECS") {
            self.admin_cooldown_secs = v;
        }
        if let Some(v) = env_string("NOTIFICATIONS_DB_PATH").filter(|v| !v.is_empty()) {
            self.notifications_db_path = v;
        }
        if let Some(v) = env_parse("WEBHOOK_WORKERS") {
            self.webhook_workers = v;
        }
        if let Some(v) = env_parse("WEBHOOK_QUEUE_SIZE") {
            self.webhook_queue_size = v;
        }
        if let Some(v) = env_string("APP_URL").filter(|v| !v.is_empty()) {
            self.app_url = v;
        }
        if let Some(v) = env_parse("RATE_LIMIT_MAX_REQUESTS") {
            self.rate_limit.max_requests = v;
        }
        if let Some(v) = env_parse("RATE_LIMIT_WINDOW_SECS") {
            self.rate_limit.window_secs = v;
        }
        if let Some(v) = env_parse("RATE_LIMIT_BURST") {
            self.rate_limit.burst = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.contract()?;
        self.resolver()?;
        if self.upstream_timeout_ms == 0 {
            bail!("upstream_timeout_ms must be positive");
        }
        if self.rate_limit.window_secs == 0 {
            bail!("rate_limit.window_secs must be positive");
        }
        Ok(())
    }

    pub fn contract(&self) -> Result<Address> {
        if self.contract_address.is_empty() {
            bail!("SEERS_CONTRACT_ADDRESS is not set");
        }
        self.contract_address
            .parse()
            .context("SEERS_CONTRACT_ADDRESS is not a valid address")
    }

    pub fn resolver(&self) -> Result<Option<Address>> {
        if self.basename_resolver.is_empty() {
            return Ok(None);
        }
        let addr = self
            .basename_resolver
            .parse()
            .context("BASENAME_RESOLVER_ADDRESS is not a valid address")?;
        Ok(Some(addr))
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }

    pub fn scan_settings(&self) -> ScanSettings {
        ScanSettings {
            deployment_block: self.deployment_block,
            recent_window_blocks: self.recent_window_blocks,
            upstream_timeout: self.upstream_timeout(),
            max_log_block_span: self.max_log_block_span.max(1),
        }
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_requests: self.rate_limit.max_requests,
            window: Duration::from_secs(self.rate_limit.window_secs),
            burst: self.rate_limit.burst,
        }
    }
}
