use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_usize(profile: &str, key: &str, default: usize) -> usize {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str) -> bool {
    profiled_env_opt(profile, key)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub collector: CollectorConfig,
    pub source: SourceConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `COLLECTOR_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("COLLECTOR_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            storage: StorageConfig::from_env_profiled(p),
            auth: AuthConfig::from_env_profiled(p),
            collector: CollectorConfig::from_env_profiled(p),
            source: SourceConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:      {}:{} (cors origin: {})", self.server.host, self.server.port, self.server.cors_origin);
        tracing::info!(
            "  storage:     path={}, cap={}, in_memory={}, discard_corrupt={}",
            self.storage.history_path().display(),
            self.storage.history_cap,
            self.storage.in_memory,
            self.storage.discard_corrupt
        );
        tracing::info!("  auth:        api key {}", if self.auth.is_configured() { "configured" } else { "NOT configured" });
        tracing::info!("  collector:   every {}s", self.collector.poll_interval_secs);
        tracing::info!("  source:      url={}, timeout={}s", self.source.url, self.source.timeout_secs);
        if !self.auth.is_configured() {
            tracing::warn!("INTERNAL_API_KEY is not set; data endpoints will answer 500 until it is");
        }
    }

    /// Return a redacted view safe for API responses (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "server": { "host": self.server.host, "port": self.server.port },
            "storage": {
                "history_path": self.storage.history_path(),
                "history_cap": self.storage.history_cap,
                "in_memory": self.storage.in_memory,
                "discard_corrupt": self.storage.discard_corrupt,
            },
            "auth": { "configured": self.auth.is_configured() },
            "collector": { "poll_interval_secs": self.collector.poll_interval_secs },
            "source": {
                "url": self.source.url,
                "page_size": self.source.page_size,
                "type_id": self.source.type_id,
                "timeout_secs": self.source.timeout_secs,
            },
        })
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "HOST", "0.0.0.0"),
            port: profiled_env_u16(p, "PORT", 3000),
            cors_origin: profiled_env_or(p, "CORS_ORIGIN", "*"),
        }
    }
}

// ── Storage ───────────────────────────────────────────────────

pub const DEFAULT_HISTORY_FILE: &str = "gameData.json";
pub const DEFAULT_HISTORY_CAP: usize = 5000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub history_file: String,
    pub history_cap: usize,
    /// Quarantine an unreadable history file and start empty instead of refusing to start.
    pub discard_corrupt: bool,
    /// Keep history in process memory only; nothing is written to disk.
    pub in_memory: bool,
}

impl StorageConfig {
    fn from_env_profiled(p: &str) -> Self {
        // Render mounts persistent disks under RENDER_DISK_PATH.
        let data_dir = profiled_env_opt(p, "DATA_DIR")
            .or_else(|| profiled_env_opt(p, "RENDER_DISK_PATH"))
            .unwrap_or_else(|| "data".to_string());
        Self {
            data_dir: PathBuf::from(data_dir),
            history_file: profiled_env_or(p, "HISTORY_FILE", DEFAULT_HISTORY_FILE),
            history_cap: profiled_env_usize(p, "HISTORY_CAP", DEFAULT_HISTORY_CAP).max(1),
            discard_corrupt: profiled_env_bool(p, "DISCARD_CORRUPT_HISTORY"),
            in_memory: profiled_env_bool(p, "IN_MEMORY_HISTORY"),
        }
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join(&self.history_file)
    }
}

// ── Auth ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared secret expected in `X-API-Key`.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl AuthConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            api_key: profiled_env_opt(p, "INTERNAL_API_KEY"),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

// ── Collection cycle ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    pub poll_interval_secs: u64,
}

impl CollectorConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            poll_interval_secs: profiled_env_u64(p, "POLL_INTERVAL_SECS", 15).max(1),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

// ── Upstream source ───────────────────────────────────────────

pub const DEFAULT_SOURCE_URL: &str =
    "https://api.fantasygamesapi.com/api/webapi/GetNoaverageEmerdList";
pub const DEFAULT_SOURCE_RANDOM: &str = "4a0522c6ecd8410496260e686be2a57c";
pub const DEFAULT_SOURCE_SIGNATURE: &str = "334B5E70A0C9B8918B0B15E517E2069C";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub url: String,
    pub page_size: u32,
    pub page_no: u32,
    pub type_id: u32,
    pub language: u32,
    pub random: String,
    pub signature: String,
    pub timeout_secs: u64,
}

impl SourceConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            url: profiled_env_or(p, "SOURCE_URL", DEFAULT_SOURCE_URL),
            page_size: profiled_env_u32(p, "SOURCE_PAGE_SIZE", 10),
            page_no: profiled_env_u32(p, "SOURCE_PAGE_NO", 1),
            type_id: profiled_env_u32(p, "SOURCE_TYPE_ID", 1),
            language: profiled_env_u32(p, "SOURCE_LANGUAGE", 0),
            random: profiled_env_or(p, "SOURCE_RANDOM", DEFAULT_SOURCE_RANDOM),
            signature: profiled_env_or(p, "SOURCE_SIGNATURE", DEFAULT_SOURCE_SIGNATURE),
            timeout_secs: profiled_env_u64(p, "SOURCE_TIMEOUT_SECS", 10).max(1),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SOURCE_URL.to_string(),
            page_size: 10,
            page_no: 1,
            type_id: 1,
            language: 0,
            random: DEFAULT_SOURCE_RANDOM.to_string(),
            signature: DEFAULT_SOURCE_SIGNATURE.to_string(),
            timeout_secs: 10,
        }
    }
}
