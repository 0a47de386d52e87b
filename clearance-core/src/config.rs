//! Process configuration, consolidated into a single validated struct per
//! §9's "ambient env-var configuration" design note — no ad hoc
//! `std::env::var` calls inside business logic.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "clearance-core", about = "Classified-document access core")]
pub struct CoreConfig {
    /// Root secret used to derive per-tier master keys. Never logged,
    /// never persisted.
    #[arg(long, env = "CLEARANCE_COMPANY_SECRET")]
    pub company_secret: String,

    /// Hex-encoded 32-byte key used to HMAC-sign the registry snapshot.
    #[arg(long, env = "CLEARANCE_REGISTRY_SIGNING_KEY")]
    pub registry_signing_key: String,

    #[arg(long, env = "CLEARANCE_REGISTRY_PATH", default_value = "./data/registry.json")]
    pub registry_path: PathBuf,

    #[arg(long, env = "CLEARANCE_LEDGER_PATH", default_value = "./data/view-once.ledger")]
    pub ledger_path: PathBuf,

    #[arg(long, env = "CLEARANCE_AUDIT_LOG_PATH", default_value = "./data/audit.log")]
    pub audit_log_path: PathBuf,

    #[arg(long, env = "CLEARANCE_BLOB_ROOT", default_value = "./data/blobs")]
    pub blob_root: PathBuf,

    /// Base URL of the external IdentityAgent. Absent means credential
    /// and status-list checks run in offline/static mode (tests only).
    #[arg(long, env = "CLEARANCE_IDENTITY_AGENT_URL")]
    pub identity_agent_url: Option<String>,

    #[arg(long, env = "CLEARANCE_DEFAULT_COPY_TTL_MS", default_value_t = 3_600_000)]
    pub default_copy_ttl_ms: i64,

    #[arg(long, env = "CLEARANCE_NONCE_CACHE_TTL_SECS", default_value_t = 300)]
    pub nonce_cache_ttl_secs: u64,

    #[arg(long, env = "CLEARANCE_BLOB_FETCH_TIMEOUT_SECS", default_value_t = 120)]
    pub blob_fetch_timeout_secs: u64,

    #[arg(long, env = "CLEARANCE_STATUS_CHECK_TIMEOUT_SECS", default_value_t = 10)]
    pub status_check_timeout_secs: u64,

    #[arg(long, env = "CLEARANCE_STATUS_CACHE_TTL_SECS", default_value_t = 60)]
    pub status_cache_ttl_secs: u64,
}

impl CoreConfig {
    pub fn registry_signing_key_bytes(&self) -> anyhow::Result<[u8; 32]> {
        let decoded = hex::decode(&self.registry_signing_key)?;
        decoded
            .try_into()
            .map_err(|_| anyhow::anyhow!("CLEARANCE_REGISTRY_SIGNING_KEY must be 32 bytes hex"))
    }
}

/// Initializes the `tracing` subscriber. Mirrors the `FREEQ_LOG_JSON`
/// toggle in `main.rs`: structured JSON for production log shipping,
/// human-readable for local development.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("clearance_core=debug".parse().unwrap());

    let json = std::env::var("CLEARANCE_LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
