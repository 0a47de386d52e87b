use anyhow::{Context, Result};
use clap::Parser;
use clearance_core::blob_store::{FilesystemBlobStore, SharedBlobStore};
use clearance_core::config::{init_logging, CoreConfig};
use clearance_core::copy::ViewOnceLedger;
use clearance_core::engine::{AuditLog, EngineConfig, ReEncryptionEngine};
use clearance_core::identity_agent::{DidResolver, IdentityAgentClient};
use clearance_core::registry::DocumentRegistry;
use clearance_core::revocation::RevocationClient;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let config = CoreConfig::parse();
    let signing_key = config
        .registry_signing_key_bytes()
        .context("invalid CLEARANCE_REGISTRY_SIGNING_KEY")?;

    let registry = DocumentRegistry::load(signing_key, config.registry_path.clone())
        .context("registry snapshot failed signature verification; refusing to start")?;
    tracing::info!(path = %config.registry_path.display(), "registry loaded");

    let ledger = ViewOnceLedger::open(config.ledger_path.clone());
    let audit = AuditLog::new(config.audit_log_path.clone());
    let blob_store: SharedBlobStore = Arc::new(FilesystemBlobStore::new(config.blob_root.clone()));

    let did_resolver = match &config.identity_agent_url {
        Some(url) => DidResolver::http(url.clone()),
        None => {
            tracing::warn!("no CLEARANCE_IDENTITY_AGENT_URL set; DID resolution will always fail");
            DidResolver::static_map(Default::default())
        }
    };
    let identity_agent = IdentityAgentClient::new(config.identity_agent_url.clone());
    let revocation = RevocationClient::new(identity_agent, Duration::from_secs(config.status_cache_ttl_secs));

    let _engine = ReEncryptionEngine::new(
        Arc::new(registry),
        blob_store,
        did_resolver,
        revocation,
        Duration::from_secs(config.nonce_cache_ttl_secs),
        ledger,
        audit,
        EngineConfig {
            company_secret: config.company_secret.clone(),
            blob_fetch_timeout: Duration::from_secs(config.blob_fetch_timeout_secs),
            status_check_timeout: Duration::from_secs(config.status_check_timeout_secs),
            default_copy_ttl_ms: config.default_copy_ttl_ms,
        },
    );

    tracing::info!("clearance-core ready");
    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    tracing::info!("shutting down");
    Ok(())
}
