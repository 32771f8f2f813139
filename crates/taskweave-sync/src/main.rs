use anyhow::{Context, Result};
use chrono::Local;
use std::path::Path;
use std::sync::Arc;
use taskweave_core::Graph;
use taskweave_monitoring::{LogExt, MonitoringConfig};
use taskweave_store::{
    AccessToken, CachedTokenProvider, DriveConfig, DriveDocumentStore, LocalFileStore,
    StaticCredentialSource, TokenProvider,
};
use taskweave_sync::{
    prepare_loaded, visible_outline, OutlineEntry, SyncConfig, SyncEngine, SyncSession,
    SyncStatus, Workspace,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    taskweave_monitoring::init_logging(&MonitoringConfig::from_env("taskweave"))
        .context("Failed to initialize logging")?;

    let config = SyncConfig::load().context("Failed to load configuration")?;

    match (&config.access_token, &config.local_dir) {
        (None, Some(dir)) => run_local(&config, dir).await,
        _ => run_remote(&config).await,
    }
}

fn print_outline(entries: &[OutlineEntry]) {
    for entry in entries {
        let indent = "  ".repeat(entry.depth.saturating_sub(1) as usize);
        println!("{}- {}", indent, entry.title);
    }
}

/// Local fallback: one file, no debounce or retry
async fn run_local(config: &SyncConfig, dir: &Path) -> Result<()> {
    let store = LocalFileStore::new(dir);
    let key = config.document_name.trim_end_matches(".json");
    let today = Local::now().date_naive();

    let loaded = match store.load(key).await {
        Some(raw) => Graph::from_json(&raw)
            .log_warn("Ignoring unreadable local document")
            .unwrap_or_default(),
        None => Graph::new(),
    };
    let graph = prepare_loaded(&loaded, today, true);
    info!(nodes = graph.len(), path = %store.path_for(key).display(), "local document ready");

    print_outline(&visible_outline(&graph));
    store.save(key, &graph.to_json()?).await;
    Ok(())
}

async fn run_remote(config: &SyncConfig) -> Result<()> {
    let token = config.access_token.clone().map(AccessToken::new);
    let tokens: Arc<dyn TokenProvider> =
        Arc::new(CachedTokenProvider::new(StaticCredentialSource::new(token)));
    let drive = DriveDocumentStore::new(
        DriveConfig {
            api_base_url: config.api_base_url.clone(),
            timeout_secs: config.request_timeout_secs,
            ..DriveConfig::default()
        },
        tokens.clone(),
    )
    .context("Failed to create document store")?;

    let session = SyncSession::new(Arc::new(drive), tokens, config.document_name.clone());
    let workspace = Workspace::new(SyncEngine::from_config(session, config));
    let today = Local::now().date_naive();

    // persistence failures leave the default graph in place
    let status = workspace
        .start(today)
        .await
        .log_err("Failed to load remote document")
        .unwrap_or(SyncStatus::Error);
    if status == SyncStatus::NeedsAuth {
        warn!("No credential available; set TASKWEAVE_ACCESS_TOKEN to sync");
    }

    print_outline(&workspace.outline());

    let _ = workspace.shutdown().await.log_err("Final save failed");
    let snapshot = workspace.engine().snapshot();
    info!(status = %snapshot.status, last_saved_at = ?snapshot.last_saved_at, "done");
    Ok(())
}
