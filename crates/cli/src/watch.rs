use crate::open_workspace;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

pub async fn run(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let workspace = Arc::new(open_workspace(&path).await?);
    info!("Initial indexing complete.");

    for conflict in workspace.conflicts().await {
        tracing::warn!("Duplicate {}", conflict.key);
    }

    workspace.clone().watch().await?;
    info!("File watcher started. Ready for changes.");
    info!("Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;
    workspace.shutdown();
    info!("Watcher stopped.");

    Ok(())
}
