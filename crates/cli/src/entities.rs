use crate::{open_workspace, report};
use std::path::PathBuf;

pub async fn run(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let workspace = open_workspace(&path).await?;
    if workspace.settings().await.disable_api_entity_warnings {
        println!("API entity warnings are disabled for this project.");
        return Ok(());
    }
    println!("{}", report::conflicts(&workspace.conflicts().await));
    Ok(())
}
