use crate::{open_workspace, report};
use std::path::PathBuf;
use tracing::info;

pub async fn run(path: PathBuf, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let workspace = open_workspace(&path).await?;
    let index = workspace.snapshot().await;
    info!("Indexing complete!");

    let mut objects: Vec<_> = index.objects().collect();
    objects.sort_by(|a, b| (a.object_type, a.id, &a.name).cmp(&(b.object_type, b.id, &b.name)));

    if json {
        println!("{}", serde_json::to_string_pretty(&objects)?);
    } else {
        println!("{}", report::objects(objects, workspace.root()));
        println!("{} object(s)", index.len());
    }
    Ok(())
}
