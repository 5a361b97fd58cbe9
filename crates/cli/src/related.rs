use crate::{open_for_file, report};
use alscope_api::models::ObjectType;
use std::path::PathBuf;

pub async fn run(file: PathBuf, kinds: Vec<ObjectType>) -> Result<(), Box<dyn std::error::Error>> {
    let (workspace, file) = open_for_file(&file).await?;
    let related = workspace.related(&file, &kinds).await?;
    if related.is_empty() {
        println!("No related objects found");
    } else {
        println!("{}", report::related(&related));
    }
    Ok(())
}
