use crate::{open_for_file, open_workspace, report};
use alscope_api::models::{ObjectType, RewriteResult};
use alscope_core::config::IdRange;
use alscope_core::rewrite::{PrefixChange, RenumberPolicy, WrapMode};
use std::path::PathBuf;

type CliResult = Result<(), Box<dyn std::error::Error>>;

pub struct PrefixArgs {
    pub path: PathBuf,
    pub to: String,
    pub from: Option<String>,
    pub rename_fields: bool,
    pub separators: Option<String>,
    pub update_settings: bool,
}

fn print(result: &RewriteResult) {
    println!("{}", report::result(result));
}

pub async fn renumber(path: PathBuf, ranges: Vec<IdRange>) -> CliResult {
    let workspace = open_workspace(&path).await?;
    let ranges = if ranges.is_empty() {
        workspace.settings().await.id_ranges
    } else {
        ranges
    };
    let result = workspace.renumber(&RenumberPolicy::new(ranges)).await?;
    print(&result);
    Ok(())
}

pub async fn change_prefix(args: PrefixArgs) -> CliResult {
    let workspace = open_workspace(&args.path).await?;
    let settings = workspace.settings().await;
    let from = args
        .from
        .or(settings.object_prefix)
        .ok_or("no old prefix given and none is configured")?;

    let mut change = PrefixChange::new(from, args.to);
    change.rename_fields = args.rename_fields && settings.rename_fields;
    change.separators = match args.separators {
        Some(chars) => chars.chars().collect(),
        None => settings.prefix_separators,
    };
    change.update_settings = args.update_settings;

    let result = workspace.change_prefix(&change).await?;
    print(&result);
    Ok(())
}

pub async fn copy_fields(file: PathBuf) -> CliResult {
    let (workspace, file) = open_for_file(&file).await?;
    let result = workspace.copy_fields(&file).await?;
    print(&result);
    Ok(())
}

pub async fn wrap(path: PathBuf, files: Vec<PathBuf>, mode: WrapMode) -> CliResult {
    let workspace = open_workspace(&path).await?;
    let files = files
        .iter()
        .map(std::fs::canonicalize)
        .collect::<Result<Vec<_>, _>>()?;
    let result = workspace.wrap_regions(&files, mode).await?;
    print(&result);
    Ok(())
}

pub async fn create_related(file: PathBuf, kinds: Vec<ObjectType>) -> CliResult {
    let (workspace, file) = open_for_file(&file).await?;
    let result = workspace.create_related(&file, &kinds).await?;
    print(&result);
    Ok(())
}
