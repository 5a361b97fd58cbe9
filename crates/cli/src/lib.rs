mod entities;
mod index;
mod related;
mod report;
mod rewrite;
mod watch;

use alscope_api::models::ObjectType;
use alscope_core::Workspace;
use alscope_core::config::IdRange;
use alscope_core::rewrite::WrapMode;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "alscope",
    version,
    about = "Project-wide navigation and bulk rewrites for AL source trees",
    long_about = "alscope indexes the AL objects of a project and keeps related tables, pages and \
                  their extensions consistent: it renumbers objects, changes object prefixes, copies \
                  fields between related table extensions, wraps code in regions and reports \
                  duplicate API entity names."
)]
pub struct Cli {
    /// Also log to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Index a project and list its objects
    Index {
        /// Path to the project root
        #[arg(value_name = "PROJECT_PATH")]
        path: PathBuf,

        /// Print the index as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the objects related to the object declared in a file
    Related {
        /// An extension (or base object) file inside the project
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Only return these kinds (e.g. tableextension); repeatable
        #[arg(long = "kind", value_parser = parse_object_type)]
        kinds: Vec<ObjectType>,
    },
    /// Renumber every object into the project's id ranges
    #[command(
        long_about = "Assigns consecutive ids from the given ranges (or app.json idRanges) to every \
                      numbered object, per object type, and updates numeric RunObject/Run references."
    )]
    Renumber {
        #[arg(value_name = "PROJECT_PATH")]
        path: PathBuf,

        /// Id range such as 50100..50149; repeatable
        #[arg(long = "range")]
        ranges: Vec<IdRange>,
    },
    /// Replace the object name prefix across the project
    ChangePrefix {
        #[arg(value_name = "PROJECT_PATH")]
        path: PathBuf,

        /// New prefix
        #[arg(value_name = "NEW_PREFIX")]
        to: String,

        /// Old prefix; defaults to the configured object prefix
        #[arg(long)]
        from: Option<String>,

        /// Leave field names alone
        #[arg(long)]
        no_fields: bool,

        /// Characters that may follow the prefix, e.g. " _-."
        #[arg(long)]
        separators: Option<String>,

        /// Store the new prefix in .vscode/settings.json
        #[arg(long)]
        update_settings: bool,
    },
    /// Copy the fields of a table extension to the extensions of related tables
    CopyFields {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Wrap procedures and triggers, report data items, or both in #region blocks
    Wrap {
        #[arg(value_name = "PROJECT_PATH")]
        path: PathBuf,

        /// Only these files; defaults to every indexed file
        #[arg(value_name = "FILE")]
        files: Vec<PathBuf>,

        /// Wrap report data items and columns instead of procedures
        #[arg(long)]
        data_items: bool,

        /// Wrap procedures and report data items in one pass
        #[arg(long, conflicts_with = "data_items")]
        all: bool,
    },
    /// Report API entity names declared more than once
    Entities {
        #[arg(value_name = "PROJECT_PATH")]
        path: PathBuf,
    },
    /// Create missing table/page extensions for objects related to an extension
    CreateRelated {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Base kinds to extend (table, page); repeatable
        #[arg(long = "kind", value_parser = parse_object_type)]
        kinds: Vec<ObjectType>,
    },
    /// Watch for file changes and keep the index and entity report current
    Watch {
        #[arg(value_name = "PROJECT_PATH")]
        path: PathBuf,
    },
}

fn parse_object_type(s: &str) -> Result<ObjectType, String> {
    ObjectType::from_keyword(s).ok_or_else(|| format!("unknown object type '{s}'"))
}

/// The nearest ancestor of `file` holding an `app.json`, or its directory.
pub(crate) fn project_root(file: &Path) -> PathBuf {
    let start = file.parent().unwrap_or(file);
    start
        .ancestors()
        .find(|dir| dir.join("app.json").is_file())
        .unwrap_or(start)
        .to_path_buf()
}

/// Load settings for `root` and index it.
pub(crate) async fn open_workspace(root: &Path) -> Result<Workspace, Box<dyn std::error::Error>> {
    let workspace = Workspace::open(root)?;
    tracing::info!("Indexing project at: {}...", workspace.root().display());
    workspace.rebuild().await?;
    Ok(workspace)
}

/// Open the project containing `file`, returning the workspace and the
/// file's path as the index knows it.
pub(crate) async fn open_for_file(
    file: &Path,
) -> Result<(Workspace, PathBuf), Box<dyn std::error::Error>> {
    let file = std::fs::canonicalize(file)?;
    let workspace = open_workspace(&project_root(&file)).await?;
    Ok((workspace, file))
}

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let component = match &cli.command {
        Commands::Watch { .. } => "watch",
        _ => "cli",
    };
    let _guard = alscope_core::logging::init_logging(component, cli.verbose);

    let rt = tokio::runtime::Runtime::new()?;

    match cli.command {
        Commands::Index { path, json } => rt.block_on(index::run(path, json)),
        Commands::Related { file, kinds } => rt.block_on(related::run(file, kinds)),
        Commands::Renumber { path, ranges } => rt.block_on(rewrite::renumber(path, ranges)),
        Commands::ChangePrefix {
            path,
            to,
            from,
            no_fields,
            separators,
            update_settings,
        } => rt.block_on(rewrite::change_prefix(rewrite::PrefixArgs {
            path,
            to,
            from,
            rename_fields: !no_fields,
            separators,
            update_settings,
        })),
        Commands::CopyFields { file } => rt.block_on(rewrite::copy_fields(file)),
        Commands::Wrap {
            path,
            files,
            data_items,
            all,
        } => {
            let mode = if all {
                WrapMode::All
            } else if data_items {
                WrapMode::DataItems
            } else {
                WrapMode::Procedures
            };
            rt.block_on(rewrite::wrap(path, files, mode))
        }
        Commands::Entities { path } => rt.block_on(entities::run(path)),
        Commands::CreateRelated { file, kinds } => rt.block_on(rewrite::create_related(file, kinds)),
        Commands::Watch { path } => rt.block_on(watch::run(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_object_type() {
        assert_eq!(
            parse_object_type("TableExtension"),
            Ok(ObjectType::TableExtension)
        );
        assert!(parse_object_type("widget").is_err());
    }

    #[test]
    fn test_project_root_finds_manifest() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/sales")).unwrap();
        std::fs::write(dir.path().join("app.json"), "{}").unwrap();
        let file = dir.path().join("src/sales/Header.TableExt.al");
        assert_eq!(project_root(&file), dir.path());

        let loose = tempdir().unwrap();
        let file = loose.path().join("a.al");
        assert_eq!(project_root(&file), loose.path());
    }

    #[test]
    fn test_cli_parses_ranges() {
        let cli = Cli::try_parse_from([
            "alscope",
            "renumber",
            "/p",
            "--range",
            "50100..50149",
            "--range",
            "60000-60009",
        ])
        .unwrap();
        let Commands::Renumber { ranges, .. } = cli.command else {
            panic!("expected renumber");
        };
        assert_eq!(
            ranges,
            vec![IdRange::new(50100, 50149), IdRange::new(60000, 60009)]
        );
    }

    #[test]
    fn test_cli_wrap_all_conflicts_with_data_items() {
        let cli = Cli::try_parse_from(["alscope", "wrap", "/p", "--all"]).unwrap();
        assert!(matches!(cli.command, Commands::Wrap { all: true, .. }));
        assert!(Cli::try_parse_from(["alscope", "wrap", "/p", "--all", "--data-items"]).is_err());
    }
}
