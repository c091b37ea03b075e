use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tsx_extract::analysis::{ExtractResultByName, QueryKind, SourceFile, ValueKind};
use tsx_extract::error_ext::ResultExt;
use tsx_extract::{ConfigManager, Engine, ExtractorConfig, FileTable};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Flag {
    SkipFullEvaluation,
    SkipCrossFileTraversal,
    SkipConditionalResolution,
}

/// Extract statically known values from TS/JSX call sites, elements and
/// tagged templates.
#[derive(Debug, Parser)]
#[command(name = "tsx-extract", version)]
struct Cli {
    /// Workspace root; imports are not followed outside it
    #[arg(long)]
    root: Option<PathBuf>,

    /// Config file (defaults to extractor.toml in the root)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Evaluation switches, repeatable
    #[arg(long = "flag", value_enum)]
    flags: Vec<Flag>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,

    /// Files or directories to scan
    #[arg(required = true)]
    paths: Vec<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let root = match &cli.root {
        Some(root) => root.clone(),
        None => std::env::current_dir().context("Failed to read current directory")?,
    };

    let manager = ConfigManager::new();
    let mut config = match &cli.config {
        Some(path) => manager.load_file(path),
        None => manager.load_from_workspace(&root),
    }
    .context("Failed to load configuration")?;

    for flag in &cli.flags {
        match flag {
            Flag::SkipFullEvaluation => config.flags.skip_full_evaluation = true,
            Flag::SkipCrossFileTraversal => config.flags.skip_cross_file_traversal = true,
            Flag::SkipConditionalResolution => config.flags.skip_conditional_resolution = true,
        }
    }

    let request = config.request().context("Invalid matcher configuration")?;
    let files = Arc::new(FileTable::new(Some(
        config.workspace.root.clone().unwrap_or(root),
    )));
    let engine = Engine::new(Arc::clone(&files));

    let sources = collect_sources(&cli.paths, &config);
    info!(count = sources.len(), "Scanning source files");

    let mut reports = Vec::with_capacity(sources.len());
    for path in sources {
        let Some(file) = files.load(&path).ok_warn("load source file") else {
            continue;
        };
        let results = engine.extract(&file, &request);
        if results.is_empty() {
            continue;
        }
        reports.push(file_report(&engine, &file, &results));
    }

    let document = json!({ "files": reports });
    let output = if cli.pretty {
        serde_json::to_string_pretty(&document)
    } else {
        serde_json::to_string(&document)
    }
    .context("Failed to serialize results")?;
    println!("{}", output);
    Ok(())
}

/// Expand directories into the source files below them, honoring ignore
/// files.
fn collect_sources(paths: &[PathBuf], config: &ExtractorConfig) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for path in paths {
        if path.is_file() {
            out.push(path.clone());
            continue;
        }

        let walker = ignore::WalkBuilder::new(path)
            .hidden(false)
            .git_ignore(true)
            .require_git(false)
            .build();
        for entry in walker.flatten() {
            let entry_path = entry.path();
            if entry_path.is_file() && config.is_source_file(entry_path) {
                out.push(entry_path.to_path_buf());
            }
        }
    }
    out.sort();
    out.dedup();
    out
}

fn file_report(engine: &Engine, file: &SourceFile, results: &ExtractResultByName) -> Value {
    let mut by_name = Map::new();
    for (name, item) in results {
        let instances: Vec<Value> = item
            .query_list
            .iter()
            .map(|query| {
                let unboxed = match (&query.kind, &query.value.kind) {
                    (QueryKind::CallExpression, ValueKind::Array(args)) => engine.unbox_list(args),
                    _ => engine.unbox(&query.value),
                };
                unboxed.to_json()
            })
            .collect();
        by_name.insert(
            name.to_string(),
            json!({ "kind": item.kind, "instances": instances }),
        );
    }

    json!({
        "path": display_path(&file.path),
        "results": by_name,
    })
}

fn display_path(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
