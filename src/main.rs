//! cfgweave CLI
//!
//! Entry point for the `cfgweave` command-line tool.

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use cfgweave::config::{resolve_root, Composer, CompositionGuard};
use cfgweave::flatten::{flatten, flatten_value};
use cfgweave::publish::entry_name;
use cfgweave::runner::DEFAULT_PIPELINE;
use cfgweave::hooks::OVERRIDES_PARAM;
use cfgweave::{
    ConfigHooks, ConfigTree, HookError, Node, Pipeline, PipelineRunner, Registry, ReturnBridge,
    RunError,
};
use clap::{Args, Parser, Subcommand};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cfgweave")]
#[command(about = "Compose layered configuration and inject it into pipeline runs", version)]
struct Cli {
    /// Enable debug logging (overrides RUST_LOG)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    /// Configuration root directory (default: $CONF_ROOT)
    #[arg(long, short = 'r')]
    config_root: Option<PathBuf>,

    /// Primary configuration name, with or without .toml
    #[arg(long, short = 'n', default_value = "config")]
    config_name: String,

    /// Override expressions, e.g. `-- model.lr=0.05 +trainer.seed=7`
    #[arg(last = true)]
    overrides: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the composed configuration tree
    Compose {
        #[command(flatten)]
        source: SourceArgs,

        /// Print sources, overrides and digest alongside the tree
        #[arg(long)]
        provenance: bool,
    },

    /// Print the flattened `cfg:` entries
    Flatten {
        #[command(flatten)]
        source: SourceArgs,

        /// Only entries at this depth
        #[arg(long, short = 'd')]
        depth: Option<usize>,
    },

    /// Run a pipeline with the configuration injected and print registry entries
    Get {
        /// Registry names to print (glob patterns, e.g. 'cfg:model.*')
        keys: Vec<String>,

        /// Pipeline to run
        #[arg(long, short = 'p', default_value = DEFAULT_PIPELINE)]
        pipeline: String,

        /// Overrides passed to the run as one string, e.g. "model.lr=0.05 seed=7".
        /// Takes precedence over overrides given after `--`.
        #[arg(long = "overrides", id = "overrides_string")]
        overrides: Option<String>,

        #[command(flatten)]
        source: SourceArgs,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let project_dir = match env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("error: cannot determine current directory: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Compose { source, provenance } => {
            run_compose(&project_dir, &source, provenance)
        }
        Commands::Flatten { source, depth } => run_flatten(&project_dir, &source, depth),
        Commands::Get {
            source,
            pipeline,
            overrides,
            keys,
        } => run_get(&project_dir, &source, &pipeline, overrides.as_deref(), &keys),
    };

    match result {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("{}", e);
            process::exit(e.exit_code());
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// CLI failure with the exit code it maps to
struct CliError {
    message: String,
    code: i32,
}

impl CliError {
    fn exit_code(&self) -> i32 {
        self.code
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<HookError> for CliError {
    fn from(e: HookError) -> Self {
        Self {
            message: format!("error ({}): {}", e.stage(), e),
            code: e.exit_code(),
        }
    }
}

impl From<RunError> for CliError {
    fn from(e: RunError) -> Self {
        match e {
            RunError::Hook(hook) => hook.into(),
            other => Self {
                message: format!("error (run): {}", other),
                code: other.exit_code(),
            },
        }
    }
}

fn usage_error(message: String) -> CliError {
    CliError { message, code: 1 }
}

fn to_pretty(value: &impl serde::Serialize) -> Result<String, CliError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| usage_error(format!("error: JSON serialization failed: {}", e)))
}

fn compose_tree(
    project_dir: &Path,
    source: &SourceArgs,
) -> Result<Arc<cfgweave::Composition>, HookError> {
    let root = resolve_root(source.config_root.as_deref(), project_dir)?;
    let overrides = cfgweave_overrides::parse(&source.overrides)?;
    let composer = Composer::new(root, &source.config_name);
    let composed = CompositionGuard::shared().get_or_compose(&composer, &overrides)?;
    Ok(composed.composition)
}

fn run_compose(
    project_dir: &Path,
    source: &SourceArgs,
    provenance: bool,
) -> Result<String, CliError> {
    let composition = compose_tree(project_dir, source)?;

    if !provenance {
        return to_pretty(&composition.tree);
    }

    let digest = composition
        .tree
        .digest()
        .map_err(|e| usage_error(format!("error: digest failed: {}", e)))?;
    to_pretty(&json!({
        "config_name": composition.config_name,
        "digest": digest,
        "created_at": composition.created_at,
        "overrides": composition.overrides,
        "sources": composition.sources,
        "config": composition.tree,
    }))
}

fn run_flatten(
    project_dir: &Path,
    source: &SourceArgs,
    depth: Option<usize>,
) -> Result<String, CliError> {
    let composition = compose_tree(project_dir, source)?;
    let flat = flatten(&composition.tree).map_err(HookError::from)?;

    let entries: BTreeMap<String, &Value> = flat
        .iter()
        .filter(|entry| depth.map_or(true, |d| entry.depth == d))
        .map(|entry| (entry_name(&entry.key), &entry.value))
        .collect();
    to_pretty(&entries)
}

fn run_get(
    project_dir: &Path,
    source: &SourceArgs,
    pipeline: &str,
    overrides: Option<&str>,
    keys: &[String],
) -> Result<String, CliError> {
    let mut hooks = ConfigHooks::new(&source.config_name);
    if let Some(root) = &source.config_root {
        hooks = hooks.with_config_root(root.clone());
    }
    let hooks = Arc::new(hooks);
    let runner = PipelineRunner::new(project_dir).with_hooks(Arc::clone(&hooks));

    runner.run_command(&command_args(pipeline, &source.overrides))?;

    let params = run_params(overrides);
    let bridge = ReturnBridge::new();
    let pipelines = hooks.register_for_run(&bridge, project_dir, &params, register_pipelines)?;
    let outcome = runner.run(&pipelines, pipeline, &params)?;

    let patterns = build_globset(keys)?;
    let selected: BTreeMap<String, Value> = outcome
        .catalog
        .snapshot()
        .into_iter()
        .filter(|(name, _)| patterns.as_ref().map_or(true, |set| set.is_match(name)))
        .map(|(name, value)| (name, value.as_ref().clone()))
        .collect();

    if selected.is_empty() && !keys.is_empty() {
        return Err(usage_error(format!(
            "error: no registry entries match {:?} (available: {})",
            keys,
            outcome.catalog.names().join(", ")
        )));
    }
    to_pretty(&selected)
}

/// Command line as the runner's command hooks see it: overrides follow `--`.
fn command_args(pipeline: &str, overrides: &[String]) -> Vec<String> {
    let mut args = vec!["get".to_string(), "--pipeline".to_string(), pipeline.to_string()];
    if !overrides.is_empty() {
        args.push("--".to_string());
        args.extend(overrides.iter().cloned());
    }
    args
}

/// Extra run parameters carrying the `--overrides` string, if given.
fn run_params(overrides: Option<&str>) -> BTreeMap<String, Value> {
    let mut params = BTreeMap::new();
    if let Some(raw) = overrides {
        params.insert(OVERRIDES_PARAM.to_string(), Value::String(raw.to_string()));
    }
    params
}

/// Pipelines available to `get`, built from the composed tree.
fn register_pipelines(cfg: &ConfigTree) -> BTreeMap<String, Pipeline> {
    let depth = cfg.depth();
    let describe = Node::new("describe", &["config"], "config_summary", move |inputs| {
        let flat = flatten_value(&inputs[0]).map_err(|e| e.to_string())?;
        Ok(json!({
            "nodes": flat.len(),
            "leaves": flat.leaves().count(),
            "depth": depth,
        }))
    });

    let mut pipelines = BTreeMap::new();
    pipelines.insert(DEFAULT_PIPELINE.to_string(), Pipeline::new(vec![describe]));
    pipelines
}

fn build_globset(patterns: &[String]) -> Result<Option<GlobSet>, CliError> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| usage_error(format!("error: invalid pattern '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map(Some)
        .map_err(|e| usage_error(format!("error: invalid patterns: {}", e)))
}
