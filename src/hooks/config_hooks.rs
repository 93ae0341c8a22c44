//! Hook composing the configuration and publishing it into every run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use cfgweave_overrides::{parse, parse_str, Override, OverrideError};
use serde_json::Value;

use super::{BeforeCommandHook, BeforePipelineHook, CommandContext, RunContext};
use crate::bridge::{compose_and_return, ReturnBridge};
use crate::config::{resolve_root, Composed, Composer, CompositionGuard, ConfigTree, SearchPath};
use crate::error::HookError;
use crate::flatten::flatten;
use crate::publish::publish;

/// Extra-parameter key holding override expressions.
pub const OVERRIDES_PARAM: &str = "hydra_overrides";

/// Short alias of [`OVERRIDES_PARAM`].
pub const OVERRIDES_PARAM_SHORT: &str = "ho";

/// Separates runner arguments from override expressions on a command line.
const ARGS_SEPARATOR: &str = "--";

/// Composes the configuration once per process and publishes it as
/// `config` and `cfg:<path>` entries before each pipeline run.
#[derive(Debug)]
pub struct ConfigHooks {
    config_name: String,
    config_root: Option<PathBuf>,
    guard: Arc<CompositionGuard>,
    search: Arc<SearchPath>,
    command_overrides: Mutex<Vec<Override>>,
}

impl ConfigHooks {
    /// Hooks bound to the process-wide guard and search path.
    pub fn new(config_name: &str) -> Self {
        Self::with_state(config_name, CompositionGuard::shared(), SearchPath::shared())
    }

    /// Hooks bound to explicit state.
    pub fn with_state(
        config_name: &str,
        guard: Arc<CompositionGuard>,
        search: Arc<SearchPath>,
    ) -> Self {
        Self {
            config_name: config_name.to_string(),
            config_root: None,
            guard,
            search,
            command_overrides: Mutex::new(Vec::new()),
        }
    }

    /// Use `root` instead of the `CONF_ROOT` environment variable.
    pub fn with_config_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config_root = Some(root.into());
        self
    }

    pub fn guard(&self) -> &Arc<CompositionGuard> {
        &self.guard
    }

    /// Initialize the search path even if it already is.
    ///
    /// Fails with `AlreadyInitialized` unless the search path was reset.
    pub fn reinitialize(&self, project_dir: &Path) -> Result<(), HookError> {
        let root = resolve_root(self.config_root.as_deref(), project_dir)?;
        self.search.initialize(&root)?;
        Ok(())
    }

    /// Compose with the overrides captured from the command line and return
    /// what `register` builds from the tree.
    pub fn register<T, F>(
        &self,
        bridge: &ReturnBridge<T>,
        project_dir: &Path,
        register: F,
    ) -> Result<T, HookError>
    where
        F: FnOnce(&ConfigTree) -> T,
    {
        self.register_for_run(bridge, project_dir, &BTreeMap::new(), register)
    }

    /// Like [`register`](Self::register), taking overrides from `params`
    /// the way a pipeline run does, so the run reuses the same tree.
    pub fn register_for_run<T, F>(
        &self,
        bridge: &ReturnBridge<T>,
        project_dir: &Path,
        params: &BTreeMap<String, Value>,
        register: F,
    ) -> Result<T, HookError>
    where
        F: FnOnce(&ConfigTree) -> T,
    {
        let composer = Composer::new(self.root(project_dir)?, &self.config_name);
        let overrides = self.run_overrides(params)?;
        compose_and_return(bridge, &self.guard, &composer, &overrides, register)
    }

    /// Compose (or reuse) the tree for a run with `overrides`.
    pub fn compose(
        &self,
        project_dir: &Path,
        overrides: &[Override],
    ) -> Result<Composed, HookError> {
        let composer = Composer::new(self.root(project_dir)?, &self.config_name);
        Ok(self.guard.get_or_compose(&composer, overrides)?)
    }

    fn root(&self, project_dir: &Path) -> Result<PathBuf, HookError> {
        match self.search.root() {
            Some(root) => Ok(root),
            None => Ok(resolve_root(self.config_root.as_deref(), project_dir)?),
        }
    }

    fn captured_overrides(&self) -> Vec<Override> {
        match self.command_overrides.lock() {
            Ok(overrides) => overrides.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Overrides for a run: the run's extra parameters if they carry any,
    /// else those captured from the command line.
    fn run_overrides(&self, params: &BTreeMap<String, Value>) -> Result<Vec<Override>, HookError> {
        let param = params
            .get(OVERRIDES_PARAM)
            .or_else(|| params.get(OVERRIDES_PARAM_SHORT));

        match param {
            None | Some(Value::Null) => Ok(self.captured_overrides()),
            Some(Value::String(raw)) => Ok(parse_str(raw)?),
            Some(Value::Array(items)) => {
                let tokens = items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => Ok(s.clone()),
                        other => Err(OverrideError::Malformed {
                            raw: other.to_string(),
                            reason: "override list entries must be strings".to_string(),
                        }),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(parse(&tokens)?)
            }
            Some(other) => Err(OverrideError::Malformed {
                raw: other.to_string(),
                reason: format!("'{}' must be a string or a list of strings", OVERRIDES_PARAM),
            }
            .into()),
        }
    }
}

impl BeforeCommandHook for ConfigHooks {
    /// Capture overrides following `--` and initialize the search path.
    fn before_command_run(&self, ctx: &CommandContext<'_>) -> Result<(), HookError> {
        let tokens = ctx
            .args
            .iter()
            .position(|a| a == ARGS_SEPARATOR)
            .map(|at| &ctx.args[at + 1..])
            .unwrap_or(&[]);
        let overrides = parse(tokens)?;

        if self.search.is_initialized() {
            tracing::debug!("config search path already initialized, skipping");
        } else {
            let root = resolve_root(self.config_root.as_deref(), ctx.project_dir)?;
            self.search.initialize(&root)?;
        }

        match self.command_overrides.lock() {
            Ok(mut captured) => *captured = overrides,
            Err(poisoned) => *poisoned.into_inner() = overrides,
        }
        Ok(())
    }
}

impl BeforePipelineHook for ConfigHooks {
    fn before_pipeline_run(&self, ctx: &RunContext<'_>) -> Result<(), HookError> {
        let overrides = self.run_overrides(ctx.extra_params)?;
        let composed = self.compose(ctx.project_dir, &overrides)?;
        let flat = flatten(composed.tree())?;
        publish(ctx.registry, composed.tree(), &flat)?;

        tracing::debug!(
            run_id = ctx.run_id,
            pipeline = ctx.pipeline,
            reused = composed.reused,
            "configuration injected"
        );
        Ok(())
    }
}
