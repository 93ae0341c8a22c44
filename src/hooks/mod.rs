//! Lifecycle hooks invoked by the pipeline runner.
//!
//! A hook implements one trait per point it wants to be called at.

mod config_hooks;

pub use config_hooks::{ConfigHooks, OVERRIDES_PARAM, OVERRIDES_PARAM_SHORT};

use std::collections::BTreeMap;
use std::path::Path;

use cfgweave_catalog::Registry;
use serde_json::Value;

use crate::error::HookError;

/// Invocation context of a command
#[derive(Debug, Clone, Copy)]
pub struct CommandContext<'a> {
    /// Directory the project runs from; relative config roots resolve here.
    pub project_dir: &'a Path,
    /// Raw command arguments, program name excluded.
    pub args: &'a [String],
}

/// Context of a single pipeline run
#[derive(Clone, Copy)]
pub struct RunContext<'a> {
    pub run_id: &'a str,
    pub pipeline: &'a str,
    pub project_dir: &'a Path,
    /// Extra parameters passed to the run.
    pub extra_params: &'a BTreeMap<String, Value>,
    /// The run's registry.
    pub registry: &'a dyn Registry,
}

/// Called once before a command executes.
pub trait BeforeCommandHook: Send + Sync {
    fn before_command_run(&self, ctx: &CommandContext<'_>) -> Result<(), HookError>;
}

/// Called before every pipeline run, after the run's registry exists.
pub trait BeforePipelineHook: Send + Sync {
    fn before_pipeline_run(&self, ctx: &RunContext<'_>) -> Result<(), HookError>;
}
