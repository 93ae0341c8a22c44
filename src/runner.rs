//! Minimal pipeline runner.
//!
//! Runs command hooks once per command and, for every pipeline run, creates
//! the run's registry, runs pipeline hooks, then executes nodes in order.
//! Each node reads its inputs from the registry and writes its output back.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cfgweave_catalog::{Entry, MemoryCatalog, Registry, RegistryError};
use serde_json::Value;
use thiserror::Error;

use crate::error::HookError;
use crate::hooks::{BeforeCommandHook, BeforePipelineHook, CommandContext, RunContext};

/// Name of the pipeline run when none is selected.
pub const DEFAULT_PIPELINE: &str = "__default__";

type NodeFn = Arc<dyn Fn(&[Entry]) -> Result<Value, String> + Send + Sync>;

/// A step of a pipeline
#[derive(Clone)]
pub struct Node {
    pub name: String,
    pub inputs: Vec<String>,
    pub output: String,
    func: NodeFn,
}

impl Node {
    pub fn new<F>(name: &str, inputs: &[&str], output: &str, func: F) -> Self
    where
        F: Fn(&[Entry]) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            output: output.to_string(),
            func: Arc::new(func),
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

/// Ordered list of nodes
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    pub nodes: Vec<Node>,
}

impl Pipeline {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }
}

/// Run errors
#[derive(Debug, Error)]
pub enum RunError {
    #[error("hook failed during {} stage: {0}", .0.stage())]
    Hook(#[from] HookError),

    #[error("pipeline '{0}' is not registered")]
    UnknownPipeline(String),

    #[error("node '{node}': input '{input}' not found in registry")]
    MissingInput { node: String, input: String },

    #[error("node '{node}' failed: {message}")]
    NodeFailed { node: String, message: String },

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

impl RunError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::Hook(e) => e.exit_code(),
            RunError::UnknownPipeline(_) => 1,
            RunError::MissingInput { .. } => 10,
            RunError::NodeFailed { .. } => 11,
            RunError::Registry(_) => 5,
        }
    }
}

/// What a finished run left behind
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: String,
    pub pipeline: String,
    /// The run's registry, including node outputs.
    pub catalog: MemoryCatalog,
}

/// Dispatches hooks and executes pipelines.
#[derive(Default)]
pub struct PipelineRunner {
    project_dir: PathBuf,
    command_hooks: Vec<Arc<dyn BeforeCommandHook>>,
    pipeline_hooks: Vec<Arc<dyn BeforePipelineHook>>,
}

impl PipelineRunner {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            ..Self::default()
        }
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Register a hook for both hook points.
    pub fn with_hooks<H>(mut self, hooks: Arc<H>) -> Self
    where
        H: BeforeCommandHook + BeforePipelineHook + 'static,
    {
        self.command_hooks.push(hooks.clone());
        self.pipeline_hooks.push(hooks);
        self
    }

    pub fn with_command_hook(mut self, hook: Arc<dyn BeforeCommandHook>) -> Self {
        self.command_hooks.push(hook);
        self
    }

    pub fn with_pipeline_hook(mut self, hook: Arc<dyn BeforePipelineHook>) -> Self {
        self.pipeline_hooks.push(hook);
        self
    }

    /// Run the command hooks for `args`.
    pub fn run_command(&self, args: &[String]) -> Result<(), RunError> {
        let ctx = CommandContext {
            project_dir: &self.project_dir,
            args,
        };
        for hook in &self.command_hooks {
            hook.before_command_run(&ctx)?;
        }
        Ok(())
    }

    /// Run `name` from `pipelines` against a fresh registry.
    pub fn run(
        &self,
        pipelines: &BTreeMap<String, Pipeline>,
        name: &str,
        params: &BTreeMap<String, Value>,
    ) -> Result<RunOutcome, RunError> {
        let pipeline = pipelines
            .get(name)
            .ok_or_else(|| RunError::UnknownPipeline(name.to_string()))?;
        let catalog = MemoryCatalog::new();
        let run_id = self.run_with_registry(pipeline, name, params, &catalog)?;
        Ok(RunOutcome {
            run_id,
            pipeline: name.to_string(),
            catalog,
        })
    }

    /// Run `pipeline` against `registry`, returning the run id.
    pub fn run_with_registry(
        &self,
        pipeline: &Pipeline,
        name: &str,
        params: &BTreeMap<String, Value>,
        registry: &dyn Registry,
    ) -> Result<String, RunError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let ctx = RunContext {
            run_id: &run_id,
            pipeline: name,
            project_dir: &self.project_dir,
            extra_params: params,
            registry,
        };
        for hook in &self.pipeline_hooks {
            hook.before_pipeline_run(&ctx)?;
        }

        for node in &pipeline.nodes {
            let inputs = node
                .inputs
                .iter()
                .map(|input| {
                    registry.get(input).ok_or_else(|| RunError::MissingInput {
                        node: node.name.clone(),
                        input: input.clone(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let output = (node.func)(&inputs).map_err(|message| RunError::NodeFailed {
                node: node.name.clone(),
                message,
            })?;
            registry.insert(&node.output, output)?;
            tracing::debug!(run_id = %run_id, node = %node.name, "node completed");
        }

        tracing::info!(
            run_id = %run_id,
            pipeline = name,
            nodes = pipeline.nodes.len(),
            "pipeline run completed"
        );
        Ok(run_id)
    }
}
