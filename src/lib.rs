//! cfgweave - layered configuration for pipeline runs
//!
//! Composes a configuration tree from TOML documents and override
//! expressions at most once per process, flattens it into one entry per
//! node, and publishes those entries into each pipeline run's registry as
//! `config` and `cfg:<dotted.path>`.

pub mod bridge;
pub mod config;
pub mod error;
pub mod flatten;
pub mod hooks;
pub mod publish;
pub mod runner;

pub use bridge::{compose_and_return, run_with_config, BridgeError, ReturnBridge, ReturnSlot};
pub use cfgweave_catalog::{MemoryCatalog, Registry, RegistryError};
pub use cfgweave_overrides::{Override, OverrideError, OverrideKind};
pub use config::{ComposeError, Composer, Composition, CompositionGuard, ConfigTree, GuardPolicy};
pub use error::{HookError, Stage};
pub use flatten::{flatten, FlatConfig, FlattenError, FlattenedEntry};
pub use hooks::{BeforeCommandHook, BeforePipelineHook, ConfigHooks};
pub use publish::publish;
pub use runner::{Node, Pipeline, PipelineRunner, RunError};
