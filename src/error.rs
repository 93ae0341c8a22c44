//! Errors raised while preparing a pipeline run.

use std::fmt;

use cfgweave_catalog::RegistryError;
use cfgweave_overrides::OverrideError;
use serde::Serialize;
use thiserror::Error;

use crate::bridge::BridgeError;
use crate::config::ComposeError;
use crate::flatten::FlattenError;

/// Step of configuration injection that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Parse,
    Compose,
    Flatten,
    Publish,
    Bridge,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Parse => "parse",
            Stage::Compose => "compose",
            Stage::Flatten => "flatten",
            Stage::Publish => "publish",
            Stage::Bridge => "bridge",
        };
        f.write_str(name)
    }
}

/// Hook errors. Any of these aborts the run before its first node.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("parse failed: {0}")]
    Parse(#[from] OverrideError),

    #[error("compose failed: {0}")]
    Compose(#[from] ComposeError),

    #[error("flatten failed: {0}")]
    Flatten(#[from] FlattenError),

    #[error("publish failed: {0}")]
    Publish(#[from] RegistryError),

    #[error("bridge failed: {0}")]
    Bridge(#[from] BridgeError),
}

impl HookError {
    pub fn stage(&self) -> Stage {
        match self {
            HookError::Parse(_) => Stage::Parse,
            // Key collisions are found while freezing the composed tree
            HookError::Compose(ComposeError::Flatten(_)) => Stage::Flatten,
            HookError::Compose(_) => Stage::Compose,
            HookError::Flatten(_) => Stage::Flatten,
            HookError::Publish(_) => Stage::Publish,
            HookError::Bridge(_) => Stage::Bridge,
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self.stage() {
            Stage::Parse => 2,
            Stage::Compose => 3,
            Stage::Flatten => 4,
            Stage::Publish => 5,
            Stage::Bridge => 6,
        }
    }
}
