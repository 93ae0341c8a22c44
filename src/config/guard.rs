//! Process-wide composition guard.
//!
//! Lifecycle: `Pending` -> `Composing` -> `Composed`. The whole
//! check-then-compose sequence runs under one lock, so concurrent callers
//! serialize and all but the first read the cached composition. `Composing`
//! only exists while that lock is held, so observers see `Pending` or
//! `Composed`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use cfgweave_overrides::Override;
use serde::Serialize;

use super::compose::{ComposeError, Composer, Composition};
use super::tree::ConfigTree;

/// What to do when a cached composition was built from other overrides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GuardPolicy {
    /// Return the cached tree and log a warning.
    #[default]
    Lenient,
    /// Fail with [`ComposeError::OverridesConflict`].
    Strict,
}

/// Guard state as seen from outside a composition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardStatus {
    Pending,
    Composed,
}

#[derive(Debug)]
enum GuardState {
    Pending,
    Composing,
    Composed(Arc<Composition>),
}

/// Result of [`CompositionGuard::get_or_compose`]
#[derive(Debug, Clone)]
pub struct Composed {
    pub composition: Arc<Composition>,
    /// True when the cached composition was returned.
    pub reused: bool,
}

impl Composed {
    pub fn tree(&self) -> &ConfigTree {
        &self.composition.tree
    }
}

/// Holder of the single composition of a process.
#[derive(Debug)]
pub struct CompositionGuard {
    state: Mutex<GuardState>,
    policy: GuardPolicy,
    compositions: AtomicUsize,
}

impl Default for CompositionGuard {
    fn default() -> Self {
        Self::new(GuardPolicy::default())
    }
}

impl CompositionGuard {
    pub const fn new(policy: GuardPolicy) -> Self {
        Self {
            state: Mutex::new(GuardState::Pending),
            policy,
            compositions: AtomicUsize::new(0),
        }
    }

    /// The guard shared by the whole process.
    pub fn shared() -> Arc<CompositionGuard> {
        static SHARED: OnceLock<Arc<CompositionGuard>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| Arc::new(CompositionGuard::default())))
    }

    pub fn policy(&self) -> GuardPolicy {
        self.policy
    }

    /// Return the cached composition, or compose with `composer` if this is
    /// the first request.
    ///
    /// Once composed, `overrides` no longer have any effect.
    pub fn get_or_compose(
        &self,
        composer: &Composer,
        overrides: &[Override],
    ) -> Result<Composed, ComposeError> {
        let requested: Vec<String> = overrides.iter().map(|o| o.raw.clone()).collect();
        self.get_or_compose_with(composer, &requested, || composer.compose(overrides))
    }

    /// Like [`get_or_compose`](Self::get_or_compose) with a caller-supplied
    /// composition step. `target` names the configuration being requested.
    pub fn get_or_compose_with<F>(
        &self,
        target: &Composer,
        requested: &[String],
        compose: F,
    ) -> Result<Composed, ComposeError>
    where
        F: FnOnce() -> Result<Composition, ComposeError>,
    {
        let mut state = self.lock();

        let cached = match &*state {
            GuardState::Composed(existing) => Some(Arc::clone(existing)),
            _ => None,
        };
        if let Some(existing) = cached {
            drop(state);
            self.check_target(target, &existing)?;
            self.check_overrides(requested, &existing.overrides)?;
            tracing::debug!(config = %existing.config_name, "reusing composed configuration");
            return Ok(Composed {
                composition: existing,
                reused: true,
            });
        }

        *state = GuardState::Composing;
        match compose() {
            Ok(composition) => {
                let composition = Arc::new(composition);
                self.compositions.fetch_add(1, Ordering::SeqCst);
                *state = GuardState::Composed(Arc::clone(&composition));
                Ok(Composed {
                    composition,
                    reused: false,
                })
            }
            Err(e) => {
                *state = GuardState::Pending;
                Err(e)
            }
        }
    }

    pub fn status(&self) -> GuardStatus {
        match &*self.lock() {
            GuardState::Pending | GuardState::Composing => GuardStatus::Pending,
            GuardState::Composed(_) => GuardStatus::Composed,
        }
    }

    /// The cached composition, if any.
    pub fn current(&self) -> Option<Arc<Composition>> {
        match &*self.lock() {
            GuardState::Composed(c) => Some(Arc::clone(c)),
            _ => None,
        }
    }

    /// How many times a composition step actually ran to completion.
    pub fn compositions(&self) -> usize {
        self.compositions.load(Ordering::SeqCst)
    }

    /// Forget the cached composition. Meant for tests; a running process
    /// keeps its configuration for its lifetime.
    pub fn reset(&self) {
        *self.lock() = GuardState::Pending;
        self.compositions.store(0, Ordering::SeqCst);
    }

    // A panic inside a composition step leaves `Composing` behind a poisoned
    // lock; the next caller starts over.
    fn lock(&self) -> MutexGuard<'_, GuardState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => {
                let mut state = poisoned.into_inner();
                if matches!(*state, GuardState::Composing) {
                    *state = GuardState::Pending;
                }
                state
            }
        }
    }

    fn check_target(&self, target: &Composer, existing: &Composition) -> Result<(), ComposeError> {
        if target.config_name() == existing.config_name && target.root() == existing.root {
            return Ok(());
        }
        let requested = target.root().join(target.config_name());
        let composed = existing.root.join(&existing.config_name);
        match self.policy {
            GuardPolicy::Strict => Err(ComposeError::ConfigConflict {
                requested: requested.display().to_string(),
                composed: composed.display().to_string(),
            }),
            GuardPolicy::Lenient => {
                tracing::warn!(
                    requested = %requested.display(),
                    composed = %composed.display(),
                    "another configuration already composed in this process; reusing it"
                );
                Ok(())
            }
        }
    }

    fn check_overrides(
        &self,
        requested: &[String],
        composed: &[String],
    ) -> Result<(), ComposeError> {
        if requested == composed {
            return Ok(());
        }
        match self.policy {
            GuardPolicy::Strict => Err(ComposeError::OverridesConflict {
                requested: requested.to_vec(),
                composed: composed.to_vec(),
            }),
            GuardPolicy::Lenient => {
                tracing::warn!(
                    ?requested,
                    ?composed,
                    "configuration already composed in this process; ignoring new overrides"
                );
                Ok(())
            }
        }
    }
}
