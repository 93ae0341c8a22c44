//! Return-value bridge for callback-only entry points.
//!
//! [`run_with_config`] hands the composed tree to a task and, like any
//! framework main, gives nothing back but failure. [`ReturnBridge`] carries
//! the task's result out through a single slot: cleared before the call,
//! written by the task, taken after the call returns.

use std::sync::{Mutex, MutexGuard};

use cfgweave_overrides::Override;

use crate::config::{ComposeError, Composer, CompositionGuard, ConfigTree};
use crate::error::HookError;

/// Bridge errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    #[error("callback returned without producing a value")]
    CallbackDidNotProduceValue,
}

/// Slot a callback writes its result into.
#[derive(Debug)]
pub struct ReturnSlot<T> {
    value: Mutex<Option<T>>,
}

impl<T> ReturnSlot<T> {
    const fn new() -> Self {
        Self {
            value: Mutex::new(None),
        }
    }

    /// Store the callback's result, replacing anything written before.
    pub fn put(&self, value: T) {
        *lock(&self.value) = Some(value);
    }

    fn clear(&self) {
        *lock(&self.value) = None;
    }

    fn take(&self) -> Option<T> {
        lock(&self.value).take()
    }
}

/// Single-slot channel from a callback back to the code that triggered it.
///
/// Invocations are serialized; a slot never carries a value from one
/// invocation into the next.
#[derive(Debug)]
pub struct ReturnBridge<T> {
    in_flight: Mutex<()>,
    slot: ReturnSlot<T>,
}

impl<T> Default for ReturnBridge<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReturnBridge<T> {
    pub const fn new() -> Self {
        Self {
            in_flight: Mutex::new(()),
            slot: ReturnSlot::new(),
        }
    }

    /// Run `entry`, which is expected to call back into the slot exactly
    /// once, and return what the callback wrote.
    pub fn invoke_with_bridge<F>(&self, entry: F) -> Result<T, BridgeError>
    where
        F: FnOnce(&ReturnSlot<T>),
    {
        let _in_flight = lock(&self.in_flight);
        self.slot.clear();
        entry(&self.slot);
        self.slot
            .take()
            .ok_or(BridgeError::CallbackDidNotProduceValue)
    }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Compose (once per guard) and run `task` with the tree.
///
/// The task's own result has nowhere to go; see [`compose_and_return`].
pub fn run_with_config<F>(
    guard: &CompositionGuard,
    composer: &Composer,
    overrides: &[Override],
    task: F,
) -> Result<(), ComposeError>
where
    F: FnOnce(&ConfigTree),
{
    let composed = guard.get_or_compose(composer, overrides)?;
    task(composed.tree());
    Ok(())
}

/// Run `task` through [`run_with_config`] and return its result.
pub fn compose_and_return<T, F>(
    bridge: &ReturnBridge<T>,
    guard: &CompositionGuard,
    composer: &Composer,
    overrides: &[Override],
    task: F,
) -> Result<T, HookError>
where
    F: FnOnce(&ConfigTree) -> T,
{
    let mut composed = Ok(());
    let value = bridge.invoke_with_bridge(|slot| {
        composed = run_with_config(guard, composer, overrides, |cfg| slot.put(task(cfg)));
    });
    composed?;
    Ok(value?)
}
