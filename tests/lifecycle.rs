//! End-to-end tests: hooks, runner, registry and return-value bridge
//! working together over the fixture configuration root.

mod fixtures;

use std::collections::BTreeMap;
use std::sync::Arc;

use cfgweave::runner::DEFAULT_PIPELINE;
use cfgweave::{
    ComposeError, ConfigTree, HookError, MemoryCatalog, Node, Pipeline, PipelineRunner, Registry,
    ReturnBridge, RunError, Stage,
};
use fixtures::{conf_root, isolated_hooks, params_with_overrides};
use serde_json::json;

fn read_lr_pipeline() -> BTreeMap<String, Pipeline> {
    let node = Node::new("read_lr", &["cfg:model.lr"], "lr_seen", |inputs| {
        Ok(inputs[0].as_ref().clone())
    });
    let mut pipelines = BTreeMap::new();
    pipelines.insert(DEFAULT_PIPELINE.to_string(), Pipeline::new(vec![node]));
    pipelines
}

#[test]
fn test_simple_scenario_entries() {
    let hooks = Arc::new(isolated_hooks("simple"));
    let runner = PipelineRunner::new(conf_root()).with_hooks(Arc::clone(&hooks));

    let outcome = runner
        .run(&read_lr_pipeline(), DEFAULT_PIPELINE, &params_with_overrides("model.lr=0.05"))
        .unwrap();
    let catalog = &outcome.catalog;

    assert_eq!(*catalog.get("config").unwrap(), json!({"model": {"lr": 0.05, "depth": 3}}));
    assert_eq!(*catalog.get("cfg:model").unwrap(), json!({"lr": 0.05, "depth": 3}));
    assert_eq!(*catalog.get("cfg:model.lr").unwrap(), json!(0.05));
    assert_eq!(*catalog.get("cfg:model.depth").unwrap(), json!(3));
    assert_eq!(*catalog.get("lr_seen").unwrap(), json!(0.05));
}

#[test]
fn test_layered_scenario_with_group_selection() {
    let hooks = Arc::new(isolated_hooks("train"));
    let runner = PipelineRunner::new(conf_root()).with_hooks(hooks);

    let outcome = runner
        .run(
            &read_lr_pipeline(),
            DEFAULT_PIPELINE,
            &params_with_overrides("model=resnet optimizer=adam trainer.epochs=3"),
        )
        .unwrap();
    let catalog = &outcome.catalog;

    assert_eq!(*catalog.get("cfg:model.block.kind").unwrap(), json!("bottleneck"));
    assert_eq!(*catalog.get("cfg:optimizer.name").unwrap(), json!("adam"));
    assert_eq!(*catalog.get("cfg:trainer.epochs").unwrap(), json!(3));
    assert_eq!(*catalog.get("cfg:seed").unwrap(), json!(42));
    assert_eq!(*catalog.get("lr_seen").unwrap(), json!(0.01));
    assert!(!catalog.contains("cfg:optimizer.momentum"));
}

#[test]
fn test_composition_happens_once_across_runs() {
    let hooks = Arc::new(isolated_hooks("train"));
    let runner = PipelineRunner::new(conf_root()).with_hooks(Arc::clone(&hooks));
    let params = params_with_overrides("model.lr=0.5");

    let mut trees: Vec<ConfigTree> = Vec::new();
    for _ in 0..5 {
        let outcome = runner.run(&read_lr_pipeline(), DEFAULT_PIPELINE, &params).unwrap();
        assert_eq!(*outcome.catalog.get("lr_seen").unwrap(), json!(0.5));
        trees.push(hooks.guard().current().unwrap().tree.clone());
    }

    assert_eq!(hooks.guard().compositions(), 1);
    assert!(trees.iter().all(|t| ConfigTree::ptr_eq(t, &trees[0])));
}

#[test]
fn test_later_overrides_are_ignored_once_composed() {
    let hooks = Arc::new(isolated_hooks("simple"));
    let runner = PipelineRunner::new(conf_root()).with_hooks(Arc::clone(&hooks));

    runner
        .run(&read_lr_pipeline(), DEFAULT_PIPELINE, &params_with_overrides("model.lr=0.2"))
        .unwrap();
    let second = runner
        .run(&read_lr_pipeline(), DEFAULT_PIPELINE, &params_with_overrides("model.lr=0.9"))
        .unwrap();

    assert_eq!(*second.catalog.get("lr_seen").unwrap(), json!(0.2));
}

#[test]
fn test_failing_hook_aborts_run_with_stage() {
    let hooks = Arc::new(isolated_hooks("simple"));
    let runner = PipelineRunner::new(conf_root()).with_hooks(hooks);
    let catalog = MemoryCatalog::new();
    catalog.insert("raw_data", json!([1, 2])).unwrap();

    let pipelines = read_lr_pipeline();
    let err = runner
        .run_with_registry(
            &pipelines[DEFAULT_PIPELINE],
            DEFAULT_PIPELINE,
            &params_with_overrides("model.lr.decay=0.5"),
            &catalog,
        )
        .unwrap_err();

    match &err {
        RunError::Hook(hook) => {
            assert_eq!(hook.stage(), Stage::Compose);
            assert!(matches!(hook, HookError::Compose(ComposeError::InvalidOverridePath { .. })));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(catalog.names(), vec!["raw_data".to_string()]);
}

#[test]
fn test_missing_config_aborts_run() {
    let hooks = Arc::new(isolated_hooks("does_not_exist"));
    let runner = PipelineRunner::new(conf_root()).with_hooks(hooks);

    let err = runner
        .run(&read_lr_pipeline(), DEFAULT_PIPELINE, &BTreeMap::new())
        .unwrap_err();
    assert!(matches!(
        err,
        RunError::Hook(HookError::Compose(ComposeError::ConfigNotFound { .. }))
    ));
    assert_eq!(err.exit_code(), 3);
}

#[test]
fn test_bootstrap_registers_pipelines_through_bridge() {
    let hooks = Arc::new(isolated_hooks("train"));
    let runner = PipelineRunner::new(conf_root()).with_hooks(Arc::clone(&hooks));
    let args: Vec<String> = ["run", "--", "trainer.epochs=7"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    runner.run_command(&args).unwrap();

    let bridge = ReturnBridge::new();
    let pipelines = hooks
        .register(&bridge, runner.project_dir(), |cfg| {
            let epochs = cfg.get_i64("trainer.epochs").unwrap_or(0);
            let node = Node::new("epochs", &["cfg:trainer.epochs"], "epochs_seen", move |inputs| {
                assert_eq!(inputs[0].as_i64(), Some(epochs));
                Ok(json!(epochs))
            });
            let mut pipelines = BTreeMap::new();
            pipelines.insert(DEFAULT_PIPELINE.to_string(), Pipeline::new(vec![node]));
            pipelines
        })
        .unwrap();

    let outcome = runner
        .run(&pipelines, DEFAULT_PIPELINE, &BTreeMap::new())
        .unwrap();
    assert_eq!(*outcome.catalog.get("epochs_seen").unwrap(), json!(7));
    assert_eq!(hooks.guard().compositions(), 1);
}
