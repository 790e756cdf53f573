//! Plugin background task tests.

mod common;

use common::*;
use radiolink_core::error::codes;
use radiolink_core::{Error, TaskMode};

#[test]
fn test_supervised_task_stopped_before_unload_returns() {
    let fx = Fixture::new();
    let path = fx.plugin("series1.so", &SUPERVISED);
    let owner = instance();
    let hooks = HookLog::new();

    fx.registry.load(&path, Some(&owner), hooks.arg()).unwrap();
    let record = fx.registry.find(&path, Some(&owner)).unwrap();
    assert_eq!(record.task_mode(), Some(TaskMode::SupervisedRestart));
    assert!(record.has_task());
    assert_eq!(owner.supervisor().len(), 1);
    assert!(wait_for(|| HookLog::count(&hooks.task_running) == 1));

    fx.registry.unload(&path, Some(&owner)).unwrap();
    assert_eq!(HookLog::count(&hooks.task_running), 0);
    assert_eq!(HookLog::count(&hooks.task_cancelled), 1);
    assert!(owner.supervisor().is_empty());
    assert!(!record.has_task());
}

#[test]
fn test_supervised_task_is_restarted() {
    let fx = Fixture::new();
    let path = fx.plugin("flaky.so", &FLAKY_SUPERVISED);
    let owner = instance();
    let hooks = HookLog::new();

    fx.registry.load(&path, Some(&owner), hooks.arg()).unwrap();
    assert!(wait_for(|| HookLog::count(&hooks.task_starts) >= 3));

    fx.registry.unload(&path, Some(&owner)).unwrap();
    let starts = HookLog::count(&hooks.task_starts);
    std::thread::sleep(std::time::Duration::from_millis(20));
    assert_eq!(HookLog::count(&hooks.task_starts), starts);
}

#[test]
fn test_run_once_task_is_cancelled_on_unload() {
    let fx = Fixture::new();
    let path = fx.plugin("heartbeat.so", &RUN_ONCE);
    let owner = instance();
    let hooks = HookLog::new();

    fx.registry.load(&path, Some(&owner), hooks.arg()).unwrap();
    assert!(wait_for(|| HookLog::count(&hooks.task_running) == 1));
    // Run-once tasks are not monitored.
    assert!(owner.supervisor().is_empty());

    fx.registry.unload(&path, Some(&owner)).unwrap();
    assert!(wait_for(|| HookLog::count(&hooks.task_running) == 0));
    assert_eq!(HookLog::count(&hooks.task_cancelled), 1);
    assert_eq!(HookLog::count(&hooks.task_starts), 1);
}

#[test]
fn test_run_once_task_without_owner() {
    let fx = Fixture::new();
    let path = fx.plugin("heartbeat.so", &RUN_ONCE);
    let hooks = HookLog::new();

    fx.registry.load(&path, None, hooks.arg()).unwrap();
    assert!(wait_for(|| HookLog::count(&hooks.task_running) == 1));

    fx.registry.unload(&path, None).unwrap();
    assert!(wait_for(|| HookLog::count(&hooks.task_running) == 0));
    assert_eq!(HookLog::count(&hooks.removes), 1);
}

#[test]
fn test_each_owner_gets_its_own_task() {
    let fx = Fixture::new();
    let path = fx.plugin("series1.so", &SUPERVISED);
    let (first, second) = (instance(), instance());
    let hooks = HookLog::new();

    fx.registry.load(&path, Some(&first), hooks.arg()).unwrap();
    fx.registry.load(&path, Some(&second), hooks.arg()).unwrap();
    assert!(wait_for(|| HookLog::count(&hooks.task_running) == 2));

    fx.registry.unload(&path, Some(&first)).unwrap();
    assert_eq!(HookLog::count(&hooks.task_running), 1);
    assert!(first.supervisor().is_empty());
    assert_eq!(second.supervisor().len(), 1);

    second.shutdown();
    assert_eq!(HookLog::count(&hooks.task_running), 0);
}

#[test]
fn test_task_start_failure_rolls_back_load() {
    let fx = Fixture::new();
    let path = fx.plugin("series1.so", &SUPERVISED);
    let owner = instance();
    let hooks = HookLog::new();
    owner.supervisor().close();

    let err = fx.registry.load(&path, Some(&owner), hooks.arg()).unwrap_err();
    assert!(matches!(err, Error::Thread(_)));
    assert_eq!(err.code(), codes::THREAD);

    assert!(fx.registry.is_empty());
    assert_eq!(owner.plugin_count(), 0);
    assert_eq!(HookLog::count(&hooks.inits), 1);
    assert_eq!(HookLog::count(&hooks.removes), 1);
    assert_eq!(HookLog::count(&hooks.task_starts), 0);

    // Nothing left behind: a later unload finds nothing to do.
    fx.registry.unload(&path, Some(&owner)).unwrap();
    assert_eq!(HookLog::count(&hooks.removes), 1);
}
