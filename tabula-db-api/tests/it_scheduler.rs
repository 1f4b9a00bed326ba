//! Scheduled invalidation against a live registry (paused tokio clock).

mod support;

use std::sync::Arc;
use std::time::Duration;
use support::expenses;
use tabula_db_api::{DataSetInvalidationTask, DataSetRegistry, Scheduler};

fn registry_with(uuid: &str) -> Arc<DataSetRegistry> {
    let registry = Arc::new(DataSetRegistry::default());
    registry.register(expenses(uuid, &[1.0, 2.0]));
    registry
}

#[tokio::test(start_paused = true)]
async fn invalidation_removes_dataset_when_due() {
    let registry = registry_with("e");
    let scheduler = Scheduler::current().unwrap();
    scheduler.schedule(
        Arc::new(DataSetInvalidationTask::new("e", &registry)),
        Duration::from_secs(30),
    );

    tokio::time::sleep(Duration::from_secs(29)).await;
    assert!(registry.contains("e"));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!registry.contains("e"));
    assert!(scheduler.pending_keys().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unschedule_then_schedule_keeps_one_timer() {
    let registry = registry_with("e");
    let scheduler = Scheduler::current().unwrap();
    let task = Arc::new(DataSetInvalidationTask::new("e", &registry));

    scheduler.schedule(task.clone(), Duration::from_secs(10));
    // re-registering a definition: cancel, then arm a longer timer
    scheduler.unschedule("e");
    scheduler.unschedule("e");
    scheduler.schedule(task, Duration::from_secs(60));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(registry.contains("e"));
    assert_eq!(scheduler.pending_keys(), vec!["e"]);

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(!registry.contains("e"));
}

#[tokio::test(start_paused = true)]
async fn task_handle_cancels() {
    let registry = registry_with("e");
    let scheduler = Scheduler::current().unwrap();
    let handle = scheduler.schedule(
        Arc::new(DataSetInvalidationTask::new("e", &registry)),
        Duration::from_secs(5),
    );
    assert_eq!(handle.key(), "e");
    handle.cancel();
    assert!(!scheduler.is_scheduled("e"));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(registry.contains("e"));
}

#[tokio::test(start_paused = true)]
async fn invalidation_after_registry_dropped_is_harmless() {
    let registry = registry_with("e");
    let scheduler = Scheduler::current().unwrap();
    let handle = scheduler.schedule(
        Arc::new(DataSetInvalidationTask::new("e", &registry)),
        Duration::from_secs(1),
    );
    drop(registry);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(handle.is_finished());
}

#[tokio::test(start_paused = true)]
async fn dropping_scheduler_aborts_pending_timers() {
    let registry = registry_with("e");
    let scheduler = Scheduler::current().unwrap();
    scheduler.schedule(
        Arc::new(DataSetInvalidationTask::new("e", &registry)),
        Duration::from_secs(1),
    );
    drop(scheduler);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(registry.contains("e"));
}

#[tokio::test(start_paused = true)]
async fn invalidation_bound_to_instance_spares_newer_registration() {
    let registry = Arc::new(DataSetRegistry::default());
    let armed = registry.register(expenses("e", &[1.0, 2.0]));
    let scheduler = Scheduler::current().unwrap();
    scheduler.schedule(
        Arc::new(DataSetInvalidationTask::new("e", &registry).for_instance(armed.instance_id())),
        Duration::from_secs(5),
    );

    // replaced before the timer fires
    let newer = registry.register(expenses("e", &[3.0]));
    tokio::time::sleep(Duration::from_secs(6)).await;

    let live = registry.entry("e").expect("newer instance kept");
    assert_eq!(live.instance_id(), newer.instance_id());
}

#[tokio::test(start_paused = true)]
async fn invalidation_bound_to_instance_removes_it_when_still_live() {
    let registry = Arc::new(DataSetRegistry::default());
    let armed = registry.register(expenses("e", &[1.0]));
    let scheduler = Scheduler::current().unwrap();
    scheduler.schedule(
        Arc::new(DataSetInvalidationTask::new("e", &registry).for_instance(armed.instance_id())),
        Duration::from_secs(5),
    );

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(!registry.contains("e"));
}
