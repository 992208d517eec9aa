//! Batch control through tag queries and task groups.

mod common;

use std::sync::Arc;

use chrono::Duration;
use pretty_assertions::assert_eq;

use metronome::testing::{CountingJob, ManualClock};
use metronome::{ScheduleManager, Task};

use common::{base_instant, wait_for, TICK};

fn tagged_task(name: &str, tag: &str, clock: &ManualClock) -> (Task, Arc<CountingJob>) {
    let job = CountingJob::new();
    let task = Task::named(name, Arc::clone(&job));
    task.set_clock(Arc::new(clock.clone())).unwrap();
    task.tick_interval(TICK).unwrap();
    task.add_tag(tag);
    (task, job)
}

#[tokio::test]
async fn group_starts_and_pauses_members_together() {
    let clock = ManualClock::starting_at(base_instant());
    let manager = ScheduleManager::new();
    let (a, job_a) = tagged_task("etl-users", "etl", &clock);
    let (b, job_b) = tagged_task("etl-orders", "etl", &clock);
    manager.register(&a).unwrap();
    manager.register(&b).unwrap();

    let group = manager.tasks("etl");
    assert_eq!(group.count(), 2);

    group.period(60u64).unwrap().start().unwrap();
    assert!(wait_for(|| job_a.runs() == 1 && job_b.runs() == 1).await);

    // Pause returns with every worker wound down and both tasks intact
    group.pause().await.unwrap();
    assert!(!a.is_running());
    assert!(!b.is_running());
    assert!(manager.contains("etl-users"));
    assert!(manager.contains("etl-orders"));

    group.start().unwrap();
    assert!(wait_for(|| job_a.runs() == 2 && job_b.runs() == 2).await);

    group.stop().unwrap();
    a.join().await;
    b.join().await;
    assert!(manager.is_empty());
}

#[tokio::test]
async fn group_batch_configuration_and_catch_up() {
    let clock = ManualClock::starting_at(base_instant());
    let manager = ScheduleManager::new();
    let (a, job_a) = tagged_task("rep-a", "replay", &clock);
    let (b, job_b) = tagged_task("rep-b", "replay", &clock);
    manager.register(&a).unwrap();
    manager.register(&b).unwrap();

    let group = manager.tasks("replay");
    group
        .period(60u64)
        .unwrap()
        .catch_up(metronome::CatchUpPolicy::ReplayMissed)
        .unwrap()
        .nonperiodic(4)
        .unwrap();

    group.start().unwrap();
    assert!(wait_for(|| job_a.runs() == 1 && job_b.runs() == 1).await);

    // Three missed intervals are replayed one by one until the count is
    // exhausted
    clock.advance(Duration::seconds(200));
    assert!(wait_for(|| job_a.runs() == 4 && job_b.runs() == 4).await);
    assert!(wait_for(|| !a.is_running() && !b.is_running()).await);
    a.join().await;
    b.join().await;
}

#[tokio::test]
async fn set_manager_moves_running_tasks() {
    let clock = ManualClock::starting_at(base_instant());
    let source = ScheduleManager::new();
    let (task, job) = tagged_task("mover", "move", &clock);
    task.period(60u64).unwrap();
    source.register(&task).unwrap();
    task.start().unwrap();
    assert!(wait_for(|| job.runs() == 1).await);

    let dest = source.tasks("move").set_manager(None).unwrap();
    assert!(source.is_empty());
    assert!(dest.contains("mover"));
    assert!(task.is_running());

    // The worker now unregisters from the destination on stop
    task.stop().unwrap();
    task.join().await;
    assert!(!dest.contains("mover"));
}
