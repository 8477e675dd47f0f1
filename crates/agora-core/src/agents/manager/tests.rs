use super::*;
use crate::agents::agent::{AgentPersonality, AgentRole};
use crate::config::AgentConfig;
use crate::event_bus::DropPolicy;

fn spec(id: &str) -> AgentSpec {
    AgentSpec {
        id: id.to_string(),
        display_name: format!("Agent {id}"),
        role: AgentRole::Specialist,
        personality: AgentPersonality::Analytical,
        provider_id: "mock".to_string(),
        model_id: "mock-model".to_string(),
        capabilities: Default::default(),
        max_tokens: 512,
        temperature: 0.2,
    }
}

fn manager_with(capacity: usize) -> (AgentManager, crate::event_bus::Subscription) {
    let bus = Arc::new(EventBus::new(128, DropPolicy::Block));
    let rx = bus.subscribe();
    let manager = AgentManager::new(
        &AgentConfig {
            task_queue_capacity: capacity,
            smoothing: 0.2,
        },
        bus,
        Arc::new(IdGenerator::new()),
    );
    (manager, rx)
}

async fn drain_kinds(rx: &mut crate::event_bus::Subscription) -> Vec<String> {
    let mut kinds = Vec::new();
    while let Some(event) = rx.try_recv() {
        let json = serde_json::to_value(&event).unwrap();
        kinds.push(json["type"].as_str().unwrap().to_string());
    }
    kinds
}

#[tokio::test]
async fn add_assign_complete_updates_counters() {
    let (manager, mut rx) = manager_with(10);
    manager.add_agent(spec("a1")).await.unwrap();

    let task = manager
        .assign_task(TaskRequest::new("chat", "answer").with_assignee("a1"))
        .await
        .unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(manager.queue_len().await, 1);

    manager.start_task(&task.id).await.unwrap();
    manager
        .complete_task(&task.id, "done", Some(0.8))
        .await
        .unwrap();

    let counters = manager.performance("a1").await.unwrap();
    assert_eq!(counters.tasks_assigned, 1);
    assert_eq!(counters.tasks_completed, 1);
    assert!(counters.success_rate > 0.0);

    let kinds = drain_kinds(&mut rx).await;
    assert_eq!(kinds, vec!["agent_added", "task_assigned", "task_completed"]);
}

#[tokio::test]
async fn queue_overflow_fails_with_queue_full() {
    let (manager, _rx) = manager_with(2);
    manager.add_agent(spec("a1")).await.unwrap();

    for _ in 0..2 {
        manager
            .assign_task(TaskRequest::new("chat", "x").with_assignee("a1"))
            .await
            .unwrap();
    }
    let err = manager
        .assign_task(TaskRequest::new("chat", "x").with_assignee("a1"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::QueueFull { capacity: 2 }));
}

#[tokio::test]
async fn concurrent_assigns_never_overflow_the_queue() {
    let (manager, _rx) = manager_with(4);
    let manager = Arc::new(manager);
    manager.add_agent(spec("a1")).await.unwrap();

    // Fill to capacity - 1, then race a pile of assigns for the last slot.
    for _ in 0..3 {
        manager
            .assign_task(TaskRequest::new("chat", "fill").with_assignee("a1"))
            .await
            .unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..8 {
        let manager = Arc::clone(&manager);
        handles.push(tokio::spawn(async move {
            manager
                .assign_task(TaskRequest::new("chat", "race").with_assignee("a1"))
                .await
                .is_ok()
        }));
    }
    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap() {
            successes += 1;
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(manager.queue_len().await, 4);
}

#[tokio::test]
async fn strategy_picks_least_loaded_agent() {
    let (manager, _rx) = manager_with(10);
    manager.add_agent(spec("a1")).await.unwrap();
    manager.add_agent(spec("a2")).await.unwrap();

    // Load a1 with one in-flight task.
    manager
        .assign_task(TaskRequest::new("chat", "x").with_assignee("a1"))
        .await
        .unwrap();

    let task = manager
        .assign_task(TaskRequest::new("chat", "y"))
        .await
        .unwrap();
    assert_eq!(task.assignee_id, "a2");
}

#[tokio::test]
async fn removal_keeps_in_flight_tasks_runnable() {
    let (manager, mut rx) = manager_with(10);
    manager.add_agent(spec("a1")).await.unwrap();

    let t1 = manager
        .assign_task(TaskRequest::new("chat", "one").with_assignee("a1"))
        .await
        .unwrap();
    let t2 = manager
        .assign_task(TaskRequest::new("chat", "two").with_assignee("a1"))
        .await
        .unwrap();
    manager.start_task(&t1.id).await.unwrap();
    manager.start_task(&t2.id).await.unwrap();

    manager.remove_agent("a1").await.unwrap();
    assert!(manager.active_agents().await.is_empty());

    // New work is refused.
    let err = manager
        .assign_task(TaskRequest::new("chat", "three").with_assignee("a1"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    // In-flight tasks still complete and still count.
    manager.complete_task(&t1.id, "done", None).await.unwrap();
    manager.complete_task(&t2.id, "done", None).await.unwrap();
    let counters = manager.performance("a1").await.unwrap();
    assert_eq!(counters.tasks_completed, 2);

    let kinds = drain_kinds(&mut rx).await;
    assert_eq!(
        kinds,
        vec![
            "agent_added",
            "task_assigned",
            "task_assigned",
            "agent_removed",
            "task_completed",
            "task_completed",
        ]
    );
}

#[tokio::test]
async fn counters_are_monotonic_across_outcomes() {
    let (manager, _rx) = manager_with(50);
    manager.add_agent(spec("a1")).await.unwrap();

    let mut last_assigned = 0;
    let mut last_completed = 0;
    for i in 0..10 {
        let task = manager
            .assign_task(TaskRequest::new("chat", "x").with_assignee("a1"))
            .await
            .unwrap();
        manager.start_task(&task.id).await.unwrap();
        if i % 3 == 0 {
            manager.fail_task(&task.id, "boom").await.unwrap();
        } else {
            manager.complete_task(&task.id, "ok", None).await.unwrap();
        }
        let counters = manager.performance("a1").await.unwrap();
        assert!(counters.tasks_assigned >= last_assigned);
        assert!(counters.tasks_completed >= last_completed);
        last_assigned = counters.tasks_assigned;
        last_completed = counters.tasks_completed;
    }
}

#[tokio::test]
async fn cancel_emits_task_failed_with_reason() {
    let (manager, mut rx) = manager_with(10);
    manager.add_agent(spec("a1")).await.unwrap();
    let task = manager
        .assign_task(TaskRequest::new("chat", "x").with_assignee("a1"))
        .await
        .unwrap();
    manager.start_task(&task.id).await.unwrap();

    let cancelled = manager.cancel_task(&task.id, "deadline crossed").await.unwrap();
    assert_eq!(cancelled.status, TaskStatus::Cancelled);

    let mut saw_reason = false;
    while let Some(event) = rx.try_recv() {
        let json = serde_json::to_value(&event).unwrap();
        if json["type"] == "task_failed" {
            assert!(json["payload"]["reason"]
                .as_str()
                .unwrap()
                .contains("deadline crossed"));
            saw_reason = true;
        }
    }
    assert!(saw_reason);

    // Terminal tasks are immutable.
    let err = manager.complete_task(&task.id, "late", None).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}

#[tokio::test]
async fn claim_next_prefers_priority_then_fifo() {
    let (manager, _rx) = manager_with(10);
    manager.add_agent(spec("a1")).await.unwrap();

    let low = manager
        .assign_task(TaskRequest::new("chat", "low").with_assignee("a1"))
        .await
        .unwrap();
    let high = manager
        .assign_task(
            TaskRequest::new("chat", "high")
                .with_assignee("a1")
                .with_priority(5),
        )
        .await
        .unwrap();
    let low2 = manager
        .assign_task(TaskRequest::new("chat", "low2").with_assignee("a1"))
        .await
        .unwrap();

    assert_eq!(manager.claim_next().await.unwrap().id, high.id);
    assert_eq!(manager.claim_next().await.unwrap().id, low.id);
    assert_eq!(manager.claim_next().await.unwrap().id, low2.id);
    assert!(manager.claim_next().await.is_none());
}

#[tokio::test]
async fn intervention_switches_to_performance_weighted() {
    let (manager, _rx) = manager_with(50);
    manager.add_agent(spec("flaky")).await.unwrap();
    manager.add_agent(spec("solid")).await.unwrap();

    // Drive flaky's error rate above the intervention threshold while
    // keeping its in-flight count at zero (it would win least-loaded).
    for _ in 0..8 {
        let task = manager
            .assign_task(TaskRequest::new("chat", "x").with_assignee("flaky"))
            .await
            .unwrap();
        manager.start_task(&task.id).await.unwrap();
        manager.fail_task(&task.id, "boom").await.unwrap();
    }
    // Give solid a positive record with one completed task.
    let task = manager
        .assign_task(TaskRequest::new("chat", "warmup").with_assignee("solid"))
        .await
        .unwrap();
    manager.start_task(&task.id).await.unwrap();
    manager.complete_task(&task.id, "ok", Some(0.9)).await.unwrap();

    let picked = manager
        .assign_task(TaskRequest::new("chat", "who"))
        .await
        .unwrap();
    assert_eq!(picked.assignee_id, "solid");
}
