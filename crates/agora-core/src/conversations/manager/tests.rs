use super::*;
use crate::agents::{AgentPersonality, AgentRole, AgentSpec};
use crate::config::AgentConfig;
use crate::conversations::message::AuthorKind;
use crate::event_bus::DropPolicy;

struct Fixture {
    manager: ConversationManager,
    _bus: Arc<EventBus>,
    rx: crate::event_bus::Subscription,
}

async fn fixture(agent_ids: &[&str]) -> Fixture {
    let bus = Arc::new(EventBus::new(256, DropPolicy::Block));
    let rx = bus.subscribe();
    let ids = Arc::new(IdGenerator::new());
    let agents = Arc::new(AgentManager::new(
        &AgentConfig::default(),
        Arc::clone(&bus),
        Arc::clone(&ids),
    ));
    for id in agent_ids {
        agents
            .add_agent(AgentSpec {
                id: id.to_string(),
                display_name: id.to_string(),
                role: AgentRole::Specialist,
                personality: AgentPersonality::Analytical,
                provider_id: "mock".to_string(),
                model_id: "mock-model".to_string(),
                capabilities: Default::default(),
                max_tokens: 512,
                temperature: 0.2,
            })
            .await
            .unwrap();
    }
    let manager = ConversationManager::new(TypeRegistry::defaults(), agents, Arc::clone(&bus), ids);
    manager.register_user("u1").await;
    Fixture {
        manager,
        _bus: bus,
        rx,
    }
}

fn event_types(rx: &mut crate::event_bus::Subscription) -> Vec<String> {
    let mut kinds = Vec::new();
    while let Some(event) = rx.try_recv() {
        let json = serde_json::to_value(&event).unwrap();
        kinds.push(json["type"].as_str().unwrap().to_string());
    }
    kinds
}

#[tokio::test]
async fn create_validates_participants_and_capacity() {
    let f = fixture(&["a1", "a2"]).await;

    let conv = f
        .manager
        .create_conversation(
            ConversationKind::Democratic,
            vec!["u1".into(), "a1".into(), "a2".into()],
            "demo",
            "u1",
            None,
        )
        .await
        .unwrap();
    assert_eq!(conv.state, ConversationState::Forming);
    assert_eq!(conv.turn_order.len(), 3);

    let err = f
        .manager
        .create_conversation(ConversationKind::Democratic, vec!["u1".into()], "x", "u1", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::OutOfCapacityRange { given: 1, min: 2, .. }));

    let err = f
        .manager
        .create_conversation(
            ConversationKind::Democratic,
            vec!["u1".into(), "ghost".into()],
            "x",
            "u1",
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownParticipant(p) if p == "ghost"));
}

#[tokio::test]
async fn moderated_types_demand_a_participating_moderator() {
    let f = fixture(&["a1", "a2", "m1"]).await;

    let err = f
        .manager
        .create_conversation(
            ConversationKind::Socratic,
            vec!["a1".into(), "a2".into()],
            "x",
            "u1",
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ModeratorMissing(_)));

    // Moderator outside the participant set is also missing.
    let err = f
        .manager
        .create_conversation(
            ConversationKind::Socratic,
            vec!["a1".into(), "a2".into()],
            "x",
            "u1",
            Some("m1".into()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ModeratorMissing(_)));

    f.manager
        .create_conversation(
            ConversationKind::Socratic,
            vec!["m1".into(), "a1".into(), "a2".into()],
            "x",
            "u1",
            Some("m1".into()),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn first_message_activates_forming_conversation() {
    let mut f = fixture(&["a1"]).await;
    let conv = f
        .manager
        .create_conversation(
            ConversationKind::Specialist,
            vec!["u1".into(), "a1".into()],
            "x",
            "u1",
            None,
        )
        .await
        .unwrap();

    f.manager
        .add_message(&conv.id, MessageDraft::user("u1", "hello"))
        .await
        .unwrap();
    let conv = f.manager.get(&conv.id).await.unwrap();
    assert_eq!(conv.state, ConversationState::Active);

    let kinds = event_types(&mut f.rx);
    assert!(kinds.contains(&"conversation_created".to_string()));
    assert!(kinds.contains(&"message_added".to_string()));
}

#[tokio::test]
async fn illegal_transitions_fail_without_mutation_or_events() {
    let mut f = fixture(&["a1"]).await;
    let conv = f
        .manager
        .create_conversation(
            ConversationKind::Specialist,
            vec!["u1".into(), "a1".into()],
            "x",
            "u1",
            None,
        )
        .await
        .unwrap();
    let _ = event_types(&mut f.rx);

    // forming -> paused is not legal.
    let err = f.manager.pause(&conv.id).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
    assert_eq!(
        f.manager.get(&conv.id).await.unwrap().state,
        ConversationState::Forming
    );
    assert!(event_types(&mut f.rx).is_empty());

    // End it, then confirm ended is terminal and appends are refused.
    f.manager
        .add_message(&conv.id, MessageDraft::user("u1", "hi"))
        .await
        .unwrap();
    f.manager
        .end_conversation(&conv.id, "done", Some("wrapped up".into()))
        .await
        .unwrap();
    let _ = event_types(&mut f.rx);

    let err = f.manager.resume(&conv.id).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
    let err = f
        .manager
        .add_message(&conv.id, MessageDraft::user("u1", "late"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
    assert!(event_types(&mut f.rx).is_empty());

    // The summary landed as a final system message before the end.
    let conv = f.manager.get(&conv.id).await.unwrap();
    let last = conv.messages.last().unwrap();
    assert_eq!(last.author_kind, AuthorKind::System);
    assert!(last.body.contains("wrapped up"));
}

#[tokio::test]
async fn paused_conversations_refuse_messages_until_resumed() {
    let f = fixture(&["a1"]).await;
    let conv = f
        .manager
        .create_conversation(
            ConversationKind::Specialist,
            vec!["u1".into(), "a1".into()],
            "x",
            "u1",
            None,
        )
        .await
        .unwrap();
    f.manager
        .add_message(&conv.id, MessageDraft::user("u1", "hello"))
        .await
        .unwrap();

    f.manager.pause(&conv.id).await.unwrap();
    let err = f
        .manager
        .add_message(&conv.id, MessageDraft::user("u1", "while paused"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));

    f.manager.resume(&conv.id).await.unwrap();
    f.manager
        .add_message(&conv.id, MessageDraft::user("u1", "back"))
        .await
        .unwrap();
}

#[tokio::test]
async fn non_participants_cannot_post() {
    let f = fixture(&["a1"]).await;
    f.manager.register_user("u2").await;
    let conv = f
        .manager
        .create_conversation(
            ConversationKind::Specialist,
            vec!["u1".into(), "a1".into()],
            "x",
            "u1",
            None,
        )
        .await
        .unwrap();

    let err = f
        .manager
        .add_message(&conv.id, MessageDraft::user("u2", "hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotAParticipant { .. }));
}

#[tokio::test]
async fn democratic_turns_are_fair_over_rounds() {
    let f = fixture(&["a1", "a2"]).await;
    let conv = f
        .manager
        .create_conversation(
            ConversationKind::Democratic,
            vec!["u1".into(), "a1".into(), "a2".into()],
            "fairness",
            "u1",
            None,
        )
        .await
        .unwrap();

    let rounds = 4;
    for _ in 0..rounds {
        for author in ["u1", "a1", "a2"] {
            let kind = if author == "u1" {
                AuthorKind::User
            } else {
                AuthorKind::Agent
            };
            f.manager
                .add_message(&conv.id, MessageDraft::new(author, kind, "turn"))
                .await
                .unwrap();
        }
    }

    let conv = f.manager.get(&conv.id).await.unwrap();
    for author in ["u1", "a1", "a2"] {
        assert_eq!(conv.messages_by(author).len(), rounds, "{author}");
    }
}

#[tokio::test]
async fn out_of_turn_is_refused_without_mutation() {
    let f = fixture(&["a1", "a2"]).await;
    let conv = f
        .manager
        .create_conversation(
            ConversationKind::Democratic,
            vec!["u1".into(), "a1".into(), "a2".into()],
            "x",
            "u1",
            None,
        )
        .await
        .unwrap();

    let err = f
        .manager
        .add_message(&conv.id, MessageDraft::agent("a2", "me first"))
        .await
        .unwrap_err();
    match err {
        Error::OutOfTurn { expected, author, .. } => {
            assert_eq!(expected, "u1");
            assert_eq!(author, "a2");
        }
        other => panic!("expected OutOfTurn, got {other:?}"),
    }
    assert!(f.manager.get(&conv.id).await.unwrap().messages.is_empty());
}

#[tokio::test]
async fn departure_below_minimum_ends_conversation() {
    let mut f = fixture(&["a1"]).await;
    let conv = f
        .manager
        .create_conversation(
            ConversationKind::Specialist,
            vec!["u1".into(), "a1".into()],
            "x",
            "u1",
            None,
        )
        .await
        .unwrap();
    f.manager
        .add_message(&conv.id, MessageDraft::user("u1", "hello"))
        .await
        .unwrap();
    let _ = event_types(&mut f.rx);

    // Specialist minimum is 1; dropping to 0 active ends it.
    f.manager.leave(&conv.id, "a1").await.unwrap();
    assert_eq!(
        f.manager.get(&conv.id).await.unwrap().state,
        ConversationState::Active
    );
    f.manager.leave(&conv.id, "u1").await.unwrap();

    let conv = f.manager.get(&conv.id).await.unwrap();
    assert_eq!(conv.state, ConversationState::Ended);
    // Slots were kept, just deactivated.
    assert_eq!(conv.turn_order.len(), 2);

    let kinds = event_types(&mut f.rx);
    assert!(kinds.contains(&"conversation_ended".to_string()));
}

#[tokio::test]
async fn edits_require_author_or_moderator() {
    let f = fixture(&["a1", "m1"]).await;
    let conv = f
        .manager
        .create_conversation(
            ConversationKind::Hierarchical,
            vec!["u1".into(), "a1".into(), "m1".into()],
            "x",
            "u1",
            Some("m1".into()),
        )
        .await
        .unwrap();
    let message = f
        .manager
        .add_message(&conv.id, MessageDraft::user("u1", "draft"))
        .await
        .unwrap();

    let err = f
        .manager
        .edit_message(&conv.id, &message.id, "a1", "hijacked", "no")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unauthorized(_)));

    let edited = f
        .manager
        .edit_message(&conv.id, &message.id, "m1", "moderated", "cleanup")
        .await
        .unwrap();
    assert_eq!(edited.body, "moderated");
    assert_eq!(edited.edit_history.len(), 1);
    assert_eq!(edited.edit_history[0].previous_body, "draft");
}

#[tokio::test]
async fn votes_tally_per_principal() {
    let f = fixture(&["a1", "a2"]).await;
    let conv = f
        .manager
        .create_conversation(
            ConversationKind::Democratic,
            vec!["u1".into(), "a1".into(), "a2".into()],
            "x",
            "u1",
            None,
        )
        .await
        .unwrap();
    let proposal = f
        .manager
        .add_message(&conv.id, MessageDraft::user("u1", "proposal: ship it"))
        .await
        .unwrap();

    assert_eq!(f.manager.vote(&conv.id, &proposal.id, "a1", 1).await.unwrap(), 1);
    assert_eq!(f.manager.vote(&conv.id, &proposal.id, "a2", -1).await.unwrap(), 0);
    // Re-voting replaces, not accumulates.
    assert_eq!(f.manager.vote(&conv.id, &proposal.id, "a2", 1).await.unwrap(), 2);

    let err = f.manager.vote(&conv.id, &proposal.id, "stranger", 1).await.unwrap_err();
    assert!(matches!(err, Error::NotAParticipant { .. }));
}

#[tokio::test]
async fn reactions_toggle_per_principal() {
    let f = fixture(&["a1"]).await;
    let conv = f
        .manager
        .create_conversation(
            ConversationKind::Specialist,
            vec!["u1".into(), "a1".into()],
            "x",
            "u1",
            None,
        )
        .await
        .unwrap();
    let message = f
        .manager
        .add_message(&conv.id, MessageDraft::user("u1", "good point"))
        .await
        .unwrap();

    f.manager.react(&conv.id, &message.id, "a1", "+1").await.unwrap();
    let conv_state = f.manager.get(&conv.id).await.unwrap();
    assert!(conv_state.messages[0].reactions["+1"].contains("a1"));

    // Reacting again toggles the reaction off.
    f.manager.react(&conv.id, &message.id, "a1", "+1").await.unwrap();
    let conv_state = f.manager.get(&conv.id).await.unwrap();
    assert!(conv_state.messages[0].reactions.is_empty());
}

#[tokio::test]
async fn snapshot_restore_roundtrips() {
    let f = fixture(&["a1"]).await;
    let conv = f
        .manager
        .create_conversation(
            ConversationKind::Specialist,
            vec!["u1".into(), "a1".into()],
            "persisted",
            "u1",
            None,
        )
        .await
        .unwrap();
    f.manager
        .add_message(&conv.id, MessageDraft::user("u1", "hello"))
        .await
        .unwrap();

    let snapshot = f.manager.snapshot(&conv.id).await.unwrap();

    let g = fixture(&["a1"]).await;
    assert_eq!(g.manager.restore(vec![snapshot]).await.unwrap(), 1);
    let restored = g.manager.get(&conv.id).await.unwrap();
    assert_eq!(restored.subject, "persisted");
    assert_eq!(restored.messages.len(), 1);
    assert_eq!(restored.state, ConversationState::Active);
}
