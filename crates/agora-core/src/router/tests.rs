use super::*;
use crate::agents::{AgentPersonality, AgentSpec, Capability};
use crate::config::AgentConfig;
use crate::conversations::{ConversationState, TypeRegistry};
use crate::event_bus::{DropPolicy, EventBus, Subscription};
use agora_llm::MockProvider;
use std::collections::BTreeSet;

struct Fix {
    router: MessageRouter,
    conversations: Arc<ConversationManager>,
    agents: Arc<AgentManager>,
    mock: Arc<MockProvider>,
    rx: Subscription,
}

async fn fix() -> Fix {
    let bus = Arc::new(EventBus::new(1024, DropPolicy::Block));
    let rx = bus.subscribe();
    let ids = Arc::new(IdGenerator::new());
    let agents = Arc::new(AgentManager::new(
        &AgentConfig::default(),
        Arc::clone(&bus),
        Arc::clone(&ids),
    ));
    let conversations = Arc::new(ConversationManager::new(
        TypeRegistry::defaults(),
        Arc::clone(&agents),
        Arc::clone(&bus),
        Arc::clone(&ids),
    ));
    conversations.register_user("u1").await;
    conversations.register_user("m1").await;

    let providers = Arc::new(ProviderRegistry::new());
    let mock = Arc::new(MockProvider::new());
    providers.register(
        "mock",
        Arc::clone(&mock) as Arc<dyn agora_llm::ChatProvider>,
        vec!["mock-model".to_string()],
    );

    let router = MessageRouter::new(
        Arc::clone(&conversations),
        Arc::clone(&agents),
        providers,
        RetryConfig {
            base_ms: 1,
            factor: 2.0,
            max_attempts: 3,
            cap_ms: 10,
        },
        Duration::from_secs(30),
        Arc::clone(&ids),
    );
    Fix {
        router,
        conversations,
        agents,
        mock,
        rx,
    }
}

impl Fix {
    async fn add_agent(&self, id: &str, role: AgentRole, capabilities: &[Capability]) {
        self.agents
            .add_agent(AgentSpec {
                id: id.to_string(),
                display_name: format!("Agent {id}"),
                role,
                personality: AgentPersonality::Analytical,
                provider_id: "mock".to_string(),
                model_id: "mock-model".to_string(),
                capabilities: capabilities.iter().cloned().collect::<BTreeSet<_>>(),
                max_tokens: 512,
                temperature: 0.2,
            })
            .await
            .unwrap();
    }

    fn events(&mut self) -> Vec<serde_json::Value> {
        let mut events = Vec::new();
        while let Some(event) = self.rx.try_recv() {
            events.push(serde_json::to_value(&event).unwrap());
        }
        events
    }

    fn appended(submission: Submission) -> Vec<Message> {
        match submission {
            Submission::Appended(messages) => messages,
            other => panic!("expected Appended, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn democratic_round_dispatches_each_agent_in_turn_order() {
    let mut f = fix().await;
    f.add_agent("a1", AgentRole::Specialist, &[]).await;
    f.add_agent("a2", AgentRole::Specialist, &[]).await;
    let conv = f
        .conversations
        .create_conversation(
            ConversationKind::Democratic,
            vec!["u1".into(), "a1".into(), "a2".into()],
            "demo",
            "u1",
            None,
        )
        .await
        .unwrap();

    f.mock.queue_content("three");
    f.mock.queue_content("seven");

    let appended = Fix::appended(
        f.router
            .submit(&conv.id, MessageDraft::user("u1", "pick a number"))
            .await
            .unwrap(),
    );

    // Trigger plus one response per agent, in turn order.
    assert_eq!(appended.len(), 3);
    assert_eq!(appended[1].author_id, "a1");
    assert_eq!(appended[1].body, "three");
    assert_eq!(appended[2].author_id, "a2");
    assert_eq!(appended[2].body, "seven");

    // Both provider requests carried the same conversation prefix.
    let requests = f.mock.requests();
    assert_eq!(requests.len(), 2);
    let history = |r: &agora_llm::CompletionRequest| {
        r.messages
            .iter()
            .filter(|m| m.role != agora_llm::ChatRole::System)
            .map(|m| m.content.clone())
            .collect::<Vec<_>>()
    };
    assert_eq!(history(&requests[0]), history(&requests[1]));
    assert_eq!(history(&requests[0]), vec!["[u1] pick a number".to_string()]);

    let conv = f.conversations.get(&conv.id).await.unwrap();
    assert_eq!(conv.state, ConversationState::Active);
    let _ = f.events();
}

#[tokio::test]
async fn socratic_moderator_must_ask_questions() {
    let mut f = fix().await;
    f.add_agent("a1", AgentRole::Specialist, &[]).await;
    f.add_agent("a2", AgentRole::Specialist, &[]).await;
    let conv = f
        .conversations
        .create_conversation(
            ConversationKind::Socratic,
            vec!["m1".into(), "a1".into(), "a2".into()],
            "inquiry",
            "u1",
            Some("m1".into()),
        )
        .await
        .unwrap();
    let _ = f.events();

    let err = f
        .router
        .submit(&conv.id, MessageDraft::user("m1", "Answer me."))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));

    // Nothing appended; exactly one rejection event with the reason.
    assert!(f.conversations.get(&conv.id).await.unwrap().messages.is_empty());
    let events = f.events();
    let rejections: Vec<&serde_json::Value> = events
        .iter()
        .filter(|e| e["type"] == "message_rejected")
        .collect();
    assert_eq!(rejections.len(), 1);
    assert_eq!(
        rejections[0]["payload"]["reason"],
        rejection::NON_QUESTION_FROM_MODERATOR
    );

    // A proper question fans out to both answerers.
    f.mock.queue_content("Because it rains.");
    f.mock.queue_content("Because clouds form.");
    let appended = Fix::appended(
        f.router
            .submit(&conv.id, MessageDraft::user("m1", "Why is the sky grey?"))
            .await
            .unwrap(),
    );
    assert_eq!(appended.len(), 3);
    assert!(appended[1..].iter().all(|m| m.author_kind == AuthorKind::Agent));
}

#[tokio::test]
async fn socratic_followup_depth_is_bounded() {
    let mut f = fix().await;
    f.add_agent("a1", AgentRole::Specialist, &[]).await;
    let conv = f
        .conversations
        .create_conversation(
            ConversationKind::Socratic,
            vec!["m1".into(), "a1".into()],
            "inquiry",
            "u1",
            Some("m1".into()),
        )
        .await
        .unwrap();

    // Initial question plus the default three follow-ups pass.
    for i in 0..4 {
        f.router
            .submit(&conv.id, MessageDraft::user("m1", format!("Question {i}?")))
            .await
            .unwrap();
    }
    let err = f
        .router
        .submit(&conv.id, MessageDraft::user("m1", "One more?"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));

    let events = f.events();
    assert!(events
        .iter()
        .any(|e| e["payload"]["reason"] == rejection::FOLLOWUP_LIMIT_REACHED));
}

#[tokio::test]
async fn provider_outage_appends_one_system_message() {
    let mut f = fix().await;
    f.add_agent("a1", AgentRole::Specialist, &[]).await;
    let conv = f
        .conversations
        .create_conversation(
            ConversationKind::Hierarchical,
            vec!["m1".into(), "a1".into()],
            "ops",
            "u1",
            Some("m1".into()),
        )
        .await
        .unwrap();

    for _ in 0..3 {
        f.mock.queue_error(agora_llm::Error::Timeout(30_000));
    }

    let draft = MessageDraft::user("m1", "a1, report status")
        .with_metadata("next_speaker", serde_json::json!("a1"));
    let appended = Fix::appended(f.router.submit(&conv.id, draft).await.unwrap());

    // At most max_attempts provider calls went out.
    assert_eq!(f.mock.call_count(), 3);

    // No agent message; exactly one system notice naming the failure.
    assert_eq!(appended.len(), 2);
    let notice = &appended[1];
    assert_eq!(notice.author_kind, AuthorKind::System);
    assert_eq!(notice.metadata["kind"], "timeout");
    assert_eq!(notice.metadata["agent_id"], "a1");

    // The task failed and the failure event carries the reason.
    let events = f.events();
    assert!(events.iter().any(|e| e["type"] == "task_failed"));
    let counters = f.agents.performance("a1").await.unwrap();
    assert_eq!(counters.tasks_assigned, 1);
    assert_eq!(counters.tasks_completed, 0);
}

#[tokio::test]
async fn transient_failures_retry_then_succeed_with_one_message() {
    let f = fix().await;
    f.add_agent("a1", AgentRole::Specialist, &[]).await;
    let conv = f
        .conversations
        .create_conversation(
            ConversationKind::Specialist,
            vec!["u1".into(), "a1".into()],
            "retry",
            "u1",
            None,
        )
        .await
        .unwrap();

    f.mock
        .queue_error(agora_llm::Error::RateLimited { retry_after: None });
    f.mock.queue_content("recovered");

    let appended = Fix::appended(
        f.router
            .submit(&conv.id, MessageDraft::user("u1", "hello"))
            .await
            .unwrap(),
    );
    assert_eq!(f.mock.call_count(), 2);
    // Exactly one agent message for the request, despite the retry.
    let agent_messages: Vec<&Message> = appended
        .iter()
        .filter(|m| m.author_kind == AuthorKind::Agent)
        .collect();
    assert_eq!(agent_messages.len(), 1);
    assert_eq!(agent_messages[0].body, "recovered");
}

#[tokio::test]
async fn auth_failures_surface_without_retry() {
    let f = fix().await;
    f.add_agent("a1", AgentRole::Specialist, &[]).await;
    let conv = f
        .conversations
        .create_conversation(
            ConversationKind::Specialist,
            vec!["u1".into(), "a1".into()],
            "auth",
            "u1",
            None,
        )
        .await
        .unwrap();

    f.mock.queue_error(agora_llm::Error::Auth("bad key".into()));

    let appended = Fix::appended(
        f.router
            .submit(&conv.id, MessageDraft::user("u1", "hello"))
            .await
            .unwrap(),
    );
    assert_eq!(f.mock.call_count(), 1);
    assert_eq!(appended[1].author_kind, AuthorKind::System);
    assert_eq!(appended[1].metadata["kind"], "auth_failure");
}

#[tokio::test]
async fn brainstorm_rejects_critique_until_convergent_phase() {
    let f = fix().await;
    f.add_agent("a1", AgentRole::Specialist, &[]).await;
    f.add_agent("a2", AgentRole::Specialist, &[]).await;
    let conv = f
        .conversations
        .create_conversation(
            ConversationKind::Brainstorm,
            vec!["u1".into(), "a1".into(), "a2".into()],
            "ideas",
            "u1",
            None,
        )
        .await
        .unwrap();

    let critique = MessageDraft::user("u1", "that idea is bad")
        .with_metadata("critique", serde_json::json!(true));
    let err = f.router.submit(&conv.id, critique.clone()).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));

    // The creator flips the phase; critiques are welcome afterwards.
    let flip = MessageDraft::user("u1", "time to converge")
        .with_metadata("phase", serde_json::json!("convergent"));
    f.router.submit(&conv.id, flip).await.unwrap();
    f.router.submit(&conv.id, critique).await.unwrap();
}

#[tokio::test]
async fn debate_refuses_late_submissions_silently() {
    let mut f = fix().await;
    f.add_agent("a1", AgentRole::Specialist, &[]).await;
    f.add_agent("a2", AgentRole::Specialist, &[]).await;
    let conv = f
        .conversations
        .create_conversation(
            ConversationKind::Debate,
            vec!["m1".into(), "a1".into(), "a2".into()],
            "motion",
            "u1",
            Some("m1".into()),
        )
        .await
        .unwrap();

    // Moderator opens; a1 answers within the window.
    f.mock.queue_content("opening statement");
    f.router
        .submit(&conv.id, MessageDraft::user("m1", "The motion is open."))
        .await
        .unwrap();

    // Force the window into the past, then submit out-of-window.
    f.conversations
        .with_mut(&conv.id, |c| {
            c.protocol.window_opened_at =
                Some(chrono::Utc::now() - chrono::Duration::seconds(1_000));
        })
        .await
        .unwrap();
    let before = f.conversations.get(&conv.id).await.unwrap().messages.len();
    let outcome = f
        .router
        .submit(&conv.id, MessageDraft::agent("a2", "too late"))
        .await
        .unwrap();
    assert!(matches!(outcome, Submission::Dropped(r) if r == rejection::LATE_SUBMISSION));
    let after = f.conversations.get(&conv.id).await.unwrap().messages.len();
    assert_eq!(before, after);

    let events = f.events();
    assert!(events
        .iter()
        .any(|e| e["payload"]["reason"] == rejection::LATE_SUBMISSION));
}

#[tokio::test]
async fn consensus_reaches_threshold_and_ends() {
    let mut f = fix().await;
    f.add_agent("a1", AgentRole::Specialist, &[]).await;
    f.add_agent("a2", AgentRole::Specialist, &[]).await;
    f.add_agent("a3", AgentRole::Specialist, &[]).await;
    let conv = f
        .conversations
        .create_conversation(
            ConversationKind::Consensus,
            vec!["m1".into(), "a1".into(), "a2".into(), "a3".into()],
            "agreement",
            "u1",
            Some("m1".into()),
        )
        .await
        .unwrap();

    for _ in 0..3 {
        f.mock.queue_content("agree, this is sound");
    }
    f.router
        .submit(&conv.id, MessageDraft::user("m1", "Shall we adopt the plan?"))
        .await
        .unwrap();

    let conv = f.conversations.get(&conv.id).await.unwrap();
    assert_eq!(conv.state, ConversationState::Ended);
    assert_eq!(conv.protocol.consensus_rounds, 1);

    let events = f.events();
    let ended: Vec<&serde_json::Value> = events
        .iter()
        .filter(|e| e["type"] == "conversation_ended")
        .collect();
    assert_eq!(ended.len(), 1);
    assert_eq!(ended[0]["payload"]["reason"], end_reason::CONSENSUS_REACHED);
}

#[tokio::test]
async fn consensus_gives_up_after_max_rounds() {
    let mut f = fix().await;
    f.add_agent("a1", AgentRole::Specialist, &[]).await;
    f.add_agent("a2", AgentRole::Specialist, &[]).await;
    f.add_agent("a3", AgentRole::Specialist, &[]).await;
    let conv = f
        .conversations
        .create_conversation(
            ConversationKind::Consensus,
            vec!["m1".into(), "a1".into(), "a2".into(), "a3".into()],
            "stalemate",
            "u1",
            Some("m1".into()),
        )
        .await
        .unwrap();

    // Three rounds, three voters, nobody budges.
    for _ in 0..9 {
        f.mock.queue_content("disagree entirely");
    }
    f.router
        .submit(&conv.id, MessageDraft::user("m1", "Shall we adopt the plan?"))
        .await
        .unwrap();

    let conv = f.conversations.get(&conv.id).await.unwrap();
    assert_eq!(conv.state, ConversationState::Ended);
    assert_eq!(conv.protocol.consensus_rounds, 3);

    let events = f.events();
    assert!(events
        .iter()
        .any(|e| e["payload"]["reason"] == end_reason::MAX_ROUNDS_REACHED));
}

#[tokio::test]
async fn hierarchical_holds_until_moderator_yields() {
    let f = fix().await;
    f.add_agent("a1", AgentRole::Specialist, &[]).await;
    f.add_agent("a2", AgentRole::Specialist, &[]).await;
    let conv = f
        .conversations
        .create_conversation(
            ConversationKind::Hierarchical,
            vec!["m1".into(), "a1".into(), "a2".into()],
            "chain",
            "u1",
            Some("m1".into()),
        )
        .await
        .unwrap();

    let held = f
        .router
        .submit(&conv.id, MessageDraft::agent("a2", "may I add something"))
        .await
        .unwrap();
    assert!(matches!(held, Submission::Held));
    assert!(f.conversations.get(&conv.id).await.unwrap().messages.is_empty());

    let appended = Fix::appended(
        f.router
            .submit(&conv.id, MessageDraft::user("m1", "go ahead"))
            .await
            .unwrap(),
    );
    // Moderator message first, then the released utterance.
    assert_eq!(appended.len(), 2);
    assert_eq!(appended[0].author_id, "m1");
    assert_eq!(appended[1].author_id, "a2");
    assert_eq!(appended[1].body, "may I add something");
}

#[tokio::test]
async fn ensemble_runs_synthesizer_refinement_rounds() {
    let f = fix().await;
    f.add_agent("a1", AgentRole::Specialist, &[]).await;
    f.add_agent("synth", AgentRole::Synthesizer, &[]).await;
    let conv = f
        .conversations
        .create_conversation(
            ConversationKind::Ensemble,
            vec!["u1".into(), "a1".into(), "synth".into()],
            "blend",
            "u1",
            None,
        )
        .await
        .unwrap();

    f.mock.queue_content("raw answer");
    f.mock.queue_content("refined v1");
    f.mock.queue_content("refined v2");
    f.mock.queue_content("refined v3");

    let appended = Fix::appended(
        f.router
            .submit(&conv.id, MessageDraft::user("u1", "explain entropy"))
            .await
            .unwrap(),
    );

    // Trigger, one producer answer, then the default three refinements.
    assert_eq!(appended.len(), 5);
    assert_eq!(appended[1].author_id, "a1");
    for refinement in &appended[2..] {
        assert_eq!(refinement.author_id, "synth");
    }
    // Refinement prompts see the answers produced so far.
    let requests = f.mock.requests();
    assert_eq!(requests.len(), 4);
    assert!(requests[1]
        .messages
        .iter()
        .any(|m| m.content.contains("raw answer")));
}

#[tokio::test]
async fn specialist_routes_by_capability_intersection() {
    let f = fix().await;
    f.add_agent("coder", AgentRole::Specialist, &[Capability::CodeGeneration])
        .await;
    f.add_agent("writer", AgentRole::Specialist, &[Capability::TextGeneration])
        .await;
    let conv = f
        .conversations
        .create_conversation(
            ConversationKind::Specialist,
            vec!["u1".into(), "coder".into(), "writer".into()],
            "help",
            "u1",
            None,
        )
        .await
        .unwrap();

    f.mock.queue_content("fn main() {}");
    let draft = MessageDraft::user("u1", "write me a program")
        .with_metadata("capabilities", serde_json::json!(["code_generation"]));
    let appended = Fix::appended(f.router.submit(&conv.id, draft).await.unwrap());

    assert_eq!(appended.len(), 2);
    assert_eq!(appended[1].author_id, "coder");
    assert_eq!(f.mock.call_count(), 1);
}

#[tokio::test]
async fn competitive_ranks_answers_and_names_a_winner() {
    let f = fix().await;
    f.add_agent("a1", AgentRole::Specialist, &[]).await;
    f.add_agent("a2", AgentRole::Specialist, &[]).await;
    let conv = f
        .conversations
        .create_conversation(
            ConversationKind::Competitive,
            vec!["m1".into(), "a1".into(), "a2".into()],
            "contest",
            "u1",
            Some("m1".into()),
        )
        .await
        .unwrap();

    f.mock.queue_content("short");
    f.mock.queue_content("a considerably longer and more thorough answer");
    let appended = Fix::appended(
        f.router
            .submit(&conv.id, MessageDraft::user("m1", "best answer wins"))
            .await
            .unwrap(),
    );

    let verdict = appended.last().unwrap();
    assert_eq!(verdict.author_kind, AuthorKind::System);
    assert_eq!(verdict.metadata["winner"], "a2");

    // Contestants never saw each other's answers.
    let requests = f.mock.requests();
    assert!(!requests[1]
        .messages
        .iter()
        .any(|m| m.content.contains("short")));
}

#[tokio::test]
async fn peer_review_assigns_non_self_reviews() {
    let f = fix().await;
    f.add_agent("a1", AgentRole::Reviewer, &[]).await;
    f.add_agent("a2", AgentRole::Reviewer, &[]).await;
    let conv = f
        .conversations
        .create_conversation(
            ConversationKind::PeerReview,
            vec!["u1".into(), "a1".into(), "a2".into()],
            "papers",
            "u1",
            None,
        )
        .await
        .unwrap();

    f.mock.queue_content("submission from a1");
    f.mock.queue_content("submission from a2");
    f.mock.queue_content("review one");
    f.mock.queue_content("review two");

    let appended = Fix::appended(
        f.router
            .submit(&conv.id, MessageDraft::user("u1", "submit your drafts"))
            .await
            .unwrap(),
    );

    // Trigger, two submissions, two reviews.
    assert_eq!(appended.len(), 5);
    let reviews: Vec<&Message> = appended
        .iter()
        .filter(|m| m.metadata.contains_key("review_of"))
        .collect();
    assert_eq!(reviews.len(), 2);
    for review in reviews {
        let target_id = review.metadata["review_of"].as_str().unwrap();
        let target = appended.iter().find(|m| m.id == target_id).unwrap();
        assert_ne!(review.author_id, target.author_id);
    }

    // Reviewer prefixes are anonymized: no raw agent ids as labels.
    let requests = f.mock.requests();
    let review_request = &requests[2];
    assert!(review_request
        .messages
        .iter()
        .any(|m| m.content.contains("participant-")));
}
