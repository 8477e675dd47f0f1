//! Hub controller
//!
//! The facade user intents enter through. It wires the managers to
//! the event bus and the journals, and tracks nothing of its own
//! beyond the current conversation id for the active session. UIs
//! observe the bus; the controller knows nothing about rendering.

use crate::agents::{Agent, AgentManager, AgentSpec};
use crate::config::HubConfig;
use crate::conversations::{
    Conversation, ConversationKind, ConversationManager, Message, MessageDraft, TypeRegistry,
};
use crate::error::{Error, Result};
use crate::event_bus::{EventBus, FileEvent, HubEvent, Subscription};
use crate::id::IdGenerator;
use crate::router::{MessageRouter, Submission};
use agora_files::{
    Change, ChangeRequest, CollabManager, CollabSession, FileFilter, FileRecord, FileStore,
    FileStoreConfig, Permission,
};
use agora_llm::{ChatProvider, ProviderRegistry};
use agora_replay::{latest_snapshots, Journal, Record, RecordKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

const FILE_PRODUCER: &str = "file_store";

/// The conversation hub: managers, router, journals and file surface
pub struct Hub {
    ids: Arc<IdGenerator>,
    bus: Arc<EventBus>,
    agents: Arc<AgentManager>,
    conversations: Arc<ConversationManager>,
    providers: Arc<ProviderRegistry>,
    router: MessageRouter,
    files: FileStore,
    collab: CollabManager,
    conversations_journal: Journal,
    recording: Arc<AtomicBool>,
    current: Mutex<Option<String>>,
}

impl Hub {
    /// Open the hub over `config`.
    ///
    /// Creates the data directory layout, repairs and opens the
    /// journals, loads the conversation type registry (materializing
    /// defaults on first run) and starts the event recorder.
    pub async fn open(config: HubConfig) -> Result<Hub> {
        let data_dir = config
            .data_dir
            .clone()
            .ok_or_else(|| Error::InvalidConfiguration("data_dir is not set".to_string()))?;

        let ids = Arc::new(IdGenerator::new());
        let bus = Arc::new(EventBus::new(
            config.event_bus.subscriber_buffer,
            config.event_bus.drop_policy,
        ));

        let events_journal =
            Journal::open(data_dir.join("events.jsonl"), config.journal.fsync).await?;
        let conversations_journal =
            Journal::open(data_dir.join("conversations.jsonl"), config.journal.fsync).await?;

        let mut registry = TypeRegistry::load(data_dir.join("conversation_types.json"))?;
        registry.apply_overrides(&config.conversation)?;

        let agents = Arc::new(AgentManager::new(
            &config.agent,
            Arc::clone(&bus),
            Arc::clone(&ids),
        ));
        let conversations = Arc::new(ConversationManager::new(
            registry,
            Arc::clone(&agents),
            Arc::clone(&bus),
            Arc::clone(&ids),
        ));
        let providers = Arc::new(ProviderRegistry::new());
        let router = MessageRouter::new(
            Arc::clone(&conversations),
            Arc::clone(&agents),
            Arc::clone(&providers),
            config.provider.retry.clone(),
            config.provider.default_timeout(),
            Arc::clone(&ids),
        );

        let mut file_config = FileStoreConfig::new(&data_dir);
        file_config.max_bytes = config.file.max_bytes;
        if !config.file.allowed_extensions.is_empty() {
            file_config.allowed_extensions = config.file.allowed_extensions.clone();
        }
        let files = FileStore::open(file_config).await?;

        let recording = Arc::new(AtomicBool::new(true));
        spawn_recorder(bus.subscribe(), events_journal, Arc::clone(&recording));

        info!(data_dir = %data_dir.display(), "Hub opened");
        Ok(Hub {
            ids,
            bus,
            agents,
            conversations,
            providers,
            router,
            files,
            collab: CollabManager::new(),
            conversations_journal,
            recording,
            current: Mutex::new(None),
        })
    }

    /// The event bus, for observers (UI, tests)
    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The agent manager
    #[must_use]
    pub fn agents(&self) -> &Arc<AgentManager> {
        &self.agents
    }

    /// The conversation manager
    #[must_use]
    pub fn conversations(&self) -> &Arc<ConversationManager> {
        &self.conversations
    }

    /// Register a model provider under `provider_id`
    pub fn register_provider(
        &self,
        provider_id: impl Into<String>,
        provider: Arc<dyn ChatProvider>,
        models: Vec<String>,
    ) {
        self.providers.register(provider_id, provider, models);
    }

    /// Register a human participant
    pub async fn register_user(&self, user_id: impl Into<String>) {
        self.conversations.register_user(user_id).await;
    }

    /// Register an agent
    pub async fn add_agent(&self, spec: AgentSpec) -> Result<Agent> {
        self.agents.add_agent(spec).await
    }

    /// Remove an agent; its in-flight tasks stay runnable
    pub async fn remove_agent(&self, agent_id: &str) -> Result<()> {
        self.agents.remove_agent(agent_id).await
    }

    /// Create a conversation and make it current
    pub async fn create_conversation(
        &self,
        kind: ConversationKind,
        participants: Vec<String>,
        subject: impl Into<String>,
        creator_id: impl Into<String>,
        moderator_id: Option<String>,
    ) -> Result<Conversation> {
        let conversation = self
            .conversations
            .create_conversation(kind, participants, subject, creator_id, moderator_id)
            .await?;
        *self.current.lock().await = Some(conversation.id.clone());
        self.checkpoint(&conversation.id).await?;
        Ok(conversation)
    }

    /// Send a message through the active protocol.
    ///
    /// Returns every message the submission appended; the conversation
    /// is checkpointed afterwards.
    pub async fn send_message(
        &self,
        conversation_id: &str,
        draft: MessageDraft,
    ) -> Result<Submission> {
        let submission = self.router.submit(conversation_id, draft).await?;
        if matches!(submission, Submission::Appended(_)) {
            self.checkpoint(conversation_id).await?;
        }
        Ok(submission)
    }

    /// Pause a conversation
    pub async fn pause_conversation(&self, conversation_id: &str) -> Result<()> {
        self.conversations.pause(conversation_id).await?;
        self.checkpoint(conversation_id).await
    }

    /// Resume a paused conversation
    pub async fn resume_conversation(&self, conversation_id: &str) -> Result<()> {
        self.conversations.resume(conversation_id).await?;
        self.checkpoint(conversation_id).await
    }

    /// End a conversation
    pub async fn end_conversation(
        &self,
        conversation_id: &str,
        summary: Option<String>,
    ) -> Result<()> {
        self.conversations
            .end_conversation(conversation_id, "EndedByRequest", summary)
            .await?;
        let mut current = self.current.lock().await;
        if current.as_deref() == Some(conversation_id) {
            *current = None;
        }
        drop(current);
        self.checkpoint(conversation_id).await
    }

    /// The conversation the active UI session is looking at
    pub async fn current_conversation(&self) -> Option<String> {
        self.current.lock().await.clone()
    }

    /// Point the session at another conversation
    pub async fn set_current_conversation(&self, conversation_id: &str) -> Result<()> {
        self.conversations.get(conversation_id).await?;
        *self.current.lock().await = Some(conversation_id.to_string());
        Ok(())
    }

    /// Whether events are being recorded to the journal
    #[must_use]
    pub fn recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    /// Toggle event recording; returns the new state
    pub fn toggle_recording(&self) -> bool {
        let was = self.recording.fetch_xor(true, Ordering::AcqRel);
        !was
    }

    /// Upload a file into the store
    pub async fn upload_file(
        &self,
        local_path: impl AsRef<Path>,
        owner_id: impl Into<String>,
        permissions: Vec<Permission>,
        is_public: bool,
    ) -> Result<FileRecord> {
        let record = self
            .files
            .upload(local_path, owner_id, permissions, is_public)
            .await?;
        self.emit_file(FileEvent::FileUploaded {
            file_id: record.id.clone(),
            owner_id: record.owner_id.clone(),
            name: record.name.clone(),
        })
        .await;
        Ok(record)
    }

    /// Resolve a file blob for download
    pub async fn download_file(&self, file_id: &str, principal: &str) -> Result<PathBuf> {
        let path = self.files.download(file_id, principal).await?;
        self.emit_file(FileEvent::FileDownloaded {
            file_id: file_id.to_string(),
            principal_id: principal.to_string(),
        })
        .await;
        Ok(path)
    }

    /// Mint a share link
    pub async fn share_file(
        &self,
        file_id: &str,
        principal: &str,
        ttl: std::time::Duration,
    ) -> Result<String> {
        let link = self.files.share(file_id, principal, ttl).await?;
        self.emit_file(FileEvent::FileShared {
            file_id: file_id.to_string(),
        })
        .await;
        Ok(link)
    }

    /// Delete a file
    pub async fn delete_file(&self, file_id: &str, principal: &str) -> Result<()> {
        self.files.delete(file_id, principal).await?;
        self.emit_file(FileEvent::FileDeleted {
            file_id: file_id.to_string(),
            principal_id: principal.to_string(),
        })
        .await;
        Ok(())
    }

    /// Look up a file record
    pub async fn get_file(&self, file_id: &str) -> Result<FileRecord> {
        Ok(self.files.get(file_id).await?)
    }

    /// List files matching `filter`
    pub async fn list_files(&self, filter: &FileFilter) -> Vec<FileRecord> {
        self.files.list(filter).await
    }

    /// Open a collaborative editing session on a file
    pub async fn open_collab_session(
        &self,
        file_id: &str,
        participants: Vec<String>,
        initial_body: impl Into<String>,
    ) -> Result<CollabSession> {
        self.files.get(file_id).await?;
        let session = self
            .collab
            .open_session(file_id, participants, initial_body)
            .await;
        self.emit_file(FileEvent::CollabSessionCreated {
            session_id: session.id.clone(),
            file_id: file_id.to_string(),
        })
        .await;
        Ok(session)
    }

    /// Join a collaborative session
    pub async fn join_collab_session(&self, session_id: &str, principal: &str) -> Result<()> {
        Ok(self.collab.join(session_id, principal).await?)
    }

    /// Apply a change to a collaborative session
    pub async fn apply_collab_change(
        &self,
        session_id: &str,
        request: ChangeRequest,
    ) -> Result<Change> {
        let change = self.collab.apply_change(session_id, request).await?;
        self.emit_file(FileEvent::CollabChangeApplied {
            session_id: session_id.to_string(),
            change_id: change.id,
            author_id: change.author_id.clone(),
        })
        .await;
        Ok(change)
    }

    /// Fetch a collaborative session snapshot
    pub async fn get_collab_session(&self, session_id: &str) -> Result<CollabSession> {
        Ok(self.collab.get(session_id).await?)
    }

    /// Replay the conversations journal into the manager.
    ///
    /// Returns how many conversations were restored. Ended
    /// conversations come back exactly once; live ones resume at
    /// their latest checkpoint.
    pub async fn replay(&self) -> Result<usize> {
        let records = self.conversations_journal.stream(0).await?;
        let snapshots = latest_snapshots(&records);
        let restored = self.conversations.restore(snapshots).await?;
        if restored > 0 {
            info!(restored, "Conversations restored from journal");
        }
        Ok(restored)
    }

    /// Checkpoint a conversation to the journal
    async fn checkpoint(&self, conversation_id: &str) -> Result<()> {
        let snapshot = self.conversations.snapshot(conversation_id).await?;
        let record = Record::new(
            self.ids.mint(),
            self.ids.now(),
            RecordKind::ConversationSnapshot,
            snapshot,
        );
        self.conversations_journal.append(&record).await?;
        Ok(())
    }

    async fn emit_file(&self, event: FileEvent) {
        let envelope = HubEvent::new(self.ids.mint(), self.ids.now(), FILE_PRODUCER, event);
        self.bus.publish(envelope).await;
    }
}

/// Persist every bus event to the events journal.
///
/// The recorder is an ordinary subscriber: per-producer publication
/// order is exactly the order records land on disk. Pausing recording
/// drops events instead of writing them.
fn spawn_recorder(mut subscription: Subscription, journal: Journal, recording: Arc<AtomicBool>) {
    tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            if !recording.load(Ordering::Acquire) {
                continue;
            }
            let payload = match serde_json::to_value(&event) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(error = %e, "Event not serializable, skipping");
                    continue;
                }
            };
            let record = Record::new(event.id.clone(), event.timestamp, RecordKind::Event, payload);
            if let Err(e) = journal.append(&record).await {
                // Journal failures must not take the hub down; state
                // stays exportable from memory.
                warn!(error = %e, "Failed to persist event");
            }
        }
    });
}

/// A message list helper for the common case of reading a submission
#[must_use]
pub fn appended_messages(submission: &Submission) -> &[Message] {
    match submission {
        Submission::Appended(messages) => messages,
        _ => &[],
    }
}
