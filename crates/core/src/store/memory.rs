//! In-memory store used by tests and local runs.
//!
//! Writes are staged on the transaction and applied to a copy of the state
//! at commit time; the copy only replaces the live state if every staged
//! write applied cleanly.

use super::{
    ConversationStore, NewConversation, NewMessage, NewQuestion, NewTopic, StoreTransaction,
};
use crate::error::RepositoryError;
use crate::interview::{Interview, InterviewLookup};
use crate::models::{Conversation, ConversationCursor, Message, Question, Topic};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Default)]
struct MemoryState {
    conversations: HashMap<Uuid, Conversation>,
    interviews: HashMap<Uuid, Interview>,
}

#[derive(Debug, Default)]
struct Counters {
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    interview_lookups: AtomicUsize,
    fail_message_writes: AtomicBool,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    counters: Arc<Counters>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_interview(&self, interview: Interview) {
        self.state
            .lock()
            .await
            .interviews
            .insert(interview.id, interview);
    }

    pub async fn conversation_count(&self) -> usize {
        self.state.lock().await.conversations.len()
    }

    /// Makes every subsequent `create_messages` call fail with a storage error.
    pub fn fail_message_writes(&self, fail: bool) {
        self.counters
            .fail_message_writes
            .store(fail, Ordering::SeqCst);
    }

    pub fn commits(&self) -> usize {
        self.counters.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.counters.rollbacks.load(Ordering::SeqCst)
    }

    pub fn interview_lookups(&self) -> usize {
        self.counters.interview_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn load_conversation(&self, id: Uuid) -> Result<Option<Conversation>, RepositoryError> {
        Ok(self.state.lock().await.conversations.get(&id).cloned())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, RepositoryError> {
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            staged: Vec::new(),
        }))
    }
}

#[async_trait]
impl InterviewLookup for MemoryStore {
    async fn get_interview(&self, id: Uuid) -> Result<Option<Interview>, RepositoryError> {
        self.counters
            .interview_lookups
            .fetch_add(1, Ordering::SeqCst);
        Ok(self.state.lock().await.interviews.get(&id).cloned())
    }
}

#[derive(Debug)]
enum StagedWrite {
    Conversation {
        id: Uuid,
        record: NewConversation,
    },
    Topic {
        id: Uuid,
        record: NewTopic,
    },
    Question {
        id: Uuid,
        record: NewQuestion,
    },
    Messages(Vec<(Uuid, NewMessage)>),
    Cursor {
        id: Uuid,
        expected: ConversationCursor,
        next: ConversationCursor,
        updated_at: DateTime<Utc>,
    },
}

pub struct MemoryTransaction {
    store: MemoryStore,
    staged: Vec<StagedWrite>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn create_conversation(
        &mut self,
        conversation: &NewConversation,
    ) -> Result<Uuid, RepositoryError> {
        let id = Uuid::new_v4();
        self.staged.push(StagedWrite::Conversation {
            id,
            record: conversation.clone(),
        });
        Ok(id)
    }

    async fn create_topic(&mut self, topic: &NewTopic) -> Result<Uuid, RepositoryError> {
        let id = Uuid::new_v4();
        self.staged.push(StagedWrite::Topic {
            id,
            record: topic.clone(),
        });
        Ok(id)
    }

    async fn create_question(&mut self, question: &NewQuestion) -> Result<Uuid, RepositoryError> {
        let id = Uuid::new_v4();
        self.staged.push(StagedWrite::Question {
            id,
            record: question.clone(),
        });
        Ok(id)
    }

    async fn create_messages(
        &mut self,
        messages: &[NewMessage],
    ) -> Result<Vec<Uuid>, RepositoryError> {
        if self.store.counters.fail_message_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::storage("message insert failed"));
        }
        let rows: Vec<(Uuid, NewMessage)> = messages
            .iter()
            .map(|m| (Uuid::new_v4(), m.clone()))
            .collect();
        let ids = rows.iter().map(|(id, _)| *id).collect();
        self.staged.push(StagedWrite::Messages(rows));
        Ok(ids)
    }

    async fn update_conversation(
        &mut self,
        id: Uuid,
        expected: &ConversationCursor,
        next: &ConversationCursor,
        updated_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        // Checked now against committed state and again at commit.
        let state = self.store.state.lock().await;
        if let Some(current) = state.conversations.get(&id) {
            if current.cursor() != *expected {
                return Err(RepositoryError::Conflict(id));
            }
        }
        drop(state);
        self.staged.push(StagedWrite::Cursor {
            id,
            expected: expected.clone(),
            next: next.clone(),
            updated_at,
        });
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let MemoryTransaction { store, staged } = *self;
        let mut state = store.state.lock().await;
        let mut working = state.conversations.clone();
        for write in staged {
            apply(&mut working, write)?;
        }
        state.conversations = working;
        store.counters.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
        self.store.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn apply(
    conversations: &mut HashMap<Uuid, Conversation>,
    write: StagedWrite,
) -> Result<(), RepositoryError> {
    match write {
        StagedWrite::Conversation { id, record } => {
            let cursor = record.cursor;
            conversations.insert(
                id,
                Conversation {
                    id,
                    interview_id: record.interview_id,
                    current_topic: cursor.current_topic,
                    current_subtopic: cursor.current_subtopic,
                    current_question_number: cursor.current_question_number,
                    status: cursor.status,
                    created_at: record.created_at,
                    updated_at: record.created_at,
                    topics: BTreeMap::new(),
                },
            );
        }
        StagedWrite::Topic { id, record } => {
            let conversation = conversation_mut(conversations, record.conversation_id)?;
            if conversation.topics.contains_key(&record.position) {
                return Err(RepositoryError::Corrupt(format!(
                    "topic {} already opened in conversation {}",
                    record.position, record.conversation_id
                )));
            }
            conversation.topics.insert(
                record.position,
                Topic {
                    id: Some(id),
                    conversation_id: Some(record.conversation_id),
                    position: record.position,
                    name: record.name,
                    questions: BTreeMap::new(),
                },
            );
        }
        StagedWrite::Question { id, record } => {
            let conversation = conversation_mut(conversations, record.conversation_id)?;
            let topic = topic_mut(conversation, record.topic_id)?;
            if topic.questions.contains_key(&record.number) {
                return Err(RepositoryError::Corrupt(format!(
                    "question {} already exists in topic {}",
                    record.number, record.topic_id
                )));
            }
            topic.questions.insert(
                record.number,
                Question {
                    id,
                    conversation_id: record.conversation_id,
                    topic_id: record.topic_id,
                    number: record.number,
                    prompt: record.prompt,
                    messages: Vec::new(),
                    created_at: record.created_at,
                },
            );
        }
        StagedWrite::Messages(rows) => {
            for (id, record) in rows {
                let conversation = conversation_mut(conversations, record.conversation_id)?;
                let topic = topic_mut(conversation, record.topic_id)?;
                let question = topic
                    .questions
                    .values_mut()
                    .find(|q| q.id == record.question_id)
                    .ok_or_else(|| {
                        RepositoryError::Corrupt(format!(
                            "question {} does not exist",
                            record.question_id
                        ))
                    })?;
                question.messages.push(Message {
                    id,
                    conversation_id: record.conversation_id,
                    topic_id: record.topic_id,
                    question_id: record.question_id,
                    author: record.author,
                    content: record.content,
                    sequence: record.sequence,
                    created_at: record.created_at,
                });
            }
        }
        StagedWrite::Cursor {
            id,
            expected,
            next,
            updated_at,
        } => {
            let conversation = conversation_mut(conversations, id)?;
            if conversation.cursor() != expected {
                return Err(RepositoryError::Conflict(id));
            }
            conversation.apply_cursor(&next, updated_at);
        }
    }
    Ok(())
}

fn conversation_mut(
    conversations: &mut HashMap<Uuid, Conversation>,
    id: Uuid,
) -> Result<&mut Conversation, RepositoryError> {
    conversations
        .get_mut(&id)
        .ok_or_else(|| RepositoryError::Corrupt(format!("conversation {id} does not exist")))
}

fn topic_mut(conversation: &mut Conversation, topic_id: Uuid) -> Result<&mut Topic, RepositoryError> {
    conversation
        .topics
        .values_mut()
        .find(|t| t.id == Some(topic_id))
        .ok_or_else(|| RepositoryError::Corrupt(format!("topic {topic_id} does not exist")))
}
