//! Conversation persistence contract.
//!
//! Every Create and Append runs its writes inside one [`StoreTransaction`]:
//! nothing becomes visible until `commit`, and a transaction that is rolled
//! back (or dropped) leaves no trace.

pub mod memory;

use crate::error::RepositoryError;
use crate::models::{Conversation, ConversationCursor, MessageAuthor};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use memory::MemoryStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConversation {
    pub interview_id: Uuid,
    pub cursor: ConversationCursor,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTopic {
    pub conversation_id: Uuid,
    pub position: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuestion {
    pub conversation_id: Uuid,
    pub topic_id: Uuid,
    pub number: u32,
    pub prompt: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub topic_id: Uuid,
    pub question_id: Uuid,
    pub author: MessageAuthor,
    pub content: String,
    pub sequence: i32,
    pub created_at: DateTime<Utc>,
}

/// Read access plus the entry point for transactional writes.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Loads a conversation with every stored topic, question and message.
    /// Catalog topics that were never opened are not part of the result.
    async fn load_conversation(&self, id: Uuid) -> Result<Option<Conversation>, RepositoryError>;

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, RepositoryError>;
}

/// One unit of work. Each `create_*` returns the generated identity.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn create_conversation(
        &mut self,
        conversation: &NewConversation,
    ) -> Result<Uuid, RepositoryError>;

    async fn create_topic(&mut self, topic: &NewTopic) -> Result<Uuid, RepositoryError>;

    async fn create_question(&mut self, question: &NewQuestion) -> Result<Uuid, RepositoryError>;

    async fn create_messages(
        &mut self,
        messages: &[NewMessage],
    ) -> Result<Vec<Uuid>, RepositoryError>;

    /// Moves the conversation to `next`, failing with
    /// [`RepositoryError::Conflict`] unless it is still at `expected`.
    async fn update_conversation(
        &mut self,
        id: Uuid,
        expected: &ConversationCursor,
        next: &ConversationCursor,
        updated_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError>;
}
