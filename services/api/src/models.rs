//! API Models
//!
//! Request payloads and response bodies for the REST API, with `utoipa`
//! schemas for the OpenAPI document. Responses are views over the core
//! conversation model; ordering is always numeric (topics by position,
//! questions by number, messages by sequence).

use chrono::{DateTime, Utc};
use interview_core::{
    catalog::CatalogTopic,
    models::{Conversation, ConversationStatus, Message, MessageAuthor, Question, Topic},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StatusView {
    Active,
    Finished,
}

impl From<ConversationStatus> for StatusView {
    fn from(status: ConversationStatus) -> Self {
        match status {
            ConversationStatus::Active => StatusView::Active,
            ConversationStatus::Finished => StatusView::Finished,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthorView {
    System,
    Interviewer,
    User,
}

impl From<MessageAuthor> for AuthorView {
    fn from(author: MessageAuthor) -> Self {
        match author {
            MessageAuthor::System => AuthorView::System,
            MessageAuthor::Interviewer => AuthorView::Interviewer,
            MessageAuthor::User => AuthorView::User,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct MessageView {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    pub author: AuthorView,
    pub content: String,
    pub sequence: i32,
    pub created_at: DateTime<Utc>,
}

impl From<&Message> for MessageView {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            author: message.author.into(),
            content: message.content.clone(),
            sequence: message.sequence,
            created_at: message.created_at,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct QuestionView {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    pub number: u32,
    pub prompt: String,
    pub messages: Vec<MessageView>,
}

impl From<&Question> for QuestionView {
    fn from(question: &Question) -> Self {
        Self {
            id: question.id,
            number: question.number,
            prompt: question.prompt.clone(),
            messages: question
                .ordered_messages()
                .into_iter()
                .map(MessageView::from)
                .collect(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct TopicView {
    /// Absent for catalog topics the interview has not reached yet.
    #[schema(value_type = Option<String>, format = Uuid)]
    pub id: Option<Uuid>,
    pub position: u32,
    pub name: String,
    pub questions: Vec<QuestionView>,
}

impl From<&Topic> for TopicView {
    fn from(topic: &Topic) -> Self {
        Self {
            id: topic.id,
            position: topic.position,
            name: topic.name.clone(),
            questions: topic.questions.values().map(QuestionView::from).collect(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct ConversationResponse {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    #[schema(value_type = String, format = Uuid)]
    pub interview_id: Uuid,
    #[schema(example = "active")]
    pub status: StatusView,
    pub current_topic: u32,
    pub current_topic_name: Option<String>,
    pub current_subtopic: String,
    pub current_question_number: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub topics: Vec<TopicView>,
}

impl From<&Conversation> for ConversationResponse {
    fn from(conversation: &Conversation) -> Self {
        Self {
            id: conversation.id,
            interview_id: conversation.interview_id,
            status: conversation.status.into(),
            current_topic: conversation.current_topic,
            current_topic_name: conversation.current_topic().map(|t| t.name.clone()),
            current_subtopic: conversation.current_subtopic.clone(),
            current_question_number: conversation.current_question_number,
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
            topics: conversation.topics.values().map(TopicView::from).collect(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq, Eq)]
pub struct CatalogTopicView {
    pub position: u32,
    pub name: String,
}

impl From<&CatalogTopic> for CatalogTopicView {
    fn from(topic: &CatalogTopic) -> Self {
        Self {
            position: topic.position,
            name: topic.name.clone(),
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CreateConversationPayload {
    #[schema(example = "Hi, I'm ready to start.")]
    pub message: String,
}

#[derive(Deserialize, ToSchema)]
pub struct AppendMessagePayload {
    #[schema(example = "I would start with a hash map keyed by user id.")]
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}
