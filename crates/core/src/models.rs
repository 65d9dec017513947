//! Conversation Data Model
//!
//! A conversation owns its topics, each topic owns its questions and each
//! question owns its messages. Topics and questions are kept in `BTreeMap`s
//! keyed by position / question number so iteration is always in numeric
//! order. Messages are stored as loaded; read them through
//! [`Question::ordered_messages`], never by index.

use crate::error::RepositoryError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageAuthor {
    System,
    Interviewer,
    User,
}

impl MessageAuthor {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageAuthor::System => "system",
            MessageAuthor::Interviewer => "interviewer",
            MessageAuthor::User => "user",
        }
    }

    /// Role used when the message is replayed to the turn generator.
    /// System messages are never replayed.
    pub fn chat_role(&self) -> Option<ChatRole> {
        match self {
            MessageAuthor::System => None,
            MessageAuthor::Interviewer => Some(ChatRole::Assistant),
            MessageAuthor::User => Some(ChatRole::User),
        }
    }
}

impl fmt::Display for MessageAuthor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageAuthor {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(MessageAuthor::System),
            "interviewer" => Ok(MessageAuthor::Interviewer),
            "user" => Ok(MessageAuthor::User),
            other => Err(RepositoryError::Corrupt(format!(
                "unknown message author '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Finished,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Active => "active",
            ConversationStatus::Finished => "finished",
        }
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversationStatus {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ConversationStatus::Active),
            "finished" => Ok(ConversationStatus::Finished),
            other => Err(RepositoryError::Corrupt(format!(
                "unknown conversation status '{other}'"
            ))),
        }
    }
}

/// The two-sided role vocabulary understood by the turn generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One entry of the transcript handed to the turn generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub topic_id: Uuid,
    pub question_id: Uuid,
    pub author: MessageAuthor,
    pub content: String,
    /// Causal position within the owning question, starting at 0.
    pub sequence: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub topic_id: Uuid,
    pub number: u32,
    /// The question text shown to the candidate.
    pub prompt: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
}

impl Question {
    /// Messages in causal order: by sequence, then creation time, then id.
    pub fn ordered_messages(&self) -> Vec<&Message> {
        let mut messages: Vec<&Message> = self.messages.iter().collect();
        messages.sort_by(|a, b| {
            a.sequence
                .cmp(&b.sequence)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        messages
    }

    pub fn next_sequence(&self) -> i32 {
        self.messages
            .iter()
            .map(|m| m.sequence + 1)
            .max()
            .unwrap_or(0)
    }
}

/// A curriculum section within one conversation.
///
/// Topics cloned from the catalog start out unopened (`id` is `None`) and get
/// an identity once the conversation reaches them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: Option<Uuid>,
    pub conversation_id: Option<Uuid>,
    pub position: u32,
    pub name: String,
    pub questions: BTreeMap<u32, Question>,
}

impl Topic {
    pub fn unopened(position: u32, name: impl Into<String>) -> Self {
        Self {
            id: None,
            conversation_id: None,
            position,
            name: name.into(),
            questions: BTreeMap::new(),
        }
    }

    pub fn is_opened(&self) -> bool {
        self.id.is_some()
    }
}

/// Where a conversation currently stands. Stores compare the expected cursor
/// before writing a new one so two racing turns cannot both advance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationCursor {
    pub current_topic: u32,
    pub current_subtopic: String,
    pub current_question_number: u32,
    pub status: ConversationStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub interview_id: Uuid,
    /// 1-based catalog position.
    pub current_topic: u32,
    pub current_subtopic: String,
    /// 1 or 2 within the current topic.
    pub current_question_number: u32,
    pub status: ConversationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub topics: BTreeMap<u32, Topic>,
}

impl Conversation {
    pub fn current_topic(&self) -> Option<&Topic> {
        self.topics.get(&self.current_topic)
    }

    /// The question being answered: the one numbered `current_question_number`,
    /// or the highest-numbered question if the cursor and store disagree.
    pub fn current_question(&self) -> Option<&Question> {
        let topic = self.current_topic()?;
        topic
            .questions
            .get(&self.current_question_number)
            .or_else(|| topic.questions.values().next_back())
    }

    /// Number of questions already recorded under the current topic.
    pub fn questions_in_current_topic(&self) -> usize {
        self.current_topic().map_or(0, |t| t.questions.len())
    }

    pub fn is_finished(&self) -> bool {
        self.status == ConversationStatus::Finished
    }

    pub fn cursor(&self) -> ConversationCursor {
        ConversationCursor {
            current_topic: self.current_topic,
            current_subtopic: self.current_subtopic.clone(),
            current_question_number: self.current_question_number,
            status: self.status,
        }
    }

    pub fn apply_cursor(&mut self, cursor: &ConversationCursor, updated_at: DateTime<Utc>) {
        self.current_topic = cursor.current_topic;
        self.current_subtopic = cursor.current_subtopic.clone();
        self.current_question_number = cursor.current_question_number;
        self.status = cursor.status;
        self.updated_at = updated_at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn message(sequence: i32, author: MessageAuthor, content: &str) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id: Uuid::nil(),
            topic_id: Uuid::nil(),
            question_id: Uuid::nil(),
            author,
            content: content.to_string(),
            sequence,
            created_at: Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap(),
        }
    }

    #[test]
    fn test_message_author_round_trips_through_str() {
        for author in [
            MessageAuthor::System,
            MessageAuthor::Interviewer,
            MessageAuthor::User,
        ] {
            assert_eq!(author.as_str().parse::<MessageAuthor>().unwrap(), author);
        }
        assert!("ai".parse::<MessageAuthor>().is_err());
    }

    #[test]
    fn test_message_author_chat_roles() {
        assert_eq!(MessageAuthor::System.chat_role(), None);
        assert_eq!(
            MessageAuthor::Interviewer.chat_role(),
            Some(ChatRole::Assistant)
        );
        assert_eq!(MessageAuthor::User.chat_role(), Some(ChatRole::User));
    }

    #[test]
    fn test_conversation_status_serialization() {
        assert_eq!(
            serde_json::to_string(&ConversationStatus::Finished).unwrap(),
            "\"finished\""
        );
        assert_eq!(
            "active".parse::<ConversationStatus>().unwrap(),
            ConversationStatus::Active
        );
        assert!("ended".parse::<ConversationStatus>().is_err());
    }

    #[test]
    fn test_ordered_messages_ignores_storage_order() {
        let question = Question {
            id: Uuid::new_v4(),
            conversation_id: Uuid::nil(),
            topic_id: Uuid::nil(),
            number: 1,
            prompt: "Why Rust?".to_string(),
            messages: vec![
                message(2, MessageAuthor::Interviewer, "feedback"),
                message(0, MessageAuthor::Interviewer, "Why Rust?"),
                message(1, MessageAuthor::User, "Because."),
            ],
            created_at: Utc::now(),
        };

        let contents: Vec<&str> = question
            .ordered_messages()
            .into_iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, vec!["Why Rust?", "Because.", "feedback"]);
        assert_eq!(question.next_sequence(), 3);
    }

    #[test]
    fn test_next_sequence_of_empty_question_is_zero() {
        let question = Question {
            id: Uuid::new_v4(),
            conversation_id: Uuid::nil(),
            topic_id: Uuid::nil(),
            number: 1,
            prompt: String::new(),
            messages: vec![],
            created_at: Utc::now(),
        };
        assert_eq!(question.next_sequence(), 0);
    }

    #[test]
    fn test_unopened_topic() {
        let topic = Topic::unopened(3, "System Design");
        assert!(!topic.is_opened());
        assert_eq!(topic.position, 3);
        assert!(topic.questions.is_empty());
    }
}
