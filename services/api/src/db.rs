//! Data Access Layer
//!
//! Postgres implementation of the conversation store and interview lookup.
//! Every create/append cycle runs inside one `sqlx` transaction; the
//! conversation row is only moved forward if it still holds the cursor the
//! turn was computed from.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use interview_core::{
    RepositoryError,
    interview::{Interview, InterviewLookup},
    models::{Conversation, ConversationCursor, Message, Question, Topic},
    store::{
        ConversationStore, NewConversation, NewMessage, NewQuestion, NewTopic, StoreTransaction,
    },
};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// A wrapper around the `PgPool` to provide a clear data access interface.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Creates a new `PgStore` instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs all pending `sqlx` migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[derive(FromRow, Debug, Clone)]
struct ConversationRow {
    id: Uuid,
    interview_id: Uuid,
    current_topic: i32,
    current_subtopic: String,
    current_question_number: i32,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow, Debug, Clone)]
struct TopicRow {
    id: Uuid,
    conversation_id: Uuid,
    position: i32,
    name: String,
}

#[derive(FromRow, Debug, Clone)]
struct QuestionRow {
    id: Uuid,
    conversation_id: Uuid,
    topic_id: Uuid,
    question_number: i32,
    prompt: String,
    created_at: DateTime<Utc>,
}

#[derive(FromRow, Debug, Clone)]
struct MessageRow {
    id: Uuid,
    conversation_id: Uuid,
    topic_id: Uuid,
    question_id: Uuid,
    author: String,
    content: String,
    sequence: i32,
    created_at: DateTime<Utc>,
}

#[derive(FromRow, Debug, Clone)]
struct InterviewRow {
    id: Uuid,
    job_title: String,
    job_description_summary: String,
}

fn storage(err: sqlx::Error) -> RepositoryError {
    RepositoryError::storage(err)
}

/// A unique violation on a child row means another turn wrote the same slot.
fn write_error(err: sqlx::Error, conversation_id: Uuid) -> RepositoryError {
    match err.as_database_error() {
        Some(db) if db.is_unique_violation() => RepositoryError::Conflict(conversation_id),
        _ => storage(err),
    }
}

fn to_db(value: u32, field: &str) -> Result<i32, RepositoryError> {
    i32::try_from(value)
        .map_err(|_| RepositoryError::Corrupt(format!("{field} {value} does not fit the column")))
}

fn from_db(value: i32, field: &str) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::Corrupt(format!("{field} {value} is negative")))
}

/// Rebuilds the conversation tree from flat rows. Row order is irrelevant.
fn assemble(
    row: ConversationRow,
    topics: Vec<TopicRow>,
    questions: Vec<QuestionRow>,
    messages: Vec<MessageRow>,
) -> Result<Conversation, RepositoryError> {
    let mut positions: HashMap<Uuid, u32> = HashMap::new();
    let mut topic_map: BTreeMap<u32, Topic> = BTreeMap::new();
    for t in topics {
        let position = from_db(t.position, "topic position")?;
        positions.insert(t.id, position);
        topic_map.insert(
            position,
            Topic {
                id: Some(t.id),
                conversation_id: Some(t.conversation_id),
                position,
                name: t.name,
                questions: BTreeMap::new(),
            },
        );
    }

    let mut question_slots: HashMap<Uuid, (u32, u32)> = HashMap::new();
    for q in questions {
        let position = *positions.get(&q.topic_id).ok_or_else(|| {
            RepositoryError::Corrupt(format!("question {} has no topic {}", q.id, q.topic_id))
        })?;
        let number = from_db(q.question_number, "question number")?;
        question_slots.insert(q.id, (position, number));
        if let Some(topic) = topic_map.get_mut(&position) {
            topic.questions.insert(
                number,
                Question {
                    id: q.id,
                    conversation_id: q.conversation_id,
                    topic_id: q.topic_id,
                    number,
                    prompt: q.prompt,
                    messages: Vec::new(),
                    created_at: q.created_at,
                },
            );
        }
    }

    for m in messages {
        let (position, number) = *question_slots.get(&m.question_id).ok_or_else(|| {
            RepositoryError::Corrupt(format!(
                "message {} has no question {}",
                m.id, m.question_id
            ))
        })?;
        let question = topic_map
            .get_mut(&position)
            .and_then(|t| t.questions.get_mut(&number))
            .ok_or_else(|| RepositoryError::Corrupt(format!("question {} vanished", m.question_id)))?;
        question.messages.push(Message {
            id: m.id,
            conversation_id: m.conversation_id,
            topic_id: m.topic_id,
            question_id: m.question_id,
            author: m.author.parse()?,
            content: m.content,
            sequence: m.sequence,
            created_at: m.created_at,
        });
    }

    Ok(Conversation {
        id: row.id,
        interview_id: row.interview_id,
        current_topic: from_db(row.current_topic, "current topic")?,
        current_subtopic: row.current_subtopic,
        current_question_number: from_db(row.current_question_number, "question number")?,
        status: row.status.parse()?,
        created_at: row.created_at,
        updated_at: row.updated_at,
        topics: topic_map,
    })
}

#[async_trait]
impl ConversationStore for PgStore {
    async fn load_conversation(&self, id: Uuid) -> Result<Option<Conversation>, RepositoryError> {
        let Some(row) = sqlx::query_as::<_, ConversationRow>(
            r#"
            SELECT id, interview_id, current_topic, current_subtopic, current_question_number,
                   status, created_at, updated_at
            FROM conversations
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?
        else {
            return Ok(None);
        };

        let topics = sqlx::query_as::<_, TopicRow>(
            "SELECT id, conversation_id, position, name FROM conversation_topics WHERE conversation_id = $1 ORDER BY position",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        let questions = sqlx::query_as::<_, QuestionRow>(
            r#"
            SELECT id, conversation_id, topic_id, question_number, prompt, created_at
            FROM conversation_questions
            WHERE conversation_id = $1
            ORDER BY question_number
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        let messages = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, conversation_id, topic_id, question_id, author, content, sequence, created_at
            FROM conversation_messages
            WHERE conversation_id = $1
            ORDER BY sequence, created_at
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        assemble(row, topics, questions, messages).map(Some)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, RepositoryError> {
        let tx = self.pool.begin().await.map_err(storage)?;
        Ok(Box::new(PgTransaction { tx }))
    }
}

#[async_trait]
impl InterviewLookup for PgStore {
    async fn get_interview(&self, id: Uuid) -> Result<Option<Interview>, RepositoryError> {
        let row = sqlx::query_as::<_, InterviewRow>(
            "SELECT id, job_title, job_description_summary FROM interviews WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
        Ok(row.map(|r| Interview {
            id: r.id,
            job_title: r.job_title,
            job_description_summary: r.job_description_summary,
        }))
    }
}

/// An open Postgres transaction. Dropping it without `commit` rolls back.
pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn create_conversation(
        &mut self,
        conversation: &NewConversation,
    ) -> Result<Uuid, RepositoryError> {
        let cursor = &conversation.cursor;
        sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO conversations
                (interview_id, current_topic, current_subtopic, current_question_number, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING id
            "#,
        )
        .bind(conversation.interview_id)
        .bind(to_db(cursor.current_topic, "current topic")?)
        .bind(&cursor.current_subtopic)
        .bind(to_db(cursor.current_question_number, "question number")?)
        .bind(cursor.status.as_str())
        .bind(conversation.created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(storage)
    }

    async fn create_topic(&mut self, topic: &NewTopic) -> Result<Uuid, RepositoryError> {
        sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO conversation_topics (conversation_id, position, name) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(topic.conversation_id)
        .bind(to_db(topic.position, "topic position")?)
        .bind(&topic.name)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| write_error(e, topic.conversation_id))
    }

    async fn create_question(&mut self, question: &NewQuestion) -> Result<Uuid, RepositoryError> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO conversation_questions (conversation_id, topic_id, question_number, prompt, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(question.conversation_id)
        .bind(question.topic_id)
        .bind(to_db(question.number, "question number")?)
        .bind(&question.prompt)
        .bind(question.created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| write_error(e, question.conversation_id))
    }

    async fn create_messages(
        &mut self,
        messages: &[NewMessage],
    ) -> Result<Vec<Uuid>, RepositoryError> {
        let mut ids = Vec::with_capacity(messages.len());
        for message in messages {
            let id = sqlx::query_scalar::<_, Uuid>(
                r#"
                INSERT INTO conversation_messages
                    (conversation_id, topic_id, question_id, author, content, sequence, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING id
                "#,
            )
            .bind(message.conversation_id)
            .bind(message.topic_id)
            .bind(message.question_id)
            .bind(message.author.as_str())
            .bind(&message.content)
            .bind(message.sequence)
            .bind(message.created_at)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| write_error(e, message.conversation_id))?;
            ids.push(id);
        }
        Ok(ids)
    }

    async fn update_conversation(
        &mut self,
        id: Uuid,
        expected: &ConversationCursor,
        next: &ConversationCursor,
        updated_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE conversations
            SET current_topic = $2, current_subtopic = $3, current_question_number = $4,
                status = $5, updated_at = $6
            WHERE id = $1
              AND current_topic = $7 AND current_subtopic = $8
              AND current_question_number = $9 AND status = $10
            "#,
        )
        .bind(id)
        .bind(to_db(next.current_topic, "current topic")?)
        .bind(&next.current_subtopic)
        .bind(to_db(next.current_question_number, "question number")?)
        .bind(next.status.as_str())
        .bind(updated_at)
        .bind(to_db(expected.current_topic, "current topic")?)
        .bind(&expected.current_subtopic)
        .bind(to_db(expected.current_question_number, "question number")?)
        .bind(expected.status.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(storage)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(id));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        self.tx.commit().await.map_err(storage)
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
        self.tx.rollback().await.map_err(storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interview_core::models::{ConversationStatus, MessageAuthor};

    struct Rows {
        conversation: ConversationRow,
        topics: Vec<TopicRow>,
        questions: Vec<QuestionRow>,
        messages: Vec<MessageRow>,
    }

    fn rows() -> Rows {
        let now = Utc::now();
        let conversation_id = Uuid::new_v4();
        let intro = Uuid::new_v4();
        let coding = Uuid::new_v4();
        let q1 = Uuid::new_v4();
        let q2 = Uuid::new_v4();
        let q3 = Uuid::new_v4();
        let message = |question_id: Uuid, topic_id: Uuid, author: &str, content: &str, sequence| {
            MessageRow {
                id: Uuid::new_v4(),
                conversation_id,
                topic_id,
                question_id,
                author: author.to_string(),
                content: content.to_string(),
                sequence,
                created_at: now,
            }
        };
        let question = |id, topic_id, number, prompt: &str| QuestionRow {
            id,
            conversation_id,
            topic_id,
            question_number: number,
            prompt: prompt.to_string(),
            created_at: now,
        };

        Rows {
            conversation: ConversationRow {
                id: conversation_id,
                interview_id: Uuid::new_v4(),
                current_topic: 2,
                current_subtopic: "Graphs".to_string(),
                current_question_number: 1,
                status: "active".to_string(),
                created_at: now,
                updated_at: now,
            },
            topics: vec![
                TopicRow {
                    id: coding,
                    conversation_id,
                    position: 2,
                    name: "Coding".to_string(),
                },
                TopicRow {
                    id: intro,
                    conversation_id,
                    position: 1,
                    name: "Introduction".to_string(),
                },
            ],
            questions: vec![
                question(q3, coding, 1, "BFS or DFS?"),
                question(q2, intro, 2, "Why now?"),
                question(q1, intro, 1, "About you?"),
            ],
            messages: vec![
                message(q1, intro, "user", "Five years", 2),
                message(q3, coding, "interviewer", "BFS or DFS?", 0),
                message(q1, intro, "system", "prompt", 0),
                message(q1, intro, "interviewer", "About you?", 1),
                message(q2, intro, "interviewer", "Why now?", 0),
            ],
        }
    }

    #[test]
    fn test_assemble_builds_the_tree_regardless_of_row_order() {
        let r = rows();
        let conversation = assemble(r.conversation, r.topics, r.questions, r.messages).unwrap();

        assert_eq!(conversation.current_topic, 2);
        assert_eq!(conversation.status, ConversationStatus::Active);
        assert_eq!(conversation.topics.keys().copied().collect::<Vec<_>>(), vec![1, 2]);

        let intro = &conversation.topics[&1];
        assert_eq!(intro.questions.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        let authors: Vec<MessageAuthor> = intro.questions[&1]
            .ordered_messages()
            .into_iter()
            .map(|m| m.author)
            .collect();
        assert_eq!(
            authors,
            vec![
                MessageAuthor::System,
                MessageAuthor::Interviewer,
                MessageAuthor::User
            ]
        );
        assert_eq!(conversation.current_question().unwrap().prompt, "BFS or DFS?");
    }

    #[test]
    fn test_assemble_rejects_orphans_and_unknown_values() {
        let mut r = rows();
        r.messages[0].question_id = Uuid::new_v4();
        assert!(matches!(
            assemble(r.conversation, r.topics, r.questions, r.messages),
            Err(RepositoryError::Corrupt(_))
        ));

        let mut r = rows();
        r.messages[0].author = "ai".to_string();
        assert!(assemble(r.conversation, r.topics, r.questions, r.messages).is_err());

        let mut r = rows();
        r.conversation.status = "ended".to_string();
        assert!(assemble(r.conversation, r.topics, r.questions, r.messages).is_err());

        let mut r = rows();
        r.questions[0].topic_id = Uuid::new_v4();
        assert!(assemble(r.conversation, r.topics, r.questions, r.messages).is_err());
    }

    #[test]
    fn test_non_constraint_write_errors_stay_storage_errors() {
        let id = Uuid::new_v4();
        assert!(matches!(
            write_error(sqlx::Error::RowNotFound, id),
            RepositoryError::Storage(_)
        ));
        assert!(matches!(
            write_error(sqlx::Error::PoolTimedOut, id),
            RepositoryError::Storage(_)
        ));
    }

    #[test]
    fn test_integer_conversions() {
        assert_eq!(to_db(6, "position").unwrap(), 6);
        assert!(to_db(u32::MAX, "position").is_err());
        assert_eq!(from_db(2, "number").unwrap(), 2);
        assert!(from_db(-1, "number").is_err());
    }
}
