//! Turn Orchestrator
//!
//! Coordinates the create and append cycles of an interview conversation:
//! transcript, turn generation, transition, and the writes that record it.
//! All writes of one cycle go through a single store transaction, and the
//! transaction is only opened once the generator has answered.

use crate::catalog::TopicCatalog;
use crate::error::{InterviewError, RepositoryError, Result, TurnGeneratorError};
use crate::evaluator::{Transition, evaluate_conversation};
use crate::interview::{Interview, InterviewLookup, SummaryCache};
use crate::models::{
    ChatTurn, Conversation, ConversationCursor, ConversationStatus, Message, MessageAuthor,
    Question, Topic,
};
use crate::prompt::PromptTemplate;
use crate::store::{
    ConversationStore, NewConversation, NewMessage, NewQuestion, NewTopic, StoreTransaction,
};
use crate::transcript::{build_history, system_prompt};
use crate::turn_generator::{GeneratedTurn, TurnGenerator};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

pub const DEFAULT_TURN_TIMEOUT: Duration = Duration::from_secs(60);

/// Everything the orchestrator needs, supplied by whoever wires the service.
pub struct OrchestratorDeps {
    pub generator: Arc<dyn TurnGenerator>,
    pub store: Arc<dyn ConversationStore>,
    pub interviews: Arc<dyn InterviewLookup>,
    pub summaries: Arc<SummaryCache>,
    pub prompt: Arc<PromptTemplate>,
    pub catalog: Arc<TopicCatalog>,
    pub turn_timeout: Duration,
}

pub struct Orchestrator {
    generator: Arc<dyn TurnGenerator>,
    store: Arc<dyn ConversationStore>,
    interviews: Arc<dyn InterviewLookup>,
    summaries: Arc<SummaryCache>,
    prompt: Arc<PromptTemplate>,
    catalog: Arc<TopicCatalog>,
    turn_timeout: Duration,
}

impl Orchestrator {
    pub fn new(deps: OrchestratorDeps) -> Self {
        Self {
            generator: deps.generator,
            store: deps.store,
            interviews: deps.interviews,
            summaries: deps.summaries,
            prompt: deps.prompt,
            catalog: deps.catalog,
            turn_timeout: deps.turn_timeout,
        }
    }

    pub fn catalog(&self) -> &TopicCatalog {
        &self.catalog
    }

    /// Starts an interview: asks the generator for the opening question, then
    /// records it together with the candidate's opening message.
    #[instrument(name = "create_conversation", skip_all, fields(%interview_id))]
    pub async fn create_conversation(
        &self,
        interview_id: Uuid,
        opening_message: &str,
        cancel: &CancellationToken,
    ) -> Result<Conversation> {
        let opening = validate_message(opening_message)?;
        let interview = self.interview(interview_id).await?;

        let first = self.catalog.first().position;
        let history = vec![
            ChatTurn::system(system_prompt(
                &self.catalog,
                &self.prompt,
                &interview,
                first,
                1,
            )),
            ChatTurn::user(opening),
        ];
        let first_turn = self.generate(&history, cancel).await?;

        self.persist_new_conversation(&interview, opening, first_turn)
            .await
    }

    /// Records a new conversation whose opening question was produced elsewhere.
    #[instrument(name = "seed_conversation", skip_all, fields(%interview_id))]
    pub async fn seed_conversation(
        &self,
        interview_id: Uuid,
        opening_message: &str,
        first_turn: GeneratedTurn,
    ) -> Result<Conversation> {
        let opening = validate_message(opening_message)?;
        let interview = self.interview(interview_id).await?;
        self.persist_new_conversation(&interview, opening, first_turn)
            .await
    }

    /// Records one candidate turn and moves the conversation along.
    #[instrument(name = "append_conversation", skip_all, fields(%conversation_id))]
    pub async fn append(
        &self,
        conversation_id: Uuid,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<Conversation> {
        let answer = validate_message(message)?;
        let conversation = self.load(conversation_id).await?;
        if conversation.is_finished() {
            return Err(InterviewError::Validation(format!(
                "conversation {conversation_id} has already finished"
            )));
        }
        let interview = self.interview(conversation.interview_id).await?;

        let mut history = build_history(&conversation, &self.catalog, &self.prompt, &interview)?;
        history.push(ChatTurn::user(answer));
        debug!(turns = history.len(), "Transcript assembled");

        let turn = self.generate(&history, cancel).await?;
        let transition = evaluate_conversation(&conversation, &turn, &self.catalog);
        debug!(?transition, topic = %turn.topic_name, "Transition evaluated");

        let plan = TurnPlan::new(
            &conversation,
            &self.catalog,
            transition,
            &turn,
            answer,
            Utc::now(),
        )?;

        let mut tx = self.store.begin().await?;
        let outcome = write_turn(tx.as_mut(), conversation, &plan).await;
        let updated = settle(tx, outcome).await?;

        if updated.is_finished() {
            self.summaries.delete(&updated.interview_id);
            info!(topic = updated.current_topic, "Interview finished");
        } else {
            info!(
                topic = updated.current_topic,
                question = updated.current_question_number,
                subtopic = %updated.current_subtopic,
                "Turn recorded"
            );
        }
        Ok(updated)
    }

    #[instrument(name = "get_conversation", skip_all, fields(%conversation_id))]
    pub async fn get_conversation(&self, conversation_id: Uuid) -> Result<Conversation> {
        self.load(conversation_id).await
    }

    async fn load(&self, conversation_id: Uuid) -> Result<Conversation> {
        let mut conversation = self
            .store
            .load_conversation(conversation_id)
            .await?
            .ok_or(InterviewError::ConversationNotFound(conversation_id))?;
        self.catalog.complete_conversation(&mut conversation);
        Ok(conversation)
    }

    async fn interview(&self, interview_id: Uuid) -> Result<Interview> {
        if let Some(cached) = self.summaries.get(&interview_id) {
            return Ok(cached);
        }
        let interview = self
            .interviews
            .get_interview(interview_id)
            .await?
            .ok_or(InterviewError::InterviewNotFound(interview_id))?;
        self.summaries.set(interview.clone());
        Ok(interview)
    }

    /// Calls the generator, giving up on timeout or when `cancel` fires.
    /// A cancelled call never reaches the store.
    async fn generate(
        &self,
        history: &[ChatTurn],
        cancel: &CancellationToken,
    ) -> Result<GeneratedTurn, TurnGeneratorError> {
        let turn = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TurnGeneratorError::Cancelled),
            outcome = tokio::time::timeout(self.turn_timeout, self.generator.generate_turn(history)) => {
                match outcome {
                    Ok(result) => result,
                    Err(_) => Err(TurnGeneratorError::TimedOut(self.turn_timeout)),
                }
            }
        };
        if let Err(e) = &turn {
            warn!(error = %e, "Turn generation failed");
        }
        if cancel.is_cancelled() {
            return Err(TurnGeneratorError::Cancelled);
        }
        turn
    }

    async fn persist_new_conversation(
        &self,
        interview: &Interview,
        opening: &str,
        first_turn: GeneratedTurn,
    ) -> Result<Conversation> {
        let question = first_turn.question_text.trim();
        if question.is_empty() {
            return Err(InterviewError::Validation(
                "the opening turn carries no question".to_string(),
            ));
        }

        let topic = self.catalog.first();
        let seed = Seed {
            interview_id: interview.id,
            topic_position: topic.position,
            topic_name: &topic.name,
            subtopic: first_turn.subtopic_name.trim(),
            system_prompt: system_prompt(
                &self.catalog,
                &self.prompt,
                interview,
                topic.position,
                1,
            ),
            question,
            opening,
            now: Utc::now(),
        };

        let mut tx = self.store.begin().await?;
        let outcome = write_seed(tx.as_mut(), &seed).await;
        let mut conversation = settle(tx, outcome).await?;
        self.catalog.complete_conversation(&mut conversation);

        info!(
            conversation_id = %conversation.id,
            subtopic = %conversation.current_subtopic,
            "Conversation created"
        );
        Ok(conversation)
    }
}

fn validate_message(message: &str) -> Result<&str> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Err(InterviewError::Validation(
            "message must not be empty".to_string(),
        ));
    }
    Ok(trimmed)
}

/// Commits on success, rolls back on failure.
async fn settle<T>(
    tx: Box<dyn StoreTransaction>,
    outcome: Result<T, RepositoryError>,
) -> Result<T, RepositoryError> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            warn!(error = %err, "Rolling back conversation writes");
            if let Err(rollback_err) = tx.rollback().await {
                error!(error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}

fn materialize(id: Uuid, record: NewMessage) -> Message {
    Message {
        id,
        conversation_id: record.conversation_id,
        topic_id: record.topic_id,
        question_id: record.question_id,
        author: record.author,
        content: record.content,
        sequence: record.sequence,
        created_at: record.created_at,
    }
}

struct Seed<'a> {
    interview_id: Uuid,
    topic_position: u32,
    topic_name: &'a str,
    subtopic: &'a str,
    system_prompt: String,
    question: &'a str,
    opening: &'a str,
    now: DateTime<Utc>,
}

async fn write_seed(
    tx: &mut dyn StoreTransaction,
    seed: &Seed<'_>,
) -> Result<Conversation, RepositoryError> {
    let cursor = ConversationCursor {
        current_topic: seed.topic_position,
        current_subtopic: seed.subtopic.to_string(),
        current_question_number: 1,
        status: ConversationStatus::Active,
    };
    let conversation_id = tx
        .create_conversation(&NewConversation {
            interview_id: seed.interview_id,
            cursor: cursor.clone(),
            created_at: seed.now,
        })
        .await?;
    let topic_id = tx
        .create_topic(&NewTopic {
            conversation_id,
            position: seed.topic_position,
            name: seed.topic_name.to_string(),
        })
        .await?;
    let question_id = tx
        .create_question(&NewQuestion {
            conversation_id,
            topic_id,
            number: 1,
            prompt: seed.question.to_string(),
            created_at: seed.now,
        })
        .await?;

    let records: Vec<NewMessage> = [
        (MessageAuthor::System, seed.system_prompt.as_str()),
        (MessageAuthor::Interviewer, seed.question),
        (MessageAuthor::User, seed.opening),
    ]
    .into_iter()
    .zip(0i32..)
    .map(|((author, content), sequence)| NewMessage {
        conversation_id,
        topic_id,
        question_id,
        author,
        content: content.to_string(),
        sequence,
        created_at: seed.now,
    })
    .collect();
    let ids = tx.create_messages(&records).await?;

    let question = Question {
        id: question_id,
        conversation_id,
        topic_id,
        number: 1,
        prompt: seed.question.to_string(),
        messages: ids.into_iter().zip(records).map(|(id, r)| materialize(id, r)).collect(),
        created_at: seed.now,
    };
    let topic = Topic {
        id: Some(topic_id),
        conversation_id: Some(conversation_id),
        position: seed.topic_position,
        name: seed.topic_name.to_string(),
        questions: BTreeMap::from([(1, question)]),
    };

    Ok(Conversation {
        id: conversation_id,
        interview_id: seed.interview_id,
        current_topic: cursor.current_topic,
        current_subtopic: cursor.current_subtopic,
        current_question_number: cursor.current_question_number,
        status: cursor.status,
        created_at: seed.now,
        updated_at: seed.now,
        topics: BTreeMap::from([(seed.topic_position, topic)]),
    })
}

/// A question the turn opens, possibly under a topic that is not opened yet.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OpenQuestion {
    topic_position: u32,
    topic_name: String,
    topic_id: Option<Uuid>,
    number: u32,
    prompt: String,
}

/// The writes one append will perform, decided before the transaction starts.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TurnPlan {
    conversation_id: Uuid,
    topic_id: Uuid,
    question_id: Uuid,
    next_sequence: i32,
    exchange: Vec<(MessageAuthor, String)>,
    opens: Option<OpenQuestion>,
    expected: ConversationCursor,
    next: ConversationCursor,
    now: DateTime<Utc>,
}

impl TurnPlan {
    fn new(
        conversation: &Conversation,
        catalog: &TopicCatalog,
        transition: Transition,
        turn: &GeneratedTurn,
        answer: &str,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let incomplete = || InterviewError::IncompleteState {
            conversation_id: conversation.id,
            topic: conversation.current_topic,
        };
        let topic = conversation.current_topic().ok_or_else(incomplete)?;
        let topic_id = topic.id.ok_or_else(incomplete)?;
        let question = conversation.current_question().ok_or_else(incomplete)?;

        let expected = conversation.cursor();
        let mut next = expected.clone();
        next.current_subtopic = turn.subtopic_name.trim().to_string();
        let next_topic = catalog.next_position(conversation.current_topic);

        // Finished is checked first: a finished interview never rolls over.
        let closes = transition.finished || (transition.advance_topic && next_topic.is_none());
        if transition.finished && next_topic.is_some() {
            warn!(
                reported_topic = %turn.topic_name,
                current_topic = conversation.current_topic,
                "Finish reported before the final topic, closing interview"
            );
        }
        let (reply, opens) = if closes {
            if !transition.finished {
                warn!(
                    reported_topic = %turn.topic_name,
                    "Curriculum exhausted without a finish signal, closing interview"
                );
            }
            next.status = ConversationStatus::Finished;
            (turn.reply(), None)
        } else if let (true, Some(position)) = (transition.advance_topic, next_topic) {
            next.current_topic = position;
            next.current_question_number = 1;
            let name = catalog
                .get(position)
                .map(|t| t.name.clone())
                .unwrap_or_default();
            let open = OpenQuestion {
                topic_position: position,
                topic_name: name,
                topic_id: conversation.topics.get(&position).and_then(|t| t.id),
                number: 1,
                prompt: next_question(turn)?,
            };
            (turn.feedback_text.trim().to_string(), Some(open))
        } else if transition.advance_question {
            let number = question.number + 1;
            next.current_question_number = number;
            let open = OpenQuestion {
                topic_position: conversation.current_topic,
                topic_name: topic.name.clone(),
                topic_id: Some(topic_id),
                number,
                prompt: next_question(turn)?,
            };
            (turn.feedback_text.trim().to_string(), Some(open))
        } else {
            (turn.reply(), None)
        };

        let mut exchange = vec![(MessageAuthor::User, answer.to_string())];
        if !reply.is_empty() {
            exchange.push((MessageAuthor::Interviewer, reply));
        }

        Ok(Self {
            conversation_id: conversation.id,
            topic_id,
            question_id: question.id,
            next_sequence: question.next_sequence(),
            exchange,
            opens,
            expected,
            next,
            now,
        })
    }
}

fn next_question(turn: &GeneratedTurn) -> Result<String> {
    let question = turn.question_text.trim();
    if question.is_empty() {
        return Err(TurnGeneratorError::Malformed(
            "turn opens a new question but question_text is empty".to_string(),
        )
        .into());
    }
    Ok(question.to_string())
}

async fn write_turn(
    tx: &mut dyn StoreTransaction,
    mut conversation: Conversation,
    plan: &TurnPlan,
) -> Result<Conversation, RepositoryError> {
    // Guarded update first: a stale cursor fails before any insert runs.
    tx.update_conversation(plan.conversation_id, &plan.expected, &plan.next, plan.now)
        .await?;

    let records: Vec<NewMessage> = plan
        .exchange
        .iter()
        .zip(plan.next_sequence..)
        .map(|((author, content), sequence)| NewMessage {
            conversation_id: plan.conversation_id,
            topic_id: plan.topic_id,
            question_id: plan.question_id,
            author: *author,
            content: content.clone(),
            sequence,
            created_at: plan.now,
        })
        .collect();
    let ids = tx.create_messages(&records).await?;

    let current = conversation
        .topics
        .get_mut(&plan.expected.current_topic)
        .and_then(|t| t.questions.values_mut().find(|q| q.id == plan.question_id))
        .ok_or_else(|| {
            RepositoryError::Corrupt(format!("question {} vanished", plan.question_id))
        })?;
    current
        .messages
        .extend(ids.into_iter().zip(records).map(|(id, r)| materialize(id, r)));

    if let Some(open) = &plan.opens {
        let topic_id = match open.topic_id {
            Some(id) => id,
            None => {
                tx.create_topic(&NewTopic {
                    conversation_id: plan.conversation_id,
                    position: open.topic_position,
                    name: open.topic_name.clone(),
                })
                .await?
            }
        };
        let question_id = tx
            .create_question(&NewQuestion {
                conversation_id: plan.conversation_id,
                topic_id,
                number: open.number,
                prompt: open.prompt.clone(),
                created_at: plan.now,
            })
            .await?;
        let record = NewMessage {
            conversation_id: plan.conversation_id,
            topic_id,
            question_id,
            author: MessageAuthor::Interviewer,
            content: open.prompt.clone(),
            sequence: 0,
            created_at: plan.now,
        };
        let ids = tx.create_messages(std::slice::from_ref(&record)).await?;

        let topic = conversation
            .topics
            .entry(open.topic_position)
            .or_insert_with(|| Topic::unopened(open.topic_position, open.topic_name.clone()));
        topic.id = Some(topic_id);
        topic.conversation_id = Some(plan.conversation_id);
        topic.questions.insert(
            open.number,
            Question {
                id: question_id,
                conversation_id: plan.conversation_id,
                topic_id,
                number: open.number,
                prompt: open.prompt.clone(),
                messages: ids
                    .into_iter()
                    .map(|id| materialize(id, record.clone()))
                    .collect(),
                created_at: plan.now,
            },
        );
    }

    conversation.apply_cursor(&plan.next, plan.now);
    Ok(conversation)
}
