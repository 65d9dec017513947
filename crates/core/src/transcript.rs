//! Transcript Builder
//!
//! Rebuilds the ordered role/content history handed to the turn generator
//! from a conversation's topic -> question -> message tree. The output is a
//! pure function of the stored data: storage order never leaks into it.

use crate::catalog::TopicCatalog;
use crate::error::{InterviewError, Result};
use crate::interview::Interview;
use crate::models::{ChatTurn, Conversation};
use crate::prompt::{PromptContext, PromptTemplate};

/// Renders the interviewer system prompt for a given position in the curriculum.
pub fn system_prompt(
    catalog: &TopicCatalog,
    prompt: &PromptTemplate,
    interview: &Interview,
    topic_position: u32,
    question_number: u32,
) -> String {
    let completed = catalog.names_before(topic_position);
    let current = catalog
        .get(topic_position)
        .map(|t| t.name.as_str())
        .unwrap_or_default();
    prompt.render(&PromptContext {
        completed_topics: &completed,
        current_topic: current,
        question_number,
        job_title: &interview.job_title,
        job_description: &interview.job_description_summary,
    })
}

/// Builds the generator history for the conversation's current topic.
///
/// The leading system entry is always rendered fresh; stored system messages
/// are never replayed.
pub fn build_history(
    conversation: &Conversation,
    catalog: &TopicCatalog,
    prompt: &PromptTemplate,
    interview: &Interview,
) -> Result<Vec<ChatTurn>> {
    let incomplete = || InterviewError::IncompleteState {
        conversation_id: conversation.id,
        topic: conversation.current_topic,
    };
    let topic = conversation.current_topic().ok_or_else(incomplete)?;
    if topic.questions.is_empty() {
        return Err(incomplete());
    }

    let mut history = vec![ChatTurn::system(system_prompt(
        catalog,
        prompt,
        interview,
        conversation.current_topic,
        conversation.current_question_number,
    ))];

    // On the opening question the first stored message is skipped outright,
    // whatever its author. Today that message is always the system bootstrap.
    let skip_opening =
        conversation.current_topic == 1 && conversation.current_question_number == 1;

    for question in topic.questions.values() {
        let mut messages = question.ordered_messages().into_iter();
        if skip_opening && question.number == 1 {
            messages.next();
        }
        history.extend(messages.filter_map(|message| {
            message
                .author
                .chat_role()
                .map(|role| ChatTurn {
                    role,
                    content: message.content.clone(),
                })
        }));
    }

    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ChatRole, ConversationStatus, Message, MessageAuthor, Question, Topic,
    };
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn interview() -> Interview {
        Interview {
            id: Uuid::new_v4(),
            job_title: "Backend Engineer".to_string(),
            job_description_summary: "Builds payment APIs in Rust".to_string(),
        }
    }

    fn question(number: u32, entries: &[(MessageAuthor, &str)]) -> Question {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let id = Uuid::new_v4();
        Question {
            id,
            conversation_id: Uuid::nil(),
            topic_id: Uuid::nil(),
            number,
            prompt: format!("question {number}"),
            messages: entries
                .iter()
                .zip(0i32..)
                .map(|((author, content), sequence)| Message {
                    id: Uuid::new_v4(),
                    conversation_id: Uuid::nil(),
                    topic_id: Uuid::nil(),
                    question_id: id,
                    author: *author,
                    content: content.to_string(),
                    sequence,
                    created_at: base + Duration::seconds(i64::from(sequence)),
                })
                .collect(),
            created_at: base,
        }
    }

    fn conversation(topic: u32, question_number: u32, questions: Vec<Question>) -> Conversation {
        let catalog = TopicCatalog::standard();
        let mut topics = catalog.clone_for_conversation();
        let current = topics.get_mut(&topic).unwrap();
        current.id = Some(Uuid::new_v4());
        current.questions = questions.into_iter().map(|q| (q.number, q)).collect();
        Conversation {
            id: Uuid::new_v4(),
            interview_id: Uuid::new_v4(),
            current_topic: topic,
            current_subtopic: "Background".to_string(),
            current_question_number: question_number,
            status: ConversationStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            topics,
        }
    }

    fn roles_and_contents(history: &[ChatTurn]) -> Vec<(ChatRole, &str)> {
        history
            .iter()
            .map(|t| (t.role, t.content.as_str()))
            .collect()
    }

    #[test]
    fn test_opening_question_excludes_bootstrap_exactly_once() {
        let conv = conversation(
            1,
            1,
            vec![question(
                1,
                &[
                    (MessageAuthor::System, "bootstrap prompt"),
                    (MessageAuthor::Interviewer, "Tell me about yourself."),
                    (MessageAuthor::User, "I have 5 years experience"),
                ],
            )],
        );

        let history =
            build_history(&conv, &TopicCatalog::standard(), &PromptTemplate::default(), &interview())
                .unwrap();

        assert_eq!(history.len(), 3);
        assert_eq!(history[0].role, ChatRole::System);
        assert_ne!(history[0].content, "bootstrap prompt");
        assert_eq!(
            roles_and_contents(&history[1..]),
            vec![
                (ChatRole::Assistant, "Tell me about yourself."),
                (ChatRole::User, "I have 5 years experience"),
            ]
        );
    }

    #[test]
    fn test_opening_skip_drops_non_system_first_message() {
        // The opening skip applies regardless of author.
        let conv = conversation(
            1,
            1,
            vec![question(
                1,
                &[
                    (MessageAuthor::Interviewer, "Tell me about yourself."),
                    (MessageAuthor::User, "Sure."),
                ],
            )],
        );

        let history =
            build_history(&conv, &TopicCatalog::standard(), &PromptTemplate::default(), &interview())
                .unwrap();

        assert_eq!(
            roles_and_contents(&history[1..]),
            vec![(ChatRole::User, "Sure.")]
        );
    }

    #[test]
    fn test_second_question_of_first_topic_keeps_everything_but_system() {
        let conv = conversation(
            1,
            2,
            vec![
                question(
                    1,
                    &[
                        (MessageAuthor::System, "bootstrap"),
                        (MessageAuthor::Interviewer, "Q1"),
                        (MessageAuthor::User, "A1"),
                        (MessageAuthor::Interviewer, "F1"),
                    ],
                ),
                question(2, &[(MessageAuthor::Interviewer, "Q2")]),
            ],
        );

        let history =
            build_history(&conv, &TopicCatalog::standard(), &PromptTemplate::default(), &interview())
                .unwrap();

        assert_eq!(
            roles_and_contents(&history[1..]),
            vec![
                (ChatRole::Assistant, "Q1"),
                (ChatRole::User, "A1"),
                (ChatRole::Assistant, "F1"),
                (ChatRole::Assistant, "Q2"),
            ]
        );
    }

    #[test]
    fn test_system_entry_lists_prior_topics_and_position() {
        let conv = conversation(3, 2, vec![question(1, &[]), question(2, &[])]);
        let template = PromptTemplate::new(
            "{completed_topics}|{current_topic}|{question_number}|{job_description}",
        );

        let history =
            build_history(&conv, &TopicCatalog::standard(), &template, &interview()).unwrap();

        assert_eq!(history.len(), 1);
        assert_eq!(
            history[0].content,
            "Introduction, Coding|System Design|2|Builds payment APIs in Rust"
        );
    }

    #[test]
    fn test_only_current_topic_is_replayed() {
        let mut conv = conversation(2, 1, vec![question(1, &[(MessageAuthor::Interviewer, "Coding Q1")])]);
        let intro = conv.topics.get_mut(&1).unwrap();
        intro.id = Some(Uuid::new_v4());
        intro
            .questions
            .insert(1, question(1, &[(MessageAuthor::Interviewer, "Intro Q1")]));

        let history =
            build_history(&conv, &TopicCatalog::standard(), &PromptTemplate::default(), &interview())
                .unwrap();

        assert_eq!(
            roles_and_contents(&history[1..]),
            vec![(ChatRole::Assistant, "Coding Q1")]
        );
    }

    #[test]
    fn test_topic_without_questions_is_incomplete() {
        let conv = conversation(2, 1, vec![]);
        let err =
            build_history(&conv, &TopicCatalog::standard(), &PromptTemplate::default(), &interview())
                .unwrap_err();
        assert!(matches!(
            err,
            InterviewError::IncompleteState { topic: 2, .. }
        ));
    }

    #[test]
    fn test_missing_current_topic_is_incomplete() {
        let mut conv = conversation(1, 1, vec![question(1, &[])]);
        conv.topics.clear();
        let err =
            build_history(&conv, &TopicCatalog::standard(), &PromptTemplate::default(), &interview())
                .unwrap_err();
        assert!(matches!(err, InterviewError::IncompleteState { .. }));
    }

    #[test]
    fn test_build_history_is_idempotent() {
        let conv = conversation(
            1,
            2,
            vec![
                question(
                    1,
                    &[
                        (MessageAuthor::System, "bootstrap"),
                        (MessageAuthor::Interviewer, "Q1"),
                        (MessageAuthor::User, "A1"),
                    ],
                ),
                question(2, &[(MessageAuthor::Interviewer, "Q2")]),
            ],
        );
        let catalog = TopicCatalog::standard();
        let prompt = PromptTemplate::default();
        let interview = interview();

        let first = build_history(&conv, &catalog, &prompt, &interview).unwrap();
        let second = build_history(&conv, &catalog, &prompt, &interview).unwrap();
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
    }

    fn shuffled_questions() -> impl Strategy<Value = (Vec<Message>, Vec<Message>, bool)> {
        let q1 = question(
            1,
            &[
                (MessageAuthor::Interviewer, "Q1"),
                (MessageAuthor::User, "A1"),
                (MessageAuthor::Interviewer, "F1"),
            ],
        );
        let q2 = question(
            2,
            &[
                (MessageAuthor::Interviewer, "Q2"),
                (MessageAuthor::User, "A2"),
                (MessageAuthor::Interviewer, "F2"),
            ],
        );
        (
            Just(q1.messages).prop_shuffle(),
            Just(q2.messages).prop_shuffle(),
            any::<bool>(),
        )
    }

    proptest! {
        #[test]
        fn prop_storage_order_does_not_change_history(
            (first_messages, second_messages, reverse_insert) in shuffled_questions()
        ) {
            let catalog = TopicCatalog::standard();
            let prompt = PromptTemplate::default();
            let interview = interview();

            let mut q1 = question(1, &[]);
            q1.messages = first_messages;
            let mut q2 = question(2, &[]);
            q2.messages = second_messages;
            let questions = if reverse_insert { vec![q2, q1] } else { vec![q1, q2] };

            let mut conv = conversation(4, 2, questions);
            // Topics inserted in reverse position order must not matter either.
            let reversed: BTreeMap<u32, Topic> = conv.topics.clone().into_iter().rev().collect();
            conv.topics = reversed;

            let history = build_history(&conv, &catalog, &prompt, &interview).unwrap();
            let contents: Vec<&str> = history[1..].iter().map(|t| t.content.as_str()).collect();
            prop_assert_eq!(contents, vec!["Q1", "A1", "F1", "Q2", "A2", "F2"]);
            let roles: Vec<ChatRole> = history[1..].iter().map(|t| t.role).collect();
            prop_assert_eq!(
                roles,
                vec![
                    ChatRole::Assistant,
                    ChatRole::User,
                    ChatRole::Assistant,
                    ChatRole::Assistant,
                    ChatRole::User,
                    ChatRole::Assistant,
                ]
            );
        }
    }
}
