//! State Evaluator
//!
//! Decides, after the interviewer has produced a turn, whether the
//! conversation stays on its question, opens the topic's second question,
//! moves to the next topic, or is finished.

use crate::catalog::TopicCatalog;
use crate::models::Conversation;
use crate::turn_generator::GeneratedTurn;
use serde::Serialize;

/// Questions asked per topic before the interview moves on.
pub const QUESTIONS_PER_TOPIC: usize = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub advance_question: bool,
    pub advance_topic: bool,
    pub finished: bool,
}

impl Transition {
    pub fn is_stay(&self) -> bool {
        !self.advance_question && !self.advance_topic && !self.finished
    }
}

/// Pure transition rule.
///
/// `questions_recorded` is the number of questions already stored under the
/// current topic, before anything this turn would open.
pub fn evaluate(
    questions_recorded: usize,
    turn: &GeneratedTurn,
    catalog: &TopicCatalog,
) -> Transition {
    let advance_topic = questions_recorded >= QUESTIONS_PER_TOPIC;
    let advance_question = questions_recorded == QUESTIONS_PER_TOPIC - 1;
    let finished = questions_recorded == QUESTIONS_PER_TOPIC
        && catalog.is_last_topic_name(&turn.topic_name);
    Transition {
        advance_question,
        advance_topic,
        finished,
    }
}

pub fn evaluate_conversation(
    conversation: &Conversation,
    turn: &GeneratedTurn,
    catalog: &TopicCatalog,
) -> Transition {
    evaluate(conversation.questions_in_current_topic(), turn, catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::STANDARD_TOPICS;
    use proptest::prelude::*;

    fn turn(topic: &str) -> GeneratedTurn {
        GeneratedTurn {
            topic_name: topic.to_string(),
            subtopic_name: "anything".to_string(),
            question_text: "next?".to_string(),
            feedback_text: "ok".to_string(),
        }
    }

    #[test]
    fn test_first_question_of_topic_stays() {
        let t = evaluate(0, &turn("Introduction"), &TopicCatalog::standard());
        assert_eq!(t, Transition::default());
        assert!(t.is_stay());
    }

    #[test]
    fn test_one_recorded_question_opens_the_second() {
        let t = evaluate(1, &turn("Introduction"), &TopicCatalog::standard());
        assert_eq!(
            t,
            Transition {
                advance_question: true,
                advance_topic: false,
                finished: false
            }
        );
    }

    #[test]
    fn test_two_recorded_questions_advance_topic() {
        let t = evaluate(2, &turn("Coding"), &TopicCatalog::standard());
        assert!(t.advance_topic);
        assert!(!t.advance_question);
        assert!(!t.finished);

        // Overfull topics still only ask to move on.
        let t = evaluate(3, &turn("General Backend Knowledge"), &TopicCatalog::standard());
        assert!(t.advance_topic);
        assert!(!t.finished);
    }

    #[test]
    fn test_last_topic_with_two_questions_finishes() {
        let t = evaluate(
            2,
            &turn("General Backend Knowledge"),
            &TopicCatalog::standard(),
        );
        assert!(t.finished);
        assert!(t.advance_topic);
    }

    #[test]
    fn test_last_topic_name_before_quota_does_not_finish() {
        let catalog = TopicCatalog::standard();
        assert!(!evaluate(1, &turn("General Backend Knowledge"), &catalog).finished);
        assert!(!evaluate(0, &turn("General Backend Knowledge"), &catalog).finished);
    }

    proptest! {
        #[test]
        fn prop_finished_iff_last_topic_and_quota_met(
            n in 0usize..6,
            topic_index in 0usize..STANDARD_TOPICS.len(),
        ) {
            let catalog = TopicCatalog::standard();
            let name = STANDARD_TOPICS[topic_index];
            let t = evaluate(n, &turn(name), &catalog);
            let expected = n == 2 && topic_index == STANDARD_TOPICS.len() - 1;
            prop_assert_eq!(t.finished, expected);
            prop_assert!(!(t.advance_question && t.advance_topic));
        }
    }
}
