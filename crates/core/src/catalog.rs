//! Topic Catalog
//!
//! The fixed, ordered curriculum every interview walks through. The catalog
//! is immutable once built; each new conversation receives its own deep copy
//! of the topic list through [`TopicCatalog::clone_for_conversation`].

use crate::error::InterviewError;
use crate::models::{Conversation, Topic};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, LazyLock};

/// The standard curriculum, in interview order.
pub const STANDARD_TOPICS: [&str; 6] = [
    "Introduction",
    "Coding",
    "System Design",
    "Databases & Data Management",
    "Behavioral",
    "General Backend Knowledge",
];

static STANDARD: LazyLock<Arc<TopicCatalog>> = LazyLock::new(|| {
    Arc::new(TopicCatalog {
        topics: STANDARD_TOPICS
            .iter()
            .zip(1u32..)
            .map(|(name, position)| CatalogTopic {
                position,
                name: (*name).to_string(),
            })
            .collect(),
    })
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogTopic {
    /// 1-based position in the curriculum.
    pub position: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicCatalog {
    topics: Vec<CatalogTopic>,
}

impl TopicCatalog {
    /// The shared, process-wide standard curriculum.
    pub fn standard() -> Arc<TopicCatalog> {
        Arc::clone(&STANDARD)
    }

    /// Builds a custom curriculum. Names must be non-empty and unique.
    pub fn new<I, S>(names: I) -> Result<Self, InterviewError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut topics = Vec::new();
        for (name, position) in names.into_iter().zip(1u32..) {
            let name = name.into();
            if name.trim().is_empty() {
                return Err(InterviewError::Validation(format!(
                    "catalog topic {position} has an empty name"
                )));
            }
            if !seen.insert(name.clone()) {
                return Err(InterviewError::Validation(format!(
                    "catalog topic '{name}' appears more than once"
                )));
            }
            topics.push(CatalogTopic { position, name });
        }
        if topics.is_empty() {
            return Err(InterviewError::Validation(
                "catalog must contain at least one topic".to_string(),
            ));
        }
        Ok(Self { topics })
    }

    pub fn list_topics(&self) -> &[CatalogTopic] {
        &self.topics
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn get(&self, position: u32) -> Option<&CatalogTopic> {
        position
            .checked_sub(1)
            .and_then(|index| self.topics.get(index as usize))
    }

    pub fn first(&self) -> &CatalogTopic {
        &self.topics[0]
    }

    pub fn last(&self) -> &CatalogTopic {
        &self.topics[self.topics.len() - 1]
    }

    pub fn is_last_topic_name(&self, name: &str) -> bool {
        self.last().name == name
    }

    /// Position following `position`, or `None` once the curriculum is exhausted.
    pub fn next_position(&self, position: u32) -> Option<u32> {
        let next = position + 1;
        self.get(next).map(|t| t.position)
    }

    /// Names of every topic strictly before `position`, in catalog order.
    pub fn names_before(&self, position: u32) -> Vec<&str> {
        self.topics
            .iter()
            .take_while(|t| t.position < position)
            .map(|t| t.name.as_str())
            .collect()
    }

    /// A fresh mapping of position to empty topic for a new conversation.
    pub fn clone_for_conversation(&self) -> BTreeMap<u32, Topic> {
        self.topics
            .iter()
            .map(|t| (t.position, Topic::unopened(t.position, t.name.clone())))
            .collect()
    }

    /// Fills in catalog positions a stored conversation has not opened yet.
    /// Topics the store returned are kept as they are.
    pub fn complete_conversation(&self, conversation: &mut Conversation) {
        for (position, topic) in self.clone_for_conversation() {
            conversation.topics.entry(position).or_insert(topic);
        }
    }
}
