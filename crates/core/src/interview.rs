//! Interview lookup and the orchestrator-scoped summary cache.

use crate::error::RepositoryError;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The parts of an interview the transcript prompt is parameterized with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interview {
    pub id: Uuid,
    /// Title of the role being interviewed for (e.g., "Backend Engineer").
    pub job_title: String,
    pub job_description_summary: String,
}

/// Resolves an interview by id. Implemented by the persistence layer.
#[async_trait]
pub trait InterviewLookup: Send + Sync {
    async fn get_interview(&self, id: Uuid) -> Result<Option<Interview>, RepositoryError>;
}

/// Key-value cache of interview prompt inputs, keyed by interview id.
///
/// Owned by whoever builds the orchestrator; entries live until the caller
/// (or the orchestrator, when an interview finishes) deletes them.
#[derive(Debug, Default)]
pub struct SummaryCache {
    entries: DashMap<Uuid, Interview>,
}

impl SummaryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &Uuid) -> Option<Interview> {
        self.entries.get(id).map(|entry| entry.value().clone())
    }

    pub fn set(&self, interview: Interview) {
        self.entries.insert(interview.id, interview);
    }

    pub fn delete(&self, id: &Uuid) -> Option<Interview> {
        self.entries.remove(id).map(|(_, interview)| interview)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interview() -> Interview {
        Interview {
            id: Uuid::new_v4(),
            job_title: "Backend Engineer".to_string(),
            job_description_summary: "Rust services on Postgres".to_string(),
        }
    }

    #[test]
    fn test_set_get_delete() {
        let cache = SummaryCache::new();
        let entry = interview();
        assert!(cache.get(&entry.id).is_none());

        cache.set(entry.clone());
        assert_eq!(cache.get(&entry.id), Some(entry.clone()));
        assert_eq!(cache.len(), 1);

        assert_eq!(cache.delete(&entry.id), Some(entry.clone()));
        assert!(cache.get(&entry.id).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_set_replaces_existing_entry() {
        let cache = SummaryCache::new();
        let mut entry = interview();
        cache.set(entry.clone());
        entry.job_description_summary = "Updated".to_string();
        cache.set(entry.clone());

        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.get(&entry.id).unwrap().job_description_summary,
            "Updated"
        );
    }
}
