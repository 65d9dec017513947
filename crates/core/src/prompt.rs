//! System prompt template for the interviewer.
//!
//! Templates are plain markdown with `{placeholder}` markers, loaded by file
//! stem from the prompts directory the same way every other prompt is.

use anyhow::{Context, Result};
use std::collections::HashMap;

/// Key of the interviewer template in the loaded prompt map.
pub const INTERVIEWER_SYSTEM_PROMPT: &str = "interviewer_system";

pub const DEFAULT_INTERVIEWER_TEMPLATE: &str = "\
You are a senior engineer running a structured mock interview for the role of {job_title}.

Job description summary:
{job_description}

Topics already covered: {completed_topics}
Current topic: {current_topic}
Current question: {question_number} of 2

Ask one question at a time. After each answer give short, concrete feedback, then ask the next question.
Respond only with JSON containing topic_name, subtopic_name, question_text and feedback_text.";

/// Values substituted into the template for one turn.
#[derive(Debug, Clone)]
pub struct PromptContext<'a> {
    pub completed_topics: &'a [&'a str],
    pub current_topic: &'a str,
    pub question_number: u32,
    pub job_title: &'a str,
    pub job_description: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVIEWER_TEMPLATE)
    }
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Picks the interviewer template out of a map of loaded prompts.
    pub fn from_prompts(prompts: &HashMap<String, String>) -> Result<Self> {
        let template = prompts
            .get(INTERVIEWER_SYSTEM_PROMPT)
            .with_context(|| format!("Missing prompt template: '{INTERVIEWER_SYSTEM_PROMPT}'"))?;
        Ok(Self::new(template.clone()))
    }

    pub fn render(&self, ctx: &PromptContext<'_>) -> String {
        let completed = if ctx.completed_topics.is_empty() {
            "none yet".to_string()
        } else {
            ctx.completed_topics.join(", ")
        };
        self.template
            .replace("{completed_topics}", &completed)
            .replace("{current_topic}", ctx.current_topic)
            .replace("{question_number}", &ctx.question_number.to_string())
            .replace("{job_title}", ctx.job_title)
            .replace("{job_description}", ctx.job_description)
    }
}
