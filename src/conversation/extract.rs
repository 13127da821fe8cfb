//! Structured items extracted from a finished conversation

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::transcript::Transcript;

/// Longest title synthesized from an utterance, in characters
const MAX_TITLE_CHARS: usize = 80;

/// Task priority
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Low priority
    Low,
    /// Medium priority
    #[default]
    Medium,
    /// High priority
    High,
}

/// A to-do item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Short title
    pub title: String,
    /// Longer description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Priority
    #[serde(default)]
    pub priority: Priority,
    /// When it is due
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
}

/// A calendar event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Title
    pub title: String,
    /// Start time
    pub start_time: DateTime<Utc>,
    /// End time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Attendee names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attendees: Vec<String>,
}

/// A timed reminder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    /// What to remind about
    pub message: String,
    /// When to fire
    pub time: DateTime<Utc>,
}

/// Everything extracted from one conversation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedData {
    /// Tasks
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// Calendar events
    #[serde(default)]
    pub events: Vec<Event>,
    /// Reminders
    #[serde(default)]
    pub reminders: Vec<Reminder>,
}

impl ExtractedData {
    /// Total number of items
    #[must_use]
    pub fn total(&self) -> usize {
        self.tasks.len() + self.events.len() + self.reminders.len()
    }

    /// Whether nothing was extracted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Local extractor used when the extraction backend fails
pub trait FallbackExtractor: Send + Sync {
    /// Extract items from `transcript`, using `now` for placeholder times
    fn extract(&self, transcript: &Transcript, now: DateTime<Utc>) -> ExtractedData;
}

/// Keyword heuristic over user turns
///
/// - "schedule" or "meeting" → an event tomorrow
/// - "remind" → a reminder in one hour
/// - "task", "todo", "to-do" or "need to" → a medium priority task
///
/// One utterance can produce one item of each kind.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordExtractor;

const EVENT_KEYWORDS: &[&str] = &["schedule", "meeting"];
const REMINDER_KEYWORDS: &[&str] = &["remind"];
const TASK_KEYWORDS: &[&str] = &["task", "todo", "to-do", "need to"];

impl FallbackExtractor for KeywordExtractor {
    fn extract(&self, transcript: &Transcript, now: DateTime<Utc>) -> ExtractedData {
        let mut data = ExtractedData::default();

        for turn in transcript.user_turns() {
            let lower = turn.content.to_lowercase();
            let mentions = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));

            if mentions(EVENT_KEYWORDS) {
                data.events.push(Event {
                    title: title_from(&turn.content),
                    start_time: now + Duration::days(1),
                    end_time: None,
                    attendees: Vec::new(),
                });
            }

            if mentions(REMINDER_KEYWORDS) {
                data.reminders.push(Reminder {
                    message: turn.content.trim().to_string(),
                    time: now + Duration::hours(1),
                });
            }

            if mentions(TASK_KEYWORDS) {
                data.tasks.push(Task {
                    title: title_from(&turn.content),
                    description: None,
                    priority: Priority::Medium,
                    due_date: None,
                });
            }
        }

        data
    }
}

/// Turn an utterance into a short capitalized title
fn title_from(utterance: &str) -> String {
    let trimmed = utterance
        .trim()
        .trim_end_matches(|c: char| c.is_ascii_punctuation());
    let mut chars = trimmed.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };

    first
        .to_uppercase()
        .chain(chars)
        .take(MAX_TITLE_CHARS)
        .collect()
}

/// Where the extracted items came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionSource {
    /// The AI extraction backend
    Backend,
    /// The local keyword fallback
    Fallback,
}

/// Counts reported to the user after a conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    /// Number of tasks extracted
    pub tasks: usize,
    /// Number of events extracted
    pub events: usize,
    /// Number of reminders extracted
    pub reminders: usize,
    /// Which extractor produced them
    pub source: ExtractionSource,
    /// Number of items or records the persistence backend rejected
    pub persistence_failures: usize,
}

impl ConversationSummary {
    /// Summarize extracted data
    #[must_use]
    pub fn new(data: &ExtractedData, source: ExtractionSource) -> Self {
        Self {
            tasks: data.tasks.len(),
            events: data.events.len(),
            reminders: data.reminders.len(),
            source,
            persistence_failures: 0,
        }
    }

    /// Short human readable description of the counts
    #[must_use]
    pub fn describe(&self) -> String {
        let parts: Vec<String> = [
            (self.tasks, "task", "tasks"),
            (self.events, "event", "events"),
            (self.reminders, "reminder", "reminders"),
        ]
        .into_iter()
        .filter(|(count, _, _)| *count > 0)
        .map(|(count, one, many)| format!("{count} {}", if count == 1 { one } else { many }))
        .collect();

        match parts.as_slice() {
            [] => "Nothing to save from this conversation.".to_string(),
            [only] => format!("Saved {only}."),
            [first, second] => format!("Saved {first} and {second}."),
            [rest @ .., last] => format!("Saved {} and {last}.", rest.join(", ")),
        }
    }
}

impl std::fmt::Display for ConversationSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.describe())
    }
}
