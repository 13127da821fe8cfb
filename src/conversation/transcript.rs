//! Conversation transcript

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who spoke a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person talking to the assistant
    User,
    /// The assistant
    Assistant,
}

impl Role {
    /// Label used when rendering a transcript
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

/// One utterance in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Speaker
    pub role: Role,
    /// What was said
    pub content: String,
    /// When the turn was appended
    pub timestamp: DateTime<Utc>,
}

/// Ordered, append-only list of turns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<ConversationTurn>,
}

impl Transcript {
    /// Create an empty transcript
    #[must_use]
    pub const fn new() -> Self {
        Self { turns: Vec::new() }
    }

    /// Append a turn stamped with the current time
    pub fn push(&mut self, role: Role, content: impl Into<String>) -> &ConversationTurn {
        self.push_at(role, content, Utc::now())
    }

    /// Append a turn with an explicit timestamp
    pub fn push_at(
        &mut self,
        role: Role,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> &ConversationTurn {
        self.turns.push(ConversationTurn {
            role,
            content: content.into(),
            timestamp,
        });
        &self.turns[self.turns.len() - 1]
    }

    /// All turns in order
    #[must_use]
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Turns spoken by the user
    pub fn user_turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter().filter(|t| t.role == Role::User)
    }

    /// Number of turns
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether no turn has been appended
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Render as "Role: content" lines for the extraction backend
    #[must_use]
    pub fn render(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("{}: {}", t.role.label(), t.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
