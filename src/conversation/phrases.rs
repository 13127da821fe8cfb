//! Fixed conversational lines and closing-phrase detection

/// Phrases that end a conversation when contained in an utterance
pub const CLOSING_PHRASES: &[&str] = &[
    "that's all",
    "that is all",
    "goodbye",
    "bye",
    "thanks",
    "thank you",
    "stop",
    "done",
    "nothing else",
    "end conversation",
    "see you",
];

/// Spoken when a conversation ends normally
pub const GOODBYE_LINE: &str = "Goodbye! I'll save what we talked about.";

/// Spoken when a conversation is cancelled
pub const CANCEL_LINE: &str = "Okay, cancelling. Talk to you later.";

/// Spoken in rotation when the dialogue backend fails
pub const FALLBACK_REPLIES: &[&str] = &[
    "I'm having trouble right now. Could you repeat that?",
    "Sorry, I didn't quite get that. Could you say it again?",
    "Something went wrong on my end. Let's try that once more.",
];

/// Whether an utterance asks to end the conversation
///
/// Case-insensitive substring containment, so "thanks, that's all for now"
/// closes while "can you remind me" does not.
#[must_use]
pub fn is_closing(utterance: &str) -> bool {
    let lower = utterance.to_lowercase();
    CLOSING_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

/// Fallback reply for the given attempt count
#[must_use]
pub fn fallback_reply(attempt: usize) -> &'static str {
    FALLBACK_REPLIES[attempt % FALLBACK_REPLIES.len()]
}
