use std::fmt;

pub const PERSONA_PREAMBLE: &str = "You are a thoughtful writing assistant built into a markdown note editor. \
Help the user with the note they are working on. Answer concisely and format replies as markdown.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptError {
    EmptyMessage,
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::EmptyMessage => write!(f, "Message is empty"),
        }
    }
}

impl std::error::Error for PromptError {}

/// Build the single prompt sent to the generate endpoint.
///
/// Sections always appear in the same order (preamble, note, conversation,
/// message) even when the note or conversation is empty. Text is inserted
/// as-is; the request body is JSON-encoded downstream.
pub fn compose_prompt(
    document_context: &str,
    history: &str,
    user_message: &str,
) -> Result<String, PromptError> {
    if user_message.trim().is_empty() {
        return Err(PromptError::EmptyMessage);
    }

    Ok(format!(
        "{PERSONA_PREAMBLE}\n\n\
         Current note:\n---\n{document_context}\n---\n\n\
         Conversation so far:\n{history}\n\n\
         User: {user_message}\n\
         Assistant:"
    ))
}

/// Append one completed exchange to a running conversation transcript in the
/// shape [`compose_prompt`] expects for `history`.
pub fn append_exchange(history: &mut String, user_message: &str, reply: &str) {
    if !history.is_empty() {
        history.push('\n');
    }
    history.push_str("User: ");
    history.push_str(user_message);
    history.push_str("\nAssistant: ");
    history.push_str(reply);
}
