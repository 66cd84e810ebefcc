//! Consumer side of a chat turn: accumulate token text and keep a rendered
//! view of it current.

use tracing::trace;

use crate::core::chat_stream::{StreamEvent, TurnId};
use crate::core::relay::Subscription;
use crate::ui::markdown::render;

pub const NO_RESPONSE_TEXT: &str = "No response received.";

/// Token text received so far for one turn.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    text: String,
    token_count: usize,
}

impl ConversationTurn {
    pub fn push(&mut self, text: &str) {
        self.text.push_str(text);
        self.token_count += 1;
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn token_count(&self) -> usize {
        self.token_count
    }
}

/// What a surface should currently show for its turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presentation {
    /// No turn has been assigned to this view.
    Idle,
    /// A turn was dispatched and nothing has arrived yet.
    Waiting,
    Streaming { markup: String },
    Complete { markup: String },
    Failed { message: String },
    /// The stream ended cleanly without a single token.
    NoResponse,
}

impl Presentation {
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            Presentation::Complete { .. } | Presentation::Failed { .. } | Presentation::NoResponse
        )
    }
}

/// One display surface following one turn at a time.
///
/// Events are accepted only when their turn id matches the turn being
/// watched, so several views can share a relay without picking up each
/// other's replies.
#[derive(Debug)]
pub struct TurnView {
    watching: Option<TurnId>,
    turn: Option<ConversationTurn>,
    presentation: Presentation,
}

impl Default for TurnView {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnView {
    pub fn new() -> Self {
        Self {
            watching: None,
            turn: None,
            presentation: Presentation::Idle,
        }
    }

    /// Start following `turn_id`, discarding whatever the previous turn left.
    pub fn watch(&mut self, turn_id: TurnId) {
        self.watching = Some(turn_id);
        self.turn = None;
        self.presentation = Presentation::Waiting;
    }

    pub fn presentation(&self) -> &Presentation {
        &self.presentation
    }

    pub fn is_finished(&self) -> bool {
        self.presentation.is_final()
    }

    /// Raw text accumulated for the current turn, if any token arrived.
    pub fn accumulated_text(&self) -> Option<&str> {
        self.turn.as_ref().map(ConversationTurn::text)
    }

    /// Apply one relayed event. Returns `true` when it changed the view.
    pub fn apply(&mut self, event: &StreamEvent, turn_id: TurnId) -> bool {
        if self.watching != Some(turn_id) {
            trace!(turn_id, watching = ?self.watching, "ignoring event for another turn");
            return false;
        }
        if self.is_finished() {
            return false;
        }

        match event {
            StreamEvent::Token { text, .. } => {
                let turn = self.turn.get_or_insert_with(ConversationTurn::default);
                turn.push(text);
                self.presentation = Presentation::Streaming {
                    markup: render(turn.text()),
                };
            }
            StreamEvent::Error { message } => {
                self.turn = None;
                self.presentation = Presentation::Failed {
                    message: message.clone(),
                };
            }
            StreamEvent::End => {
                self.presentation = match &self.turn {
                    Some(turn) if turn.token_count() > 0 => Presentation::Complete {
                        markup: render(turn.text()),
                    },
                    _ => Presentation::NoResponse,
                };
            }
        }
        true
    }
}

/// Feed `view` from `subscription` until its turn reaches a final state,
/// calling `on_update` after every accepted event.
///
/// Returns early with the view unfinished if the relay goes away.
pub async fn follow_turn<F>(subscription: &mut Subscription, view: &mut TurnView, mut on_update: F)
where
    F: FnMut(&TurnView, &StreamEvent),
{
    while !view.is_finished() {
        let Some((event, turn_id)) = subscription.recv().await else {
            break;
        };
        if view.apply(&event, turn_id) {
            on_update(view, &event);
        }
    }
}
