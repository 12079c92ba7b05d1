//! Topic Commands
//!
//! Clients drive their subscriptions with plain text frames of the form
//! `"<ACTION> <TOPIC>"`, for example `SUBSCRIBE depth`.

use std::fmt;

/// What a command asks the server to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Subscribe,
    Unsubscribe,
    Invalid,
}

impl Action {
    /// Wire token for this action
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Subscribe => "SUBSCRIBE",
            Action::Unsubscribe => "UNSUBSCRIBE",
            Action::Invalid => "INVALID",
        }
    }

    /// Map a wire token to an action. Matching is case-sensitive.
    pub fn from_token(token: &str) -> Action {
        match token {
            "SUBSCRIBE" => Action::Subscribe,
            "UNSUBSCRIBE" => Action::Unsubscribe,
            _ => Action::Invalid,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed client command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    action: Action,
    topic: String,
}

impl Command {
    pub fn new(action: Action, topic: impl Into<String>) -> Self {
        Self {
            action,
            topic: topic.into(),
        }
    }

    fn invalid() -> Self {
        Self::new(Action::Invalid, String::new())
    }

    /// Parse a text payload.
    ///
    /// The payload is split on single spaces with empty tokens dropped. Exactly
    /// two tokens are required; anything else is [`Action::Invalid`]. The topic
    /// is taken verbatim and not checked against the server's topics.
    pub fn parse(payload: &str) -> Command {
        let tokens: Vec<&str> = payload.split(' ').filter(|t| !t.is_empty()).collect();

        match tokens.as_slice() {
            [action, topic] => match Action::from_token(action) {
                Action::Invalid => Self::invalid(),
                action => Self::new(action, *topic),
            },
            _ => Self::invalid(),
        }
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.action, self.topic)
    }
}
