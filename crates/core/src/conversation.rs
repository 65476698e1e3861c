//! Conversation-related types.

use std::fmt::{self, Debug};

use coach_relay_model::ModelMessage;
use serde::{Deserialize, Deserializer};

/// An incoming chat request.
///
/// Two payload shapes are accepted: a single `message`, or a
/// `developer_message` plus `user_message` pair. A non-empty `message`
/// always wins.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChatRequest {
    /// The user text of the single-message shape.
    pub message: Option<String>,
    /// Instructions overriding the default ones.
    #[serde(alias = "developerMessage")]
    pub developer_message: Option<String>,
    /// The user text of the developer/user shape.
    #[serde(alias = "userMessage")]
    pub user_message: Option<String>,
    /// The model to use instead of the configured default.
    pub model: Option<String>,
    /// A provider API key taking precedence over the configured one.
    #[serde(alias = "apiKey")]
    pub api_key: Option<String>,
    /// Whether the reply should be streamed as plain text.
    #[serde(default, deserialize_with = "null_as_default")]
    pub stream: bool,
}

impl Debug for ChatRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatRequest")
            .field("message", &self.message)
            .field("developer_message", &self.developer_message)
            .field("user_message", &self.user_message)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("stream", &self.stream)
            .finish()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// An ordered message sequence for one request.
///
/// The order is the conversation order, and is replayed verbatim to the
/// provider on every completion of the request.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<ModelMessage>,
}

impl Conversation {
    /// Builds the opening messages of a request.
    ///
    /// `instructions` is used for the system message of the
    /// single-message shape, and for the developer message when the
    /// request doesn't bring its own.
    pub fn from_request(req: &ChatRequest, instructions: &str) -> Self {
        let messages = match req.message.as_deref() {
            Some(message) if !message.is_empty() => vec![
                ModelMessage::System(instructions.to_owned()),
                ModelMessage::User(message.to_owned()),
            ],
            _ => {
                let developer = req
                    .developer_message
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .unwrap_or(instructions);
                vec![
                    ModelMessage::Developer(developer.to_owned()),
                    ModelMessage::User(
                        req.user_message.clone().unwrap_or_default(),
                    ),
                ]
            }
        };
        Self { messages }
    }

    /// Appends a message.
    #[inline]
    pub fn push(&mut self, msg: ModelMessage) {
        self.messages.push(msg);
    }

    /// Returns the messages in conversation order.
    #[inline]
    pub fn messages(&self) -> &[ModelMessage] {
        &self.messages
    }
}
