use crate::core::codec::{self, InputMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One chunk of traffic exchanged with the device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TerminalMessage {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub direction: MessageDirection,
    /// Raw text of the payload; never glyph-decorated
    pub content: String,
    pub encoding: String,
    /// Exact bytes that crossed the wire
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    /// Set when the send or receive failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Which way a message travelled
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MessageDirection {
    Sent,
    Received,
}

impl std::fmt::Display for MessageDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageDirection::Sent => write!(f, "SENT"),
            MessageDirection::Received => write!(f, "RECV"),
        }
    }
}

impl TerminalMessage {
    fn new(direction: MessageDirection, data: Vec<u8>, mode: InputMode) -> Self {
        let content = match mode {
            InputMode::Text => String::from_utf8_lossy(&data).into_owned(),
            InputMode::Hex => codec::to_hex_string(&data),
        };

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            direction,
            content,
            encoding: mode.encoding_label().to_string(),
            data,
            error: None,
        }
    }

    /// Outgoing payload; `mode` is how the user entered it
    pub fn sent(data: Vec<u8>, mode: InputMode) -> Self {
        Self::new(MessageDirection::Sent, data, mode)
    }

    /// Incoming chunk, stored as lossy UTF-8 text
    pub fn received(data: Vec<u8>) -> Self {
        Self::new(MessageDirection::Received, data, InputMode::Text)
    }

    /// Outgoing payload that could not be written
    pub fn send_failed(data: Vec<u8>, mode: InputMode, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::sent(data, mode)
        }
    }

    /// Read side failure; carries no payload
    pub fn receive_failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::received(Vec::new())
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Content with control characters made visible
    pub fn display_text(&self) -> String {
        codec::decode(self.content.as_bytes())
    }
}

/// Criteria for selecting messages from the log
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageQuery {
    pub direction: Option<MessageDirection>,
    pub text: Option<String>,
    pub case_sensitive: bool,
    /// Keep only the newest N matches
    pub limit: Option<usize>,
}

impl MessageQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Substring search, case-insensitive unless `case_sensitive` is set
    pub fn search(text: &str, case_sensitive: bool) -> Self {
        Self {
            text: Some(text.to_string()),
            case_sensitive,
            ..Self::default()
        }
    }

    pub fn with_direction(mut self, direction: MessageDirection) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether the per-message criteria accept `message`. `limit` is applied
    /// by the caller over the whole result.
    pub fn matches(&self, message: &TerminalMessage) -> bool {
        if let Some(direction) = self.direction {
            if message.direction != direction {
                return false;
            }
        }

        match self.text.as_deref() {
            None | Some("") => true,
            Some(needle) if self.case_sensitive => message.content.contains(needle),
            Some(needle) => message
                .content
                .to_lowercase()
                .contains(&needle.to_lowercase()),
        }
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
