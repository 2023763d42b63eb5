use serde::{Deserialize, Serialize};

/// Conversational origin of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
    Unknown,
}

impl Role {
    /// Parse a role string as it appears in wire payloads. Case-insensitive;
    /// unrecognized values map to `Unknown` rather than failing the payload.
    pub fn from_wire(raw: &str) -> Role {
        match raw.trim().to_ascii_lowercase().as_str() {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            "system" => Role::System,
            "tool" | "function" => Role::Tool,
            _ => Role::Unknown,
        }
    }

    /// Roles that the host UI never shows to the end user. Hidden roles do not
    /// count toward the visible turn budget and are dropped from kept ranges.
    pub fn is_hidden(self) -> bool {
        matches!(self, Role::System | Role::Tool)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
            Role::Unknown => "unknown",
        }
    }
}
