//! Message-type registry boundary.
//!
//! The registry resolves a message type name plus body into the schema,
//! namespace and response-type metadata configured for that type. Resolution
//! itself is an external collaborator; the framework only consumes the
//! resolved [`MessageInfo`].

use crate::error::Result;
use std::collections::HashMap;

/// Resolved message-type metadata.
#[derive(Debug, Clone, Default)]
pub struct MessageInfo {
    pub message_type: String,
    pub message_namespace: String,
    pub message_schema_path: String,
    pub error_type: String,
    /// Empty for one-way message types.
    pub response_type: String,
    attributes: HashMap<String, String>,
}

impl MessageInfo {
    pub fn new(message_type: &str) -> Self {
        MessageInfo {
            message_type: message_type.to_string(),
            ..MessageInfo::default()
        }
    }

    /// Message attribute value, empty string when not declared.
    pub fn attribute(&self, name: &str) -> &str {
        self.attributes.get(name).map(String::as_str).unwrap_or("")
    }

    pub fn set_attribute(&mut self, name: &str, value: &str) {
        self.attributes.insert(name.to_string(), value.to_string());
    }
}

/// External message-type registry.
pub trait MessageInfoRegistry: Send + Sync {
    fn build_message_info(&self, message_type: &str, message_body: &str) -> Result<MessageInfo>;
}
