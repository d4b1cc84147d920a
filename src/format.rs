//! Message formatting boundary.
//!
//! A message body is the raw wire form and may carry a SOAP envelope; the
//! message content is the payload without the envelope. The formatter that
//! converts between the two is an external collaborator.

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFormatType {
    Xml,
    Soap,
    None,
}

pub trait MessageFormatter: Send + Sync {
    /// Detect the wire format of a message body.
    fn format_type(&self, message_body: &str) -> MessageFormatType;

    /// Extract the payload from a message body, stripping any envelope.
    fn content_of(&self, message_body: &str) -> Result<String>;

    /// Splice new content into a message body, preserving its envelope, and
    /// return the updated body.
    fn replace_content(&self, message_body: &str, message_content: &str) -> Result<String>;
}
