use std::fmt;

use crate::error::ChatError;

/// Size of every chat frame on the wire, in bytes.
pub const MAX_MSG_SIZE: usize = 140;

/// Size of the identity block exchanged during the handshake, in bytes.
pub const MAX_UNAME_SIZE: usize = 20;

/// Reserved line that ends the session instead of being displayed.
pub const QUIT_COMMAND: &str = "~quit\n";

/// One fixed-size frame as it travels over the endpoint.
pub type Frame = [u8; MAX_MSG_SIZE];

/// A single chat line, newline included, that fits in one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    text: String,
}

impl Message {
    /// Builds a message from a line of user input.
    ///
    /// The line keeps its terminator. Lines longer than `MAX_MSG_SIZE - 1`
    /// bytes are cut on a character boundary and re-terminated so the frame
    /// always keeps one trailing NUL.
    pub fn from_line(line: &str) -> Self {
        if line.len() < MAX_MSG_SIZE {
            return Self {
                text: line.to_string(),
            };
        }

        let had_newline = line.ends_with('\n');
        let budget = if had_newline {
            MAX_MSG_SIZE - 2
        } else {
            MAX_MSG_SIZE - 1
        };
        let mut text = truncate_on_char_boundary(line, budget).to_string();
        if had_newline {
            text.push('\n');
        }
        Self { text }
    }

    pub fn quit() -> Self {
        Self {
            text: QUIT_COMMAND.to_string(),
        }
    }

    pub fn is_quit(&self) -> bool {
        self.text == QUIT_COMMAND
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Encodes the message as a zero-padded frame.
    pub fn to_frame(&self) -> Frame {
        let mut frame = [0u8; MAX_MSG_SIZE];
        let bytes = self.text.as_bytes();
        frame[..bytes.len()].copy_from_slice(bytes);
        frame
    }

    /// Decodes a frame, stopping at the first NUL byte.
    pub fn from_frame(frame: &[u8]) -> Self {
        let content = until_nul(frame);
        Self {
            text: String::from_utf8_lossy(content).into_owned(),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Display name exchanged once during the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity(String);

impl Identity {
    /// Validates a local display name.
    ///
    /// Trailing line terminators are stripped and names longer than
    /// `MAX_UNAME_SIZE - 1` bytes are truncated. Empty names are rejected.
    pub fn new(name: &str) -> Result<Self, ChatError> {
        let trimmed = name.trim_end_matches(['\r', '\n']);
        let truncated = truncate_on_char_boundary(trimmed, MAX_UNAME_SIZE - 1);
        if truncated.trim().is_empty() {
            return Err(ChatError::InvalidIdentity(
                "username cannot be empty".to_string(),
            ));
        }
        Ok(Self(truncated.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_block(&self) -> [u8; MAX_UNAME_SIZE] {
        let mut block = [0u8; MAX_UNAME_SIZE];
        let bytes = self.0.as_bytes();
        block[..bytes.len()].copy_from_slice(bytes);
        block
    }

    /// Decodes an identity block; `None` if it carries no name.
    pub fn from_block(block: &[u8]) -> Option<Self> {
        let content = until_nul(block);
        let name = String::from_utf8_lossy(content);
        let name = truncate_on_char_boundary(&name, MAX_UNAME_SIZE - 1);
        if name.is_empty() {
            None
        } else {
            Some(Self(name.to_string()))
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn until_nul(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    &bytes[..end]
}

fn truncate_on_char_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
