//! Engine stdout decoding
//!
//! The staged listener helper prints its messages on the same stdout as the
//! engine's console output, so boundaries and text arrive in one ordered
//! stream. A message is the unit separator byte, a JSON object and a
//! newline:
//!
//! ```text
//! \x1f{"type":"boundary","kind":"start_test","name":"Passing Test","args":[]}\n
//! ```
//!
//! Everything else is console text and is passed through untouched.

use serde::Deserialize;

use super::listener::Boundary;

/// Leading byte of a helper message
pub const MARKER: u8 = 0x1f;

/// Message printed by the listener helper
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HelperMessage {
    Boundary(Boundary),
    HostCall {
        payload: serde_json::Map<String, serde_json::Value>,
    },
}

/// Longest unterminated message held back before it is released as text
pub const MAX_PENDING: usize = 1024 * 1024;

/// A decoded piece of engine stdout
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(Vec<u8>),
    Message(HelperMessage),
}

/// Incremental splitter for engine stdout
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Start of a message whose newline has not arrived yet
    partial: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk read from the pipe and get the frames it completes
    ///
    /// Text is released as soon as it is read; only an unterminated message
    /// is held back.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut data = std::mem::take(&mut self.partial);
        data.extend_from_slice(chunk);

        let mut rest = &data[..];
        while !rest.is_empty() {
            let Some(start) = rest.iter().position(|&b| b == MARKER) else {
                push_text(&mut frames, rest);
                break;
            };
            push_text(&mut frames, &rest[..start]);
            let message = &rest[start..];

            // A message ends at a newline; a later marker starts a new one
            match message[1..]
                .iter()
                .position(|&b| b == b'\n' || b == MARKER)
                .map(|i| i + 1)
            {
                None if message.len() > MAX_PENDING => {
                    push_text(&mut frames, message);
                    break;
                }
                None => {
                    self.partial = message.to_vec();
                    break;
                }
                Some(end) if message[end] == MARKER => {
                    push_text(&mut frames, &message[..end]);
                    rest = &message[end..];
                }
                Some(end) => {
                    frames.push(decode_message(&message[..=end]));
                    rest = &message[end + 1..];
                }
            }
        }

        frames
    }

    /// Flush whatever is held back once the stream has ended
    pub fn finish(self) -> Option<Frame> {
        (!self.partial.is_empty()).then(|| Frame::Text(self.partial))
    }
}

fn push_text(frames: &mut Vec<Frame>, text: &[u8]) {
    if text.is_empty() {
        return;
    }
    // Keep adjacent text in one frame
    if let Some(Frame::Text(prev)) = frames.last_mut() {
        prev.extend_from_slice(text);
    } else {
        frames.push(Frame::Text(text.to_vec()));
    }
}

/// Decode one complete marker line, falling back to text if it is not ours
fn decode_message(line: &[u8]) -> Frame {
    let json = &line[1..line.len() - 1];
    match serde_json::from_slice::<HelperMessage>(json) {
        Ok(message) => Frame::Message(message),
        Err(e) => {
            tracing::warn!("Unrecognized helper message, passing through as text: {}", e);
            Frame::Text(line.to_vec())
        }
    }
}
