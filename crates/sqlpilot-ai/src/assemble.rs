//! Incremental reassembly of the backend's event stream.
//!
//! The backend answers with SSE-style lines: blank lines, comments, or
//! `data: <json>` where the JSON carries an `event` field. `message`
//! events contribute an `answer` fragment; `message_end` terminates the
//! stream; `error` fails the whole call; `ping` is keep-alive only.
//! Malformed individual lines are skipped. A stream that closes without
//! `message_end` is an incomplete answer, never a success.

use serde::Deserialize;

use crate::error::AiError;

/// One parsed stream event.
#[derive(Debug, Deserialize)]
struct StreamEvent {
    event: String,
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Accumulates `message` fragments across transport chunks.
///
/// Transport chunks do not align with line boundaries, so a trailing
/// partial line is carried over into the next `push`.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    carry: String,
    answer: String,
    complete: bool,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one transport chunk. Returns an error only for a fatal
    /// backend-reported `error` event; malformed lines are skipped.
    pub fn push(&mut self, chunk: &str) -> Result<(), AiError> {
        if self.complete {
            return Ok(());
        }
        self.carry.push_str(chunk);

        while let Some(pos) = self.carry.find('\n') {
            let line: String = self.carry.drain(..=pos).collect();
            self.handle_line(line.trim_end_matches(['\n', '\r']))?;
            if self.complete {
                break;
            }
        }
        Ok(())
    }

    /// Whether `message_end` has been observed.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Consume the assembler. Succeeds only if the stream terminated with
    /// `message_end`; a partial answer is never returned as complete.
    pub fn finish(mut self) -> Result<String, AiError> {
        if !self.complete && !self.carry.is_empty() {
            // A final line without a trailing newline still counts.
            let line = std::mem::take(&mut self.carry);
            self.handle_line(line.trim_end_matches('\r'))?;
        }
        if self.complete {
            Ok(self.answer)
        } else {
            Err(AiError::IncompleteStream)
        }
    }

    fn handle_line(&mut self, line: &str) -> Result<(), AiError> {
        let Some(data) = line.strip_prefix("data: ") else {
            // Blank line, comment, or unknown framing.
            return Ok(());
        };
        let data = data.trim();
        if data.is_empty() {
            return Ok(());
        }

        let event: StreamEvent = match serde_json::from_str(data) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(error = %e, "Skipping malformed stream line");
                return Ok(());
            }
        };

        match event.event.as_str() {
            "message" => {
                if let Some(fragment) = event.answer {
                    self.answer.push_str(&fragment);
                }
            }
            "message_end" => {
                self.complete = true;
            }
            "error" => {
                return Err(AiError::Backend(
                    event.message.unwrap_or_else(|| "unspecified".to_string()),
                ));
            }
            // ping and anything unrecognized: keep-alive / ignore.
            _ => {}
        }
        Ok(())
    }
}
