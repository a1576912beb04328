//! Error types for the generation backend client.

use sqlpilot_core::types::FunctionMode;

/// Errors from one streamed generation call.
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("no credential configured for mode '{0}'")]
    MissingCredential(FunctionMode),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("backend call timed out after {0} seconds")]
    Timeout(u64),
    #[error("stream closed before message_end")]
    IncompleteStream,
    #[error("call cancelled by the client")]
    Cancelled,
    #[error("backend reported error: {0}")]
    Backend(String),
}

impl AiError {
    /// Translate into a user-safe message, classified as network vs.
    /// credential vs. generic. Never leaks internal detail to the client.
    pub fn user_message(&self) -> String {
        match self {
            AiError::MissingCredential(mode) => {
                format!("The '{}' AI function is not configured on this server.", mode)
            }
            AiError::Transport(_) => {
                "Could not reach the AI service. Please check network connectivity.".to_string()
            }
            AiError::Status { status, .. } if *status == 401 || *status == 403 => {
                "The AI service rejected the server's credentials.".to_string()
            }
            AiError::Timeout(_) => {
                "The AI service took too long to answer. Please try again.".to_string()
            }
            AiError::Status { .. }
            | AiError::IncompleteStream
            | AiError::Backend(_)
            | AiError::Cancelled => {
                "The AI service could not complete the request. Please try again.".to_string()
            }
        }
    }
}

impl From<reqwest::Error> for AiError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            AiError::Status {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            AiError::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AiError::MissingCredential(FunctionMode::Explain);
        assert_eq!(err.to_string(), "no credential configured for mode 'explain'");

        let err = AiError::Timeout(60);
        assert_eq!(err.to_string(), "backend call timed out after 60 seconds");

        let err = AiError::Status {
            status: 502,
            body: "bad gateway".to_string(),
        };
        assert_eq!(err.to_string(), "backend returned status 502: bad gateway");
    }

    #[test]
    fn test_user_message_network_category() {
        let msg = AiError::Transport("connection refused".to_string()).user_message();
        assert!(msg.contains("network"));
        assert!(!msg.contains("connection refused"));
    }

    #[test]
    fn test_user_message_credential_category() {
        let msg = AiError::Status {
            status: 401,
            body: "unauthorized".to_string(),
        }
        .user_message();
        assert!(msg.contains("credentials"));

        let msg = AiError::Status {
            status: 403,
            body: "forbidden".to_string(),
        }
        .user_message();
        assert!(msg.contains("credentials"));
    }

    #[test]
    fn test_user_message_generic_category() {
        for err in [
            AiError::Status {
                status: 500,
                body: "boom".to_string(),
            },
            AiError::IncompleteStream,
            AiError::Backend("model overloaded".to_string()),
        ] {
            let msg = err.user_message();
            assert!(msg.contains("could not complete"), "unexpected: {}", msg);
            assert!(!msg.contains("boom"));
            assert!(!msg.contains("overloaded"));
        }
    }

    #[test]
    fn test_user_message_names_unconfigured_mode() {
        let msg = AiError::MissingCredential(FunctionMode::Grammar).user_message();
        assert!(msg.contains("grammar"));
    }
}
