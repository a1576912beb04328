//! Error types for turn handling.

use sqlpilot_ai::AiError;
use sqlpilot_core::error::PilotError;

/// Errors from one conversational turn.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("session is not authenticated")]
    NotAuthenticated,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("generation failed: {0}")]
    Generation(#[from] AiError),
    #[error("audit write failed: {0}")]
    Audit(String),
    #[error("internal state error: {0}")]
    Internal(String),
}

impl TurnError {
    /// Translate into a user-safe message for the client.
    pub fn user_message(&self) -> String {
        match self {
            TurnError::NotAuthenticated => {
                "Your session has expired. Please reload the page.".to_string()
            }
            TurnError::InvalidRequest(msg) => msg.clone(),
            TurnError::Generation(err) => err.user_message(),
            TurnError::Audit(_) | TurnError::Internal(_) => {
                "The request could not be processed. Please try again.".to_string()
            }
        }
    }
}

impl From<PilotError> for TurnError {
    fn from(err: PilotError) -> Self {
        TurnError::Audit(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlpilot_core::types::FunctionMode;

    #[test]
    fn test_turn_error_display() {
        assert_eq!(
            TurnError::NotAuthenticated.to_string(),
            "session is not authenticated"
        );
        assert_eq!(
            TurnError::InvalidRequest("message cannot be empty".to_string()).to_string(),
            "invalid request: message cannot be empty"
        );
        assert_eq!(
            TurnError::Audit("disk full".to_string()).to_string(),
            "audit write failed: disk full"
        );
    }

    #[test]
    fn test_user_message_hides_audit_detail() {
        let msg = TurnError::Audit("UNIQUE constraint failed".to_string()).user_message();
        assert!(!msg.contains("UNIQUE"));
    }

    #[test]
    fn test_user_message_auth_asks_for_reload() {
        assert!(TurnError::NotAuthenticated.user_message().contains("reload"));
    }

    #[test]
    fn test_generation_error_passes_through_classification() {
        let err = TurnError::Generation(AiError::MissingCredential(FunctionMode::Comment));
        assert!(err.user_message().contains("comment"));
    }

    #[test]
    fn test_from_pilot_error() {
        let pilot = PilotError::Storage("locked".to_string());
        let turn: TurnError = pilot.into();
        assert!(matches!(turn, TurnError::Audit(_)));
        assert!(turn.to_string().contains("locked"));
    }
}
