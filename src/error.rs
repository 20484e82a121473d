//! Two-kind error taxonomy: errors shown to the end user verbatim, and
//! everything else, which is logged in full and surfaced generically.

use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Shown to the end user verbatim: context-window overflow, cloud auth
    /// failures, invalid configuration, missing tool-server script.
    #[error("{0}")]
    UserVisible(String),

    /// Logged with full detail; the user sees a generic failure message.
    #[error("{message}")]
    LogOnly {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Misconfiguration detected at construction time (e.g. unknown
    /// provider kind): distinct from a runtime `LogOnly` failure.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CoreError {
    pub fn log_only(message: impl Into<String>) -> Self {
        CoreError::LogOnly {
            message: message.into(),
            source: None,
        }
    }

    pub fn log_only_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        CoreError::LogOnly {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// The message appropriate to show the user: verbatim for
    /// `UserVisible`, a generic fallback otherwise.
    pub fn user_message(&self) -> String {
        match self {
            CoreError::UserVisible(msg) => msg.clone(),
            CoreError::LogOnly { .. } => "operation failed, see logs".to_string(),
            CoreError::Config(_) => "operation failed, see logs".to_string(),
        }
    }

    pub fn is_user_visible(&self) -> bool {
        matches!(self, CoreError::UserVisible(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_visible_message_is_verbatim() {
        let err = CoreError::UserVisible("requested tokens 5000 exceed context window of 4096, reduce history or prompt".to_string());
        assert_eq!(
            err.user_message(),
            "requested tokens 5000 exceed context window of 4096, reduce history or prompt"
        );
        assert!(err.is_user_visible());
    }

    #[test]
    fn log_only_message_is_generic() {
        let err = CoreError::log_only("connection reset by peer");
        assert_eq!(err.user_message(), "operation failed, see logs");
        assert!(!err.is_user_visible());
    }
}
