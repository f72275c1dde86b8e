//! Error taxonomy for the meeting poller.
//!
//! Per-message errors (`Transport`, `DateParse`) are contained by the
//! pipeline and only logged. `MalformedResponse` never leaves the extractor.
//! `Config` is raised at startup and is fatal.

use std::fmt;
use thiserror::Error;

/// External system a transport error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Mailbox,
    Inference,
    Calendar,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Backend::Mailbox => "mailbox",
            Backend::Inference => "inference",
            Backend::Calendar => "calendar",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// A mailbox, inference or calendar call failed at the network/protocol level
    #[error("{backend} request failed: {source:#}")]
    Transport {
        backend: Backend,
        source: anyhow::Error,
    },

    /// Inference output was not valid JSON or lacked required fields
    #[error("Malformed inference response: {0}")]
    MalformedResponse(String),

    /// A candidate timestamp could not be turned into a calendar time
    #[error("Could not parse {field} timestamp {value:?}")]
    DateParse { field: &'static str, value: String },

    /// Missing or invalid settings at startup
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persisted state could not be written
    #[error("Persistence error: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn transport(backend: Backend, source: anyhow::Error) -> Self {
        Error::Transport { backend, source }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    pub fn date_parse(field: &'static str, value: impl Into<String>) -> Self {
        Error::DateParse {
            field,
            value: value.into(),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_display_includes_context() {
        let source = anyhow::anyhow!("connection refused").context("Failed to reach Ollama");
        let err = Error::transport(Backend::Inference, source);
        assert!(err.is_transport());
        assert_eq!(
            err.to_string(),
            "inference request failed: Failed to reach Ollama: connection refused"
        );
    }

    #[test]
    fn test_date_parse_display() {
        let err = Error::date_parse("start", "next tuesday-ish");
        assert!(!err.is_transport());
        assert_eq!(
            err.to_string(),
            "Could not parse start timestamp \"next tuesday-ish\""
        );
    }
}
