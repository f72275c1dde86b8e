//! Interfaces to the external systems the pipeline drives.
//!
//! Adapters return `anyhow` errors with context; the pipeline wraps them
//! into [`crate::error::Error::Transport`] tagged with the backend.

use anyhow::Result;
use async_trait::async_trait;
use shared_types::Message;

use crate::event_builder::SanitizedEvent;

/// Read-only access to one mailbox folder
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// At most `max_count` of the most recent messages, oldest first.
    ///
    /// Messages that fail to fetch or parse are logged and omitted.
    async fn fetch_recent(&self, max_count: u32) -> Result<Vec<Message>>;
}

/// Text-completion service used to extract meetings
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Raw completion text for `prompt` under `system` instructions
    async fn complete(&self, prompt: &str, system: &str) -> Result<String>;
}

/// Handle to an event the calendar backend created
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventHandle {
    pub id: Option<String>,
    pub html_link: Option<String>,
}

#[async_trait]
pub trait CalendarPort: Send + Sync {
    async fn insert_event(&self, calendar_id: &str, event: &SanitizedEvent)
        -> Result<EventHandle>;
}
