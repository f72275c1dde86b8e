//! Watches a mailbox, asks a local model whether each new message describes
//! a meeting, and creates calendar events for the ones that do.

pub mod calendar_client;
pub mod config;
pub mod dedup;
pub mod error;
pub mod event_builder;
pub mod extractor;
pub mod imap_client;
pub mod ollama_client;
pub mod ports;
pub mod processor;
pub mod service;

use crate::calendar_client::CalendarClient;
use crate::config::Config;
use crate::dedup::JsonFileStore;
use crate::event_builder::EventBuilder;
use crate::extractor::MeetingExtractor;
use crate::imap_client::ImapClient;
use crate::ollama_client::OllamaClient;
use crate::processor::{Pipeline, PipelineSettings};

/// Wire the production adapters described by a validated `config`
pub async fn build_pipeline(config: &Config) -> error::Result<Pipeline> {
    let timezone = config.timezone()?;

    let mailbox = ImapClient::new(&config.mailbox)?;
    let backend = OllamaClient::new(&config.inference)
        .map_err(|e| error::Error::config(format!("{:#}", e)))?;
    let calendar = CalendarClient::new(&config.calendar).await?;
    let store = JsonFileStore::new(&config.state_path);
    tracing::info!("Processed-id state at {}", store.path().display());

    Ok(Pipeline::new(
        Box::new(mailbox),
        MeetingExtractor::new(Box::new(backend), timezone),
        EventBuilder::new(timezone, config.plausible_year_floor),
        Box::new(calendar),
        Box::new(store),
        PipelineSettings {
            calendar_id: config.calendar.calendar_id.clone(),
            retry_transport_failures: config.retry_transport_failures,
        },
    ))
}
