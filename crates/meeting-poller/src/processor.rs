//! One scan over the mailbox: skip-if-seen, extract, sanitize, dispatch,
//! mark seen, and save the processed set once at the end.

use shared_types::{Message, ScanSummary};

use crate::dedup::{DedupStore, ProcessedIds};
use crate::error::{Backend, Error, Result};
use crate::event_builder::EventBuilder;
use crate::extractor::MeetingExtractor;
use crate::ports::{CalendarPort, EventHandle, Mailbox};

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Calendar receiving created events
    pub calendar_id: String,
    /// When set, messages whose handling hit a transport error stay unmarked
    /// and are offered again on the next scan
    pub retry_transport_failures: bool,
}

#[derive(Debug)]
enum MessageOutcome {
    EventCreated(EventHandle),
    NoMeeting,
}

pub struct Pipeline {
    mailbox: Box<dyn Mailbox>,
    extractor: MeetingExtractor,
    builder: EventBuilder,
    calendar: Box<dyn CalendarPort>,
    store: Box<dyn DedupStore>,
    processed: ProcessedIds,
    settings: PipelineSettings,
}

impl Pipeline {
    /// Loads the processed set from `store` once; later scans work on the
    /// in-memory copy and write it back after every scan.
    pub fn new(
        mailbox: Box<dyn Mailbox>,
        extractor: MeetingExtractor,
        builder: EventBuilder,
        calendar: Box<dyn CalendarPort>,
        store: Box<dyn DedupStore>,
        settings: PipelineSettings,
    ) -> Self {
        let processed = ProcessedIds::new(store.load());
        tracing::info!("Loaded {} processed message ids", processed.len());

        Self {
            mailbox,
            extractor,
            builder,
            calendar,
            store,
            processed,
            settings,
        }
    }

    pub fn processed(&self) -> &ProcessedIds {
        &self.processed
    }

    pub async fn run(&mut self, max_messages: u32) -> Result<ScanSummary> {
        let messages = self
            .mailbox
            .fetch_recent(max_messages)
            .await
            .map_err(|e| Error::transport(Backend::Mailbox, e))?;

        let mut summary = ScanSummary::default();

        for message in &messages {
            summary.checked += 1;

            if self.processed.contains(&message.id) {
                tracing::debug!("Skipping already processed message {}", message.id);
                summary.skipped += 1;
                continue;
            }

            match self.handle_message(message).await {
                Ok(MessageOutcome::EventCreated(handle)) => {
                    summary.new_events_created += 1;
                    tracing::info!(
                        "Created event from message {} ({}): {}",
                        message.id,
                        message.subject,
                        handle.html_link.as_deref().unwrap_or("no link")
                    );
                }
                Ok(MessageOutcome::NoMeeting) => {
                    tracing::debug!("No meeting in message {} ({})", message.id, message.subject);
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!("Failed to process message {}: {}", message.id, e);

                    if self.settings.retry_transport_failures && e.is_transport() {
                        tracing::warn!("Leaving message {} for the next scan", message.id);
                        continue;
                    }
                }
            }

            self.processed.mark_processed(&message.id);
        }

        self.store.save(self.processed.as_set())?;

        tracing::info!(
            "Checked {} messages: {} new events, {} skipped, {} failed",
            summary.checked,
            summary.new_events_created,
            summary.skipped,
            summary.failed
        );

        Ok(summary)
    }

    async fn handle_message(&self, message: &Message) -> Result<MessageOutcome> {
        let candidate = self
            .extractor
            .analyze(&message.subject, &message.body_text)
            .await?;

        if !candidate.has_meeting {
            return Ok(MessageOutcome::NoMeeting);
        }

        let event = self.builder.build(&candidate)?;

        let handle = self
            .calendar
            .insert_event(&self.settings.calendar_id, &event)
            .await
            .map_err(|e| Error::transport(Backend::Calendar, e))?;

        Ok(MessageOutcome::EventCreated(handle))
    }
}
