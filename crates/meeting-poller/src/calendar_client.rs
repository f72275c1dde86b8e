use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use google_calendar3::api::{Event, EventDateTime};
use google_calendar3::hyper_rustls::HttpsConnector;
use google_calendar3::CalendarHub;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::path::Path;

use crate::config::CalendarConfig;
use crate::error::Error;
use crate::event_builder::SanitizedEvent;
use crate::ports::{CalendarPort, EventHandle};

/// Client for interacting with Google Calendar API
pub struct CalendarClient {
    hub: CalendarHub<HttpsConnector<HttpConnector>>,
}

impl CalendarClient {
    /// Build the OAuth authenticator and API hub.
    ///
    /// The first run opens the browser consent flow; the resulting tokens are
    /// cached at `token_cache_path` and refreshed from there afterwards.
    pub async fn new(config: &CalendarConfig) -> crate::error::Result<Self> {
        if !Path::new(&config.credentials_path).exists() {
            return Err(Error::config(format!(
                "Google OAuth credentials not found at {}",
                config.credentials_path
            )));
        }

        Self::connect(config)
            .await
            .map_err(|e| Error::config(format!("{:#}", e)))
    }

    async fn connect(config: &CalendarConfig) -> Result<Self> {
        let secret =
            google_calendar3::yup_oauth2::read_application_secret(&config.credentials_path)
                .await
                .context("Failed to read OAuth credentials")?;

        if let Some(parent) = Path::new(&config.token_cache_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).context("Failed to create token cache dir")?;
            }
        }

        let auth = google_calendar3::yup_oauth2::InstalledFlowAuthenticator::builder(
            secret,
            google_calendar3::yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
        )
        .persist_tokens_to_disk(Path::new(&config.token_cache_path))
        .build()
        .await
        .context("Failed to build authenticator")?;

        let connector = google_calendar3::hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .context("Failed to load native TLS roots")?
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new()).build(connector);
        let hub = CalendarHub::new(client, auth);

        Ok(Self { hub })
    }
}

/// Google representation of a sanitized event
fn to_google_event(event: &SanitizedEvent) -> Event {
    let time_zone = event.time_zone().to_string();

    Event {
        summary: Some(event.summary.clone()),
        description: if event.description.is_empty() {
            None
        } else {
            Some(event.description.clone())
        },
        location: if event.location.is_empty() {
            None
        } else {
            Some(event.location.clone())
        },
        start: Some(EventDateTime {
            date_time: Some(event.start.with_timezone(&Utc)),
            time_zone: Some(time_zone.clone()),
            ..Default::default()
        }),
        end: Some(EventDateTime {
            date_time: Some(event.end.with_timezone(&Utc)),
            time_zone: Some(time_zone),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[async_trait]
impl CalendarPort for CalendarClient {
    async fn insert_event(&self, calendar_id: &str, event: &SanitizedEvent) -> Result<EventHandle> {
        let (_, created) = self
            .hub
            .events()
            .insert(to_google_event(event), calendar_id)
            .doit()
            .await
            .context("Failed to create calendar event")?;

        tracing::info!(
            "Created calendar event: {} (id: {:?})",
            event.summary,
            created.id
        );

        Ok(EventHandle {
            id: created.id,
            html_link: created.html_link,
        })
    }
}
