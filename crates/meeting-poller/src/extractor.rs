//! Meeting extraction through the inference backend.
//!
//! The model's answer is untrusted. Anything that does not parse into a
//! complete candidate degrades to "no meeting" instead of an error; only a
//! failed backend call is reported to the caller.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use shared_types::MeetingCandidate;

use crate::error::{Backend, Error, Result};
use crate::ports::InferenceBackend;

pub const SYSTEM_PROMPT: &str = "You are an assistant that detects whether an email contains the details of a meeting.\n\
Always answer with a single JSON object with exactly these keys:\n\
{\n  \"has_meeting\": bool,\n  \"title\": string,\n  \"start\": string (ISO 8601),\n  \"end\": string (ISO 8601),\n  \"location\": string,\n  \"description\": string\n}\n\
All timestamps must be ISO 8601 with an explicit UTC offset, for example 2024-05-14T10:00:00+02:00.\n\
Resolve relative dates such as \"tomorrow\" against the current date given in the prompt.\n\
If there is no meeting, has_meeting must be false and the other fields may be empty strings.\n\
If there is a meeting, fill in every field; if the end time is unknown, leave end empty.";

/// Shape the model is asked to produce. Every key is optional here so
/// validation can decide what is missing.
#[derive(Debug, Deserialize)]
struct RawCandidate {
    has_meeting: Option<bool>,
    title: Option<String>,
    start: Option<String>,
    end: Option<String>,
    location: Option<String>,
    description: Option<String>,
}

pub struct MeetingExtractor {
    backend: Box<dyn InferenceBackend>,
    timezone: Tz,
}

impl MeetingExtractor {
    pub fn new(backend: Box<dyn InferenceBackend>, timezone: Tz) -> Self {
        Self { backend, timezone }
    }

    pub async fn analyze(&self, subject: &str, body: &str) -> Result<MeetingCandidate> {
        self.analyze_at(subject, body, Utc::now()).await
    }

    pub(crate) async fn analyze_at(
        &self,
        subject: &str,
        body: &str,
        now: DateTime<Utc>,
    ) -> Result<MeetingCandidate> {
        let prompt = build_prompt(subject, body, now.with_timezone(&self.timezone));

        let raw = self
            .backend
            .complete(&prompt, SYSTEM_PROMPT)
            .await
            .map_err(|e| Error::transport(Backend::Inference, e))?;

        let mut candidate = match parse_candidate(&raw) {
            Ok(candidate) => candidate,
            Err(e) => {
                tracing::warn!("Treating response as no meeting: {}", e);
                return Ok(MeetingCandidate::none());
            }
        };

        if candidate.has_meeting && candidate.title.trim().is_empty() {
            candidate.title = subject.to_string();
        }

        Ok(candidate)
    }
}

fn build_prompt(subject: &str, body: &str, now: DateTime<Tz>) -> String {
    format!(
        "Current date and time: {} ({}, {})\nSubject: {}\nBody:\n{}",
        now.format("%Y-%m-%dT%H:%M:%S%:z"),
        now.format("%A"),
        now.timezone().name(),
        subject,
        body
    )
}

/// Validate the model output into a usable candidate
fn parse_candidate(raw: &str) -> Result<MeetingCandidate> {
    let parsed: RawCandidate = serde_json::from_str(raw.trim())
        .map_err(|e| Error::MalformedResponse(format!("not a JSON candidate: {}", e)))?;

    let has_meeting = parsed
        .has_meeting
        .ok_or_else(|| Error::MalformedResponse("missing has_meeting".to_string()))?;

    if !has_meeting {
        return Ok(MeetingCandidate::none());
    }

    let title = parsed
        .title
        .ok_or_else(|| Error::MalformedResponse("missing title".to_string()))?;
    let start = parsed
        .start
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| Error::MalformedResponse("missing start".to_string()))?;

    Ok(MeetingCandidate {
        has_meeting: true,
        title,
        start,
        end: parsed.end,
        location: parsed.location,
        description: parsed.description,
    })
}
