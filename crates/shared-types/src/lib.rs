use serde::{Deserialize, Serialize};

/// Subject used when a message carries no Subject header
pub const NO_SUBJECT: &str = "(no subject)";

/// A message fetched from the mailbox, normalized to plain text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Opaque identifier, unique within the mailbox and stable across scans
    pub id: String,
    pub subject: String,
    /// Best-effort plain-text body; empty when no suitable part exists
    pub body_text: String,
}

/// The extractor's untrusted guess about a meeting described in a message.
///
/// Timestamps are kept as the raw strings the model produced; they are only
/// validated when an event is built from the candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingCandidate {
    pub has_meeting: bool,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl MeetingCandidate {
    /// The "nothing to schedule" result
    pub fn none() -> Self {
        Self::default()
    }

    /// End timestamp, treating an empty or whitespace-only value as absent
    pub fn end_value(&self) -> Option<&str> {
        self.end
            .as_deref()
            .map(str::trim)
            .filter(|end| !end.is_empty())
    }
}

/// Counters reported by one pass over the mailbox
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    /// Messages returned by the mailbox, including already-processed ones
    pub checked: usize,
    pub new_events_created: usize,
    /// Messages skipped because their id was already processed
    pub skipped: usize,
    /// Messages whose handling failed (transport or date errors)
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_has_no_meeting() {
        let candidate = MeetingCandidate::none();
        assert!(!candidate.has_meeting);
        assert!(candidate.title.is_empty());
        assert!(candidate.end.is_none());
    }

    #[test]
    fn test_end_value_ignores_blank() {
        let mut candidate = MeetingCandidate {
            has_meeting: true,
            title: "Sync".to_string(),
            start: "2026-10-20T10:00:00+02:00".to_string(),
            end: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(candidate.end_value(), None);

        candidate.end = Some(" 2026-10-20T11:00:00+02:00 ".to_string());
        assert_eq!(candidate.end_value(), Some("2026-10-20T11:00:00+02:00"));
    }

    #[test]
    fn test_candidate_optional_fields_default() {
        let parsed: MeetingCandidate =
            serde_json::from_str(r#"{"has_meeting": false}"#).unwrap();
        assert_eq!(parsed, MeetingCandidate::none());
    }

    #[test]
    fn test_scan_summary_serde() {
        let summary = ScanSummary {
            checked: 3,
            new_events_created: 1,
            skipped: 1,
            failed: 0,
        };
        let json = serde_json::to_string(&summary).unwrap();
        assert_eq!(
            json,
            r#"{"checked":3,"new_events_created":1,"skipped":1,"failed":0}"#
        );
    }
}
