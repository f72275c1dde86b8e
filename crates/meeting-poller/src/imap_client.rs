use anyhow::{Context, Result};
use async_imap::Session;
use async_native_tls::TlsStream;
use async_trait::async_trait;
use futures::StreamExt;
use mailparse::{DispositionType, MailHeaderMap, ParsedMail};
use shared_types::{Message, NO_SUBJECT};
use tokio::net::TcpStream;

use crate::config::MailboxConfig;
use crate::error::Error;
use crate::ports::Mailbox;

type ImapSession = Session<TlsStream<TcpStream>>;

/// IMAP mailbox reader. Opens a fresh session for every scan and only ever
/// EXAMINEs the folder, so nothing is written back to the server.
pub struct ImapClient {
    host: String,
    port: u16,
    user: String,
    password: String,
    folder: String,
}

impl ImapClient {
    pub fn new(config: &MailboxConfig) -> crate::error::Result<Self> {
        let password = config
            .password
            .clone()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::config("mailbox password is not set"))?;

        Ok(Self {
            host: config.host.clone(),
            port: config.port,
            user: config.user.clone(),
            password,
            folder: config.folder.clone(),
        })
    }

    async fn connect(&self) -> Result<ImapSession> {
        let tcp = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .context("Failed to connect to IMAP server")?;

        let tls = async_native_tls::TlsConnector::new();
        let tls_stream = tls
            .connect(self.host.as_str(), tcp)
            .await
            .context("TLS handshake failed")?;

        let client = async_imap::Client::new(tls_stream);

        let session = client
            .login(&self.user, &self.password)
            .await
            .map_err(|e| anyhow::anyhow!("Login failed: {}", e.0))?;

        Ok(session)
    }

    async fn fetch_with_session(
        &self,
        session: &mut ImapSession,
        count: u32,
    ) -> Result<Vec<Message>> {
        let mailbox = session
            .examine(&self.folder)
            .await
            .with_context(|| format!("Failed to examine {}", self.folder))?;

        let total = mailbox.exists;
        if total == 0 {
            return Ok(vec![]);
        }

        let start = total.saturating_sub(count) + 1;
        let range = format!("{}:{}", start, total);

        let stream = session
            .fetch(&range, "(UID BODY.PEEK[])")
            .await
            .context("Failed to fetch messages")?;
        futures::pin_mut!(stream);

        let mut fetched = Vec::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(item) => fetched.push(item),
                Err(e) => tracing::warn!("Failed to fetch message: {}", e),
            }
        }

        Ok(collect_messages(fetched.iter().map(|item| (item.uid, item.body()))))
    }
}

/// Parse fetched `(uid, raw body)` pairs, oldest first. Pairs without a UID
/// or body, or that fail to parse, are logged and dropped.
fn collect_messages<'a, I>(items: I) -> Vec<Message>
where
    I: IntoIterator<Item = (Option<u32>, Option<&'a [u8]>)>,
{
    let mut ordered: Vec<(u32, Message)> = Vec::new();

    for (uid, raw) in items {
        let Some(uid) = uid else {
            tracing::warn!("Skipping fetched message without UID");
            continue;
        };

        let Some(raw) = raw else {
            tracing::warn!("Message {} has no body", uid);
            continue;
        };

        match parse_message(&uid.to_string(), raw) {
            Ok(message) => ordered.push((uid, message)),
            Err(e) => tracing::warn!("Failed to parse email {}: {}", uid, e),
        }
    }

    ordered.sort_by_key(|(uid, _)| *uid);
    ordered.into_iter().map(|(_, message)| message).collect()
}

#[async_trait]
impl Mailbox for ImapClient {
    async fn fetch_recent(&self, max_count: u32) -> Result<Vec<Message>> {
        let mut session = self.connect().await?;

        let result = self.fetch_with_session(&mut session, max_count).await;

        session.logout().await.ok();

        let messages = result?;
        tracing::debug!(
            "Fetched {} messages from {}@{}",
            messages.len(),
            self.user,
            self.host
        );
        Ok(messages)
    }
}

/// Normalize a raw RFC 822 message into a [`Message`]
pub fn parse_message(id: &str, raw: &[u8]) -> Result<Message, mailparse::MailParseError> {
    let parsed = mailparse::parse_mail(raw)?;

    Ok(Message {
        id: id.to_string(),
        subject: decode_subject(&parsed),
        body_text: extract_body(&parsed),
    })
}

/// Decoded Subject header with folding whitespace collapsed
fn decode_subject(parsed: &ParsedMail) -> String {
    let subject = parsed
        .headers
        .get_first_value("Subject")
        .map(|value| value.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();

    if subject.is_empty() {
        NO_SUBJECT.to_string()
    } else {
        subject
    }
}

fn extract_body(parsed: &ParsedMail) -> String {
    if parsed.subparts.is_empty() {
        if parsed.ctype.mimetype.starts_with("text/") && !is_attachment(parsed) {
            return parsed.get_body().unwrap_or_default();
        }
        return String::new();
    }

    first_plain_part(parsed)
        .and_then(|part| part.get_body().ok())
        .unwrap_or_default()
}

/// Depth-first search for the first inline text/plain leaf
fn first_plain_part<'a, 'b>(part: &'b ParsedMail<'a>) -> Option<&'b ParsedMail<'a>> {
    for sub in &part.subparts {
        if sub.subparts.is_empty() {
            if sub.ctype.mimetype == "text/plain" && !is_attachment(sub) {
                return Some(sub);
            }
        } else if let Some(found) = first_plain_part(sub) {
            return Some(found);
        }
    }
    None
}

fn is_attachment(part: &ParsedMail) -> bool {
    part.get_content_disposition().disposition == DispositionType::Attachment
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_message() {
        let raw = b"From: ana@example.com\n\
Subject: Weekly sync\n\
Content-Type: text/plain; charset=utf-8\n\
\n\
Let's meet on Thursday at 10:00.\n";

        let message = parse_message("42", raw).unwrap();
        assert_eq!(message.id, "42");
        assert_eq!(message.subject, "Weekly sync");
        assert_eq!(message.body_text.trim(), "Let's meet on Thursday at 10:00.");
    }

    #[test]
    fn test_encoded_subject_is_decoded() {
        let raw = b"Subject: =?ISO-8859-1?Q?Reuni=F3n_de_equipo?=\n\
Content-Type: text/plain\n\
\n\
body\n";

        let message = parse_message("1", raw).unwrap();
        assert_eq!(message.subject, "Reuni\u{f3}n de equipo");
    }

    #[test]
    fn test_folded_subject_is_normalized() {
        let raw = b"Subject: Project kickoff\n   next week\n\
\n\
body\n";

        let message = parse_message("1", raw).unwrap();
        assert_eq!(message.subject, "Project kickoff next week");
    }

    #[test]
    fn test_missing_subject_uses_placeholder() {
        let raw = b"From: ana@example.com\n\nHello\n";

        let message = parse_message("7", raw).unwrap();
        assert_eq!(message.subject, NO_SUBJECT);
    }

    #[test]
    fn test_multipart_skips_attachments_and_html() {
        let raw = b"Subject: Planning\n\
MIME-Version: 1.0\n\
Content-Type: multipart/mixed; boundary=\"OUTER\"\n\
\n\
--OUTER\n\
Content-Type: text/plain; charset=utf-8\n\
Content-Disposition: attachment; filename=\"agenda.txt\"\n\
\n\
attached agenda\n\
--OUTER\n\
Content-Type: multipart/alternative; boundary=\"ALT\"\n\
\n\
--ALT\n\
Content-Type: text/html; charset=utf-8\n\
\n\
<p>Meeting tomorrow at 10.</p>\n\
--ALT\n\
Content-Type: text/plain; charset=utf-8\n\
\n\
Meeting tomorrow at 10.\n\
--ALT--\n\
--OUTER--\n";

        let message = parse_message("9", raw).unwrap();
        assert_eq!(message.body_text.trim(), "Meeting tomorrow at 10.");
    }

    #[test]
    fn test_multipart_without_plain_text_has_empty_body() {
        let raw = b"Subject: Newsletter\n\
MIME-Version: 1.0\n\
Content-Type: multipart/alternative; boundary=\"ALT\"\n\
\n\
--ALT\n\
Content-Type: text/html; charset=utf-8\n\
\n\
<p>Hi</p>\n\
--ALT--\n";

        let message = parse_message("3", raw).unwrap();
        assert_eq!(message.body_text, "");
    }

    #[test]
    fn test_single_part_binary_has_empty_body() {
        let raw = b"Subject: Scan\n\
Content-Type: application/pdf\n\
Content-Transfer-Encoding: base64\n\
\n\
JVBERi0xLjQK\n";

        let message = parse_message("5", raw).unwrap();
        assert_eq!(message.body_text, "");
    }

    #[test]
    fn test_quoted_printable_body_is_decoded() {
        let raw = b"Subject: Call\n\
Content-Type: text/plain; charset=utf-8\n\
Content-Transfer-Encoding: quoted-printable\n\
\n\
Reuni=C3=B3n ma=C3=B1ana\n";

        let message = parse_message("8", raw).unwrap();
        assert_eq!(message.body_text.trim(), "Reuni\u{f3}n ma\u{f1}ana");
    }

    fn raw(subject: &str) -> Vec<u8> {
        format!("Subject: {}\nContent-Type: text/plain\n\nbody\n", subject).into_bytes()
    }

    #[test]
    fn test_collect_orders_by_uid() {
        let (a, b, c) = (raw("third"), raw("first"), raw("second"));
        let messages = collect_messages(vec![
            (Some(30), Some(a.as_slice())),
            (Some(10), Some(b.as_slice())),
            (Some(20), Some(c.as_slice())),
        ]);

        let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["10", "20", "30"]);
        assert_eq!(messages[0].subject, "first");
        assert_eq!(messages[2].subject, "third");
    }

    #[test]
    fn test_collect_drops_items_without_uid_or_body() {
        let (a, b, c) = (raw("kept"), raw("no uid"), raw("also kept"));
        let messages = collect_messages(vec![
            (Some(7), Some(a.as_slice())),
            (None, Some(b.as_slice())),
            (Some(5), None),
            (Some(3), Some(c.as_slice())),
        ]);

        let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "7"]);
    }

    #[test]
    fn test_collect_empty_batch() {
        assert!(collect_messages(Vec::<(Option<u32>, Option<&[u8]>)>::new()).is_empty());
    }
}
