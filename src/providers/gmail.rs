use base64::Engine;
use lettre::message::header::{ContentType, MessageId};
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::Message;
use reqwest::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{OutboundEmail, SendReceipt};
use crate::error::SendError;

/// Webmail provider A. The message is assembled as RFC822, base64url-encoded
/// and posted raw; the API answers with the stored message and thread ids.
pub struct GmailMailer<'a> {
    pub http: &'a reqwest::Client,
    pub api_base: &'a str,
    pub access_token: &'a str,
}

impl GmailMailer<'_> {
    pub async fn send(&self, mail: &OutboundEmail) -> Result<SendReceipt, SendError> {
        let (message, _message_id) = build_rfc822(mail)?;
        let raw = base64::engine::general_purpose::URL_SAFE.encode(message.formatted());

        let url = format!("{}/gmail/v1/users/me/messages/send", self.api_base);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(self.access_token)
            .json(&json!({ "raw": raw }))
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SendError::Unauthorized(resp.text().await.unwrap_or_default()));
        }
        if !status.is_success() {
            return Err(SendError::Rejected {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }

        let body: Value = resp.json().await?;
        Ok(SendReceipt {
            provider_message_id: body.get("id").and_then(|v| v.as_str()).map(str::to_string),
            thread_id: body
                .get("threadId")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        })
    }
}

/// Assemble the RFC822 payload with an explicit Message-ID
/// (`uuid@sender-domain`). Returns the message plus that id.
pub(crate) fn build_rfc822(mail: &OutboundEmail) -> Result<(Message, String), SendError> {
    let from_mb: Mailbox = mail
        .from
        .rfc_format()
        .parse()
        .map_err(|e| SendError::Message(format!("bad from address: {e}")))?;
    let to_mb: Mailbox = mail
        .to
        .rfc_format()
        .parse()
        .map_err(|e| SendError::Message(format!("bad to address: {e}")))?;

    let domain = mail.from.addr.split('@').nth(1).unwrap_or("presshub.local");
    let msg_id = format!("{}@{}", Uuid::new_v4(), domain);

    let mut builder = Message::builder()
        .from(from_mb)
        .to(to_mb)
        .subject(mail.subject.as_str())
        .header(MessageId::from(msg_id.clone()));

    for cc in &mail.cc {
        let mb: Mailbox = cc
            .parse()
            .map_err(|e| SendError::Message(format!("bad cc address '{cc}': {e}")))?;
        builder = builder.cc(mb);
    }
    for bcc in &mail.bcc {
        let mb: Mailbox = bcc
            .parse()
            .map_err(|e| SendError::Message(format!("bad bcc address '{bcc}': {e}")))?;
        builder = builder.bcc(mb);
    }

    let message = if mail.attachments.is_empty() {
        builder
            .singlepart(SinglePart::html(mail.body_html.clone()))
            .map_err(|e| SendError::Message(e.to_string()))?
    } else {
        let mut parts = MultiPart::mixed().singlepart(SinglePart::html(mail.body_html.clone()));
        for att in &mail.attachments {
            let content_type = ContentType::parse(&att.content_type).map_err(|e| {
                SendError::Message(format!("attachment content type '{}': {e}", att.content_type))
            })?;
            parts = parts.singlepart(
                Attachment::new(att.filename.clone()).body(att.bytes.clone(), content_type),
            );
        }
        builder
            .multipart(parts)
            .map_err(|e| SendError::Message(e.to_string()))?
    };

    Ok((message, msg_id))
}
