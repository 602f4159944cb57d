use base64::Engine;
use reqwest::StatusCode;
use serde_json::{json, Value};

use super::{Address, OutboundEmail, SendReceipt};
use crate::error::SendError;

/// Webmail provider B (Microsoft Graph). Sends are two-step: create a draft
/// (which yields the message and conversation ids), attach files to it, then
/// trigger the send. The receipt carries both ids from the draft.
pub struct OutlookMailer<'a> {
    pub http: &'a reqwest::Client,
    pub api_base: &'a str,
    pub access_token: &'a str,
}

impl OutlookMailer<'_> {
    pub async fn send(&self, mail: &OutboundEmail) -> Result<SendReceipt, SendError> {
        let draft: Value = self
            .post_json(
                &format!("{}/me/messages", self.api_base),
                &draft_payload(mail),
            )
            .await?;

        let message_id = draft
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SendError::Message("draft response missing id".to_string()))?
            .to_string();
        let conversation_id = draft
            .get("conversationId")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        for att in &mail.attachments {
            let payload = json!({
                "@odata.type": "#microsoft.graph.fileAttachment",
                "name": att.filename,
                "contentType": att.content_type,
                "contentBytes": base64::engine::general_purpose::STANDARD.encode(&att.bytes),
            });
            self.post_json(
                &format!("{}/me/messages/{}/attachments", self.api_base, message_id),
                &payload,
            )
            .await?;
        }

        // the send call answers 202 with an empty body
        let resp = self
            .http
            .post(format!("{}/me/messages/{}/send", self.api_base, message_id))
            .bearer_auth(self.access_token)
            .body("")
            .send()
            .await?;
        check_status(resp.status())?;
        if !resp.status().is_success() {
            return Err(SendError::Rejected {
                status: resp.status().as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }

        Ok(SendReceipt {
            provider_message_id: Some(message_id),
            thread_id: conversation_id,
        })
    }

    async fn post_json(&self, url: &str, payload: &Value) -> Result<Value, SendError> {
        let resp = self
            .http
            .post(url)
            .bearer_auth(self.access_token)
            .json(payload)
            .send()
            .await?;
        let status = resp.status();
        check_status(status)?;
        if !status.is_success() {
            return Err(SendError::Rejected {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }
        Ok(resp.json().await?)
    }
}

fn check_status(status: StatusCode) -> Result<(), SendError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(SendError::Unauthorized(format!("graph returned {status}")));
    }
    Ok(())
}

fn draft_payload(mail: &OutboundEmail) -> Value {
    json!({
        "subject": mail.subject,
        "body": { "contentType": "HTML", "content": mail.body_html },
        "from": recipient(&mail.from),
        "toRecipients": [recipient(&mail.to)],
        "ccRecipients": mail.cc.iter().map(|a| bare_recipient(a)).collect::<Vec<_>>(),
        "bccRecipients": mail.bcc.iter().map(|a| bare_recipient(a)).collect::<Vec<_>>(),
    })
}

fn recipient(address: &Address) -> Value {
    if address.name.trim().is_empty() {
        bare_recipient(&address.addr)
    } else {
        json!({ "emailAddress": { "name": address.name, "address": address.addr } })
    }
}

fn bare_recipient(addr: &str) -> Value {
    json!({ "emailAddress": { "address": addr } })
}
