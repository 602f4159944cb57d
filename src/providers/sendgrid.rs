use base64::Engine;
use reqwest::StatusCode;
use serde_json::{json, Map, Value};

use super::{Address, OutboundEmail, SendReceipt};
use crate::error::SendError;

/// Transactional API transport. Acceptance is a 202 whose X-Message-Id
/// header becomes our stored correlation id; delivery webhooks later echo it
/// back as the prefix of `sg_message_id`.
pub struct SendgridMailer<'a> {
    pub http: &'a reqwest::Client,
    pub api_base: &'a str,
    pub api_key: &'a str,
}

impl SendgridMailer<'_> {
    pub async fn send(&self, mail: &OutboundEmail) -> Result<SendReceipt, SendError> {
        let url = format!("{}/v3/mail/send", self.api_base);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(self.api_key)
            .json(&mail_send_payload(mail))
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

        let message_id = resp
            .headers()
            .get("x-message-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(SendReceipt {
            provider_message_id: message_id,
            thread_id: None,
        })
    }
}

/// v3 mail/send body. Empty cc/bcc/attachments keys are omitted entirely;
/// the API rejects empty arrays.
fn mail_send_payload(mail: &OutboundEmail) -> Value {
    let mut personalization = Map::new();
    personalization.insert("to".to_string(), json!([address_obj(&mail.to)]));
    if !mail.cc.is_empty() {
        let cc: Vec<Value> = mail.cc.iter().map(|a| json!({ "email": a })).collect();
        personalization.insert("cc".to_string(), Value::Array(cc));
    }
    if !mail.bcc.is_empty() {
        let bcc: Vec<Value> = mail.bcc.iter().map(|a| json!({ "email": a })).collect();
        personalization.insert("bcc".to_string(), Value::Array(bcc));
    }

    let mut root = Map::new();
    root.insert(
        "personalizations".to_string(),
        json!([Value::Object(personalization)]),
    );
    root.insert("from".to_string(), address_obj(&mail.from));
    root.insert("subject".to_string(), json!(mail.subject));
    root.insert(
        "content".to_string(),
        json!([{ "type": "text/html", "value": mail.body_html }]),
    );
    if !mail.attachments.is_empty() {
        let attachments: Vec<Value> = mail
            .attachments
            .iter()
            .map(|a| {
                json!({
                    "content": base64::engine::general_purpose::STANDARD.encode(&a.bytes),
                    "type": a.content_type,
                    "filename": a.filename,
                })
            })
            .collect();
        root.insert("attachments".to_string(), Value::Array(attachments));
    }
    Value::Object(root)
}

fn address_obj(address: &Address) -> Value {
    if address.name.trim().is_empty() {
        json!({ "email": address.addr })
    } else {
        json!({ "email": address.addr, "name": address.name })
    }
}
