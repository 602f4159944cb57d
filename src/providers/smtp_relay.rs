use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::SendError;

/// Raw SMTP leaves this service over an internal HTTP relay. The relay
/// answers 200 even for SMTP-level failures and reports them in `status`.
pub struct SmtpRelayMailer<'a> {
    pub http: &'a reqwest::Client,
    pub relay_url: &'a str,
    pub timeout: Duration,
}

pub struct SmtpCredentials<'a> {
    pub host: &'a str,
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RelayRequest<'a> {
    servername: &'a str,
    email_user: &'a str,
    email_password: &'a str,
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct RelayResponse {
    status: bool,
    #[serde(default)]
    error: String,
}

impl SmtpRelayMailer<'_> {
    pub async fn send(
        &self,
        creds: &SmtpCredentials<'_>,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), SendError> {
        let request = RelayRequest {
            servername: creds.host,
            email_user: creds.username,
            email_password: creds.password,
            to,
            subject,
            body,
        };

        let resp = self
            .http
            .post(self.relay_url)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SendError::Rejected {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }

        let outcome: RelayResponse = resp.json().await?;
        if !outcome.status {
            return Err(SendError::Rejected {
                status: status.as_u16(),
                body: outcome.error,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_request_uses_the_agreed_field_names() {
        let request = RelayRequest {
            servername: "mail.agency.com",
            email_user: "desk@agency.com",
            email_password: "secret",
            to: "jo@paper.com",
            subject: "s",
            body: "<p>b</p>",
        };
        let value = serde_json::to_value(&request).unwrap();
        let obj = value.as_object().unwrap();
        for key in ["servername", "emailUser", "emailPassword", "to", "subject", "body"] {
            assert!(obj.contains_key(key), "missing {key}");
        }
        assert_eq!(obj.len(), 6);
        assert_eq!(obj["emailUser"], "desk@agency.com");
    }

    #[test]
    fn relay_response_error_defaults_to_empty() {
        let ok: RelayResponse = serde_json::from_str(r#"{"status":true}"#).unwrap();
        assert!(ok.status);
        assert!(ok.error.is_empty());

        let failed: RelayResponse =
            serde_json::from_str(r#"{"status":false,"error":"connect refused"}"#).unwrap();
        assert!(!failed.status);
        assert_eq!(failed.error, "connect refused");
    }
}
