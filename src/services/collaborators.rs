use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

/// Verbs worth pushing to a listening session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventVerb {
    Open,
    Click,
    Bounce,
    Spam,
}

impl EventVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Click => "click",
            Self::Bounce => "bounce",
            Self::Spam => "spam",
        }
    }
}

/// One notable delivery change on one email.
#[derive(Debug, Clone)]
pub struct DeliveryNote {
    pub email_id: i64,
    pub verb: EventVerb,
    pub subject: String,
    pub to_addr: String,
}

/// Rejects malformed HTML before any transport call and renders the final
/// body for raw relay delivery (tracking pixels, footers).
#[async_trait]
pub trait ContentService: Send + Sync {
    async fn validate_html(&self, html: &str) -> Result<()>;
    async fn render_smtp_body(&self, email_id: i64, html: &str) -> Result<String>;
}

#[async_trait]
pub trait StatsCache: Send + Sync {
    async fn invalidate(&self, keys: &[String]) -> Result<()>;
}

#[async_trait]
pub trait SessionNotifier: Send + Sync {
    async fn notify(&self, user_id: i64, note: &DeliveryNote) -> Result<()>;
}

#[async_trait]
pub trait SearchIndexer: Send + Sync {
    async fn resync(&self, email_ids: &[i64]) -> Result<()>;
}

/// Bundle handed to the services. Built in main against the internal
/// service URLs.
pub struct Collaborators {
    pub content: Box<dyn ContentService>,
    pub cache: Box<dyn StatsCache>,
    pub notifier: Box<dyn SessionNotifier>,
    pub indexer: Box<dyn SearchIndexer>,
}

pub struct HttpContentService {
    pub http: reqwest::Client,
    pub base_url: String,
}

#[async_trait]
impl ContentService for HttpContentService {
    async fn validate_html(&self, html: &str) -> Result<()> {
        let resp = self
            .http
            .post(format!("{}/validate", self.base_url))
            .json(&json!({ "html": html }))
            .send()
            .await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("content service rejected body: {body}")
        }
    }

    async fn render_smtp_body(&self, email_id: i64, html: &str) -> Result<String> {
        let resp = self
            .http
            .post(format!("{}/render", self.base_url))
            .json(&json!({ "email_id": email_id, "html": html }))
            .send()
            .await?
            .error_for_status()?;
        let body: Value = resp.json().await?;
        body.get("html")
            .and_then(|h| h.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("render response missing html"))
    }
}

pub struct HttpStatsCache {
    pub http: reqwest::Client,
    pub base_url: String,
}

#[async_trait]
impl StatsCache for HttpStatsCache {
    async fn invalidate(&self, keys: &[String]) -> Result<()> {
        self.http
            .post(format!("{}/invalidate", self.base_url))
            .json(&json!({ "keys": keys }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

pub struct HttpSessionNotifier {
    pub http: reqwest::Client,
    pub base_url: String,
}

#[async_trait]
impl SessionNotifier for HttpSessionNotifier {
    /// Resolves the user's current channel lazily; a user with no live
    /// session is a normal outcome, not an error.
    async fn notify(&self, user_id: i64, note: &DeliveryNote) -> Result<()> {
        let resp = self
            .http
            .get(format!("{}/sessions/{}/channel", self.base_url, user_id))
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        let resp = resp.error_for_status()?;
        let body: Value = resp.json().await?;
        let Some(channel) = body.get("channel").and_then(|c| c.as_str()) else {
            return Ok(());
        };

        self.http
            .post(format!("{}/channels/{}/publish", self.base_url, channel))
            .json(&json!({
                "email_id": note.email_id,
                "event": note.verb.as_str(),
                "subject": note.subject,
                "to": note.to_addr,
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

pub struct HttpSearchIndexer {
    pub http: reqwest::Client,
    pub base_url: String,
}

#[async_trait]
impl SearchIndexer for HttpSearchIndexer {
    async fn resync(&self, email_ids: &[i64]) -> Result<()> {
        self.http
            .post(format!("{}/resync", self.base_url))
            .json(&json!({ "email_ids": email_ids }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
