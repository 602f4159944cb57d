use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle of an outbound email. The order is total and transitions only
/// move forward; `cancelled` and the failure flags live outside the stage.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type, Default,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum DeliveryStage {
    #[default]
    Draft,
    Queued,
    Dispatched,
    Delivered,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("delivery stage cannot move back from {from} to {to}")]
pub struct InvalidTransition {
    pub from: DeliveryStage,
    pub to: DeliveryStage,
}

impl DeliveryStage {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "queued" => Self::Queued,
            "dispatched" => Self::Dispatched,
            "delivered" => Self::Delivered,
            _ => Self::Draft,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Queued => "queued",
            Self::Dispatched => "dispatched",
            Self::Delivered => "delivered",
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::Draft => 0,
            Self::Queued => 1,
            Self::Dispatched => 2,
            Self::Delivered => 3,
        }
    }

    /// Forward-only transition check. `Ok(true)` means the move is a real
    /// change, `Ok(false)` means the email is already at (or past) the
    /// target and the request is an idempotent no-op.
    pub fn advance(self, to: DeliveryStage) -> Result<bool, InvalidTransition> {
        if to.rank() > self.rank() {
            Ok(true)
        } else if to.rank() == self.rank() {
            Ok(false)
        } else {
            Err(InvalidTransition { from: self, to })
        }
    }
}

impl std::fmt::Display for DeliveryStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Email {
    pub id: i64,
    pub created_by: i64,
    pub list_id: Option<i64>,
    pub contact_id: Option<i64>,
    pub from_name: String,
    pub from_addr: String,
    pub to_name: String,
    pub to_addr: String,
    /// JSON array of plain addresses.
    pub cc: String,
    pub bcc: String,
    pub subject: String,
    pub body_html: String,
    /// JSON array of file ids; bytes are resolved only at send time.
    pub attachment_ids: String,
    pub send_at: Option<i64>,
    pub cancelled: bool,
    pub stage: DeliveryStage,
    pub sent_via: Option<String>,
    pub provider_message_id: Option<String>,
    pub thread_id: Option<String>,
    pub bounced: bool,
    pub spam: bool,
    pub dropped: bool,
    pub failure_reason: Option<String>,
    pub opened_count: i64,
    pub clicked_count: i64,
    /// Provider-reported opens, kept apart from first-party tracker opens.
    pub provider_opened_count: i64,
    pub last_error: Option<String>,
    pub dispatched_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Email {
    /// Fresh draft owned by `created_by`. Callers set scheduling fields and
    /// queue it before it becomes eligible for dispatch.
    pub fn draft(created_by: i64, to_addr: &str, subject: &str, body_html: &str) -> Self {
        let now = crate::db::now_epoch();
        Email {
            id: 0,
            created_by,
            list_id: None,
            contact_id: None,
            from_name: String::new(),
            from_addr: String::new(),
            to_name: String::new(),
            to_addr: to_addr.to_string(),
            cc: "[]".to_string(),
            bcc: "[]".to_string(),
            subject: subject.to_string(),
            body_html: body_html.to_string(),
            attachment_ids: "[]".to_string(),
            send_at: None,
            cancelled: false,
            stage: DeliveryStage::Draft,
            sent_via: None,
            provider_message_id: None,
            thread_id: None,
            bounced: false,
            spam: false,
            dropped: false,
            failure_reason: None,
            opened_count: 0,
            clicked_count: 0,
            provider_opened_count: 0,
            last_error: None,
            dispatched_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn attachment_id_list(&self) -> Vec<i64> {
        serde_json::from_str(&self.attachment_ids).unwrap_or_default()
    }

    pub fn cc_list(&self) -> Vec<String> {
        serde_json::from_str(&self.cc).unwrap_or_default()
    }

    pub fn bcc_list(&self) -> Vec<String> {
        serde_json::from_str(&self.bcc).unwrap_or_default()
    }
}

/// Accumulated effect of one webhook batch on a single email row. Every
/// field is phrased so the SQL write stays monotonic: counters are deltas,
/// flags are set-only, the stage move is delivered-or-nothing.
#[derive(Debug, Default, Clone)]
pub struct EmailPatch {
    pub opened_add: i64,
    pub clicked_add: i64,
    pub provider_opened_add: i64,
    pub set_bounced: bool,
    pub set_spam: bool,
    pub set_dropped: bool,
    pub failure_reason: Option<String>,
    pub mark_delivered: bool,
}

impl EmailPatch {
    pub fn is_empty(&self) -> bool {
        self.opened_add == 0
            && self.clicked_add == 0
            && self.provider_opened_add == 0
            && !self.set_bounced
            && !self.set_spam
            && !self.set_dropped
            && self.failure_reason.is_none()
            && !self.mark_delivered
    }
}
