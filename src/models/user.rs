use serde::{Deserialize, Serialize};

/// Transport a user sends mail through.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SendMethod {
    Gmail,
    Outlook,
    Smtp,
    #[default]
    Sendgrid,
}

impl SendMethod {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "gmail" => Self::Gmail,
            "outlook" => Self::Outlook,
            "smtp" => Self::Smtp,
            _ => Self::Sendgrid,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gmail => "gmail",
            Self::Outlook => "outlook",
            Self::Smtp => "smtp",
            Self::Sendgrid => "sendgrid",
        }
    }
}

/// Sending identity, owned by the main app. This service reads these rows
/// and only ever writes the oauth token fields back after a refresh.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub method: SendMethod,
    #[serde(skip_serializing)]
    pub oauth_access_token: Option<String>,
    #[serde(skip_serializing)]
    pub oauth_refresh_token: Option<String>,
    pub oauth_token_expires_at: Option<i64>,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<i64>,
    pub smtp_username: Option<String>,
    #[serde(skip_serializing)]
    pub smtp_password: Option<String>,
    pub smtp_valid: bool,
    pub external_email: bool,
    /// Billing-derived quota key; `trial*` keys send through the sandboxed
    /// transactional API key.
    pub quota_key: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl User {
    pub fn new(email: &str, method: SendMethod) -> Self {
        let now = crate::db::now_epoch();
        User {
            id: 0,
            email: email.to_string(),
            name: String::new(),
            method,
            oauth_access_token: None,
            oauth_refresh_token: None,
            oauth_token_expires_at: None,
            smtp_host: None,
            smtp_port: None,
            smtp_username: None,
            smtp_password: None,
            smtp_valid: false,
            external_email: false,
            quota_key: "trial".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Transport actually used for this user's mail. BYO transports only
    /// apply to external-email accounts; everyone else sends through the
    /// transactional API.
    pub fn resolved_method(&self) -> SendMethod {
        if !self.external_email {
            return SendMethod::Sendgrid;
        }
        self.method
    }

    pub fn is_trial(&self) -> bool {
        self.quota_key.starts_with("trial")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_accounts_always_use_the_transactional_api() {
        let mut user = User::new("a@example.com", SendMethod::Gmail);
        assert_eq!(user.resolved_method(), SendMethod::Sendgrid);
        user.external_email = true;
        assert_eq!(user.resolved_method(), SendMethod::Gmail);
    }

    #[test]
    fn external_accounts_keep_their_configured_method() {
        let mut user = User::new("b@example.com", SendMethod::Smtp);
        user.external_email = true;
        assert_eq!(user.resolved_method(), SendMethod::Smtp);
    }

    #[test]
    fn trial_detection_is_prefix_based() {
        let mut user = User::new("c@example.com", SendMethod::Sendgrid);
        assert!(user.is_trial());
        user.quota_key = "trial-2026".to_string();
        assert!(user.is_trial());
        user.quota_key = "tier-1".to_string();
        assert!(!user.is_trial());
    }

    #[test]
    fn method_round_trips_through_strings() {
        for m in [
            SendMethod::Gmail,
            SendMethod::Outlook,
            SendMethod::Smtp,
            SendMethod::Sendgrid,
        ] {
            assert_eq!(SendMethod::from_str(m.as_str()), m);
        }
        assert_eq!(SendMethod::from_str("carrier-pigeon"), SendMethod::Sendgrid);
    }
}
