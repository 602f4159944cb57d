use serde_json::Value;
use sqlx::SqlitePool;
use tracing::info;

use crate::config::Config;
use crate::db::{self, queries};
use crate::error::TokenError;
use crate::models::user::{SendMethod, User};

/// Seconds before nominal expiry at which a token is treated as stale.
const EXPIRY_BUFFER_SECS: i64 = 300;

pub struct FreshToken {
    pub user: User,
    /// Whether this call already spent the one refresh the pass allows.
    pub refreshed: bool,
}

impl FreshToken {
    pub fn access_token(&self) -> &str {
        self.user.oauth_access_token.as_deref().unwrap_or_default()
    }
}

pub(crate) fn is_stale(expires_at: Option<i64>, now: i64) -> bool {
    expires_at
        .map(|exp| exp < now + EXPIRY_BUFFER_SECS)
        .unwrap_or(false)
}

/// Hand back a user whose access token is good for at least the buffer
/// window, refreshing (and persisting) at most once.
pub async fn ensure_fresh(
    pool: &SqlitePool,
    http: &reqwest::Client,
    config: &Config,
    user: User,
) -> Result<FreshToken, TokenError> {
    let usable = user
        .oauth_access_token
        .as_deref()
        .map(|t| !t.is_empty())
        .unwrap_or(false);
    if usable && !is_stale(user.oauth_token_expires_at, db::now_epoch()) {
        return Ok(FreshToken {
            user,
            refreshed: false,
        });
    }
    let user = refresh(pool, http, config, user).await?;
    Ok(FreshToken {
        user,
        refreshed: true,
    })
}

/// One refresh round-trip against the provider token endpoint. The new
/// access token is written onto the user row; when the provider omits a
/// refresh token the old one is kept.
pub async fn refresh(
    pool: &SqlitePool,
    http: &reqwest::Client,
    config: &Config,
    mut user: User,
) -> Result<User, TokenError> {
    let refresh_token = user
        .oauth_refresh_token
        .clone()
        .filter(|t| !t.is_empty())
        .ok_or(TokenError::NoRefreshToken)?;

    let (token_url, client_id, client_secret) = match user.method {
        SendMethod::Gmail => (
            config.google_token_url.as_str(),
            config.google_client_id.as_str(),
            config.google_client_secret.as_str(),
        ),
        SendMethod::Outlook => (
            config.microsoft_token_url.as_str(),
            config.microsoft_client_id.as_str(),
            config.microsoft_client_secret.as_str(),
        ),
        other => return Err(TokenError::UnsupportedMethod(other.as_str().to_string())),
    };

    let params = [
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token.as_str()),
        ("client_id", client_id),
        ("client_secret", client_secret),
    ];
    let resp = http.post(token_url).form(&params).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(TokenError::Refused {
            status: status.as_u16(),
            body: resp.text().await.unwrap_or_default(),
        });
    }

    let body: Value = resp.json().await?;
    let access_token = body
        .get("access_token")
        .and_then(|v| v.as_str())
        .ok_or_else(|| TokenError::Refused {
            status: status.as_u16(),
            body: "token response missing access_token".to_string(),
        })?
        .to_string();
    let new_refresh = body
        .get("refresh_token")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or(refresh_token);
    let expires_at = body
        .get("expires_in")
        .and_then(|v| v.as_i64())
        .map(|secs| db::now_epoch() + secs);

    queries::save_refreshed_token(pool, user.id, &access_token, &new_refresh, expires_at).await?;

    user.oauth_access_token = Some(access_token);
    user.oauth_refresh_token = Some(new_refresh);
    user.oauth_token_expires_at = expires_at;
    info!(user_id = user.id, method = user.method.as_str(), "oauth token refreshed");
    Ok(user)
}
