use thiserror::Error;

/// Failure taxonomy for outbound provider calls. The dispatch pass treats
/// `Unauthorized` specially (one token refresh, one retry); everything else
/// leaves the email queued for the next pass.
#[derive(Debug, Error)]
pub enum SendError {
    /// Provider rejected our credentials (401/403).
    #[error("provider rejected credentials: {0}")]
    Unauthorized(String),
    /// Provider refused the message itself.
    #[error("provider rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },
    /// Network-level failure, timeouts included.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The message could not be assembled into the provider's wire shape.
    #[error("message build error: {0}")]
    Message(String),
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("no refresh token on record")]
    NoRefreshToken,
    #[error("send method '{0}' does not use oauth tokens")]
    UnsupportedMethod(String),
    #[error("token endpoint returned {status}: {body}")]
    Refused { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("token store error: {0}")]
    Store(#[from] sqlx::Error),
}
