use std::env;

/// Runtime configuration, read once at startup and passed around explicitly.
/// Every value has a default so the service boots in dev without a .env;
/// provider endpoints are overridable so staging and tests can point at
/// stand-ins.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,

    // provider endpoints
    pub gmail_api_base: String,
    pub graph_api_base: String,
    pub sendgrid_api_base: String,
    pub google_token_url: String,
    pub microsoft_token_url: String,
    pub smtp_relay_url: String,

    // oauth app credentials for token refresh
    pub google_client_id: String,
    pub google_client_secret: String,
    pub microsoft_client_id: String,
    pub microsoft_client_secret: String,

    // transactional API keys; trial accounts send through the sandbox key
    pub sendgrid_api_key: String,
    pub sendgrid_sandbox_key: String,

    // internal collaborator services
    pub content_service_url: String,
    pub cache_service_url: String,
    pub push_gateway_url: String,
    pub search_indexer_url: String,

    pub send_timeout_secs: u64,
    pub relay_timeout_secs: u64,
    pub batch_write_timeout_secs: u64,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            database_url: env_or("DATABASE_URL", "sqlite://presshub_mailer.db"),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3030),

            gmail_api_base: env_or("GMAIL_API_BASE", "https://gmail.googleapis.com"),
            graph_api_base: env_or("GRAPH_API_BASE", "https://graph.microsoft.com/v1.0"),
            sendgrid_api_base: env_or("SENDGRID_API_BASE", "https://api.sendgrid.com"),
            google_token_url: env_or("GOOGLE_TOKEN_URL", "https://oauth2.googleapis.com/token"),
            microsoft_token_url: env_or(
                "MICROSOFT_TOKEN_URL",
                "https://login.microsoftonline.com/common/oauth2/v2.0/token",
            ),
            smtp_relay_url: env_or("SMTP_RELAY_URL", "http://localhost:3100/send"),

            google_client_id: env_or("GOOGLE_CLIENT_ID", ""),
            google_client_secret: env_or("GOOGLE_CLIENT_SECRET", ""),
            microsoft_client_id: env_or("MICROSOFT_CLIENT_ID", ""),
            microsoft_client_secret: env_or("MICROSOFT_CLIENT_SECRET", ""),

            sendgrid_api_key: env_or("SENDGRID_API_KEY", ""),
            sendgrid_sandbox_key: env_or("SENDGRID_SANDBOX_KEY", ""),

            content_service_url: env_or("CONTENT_SERVICE_URL", "http://localhost:3101"),
            cache_service_url: env_or("CACHE_SERVICE_URL", "http://localhost:3102"),
            push_gateway_url: env_or("PUSH_GATEWAY_URL", "http://localhost:3103"),
            search_indexer_url: env_or("SEARCH_INDEXER_URL", "http://localhost:3104"),

            send_timeout_secs: env::var("SEND_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            relay_timeout_secs: env::var("RELAY_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
            batch_write_timeout_secs: env::var("BATCH_WRITE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(120),
        }
    }
}
