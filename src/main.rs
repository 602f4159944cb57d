use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use presshub_mailer::config::Config;
use presshub_mailer::services::collaborators::{
    Collaborators, HttpContentService, HttpSearchIndexer, HttpSessionNotifier, HttpStatsCache,
};
use presshub_mailer::{db, routes, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,presshub_mailer=debug")),
        )
        .init();

    let config = Arc::new(Config::from_env());

    // sqlx expects sqlite://path or sqlite::memory:
    let db_url = normalize_sqlite_url(&config.database_url);
    if let Some(path) = db_file_path(&db_url) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        if !path.exists() {
            std::fs::File::create(&path).ok();
        }
    }

    let pool = db::connect(&db_url).await?;
    db::run_migrations(&pool).await?;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.send_timeout_secs))
        .build()?;

    let collaborators = Arc::new(Collaborators {
        content: Box::new(HttpContentService {
            http: http.clone(),
            base_url: config.content_service_url.clone(),
        }),
        cache: Box::new(HttpStatsCache {
            http: http.clone(),
            base_url: config.cache_service_url.clone(),
        }),
        notifier: Box::new(HttpSessionNotifier {
            http: http.clone(),
            base_url: config.push_gateway_url.clone(),
        }),
        indexer: Box::new(HttpSearchIndexer {
            http: http.clone(),
            base_url: config.search_indexer_url.clone(),
        }),
    });

    let state = AppState {
        pool,
        http,
        config: config.clone(),
        collaborators,
    };
    let app = routes::router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;
    let ctrl_c = async {
        signal::ctrl_c().await.ok();
    };
    #[cfg(unix)]
    let term = async {
        if let Ok(mut s) = signal::unix::signal(signal::unix::SignalKind::terminate()) {
            s.recv().await;
        }
    };
    #[cfg(not(unix))]
    let term = std::future::pending::<()>();
    tokio::select! { _ = ctrl_c => {}, _ = term => {} }
}

fn normalize_sqlite_url(input: &str) -> String {
    // Accept forms: sqlite:foo.db (fix), sqlite://foo.db (ok), file:foo.db (convert), just path (prepend)
    if input.starts_with("sqlite://") || input.starts_with("sqlite::memory:") {
        return input.to_string();
    }
    if input.starts_with("sqlite:") {
        let rest = input.trim_start_matches("sqlite:");
        return format!("sqlite://{}", rest.trim_start_matches('/'));
    }
    if input.starts_with("file:") {
        return format!("sqlite://{}", input.trim_start_matches("file:"));
    }
    format!("sqlite://{}", input)
}

fn db_file_path(url: &str) -> Option<std::path::PathBuf> {
    if let Some(rest) = url.strip_prefix("sqlite://") {
        if rest == ":memory:" {
            return None;
        }
        return Some(std::path::PathBuf::from(rest));
    }
    None
}
