use std::sync::{Arc, Mutex};

use tracing_subscriber::EnvFilter;

use roombook::build_router;
use roombook::config::AppConfig;
use roombook::db;
use roombook::services::cache::AppCache;
use roombook::services::email::console::ConsoleMailer;
use roombook::services::email::emailjs::EmailJsProvider;
use roombook::services::email::EmailProvider;
use roombook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    // The database is a hard dependency; the mailer is not.
    let conn = db::init_db(&config.database_url)?;

    let mailer: Box<dyn EmailProvider> = if config.email_configured() {
        tracing::info!(service = %config.emailjs_service_id, "using EmailJS relay");
        Box::new(EmailJsProvider::new(
            config.emailjs_service_id.clone(),
            config.emailjs_public_key.clone(),
            config.emailjs_verify_template.clone(),
            config.emailjs_confirm_template.clone(),
        ))
    } else {
        tracing::warn!("email credentials not set; verification codes will be logged instead");
        Box::new(ConsoleMailer)
    };

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        mailer,
        cache: AppCache::new(),
    });

    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
