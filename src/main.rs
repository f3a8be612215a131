mod db;
mod frame;
mod routes;
mod services;
mod state;
mod wall;

use services::email_auth::{EmailConfig, SignUpPolicy};
use services::notify::{NotifyConfig, WebhookNotifier};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()
        .expect("invalid PORT");

    let pool = db::init_pool(&database_url)
        .await
        .expect("database init failed");

    // Notifications are optional: the wall works without them.
    let notify = match NotifyConfig::from_env().map(WebhookNotifier::new) {
        Some(Ok(notifier)) => {
            tracing::info!("notification webhook configured");
            Some(notifier.into_handle())
        }
        Some(Err(e)) => {
            tracing::warn!(error = %e, "notification webhook unusable, notifications disabled");
            None
        }
        None => {
            tracing::info!("NOTIFY_WEBHOOK_URL not set, notifications disabled");
            None
        }
    };

    let email = EmailConfig::from_env();
    if email.is_none() {
        tracing::warn!("RESEND_API_KEY/RESEND_FROM not set, email sign-in disabled");
    }

    let sign_up = SignUpPolicy::from_env();
    if sign_up.invite_code.is_none() {
        tracing::info!("INVITE_CODE not set, sign-up closed");
    }
    if let Some(owner) = &sign_up.owner_email {
        tracing::info!(%owner, "owner address configured");
    }

    let state = state::AppState::new(pool, notify, email, sign_up);

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "prayerwall listening");
    axum::serve(listener, app).await.expect("server failed");
}
