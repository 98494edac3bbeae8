mod app;
mod auth;
mod config;
mod error;
mod extract;
mod pagination;
mod qr;
mod setup;
mod state;
mod users;

use crate::state::AppState;

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "qr_event_manager=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let app_state = AppState::init().await?;

    if let Err(e) = app_state.migrate().await {
        tracing::warn!(error = %e, "migration failed; continuing");
    }

    // `qr-event-manager create-admin` bootstraps the admin account and exits.
    if std::env::args().nth(1).as_deref() == Some("create-admin") {
        let outcome = setup::services::ensure_admin(&app_state.db, &app_state.config.admin).await?;
        tracing::info!(
            email = %outcome.admin.email,
            role = ?outcome.admin.role,
            "{}",
            outcome.action.message()
        );
        return Ok(());
    }

    let app = app::build_app(app_state);
    app::serve(app).await
}
