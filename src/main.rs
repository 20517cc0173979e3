use anyhow::anyhow;
use axum::Router;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nutria::config::AppConfig;
use nutria::http;
use nutria::infra::db::Db;
use nutria::infra::push::HttpPushGateway;
use nutria::infra::queue::SqsMailQueue;
use nutria::infra::repos::{PgAppointmentRepo, PgDeviceTokenRepo, PgUserRepo};
use nutria::jobs::reminder_sweep::{self, ReminderSweep};
use nutria::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let db = Db::connect(&config).await?;
    let mail = SqsMailQueue::new(&config).await?;
    let push = HttpPushGateway::new(&config)?;

    let state = AppState {
        users: Arc::new(PgUserRepo::new(db.clone())),
        appointments: Arc::new(PgAppointmentRepo::new(db.clone())),
        device_tokens: Arc::new(PgDeviceTokenRepo::new(db)),
        mail: Arc::new(mail),
        push: Arc::new(push),
        reminders: config.reminder_settings(),
        admin_token: config.admin_token.clone(),
        paseto_access_key: config.paseto_access_key,
    };

    match config.app_mode.as_str() {
        "api" => {
            let app: Router = http::router(state).layer(TraceLayer::new_for_http());
            let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
            tracing::info!("listening on {}", config.http_addr);

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        "worker" => {
            tracing::info!("starting worker mode");
            let sweep = ReminderSweep::new(&state);
            let every = Duration::from_secs(config.sweep_interval_seconds.max(60));
            tokio::select! {
                result = reminder_sweep::run(sweep, every) => {
                    result?;
                }
                _ = shutdown_signal() => {}
            }
        }
        "sweep" => {
            let report = ReminderSweep::new(&state).run_once(Utc::now()).await?;
            tracing::info!(failures = report.failures, "single sweep complete");
        }
        other => return Err(anyhow!("unknown APP_MODE: {}", other)),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
