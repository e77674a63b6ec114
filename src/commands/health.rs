//! Simple HTTP health check server.
//!
//! Serves `/ping`, running an optional check command per request. A
//! failing check answers 503 and triggers the optional failure command so
//! supervisors can hook recovery actions onto probes.

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use clap::Args;
use serde::Serialize;
use tracing::{info, warn};

/// Serve a simple HTTP health check endpoint.
#[derive(Debug, Args)]
pub struct HealthCommand {
    /// Port to listen on.
    #[arg(long = "listen-port", short = 'p', default_value_t = 1620)]
    listen_port: u16,

    /// Command to execute for each check.
    #[arg(long = "check-command")]
    check_command: Option<String>,

    /// Command to execute when the check fails.
    #[arg(long = "on-failure-command")]
    on_failure_command: Option<String>,
}

#[derive(Clone)]
struct HealthState {
    check_command: Option<String>,
    on_failure_command: Option<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    #[serde(rename = "type")]
    message: String,
    status: u16,
    code: String,
}

impl HealthCommand {
    pub async fn run(self) -> Result<()> {
        let state = HealthState {
            check_command: self.check_command,
            on_failure_command: self.on_failure_command,
        };

        let app = Router::new().route("/ping", get(ping)).with_state(state);

        let listener = tokio::net::TcpListener::bind(("0.0.0.0", self.listen_port)).await?;
        info!(port = self.listen_port, "health endpoint listening");

        axum::serve(listener, app).await?;
        Ok(())
    }
}

async fn ping(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    if run_command(state.check_command.as_deref()).await {
        (
            StatusCode::OK,
            Json(HealthResponse {
                message: "OK".to_string(),
                status: 200,
                code: "OK".to_string(),
            }),
        )
    } else {
        warn!("health check command failed");
        let recovered = run_command(state.on_failure_command.as_deref()).await;
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                message: if recovered {
                    "failed health check; failure command ran".to_string()
                } else {
                    "failed health check; failure command also failed".to_string()
                },
                status: 503,
                code: "Service Unavailable".to_string(),
            }),
        )
    }
}

/// Run a check command; no command configured counts as success.
async fn run_command(command: Option<&str>) -> bool {
    let Some(command) = command else {
        return true;
    };

    match tokio::process::Command::new(command).status().await {
        Ok(status) => status.success(),
        Err(e) => {
            warn!(command = %command, error = %e, "failed to run command");
            false
        }
    }
}
