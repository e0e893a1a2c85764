use std::sync::Arc;

use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use goodpoint_core::config::AppConfig;
use goodpoint_core::LedgerService;
use goodpoint_db::{DbPool, SqlLedgerStore};
use goodpoint_slack::commands::{CommandRouter, SlashCommandPayload};

use crate::health;
use crate::service::LedgerCommandService;

#[derive(Clone)]
struct AppState {
    dispatcher: Arc<CommandRouter<LedgerCommandService<SqlLedgerStore>>>,
    verification_token: Arc<SecretString>,
}

/// Builds the HTTP surface: the slash-command endpoint plus `/health`.
pub fn router(config: &AppConfig, db_pool: DbPool) -> Router {
    let ledger = LedgerService::new(SqlLedgerStore::new(db_pool.clone()));
    let dispatcher = Arc::new(CommandRouter::new(LedgerCommandService::new(ledger)));
    let state = AppState {
        dispatcher,
        verification_token: Arc::new(config.slack.verification_token.clone()),
    };

    Router::new()
        .route("/slack/command", post(slash_command))
        .with_state(state)
        .merge(health::router(db_pool))
}

/// The slash-command form fields this server reads. Slack sends more; serde
/// ignores the rest.
#[derive(Debug, Deserialize)]
struct SlashCommandForm {
    #[serde(default)]
    token: String,
    command: String,
    #[serde(default)]
    text: String,
    user_id: String,
    #[serde(default)]
    channel_id: String,
}

async fn slash_command(
    State(state): State<AppState>,
    Form(form): Form<SlashCommandForm>,
) -> Response {
    if form.token != *state.verification_token.expose_secret() {
        tracing::warn!(
            event_name = "slack.command.rejected_token",
            command = %form.command,
            "slash command carried an invalid verification token"
        );
        return (StatusCode::UNAUTHORIZED, "invalid verification token").into_response();
    }

    let payload = SlashCommandPayload {
        command: form.command,
        text: form.text,
        user_id: form.user_id,
        channel_id: form.channel_id,
    };

    match state.dispatcher.route(payload).await {
        Ok(message) => (StatusCode::OK, Json(message)).into_response(),
        Err(error) if error.is_rejection() => {
            (StatusCode::BAD_REQUEST, error.to_string()).into_response()
        }
        Err(error) => {
            tracing::error!(
                event_name = "slack.command.failed",
                error = %error,
                "slash command failed in the ledger"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, "the ledger could not process the command")
                .into_response()
        }
    }
}
