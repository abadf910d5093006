//! HTTP surface running next to the bot: health and status probes, a small
//! dashboard, the sync trigger and the Telegram webhook receiver.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::response::Html;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use serde::Serialize;
use serde_json::json;
use teloxide::types::Update;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc::Sender;
use tokio::sync::mpsc::error::TrySendError;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::config::RunMode;
use crate::db::Db;
use crate::models::Stats;
use crate::sync::GithubDispatch;
use crate::sync::SyncError;

pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

#[derive(Debug, Error)]
pub enum WebError {
  #[error("unauthorized")]
  Unauthorized,
  #[error("webhook secret mismatch")]
  Forbidden,
  #[error("sync dispatch failed: {0}")]
  Dispatch(#[from] SyncError),
}

impl WebError {
  pub fn status_code(&self) -> StatusCode {
    match self {
      WebError::Unauthorized => StatusCode::UNAUTHORIZED,
      WebError::Forbidden => StatusCode::FORBIDDEN,
      WebError::Dispatch(_) => StatusCode::BAD_GATEWAY,
    }
  }
}

impl IntoResponse for WebError {
  fn into_response(self) -> Response {
    let status = self.status_code();
    (status, Json(json!({ "error": self.to_string() }))).into_response()
  }
}

#[derive(Debug, Clone, Default)]
pub struct WebhookSettings {
  pub secret: Option<String>,
  pub strict: bool,
}

#[derive(Clone)]
pub struct WebState {
  db: Db,
  mode: RunMode,
  started_at: Instant,
  webhook: Arc<WebhookSettings>,
  sync_token: Option<Arc<str>>,
  github: Option<GithubDispatch>,
  updates: Option<Sender<Update>>,
}

impl WebState {
  pub fn new(db: Db, mode: RunMode, webhook: WebhookSettings) -> Self {
    Self {
      db,
      mode,
      started_at: Instant::now(),
      webhook: Arc::new(webhook),
      sync_token: None,
      github: None,
      updates: None,
    }
  }

  pub fn with_sync(mut self, token: Option<String>, github: Option<GithubDispatch>) -> Self {
    self.sync_token = token.map(Arc::from);
    self.github = github;
    self
  }

  /// Updates accepted by the webhook endpoint are forwarded to this channel.
  /// A full channel makes the endpoint answer `{"ok":false}` instead of waiting.
  pub fn with_update_sender(mut self, sender: Sender<Update>) -> Self {
    self.updates = Some(sender);
    self
  }
}

#[derive(Debug, Serialize)]
struct StatusReport {
  status: &'static str,
  version: &'static str,
  mode: &'static str,
  uptime_secs: u64,
  db_ok: bool,
  counts: Option<Stats>,
}

pub fn router(state: WebState) -> Router {
  Router::new()
    .route("/healthz", get(healthz))
    .route("/api/status", get(api_status))
    .route("/status", get(status_page))
    .route("/api/sync", post(trigger_sync))
    .route("/tg/webhook", post(telegram_webhook))
    .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: WebState) -> anyhow::Result<()> {
  let listener = TcpListener::bind(addr)
    .await
    .with_context(|| format!("failed to bind http listener on {addr}"))?;
  info!(%addr, "http server listening");
  axum::serve(listener, router(state)).await.context("http server stopped")
}

async fn healthz() -> Json<serde_json::Value> {
  Json(json!({ "status": "ok" }))
}

async fn collect_status(state: &WebState) -> StatusReport {
  let db_ok = match state.db.ping().await {
    Ok(()) => true,
    Err(err) => {
      warn!(error = %err, "database ping failed");
      false
    },
  };
  let counts = if db_ok {
    match state.db.stats().await {
      Ok(stats) => Some(stats),
      Err(err) => {
        warn!(error = %err, "failed to collect stats");
        None
      },
    }
  } else {
    None
  };

  StatusReport {
    status: if db_ok { "ok" } else { "degraded" },
    version: env!("CARGO_PKG_VERSION"),
    mode: state.mode.as_str(),
    uptime_secs: state.started_at.elapsed().as_secs(),
    db_ok,
    counts,
  }
}

async fn api_status(State(state): State<WebState>) -> Json<StatusReport> {
  Json(collect_status(&state).await)
}

async fn status_page(State(state): State<WebState>) -> Html<String> {
  Html(render_status_page(&collect_status(&state).await))
}

fn render_status_page(report: &StatusReport) -> String {
  let counts = match &report.counts {
    Some(stats) => {
      let rating = stats
        .average_rating
        .map(|value| format!("{value:.2}"))
        .unwrap_or_else(|| "—".to_string());
      format!(
        "<tr><td>Users</td><td>{}</td></tr>\
         <tr><td>Onboarded</td><td>{}</td></tr>\
         <tr><td>Drill runs</td><td>{}</td></tr>\
         <tr><td>Leads</td><td>{}</td></tr>\
         <tr><td>Feedback</td><td>{} (avg {})</td></tr>\
         <tr><td>Events</td><td>{}</td></tr>",
        stats.users, stats.onboarded_users, stats.drill_runs, stats.leads, stats.feedback, rating, stats.events
      )
    },
    None => "<tr><td colspan=\"2\">counts unavailable</td></tr>".to_string(),
  };

  format!(
    r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<title>Elaya status</title>
<style>
body {{ font-family: system-ui, sans-serif; margin: 2rem; color: #222; }}
.ok {{ color: #1a7f37; }}
.degraded {{ color: #cf222e; }}
td {{ padding: 0.2rem 1rem 0.2rem 0; }}
</style>
</head>
<body>
<h1>Elaya <span class="{status}">{status}</span></h1>
<p>v{version} · {mode} · up {uptime}s · db {db}</p>
<table>{counts}</table>
</body>
</html>"#,
    status = report.status,
    version = report.version,
    mode = report.mode,
    uptime = report.uptime_secs,
    db = if report.db_ok { "ok" } else { "down" },
    counts = counts,
  )
}

async fn trigger_sync(State(state): State<WebState>, headers: HeaderMap) -> Result<Json<serde_json::Value>, WebError> {
  if let Some(expected) = state.sync_token.as_deref() {
    let provided = headers
      .get(AUTHORIZATION)
      .and_then(|value| value.to_str().ok())
      .and_then(|value| value.strip_prefix("Bearer "));
    if provided != Some(expected) {
      warn!("rejected sync request with missing or invalid token");
      return Err(WebError::Unauthorized);
    }
  }

  if let Err(err) = state.db.log_event(None, "sync_requested", None).await {
    warn!(error = %err, "failed to record sync event");
  }

  let dispatched = match &state.github {
    Some(github) => {
      if let Err(err) = github.dispatch().await {
        error!(error = %err, repo = github.repo(), "repository dispatch failed");
        return Err(err.into());
      }
      true
    },
    None => false,
  };

  info!(dispatched, "sync requested");
  Ok(Json(json!({ "ok": true, "dispatched": dispatched })))
}

async fn telegram_webhook(State(state): State<WebState>, headers: HeaderMap, body: Bytes) -> Response {
  if let Some(expected) = state.webhook.secret.as_deref() {
    let provided = headers.get(SECRET_HEADER).and_then(|value| value.to_str().ok());
    if provided != Some(expected) {
      warn!(strict = state.webhook.strict, "webhook secret mismatch, dropping update");
      if state.webhook.strict {
        return WebError::Forbidden.into_response();
      }
      return ack(false);
    }
  }

  let update: Update = match serde_json::from_slice(&body) {
    Ok(update) => update,
    Err(err) => {
      warn!(error = %err, body_len = body.len(), "malformed webhook body");
      return ack(false);
    },
  };

  let Some(sender) = &state.updates else {
    warn!("webhook update received while not in webhook mode");
    return ack(false);
  };

  match sender.try_send(update) {
    Ok(()) => ack(true),
    Err(TrySendError::Full(update)) => {
      warn!(update_id = ?update.id, "update queue is full, dropping update");
      ack(false)
    },
    Err(TrySendError::Closed(_)) => {
      error!("update worker is gone, dropping update");
      ack(false)
    },
  }
}

fn ack(ok: bool) -> Response {
  (StatusCode::OK, Json(json!({ "ok": ok }))).into_response()
}
