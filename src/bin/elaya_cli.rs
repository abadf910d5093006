//! elaya_cli: query a running stagecoach instance over its HTTP surface.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use clap::Subcommand;
use reqwest::Client;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "elaya_cli")]
#[command(about = "Diagnostics for a running Elaya stagecoach bot", long_about = None)]
#[command(version)]
struct Cli {
  /// Base URL of the bot's HTTP server.
  #[arg(long, env = "ELAYA_URL", default_value = "http://127.0.0.1:8080", global = true)]
  url: String,
  /// Repeat the command every N seconds until interrupted.
  #[arg(long, global = true)]
  watch: Option<u64>,
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Print status diagnostics; exits non-zero when degraded or unreachable.
  Status,
  /// Check the liveness probe.
  Health,
  /// Trigger a content sync.
  Sync {
    #[arg(short, long, env = "SYNC_TOKEN")]
    token: Option<String>,
  },
}

#[tokio::main]
async fn main() -> ExitCode {
  dotenvy::dotenv().ok();
  let cli = Cli::parse();
  let client = Client::new();
  let base = cli.url.trim_end_matches('/').to_string();

  let Some(interval) = cli.watch else {
    let outcome = run(&client, &base, &cli.command).await;
    return ExitCode::from(exit_status(Some(&outcome)));
  };

  // ctrl-c reports whatever the most recent poll saw
  let mut last: Option<Result<bool>> = None;
  let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));
  loop {
    tokio::select! {
      _ = ticker.tick() => {
        last = Some(run(&client, &base, &cli.command).await);
      },
      _ = tokio::signal::ctrl_c() => return ExitCode::from(exit_status(last.as_ref())),
    }
  }
}

/// 0 when healthy, 1 when the target reported a problem, 2 when it could not be queried.
/// Nothing polled yet counts as healthy.
fn exit_status(outcome: Option<&Result<bool>>) -> u8 {
  match outcome {
    None | Some(Ok(true)) => 0,
    Some(Ok(false)) => 1,
    Some(Err(_)) => 2,
  }
}

/// Returns whether the target reported itself healthy.
async fn run(client: &Client, base: &str, command: &Commands) -> Result<bool> {
  let outcome = match command {
    Commands::Status => status(client, base).await,
    Commands::Health => health(client, base).await,
    Commands::Sync { token } => sync(client, base, token.as_deref()).await,
  };
  if let Err(err) = &outcome {
    eprintln!("error: {err:#}");
  }
  outcome
}

async fn status(client: &Client, base: &str) -> Result<bool> {
  let url = format!("{base}/api/status");
  let body: Value = client
    .get(&url)
    .send()
    .await
    .with_context(|| format!("{url} is unreachable"))?
    .error_for_status()?
    .json()
    .await
    .context("status response is not json")?;
  println!("{}", render_status(&body));
  Ok(body["status"] == "ok")
}

async fn health(client: &Client, base: &str) -> Result<bool> {
  let url = format!("{base}/healthz");
  let response = client.get(&url).send().await.with_context(|| format!("{url} is unreachable"))?;
  let status = response.status();
  let ok = status.is_success();
  println!("health: {}", if ok { "ok" } else { status.as_str() });
  Ok(ok)
}

async fn sync(client: &Client, base: &str, token: Option<&str>) -> Result<bool> {
  let url = format!("{base}/api/sync");
  let mut request = client.post(&url);
  if let Some(token) = token {
    request = request.bearer_auth(token);
  }
  let response = request.send().await.with_context(|| format!("{url} is unreachable"))?;
  let status = response.status();
  let body: Value = response.json().await.unwrap_or(Value::Null);
  if status.is_success() {
    println!("sync requested (dispatched: {})", body["dispatched"].as_bool().unwrap_or(false));
  } else {
    println!("sync failed: {status} {}", body["error"].as_str().unwrap_or(""));
  }
  Ok(status.is_success())
}

fn render_status(body: &Value) -> String {
  let text = |key: &str| body[key].as_str().unwrap_or("?").to_string();
  let mut lines = vec![
    format!("status:  {}", text("status")),
    format!("version: {}", text("version")),
    format!("mode:    {}", text("mode")),
    format!("uptime:  {}s", body["uptime_secs"].as_u64().unwrap_or(0)),
    format!("db:      {}", if body["db_ok"].as_bool().unwrap_or(false) { "ok" } else { "down" }),
  ];
  if let Some(counts) = body["counts"].as_object() {
    lines.push("counts:".to_string());
    for (key, value) in counts {
      lines.push(format!("  {key}: {value}"));
    }
  }
  lines.join("\n")
}

#[cfg(test)]
mod tests {
  use clap::Parser;
  use serde_json::json;

  use super::Cli;
  use super::Commands;
  use super::exit_status;
  use super::render_status;

  #[test]
  fn exit_status_follows_last_outcome() {
    assert_eq!(exit_status(None), 0);
    assert_eq!(exit_status(Some(&Ok(true))), 0);
    assert_eq!(exit_status(Some(&Ok(false))), 1);
    assert_eq!(exit_status(Some(&Err(anyhow::anyhow!("connection refused")))), 2);
  }

  #[test]
  fn renders_status_body() {
    let body = json!({
      "status": "degraded",
      "version": "0.1.0",
      "mode": "webhook",
      "uptime_secs": 90,
      "db_ok": false,
      "counts": null
    });
    let text = render_status(&body);
    assert!(text.contains("status:  degraded"));
    assert!(text.contains("uptime:  90s"));
    assert!(text.contains("db:      down"));
    assert!(!text.contains("counts:"));
  }

  #[test]
  fn renders_counts() {
    let body = json!({ "status": "ok", "db_ok": true, "counts": { "users": 3 } });
    assert!(render_status(&body).contains("  users: 3"));
  }

  #[test]
  fn parses_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from(["elaya_cli", "status", "--url", "http://bot:9000", "--watch", "5"]).unwrap();
    assert_eq!(cli.url, "http://bot:9000");
    assert_eq!(cli.watch, Some(5));
    assert!(matches!(cli.command, Commands::Status));
  }
}
