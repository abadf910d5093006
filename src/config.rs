use std::env;
use std::net::SocketAddr;

use anyhow::Context;
use anyhow::Result;

const DEFAULT_DATABASE_URL: &str = "sqlite://elaya.db";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone)]
pub struct Config {
  pub bot_token: String,
  pub database_url: String,
  pub admins: Vec<i64>,
  pub alert_chat_id: Option<i64>,
  pub webhook_url: Option<String>,
  pub webhook_secret: Option<String>,
  pub webhook_strict_secret: bool,
  pub bind_addr: SocketAddr,
  pub sync_token: Option<String>,
  pub github: Option<GithubConfig>,
}

#[derive(Debug, Clone)]
pub struct GithubConfig {
  pub repo: String,
  pub token: String,
}

impl Config {
  pub fn from_env() -> Result<Self> {
    if let Err(err) = dotenvy::dotenv()
      && !err.not_found()
    {
      return Err(err).context("failed to load .env");
    }

    let bot_token = env::var("BOT_TOKEN")
      .or_else(|_| env::var("TELOXIDE_TOKEN"))
      .context("BOT_TOKEN or TELOXIDE_TOKEN must be set")?;
    let database_url = optional_var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
    let admins = parse_admins(&env::var("ADMIN_IDS").unwrap_or_default());
    let alert_chat_id = optional_var("ALERT_CHAT_ID")
      .map(|raw| raw.parse::<i64>())
      .transpose()
      .context("ALERT_CHAT_ID must be an integer chat id")?;
    let bind_addr = optional_var("BIND_ADDR")
      .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
      .parse::<SocketAddr>()
      .context("BIND_ADDR must look like host:port")?;
    let webhook_strict_secret = optional_var("WEBHOOK_STRICT_SECRET")
      .map(|raw| parse_bool(&raw, false))
      .unwrap_or(false);
    let github = match (optional_var("GITHUB_REPO"), optional_var("GITHUB_TOKEN")) {
      (Some(repo), Some(token)) => Some(GithubConfig { repo, token }),
      (Some(_), None) | (None, Some(_)) => {
        tracing::warn!("GITHUB_REPO and GITHUB_TOKEN must both be set, sync dispatch disabled");
        None
      },
      (None, None) => None,
    };

    Ok(Self {
      bot_token,
      database_url,
      admins,
      alert_chat_id,
      webhook_url: optional_var("WEBHOOK_URL"),
      webhook_secret: optional_var("WEBHOOK_SECRET"),
      webhook_strict_secret,
      bind_addr,
      sync_token: optional_var("SYNC_TOKEN"),
      github,
    })
  }

  pub fn mode(&self) -> RunMode {
    if self.webhook_url.is_some() { RunMode::Webhook } else { RunMode::Polling }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
  Polling,
  Webhook,
}

impl RunMode {
  pub fn as_str(&self) -> &'static str {
    match self {
      RunMode::Polling => "polling",
      RunMode::Webhook => "webhook",
    }
  }
}

fn optional_var(key: &str) -> Option<String> {
  env::var(key)
    .ok()
    .map(|value| value.trim().to_string())
    .filter(|value| !value.is_empty())
}

fn parse_admins(raw: &str) -> Vec<i64> {
  raw
    .split(',')
    .filter_map(|id| {
      let trimmed = id.trim();
      if trimmed.is_empty() {
        return None;
      }
      match trimmed.parse::<i64>() {
        Ok(value) => Some(value),
        Err(err) => {
          tracing::warn!(value = trimmed, error = %err, "invalid ADMIN_IDS entry");
          None
        },
      }
    })
    .collect()
}

pub(crate) fn parse_bool(raw: &str, default: bool) -> bool {
  match raw.trim().to_ascii_lowercase().as_str() {
    "1" | "true" | "yes" | "on" => true,
    "0" | "false" | "no" | "off" => false,
    other => {
      tracing::warn!(value = other, default, "unrecognized boolean, using default");
      default
    },
  }
}

#[cfg(test)]
mod tests {
  use super::RunMode;
  use super::parse_admins;
  use super::parse_bool;

  #[test]
  fn parses_valid_admins() {
    assert_eq!(parse_admins("10, 20 ,30"), vec![10, 20, 30]);
  }

  #[test]
  fn skips_invalid_admins() {
    assert_eq!(parse_admins("42,abc,  7,"), vec![42, 7]);
    assert!(parse_admins("").is_empty());
  }

  #[test]
  fn parses_booleans() {
    for raw in ["1", "TRUE", " yes ", "On"] {
      assert!(parse_bool(raw, false), "{raw}");
    }
    for raw in ["0", "False", "no", "OFF"] {
      assert!(!parse_bool(raw, true), "{raw}");
    }
  }

  #[test]
  fn unknown_boolean_falls_back_to_default() {
    assert!(parse_bool("maybe", true));
    assert!(!parse_bool("", false));
  }

  #[test]
  fn run_mode_names() {
    assert_eq!(RunMode::Polling.as_str(), "polling");
    assert_eq!(RunMode::Webhook.as_str(), "webhook");
  }
}
