use reqwest::Client;
use reqwest::StatusCode;
use serde_json::json;
use thiserror::Error;
use tracing::info;
use tracing::instrument;

const GITHUB_API_BASE: &str = "https://api.github.com";
const DISPATCH_EVENT: &str = "elaya_sync";

#[derive(Debug, Error)]
pub enum SyncError {
  #[error("github request failed: {0}")]
  Request(#[from] reqwest::Error),
  #[error("github rejected dispatch ({status}): {body}")]
  Rejected { status: StatusCode, body: String },
}

/// Triggers a `repository_dispatch` workflow run on GitHub.
#[derive(Debug, Clone)]
pub struct GithubDispatch {
  client: Client,
  repo: String,
  token: String,
  api_base: String,
}

impl GithubDispatch {
  pub fn new(repo: String, token: String) -> Self {
    Self {
      client: Client::new(),
      repo,
      token,
      api_base: GITHUB_API_BASE.to_string(),
    }
  }

  #[cfg(test)]
  pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
    self.api_base = api_base.into();
    self
  }

  pub fn repo(&self) -> &str {
    &self.repo
  }

  fn dispatch_url(&self) -> String {
    format!("{}/repos/{}/dispatches", self.api_base.trim_end_matches('/'), self.repo)
  }

  #[instrument(skip(self), fields(repo = %self.repo))]
  pub async fn dispatch(&self) -> Result<(), SyncError> {
    let response = self
      .client
      .post(self.dispatch_url())
      .bearer_auth(&self.token)
      .header("Accept", "application/vnd.github+json")
      .header("User-Agent", concat!("elaya-stagecoach/", env!("CARGO_PKG_VERSION")))
      .json(&json!({ "event_type": DISPATCH_EVENT }))
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(SyncError::Rejected { status, body });
    }

    info!(%status, "repository dispatch accepted");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::GithubDispatch;
  use super::SyncError;

  #[test]
  fn builds_dispatch_url() {
    let dispatch = GithubDispatch::new("elaya/site".into(), "t".into());
    assert_eq!(dispatch.dispatch_url(), "https://api.github.com/repos/elaya/site/dispatches");

    let dispatch = dispatch.with_api_base("http://localhost:9999/");
    assert_eq!(dispatch.dispatch_url(), "http://localhost:9999/repos/elaya/site/dispatches");
  }

  #[tokio::test]
  async fn unreachable_api_is_request_error() {
    let dispatch = GithubDispatch::new("elaya/site".into(), "t".into()).with_api_base("http://127.0.0.1:1");
    let err = dispatch.dispatch().await.unwrap_err();
    assert!(matches!(err, SyncError::Request(_)));
  }
}
