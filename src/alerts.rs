use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use teloxide::error_handlers::ErrorHandler;
use teloxide::prelude::*;
use teloxide::types::ChatId;
use tracing::error;
use tracing::warn;

use crate::util::truncate_text;

const MAX_ALERT_CHARS: usize = 3500;

/// Logs dispatcher errors and mirrors them into the alert chat when one is configured.
pub struct AlertingErrorHandler {
  bot: Bot,
  alert_chat: Option<ChatId>,
}

impl AlertingErrorHandler {
  pub fn new(bot: Bot, alert_chat: Option<i64>) -> Arc<Self> {
    Arc::new(Self {
      bot,
      alert_chat: alert_chat.map(ChatId),
    })
  }
}

impl ErrorHandler<anyhow::Error> for AlertingErrorHandler {
  fn handle_error(self: Arc<Self>, err: anyhow::Error) -> BoxFuture<'static, ()> {
    async move {
      error!(error = ?err, "update handler failed");
      let Some(chat) = self.alert_chat else {
        return;
      };
      if let Err(send_err) = self.bot.send_message(chat, alert_text(&err)).await {
        warn!(error = %send_err, chat_id = %chat, "failed to deliver error alert");
      }
    }
    .boxed()
  }
}

fn alert_text(err: &anyhow::Error) -> String {
  truncate_text(&format!("⚠️ Handler error\n\n{err:#}"), MAX_ALERT_CHARS)
}

#[cfg(test)]
mod tests {
  use anyhow::Context;
  use anyhow::anyhow;

  use super::MAX_ALERT_CHARS;
  use super::alert_text;

  #[test]
  fn alert_includes_error_chain() {
    let err = Err::<(), _>(anyhow!("disk full")).context("failed to save lead").unwrap_err();
    let text = alert_text(&err);
    assert!(text.contains("failed to save lead: disk full"));
  }

  #[test]
  fn alert_is_truncated() {
    let err = anyhow!("x".repeat(10_000));
    assert!(alert_text(&err).chars().count() <= MAX_ALERT_CHARS);
  }
}
