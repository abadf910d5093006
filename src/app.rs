use std::ops::ControlFlow;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use reqwest::Url;
use teloxide::dispatching::UpdateHandler;
use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::dptree;
use teloxide::error_handlers::ErrorHandler;
use teloxide::prelude::*;
use teloxide::types::Me;
use teloxide::types::Update;
use tokio::sync::mpsc;
use tokio::sync::mpsc::Receiver;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::alerts::AlertingErrorHandler;
use crate::bot;
use crate::bot::AppContext;
use crate::bot::DialogueStorage;
use crate::config::Config;
use crate::config::RunMode;
use crate::db::Db;
use crate::sync::GithubDispatch;
use crate::web;
use crate::web::WebState;
use crate::web::WebhookSettings;

/// Webhook updates waiting for the worker; beyond this the endpoint refuses new ones.
const WEBHOOK_QUEUE_CAPACITY: usize = 1024;

pub struct App {
  bot: Bot,
  db: Db,
  config: Config,
  context: Arc<AppContext>,
  handler: UpdateHandler<anyhow::Error>,
  error_handler: Arc<AlertingErrorHandler>,
}

impl App {
  pub fn new(bot: Bot, db: Db, config: Config) -> Self {
    let context = Arc::new(AppContext::new(db.clone(), config.admins.clone(), config.alert_chat_id));
    let error_handler = AlertingErrorHandler::new(bot.clone(), config.alert_chat_id);
    let handler = bot::build_schema();
    Self {
      bot,
      db,
      config,
      context,
      handler,
      error_handler,
    }
  }

  pub async fn run(self) -> Result<()> {
    let storage: Arc<DialogueStorage> = InMemStorage::new();
    let me = self.bot.get_me().await.context("failed to fetch bot identity")?;
    info!(username = ?me.username, mode = self.config.mode().as_str(), "bot identity resolved");

    match self.config.mode() {
      RunMode::Polling => self.run_polling(storage, me).await,
      RunMode::Webhook => self.run_webhook(storage, me).await,
    }
  }

  fn web_state(&self) -> WebState {
    let github = self
      .config
      .github
      .as_ref()
      .map(|github| GithubDispatch::new(github.repo.clone(), github.token.clone()));
    let webhook = WebhookSettings {
      secret: self.config.webhook_secret.clone(),
      strict: self.config.webhook_strict_secret,
    };
    WebState::new(self.db.clone(), self.config.mode(), webhook).with_sync(self.config.sync_token.clone(), github)
  }

  fn spawn_web(&self, state: WebState) -> tokio::task::JoinHandle<()> {
    let addr = self.config.bind_addr;
    tokio::spawn(async move {
      if let Err(err) = web::serve(addr, state).await {
        error!(error = ?err, "http server exited");
      }
    })
  }

  async fn run_polling(self, storage: Arc<DialogueStorage>, me: Me) -> Result<()> {
    let web_task = self.spawn_web(self.web_state());

    Dispatcher::builder(self.bot.clone(), self.handler)
      .dependencies(dptree::deps![self.context.clone(), storage, me])
      .error_handler(self.error_handler.clone())
      .enable_ctrlc_handler()
      .build()
      .dispatch()
      .await;

    web_task.abort();
    info!("polling dispatcher stopped");
    Ok(())
  }

  async fn run_webhook(self, storage: Arc<DialogueStorage>, me: Me) -> Result<()> {
    let raw_url = self.config.webhook_url.as_deref().context("WEBHOOK_URL must be set in webhook mode")?;
    let url = Url::parse(raw_url).with_context(|| format!("invalid WEBHOOK_URL: {raw_url}"))?;

    let (tx, rx) = mpsc::channel(WEBHOOK_QUEUE_CAPACITY);
    let web_task = self.spawn_web(self.web_state().with_update_sender(tx));

    let mut request = self.bot.set_webhook(url.clone());
    if let Some(secret) = &self.config.webhook_secret {
      request = request.secret_token(secret.clone());
    }
    request.await.context("failed to register webhook")?;
    info!(%url, "webhook registered");

    self.process_updates(rx, storage, me).await;

    web_task.abort();
    if let Err(err) = self.bot.delete_webhook().await {
      warn!(error = %err, "failed to delete webhook on shutdown");
    } else {
      info!("webhook deleted");
    }
    Ok(())
  }

  /// Runs the handler schema over queued updates one at a time until ctrl-c or the queue closes.
  async fn process_updates(&self, mut rx: Receiver<Update>, storage: Arc<DialogueStorage>, me: Me) {
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
      tokio::select! {
        next = rx.recv() => {
          let Some(update) = next else {
            info!("update queue closed");
            break;
          };
          self.dispatch_one(update, &storage, &me).await;
        },
        _ = &mut shutdown => {
          info!("shutdown signal received");
          break;
        },
      }
    }
  }

  async fn dispatch_one(&self, update: Update, storage: &Arc<DialogueStorage>, me: &Me) {
    let update_id = update.id;
    let mut deps = dptree::deps![self.bot.clone(), self.context.clone(), storage.clone(), me.clone()];
    deps.insert(update);

    match self.handler.dispatch(deps).await {
      ControlFlow::Break(Ok(())) => {},
      ControlFlow::Break(Err(err)) => self.error_handler.clone().handle_error(err).await,
      ControlFlow::Continue(_) => debug!(?update_id, "update was not handled"),
    }
  }
}
