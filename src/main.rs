mod alerts;
mod app;
mod bot;
mod config;
mod db;
mod drills;
mod models;
mod streak;
mod sync;
mod telemetry;
mod util;
mod web;

use anyhow::Result;
use teloxide::prelude::Bot;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
  telemetry::init()?;
  let config = config::Config::from_env()?;
  info!(
    admin_count = config.admins.len(),
    mode = config.mode().as_str(),
    bind_addr = %config.bind_addr,
    "starting elaya stagecoach"
  );

  let bot = Bot::new(config.bot_token.clone());
  let db = db::Db::connect(&config.database_url).await?;
  let app = app::App::new(bot, db, config);
  app.run().await
}
