use anyhow::Context;
use serde_json::json;
use teloxide::prelude::*;
use teloxide::types::ChatId;
use tracing::info;
use tracing::instrument;

use super::BotDialogue;
use super::SharedContext;
use super::alert_admins;
use super::ensure_user_record;
use super::flow_input;
use super::menu;
use super::record_event;
use super::send_input_error;
use crate::bot::HandlerResult;
use crate::bot::state::ConversationState;
use crate::bot::state::LeaderDraft;
use crate::bot::state::Progress;
use crate::models::LeadSource;

#[instrument(skip(bot, dialogue, ctx, msg))]
pub(super) async fn handle_command(bot: Bot, dialogue: BotDialogue, ctx: SharedContext, msg: Message) -> HandlerResult {
  let user = msg.from.as_ref().context("message missing sender")?;
  ensure_user_record(&ctx, user).await?;
  start(&bot, &dialogue, msg.chat.id).await
}

pub(super) async fn start(bot: &Bot, dialogue: &BotDialogue, chat: ChatId) -> HandlerResult {
  let draft = LeaderDraft::default();
  dialogue.update(ConversationState::Leader(draft.clone())).await?;
  info!(chat_id = %chat, "started leader application");
  bot.send_message(chat, draft.prompt()).await?;
  Ok(())
}

#[instrument(skip(bot, dialogue, ctx, msg, draft))]
pub(super) async fn handle_message(
  bot: Bot,
  dialogue: BotDialogue,
  ctx: SharedContext,
  msg: Message,
  mut draft: LeaderDraft,
) -> HandlerResult {
  let Some((user_id, text)) = flow_input(&bot, &dialogue, &msg).await? else {
    return Ok(());
  };
  let chat = msg.chat.id;
  info!(user_id, chat_id = %chat, stage = ?draft.stage, "handling leader application input");

  match draft.advance(&text) {
    Ok(Progress::Next) => {
      dialogue.update(ConversationState::Leader(draft.clone())).await?;
      bot.send_message(chat, draft.prompt()).await?;
    },
    Ok(Progress::Complete) => {
      dialogue.reset().await?;
      let lead_id = ctx
        .db()
        .create_lead(
          user_id,
          LeadSource::Leader,
          draft.name.as_deref(),
          draft.contact.as_deref(),
          &json!({ "motivation": draft.motivation }),
        )
        .await?;
      info!(user_id, lead_id, "leader application stored");
      record_event(&ctx, Some(user_id), "leader_submitted", Some(json!({ "lead_id": lead_id }))).await;
      alert_admins(
        &bot,
        &ctx,
        &format!(
          "🧭 New leader application #{lead_id}\n👤 {}\n📇 {}\n💬 {}",
          draft.name.as_deref().unwrap_or("—"),
          draft.contact.as_deref().unwrap_or("—"),
          draft.motivation.as_deref().unwrap_or("—"),
        ),
      )
      .await;

      bot
        .send_message(chat, "✅ Application received. We will get back to you within a few days.")
        .reply_markup(menu::back_to_menu_keyboard())
        .await?;
    },
    Err(err) => send_input_error(&bot, chat, &err).await?,
  }
  Ok(())
}
