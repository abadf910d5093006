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
use crate::bot::state::CastingDraft;
use crate::bot::state::ConversationState;
use crate::bot::state::Progress;
use crate::models::LeadSource;

#[instrument(skip(bot, dialogue, ctx, msg))]
pub(super) async fn handle_command(bot: Bot, dialogue: BotDialogue, ctx: SharedContext, msg: Message) -> HandlerResult {
  let user = msg.from.as_ref().context("message missing sender")?;
  ensure_user_record(&ctx, user).await?;
  start(&bot, &dialogue, msg.chat.id).await
}

pub(super) async fn start(bot: &Bot, dialogue: &BotDialogue, chat: ChatId) -> HandlerResult {
  let draft = CastingDraft::default();
  dialogue.update(ConversationState::MiniCasting(draft.clone())).await?;
  info!(chat_id = %chat, "started mini-casting");
  bot
    .send_message(chat, "🎬 Five quick questions and your application goes to the casting team. Type cancel to stop.")
    .await?;
  bot.send_message(chat, draft.prompt()).await?;
  Ok(())
}

#[instrument(skip(bot, dialogue, ctx, msg, draft))]
pub(super) async fn handle_message(
  bot: Bot,
  dialogue: BotDialogue,
  ctx: SharedContext,
  msg: Message,
  mut draft: CastingDraft,
) -> HandlerResult {
  let Some((user_id, text)) = flow_input(&bot, &dialogue, &msg).await? else {
    return Ok(());
  };
  let chat = msg.chat.id;
  info!(user_id, chat_id = %chat, stage = ?draft.stage, "handling mini-casting input");

  match draft.advance(&text) {
    Ok(Progress::Next) => {
      dialogue.update(ConversationState::MiniCasting(draft.clone())).await?;
      bot.send_message(chat, draft.prompt()).await?;
    },
    Ok(Progress::Complete) => {
      dialogue.reset().await?;
      let name = ctx.db().get_user(user_id).await?.map(|row| row.display_name());
      let payload = json!({
        "age": draft.age,
        "city": draft.city,
        "experience": draft.experience,
        "dream_role": draft.dream_role,
      });
      let lead_id = ctx
        .db()
        .create_lead(
          user_id,
          LeadSource::MiniCasting,
          name.as_deref(),
          draft.contact.as_deref(),
          &payload,
        )
        .await?;
      info!(user_id, lead_id, "mini-casting application stored");
      record_event(&ctx, Some(user_id), "casting_submitted", Some(json!({ "lead_id": lead_id }))).await;
      alert_admins(&bot, &ctx, &render_lead_alert(lead_id, name.as_deref(), &draft)).await;

      bot
        .send_message(chat, "🌟 Thank you! The casting team will contact you soon.")
        .reply_markup(menu::back_to_menu_keyboard())
        .await?;
    },
    Err(err) => send_input_error(&bot, chat, &err).await?,
  }
  Ok(())
}

fn render_lead_alert(lead_id: i64, name: Option<&str>, draft: &CastingDraft) -> String {
  let missing = "—";
  format!(
    "🎬 New mini-casting application #{lead_id}\n👤 {}\n🎂 {}\n🏙️ {}\n🎭 {}\n🌟 {}\n📇 {}",
    name.unwrap_or(missing),
    draft.age.map(|age| age.to_string()).unwrap_or_else(|| missing.to_string()),
    draft.city.as_deref().unwrap_or(missing),
    draft.experience.as_deref().unwrap_or(missing),
    draft.dream_role.as_deref().unwrap_or(missing),
    draft.contact.as_deref().unwrap_or(missing),
  )
}
