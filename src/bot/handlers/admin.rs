use anyhow::Context;
use serde_json::json;
use teloxide::prelude::*;
use teloxide::types::ChatId;
use teloxide::types::MessageEntity;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use super::BotDialogue;
use super::SharedContext;
use super::message_text;
use super::record_event;
use crate::bot::HandlerResult;
use crate::bot::state::ConversationState;
use crate::models::Stats;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct BroadcastReport {
  delivered: usize,
  failed: usize,
}

#[instrument(skip(bot, ctx, msg))]
pub(super) async fn handle_stats(bot: Bot, ctx: SharedContext, msg: Message) -> HandlerResult {
  let user = msg.from.as_ref().context("message missing sender")?;
  if !ctx.is_admin(user.id.0 as i64) {
    bot.send_message(msg.chat.id, "🛡️ Admins only.").await?;
    return Ok(());
  }
  send_stats(&bot, &ctx, msg.chat.id).await
}

#[instrument(skip(bot, ctx))]
pub(super) async fn send_stats(bot: &Bot, ctx: &SharedContext, chat: ChatId) -> HandlerResult {
  let stats = ctx.db().stats().await?;
  info!(chat_id = %chat, users = stats.users, "sending stats");
  bot.send_message(chat, render_stats(&stats)).await?;
  Ok(())
}

#[instrument(skip(bot, dialogue, ctx, msg))]
pub(super) async fn handle_broadcast_command(
  bot: Bot,
  dialogue: BotDialogue,
  ctx: SharedContext,
  msg: Message,
) -> HandlerResult {
  let user = msg.from.as_ref().context("message missing sender")?;
  let user_id = user.id.0 as i64;
  if !ctx.is_admin(user_id) {
    bot.send_message(msg.chat.id, "🛡️ Admins only.").await?;
    return Ok(());
  }

  dialogue
    .update(ConversationState::Broadcast { admin_tg_id: user_id })
    .await?;
  bot
    .send_message(
      msg.chat.id,
      "📢 Send the announcement text to broadcast to all users. Type cancel to stop.",
    )
    .await?;
  Ok(())
}

#[instrument(skip(bot, ctx, dialogue, msg))]
pub(super) async fn handle_broadcast_message(
  bot: Bot,
  dialogue: BotDialogue,
  ctx: SharedContext,
  msg: Message,
  admin_tg_id: i64,
) -> HandlerResult {
  let user = msg.from.as_ref().context("message missing sender")?;
  if user.id.0 as i64 != admin_tg_id {
    bot
      .send_message(msg.chat.id, "Only the admin who started this action can respond.")
      .await?;
    return Ok(());
  }

  let Some(raw_text) = message_text(&msg) else {
    bot
      .send_message(
        msg.chat.id,
        "📢 Send the announcement text (formatting will be preserved).",
      )
      .await?;
    return Ok(());
  };

  if crate::util::is_cancel(raw_text) {
    dialogue.reset().await?;
    bot.send_message(msg.chat.id, "❌ Broadcast cancelled.").await?;
    return Ok(());
  }

  let text = raw_text.to_string();
  let entities = broadcast_entities(&msg);

  let recipients = ctx.db().list_user_ids().await?;
  info!(
    admin_tg_id,
    recipient_count = recipients.len(),
    "preparing broadcast message"
  );

  if recipients.is_empty() {
    dialogue.reset().await?;
    bot
      .send_message(msg.chat.id, "📢 No users are registered to receive the announcement.")
      .await?;
    return Ok(());
  }

  let report = broadcast_text(
    &bot,
    &recipients,
    &text,
    (!entities.is_empty()).then_some(entities.as_slice()),
  )
  .await;
  dialogue.reset().await?;
  record_event(
    &ctx,
    Some(admin_tg_id),
    "broadcast_sent",
    Some(json!({ "delivered": report.delivered, "failed": report.failed })),
  )
  .await;

  bot
    .send_message(
      msg.chat.id,
      format!(
        "📢 Broadcast finished: {} delivered, {} failed.",
        report.delivered, report.failed
      ),
    )
    .await?;
  Ok(())
}

async fn broadcast_text(bot: &Bot, user_ids: &[i64], text: &str, entities: Option<&[MessageEntity]>) -> BroadcastReport {
  let mut report = BroadcastReport::default();
  let entity_payload = entities.map(|data| data.to_vec());
  for user_id in user_ids {
    let mut request = bot.send_message(ChatId(*user_id), text.to_string());
    if let Some(entities) = &entity_payload {
      request = request.entities(entities.clone());
    }
    match request.await {
      Ok(_) => report.delivered += 1,
      Err(err) => {
        report.failed += 1;
        warn!(error = %err, target_user_id = user_id, "failed to deliver broadcast");
      },
    }
  }
  info!(delivered = report.delivered, failed = report.failed, "broadcast finished");
  report
}

/// Formatting of the announcement, taken from the same source as its text.
fn broadcast_entities(msg: &Message) -> Vec<MessageEntity> {
  let entities = if msg.text().is_some() {
    msg.entities()
  } else {
    msg.caption_entities()
  };
  entities.map(|slice| slice.to_vec()).unwrap_or_default()
}

fn render_stats(stats: &Stats) -> String {
  let rating = stats
    .average_rating
    .map(|value| format!("{value:.2}"))
    .unwrap_or_else(|| "—".to_string());
  format!(
    "📊 Stats\n\n👥 Users: {} ({} onboarded)\n🎭 Drill runs: {}\n🎬 Leads: {}\n💬 Feedback: {} (avg {})\n🧾 Events: {}",
    stats.users, stats.onboarded_users, stats.drill_runs, stats.leads, stats.feedback, rating, stats.events
  )
}

#[cfg(test)]
mod tests {
  use serde_json::json;
  use teloxide::types::Message;
  use teloxide::types::MessageEntityKind;

  use super::broadcast_entities;
  use super::render_stats;
  use crate::models::Stats;

  fn message(extra: serde_json::Value) -> Message {
    let mut value = json!({
      "message_id": 10,
      "date": 1_700_000_000,
      "chat": { "id": 7, "type": "private", "first_name": "Admin" },
      "from": { "id": 7, "is_bot": false, "first_name": "Admin" }
    });
    if let (Some(base), Some(extra)) = (value.as_object_mut(), extra.as_object()) {
      base.extend(extra.clone());
    }
    serde_json::from_value(value).unwrap()
  }

  #[test]
  fn caption_broadcast_keeps_caption_formatting() {
    let msg = message(json!({
      "photo": [{ "file_id": "f", "file_unique_id": "u", "width": 10, "height": 10 }],
      "caption": "Rehearsal tonight",
      "caption_entities": [{ "type": "bold", "offset": 0, "length": 9 }]
    }));
    let entities = broadcast_entities(&msg);
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].kind, MessageEntityKind::Bold);
    assert_eq!(entities[0].length, 9);
  }

  #[test]
  fn text_broadcast_uses_text_entities() {
    let msg = message(json!({
      "text": "Rehearsal tonight",
      "entities": [{ "type": "italic", "offset": 10, "length": 7 }]
    }));
    let entities = broadcast_entities(&msg);
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].kind, MessageEntityKind::Italic);
  }

  #[test]
  fn renders_stats_with_average() {
    let stats = Stats {
      users: 10,
      onboarded_users: 7,
      events: 50,
      leads: 2,
      feedback: 3,
      drill_runs: 21,
      average_rating: Some(4.333),
    };
    let text = render_stats(&stats);
    assert!(text.contains("Users: 10 (7 onboarded)"));
    assert!(text.contains("avg 4.33"));
  }

  #[test]
  fn renders_stats_without_feedback() {
    let text = render_stats(&Stats::default());
    assert!(text.contains("avg —"));
  }
}
