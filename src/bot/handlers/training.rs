use anyhow::Context;
use chrono::Utc;
use serde_json::json;
use teloxide::prelude::*;
use teloxide::types::ChatId;
use teloxide::types::InlineKeyboardButton;
use teloxide::types::InlineKeyboardMarkup;
use tracing::info;
use tracing::instrument;

use super::BotDialogue;
use super::SharedContext;
use super::ensure_user_record;
use super::flow_input;
use super::record_event;
use super::send_input_error;
use crate::bot::HandlerResult;
use crate::bot::state::ConversationState;
use crate::bot::state::Progress;
use crate::bot::state::TrainingSession;
use crate::bot::state::TrainingStage;
use crate::drills;
use crate::drills::Drill;
use crate::models::ExperienceLevel;
use crate::util::local_date;
use crate::util::truncate_text;

#[instrument(skip(bot, dialogue, ctx, msg))]
pub(super) async fn handle_command(bot: Bot, dialogue: BotDialogue, ctx: SharedContext, msg: Message) -> HandlerResult {
  let user = msg.from.as_ref().context("message missing sender")?;
  ensure_user_record(&ctx, user).await?;
  start(&bot, &dialogue, &ctx, msg.chat.id, user.id.0 as i64).await
}

/// Opens a fresh training session and offers drills for the user's level.
pub(super) async fn start(
  bot: &Bot,
  dialogue: &BotDialogue,
  ctx: &SharedContext,
  chat: ChatId,
  user_id: i64,
) -> HandlerResult {
  let user = ctx.db().get_user(user_id).await?;
  let level = user
    .as_ref()
    .and_then(|row| row.experience)
    .unwrap_or(ExperienceLevel::Beginner);
  let today = local_date(Utc::now(), user.as_ref().and_then(|row| row.timezone.as_deref()));
  let featured = drills::drill_of_the_day(user_id, today);
  let scene = ctx.db().get_scene_state(user_id).await?;

  dialogue.update(ConversationState::Training(TrainingSession::default())).await?;
  info!(user_id, chat_id = %chat, level = %level, featured = featured.id, "started training session");

  let mut text = String::from("🎭 Pick a drill for today.");
  if let Some(last) = scene
    .as_ref()
    .and_then(|scene| scene.last_scene.as_deref())
    .and_then(drills::find)
  {
    text.push_str(&format!("\nLast time you worked on: {}.", last.title));
  }
  text.push_str(&format!("\n\n☀️ Drill of the day: {}", featured.title));

  bot
    .send_message(chat, text)
    .reply_markup(drill_picker_keyboard(featured, &drills::for_level(level)))
    .await?;
  Ok(())
}

#[instrument(skip(bot, dialogue, ctx, msg, session))]
pub(super) async fn handle_message(
  bot: Bot,
  dialogue: BotDialogue,
  ctx: SharedContext,
  msg: Message,
  session: TrainingSession,
) -> HandlerResult {
  let Some((user_id, text)) = flow_input(&bot, &dialogue, &msg).await? else {
    return Ok(());
  };
  apply_answer(&bot, &dialogue, &ctx, msg.chat.id, user_id, session, &text).await
}

/// Drill buttons work mid-session and also as a shortcut from an old picker message.
pub(super) async fn handle_drill_callback(
  bot: &Bot,
  dialogue: &BotDialogue,
  ctx: &SharedContext,
  chat: ChatId,
  user_id: i64,
  drill_id: &str,
) -> anyhow::Result<Option<String>> {
  if drills::find(drill_id).is_none() {
    return Ok(Some("❓ Drill not found".to_string()));
  }

  let session = match dialogue.get().await? {
    Some(ConversationState::Training(session)) if session.stage == TrainingStage::ChooseDrill => session,
    _ => TrainingSession::default(),
  };
  apply_answer(bot, dialogue, ctx, chat, user_id, session, drill_id).await?;
  Ok(Some("🎭 Drill selected.".to_string()))
}

async fn apply_answer(
  bot: &Bot,
  dialogue: &BotDialogue,
  ctx: &SharedContext,
  chat: ChatId,
  user_id: i64,
  mut session: TrainingSession,
  input: &str,
) -> HandlerResult {
  info!(user_id, chat_id = %chat, stage = ?session.stage, "handling training input");

  match session.advance(input) {
    Ok(Progress::Next) => {
      dialogue.update(ConversationState::Training(session.clone())).await?;
      match session.stage {
        TrainingStage::Performing => {
          let drill = session.drill().context("drill missing after selection")?;
          bot.send_message(chat, render_drill_card(drill)).await?;
        },
        TrainingStage::Reflection => {
          bot
            .send_message(
              chat,
              "📝 Great work! Now a short reflection: what felt natural, and what would you change next time?",
            )
            .await?;
        },
        TrainingStage::ChooseDrill => {},
      }
    },
    Ok(Progress::Complete) => finish(bot, dialogue, ctx, chat, user_id, &session).await?,
    Err(err) => send_input_error(bot, chat, &err).await?,
  }
  Ok(())
}

async fn finish(
  bot: &Bot,
  dialogue: &BotDialogue,
  ctx: &SharedContext,
  chat: ChatId,
  user_id: i64,
  session: &TrainingSession,
) -> HandlerResult {
  let drill = session.drill().context("training session finished without drill")?;
  let reflection = session.reflection.as_deref();

  let db = ctx.db();
  let timezone = db.get_user(user_id).await?.and_then(|row| row.timezone);
  let today = local_date(Utc::now(), timezone.as_deref());
  // the stored session still waits for a reflection, so a failed write can be retried
  let streak = db.complete_drill(user_id, drill.id, reflection, today).await?;
  dialogue.reset().await?;
  info!(user_id, chat_id = %chat, drill_id = drill.id, streak, "training session completed");
  record_event(
    ctx,
    Some(user_id),
    "drill_completed",
    Some(json!({ "drill_id": drill.id, "streak": streak })),
  )
  .await;

  bot
    .send_message(chat, completion_text(drill, streak))
    .reply_markup(InlineKeyboardMarkup::new(vec![vec![
      InlineKeyboardButton::callback("🔁 Another drill", "menu:train".to_string()),
      InlineKeyboardButton::callback("⬅️ Main menu", "menu:root".to_string()),
    ]]))
    .await?;
  Ok(())
}

fn drill_picker_keyboard(featured: &Drill, level_drills: &[&'static Drill]) -> InlineKeyboardMarkup {
  let mut rows = vec![vec![InlineKeyboardButton::callback(
    truncate_text(&format!("☀️ {}", featured.title), 48),
    format!("drill:{}", featured.id),
  )]];

  for drill in level_drills.iter().filter(|drill| drill.id != featured.id) {
    rows.push(vec![InlineKeyboardButton::callback(
      truncate_text(&format!("{} · {} min", drill.title, drill.duration_minutes), 48),
      format!("drill:{}", drill.id),
    )]);
  }

  rows.push(vec![InlineKeyboardButton::callback("⬅️ Main menu", "menu:root".to_string())]);
  InlineKeyboardMarkup::new(rows)
}

fn render_drill_card(drill: &Drill) -> String {
  format!(
    "🎬 {} ({} min)\n\n{}\n\nWhen you are done, send a couple of words about how it went (or just \"done\").",
    drill.title, drill.duration_minutes, drill.prompt
  )
}

fn completion_text(drill: &Drill, streak: i64) -> String {
  let mut text = format!("✅ \"{}\" completed.\n🔥 Streak: {} day(s).", drill.title, streak);
  if streak > 1 && streak % 7 == 0 {
    text.push_str("\n\n🏆 A full week in a row. Bravo!");
  }
  text
}

#[cfg(test)]
mod tests {
  use super::completion_text;
  use super::drill_picker_keyboard;
  use super::render_drill_card;
  use crate::drills;
  use crate::models::ExperienceLevel;

  #[test]
  fn picker_lists_featured_drill_once() {
    let beginner = drills::for_level(ExperienceLevel::Beginner);
    let featured = beginner[0];
    let keyboard = drill_picker_keyboard(featured, &beginner);
    // featured + remaining level drills + main menu
    assert_eq!(keyboard.inline_keyboard.len(), beginner.len() + 1);

    let other = drills::find("cold-read").unwrap();
    let keyboard = drill_picker_keyboard(other, &beginner);
    assert_eq!(keyboard.inline_keyboard.len(), beginner.len() + 2);
  }

  #[test]
  fn drill_card_contains_prompt() {
    let drill = drills::find("breath-box").unwrap();
    let text = render_drill_card(drill);
    assert!(text.contains("Box breathing"));
    assert!(text.contains(drill.prompt));
  }

  #[test]
  fn weekly_streak_is_celebrated() {
    let drill = drills::find("breath-box").unwrap();
    assert!(!completion_text(drill, 1).contains("week"));
    assert!(completion_text(drill, 14).contains("week"));
  }
}
