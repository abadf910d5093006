use anyhow::Context;
use teloxide::ApiError;
use teloxide::RequestError;
use teloxide::prelude::*;
use teloxide::types::ChatId;
use teloxide::types::InlineKeyboardButton;
use teloxide::types::InlineKeyboardMarkup;
use teloxide::types::MessageId;
use teloxide::utils::command::BotCommands;
use tracing::info;
use tracing::instrument;

use super::BotDialogue;
use super::SharedContext;
use super::ensure_user_record;
use super::onboarding;
use super::record_event;
use crate::bot::Command;
use crate::bot::HandlerResult;
use crate::drills;
use crate::models::DrillRunRow;
use crate::models::SceneStateRow;
use crate::models::UserRow;

const MAIN_MENU_TEXT: &str = "🎭 Elaya Stagecoach. What shall we work on today?";
const RECENT_RUNS: i64 = 3;

#[instrument(skip(bot, ctx, dialogue, msg))]
pub(super) async fn handle_start(bot: Bot, dialogue: BotDialogue, ctx: SharedContext, msg: Message) -> HandlerResult {
  dialogue.reset().await?;
  let user = msg.from.as_ref().context("message missing sender")?;
  ensure_user_record(&ctx, user).await?;
  let user_id = user.id.0 as i64;
  let username = user.username.as_deref().unwrap_or("-");
  info!(user_id, chat_id = %msg.chat.id, username, "received /start command");
  record_event(&ctx, Some(user_id), "start", None).await;

  let onboarded = ctx.db().get_user(user_id).await?.is_some_and(|row| row.is_onboarded());
  if onboarded {
    bot
      .send_message(msg.chat.id, format!("👋 Welcome back, {}!", user.first_name))
      .await?;
    send_main_menu_message(&bot, &ctx, msg.chat.id, user_id).await
  } else {
    onboarding::begin(&bot, &dialogue, msg.chat.id, user_id).await
  }
}

#[instrument(skip(bot, msg))]
pub(super) async fn handle_help(bot: Bot, msg: Message) -> HandlerResult {
  info!(chat_id = %msg.chat.id, "received /help command");
  let mut text = Command::descriptions().to_string();
  text.push_str("\n\nEvery exercise is also available from the /menu buttons. Type cancel to leave any questionnaire.");
  bot.send_message(msg.chat.id, text).await?;
  Ok(())
}

#[instrument(skip(bot, ctx, dialogue, msg))]
pub(super) async fn handle_menu(bot: Bot, dialogue: BotDialogue, ctx: SharedContext, msg: Message) -> HandlerResult {
  dialogue.reset().await?;
  let user = msg.from.as_ref().context("message missing sender")?;
  ensure_user_record(&ctx, user).await?;
  send_main_menu_message(&bot, &ctx, msg.chat.id, user.id.0 as i64).await
}

#[instrument(skip(bot, dialogue, msg))]
pub(super) async fn handle_cancel(bot: Bot, dialogue: BotDialogue, msg: Message) -> HandlerResult {
  let state = dialogue.get().await?.unwrap_or_default();
  dialogue.reset().await?;
  info!(chat_id = %msg.chat.id, state = ?state, "received /cancel command");
  bot
    .send_message(msg.chat.id, "❌ Cancelled. Open /menu whenever you are ready.")
    .await?;
  Ok(())
}

#[instrument(skip(bot, ctx, msg))]
pub(super) async fn handle_profile(bot: Bot, ctx: SharedContext, msg: Message) -> HandlerResult {
  let user = msg.from.as_ref().context("message missing sender")?;
  ensure_user_record(&ctx, user).await?;
  send_profile(&bot, &ctx, msg.chat.id, user.id.0 as i64).await
}

#[instrument(skip(bot, ctx))]
pub(super) async fn send_main_menu_message(bot: &Bot, ctx: &SharedContext, chat: ChatId, user_id: i64) -> HandlerResult {
  bot
    .send_message(chat, MAIN_MENU_TEXT)
    .reply_markup(main_menu_keyboard(ctx.is_admin(user_id)))
    .await?;
  info!(user_id, chat_id = %chat, "sent main menu message");
  Ok(())
}

#[instrument(skip(bot, ctx))]
pub(super) async fn show_main_menu(
  bot: &Bot,
  ctx: &SharedContext,
  chat: ChatId,
  message_id: MessageId,
  user_id: i64,
) -> HandlerResult {
  let request = bot
    .edit_message_text(chat, message_id, MAIN_MENU_TEXT)
    .reply_markup(main_menu_keyboard(ctx.is_admin(user_id)));
  match request.await {
    Ok(_) => info!(user_id, chat_id = %chat, message_id = %message_id, "updated main menu message"),
    Err(RequestError::Api(ApiError::MessageNotModified)) => {
      info!(user_id, chat_id = %chat, message_id = %message_id, "main menu message already current");
    },
    Err(err) => return Err(err.into()),
  }
  Ok(())
}

#[instrument(skip(bot, ctx))]
pub(super) async fn send_profile(bot: &Bot, ctx: &SharedContext, chat: ChatId, user_id: i64) -> HandlerResult {
  let user = ctx.db().get_user(user_id).await?.context("user missing after upsert")?;
  let scene = ctx.db().get_scene_state(user_id).await?;
  let runs = ctx.db().list_recent_drill_runs(user_id, RECENT_RUNS).await?;
  info!(user_id, chat_id = %chat, runs = runs.len(), "sending profile");
  bot
    .send_message(chat, render_profile(&user, scene.as_ref(), &runs))
    .reply_markup(back_to_menu_keyboard())
    .await?;
  Ok(())
}

pub(super) fn main_menu_keyboard(is_admin: bool) -> InlineKeyboardMarkup {
  let mut rows = vec![
    vec![
      InlineKeyboardButton::callback("🎭 Train", "menu:train".to_string()),
      InlineKeyboardButton::callback("🎬 Mini-casting", "menu:casting".to_string()),
    ],
    vec![
      InlineKeyboardButton::callback("💬 Feedback", "menu:feedback".to_string()),
      InlineKeyboardButton::callback("🧭 Lead a group", "menu:apply".to_string()),
    ],
    vec![InlineKeyboardButton::callback("👤 My profile", "menu:profile".to_string())],
  ];

  if is_admin {
    rows.push(vec![InlineKeyboardButton::callback("📊 Stats", "menu:stats".to_string())]);
  }

  InlineKeyboardMarkup::new(rows)
}

pub(super) fn back_to_menu_keyboard() -> InlineKeyboardMarkup {
  InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
    "⬅️ Main menu",
    "menu:root".to_string(),
  )]])
}

fn render_profile(user: &UserRow, scene: Option<&SceneStateRow>, runs: &[DrillRunRow]) -> String {
  let missing = "—";
  let mut text = format!("👤 {}\n", user.display_name());
  text.push_str(&format!("🕰️ Timezone: {}\n", user.timezone.as_deref().unwrap_or(missing)));
  text.push_str(&format!("🎯 Goal: {}\n", user.goal.as_deref().unwrap_or(missing)));
  text.push_str(&format!(
    "🎭 Experience: {}\n",
    user.experience.map_or(missing, |level| level.label())
  ));
  text.push_str(&format!("🔥 Streak: {} day(s)", user.streak));

  if let Some(scene) = scene
    && let Some(last_scene) = scene.last_scene.as_deref()
  {
    let title = drills::find(last_scene).map_or(last_scene, |drill| drill.title);
    text.push_str(&format!("\n\n🎬 Last scene: {title}"));
    if let Some(reflection) = scene.last_reflection.as_deref() {
      text.push_str(&format!("\n📝 {reflection}"));
    }
  }

  if !runs.is_empty() {
    text.push_str("\n\nRecent drills:");
    for run in runs {
      let title = drills::find(&run.drill_id).map_or(run.drill_id.as_str(), |drill| drill.title);
      text.push_str(&format!("\n• {} ({})", title, run.created_at.format("%Y-%m-%d")));
    }
  }

  if !user.is_onboarded() {
    text.push_str("\n\nℹ️ Finish onboarding with /start to save your progress.");
  }
  text
}

#[cfg(test)]
mod tests {
  use chrono::Utc;

  use super::main_menu_keyboard;
  use super::render_profile;
  use crate::models::DrillRunRow;
  use crate::models::ExperienceLevel;
  use crate::models::SceneStateRow;
  use crate::models::UserRow;

  fn user() -> UserRow {
    UserRow {
      id: 1,
      username: None,
      first_name: Some("Ann".into()),
      last_name: None,
      name: Some("Anna".into()),
      timezone: Some("UTC+03:00".into()),
      goal: None,
      experience: Some(ExperienceLevel::Beginner),
      streak: 4,
      last_drill_on: None,
      consent_at: Some(Utc::now()),
      created_at: Utc::now(),
    }
  }

  #[test]
  fn admin_menu_has_stats_button() {
    assert_eq!(main_menu_keyboard(false).inline_keyboard.len(), 3);
    assert_eq!(main_menu_keyboard(true).inline_keyboard.len(), 4);
  }

  #[test]
  fn profile_shows_streak_and_last_scene() {
    let scene = SceneStateRow {
      user_id: 1,
      last_scene: Some("subtext".into()),
      last_reflection: Some("Loved the secret".into()),
      updated_at: Utc::now(),
    };
    let runs = vec![DrillRunRow {
      id: 1,
      user_id: 1,
      drill_id: "breath-box".into(),
      reflection: None,
      created_at: Utc::now(),
    }];
    let text = render_profile(&user(), Some(&scene), &runs);
    assert!(text.starts_with("👤 Anna"));
    assert!(text.contains("Streak: 4"));
    assert!(text.contains("Last scene: One line, three subtexts"));
    assert!(text.contains("• Box breathing"));
    assert!(text.contains("Goal: —"));
    assert!(!text.contains("Finish onboarding"));
  }

  #[test]
  fn profile_nudges_unfinished_onboarding() {
    let mut row = user();
    row.consent_at = None;
    let text = render_profile(&row, None, &[]);
    assert!(text.contains("Finish onboarding"));
    assert!(!text.contains("Recent drills"));
  }
}
