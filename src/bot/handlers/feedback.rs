use anyhow::Context;
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
use super::menu;
use super::record_event;
use super::send_input_error;
use crate::bot::HandlerResult;
use crate::bot::state::ConversationState;
use crate::bot::state::FeedbackDraft;
use crate::bot::state::Progress;

#[instrument(skip(bot, dialogue, ctx, msg))]
pub(super) async fn handle_command(bot: Bot, dialogue: BotDialogue, ctx: SharedContext, msg: Message) -> HandlerResult {
  let user = msg.from.as_ref().context("message missing sender")?;
  ensure_user_record(&ctx, user).await?;
  start(&bot, &dialogue, msg.chat.id).await
}

pub(super) async fn start(bot: &Bot, dialogue: &BotDialogue, chat: ChatId) -> HandlerResult {
  dialogue.update(ConversationState::Feedback(FeedbackDraft::default())).await?;
  info!(chat_id = %chat, "started feedback collection");
  bot
    .send_message(chat, "💬 How do you like the training so far? Rate from 1 to 5.")
    .reply_markup(rating_keyboard())
    .await?;
  Ok(())
}

#[instrument(skip(bot, dialogue, ctx, msg, draft))]
pub(super) async fn handle_message(
  bot: Bot,
  dialogue: BotDialogue,
  ctx: SharedContext,
  msg: Message,
  draft: FeedbackDraft,
) -> HandlerResult {
  let Some((user_id, text)) = flow_input(&bot, &dialogue, &msg).await? else {
    return Ok(());
  };
  apply_answer(&bot, &dialogue, &ctx, msg.chat.id, user_id, draft, &text).await
}

pub(super) async fn apply_answer(
  bot: &Bot,
  dialogue: &BotDialogue,
  ctx: &SharedContext,
  chat: ChatId,
  user_id: i64,
  mut draft: FeedbackDraft,
  input: &str,
) -> HandlerResult {
  info!(user_id, chat_id = %chat, stage = ?draft.stage, "handling feedback input");

  match draft.advance(input) {
    Ok(Progress::Next) => {
      dialogue.update(ConversationState::Feedback(draft)).await?;
      bot
        .send_message(chat, "✍️ Anything you would like to add? Send a comment, or \"-\" to skip.")
        .await?;
    },
    Ok(Progress::Complete) => {
      dialogue.reset().await?;
      let rating = draft.rating.context("feedback completed without rating")?;
      let feedback_id = ctx
        .db()
        .create_feedback(user_id, rating, draft.comment.as_deref())
        .await?;
      info!(user_id, feedback_id, rating, "feedback stored");
      record_event(
        ctx,
        Some(user_id),
        "feedback_submitted",
        Some(json!({ "feedback_id": feedback_id, "rating": rating })),
      )
      .await;
      bot
        .send_message(chat, thank_you_text(rating))
        .reply_markup(menu::back_to_menu_keyboard())
        .await?;
    },
    Err(err) => send_input_error(bot, chat, &err).await?,
  }
  Ok(())
}

fn rating_keyboard() -> InlineKeyboardMarkup {
  InlineKeyboardMarkup::new(vec![
    (1 ..= 5)
      .map(|n| InlineKeyboardButton::callback(n.to_string(), format!("rate:{n}")))
      .collect::<Vec<_>>(),
  ])
}

fn thank_you_text(rating: u8) -> &'static str {
  if rating <= 3 {
    "🙏 Thank you for being honest. We read every comment and will make it better."
  } else {
    "🙏 Thank you! Glad the training helps."
  }
}

#[cfg(test)]
mod tests {
  use super::rating_keyboard;
  use super::thank_you_text;

  #[test]
  fn rating_keyboard_is_one_row_of_five() {
    let keyboard = rating_keyboard();
    assert_eq!(keyboard.inline_keyboard.len(), 1);
    assert_eq!(keyboard.inline_keyboard[0].len(), 5);
  }

  #[test]
  fn low_ratings_get_apology() {
    assert!(thank_you_text(2).contains("honest"));
    assert!(!thank_you_text(5).contains("honest"));
  }
}
