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
use super::flow_input;
use super::menu;
use super::record_event;
use super::send_input_error;
use crate::bot::HandlerResult;
use crate::bot::state::ConversationState;
use crate::bot::state::OnboardingDraft;
use crate::bot::state::OnboardingStage;
use crate::bot::state::Progress;
use crate::models::ExperienceLevel;
use crate::util::InputError;

pub(super) async fn begin(bot: &Bot, dialogue: &BotDialogue, chat: ChatId, user_id: i64) -> HandlerResult {
  let draft = OnboardingDraft::default();
  dialogue.update(ConversationState::Onboarding(draft.clone())).await?;
  info!(user_id, chat_id = %chat, "started onboarding");
  send_prompt(bot, chat, &draft).await
}

#[instrument(skip(bot, dialogue, ctx, msg, draft))]
pub(super) async fn handle_message(
  bot: Bot,
  dialogue: BotDialogue,
  ctx: SharedContext,
  msg: Message,
  draft: OnboardingDraft,
) -> HandlerResult {
  let Some((user_id, text)) = flow_input(&bot, &dialogue, &msg).await? else {
    return Ok(());
  };
  apply_answer(&bot, &dialogue, &ctx, msg.chat.id, user_id, draft, &text).await
}

/// Feeds one answer (typed or from a button) into the onboarding draft and
/// writes the accepted field straight to the user row.
pub(super) async fn apply_answer(
  bot: &Bot,
  dialogue: &BotDialogue,
  ctx: &SharedContext,
  chat: ChatId,
  user_id: i64,
  mut draft: OnboardingDraft,
  input: &str,
) -> HandlerResult {
  let answered = draft.stage;
  info!(user_id, chat_id = %chat, stage = ?answered, "handling onboarding input");

  match draft.advance(input) {
    Ok(progress) => {
      if let Some(answer) = draft.answer_for(answered) {
        ctx.db().save_onboarding_answer(user_id, &answer).await?;
      }
      match progress {
        Progress::Next => {
          dialogue.update(ConversationState::Onboarding(draft.clone())).await?;
          send_prompt(bot, chat, &draft).await?;
        },
        Progress::Complete => finish(bot, dialogue, ctx, chat, user_id, &draft).await?,
      }
    },
    Err(InputError::ConsentDeclined) => {
      dialogue.reset().await?;
      info!(user_id, chat_id = %chat, "onboarding consent declined");
      record_event(ctx, Some(user_id), "consent_declined", None).await;
      bot
        .send_message(chat, InputError::ConsentDeclined.user_message())
        .await?;
    },
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
  draft: &OnboardingDraft,
) -> HandlerResult {
  ctx.db().set_consent(user_id, Utc::now()).await?;
  dialogue.reset().await?;
  info!(user_id, chat_id = %chat, "onboarding completed");
  record_event(
    ctx,
    Some(user_id),
    "onboarding_completed",
    Some(json!({
      "timezone": draft.timezone,
      "experience": draft.experience,
    })),
  )
  .await;

  let name = draft.name.as_deref().unwrap_or("friend");
  bot
    .send_message(chat, format!("🎉 Nice to meet you, {name}! Your first drill is waiting."))
    .await?;
  menu::send_main_menu_message(bot, ctx, chat, user_id).await
}

async fn send_prompt(bot: &Bot, chat: ChatId, draft: &OnboardingDraft) -> HandlerResult {
  let request = bot.send_message(chat, draft.prompt());
  match stage_keyboard(draft.stage) {
    Some(keyboard) => request.reply_markup(keyboard).await?,
    None => request.await?,
  };
  Ok(())
}

fn stage_keyboard(stage: OnboardingStage) -> Option<InlineKeyboardMarkup> {
  match stage {
    OnboardingStage::Experience => Some(InlineKeyboardMarkup::new(
      ExperienceLevel::ALL
        .iter()
        .map(|level| vec![InlineKeyboardButton::callback(level.label(), format!("exp:{}", level.as_str()))])
        .collect::<Vec<_>>(),
    )),
    OnboardingStage::Consent => Some(InlineKeyboardMarkup::new(vec![vec![
      InlineKeyboardButton::callback("✅ Yes", "consent:yes".to_string()),
      InlineKeyboardButton::callback("❌ No", "consent:no".to_string()),
    ]])),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use teloxide::types::InlineKeyboardButtonKind;

  use super::stage_keyboard;
  use crate::bot::state::OnboardingDraft;
  use crate::bot::state::OnboardingStage;

  fn callbacks(stage: OnboardingStage) -> Vec<String> {
    stage_keyboard(stage)
      .map(|keyboard| {
        keyboard
          .inline_keyboard
          .into_iter()
          .flatten()
          .filter_map(|button| match button.kind {
            InlineKeyboardButtonKind::CallbackData(data) => Some(data),
            _ => None,
          })
          .collect()
      })
      .unwrap_or_default()
  }

  #[test]
  fn button_payloads_are_valid_answers() {
    for stage in [OnboardingStage::Experience, OnboardingStage::Consent] {
      for data in callbacks(stage) {
        let (_, value) = data.split_once(':').unwrap();
        let mut draft = OnboardingDraft {
          stage,
          ..OnboardingDraft::default()
        };
        let result = draft.advance(value);
        assert!(
          result.is_ok() || value == "no",
          "button {data} is not accepted at {stage:?}"
        );
      }
    }
  }

  #[test]
  fn free_text_stages_have_no_keyboard() {
    assert!(stage_keyboard(OnboardingStage::Name).is_none());
    assert!(stage_keyboard(OnboardingStage::Timezone).is_none());
    assert_eq!(callbacks(OnboardingStage::Experience).len(), 3);
  }
}
