use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use serde_json::Value;
use teloxide::dispatching::UpdateHandler;
use teloxide::dispatching::dialogue::Dialogue;
use teloxide::dptree;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use teloxide::types::ChatId;
use teloxide::types::Message;
use teloxide::types::User;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use crate::bot::Command;
use crate::bot::DialogueStorage;
use crate::bot::HandlerResult;
use crate::bot::context::AppContext;
use crate::bot::state::ConversationState;
use crate::util::InputError;

mod admin;
mod casting;
mod feedback;
mod leader;
mod menu;
mod onboarding;
mod training;

type SharedContext = Arc<AppContext>;
type BotDialogue = Dialogue<ConversationState, DialogueStorage>;

pub fn build_schema() -> UpdateHandler<anyhow::Error> {
  let message_handler = Update::filter_message()
    .enter_dialogue::<Message, DialogueStorage, ConversationState>()
    .branch(command_branch())
    .branch(dptree::case![ConversationState::Onboarding(draft)].endpoint(onboarding::handle_message))
    .branch(dptree::case![ConversationState::Training(session)].endpoint(training::handle_message))
    .branch(dptree::case![ConversationState::MiniCasting(draft)].endpoint(casting::handle_message))
    .branch(dptree::case![ConversationState::Feedback(draft)].endpoint(feedback::handle_message))
    .branch(dptree::case![ConversationState::Leader(draft)].endpoint(leader::handle_message))
    .branch(dptree::case![ConversationState::Broadcast { admin_tg_id }].endpoint(admin::handle_broadcast_message))
    .branch(dptree::endpoint(handle_idle_text));

  let callback_handler = Update::filter_callback_query()
    .enter_dialogue::<CallbackQuery, DialogueStorage, ConversationState>()
    .endpoint(handle_callback_query);

  dptree::entry().branch(message_handler).branch(callback_handler)
}

fn command_branch() -> UpdateHandler<anyhow::Error> {
  dptree::entry()
    .filter_command::<Command>()
    .branch(dptree::case![Command::Start].endpoint(menu::handle_start))
    .branch(dptree::case![Command::Help].endpoint(menu::handle_help))
    .branch(dptree::case![Command::Menu].endpoint(menu::handle_menu))
    .branch(dptree::case![Command::Profile].endpoint(menu::handle_profile))
    .branch(dptree::case![Command::Cancel].endpoint(menu::handle_cancel))
    .branch(dptree::case![Command::Train].endpoint(training::handle_command))
    .branch(dptree::case![Command::Casting].endpoint(casting::handle_command))
    .branch(dptree::case![Command::Feedback].endpoint(feedback::handle_command))
    .branch(dptree::case![Command::Apply].endpoint(leader::handle_command))
    .branch(dptree::case![Command::Stats].endpoint(admin::handle_stats))
    .branch(dptree::case![Command::Broadcast].endpoint(admin::handle_broadcast_command))
}

#[instrument(skip(bot, msg))]
async fn handle_idle_text(bot: Bot, msg: Message, state: ConversationState) -> HandlerResult {
  if matches!(state, ConversationState::Idle)
    && let Some(text) = msg.text()
  {
    if text.starts_with('/') {
      // unknown command, ignore to let telegram handle
    } else {
      info!(chat_id = %msg.chat.id, "idle state received unrecognized message");
      bot
        .send_message(msg.chat.id, "I did not understand that. Open /menu to pick an exercise.")
        .await?;
    }
  }
  Ok(())
}

#[instrument(skip(bot, ctx, dialogue, query))]
async fn handle_callback_query(
  bot: Bot,
  ctx: SharedContext,
  query: CallbackQuery,
  dialogue: BotDialogue,
) -> HandlerResult {
  ensure_user_record(&ctx, &query.from).await?;
  let user_id = query.from.id.0 as i64;
  let message_ctx = query.message.as_ref().map(|message| (message.chat().id, message.id()));
  let chat_id = message_ctx.map(|(chat_id, _)| chat_id).unwrap_or(ChatId(user_id));
  let callback_data = query.data.as_deref().unwrap_or("<empty>");
  info!(user_id, chat_id = %chat_id, callback = callback_data, "handling callback query");

  let mut callback_text: Option<String> = None;

  if let Some(data) = query.data.as_deref()
    && let Some((prefix, value)) = data.split_once(':')
  {
    match prefix {
      "menu" => match value {
        "root" => {
          dialogue.reset().await?;
          match message_ctx {
            Some((chat_id, message_id)) => menu::show_main_menu(&bot, &ctx, chat_id, message_id, user_id).await?,
            None => menu::send_main_menu_message(&bot, &ctx, chat_id, user_id).await?,
          }
        },
        "train" => training::start(&bot, &dialogue, &ctx, chat_id, user_id).await?,
        "casting" => casting::start(&bot, &dialogue, chat_id).await?,
        "feedback" => feedback::start(&bot, &dialogue, chat_id).await?,
        "apply" => leader::start(&bot, &dialogue, chat_id).await?,
        "profile" => {
          menu::send_profile(&bot, &ctx, chat_id, user_id).await?;
          callback_text = Some("👤 Sent your profile.".to_string());
        },
        "stats" => {
          if ctx.is_admin(user_id) {
            admin::send_stats(&bot, &ctx, chat_id).await?;
          } else {
            callback_text = Some("🛡️ Admins only.".to_string());
          }
        },
        _ => {},
      },
      "drill" => {
        callback_text = training::handle_drill_callback(&bot, &dialogue, &ctx, chat_id, user_id, value).await?;
      },
      "exp" | "consent" | "rate" => match dialogue.get().await? {
        Some(state) if state.accepts_button(prefix) => match state {
          ConversationState::Onboarding(draft) => {
            onboarding::apply_answer(&bot, &dialogue, &ctx, chat_id, user_id, draft, value).await?;
          },
          ConversationState::Feedback(draft) => {
            feedback::apply_answer(&bot, &dialogue, &ctx, chat_id, user_id, draft, value).await?;
          },
          _ => {},
        },
        _ => {
          info!(user_id, callback = callback_data, "ignored stale answer button");
          callback_text = Some("⏳ This question has already been answered.".to_string());
        },
      },
      _ => {},
    }
  }

  if let Some(text) = callback_text {
    bot.answer_callback_query(query.id).text(text).await?;
  } else {
    bot.answer_callback_query(query.id).await?;
  }
  Ok(())
}

/// Shared prologue of every flow's message endpoint: sender id, trimmed text and cancel handling.
/// Returns `None` when the message was fully handled here.
async fn flow_input(bot: &Bot, dialogue: &BotDialogue, msg: &Message) -> Result<Option<(i64, String)>> {
  let user = msg.from.as_ref().context("message missing sender")?;
  let user_id = user.id.0 as i64;

  let Some(text) = message_text(msg).map(|t| t.trim()).filter(|t| !t.is_empty()) else {
    bot.send_message(msg.chat.id, InputError::Empty.user_message()).await?;
    return Ok(None);
  };

  if crate::util::is_cancel(text) {
    dialogue.reset().await?;
    info!(user_id, chat_id = %msg.chat.id, "flow cancelled by user");
    bot
      .send_message(msg.chat.id, "❌ Cancelled. Open /menu whenever you are ready.")
      .await?;
    return Ok(None);
  }

  Ok(Some((user_id, text.to_string())))
}

async fn ensure_user_record(ctx: &SharedContext, user: &User) -> Result<()> {
  ctx
    .db()
    .upsert_user(
      user.id.0 as i64,
      user.username.clone(),
      Some(user.first_name.clone()),
      user.last_name.clone(),
    )
    .await
    .context("failed to upsert user record")
}

/// Event rows are diagnostics only; a failed insert must never break the reply.
async fn record_event(ctx: &SharedContext, user_id: Option<i64>, kind: &str, payload: Option<Value>) {
  if let Err(err) = ctx.db().log_event(user_id, kind, payload.as_ref()).await {
    warn!(error = %err, kind, ?user_id, "failed to record event");
  }
}

async fn alert_admins(bot: &Bot, ctx: &SharedContext, text: &str) {
  for chat in ctx.alert_recipients() {
    if let Err(err) = bot.send_message(chat, text.to_string()).await {
      warn!(error = %err, chat_id = %chat, "failed to deliver admin alert");
    }
  }
}

async fn send_input_error(bot: &Bot, chat: ChatId, err: &InputError) -> HandlerResult {
  info!(chat_id = %chat, error = %err, "rejected flow input");
  bot.send_message(chat, err.user_message()).await?;
  Ok(())
}

fn message_text(msg: &Message) -> Option<&str> {
  msg.text().or_else(|| msg.caption())
}
