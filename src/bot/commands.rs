use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
  /// Start or restart onboarding
  Start,
  /// Show the help text
  Help,
  /// Open the main menu
  Menu,
  /// Run a training drill
  Train,
  /// Take the mini-casting questionnaire
  Casting,
  /// Leave feedback about the bot
  Feedback,
  /// Apply to lead an Elaya group
  Apply,
  /// Show your profile and streak
  Profile,
  /// Abort the current flow
  Cancel,
  /// Usage statistics (admins only)
  Stats,
  /// Send a message to every user (admins only)
  Broadcast,
}

#[cfg(test)]
mod tests {
  use teloxide::utils::command::BotCommands;

  use super::Command;

  #[test]
  fn parses_lowercase_commands() {
    assert_eq!(Command::parse("/train", "elaya_bot").ok(), Some(Command::Train));
    assert_eq!(Command::parse("/apply@elaya_bot", "elaya_bot").ok(), Some(Command::Apply));
    assert!(Command::parse("/dance", "elaya_bot").is_err());
  }

  #[test]
  fn descriptions_list_every_flow() {
    let text = Command::descriptions().to_string();
    for name in ["/train", "/casting", "/feedback", "/apply", "/profile"] {
      assert!(text.contains(name), "missing {name}");
    }
  }
}
