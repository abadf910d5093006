use std::fmt;

use chrono::DateTime;
use chrono::NaiveDate;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ExperienceLevel {
  Beginner,
  Intermediate,
  Advanced,
}

impl ExperienceLevel {
  pub const ALL: [ExperienceLevel; 3] = [Self::Beginner, Self::Intermediate, Self::Advanced];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Beginner => "beginner",
      Self::Intermediate => "intermediate",
      Self::Advanced => "advanced",
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      Self::Beginner => "🌱 Beginner",
      Self::Intermediate => "🎭 Some stage experience",
      Self::Advanced => "🏆 Advanced",
    }
  }
}

impl fmt::Display for ExperienceLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserRow {
  pub id: i64, // tg id
  pub username: Option<String>,
  pub first_name: Option<String>,
  pub last_name: Option<String>,
  pub name: Option<String>,
  pub timezone: Option<String>,
  pub goal: Option<String>,
  pub experience: Option<ExperienceLevel>,
  pub streak: i64,
  pub last_drill_on: Option<NaiveDate>,
  pub consent_at: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
}

impl UserRow {
  pub fn is_onboarded(&self) -> bool {
    self.consent_at.is_some()
  }

  /// Name chosen during onboarding, falling back to the Telegram profile.
  pub fn display_name(&self) -> String {
    self
      .name
      .clone()
      .or_else(|| self.first_name.clone())
      .or_else(|| self.username.as_ref().map(|username| format!("@{username}")))
      .unwrap_or_else(|| format!("#{}", self.id))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadSource {
  MiniCasting,
  Leader,
}

impl LeadSource {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::MiniCasting => "mini_casting",
      Self::Leader => "leader",
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[allow(dead_code)]
pub struct DrillRunRow {
  pub id: i64,
  pub user_id: i64,
  pub drill_id: String,
  pub reflection: Option<String>,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SceneStateRow {
  pub user_id: i64,
  pub last_scene: Option<String>,
  pub last_reflection: Option<String>,
  pub updated_at: DateTime<Utc>,
}

/// A single onboarding answer, written to the user row as soon as it is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnboardingAnswer {
  Name(String),
  Timezone(String),
  Goal(String),
  Experience(ExperienceLevel),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Stats {
  pub users: i64,
  pub onboarded_users: i64,
  pub events: i64,
  pub leads: i64,
  pub feedback: i64,
  pub drill_runs: i64,
  pub average_rating: Option<f64>,
}

#[cfg(test)]
mod tests {
  use chrono::Utc;

  use super::UserRow;

  fn user() -> UserRow {
    UserRow {
      id: 7,
      username: Some("stage_fan".to_string()),
      first_name: Some("Ann".to_string()),
      last_name: None,
      name: None,
      timezone: None,
      goal: None,
      experience: None,
      streak: 0,
      last_drill_on: None,
      consent_at: None,
      created_at: Utc::now(),
    }
  }

  #[test]
  fn display_name_prefers_onboarding_name() {
    let mut row = user();
    assert_eq!(row.display_name(), "Ann");
    row.name = Some("Anna K.".to_string());
    assert_eq!(row.display_name(), "Anna K.");
    row.name = None;
    row.first_name = None;
    assert_eq!(row.display_name(), "@stage_fan");
  }

  #[test]
  fn onboarded_only_after_consent() {
    let mut row = user();
    assert!(!row.is_onboarded());
    row.consent_at = Some(Utc::now());
    assert!(row.is_onboarded());
  }
}
