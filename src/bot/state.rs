use serde::Deserialize;
use serde::Serialize;

use crate::drills;
use crate::models::ExperienceLevel;
use crate::models::OnboardingAnswer;
use crate::util::InputError;
use crate::util::MAX_LONG_ANSWER;
use crate::util::MAX_SHORT_ANSWER;
use crate::util::non_empty;
use crate::util::parse_age;
use crate::util::parse_consent;
use crate::util::parse_contact;
use crate::util::parse_experience;
use crate::util::parse_rating;
use crate::util::parse_timezone;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case", tag = "kind", content = "data")]
pub enum ConversationState {
  #[default]
  Idle,
  Onboarding(OnboardingDraft),
  Training(TrainingSession),
  MiniCasting(CastingDraft),
  Feedback(FeedbackDraft),
  Leader(LeaderDraft),
  Broadcast {
    admin_tg_id: i64,
  },
}

impl ConversationState {
  /// Whether an inline answer button with this callback prefix answers the question currently asked.
  /// Buttons from earlier prompts stay tappable, so the stage has to match.
  pub fn accepts_button(&self, prefix: &str) -> bool {
    match (self, prefix) {
      (ConversationState::Onboarding(draft), "exp") => draft.stage == OnboardingStage::Experience,
      (ConversationState::Onboarding(draft), "consent") => draft.stage == OnboardingStage::Consent,
      (ConversationState::Feedback(draft), "rate") => draft.stage == FeedbackStage::Rating,
      _ => false,
    }
  }
}

/// Outcome of feeding one answer into a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
  Next,
  Complete,
}

// onboarding

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OnboardingStage {
  Name,
  Timezone,
  Goal,
  Experience,
  Consent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OnboardingDraft {
  pub stage: OnboardingStage,
  pub name: Option<String>,
  pub timezone: Option<String>,
  pub goal: Option<String>,
  pub experience: Option<ExperienceLevel>,
  pub consent: bool,
}

impl Default for OnboardingDraft {
  fn default() -> Self {
    Self {
      stage: OnboardingStage::Name,
      name: None,
      timezone: None,
      goal: None,
      experience: None,
      consent: false,
    }
  }
}

impl OnboardingDraft {
  pub fn advance(&mut self, input: &str) -> Result<Progress, InputError> {
    match self.stage {
      OnboardingStage::Name => {
        self.name = Some(non_empty(input, MAX_SHORT_ANSWER)?);
        self.stage = OnboardingStage::Timezone;
      },
      OnboardingStage::Timezone => {
        self.timezone = Some(parse_timezone(input)?);
        self.stage = OnboardingStage::Goal;
      },
      OnboardingStage::Goal => {
        self.goal = Some(non_empty(input, MAX_LONG_ANSWER)?);
        self.stage = OnboardingStage::Experience;
      },
      OnboardingStage::Experience => {
        self.experience = Some(parse_experience(input)?);
        self.stage = OnboardingStage::Consent;
      },
      OnboardingStage::Consent => {
        if !parse_consent(input)? {
          return Err(InputError::ConsentDeclined);
        }
        self.consent = true;
        return Ok(Progress::Complete);
      },
    }
    Ok(Progress::Next)
  }

  /// The stored answer collected at `stage`; consent is written separately.
  pub fn answer_for(&self, stage: OnboardingStage) -> Option<OnboardingAnswer> {
    match stage {
      OnboardingStage::Name => self.name.clone().map(OnboardingAnswer::Name),
      OnboardingStage::Timezone => self.timezone.clone().map(OnboardingAnswer::Timezone),
      OnboardingStage::Goal => self.goal.clone().map(OnboardingAnswer::Goal),
      OnboardingStage::Experience => self.experience.map(OnboardingAnswer::Experience),
      OnboardingStage::Consent => None,
    }
  }

  pub fn prompt(&self) -> &'static str {
    match self.stage {
      OnboardingStage::Name => "👋 Welcome to Elaya Stagecoach! How should I call you?",
      OnboardingStage::Timezone => "🕰️ What is your timezone? Send an offset from UTC, e.g. UTC+3 or -5.",
      OnboardingStage::Goal => "🎯 What do you want to achieve with stage training?",
      OnboardingStage::Experience => "🎭 How much stage experience do you have?",
      OnboardingStage::Consent => {
        "📄 I will store your answers and training progress to personalise drills. Do you agree? (yes/no)"
      },
    }
  }
}

// training

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TrainingStage {
  ChooseDrill,
  Performing,
  Reflection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrainingSession {
  pub stage: TrainingStage,
  pub drill_id: Option<String>,
  pub report: Option<String>,
  pub reflection: Option<String>,
}

impl Default for TrainingSession {
  fn default() -> Self {
    Self {
      stage: TrainingStage::ChooseDrill,
      drill_id: None,
      report: None,
      reflection: None,
    }
  }
}

impl TrainingSession {
  pub fn advance(&mut self, input: &str) -> Result<Progress, InputError> {
    match self.stage {
      TrainingStage::ChooseDrill => {
        let drill = drills::resolve(input).ok_or(InputError::UnknownDrill)?;
        self.drill_id = Some(drill.id.to_string());
        self.stage = TrainingStage::Performing;
      },
      TrainingStage::Performing => {
        self.report = Some(non_empty(input, MAX_LONG_ANSWER)?);
        self.stage = TrainingStage::Reflection;
      },
      TrainingStage::Reflection => {
        self.reflection = Some(non_empty(input, MAX_LONG_ANSWER)?);
        return Ok(Progress::Complete);
      },
    }
    Ok(Progress::Next)
  }

  pub fn drill(&self) -> Option<&'static drills::Drill> {
    self.drill_id.as_deref().and_then(drills::find)
  }
}

// mini-casting

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CastingStage {
  Age,
  City,
  Experience,
  DreamRole,
  Contact,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CastingDraft {
  pub stage: CastingStage,
  pub age: Option<u8>,
  pub city: Option<String>,
  pub experience: Option<String>,
  pub dream_role: Option<String>,
  pub contact: Option<String>,
}

impl Default for CastingDraft {
  fn default() -> Self {
    Self {
      stage: CastingStage::Age,
      age: None,
      city: None,
      experience: None,
      dream_role: None,
      contact: None,
    }
  }
}

impl CastingDraft {
  pub fn advance(&mut self, input: &str) -> Result<Progress, InputError> {
    match self.stage {
      CastingStage::Age => {
        self.age = Some(parse_age(input)?);
        self.stage = CastingStage::City;
      },
      CastingStage::City => {
        self.city = Some(non_empty(input, MAX_SHORT_ANSWER)?);
        self.stage = CastingStage::Experience;
      },
      CastingStage::Experience => {
        self.experience = Some(non_empty(input, MAX_LONG_ANSWER)?);
        self.stage = CastingStage::DreamRole;
      },
      CastingStage::DreamRole => {
        self.dream_role = Some(non_empty(input, MAX_SHORT_ANSWER)?);
        self.stage = CastingStage::Contact;
      },
      CastingStage::Contact => {
        self.contact = Some(parse_contact(input)?);
        return Ok(Progress::Complete);
      },
    }
    Ok(Progress::Next)
  }

  pub fn prompt(&self) -> &'static str {
    match self.stage {
      CastingStage::Age => "🎬 Mini-casting, question 1/5: how old are you?",
      CastingStage::City => "🏙️ Question 2/5: which city do you live in?",
      CastingStage::Experience => "🎭 Question 3/5: tell me about your stage or camera experience.",
      CastingStage::DreamRole => "🌟 Question 4/5: what role do you dream of playing?",
      CastingStage::Contact => "📇 Question 5/5: how can the casting team reach you? (phone, email or @username)",
    }
  }
}

// feedback

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FeedbackStage {
  Rating,
  Comment,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedbackDraft {
  pub stage: FeedbackStage,
  pub rating: Option<u8>,
  pub comment: Option<String>,
}

impl Default for FeedbackDraft {
  fn default() -> Self {
    Self {
      stage: FeedbackStage::Rating,
      rating: None,
      comment: None,
    }
  }
}

impl FeedbackDraft {
  pub fn advance(&mut self, input: &str) -> Result<Progress, InputError> {
    match self.stage {
      FeedbackStage::Rating => {
        self.rating = Some(parse_rating(input)?);
        self.stage = FeedbackStage::Comment;
        Ok(Progress::Next)
      },
      FeedbackStage::Comment => {
        let comment = non_empty(input, MAX_LONG_ANSWER)?;
        self.comment = (comment != "-").then_some(comment);
        Ok(Progress::Complete)
      },
    }
  }
}

// leader funnel

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LeaderStage {
  Name,
  Contact,
  Motivation,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaderDraft {
  pub stage: LeaderStage,
  pub name: Option<String>,
  pub contact: Option<String>,
  pub motivation: Option<String>,
}

impl Default for LeaderDraft {
  fn default() -> Self {
    Self {
      stage: LeaderStage::Name,
      name: None,
      contact: None,
      motivation: None,
    }
  }
}

impl LeaderDraft {
  pub fn advance(&mut self, input: &str) -> Result<Progress, InputError> {
    match self.stage {
      LeaderStage::Name => {
        self.name = Some(non_empty(input, MAX_SHORT_ANSWER)?);
        self.stage = LeaderStage::Contact;
      },
      LeaderStage::Contact => {
        self.contact = Some(parse_contact(input)?);
        self.stage = LeaderStage::Motivation;
      },
      LeaderStage::Motivation => {
        self.motivation = Some(non_empty(input, MAX_LONG_ANSWER)?);
        return Ok(Progress::Complete);
      },
    }
    Ok(Progress::Next)
  }

  pub fn prompt(&self) -> &'static str {
    match self.stage {
      LeaderStage::Name => "🧭 Want to lead an Elaya group? First, your full name:",
      LeaderStage::Contact => "📇 How can we reach you? (phone, email or @username)",
      LeaderStage::Motivation => "💬 Why do you want to lead a group? A few sentences are enough.",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::CastingDraft;
  use super::CastingStage;
  use super::ConversationState;
  use super::FeedbackDraft;
  use super::FeedbackStage;
  use super::LeaderDraft;
  use super::OnboardingDraft;
  use super::OnboardingStage;
  use super::Progress;
  use super::TrainingSession;
  use super::TrainingStage;
  use crate::models::ExperienceLevel;
  use crate::models::OnboardingAnswer;
  use crate::util::InputError;

  #[test]
  fn buttons_only_answer_their_own_stage() {
    let mut draft = OnboardingDraft::default();
    assert!(!ConversationState::Onboarding(draft.clone()).accepts_button("consent"));
    assert!(!ConversationState::Onboarding(draft.clone()).accepts_button("exp"));

    draft.stage = OnboardingStage::Goal;
    assert!(!ConversationState::Onboarding(draft.clone()).accepts_button("exp"));
    draft.stage = OnboardingStage::Experience;
    assert!(ConversationState::Onboarding(draft.clone()).accepts_button("exp"));
    assert!(!ConversationState::Onboarding(draft.clone()).accepts_button("consent"));
    draft.stage = OnboardingStage::Consent;
    assert!(ConversationState::Onboarding(draft.clone()).accepts_button("consent"));
    assert!(!ConversationState::Onboarding(draft).accepts_button("rate"));

    let mut feedback = FeedbackDraft::default();
    assert!(ConversationState::Feedback(feedback.clone()).accepts_button("rate"));
    feedback.stage = FeedbackStage::Comment;
    assert!(!ConversationState::Feedback(feedback).accepts_button("rate"));
    assert!(!ConversationState::Idle.accepts_button("rate"));
  }

  #[test]
  fn onboarding_advances_in_fixed_order() {
    let mut draft = OnboardingDraft::default();
    let answers = ["Anna", "UTC+3", "Be confident on stage", "2"];
    let expected = [
      OnboardingStage::Timezone,
      OnboardingStage::Goal,
      OnboardingStage::Experience,
      OnboardingStage::Consent,
    ];
    for (answer, next) in answers.iter().zip(expected) {
      assert_eq!(draft.advance(answer), Ok(Progress::Next));
      assert_eq!(draft.stage, next);
    }
    assert_eq!(draft.advance("yes"), Ok(Progress::Complete));
    assert!(draft.consent);
    assert_eq!(draft.timezone.as_deref(), Some("UTC+03:00"));
    assert_eq!(draft.experience, Some(ExperienceLevel::Intermediate));
  }

  #[test]
  fn onboarding_invalid_answer_keeps_stage() {
    let mut draft = OnboardingDraft {
      stage: OnboardingStage::Timezone,
      name: Some("Anna".into()),
      ..OnboardingDraft::default()
    };
    assert_eq!(draft.advance("somewhere"), Err(InputError::InvalidTimezone));
    assert_eq!(draft.stage, OnboardingStage::Timezone);
    assert!(draft.timezone.is_none());
  }

  #[test]
  fn onboarding_consent_can_be_declined() {
    let mut draft = OnboardingDraft {
      stage: OnboardingStage::Consent,
      ..OnboardingDraft::default()
    };
    assert_eq!(draft.advance("no"), Err(InputError::ConsentDeclined));
    assert_eq!(draft.advance("maybe"), Err(InputError::InvalidConsent));
    assert!(!draft.consent);
  }

  #[test]
  fn onboarding_answers_map_to_columns() {
    let mut draft = OnboardingDraft::default();
    draft.advance("Anna").unwrap();
    assert_eq!(
      draft.answer_for(OnboardingStage::Name),
      Some(OnboardingAnswer::Name("Anna".into()))
    );
    assert_eq!(draft.answer_for(OnboardingStage::Goal), None);
    assert_eq!(draft.answer_for(OnboardingStage::Consent), None);
  }

  #[test]
  fn training_session_runs_drill_to_reflection() {
    let mut session = TrainingSession::default();
    assert_eq!(session.advance("nope"), Err(InputError::UnknownDrill));
    assert_eq!(session.advance("subtext"), Ok(Progress::Next));
    assert_eq!(session.stage, TrainingStage::Performing);
    assert_eq!(session.drill().map(|d| d.id), Some("subtext"));
    assert_eq!(session.advance("done"), Ok(Progress::Next));
    assert_eq!(session.stage, TrainingStage::Reflection);
    assert_eq!(session.advance("  "), Err(InputError::Empty));
    assert_eq!(session.advance("The threat felt most natural"), Ok(Progress::Complete));
    assert_eq!(session.reflection.as_deref(), Some("The threat felt most natural"));
  }

  #[test]
  fn casting_collects_five_answers() {
    let mut draft = CastingDraft::default();
    for answer in ["23", "Lisbon", "School theatre", "Lady Macbeth"] {
      assert_eq!(draft.advance(answer), Ok(Progress::Next));
    }
    assert_eq!(draft.stage, CastingStage::Contact);
    assert_eq!(draft.advance("nobody"), Err(InputError::InvalidContact));
    assert_eq!(draft.advance("ann@example.com"), Ok(Progress::Complete));
    assert_eq!(draft.age, Some(23));
    assert_eq!(draft.contact.as_deref(), Some("ann@example.com"));
  }

  #[test]
  fn feedback_comment_can_be_skipped() {
    let mut draft = FeedbackDraft::default();
    assert_eq!(draft.advance("7"), Err(InputError::InvalidRating));
    assert_eq!(draft.advance("5"), Ok(Progress::Next));
    assert_eq!(draft.advance("-"), Ok(Progress::Complete));
    assert_eq!(draft.rating, Some(5));
    assert!(draft.comment.is_none());
  }

  #[test]
  fn leader_funnel_requires_contact() {
    let mut draft = LeaderDraft::default();
    assert_eq!(draft.advance("Anna Karenina"), Ok(Progress::Next));
    assert_eq!(draft.advance("tomorrow"), Err(InputError::InvalidContact));
    assert_eq!(draft.advance("+7 999 123 45 67"), Ok(Progress::Next));
    assert_eq!(draft.advance("I love people"), Ok(Progress::Complete));
  }

  #[test]
  fn state_serializes_with_kind_tag() {
    let state = ConversationState::Broadcast { admin_tg_id: 1 };
    let value = serde_json::to_value(&state).unwrap();
    assert_eq!(value["kind"], "broadcast");
    assert_eq!(ConversationState::default(), ConversationState::Idle);
  }
}
