use chrono::DateTime;
use chrono::FixedOffset;
use chrono::NaiveDate;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::models::ExperienceLevel;

static TIMEZONE_PATTERN: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"^(?i:(?:utc|gmt)\s*)?([+-])?(\d{1,2})(?::?(\d{2}))?$").expect("valid regex")
});
static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex"));
static PHONE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+\d{7,15}$").expect("valid regex"));
static USERNAME_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^@[A-Za-z0-9_]{5,32}$").expect("valid regex"));

pub const MAX_SHORT_ANSWER: usize = 120;
pub const MAX_LONG_ANSWER: usize = 1500;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
  #[error("answer must not be empty")]
  Empty,
  #[error("answer must be at most {0} characters")]
  TooLong(usize),
  #[error("timezone must look like UTC+3 or -05:30")]
  InvalidTimezone,
  #[error("choose beginner, intermediate or advanced")]
  InvalidExperience,
  #[error("rating must be a number from 1 to 5")]
  InvalidRating,
  #[error("age must be a number from 7 to 99")]
  InvalidAge,
  #[error("contact must be a phone, email or @username")]
  InvalidContact,
  #[error("unknown drill")]
  UnknownDrill,
  #[error("please answer yes or no")]
  InvalidConsent,
  #[error("consent declined")]
  ConsentDeclined,
}

impl InputError {
  pub fn user_message(&self) -> String {
    match self {
      Self::Empty => "✍️ Please send a text answer.".to_string(),
      Self::TooLong(max) => format!("✂️ That is a bit long, please keep it under {max} characters."),
      Self::InvalidTimezone => "🕰️ Send your timezone as an offset from UTC, e.g. UTC+3, +5:30 or -4.".to_string(),
      Self::InvalidExperience => "🎭 Pick one of the buttons: beginner, intermediate or advanced.".to_string(),
      Self::InvalidRating => "⭐ Send a rating from 1 to 5.".to_string(),
      Self::InvalidAge => "🔢 Send your age as a number.".to_string(),
      Self::InvalidContact => "📇 Send a phone number in international format (+...), an email or your @username.".to_string(),
      Self::UnknownDrill => "❓ I don't know that drill. Pick one from the list.".to_string(),
      Self::InvalidConsent => "✅ Please answer yes or no.".to_string(),
      Self::ConsentDeclined => "Without consent I can't save your progress. Send /start whenever you change your mind.".to_string(),
    }
  }
}

pub fn non_empty(input: &str, max_len: usize) -> Result<String, InputError> {
  let trimmed = input.trim();
  if trimmed.is_empty() {
    return Err(InputError::Empty);
  }
  if trimmed.chars().count() > max_len {
    return Err(InputError::TooLong(max_len));
  }
  Ok(trimmed.to_string())
}

pub fn is_cancel(input: &str) -> bool {
  matches!(input.trim().to_lowercase().as_str(), "cancel" | "/cancel" | "stop")
}

/// Normalizes an offset-style timezone into `UTC±HH:MM`.
pub fn parse_timezone(input: &str) -> Result<String, InputError> {
  let trimmed = input.trim();
  if trimmed.eq_ignore_ascii_case("utc") || trimmed.eq_ignore_ascii_case("gmt") {
    return Ok("UTC+00:00".to_string());
  }

  let captures = TIMEZONE_PATTERN.captures(trimmed).ok_or(InputError::InvalidTimezone)?;
  let negative = captures.get(1).is_some_and(|sign| sign.as_str() == "-");
  let hours: i32 = captures[2].parse().map_err(|_| InputError::InvalidTimezone)?;
  let minutes: i32 = match captures.get(3) {
    Some(value) => value.as_str().parse().map_err(|_| InputError::InvalidTimezone)?,
    None => 0,
  };

  if !matches!(minutes, 0 | 15 | 30 | 45) {
    return Err(InputError::InvalidTimezone);
  }

  let total = hours * 60 + minutes;
  let signed = if negative { -total } else { total };
  if !(-12 * 60 ..= 14 * 60).contains(&signed) {
    return Err(InputError::InvalidTimezone);
  }

  let sign = if negative && total != 0 { '-' } else { '+' };
  Ok(format!("UTC{sign}{hours:02}:{minutes:02}"))
}

/// Offset for a timezone previously produced by [`parse_timezone`].
pub fn timezone_offset(normalized: &str) -> Option<FixedOffset> {
  let rest = normalized.strip_prefix("UTC")?;
  let (sign, rest) = rest.split_at(1);
  let (hours, minutes) = rest.split_once(':')?;
  let seconds = hours.parse::<i32>().ok()? * 3600 + minutes.parse::<i32>().ok()? * 60;
  match sign {
    "+" => FixedOffset::east_opt(seconds),
    "-" => FixedOffset::west_opt(seconds),
    _ => None,
  }
}

/// Calendar date for the user, falling back to UTC when no timezone is stored.
pub fn local_date(now: DateTime<Utc>, timezone: Option<&str>) -> NaiveDate {
  match timezone.and_then(timezone_offset) {
    Some(offset) => now.with_timezone(&offset).date_naive(),
    None => now.date_naive(),
  }
}

pub fn parse_experience(input: &str) -> Result<ExperienceLevel, InputError> {
  match input.trim().to_lowercase().as_str() {
    "1" | "beginner" | "novice" | "none" => Ok(ExperienceLevel::Beginner),
    "2" | "intermediate" | "some" | "amateur" => Ok(ExperienceLevel::Intermediate),
    "3" | "advanced" | "pro" | "professional" => Ok(ExperienceLevel::Advanced),
    _ => Err(InputError::InvalidExperience),
  }
}

/// Accepts `1`..`5` or a run of star characters.
pub fn parse_rating(input: &str) -> Result<u8, InputError> {
  let trimmed = input.trim();
  let value = if !trimmed.is_empty() && trimmed.chars().all(|c| c == '⭐' || c == '*') {
    trimmed.chars().count()
  } else {
    trimmed.parse::<usize>().map_err(|_| InputError::InvalidRating)?
  };
  match value {
    1 ..= 5 => Ok(value as u8),
    _ => Err(InputError::InvalidRating),
  }
}

pub fn parse_age(input: &str) -> Result<u8, InputError> {
  let value: u8 = input.trim().parse().map_err(|_| InputError::InvalidAge)?;
  if (7 ..= 99).contains(&value) {
    Ok(value)
  } else {
    Err(InputError::InvalidAge)
  }
}

/// Returns the contact normalized: emails lowercased, phones stripped of separators.
pub fn parse_contact(input: &str) -> Result<String, InputError> {
  let trimmed = input.trim();
  if EMAIL_PATTERN.is_match(trimmed) {
    return Ok(trimmed.to_lowercase());
  }
  if USERNAME_PATTERN.is_match(trimmed) {
    return Ok(trimmed.to_string());
  }
  let phone: String = trimmed
    .chars()
    .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
    .collect();
  if PHONE_PATTERN.is_match(&phone) {
    return Ok(phone);
  }
  Err(InputError::InvalidContact)
}

pub fn parse_consent(input: &str) -> Result<bool, InputError> {
  match input.trim().to_lowercase().as_str() {
    "yes" | "y" | "agree" | "ok" | "✅" => Ok(true),
    "no" | "n" | "decline" | "❌" => Ok(false),
    _ => Err(InputError::InvalidConsent),
  }
}

pub fn truncate_text(text: &str, max_chars: usize) -> String {
  if text.chars().count() <= max_chars {
    return text.to_string();
  }

  let guarded = max_chars.saturating_sub(3);
  if guarded == 0 {
    return "...".to_string();
  }

  let truncated: String = text.chars().take(guarded).collect();
  format!("{truncated}...")
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;
  use chrono::TimeZone;
  use chrono::Utc;

  use super::InputError;
  use super::is_cancel;
  use super::local_date;
  use super::non_empty;
  use super::parse_age;
  use super::parse_contact;
  use super::parse_experience;
  use super::parse_rating;
  use super::parse_timezone;
  use super::timezone_offset;
  use super::truncate_text;
  use crate::models::ExperienceLevel;

  #[test]
  fn normalizes_timezones() {
    assert_eq!(parse_timezone("UTC"), Ok("UTC+00:00".to_string()));
    assert_eq!(parse_timezone("+3"), Ok("UTC+03:00".to_string()));
    assert_eq!(parse_timezone("utc+3"), Ok("UTC+03:00".to_string()));
    assert_eq!(parse_timezone("GMT-4:00"), Ok("UTC-04:00".to_string()));
    assert_eq!(parse_timezone("-05:30"), Ok("UTC-05:30".to_string()));
    assert_eq!(parse_timezone("5"), Ok("UTC+05:00".to_string()));
    assert_eq!(parse_timezone("-0"), Ok("UTC+00:00".to_string()));
  }

  #[test]
  fn rejects_out_of_range_timezones() {
    assert_eq!(parse_timezone("+15"), Err(InputError::InvalidTimezone));
    assert_eq!(parse_timezone("-13"), Err(InputError::InvalidTimezone));
    assert_eq!(parse_timezone("+3:20"), Err(InputError::InvalidTimezone));
    assert_eq!(parse_timezone("Moscow"), Err(InputError::InvalidTimezone));
  }

  #[test]
  fn local_date_follows_offset() {
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 22, 30, 0).unwrap();
    assert_eq!(local_date(now, None), NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
    assert_eq!(
      local_date(now, Some("UTC+03:00")),
      NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    );
    assert_eq!(timezone_offset("UTC-05:30").map(|o| o.local_minus_utc()), Some(-19800));
  }

  #[test]
  fn parses_experience_keywords() {
    assert_eq!(parse_experience("Beginner"), Ok(ExperienceLevel::Beginner));
    assert_eq!(parse_experience("2"), Ok(ExperienceLevel::Intermediate));
    assert_eq!(parse_experience(" pro "), Ok(ExperienceLevel::Advanced));
    assert_eq!(parse_experience("guru"), Err(InputError::InvalidExperience));
  }

  #[test]
  fn parses_ratings() {
    assert_eq!(parse_rating("4"), Ok(4));
    assert_eq!(parse_rating("⭐⭐⭐"), Ok(3));
    assert_eq!(parse_rating("0"), Err(InputError::InvalidRating));
    assert_eq!(parse_rating("******"), Err(InputError::InvalidRating));
    assert_eq!(parse_rating(""), Err(InputError::InvalidRating));
  }

  #[test]
  fn parses_age_range() {
    assert_eq!(parse_age("25"), Ok(25));
    assert_eq!(parse_age("5"), Err(InputError::InvalidAge));
    assert_eq!(parse_age("old"), Err(InputError::InvalidAge));
  }

  #[test]
  fn parses_contacts() {
    assert_eq!(parse_contact("Ann@Example.com"), Ok("ann@example.com".to_string()));
    assert_eq!(parse_contact("+7 (999) 123-45-67"), Ok("+79991234567".to_string()));
    assert_eq!(parse_contact("@stage_fan"), Ok("@stage_fan".to_string()));
    assert_eq!(parse_contact("call me"), Err(InputError::InvalidContact));
    assert_eq!(parse_contact("8 999 123-45-67"), Err(InputError::InvalidContact));
    assert_eq!(parse_contact("+123456"), Err(InputError::InvalidContact));
  }

  #[test]
  fn validates_free_text() {
    assert_eq!(non_empty("  hello ", 10), Ok("hello".to_string()));
    assert_eq!(non_empty("   ", 10), Err(InputError::Empty));
    assert_eq!(non_empty("abcdef", 5), Err(InputError::TooLong(5)));
    assert!(is_cancel("Cancel"));
    assert!(is_cancel("/cancel"));
    assert!(!is_cancel("continue"));
  }

  #[test]
  fn truncates_long_text() {
    assert_eq!(truncate_text("short", 10), "short");
    assert_eq!(truncate_text("a long sentence", 8), "a lon...");
  }
}
