use chrono::Datelike;
use chrono::NaiveDate;

use crate::models::ExperienceLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Drill {
  pub id: &'static str,
  pub title: &'static str,
  pub level: ExperienceLevel,
  pub duration_minutes: u32,
  pub prompt: &'static str,
}

pub static CATALOG: &[Drill] = &[
  Drill {
    id: "breath-box",
    title: "Box breathing",
    level: ExperienceLevel::Beginner,
    duration_minutes: 5,
    prompt: "Breathe in for 4 counts, hold for 4, breathe out for 4, hold for 4. Repeat ten cycles \
             and notice where the tension leaves your body.",
  },
  Drill {
    id: "mirror-hello",
    title: "Hello in the mirror",
    level: ExperienceLevel::Beginner,
    duration_minutes: 5,
    prompt: "Stand in front of a mirror and say \"Hello, I'm glad to see you\" five times, each time \
             with a different feeling: joy, surprise, tiredness, tenderness, pride.",
  },
  Drill {
    id: "tongue-twister",
    title: "Tongue twister warm-up",
    level: ExperienceLevel::Beginner,
    duration_minutes: 7,
    prompt: "Read \"Red lorry, yellow lorry\" slowly three times, then at normal speed, then as fast \
             as you can while keeping every consonant clear.",
  },
  Drill {
    id: "object-story",
    title: "Story of an object",
    level: ExperienceLevel::Intermediate,
    duration_minutes: 10,
    prompt: "Pick any object near you. Tell its life story out loud for two minutes in first person, \
             as if you were that object.",
  },
  Drill {
    id: "silent-scene",
    title: "Silent scene",
    level: ExperienceLevel::Intermediate,
    duration_minutes: 10,
    prompt: "Play a short scene without words: you are waiting for an important phone call. Let the \
             audience read everything from your body and eyes.",
  },
  Drill {
    id: "subtext",
    title: "One line, three subtexts",
    level: ExperienceLevel::Intermediate,
    duration_minutes: 10,
    prompt: "Say \"Close the door, please\" three times: as a threat, as a confession of love, and as \
             a secret. Record yourself and listen back.",
  },
  Drill {
    id: "monologue-beat",
    title: "Monologue beats",
    level: ExperienceLevel::Advanced,
    duration_minutes: 15,
    prompt: "Take a monologue you know. Mark every beat where the intention changes and perform it \
             making each shift visible.",
  },
  Drill {
    id: "status-swap",
    title: "Status swap",
    level: ExperienceLevel::Advanced,
    duration_minutes: 15,
    prompt: "Improvise a two-minute dialogue between a boss and an assistant where their status \
             quietly flips halfway through. Play both parts.",
  },
  Drill {
    id: "cold-read",
    title: "Cold read",
    level: ExperienceLevel::Advanced,
    duration_minutes: 12,
    prompt: "Open any book on a random page and perform the first paragraph immediately, choosing a \
             clear objective within ten seconds.",
  },
];

pub fn find(id: &str) -> Option<&'static Drill> {
  CATALOG.iter().find(|drill| drill.id == id)
}

/// Resolves typed input against drill ids and titles, ignoring case.
pub fn resolve(input: &str) -> Option<&'static Drill> {
  let needle = input.trim();
  find(needle).or_else(|| CATALOG.iter().find(|drill| drill.title.eq_ignore_ascii_case(needle)))
}

pub fn for_level(level: ExperienceLevel) -> Vec<&'static Drill> {
  CATALOG.iter().filter(|drill| drill.level == level).collect()
}

/// Deterministic daily pick, different users land on different drills.
pub fn drill_of_the_day(user_id: i64, date: NaiveDate) -> &'static Drill {
  let len = CATALOG.len() as i64;
  let index = (i64::from(date.num_days_from_ce()) + user_id).rem_euclid(len);
  &CATALOG[index as usize]
}

#[cfg(test)]
mod tests {
  use std::collections::HashSet;

  use chrono::NaiveDate;

  use super::CATALOG;
  use super::drill_of_the_day;
  use super::find;
  use super::for_level;
  use super::resolve;
  use crate::models::ExperienceLevel;

  #[test]
  fn drill_ids_are_unique() {
    let ids: HashSet<_> = CATALOG.iter().map(|drill| drill.id).collect();
    assert_eq!(ids.len(), CATALOG.len());
  }

  #[test]
  fn every_level_has_drills() {
    for level in ExperienceLevel::ALL {
      assert!(!for_level(level).is_empty(), "no drills for {level}");
    }
  }

  #[test]
  fn resolves_by_id_or_title() {
    assert_eq!(find("subtext").map(|d| d.title), Some("One line, three subtexts"));
    assert_eq!(resolve("box BREATHING").map(|d| d.id), Some("breath-box"));
    assert!(resolve("juggling").is_none());
  }

  #[test]
  fn drill_of_the_day_is_stable_and_rotates() {
    let today = NaiveDate::from_ymd_opt(2026, 10, 15).unwrap();
    let tomorrow = today.succ_opt().unwrap();
    assert_eq!(drill_of_the_day(42, today).id, drill_of_the_day(42, today).id);
    assert_ne!(drill_of_the_day(42, today).id, drill_of_the_day(42, tomorrow).id);
    // negative ids (group chats) must not panic
    let _ = drill_of_the_day(-100123, today);
  }
}
