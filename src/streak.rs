use chrono::NaiveDate;

/// Streak after completing a drill on `today`.
///
/// A second drill on the same day keeps the streak, a drill on the day after the
/// previous one extends it, and any gap (or a clock that went backwards) restarts it.
pub fn next_streak(current: i64, last_drill_on: Option<NaiveDate>, today: NaiveDate) -> i64 {
  match last_drill_on {
    Some(last) if last == today => current.max(1),
    Some(last) if last.succ_opt() == Some(today) => current.max(0) + 1,
    _ => 1,
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::next_streak;

  fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 5, d).unwrap()
  }

  #[test]
  fn first_drill_starts_streak() {
    assert_eq!(next_streak(0, None, day(10)), 1);
  }

  #[test]
  fn same_day_keeps_streak() {
    assert_eq!(next_streak(4, Some(day(10)), day(10)), 4);
    assert_eq!(next_streak(0, Some(day(10)), day(10)), 1);
  }

  #[test]
  fn consecutive_day_extends_streak() {
    assert_eq!(next_streak(4, Some(day(9)), day(10)), 5);
  }

  #[test]
  fn gap_resets_streak() {
    assert_eq!(next_streak(4, Some(day(7)), day(10)), 1);
    assert_eq!(next_streak(4, Some(day(12)), day(10)), 1);
  }
}
