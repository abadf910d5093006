use std::str::FromStr;

use anyhow::Result;
use chrono::DateTime;
use chrono::NaiveDate;
use chrono::Utc;
use serde_json::Value;
use sqlx::Pool;
use sqlx::Sqlite;
use sqlx::Transaction;
use sqlx::migrate::Migrator;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::sqlite::SqlitePoolOptions;
use tracing::instrument;

use crate::models::DrillRunRow;
use crate::models::LeadSource;
use crate::models::OnboardingAnswer;
use crate::models::SceneStateRow;
use crate::models::Stats;
use crate::models::UserRow;
use crate::streak::next_streak;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const USER_COLUMNS: &str = "id, username, first_name, last_name, name, timezone, goal, experience, streak, \
                            last_drill_on, consent_at, created_at";

const UPSERT_SCENE_STATE: &str = r#"
  INSERT INTO scene_states (user_id, last_scene, last_reflection, updated_at)
  VALUES ($1, $2, $3, $4)
  ON CONFLICT (user_id) DO UPDATE SET
    last_scene = excluded.last_scene,
    last_reflection = excluded.last_reflection,
    updated_at = excluded.updated_at
"#;

#[derive(Clone)]
pub struct Db {
  pool: Pool<Sqlite>,
}

impl Db {
  pub async fn connect(database_url: &str) -> Result<Self> {
    let options = SqliteConnectOptions::from_str(database_url)?
      .create_if_missing(true)
      .foreign_keys(true);
    let pool = SqlitePoolOptions::new().max_connections(5).connect_with(options).await?;
    MIGRATOR.run(&pool).await?;
    Ok(Self { pool })
  }

  /// Single-connection in-memory database; the pool must never recycle the
  /// connection or the schema disappears with it.
  #[cfg(test)]
  pub async fn connect_in_memory() -> Result<Self> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
      .max_connections(1)
      .idle_timeout(None)
      .max_lifetime(None)
      .connect_with(options)
      .await?;
    MIGRATOR.run(&pool).await?;
    Ok(Self { pool })
  }

  #[cfg(test)]
  pub async fn close(&self) {
    self.pool.close().await;
  }

  #[instrument(skip(self))]
  pub async fn ping(&self) -> Result<()> {
    sqlx::query("SELECT 1").execute(&self.pool).await?;
    Ok(())
  }

  #[instrument(skip(self))]
  pub async fn upsert_user(
    &self,
    id: i64,
    username: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
  ) -> Result<()> {
    sqlx::query(
      r#"
      INSERT INTO users (id, username, first_name, last_name)
      VALUES ($1, $2, $3, $4)
      ON CONFLICT (id) DO UPDATE SET
        username = excluded.username,
        first_name = excluded.first_name,
        last_name = excluded.last_name
      "#,
    )
    .bind(id)
    .bind(username)
    .bind(first_name)
    .bind(last_name)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  #[instrument(skip(self))]
  pub async fn get_user(&self, id: i64) -> Result<Option<UserRow>> {
    let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
      .bind(id)
      .fetch_optional(&self.pool)
      .await?;
    Ok(row)
  }

  #[instrument(skip(self))]
  pub async fn save_onboarding_answer(&self, user_id: i64, answer: &OnboardingAnswer) -> Result<()> {
    let query = match answer {
      OnboardingAnswer::Name(name) => sqlx::query("UPDATE users SET name = $1 WHERE id = $2").bind(name.clone()),
      OnboardingAnswer::Timezone(tz) => sqlx::query("UPDATE users SET timezone = $1 WHERE id = $2").bind(tz.clone()),
      OnboardingAnswer::Goal(goal) => sqlx::query("UPDATE users SET goal = $1 WHERE id = $2").bind(goal.clone()),
      OnboardingAnswer::Experience(level) => {
        sqlx::query("UPDATE users SET experience = $1 WHERE id = $2").bind(*level)
      },
    };
    query.bind(user_id).execute(&self.pool).await?;
    Ok(())
  }

  #[instrument(skip(self))]
  pub async fn set_consent(&self, user_id: i64, at: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE users SET consent_at = $1 WHERE id = $2")
      .bind(at)
      .bind(user_id)
      .execute(&self.pool)
      .await?;
    Ok(())
  }

  /// Stores a finished training run: the run row, the streak update and the scene state
  /// are written together or not at all. Returns the new streak.
  #[instrument(skip(self, reflection))]
  pub async fn complete_drill(
    &self,
    user_id: i64,
    drill_id: &str,
    reflection: Option<&str>,
    today: NaiveDate,
  ) -> Result<i64> {
    let mut tx = self.pool.begin().await?;
    sqlx::query("INSERT INTO drill_runs (user_id, drill_id, reflection) VALUES ($1, $2, $3)")
      .bind(user_id)
      .bind(drill_id)
      .bind(reflection)
      .execute(&mut *tx)
      .await?;
    let streak = apply_streak(&mut tx, user_id, today).await?;
    sqlx::query(UPSERT_SCENE_STATE)
      .bind(user_id)
      .bind(drill_id)
      .bind(reflection)
      .bind(Utc::now())
      .execute(&mut *tx)
      .await?;
    tx.commit().await?;
    Ok(streak)
  }

  #[instrument(skip(self))]
  pub async fn list_user_ids(&self) -> Result<Vec<i64>> {
    let ids = sqlx::query_scalar::<_, i64>("SELECT id FROM users ORDER BY id")
      .fetch_all(&self.pool)
      .await?;
    Ok(ids)
  }

  #[instrument(skip(self, payload))]
  pub async fn log_event(&self, user_id: Option<i64>, kind: &str, payload: Option<&Value>) -> Result<i64> {
    let id = sqlx::query_scalar::<_, i64>("INSERT INTO events (user_id, kind, payload) VALUES ($1, $2, $3) RETURNING id")
      .bind(user_id)
      .bind(kind)
      .bind(payload.map(Value::to_string))
      .fetch_one(&self.pool)
      .await?;
    Ok(id)
  }

  #[instrument(skip(self, payload))]
  pub async fn create_lead(
    &self,
    user_id: i64,
    source: LeadSource,
    name: Option<&str>,
    contact: Option<&str>,
    payload: &Value,
  ) -> Result<i64> {
    let id = sqlx::query_scalar::<_, i64>(
      r#"
      INSERT INTO leads (user_id, source, name, contact, payload)
      VALUES ($1, $2, $3, $4, $5)
      RETURNING id
      "#,
    )
    .bind(user_id)
    .bind(source.as_str())
    .bind(name)
    .bind(contact)
    .bind(payload.to_string())
    .fetch_one(&self.pool)
    .await?;
    Ok(id)
  }

  #[instrument(skip(self))]
  pub async fn create_feedback(&self, user_id: i64, rating: u8, comment: Option<&str>) -> Result<i64> {
    let id = sqlx::query_scalar::<_, i64>("INSERT INTO feedback (user_id, rating, comment) VALUES ($1, $2, $3) RETURNING id")
      .bind(user_id)
      .bind(i64::from(rating))
      .bind(comment)
      .fetch_one(&self.pool)
      .await?;
    Ok(id)
  }

  #[instrument(skip(self))]
  pub async fn list_recent_drill_runs(&self, user_id: i64, limit: i64) -> Result<Vec<DrillRunRow>> {
    let rows = sqlx::query_as::<_, DrillRunRow>(
      r#"
      SELECT id, user_id, drill_id, reflection, created_at
      FROM drill_runs
      WHERE user_id = $1
      ORDER BY created_at DESC, id DESC
      LIMIT $2
      "#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(&self.pool)
    .await?;
    Ok(rows)
  }

  #[instrument(skip(self))]
  pub async fn get_scene_state(&self, user_id: i64) -> Result<Option<SceneStateRow>> {
    let row = sqlx::query_as::<_, SceneStateRow>(
      "SELECT user_id, last_scene, last_reflection, updated_at FROM scene_states WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(&self.pool)
    .await?;
    Ok(row)
  }

  #[instrument(skip(self))]
  pub async fn stats(&self) -> Result<Stats> {
    let count = |table: &'static str| {
      let pool = self.pool.clone();
      async move {
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
          .fetch_one(&pool)
          .await
      }
    };

    let onboarded_users = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE consent_at IS NOT NULL")
      .fetch_one(&self.pool)
      .await?;
    let average_rating = sqlx::query_scalar::<_, Option<f64>>("SELECT AVG(rating) FROM feedback")
      .fetch_one(&self.pool)
      .await?;

    Ok(Stats {
      users: count("users").await?,
      onboarded_users,
      events: count("events").await?,
      leads: count("leads").await?,
      feedback: count("feedback").await?,
      drill_runs: count("drill_runs").await?,
      average_rating,
    })
  }
}

async fn apply_streak(tx: &mut Transaction<'_, Sqlite>, user_id: i64, today: NaiveDate) -> Result<i64> {
  let current = sqlx::query_as::<_, (i64, Option<NaiveDate>)>("SELECT streak, last_drill_on FROM users WHERE id = $1")
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await?;
  let (streak, last_drill_on) = current.unwrap_or((0, None));
  let next = next_streak(streak, last_drill_on, today);
  sqlx::query("UPDATE users SET streak = $1, last_drill_on = $2 WHERE id = $3")
    .bind(next)
    .bind(today)
    .bind(user_id)
    .execute(&mut **tx)
    .await?;
  Ok(next)
}
