use std::collections::HashSet;

use teloxide::types::ChatId;

use crate::db::Db;

#[derive(Clone)]
pub struct AppContext {
  db: Db,
  admins: HashSet<i64>,
  alert_chat: Option<ChatId>,
}

impl AppContext {
  pub fn new(db: Db, admins: Vec<i64>, alert_chat: Option<i64>) -> Self {
    Self {
      db,
      admins: admins.into_iter().collect(),
      alert_chat: alert_chat.map(ChatId),
    }
  }

  pub fn db(&self) -> &Db {
    &self.db
  }

  pub fn is_admin(&self, tg_id: i64) -> bool {
    self.admins.contains(&tg_id)
  }

  /// Where operational notices go: the alert chat when configured, otherwise every admin.
  pub fn alert_recipients(&self) -> Vec<ChatId> {
    match self.alert_chat {
      Some(chat) => vec![chat],
      None => {
        let mut admins: Vec<i64> = self.admins.iter().copied().collect();
        admins.sort_unstable();
        admins.into_iter().map(ChatId).collect()
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use teloxide::types::ChatId;

  use super::AppContext;
  use crate::db::Db;

  #[tokio::test]
  async fn alerts_prefer_dedicated_chat() {
    let db = Db::connect_in_memory().await.unwrap();
    let ctx = AppContext::new(db.clone(), vec![3, 1], None);
    assert!(ctx.is_admin(3));
    assert!(!ctx.is_admin(2));
    assert_eq!(ctx.alert_recipients(), vec![ChatId(1), ChatId(3)]);

    let ctx = AppContext::new(db, vec![3, 1], Some(-100500));
    assert_eq!(ctx.alert_recipients(), vec![ChatId(-100500)]);
  }
}
